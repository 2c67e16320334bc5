use std::sync::Arc;
use std::sync::mpsc::{Receiver, TryRecvError};

use eframe::egui::{Pos2, Rect, Vec2};
use tracing::{debug, info, trace, warn};

use crate::config::EngineConfig;
use crate::feed::FeedEvent;
use crate::interaction::{HoverFocus, Interaction, Selection, Tooltip, ViewTransform, hit_test};
use crate::reconcile::{FeedMode, LayoutSession, ReconcileOutcome, Reconciler};
use crate::scene::Scene;
use crate::snapshot::Snapshot;

type SelectCallback = Box<dyn FnMut(Selection)>;

pub struct GraphEngine {
    config: EngineConfig,
    mode: FeedMode,
    reconciler: Reconciler,
    scene: Scene,
    interaction: Interaction,
    view: ViewTransform,
    inbound: Option<Receiver<FeedEvent>>,
    on_select: Option<SelectCallback>,
    last_outcome: Option<ReconcileOutcome>,
    last_error: Option<String>,
    next_update_in: Option<f64>,
    clock: f64,
    stopped: bool,
}

impl GraphEngine {
    pub fn new(config: EngineConfig, mode: FeedMode) -> Self {
        Self {
            reconciler: Reconciler::new(config),
            scene: Scene::default(),
            interaction: Interaction::default(),
            view: ViewTransform::new(&config.view),
            inbound: None,
            on_select: None,
            last_outcome: None,
            last_error: None,
            next_update_in: None,
            clock: 0.0,
            stopped: false,
            config,
            mode,
        }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn mode(&self) -> FeedMode {
        self.mode
    }

    /// Leaving streaming mode stops the tick loop and drops the feed.
    pub fn set_mode(&mut self, mode: FeedMode) {
        if self.mode == FeedMode::Streaming && mode == FeedMode::Static {
            info!("leaving streaming mode");
            self.inbound = None;
            if let Some(session) = self.reconciler.session_mut() {
                session.simulation.stop();
            }
        }
        self.mode = mode;
    }

    pub fn attach(&mut self, inbound: Receiver<FeedEvent>) {
        if self.stopped {
            return;
        }
        self.inbound = Some(inbound);
    }

    pub fn is_attached(&self) -> bool {
        self.inbound.is_some()
    }

    pub fn on_select(&mut self, callback: impl FnMut(Selection) + 'static) {
        self.on_select = Some(Box::new(callback));
    }

    pub fn scene(&self) -> &Scene {
        &self.scene
    }

    pub fn view(&self) -> &ViewTransform {
        &self.view
    }

    pub fn session(&self) -> Option<&LayoutSession> {
        self.reconciler.session()
    }

    pub fn snapshot(&self) -> Option<&Arc<Snapshot>> {
        self.reconciler.previous()
    }

    pub fn hover(&self) -> Option<&HoverFocus> {
        self.interaction.hover()
    }

    pub fn last_outcome(&self) -> Option<&ReconcileOutcome> {
        self.last_outcome.as_ref()
    }

    pub fn last_error(&self) -> Option<&str> {
        self.last_error.as_deref()
    }

    pub fn next_update_in(&self) -> Option<f64> {
        self.next_update_in
    }

    pub fn is_settling(&self) -> bool {
        self.session()
            .is_some_and(|session| session.simulation.is_running())
    }

    pub fn set_selected(&mut self, id: Option<&str>) {
        self.scene.set_selected(id);
    }

    pub fn apply_snapshot(&mut self, snapshot: Arc<Snapshot>, now: f64) -> Option<ReconcileOutcome> {
        if self.stopped {
            return None;
        }

        self.advance_clock(now);
        let outcome = self
            .reconciler
            .reconcile(snapshot, self.mode, &mut self.scene, now);
        self.interaction
            .revalidate(self.reconciler.session_mut(), outcome.path);
        // A rebuild drops the glow even when the hovered entity survived.
        let hovered = self.interaction.hover().map(|focus| focus.entity.as_str());
        self.scene
            .set_glow(hovered, now, self.config.transitions.hover_glow_ms);
        self.last_outcome = Some(outcome);
        self.last_error = None;
        Some(outcome)
    }

    /// Drains the feed channel in order. Returns how many snapshots were
    /// applied.
    pub fn pump(&mut self, now: f64) -> usize {
        let mut applied = 0;

        while let Some(inbound) = self.inbound.as_ref() {
            let event = match inbound.try_recv() {
                Ok(event) => event,
                Err(TryRecvError::Empty) => break,
                Err(TryRecvError::Disconnected) => FeedEvent::Closed,
            };

            match event {
                FeedEvent::Update(snapshot) => {
                    if self.apply_snapshot(snapshot, now).is_some() {
                        applied += 1;
                    }
                }
                FeedEvent::Ping { next_in } => {
                    trace!(?next_in, "feed heartbeat");
                    self.next_update_in = next_in;
                }
                FeedEvent::Error(message) => {
                    warn!("feed error: {message}");
                    self.last_error = Some(message);
                }
                FeedEvent::Closed => {
                    info!("feed closed");
                    self.inbound = None;
                }
            }
        }

        applied
    }

    /// One scheduled frame: a simulation tick when the loop is live, position
    /// sync, transition bookkeeping. Returns whether another frame is needed.
    pub fn frame(&mut self, now: f64) -> bool {
        if self.stopped {
            return false;
        }
        self.advance_clock(now);

        let mut ticking = false;
        if let Some(session) = self.reconciler.session_mut() {
            ticking = session.simulation.step();
            if ticking {
                self.scene.sync_positions(session);
            }
        }

        let pruned = self.scene.advance(now);
        if pruned > 0 {
            trace!(pruned, "removed finished exits");
        }

        ticking || self.is_settling() || self.scene.animating(now)
    }

    /// Teardown: cancels the tick loop, drops the feed and freezes the scene.
    pub fn stop(&mut self) {
        if self.stopped {
            return;
        }
        if let Some(session) = self.reconciler.session_mut() {
            session.simulation.stop();
        }
        self.inbound = None;
        self.interaction.reset();
        self.stopped = true;
        debug!("engine stopped");
    }

    pub fn pointer_moved(&mut self, canvas: Rect, pointer: Option<Pos2>, now: f64) {
        if self.stopped {
            return;
        }

        self.advance_clock(now);
        let changed = match pointer {
            Some(pointer) => {
                let hit = self.hit(canvas, pointer);
                self.interaction.hover_at(self.reconciler.session(), hit)
            }
            None => self.interaction.leave(),
        };

        if changed {
            let hovered = self.interaction.hover().map(|focus| focus.entity.clone());
            self.scene
                .set_glow(hovered.as_deref(), now, self.config.transitions.hover_glow_ms);
        }
    }

    pub fn tooltip(&self, pointer: Pos2) -> Option<Tooltip> {
        self.interaction.tooltip(self.session(), pointer)
    }

    pub fn press(&mut self, canvas: Rect, pointer: Pos2) -> bool {
        if self.stopped {
            return false;
        }
        let hit = self.hit(canvas, pointer);
        let config = self.config.simulation;
        match (hit, self.reconciler.session_mut()) {
            (Some(hit), Some(session)) => self.interaction.begin_drag(session, hit, &config),
            _ => false,
        }
    }

    pub fn drag(&mut self, canvas: Rect, pointer: Pos2) -> bool {
        if self.stopped {
            return false;
        }
        let world = self.view.screen_to_world(canvas, pointer);
        match self.reconciler.session_mut() {
            Some(session) => self.interaction.drag_to(session, world),
            None => false,
        }
    }

    pub fn release(&mut self) -> bool {
        if self.stopped {
            return false;
        }
        self.interaction.end_drag(self.reconciler.session_mut())
    }

    pub fn is_dragging(&self) -> bool {
        self.interaction.dragging().is_some()
    }

    pub fn click(&mut self, canvas: Rect, pointer: Pos2) -> Selection {
        let hit = self.hit(canvas, pointer);
        let selection = self.interaction.click_at(self.session(), hit);
        if let Some(callback) = self.on_select.as_mut() {
            callback(selection.clone());
        }
        selection
    }

    fn hit(&self, canvas: Rect, pointer: Pos2) -> Option<usize> {
        let session = self.reconciler.session()?;
        let world = self.view.screen_to_world(canvas, pointer);
        hit_test(session, &self.scene, world, self.clock)
    }

    fn advance_clock(&mut self, now: f64) {
        self.clock = self.clock.max(now);
    }

    pub fn zoom(&mut self, canvas: Rect, pointer: Pos2, factor: f32) {
        self.view.zoom_at(canvas, pointer, factor, &self.config.view);
    }

    pub fn pan(&mut self, delta: Vec2) {
        self.view.pan_by(delta);
    }

    pub fn reset_view(&mut self) {
        self.view = ViewTransform::new(&self.config.view);
    }
}

impl Drop for GraphEngine {
    fn drop(&mut self) {
        self.stop();
    }
}
