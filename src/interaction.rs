use std::collections::HashSet;

use eframe::egui::{Color32, Pos2, Rect, Vec2, vec2};

use crate::config::{SimulationConfig, ViewConfig};
use crate::reconcile::{EntityRecord, LayoutSession, ReconcilePath};
use crate::scene::Scene;

const TOOLTIP_OFFSET: Vec2 = vec2(14.0, -10.0);

/// Translation plus uniform scale applied to the whole scene. World origin
/// maps to the canvas centre shifted by `pan`.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ViewTransform {
    pub pan: Vec2,
    pub scale: f32,
}

impl ViewTransform {
    pub fn new(config: &ViewConfig) -> Self {
        Self {
            pan: Vec2::ZERO,
            scale: config.initial_zoom.clamp(config.min_zoom, config.max_zoom),
        }
    }

    pub fn world_to_screen(&self, canvas: Rect, world: Vec2) -> Pos2 {
        canvas.center() + self.pan + world * self.scale
    }

    pub fn screen_to_world(&self, canvas: Rect, screen: Pos2) -> Vec2 {
        (screen - canvas.center() - self.pan) / self.scale
    }

    /// Scales by `factor` keeping the world point under `pointer` fixed.
    pub fn zoom_at(&mut self, canvas: Rect, pointer: Pos2, factor: f32, config: &ViewConfig) {
        if !factor.is_finite() || factor <= 0.0 {
            return;
        }
        let world_before = self.screen_to_world(canvas, pointer);
        self.scale = (self.scale * factor).clamp(config.min_zoom, config.max_zoom);
        self.pan = pointer - canvas.center() - world_before * self.scale;
    }

    pub fn pan_by(&mut self, delta: Vec2) {
        self.pan += delta;
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct HoverFocus {
    pub entity: String,
    pub color: Color32,
    pub neighbours: HashSet<String>,
}

impl HoverFocus {
    fn from_session(session: &LayoutSession, index: usize) -> Option<Self> {
        let record = session.entities.get(index)?;
        let neighbours = session
            .edges
            .iter()
            .filter_map(|edge| {
                if edge.source == index {
                    Some(edge.key.target.clone())
                } else if edge.target == index {
                    Some(edge.key.source.clone())
                } else {
                    None
                }
            })
            .collect();

        Some(Self {
            entity: record.id().to_string(),
            color: record.color,
            neighbours,
        })
    }

    pub fn includes(&self, id: &str) -> bool {
        self.entity == id || self.neighbours.contains(id)
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct Tooltip {
    pub symbol: String,
    pub influence: f64,
    pub connections: u32,
    pub anchor: Pos2,
}

#[derive(Clone, Debug, PartialEq)]
pub enum Selection {
    Entity(EntityRecord),
    Cleared,
}

/// Nearest entity whose circle, as drawn at `now`, contains `world`.
pub fn hit_test(session: &LayoutSession, scene: &Scene, world: Vec2, now: f64) -> Option<usize> {
    session
        .simulation
        .nodes()
        .iter()
        .enumerate()
        .filter_map(|(index, node)| {
            let radius = scene.drawn_radius(&node.id, now)?;
            let distance = (node.position - world).length();
            (distance <= radius).then_some((index, distance))
        })
        .min_by(|a, b| a.1.total_cmp(&b.1))
        .map(|(index, _)| index)
}

/// Pointer-driven state that outlives a single frame. Only the dragged
/// entity's pin is ever written from here.
#[derive(Default)]
pub struct Interaction {
    hover: Option<HoverFocus>,
    dragging: Option<String>,
}

impl Interaction {
    pub fn hover(&self) -> Option<&HoverFocus> {
        self.hover.as_ref()
    }

    pub fn dragging(&self) -> Option<&str> {
        self.dragging.as_deref()
    }

    /// Returns true when the hovered entity changed.
    pub fn hover_at(&mut self, session: Option<&LayoutSession>, hit: Option<usize>) -> bool {
        let next = session
            .zip(hit)
            .and_then(|(session, index)| HoverFocus::from_session(session, index));
        let changed = self.hover.as_ref().map(|focus| &focus.entity)
            != next.as_ref().map(|focus| &focus.entity);
        self.hover = next;
        changed
    }

    pub fn leave(&mut self) -> bool {
        self.hover.take().is_some()
    }

    pub fn tooltip(&self, session: Option<&LayoutSession>, pointer: Pos2) -> Option<Tooltip> {
        let focus = self.hover.as_ref()?;
        let record = session?.entity(&focus.entity)?;
        Some(Tooltip {
            symbol: record.entity.display_symbol().to_string(),
            influence: record.entity.influence_score,
            connections: record.entity.connections,
            anchor: pointer + TOOLTIP_OFFSET,
        })
    }

    pub fn begin_drag(
        &mut self,
        session: &mut LayoutSession,
        hit: usize,
        config: &SimulationConfig,
    ) -> bool {
        let Some(node) = session.simulation.nodes().get(hit) else {
            return false;
        };
        let (id, position) = (node.id.clone(), node.position);

        session.simulation.pin(&id, position);
        session.simulation.set_alpha_target(config.drag_alpha_target);
        session.simulation.restart();
        self.dragging = Some(id);
        true
    }

    pub fn drag_to(&mut self, session: &mut LayoutSession, world: Vec2) -> bool {
        match &self.dragging {
            Some(id) => session.simulation.pin(id, world),
            None => false,
        }
    }

    pub fn end_drag(&mut self, session: Option<&mut LayoutSession>) -> bool {
        let Some(id) = self.dragging.take() else {
            return false;
        };
        if let Some(session) = session {
            session.simulation.unpin(&id);
            session.simulation.set_alpha_target(0.0);
        }
        true
    }

    pub fn click_at(&self, session: Option<&LayoutSession>, hit: Option<usize>) -> Selection {
        session
            .zip(hit)
            .and_then(|(session, index)| session.entities.get(index))
            .map_or(Selection::Cleared, |record| Selection::Entity(record.clone()))
    }

    /// Drops references to entities that are gone after a reconcile. A full
    /// rebuild always ends the drag because the dragged node no longer exists
    /// in the new simulation.
    pub fn revalidate(&mut self, session: Option<&mut LayoutSession>, path: ReconcilePath) {
        let Some(session) = session else {
            self.hover = None;
            self.dragging = None;
            return;
        };

        if let Some(id) = &self.dragging {
            let keep = path == ReconcilePath::Merge && session.contains(id);
            if !keep {
                self.dragging = None;
                session.simulation.set_alpha_target(0.0);
            }
        }

        let session = &*session;
        if let Some(focus) = &self.hover {
            self.hover = session
                .simulation
                .index_of(&focus.entity)
                .and_then(|index| HoverFocus::from_session(session, index));
        }
    }

    pub fn reset(&mut self) {
        self.hover = None;
        self.dragging = None;
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use eframe::egui::pos2;

    use super::*;
    use crate::config::EngineConfig;
    use crate::reconcile::{FeedMode, Reconciler};
    use crate::scene::Scene;
    use crate::snapshot::{Entity, Relationship, Snapshot};

    fn snapshot(ids: &[&str], links: &[(&str, &str)]) -> Arc<Snapshot> {
        Arc::new(Snapshot {
            entities: ids
                .iter()
                .map(|id| Entity {
                    id: id.to_string(),
                    symbol: id.to_string(),
                    influence_score: 0.5,
                    connections: 2,
                    ..Entity::default()
                })
                .collect(),
            relationships: links
                .iter()
                .map(|(source, target)| Relationship {
                    source: source.to_string(),
                    target: target.to_string(),
                    weight: 0.5,
                })
                .collect(),
            ..Snapshot::default()
        })
    }

    fn reconciler_with(ids: &[&str], links: &[(&str, &str)]) -> (Reconciler, Scene) {
        let mut reconciler = Reconciler::new(EngineConfig::default());
        let mut scene = Scene::default();
        reconciler.reconcile(snapshot(ids, links), FeedMode::Streaming, &mut scene, 0.0);
        (reconciler, scene)
    }

    const SETTLED: f64 = 5.0;

    fn position_of(reconciler: &Reconciler, id: &str) -> Vec2 {
        reconciler
            .session()
            .and_then(|session| session.simulation.node(id))
            .map(|node| node.position)
            .expect("node")
    }

    fn hit(reconciler: &Reconciler, scene: &Scene, world: Vec2) -> Option<usize> {
        reconciler
            .session()
            .and_then(|session| hit_test(session, scene, world, SETTLED))
    }

    #[test]
    fn zoom_keeps_pointer_anchor_and_clamps() {
        let config = ViewConfig::default();
        let canvas = Rect::from_min_size(Pos2::ZERO, vec2(800.0, 600.0));
        let mut view = ViewTransform::new(&config);
        assert_eq!(view.scale, 0.85);
        assert_eq!(view.world_to_screen(canvas, Vec2::ZERO), canvas.center());

        let pointer = pos2(600.0, 150.0);
        let anchored = view.screen_to_world(canvas, pointer);
        view.zoom_at(canvas, pointer, 1.5, &config);
        let after = view.world_to_screen(canvas, anchored);
        assert!((after - pointer).length() < 1e-3);

        view.zoom_at(canvas, pointer, 100.0, &config);
        assert_eq!(view.scale, 5.0);
        view.zoom_at(canvas, pointer, 1e-4, &config);
        assert_eq!(view.scale, 0.2);
    }

    #[test]
    fn hover_collects_neighbours_and_leave_clears() {
        let (reconciler, scene) = reconciler_with(&["A", "B", "C"], &[("A", "B")]);
        let session = reconciler.session();
        let mut interaction = Interaction::default();

        let on_a = hit(&reconciler, &scene, position_of(&reconciler, "A"));
        assert!(interaction.hover_at(session, on_a));
        let focus = interaction.hover().expect("focus");
        assert_eq!(focus.entity, "A");
        assert!(focus.includes("B"));
        assert!(!focus.includes("C"));

        let tooltip = interaction
            .tooltip(session, pos2(100.0, 100.0))
            .expect("tooltip");
        assert_eq!(tooltip.symbol, "A");
        assert_eq!(tooltip.anchor, pos2(114.0, 90.0));

        assert!(interaction.leave());
        assert!(interaction.hover().is_none());
        let far = hit(&reconciler, &scene, vec2(10_000.0, 10_000.0));
        assert!(far.is_none());
        assert!(!interaction.hover_at(session, far));
    }

    #[test]
    fn entities_are_not_hittable_before_they_are_drawn() {
        let (reconciler, scene) = reconciler_with(&["A", "B"], &[]);
        let session = reconciler.session().expect("session");
        let on_b = position_of(&reconciler, "B");

        // B's entrance is staggered behind A's, so it has no radius yet.
        assert_eq!(hit_test(session, &scene, on_b, 0.0), None);
        assert_eq!(hit_test(session, &scene, on_b, 0.01), None);
        assert_eq!(hit_test(session, &scene, on_b, 0.3), session.simulation.index_of("B"));
        assert_eq!(hit_test(session, &scene, on_b, SETTLED), session.simulation.index_of("B"));
    }

    #[test]
    fn drag_pins_only_the_dragged_entity() {
        let (mut reconciler, scene) = reconciler_with(&["A", "B", "C"], &[("A", "B")]);
        let config = EngineConfig::default().simulation;
        let grab = hit(&reconciler, &scene, position_of(&reconciler, "B")).expect("hit");
        let mut interaction = Interaction::default();

        let session = reconciler.session_mut().expect("session");
        assert!(session.simulation.pin("C", vec2(5.0, 5.0)));
        assert!(interaction.begin_drag(session, grab, &config));
        assert_eq!(interaction.dragging(), Some("B"));
        assert!((session.simulation.alpha_target() - 0.3).abs() < 1e-6);

        assert!(interaction.drag_to(session, vec2(120.0, 80.0)));
        session.simulation.step();
        assert_eq!(
            session.simulation.node("B").map(|node| node.position),
            Some(vec2(120.0, 80.0))
        );

        assert!(interaction.end_drag(Some(&mut *session)));
        assert!(session.simulation.node("B").is_some_and(|node| node.pin.is_none()));
        assert_eq!(
            session.simulation.node("C").and_then(|node| node.pin),
            Some(vec2(5.0, 5.0))
        );
        assert_eq!(session.simulation.alpha_target(), 0.0);
    }

    #[test]
    fn merge_that_removes_dragged_entity_ends_drag() {
        let ids = ["A", "B", "C", "D", "E", "F"];
        let (mut reconciler, mut scene) = reconciler_with(&ids, &[]);
        let config = EngineConfig::default().simulation;
        let grab = hit(&reconciler, &scene, position_of(&reconciler, "F")).expect("hit");
        let mut interaction = Interaction::default();

        let session = reconciler.session_mut().expect("session");
        session.simulation.pin("A", vec2(1.0, 2.0));
        assert!(interaction.begin_drag(session, grab, &config));
        assert_eq!(interaction.dragging(), Some("F"));

        let outcome = reconciler.reconcile(
            snapshot(&["A", "B", "C", "D", "E", "G"], &[]),
            FeedMode::Streaming,
            &mut scene,
            1.0,
        );
        assert_eq!(outcome.path, ReconcilePath::Merge);
        interaction.revalidate(reconciler.session_mut(), outcome.path);

        assert!(interaction.dragging().is_none());
        let session = reconciler.session().expect("session");
        assert_eq!(session.simulation.alpha_target(), 0.0);
        assert_eq!(
            session.simulation.node("A").and_then(|node| node.pin),
            Some(vec2(1.0, 2.0))
        );
    }

    #[test]
    fn click_selects_or_clears() {
        let (reconciler, scene) = reconciler_with(&["A", "B"], &[]);
        let interaction = Interaction::default();
        let session = reconciler.session();

        let on_b = hit(&reconciler, &scene, position_of(&reconciler, "B"));
        match interaction.click_at(session, on_b) {
            Selection::Entity(record) => assert_eq!(record.id(), "B"),
            Selection::Cleared => panic!("expected a selection"),
        }
        let far = hit(&reconciler, &scene, vec2(5_000.0, 0.0));
        assert_eq!(interaction.click_at(session, far), Selection::Cleared);
    }
}
