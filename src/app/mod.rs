use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::mpsc::{self, Receiver, TryRecvError};
use std::thread;
use std::time::Duration;

use eframe::egui::{self, Context};
use tracing::info;

use mris_graph::config::EngineConfig;
use mris_graph::feed::{FeedSource, spawn_reader};
use mris_graph::interaction::Selection;
use mris_graph::{FeedMode, GraphEngine, Snapshot};

mod graph;
mod render_utils;
mod ui;

/// Where snapshots come from.
pub enum Input {
    Snapshot(PathBuf),
    Stream {
        source: FeedSource,
        pacing: Option<Duration>,
        static_mode: bool,
    },
}

pub struct MrisGraphApp {
    config: EngineConfig,
    input: Input,
    state: AppState,
}

enum AppState {
    Loading {
        rx: Receiver<Result<Snapshot, String>>,
    },
    Ready(Box<ViewModel>),
    Error(String),
}

struct ViewModel {
    engine: GraphEngine,
    source_label: String,
    selected: Option<String>,
    selections: Receiver<Selection>,
    search: String,
    entity_rows_visible: usize,
}

impl MrisGraphApp {
    pub fn new(_cc: &eframe::CreationContext<'_>, config: EngineConfig, input: Input) -> Self {
        let state = Self::start(config, &input);
        Self {
            config,
            input,
            state,
        }
    }

    fn spawn_load(path: PathBuf) -> Receiver<Result<Snapshot, String>> {
        let (tx, rx) = mpsc::channel();

        thread::spawn(move || {
            let result = Snapshot::load(&path).map_err(|error| format!("{error:#}"));
            let _ = tx.send(result);
        });

        rx
    }

    fn start(config: EngineConfig, input: &Input) -> AppState {
        match input {
            Input::Snapshot(path) => AppState::Loading {
                rx: Self::spawn_load(path.clone()),
            },
            Input::Stream {
                source,
                pacing,
                static_mode,
            } => match spawn_reader(source.clone(), *pacing) {
                Ok(rx) => {
                    let mode = if *static_mode {
                        FeedMode::Static
                    } else {
                        FeedMode::Streaming
                    };
                    let mut model = ViewModel::new(config, mode, source_label(source));
                    model.engine.attach(rx);
                    AppState::Ready(Box::new(model))
                }
                Err(error) => AppState::Error(format!("{error:#}")),
            },
        }
    }
}

fn source_label(source: &FeedSource) -> String {
    match source {
        FeedSource::Stdin => "stream: stdin".to_string(),
        FeedSource::File(path) => format!("stream: {}", path.display()),
    }
}

impl ViewModel {
    const INITIAL_ENTITY_ROWS: usize = 40;

    fn new(config: EngineConfig, mode: FeedMode, source_label: String) -> Self {
        let mut engine = GraphEngine::new(config, mode);
        let (tx, selections) = mpsc::channel();
        engine.on_select(move |selection| {
            let _ = tx.send(selection);
        });

        Self {
            engine,
            source_label,
            selected: None,
            selections,
            search: String::new(),
            entity_rows_visible: Self::INITIAL_ENTITY_ROWS,
        }
    }

    fn with_snapshot(config: EngineConfig, path: &Path, snapshot: Snapshot, now: f64) -> Self {
        let mut model = Self::new(config, FeedMode::Static, format!("snapshot: {}", path.display()));
        model.engine.apply_snapshot(Arc::new(snapshot), now);
        model
    }

    fn set_selected(&mut self, selected: Option<String>) {
        if self.selected == selected {
            return;
        }
        self.engine.set_selected(selected.as_deref());
        self.selected = selected;
    }

    fn drain_selections(&mut self) {
        while let Ok(selection) = self.selections.try_recv() {
            match selection {
                Selection::Entity(record) => self.set_selected(Some(record.entity.id)),
                Selection::Cleared => self.set_selected(None),
            }
        }
    }

    /// The selection is ours; drop it once its entity leaves the data.
    fn prune_selection(&mut self) {
        let gone = self.selected.as_deref().is_some_and(|id| {
            self.engine
                .snapshot()
                .is_none_or(|snapshot| snapshot.entity(id).is_none())
        });
        if gone {
            info!("selected entity left the dataset");
            self.set_selected(None);
        }
    }

    fn show(&mut self, ctx: &Context) {
        let now = ctx.input(|input| input.time);
        if self.engine.pump(now) > 0 {
            self.prune_selection();
        }
        self.drain_selections();

        egui::TopBottomPanel::top("top_bar")
            .resizable(false)
            .show(ctx, |ui| self.draw_top_bar(ui));

        egui::SidePanel::left("entities")
            .resizable(true)
            .default_width(280.0)
            .show(ctx, |ui| self.draw_entity_list(ui));

        egui::SidePanel::right("details")
            .resizable(true)
            .default_width(340.0)
            .show(ctx, |ui| self.draw_details(ui));

        egui::CentralPanel::default().show(ctx, |ui| {
            if self.engine.snapshot().is_none() {
                ui.vertical_centered(|ui| {
                    ui.add_space(120.0);
                    ui.heading("Waiting for the first snapshot...");
                    ui.add_space(8.0);
                    ui.spinner();
                });
            } else {
                self.draw_graph(ui);
            }
        });

        if self.engine.is_attached() {
            ctx.request_repaint_after(Duration::from_millis(250));
        }
    }
}

impl eframe::App for MrisGraphApp {
    fn update(&mut self, ctx: &Context, _frame: &mut eframe::Frame) {
        let mut transition = None;

        match &mut self.state {
            AppState::Loading { rx } => {
                match rx.try_recv() {
                    Ok(Ok(snapshot)) => {
                        if let Input::Snapshot(path) = &self.input {
                            let now = ctx.input(|input| input.time);
                            transition = Some(AppState::Ready(Box::new(ViewModel::with_snapshot(
                                self.config,
                                path,
                                snapshot,
                                now,
                            ))));
                        }
                    }
                    Ok(Err(error)) => transition = Some(AppState::Error(error)),
                    Err(TryRecvError::Disconnected) => {
                        transition = Some(AppState::Error(
                            "Background load worker disconnected".to_owned(),
                        ));
                    }
                    Err(TryRecvError::Empty) => {}
                }

                egui::CentralPanel::default().show(ctx, |ui| {
                    ui.vertical_centered(|ui| {
                        ui.add_space(120.0);
                        ui.heading("Loading snapshot...");
                        ui.add_space(8.0);
                        ui.spinner();
                    });
                });
            }
            AppState::Error(error) => {
                egui::CentralPanel::default().show(ctx, |ui| {
                    ui.heading("Failed to load the network");
                    ui.add_space(6.0);
                    ui.label(error.as_str());
                    ui.add_space(10.0);
                    if ui.button("Retry").clicked() {
                        transition = Some(Self::start(self.config, &self.input));
                    }
                });
            }
            AppState::Ready(model) => model.show(ctx),
        }

        if let Some(next_state) = transition {
            self.state = next_state;
        }
    }
}
