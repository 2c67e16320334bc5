use eframe::egui::{self, RichText, Ui};

use mris_graph::presentation::{cluster_color, short_label};
use mris_graph::util::format_percent;

use super::super::ViewModel;

const TOP_CONNECTIONS: usize = 10;

impl ViewModel {
    pub(in crate::app) fn draw_details(&mut self, ui: &mut Ui) {
        ui.heading("Inspector");
        ui.add_space(6.0);

        let Some(selected_id) = self.selected.clone() else {
            ui.label("Click an entity in the graph or the list.");
            return;
        };

        let Some(snapshot) = self.engine.snapshot().cloned() else {
            return;
        };
        let Some(entity) = snapshot.entity(&selected_id) else {
            ui.label("Selected entity is no longer in the dataset.");
            return;
        };

        let color = cluster_color(entity.cluster_id);
        ui.horizontal(|ui| {
            ui.label(RichText::new(entity.display_symbol()).strong().size(18.0).color(color));
            if ui.small_button("✕").clicked() {
                self.set_selected(None);
            }
        });
        ui.small(format!("cluster {}", entity.cluster_id));
        ui.add_space(6.0);

        ui.horizontal(|ui| {
            ui.label("Influence");
            ui.label(RichText::new(format_percent(entity.influence_score)).color(color));
        });
        ui.add(egui::ProgressBar::new(entity.influence_score.clamp(0.0, 1.0) as f32).fill(color));
        ui.add_space(6.0);

        egui::Grid::new("centrality_grid")
            .num_columns(3)
            .spacing([18.0, 4.0])
            .show(ui, |ui| {
                ui.strong(format!("{:.3}", entity.centrality.degree));
                ui.strong(format!("{:.3}", entity.centrality.betweenness));
                ui.strong(format!("{:.3}", entity.centrality.closeness));
                ui.end_row();
                ui.small("Degree");
                ui.small("Between.");
                ui.small("Closeness");
                ui.end_row();
            });

        let connections = snapshot.top_connections(&selected_id, TOP_CONNECTIONS);
        if connections.is_empty() {
            return;
        }

        ui.separator();
        ui.label(RichText::new(format!("Top Connections ({})", connections.len())).strong());
        let max_weight = connections
            .first()
            .map(|connection| connection.weight)
            .filter(|weight| *weight > 0.0)
            .unwrap_or(1.0);

        let mut follow = None;
        for connection in &connections {
            ui.horizontal(|ui| {
                if ui.link(short_label(&connection.peer)).clicked() {
                    follow = Some(connection.peer.clone());
                }
                ui.add(
                    egui::ProgressBar::new((connection.weight / max_weight).clamp(0.0, 1.0) as f32)
                        .desired_width(110.0)
                        .fill(color),
                );
                ui.label(format!("{:.3}", connection.weight));
            });
        }

        if let Some(peer) = follow {
            self.set_selected(Some(peer));
        }
    }
}
