use eframe::egui::{self, Align, Color32, Layout, Ui};
use fuzzy_matcher::FuzzyMatcher;
use fuzzy_matcher::skim::SkimMatcherV2;

use mris_graph::presentation::{cluster_color, short_label};
use mris_graph::snapshot::Entity;
use mris_graph::{FeedMode, ReconcilePath};

use super::super::ViewModel;

fn fuzzy_match_score(matcher: &SkimMatcherV2, text: &str, query: &str) -> Option<i64> {
    matcher
        .fuzzy_match(text, query)
        .or_else(|| matcher.fuzzy_match(&text.to_ascii_lowercase(), &query.to_ascii_lowercase()))
}

/// Entities ordered by influence, or by match score while searching.
fn ranked_entities<'a>(entities: &'a [Entity], query: &str) -> Vec<&'a Entity> {
    let query = query.trim();
    if query.is_empty() {
        let mut ranked = entities.iter().collect::<Vec<_>>();
        ranked.sort_by(|a, b| b.influence_score.total_cmp(&a.influence_score));
        return ranked;
    }

    let matcher = SkimMatcherV2::default();
    let mut scored = entities
        .iter()
        .filter_map(|entity| {
            fuzzy_match_score(&matcher, entity.display_symbol(), query).map(|score| (score, entity))
        })
        .collect::<Vec<_>>();
    scored.sort_by(|a, b| {
        b.0.cmp(&a.0)
            .then_with(|| b.1.influence_score.total_cmp(&a.1.influence_score))
    });
    scored.into_iter().map(|(_, entity)| entity).collect()
}

impl ViewModel {
    const ENTITY_PAGE_ROWS: usize = 40;
    const ENTITY_PREFETCH_MARGIN: usize = 4;

    pub(in crate::app) fn draw_top_bar(&mut self, ui: &mut Ui) {
        ui.horizontal(|ui| {
            ui.heading("mris-graph");
            ui.separator();
            ui.label(self.source_label.as_str());

            let mode = match self.engine.mode() {
                FeedMode::Streaming => "live",
                FeedMode::Static => "static",
            };
            ui.label(format!("mode: {mode}"));

            if let Some(snapshot) = self.engine.snapshot() {
                if let Some(index) = &snapshot.index {
                    ui.label(format!("index: {index}"));
                }
                if let Some(period) = &snapshot.period {
                    ui.label(format!("period: {period}"));
                }
                if let Some(threshold) = snapshot.threshold {
                    ui.label(format!("threshold: {threshold:.2}"));
                }
                let stats = &snapshot.stats;
                ui.label(format!("nodes: {}", snapshot.entities.len()));
                ui.label(format!("edges: {}", snapshot.relationships.len()));
                ui.label(format!("density: {:.3}", stats.density));
                ui.label(format!("modularity: {:.3}", stats.modularity));
                ui.label(format!("clusters: {}", stats.num_clusters));
            }

            if self.engine.mode() == FeedMode::Streaming && ui.button("Freeze").clicked() {
                self.engine.set_mode(FeedMode::Static);
            }

            ui.with_layout(Layout::right_to_left(Align::Center), |ui| {
                if self.engine.is_settling() {
                    ui.spinner();
                }
                if let Some(outcome) = self.engine.last_outcome() {
                    let path = match outcome.path {
                        ReconcilePath::Full => "rebuilt",
                        ReconcilePath::Merge => "merged",
                    };
                    ui.label(format!(
                        "{path}: +{} ~{} -{}",
                        outcome.nodes.created, outcome.nodes.updated, outcome.nodes.removed
                    ));
                }
                if let Some(next_in) = self.engine.next_update_in() {
                    ui.label(format!("next update in {next_in:.0}s"));
                }
            });
        });

        if let Some(error) = self.engine.last_error() {
            ui.colored_label(Color32::from_rgb(248, 113, 113), format!("feed error: {error}"));
        }
    }

    pub(in crate::app) fn draw_entity_list(&mut self, ui: &mut Ui) {
        ui.heading("Entities");
        ui.add_space(4.0);
        if ui
            .add(egui::TextEdit::singleline(&mut self.search).hint_text("search symbol"))
            .changed()
        {
            self.entity_rows_visible = Self::INITIAL_ENTITY_ROWS;
        }
        ui.add_space(6.0);

        let Some(snapshot) = self.engine.snapshot().cloned() else {
            ui.label("No data yet.");
            return;
        };

        let ranked = ranked_entities(&snapshot.entities, &self.search);
        if ranked.is_empty() {
            ui.label("No entity matches the search.");
            return;
        }

        let row_count = ranked.len().min(self.entity_rows_visible);
        let mut should_load_more = false;
        let mut clicked = None;

        egui::ScrollArea::vertical()
            .id_salt("entity_rank_scroll")
            .auto_shrink([false, false])
            .show_rows(ui, 22.0, row_count, |ui, row_range| {
                if row_range.end + Self::ENTITY_PREFETCH_MARGIN >= row_count {
                    should_load_more = true;
                }

                for index in row_range {
                    let Some(entity) = ranked.get(index) else {
                        continue;
                    };
                    let selected = self.selected.as_deref() == Some(entity.id.as_str());
                    ui.horizontal(|ui| {
                        ui.colored_label(cluster_color(entity.cluster_id), "●");
                        let text = format!(
                            "{}  {:.3}",
                            short_label(entity.display_symbol()),
                            entity.influence_score
                        );
                        if ui.selectable_label(selected, text).clicked() {
                            clicked = Some(entity.id.clone());
                        }
                    });
                }
            });

        if should_load_more && row_count < ranked.len() {
            self.entity_rows_visible = (row_count + Self::ENTITY_PAGE_ROWS).min(ranked.len());
        }

        if let Some(id) = clicked {
            let next = (self.selected.as_deref() != Some(id.as_str())).then_some(id);
            self.set_selected(next);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entity(id: &str, influence: f64) -> Entity {
        Entity {
            id: id.to_string(),
            symbol: id.to_string(),
            influence_score: influence,
            ..Entity::default()
        }
    }

    #[test]
    fn ranks_by_influence_without_query() {
        let entities = vec![entity("TCS.NS", 0.2), entity("INFY.NS", 0.7), entity("HDFC.NS", 0.5)];
        let ids = ranked_entities(&entities, "  ")
            .into_iter()
            .map(|entity| entity.id.as_str())
            .collect::<Vec<_>>();
        assert_eq!(ids, vec!["INFY.NS", "HDFC.NS", "TCS.NS"]);
    }

    #[test]
    fn fuzzy_query_filters_case_insensitively() {
        let entities = vec![entity("TCS.NS", 0.2), entity("INFY.NS", 0.7)];
        let ids = ranked_entities(&entities, "infy")
            .into_iter()
            .map(|entity| entity.id.as_str())
            .collect::<Vec<_>>();
        assert_eq!(ids, vec!["INFY.NS"]);
    }
}
