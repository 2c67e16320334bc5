use eframe::egui::{self, Align2, Color32, FontId, Sense, Stroke, Ui, vec2};

use mris_graph::util::format_percent;

use super::super::ViewModel;
use super::super::render_utils::{circle_visible, draw_background, edge_visible, with_opacity};

const GLOW_PADDING: f32 = 5.0;
const LABEL_OFFSET: f32 = 14.0;
const SELECTED_RING: Color32 = Color32::from_rgb(245, 206, 93);

impl ViewModel {
    pub(in crate::app) fn draw_graph(&mut self, ui: &mut Ui) {
        let (rect, response) = ui.allocate_exact_size(ui.available_size(), Sense::click_and_drag());
        let painter = ui.painter_at(rect);
        let now = ui.input(|input| input.time);

        self.handle_graph_zoom(ui, rect, &response);
        self.handle_graph_pan(&response);
        self.handle_graph_pointer(ui, rect, &response, now);

        if self.engine.frame(now) || response.dragged() {
            ui.ctx().request_repaint();
        }

        let view = *self.engine.view();
        draw_background(&painter, rect, view.pan, view.scale);

        let scene = self.engine.scene();
        let hover = self.engine.hover();

        for edge in scene.edges() {
            let Some(style) = scene.edge_style(&edge.key, hover, now) else {
                continue;
            };
            let start = view.world_to_screen(rect, style.from);
            let end = view.world_to_screen(rect, style.to);
            if style.opacity <= 0.0 || !edge_visible(rect, start, end, 2.0) {
                continue;
            }
            painter.line_segment(
                [start, end],
                Stroke::new(style.width * view.scale, with_opacity(style.color, style.opacity)),
            );
        }

        for node in scene.nodes() {
            let Some(style) = scene.node_style(&node.id, hover, now) else {
                continue;
            };
            let position = view.world_to_screen(rect, style.position);
            let radius = style.radius * view.scale;
            if style.opacity <= 0.0 || !circle_visible(rect, position, radius + GLOW_PADDING) {
                continue;
            }

            if style.glow_opacity > 0.0 {
                painter.circle_filled(
                    position,
                    radius + GLOW_PADDING * view.scale,
                    with_opacity(style.fill, style.glow_opacity * style.opacity),
                );
            }

            painter.circle_filled(position, radius, with_opacity(style.fill, style.opacity));
            let ring = if style.selected {
                Stroke::new(2.5, with_opacity(SELECTED_RING, style.opacity))
            } else {
                Stroke::new(1.0, with_opacity(Color32::from_rgb(15, 20, 32), style.opacity))
            };
            painter.circle_stroke(position, radius, ring);

            let label_opacity = style.label_opacity * style.opacity;
            if label_opacity > 0.0 && view.scale > 0.35 {
                painter.text(
                    position + vec2(0.0, (style.radius + LABEL_OFFSET) * view.scale),
                    Align2::CENTER_CENTER,
                    &node.label,
                    FontId::proportional((11.0 * view.scale.sqrt()).clamp(8.0, 16.0)),
                    with_opacity(Color32::from_gray(220), label_opacity),
                );
            }
        }

        if let Some(pointer) = response.hover_pos()
            && !self.engine.is_dragging()
            && let Some(tooltip) = self.engine.tooltip(pointer)
        {
            let text = format!(
                "{}\ninfluence {}\nconnections {}",
                tooltip.symbol,
                format_percent(tooltip.influence),
                tooltip.connections
            );
            let galley = painter.layout_no_wrap(text, FontId::proportional(13.0), Color32::from_gray(240));
            let frame = egui::Rect::from_min_size(
                tooltip.anchor - vec2(0.0, galley.size().y),
                galley.size() + vec2(16.0, 12.0),
            );
            painter.rect_filled(frame, 6.0, Color32::from_rgba_unmultiplied(17, 24, 39, 235));
            painter.galley(frame.min + vec2(8.0, 6.0), galley, Color32::from_gray(240));
        }
    }
}
