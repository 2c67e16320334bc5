use eframe::egui::{self, Rect, Ui};

use super::super::ViewModel;

impl ViewModel {
    pub(in crate::app) fn handle_graph_zoom(
        &mut self,
        ui: &Ui,
        rect: Rect,
        response: &egui::Response,
    ) {
        if !response.hovered() {
            return;
        }

        let scroll = ui.input(|input| input.raw_scroll_delta.y);
        if scroll.abs() <= f32::EPSILON {
            return;
        }

        let pointer = ui
            .input(|input| input.pointer.hover_pos())
            .unwrap_or_else(|| rect.center());
        let zoom_factor = (1.0 + (scroll * 0.0018)).clamp(0.85, 1.15);
        self.engine.zoom(rect, pointer, zoom_factor);
    }

    pub(in crate::app) fn handle_graph_pan(&mut self, response: &egui::Response) {
        if response.dragged_by(egui::PointerButton::Secondary)
            || response.dragged_by(egui::PointerButton::Middle)
        {
            self.engine.pan(response.drag_delta());
        }
    }

    /// Primary drag on an entity pins it; primary drag on empty canvas pans.
    pub(in crate::app) fn handle_graph_pointer(
        &mut self,
        ui: &Ui,
        rect: Rect,
        response: &egui::Response,
        now: f64,
    ) {
        let hover = response.hover_pos();
        if !self.engine.is_dragging() {
            self.engine.pointer_moved(rect, hover, now);
        }

        if response.drag_started_by(egui::PointerButton::Primary)
            && let Some(origin) = ui.input(|input| input.pointer.press_origin())
        {
            self.engine.press(rect, origin);
        }

        if response.dragged_by(egui::PointerButton::Primary) {
            match (self.engine.is_dragging(), response.interact_pointer_pos()) {
                (true, Some(pointer)) => {
                    self.engine.drag(rect, pointer);
                }
                (false, _) => self.engine.pan(response.drag_delta()),
                _ => {}
            }
        }

        if response.drag_stopped() {
            self.engine.release();
        }

        if response.clicked_by(egui::PointerButton::Primary)
            && let Some(pointer) = response.interact_pointer_pos()
        {
            self.engine.click(rect, pointer);
        }

        if response.double_clicked() {
            self.engine.reset_view();
        }

        if self.engine.hover().is_some() || self.engine.is_dragging() {
            ui.output_mut(|output| {
                output.cursor_icon = if self.engine.is_dragging() {
                    egui::CursorIcon::Grabbing
                } else {
                    egui::CursorIcon::PointingHand
                };
            });
        }
    }
}
