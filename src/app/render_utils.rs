use eframe::egui::{Color32, Painter, Pos2, Rect, Vec2};

/// Applies a 0..1 opacity on top of the color's own alpha.
pub(super) fn with_opacity(color: Color32, opacity: f32) -> Color32 {
    color.gamma_multiply(opacity.clamp(0.0, 1.0))
}

pub(super) fn draw_background(painter: &Painter, rect: Rect, pan: Vec2, zoom: f32) {
    painter.rect_filled(rect, 0.0, Color32::from_rgb(11, 16, 28));

    let step = (48.0 * zoom).clamp(24.0, 96.0);
    let dot = Color32::from_rgba_unmultiplied(58, 80, 118, 90);
    let origin = rect.center() + pan;
    let first = Pos2::new(
        rect.left() + (origin.x - rect.left()).rem_euclid(step),
        rect.top() + (origin.y - rect.top()).rem_euclid(step),
    );

    let mut y = first.y;
    while y <= rect.bottom() {
        let mut x = first.x;
        while x <= rect.right() {
            painter.circle_filled(Pos2::new(x, y), 1.2, dot);
            x += step;
        }
        y += step;
    }
}

pub(super) fn circle_visible(rect: Rect, position: Pos2, radius: f32) -> bool {
    rect.expand(radius).contains(position)
}

/// Clips the segment against the padded canvas (Liang-Barsky).
pub(super) fn edge_visible(rect: Rect, start: Pos2, end: Pos2, padding: f32) -> bool {
    let bounds = rect.expand(padding);
    let delta = end - start;
    let (mut enter, mut exit) = (0.0_f32, 1.0_f32);

    for (p, q) in [
        (-delta.x, start.x - bounds.left()),
        (delta.x, bounds.right() - start.x),
        (-delta.y, start.y - bounds.top()),
        (delta.y, bounds.bottom() - start.y),
    ] {
        if p == 0.0 {
            if q < 0.0 {
                return false;
            }
            continue;
        }
        let t = q / p;
        if p < 0.0 {
            enter = enter.max(t);
        } else {
            exit = exit.min(t);
        }
        if enter > exit {
            return false;
        }
    }
    true
}
