use std::f32::consts::TAU;

use eframe::egui::{Vec2, vec2};

/// Deterministic unit direction for a pair of indices, used in place of a
/// random jiggle when two points coincide. Swapping the pair flips the sign.
pub fn fallback_direction(a: usize, b: usize) -> Vec2 {
    let (low, high) = if a <= b { (a, b) } else { (b, a) };
    let angle = ((low as f32) * 0.618_034 + (high as f32) * 0.414_214 + 0.37) * TAU;
    let direction = vec2(angle.cos(), angle.sin());
    if a <= b { direction } else { -direction }
}

pub fn format_percent(fraction: f64) -> String {
    format!("{:.1}%", fraction * 100.0)
}
