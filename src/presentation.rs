use eframe::egui::Color32;

pub const MIN_RADIUS: f32 = 6.0;
pub const MAX_RADIUS: f32 = 28.0;

pub const EDGE_WIDTH_RANGE: (f32, f32) = (0.5, 3.5);
pub const EDGE_OPACITY_RANGE: (f32, f32) = (0.08, 0.45);

pub const EDGE_BASE_COLOR: Color32 = Color32::from_rgb(0x4b, 0x6a, 0x9b);

pub const CLUSTER_PALETTE: [Color32; 12] = [
    Color32::from_rgb(0x3b, 0x82, 0xf6),
    Color32::from_rgb(0xf4, 0x3f, 0x5e),
    Color32::from_rgb(0x10, 0xb9, 0x81),
    Color32::from_rgb(0xf5, 0x9e, 0x0b),
    Color32::from_rgb(0x8b, 0x5c, 0xf6),
    Color32::from_rgb(0x06, 0xb6, 0xd4),
    Color32::from_rgb(0xec, 0x48, 0x99),
    Color32::from_rgb(0x14, 0xb8, 0xa6),
    Color32::from_rgb(0xf9, 0x73, 0x16),
    Color32::from_rgb(0xa7, 0x8b, 0xfa),
    Color32::from_rgb(0x22, 0xd3, 0xee),
    Color32::from_rgb(0xfb, 0x92, 0x3c),
];

const EXCHANGE_SUFFIXES: [&str; 4] = [".NS", ".L", ".DE", ".HK"];

pub fn cluster_color(cluster_id: i64) -> Color32 {
    let slot = cluster_id.rem_euclid(CLUSTER_PALETTE.len() as i64) as usize;
    CLUSTER_PALETTE[slot]
}

pub fn node_radius(influence_score: f64) -> f32 {
    let radius = MIN_RADIUS + (influence_score as f32 * 24.0);
    if radius.is_nan() {
        return MIN_RADIUS;
    }
    radius.clamp(MIN_RADIUS, MAX_RADIUS)
}

/// Symbol without its exchange suffix, e.g. `RELIANCE.NS` -> `RELIANCE`.
pub fn short_label(symbol: &str) -> String {
    let mut label = symbol.to_string();
    for suffix in EXCHANGE_SUFFIXES {
        label = label.replacen(suffix, "", 1);
    }
    label
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct LinearScale {
    pub domain: (f32, f32),
    pub range: (f32, f32),
}

impl LinearScale {
    pub fn new(domain: (f32, f32), range: (f32, f32)) -> Self {
        Self { domain, range }
    }

    pub fn map(&self, value: f32) -> f32 {
        let span = self.domain.1 - self.domain.0;
        if span.abs() <= f32::EPSILON {
            return self.range.0;
        }
        let t = (value - self.domain.0) / span;
        self.range.0 + (self.range.1 - self.range.0) * t
    }
}

/// Stroke scales for one snapshot; rebuilt whenever relationships change.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct EdgeScales {
    pub width: LinearScale,
    pub opacity: LinearScale,
}

impl EdgeScales {
    pub fn from_weights(weights: impl IntoIterator<Item = f32>) -> Self {
        let max_weight = weights
            .into_iter()
            .filter(|weight| weight.is_finite())
            .fold(None, |max: Option<f32>, weight| {
                Some(max.map_or(weight, |max| max.max(weight)))
            })
            .filter(|max| *max > 0.0)
            .unwrap_or(1.0);

        Self {
            width: LinearScale::new((0.0, max_weight), EDGE_WIDTH_RANGE),
            opacity: LinearScale::new((0.0, max_weight), EDGE_OPACITY_RANGE),
        }
    }

    pub fn max_weight(&self) -> f32 {
        self.opacity.domain.1
    }
}

impl Default for EdgeScales {
    fn default() -> Self {
        Self::from_weights(std::iter::empty())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn radius_is_clamped_and_monotonic() {
        assert_eq!(node_radius(0.0), 6.0);
        assert_eq!(node_radius(1.0), 28.0);
        assert_eq!(node_radius(-3.0), 6.0);

        let mut previous = node_radius(0.0);
        for step in 1..=100 {
            let radius = node_radius(step as f64 / 100.0);
            assert!(radius >= previous);
            assert!((MIN_RADIUS..=MAX_RADIUS).contains(&radius));
            previous = radius;
        }
    }

    #[test]
    fn cluster_colors_wrap_around_the_palette() {
        assert_eq!(cluster_color(0), cluster_color(12));
        assert_eq!(cluster_color(5), CLUSTER_PALETTE[5]);
        assert_eq!(cluster_color(-1), CLUSTER_PALETTE[11]);
    }

    #[test]
    fn edge_scales_follow_max_weight() {
        let scales = EdgeScales::from_weights([0.2, 0.9]);
        assert_eq!(scales.opacity.domain, (0.0, 0.9));
        assert!((scales.opacity.map(0.9) - 0.45).abs() < 1e-6);
        assert!((scales.opacity.map(0.0) - 0.08).abs() < 1e-6);
        assert!((scales.width.map(0.9) - 3.5).abs() < 1e-6);
        assert!((scales.width.map(0.0) - 0.5).abs() < 1e-6);
    }

    #[test]
    fn edge_scales_default_to_unit_domain() {
        assert_eq!(EdgeScales::default().max_weight(), 1.0);
        assert_eq!(EdgeScales::from_weights([0.0, 0.0]).max_weight(), 1.0);
    }

    #[test]
    fn short_labels_drop_exchange_suffix() {
        assert_eq!(short_label("RELIANCE.NS"), "RELIANCE");
        assert_eq!(short_label("SHEL.L"), "SHEL");
        assert_eq!(short_label("AAPL"), "AAPL");
    }
}
