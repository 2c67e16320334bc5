use std::collections::{HashMap, HashSet};
use std::hash::Hash;

use eframe::egui::{Color32, Vec2};

use crate::config::TransitionConfig;
use crate::interaction::HoverFocus;
use crate::presentation::{EDGE_BASE_COLOR, EdgeScales};
use crate::reconcile::{EdgeRecord, EntityRecord, LayoutSession};

#[derive(Clone, Copy, Debug, PartialEq)]
pub enum Easing {
    Linear,
    CubicInOut,
    CubicOut,
}

impl Easing {
    fn apply(self, t: f32) -> f32 {
        match self {
            Self::Linear => t,
            Self::CubicOut => 1.0 - (1.0 - t).powi(3),
            Self::CubicInOut => {
                if t < 0.5 {
                    4.0 * t * t * t
                } else {
                    1.0 - (-2.0 * t + 2.0).powi(3) / 2.0
                }
            }
        }
    }
}

pub trait Lerp: Copy {
    fn lerp(self, other: Self, t: f32) -> Self;
}

impl Lerp for f32 {
    fn lerp(self, other: Self, t: f32) -> Self {
        self + (other - self) * t
    }
}

impl Lerp for Color32 {
    fn lerp(self, other: Self, t: f32) -> Self {
        let channel = |a: u8, b: u8| (a as f32 + (b as f32 - a as f32) * t).round() as u8;
        Color32::from_rgba_unmultiplied(
            channel(self.r(), other.r()),
            channel(self.g(), other.g()),
            channel(self.b(), other.b()),
            channel(self.a(), other.a()),
        )
    }
}

/// A value animating from `from` to `to` over a time window. Times are in
/// seconds on the engine clock.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Transition<T> {
    from: T,
    to: T,
    start: f64,
    duration: f64,
    easing: Easing,
}

impl<T: Lerp> Transition<T> {
    pub fn settled(value: T) -> Self {
        Self {
            from: value,
            to: value,
            start: 0.0,
            duration: 0.0,
            easing: Easing::Linear,
        }
    }

    pub fn animate(from: T, to: T, now: f64, delay_ms: u32, duration_ms: u32, easing: Easing) -> Self {
        Self {
            from,
            to,
            start: now + f64::from(delay_ms) / 1000.0,
            duration: f64::from(duration_ms) / 1000.0,
            easing,
        }
    }

    pub fn value_at(&self, now: f64) -> T {
        if now <= self.start {
            return self.from;
        }
        if self.duration <= 0.0 || now >= self.start + self.duration {
            return self.to;
        }
        let t = ((now - self.start) / self.duration) as f32;
        self.from.lerp(self.to, self.easing.apply(t))
    }

    /// Continues from the value shown at `now` toward a new target.
    pub fn retarget(&mut self, to: T, now: f64, duration_ms: u32) {
        *self = Self::animate(
            self.value_at(now),
            to,
            now,
            0,
            duration_ms,
            Easing::CubicInOut,
        );
    }

    pub fn target(&self) -> T {
        self.to
    }

    pub fn finished(&self, now: f64) -> bool {
        now >= self.start + self.duration
    }
}

/// Partition of a keyed item set against the previous one.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct KeyedDiff<K> {
    pub created: Vec<K>,
    pub updated: Vec<K>,
    pub removed: Vec<K>,
}

impl<K: Eq + Hash + Clone> KeyedDiff<K> {
    /// `created` and `updated` follow the order of `next`.
    pub fn compute<'a>(
        previous: impl IntoIterator<Item = &'a K>,
        next: impl IntoIterator<Item = &'a K>,
    ) -> Self
    where
        K: 'a,
    {
        let previous = previous.into_iter().collect::<Vec<_>>();
        let previous_set = previous.iter().copied().collect::<HashSet<_>>();
        let mut next_set = HashSet::new();
        let mut created = Vec::new();
        let mut updated = Vec::new();

        for key in next {
            if !next_set.insert(key) {
                continue;
            }
            if previous_set.contains(key) {
                updated.push(key.clone());
            } else {
                created.push(key.clone());
            }
        }

        let removed = previous
            .into_iter()
            .filter(|key| !next_set.contains(key))
            .cloned()
            .collect();

        Self {
            created,
            updated,
            removed,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct EdgeKey {
    pub source: String,
    pub target: String,
}

impl EdgeKey {
    pub fn new(source: impl Into<String>, target: impl Into<String>) -> Self {
        Self {
            source: source.into(),
            target: target.into(),
        }
    }

    pub fn touches(&self, id: &str) -> bool {
        self.source == id || self.target == id
    }
}

#[derive(Clone, Debug)]
pub struct NodeVisual {
    pub id: String,
    pub label: String,
    pub position: Vec2,
    pub radius: Transition<f32>,
    pub fill: Transition<Color32>,
    pub opacity: Transition<f32>,
    pub label_opacity: Transition<f32>,
    pub exiting: bool,
}

#[derive(Clone, Debug)]
pub struct EdgeVisual {
    pub key: EdgeKey,
    pub weight: f32,
    pub endpoints: (Vec2, Vec2),
    pub width: Transition<f32>,
    pub opacity: Transition<f32>,
    pub exiting: bool,
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct NodeStyle {
    pub position: Vec2,
    pub radius: f32,
    pub fill: Color32,
    pub opacity: f32,
    pub label_opacity: f32,
    pub glow_opacity: f32,
    pub selected: bool,
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct EdgeStyle {
    pub from: Vec2,
    pub to: Vec2,
    pub width: f32,
    pub color: Color32,
    pub opacity: f32,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct SceneDelta {
    pub created: usize,
    pub updated: usize,
    pub removed: usize,
}

const HOVER_EDGE_OPACITY: f32 = 0.8;
const HOVER_EDGE_DIM: f32 = 0.3;
const HOVER_NODE_DIM: f32 = 0.2;
const HOVER_GLOW_OPACITY: f32 = 0.15;

#[derive(Default)]
pub struct Scene {
    nodes: HashMap<String, NodeVisual>,
    edges: HashMap<EdgeKey, EdgeVisual>,
    draw_order: Vec<String>,
    selected: Option<String>,
    glow: Option<(String, Transition<f32>)>,
}

impl Scene {
    pub fn clear(&mut self) {
        self.nodes.clear();
        self.edges.clear();
        self.draw_order.clear();
        self.glow = None;
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty() && self.edges.is_empty()
    }

    pub fn node(&self, id: &str) -> Option<&NodeVisual> {
        self.nodes.get(id)
    }

    pub fn edge(&self, key: &EdgeKey) -> Option<&EdgeVisual> {
        self.edges.get(key)
    }

    /// Entities in draw order, exiting ones included.
    pub fn nodes(&self) -> impl Iterator<Item = &NodeVisual> {
        self.draw_order.iter().filter_map(|id| self.nodes.get(id))
    }

    pub fn edges(&self) -> impl Iterator<Item = &EdgeVisual> {
        self.edges.values()
    }

    pub fn live_node_ids(&self) -> impl Iterator<Item = &str> {
        self.nodes()
            .filter(|node| !node.exiting)
            .map(|node| node.id.as_str())
    }

    /// Radius `id` is painted at `now`; `None` while it is absent, exiting or
    /// still invisible.
    pub fn drawn_radius(&self, id: &str, now: f64) -> Option<f32> {
        self.nodes
            .get(id)
            .filter(|node| !node.exiting)
            .map(|node| node.radius.value_at(now))
            .filter(|radius| *radius > 0.0)
    }

    pub fn set_selected(&mut self, selected: Option<&str>) {
        self.selected = selected.map(str::to_string);
    }

    pub fn selected(&self) -> Option<&str> {
        self.selected.as_deref()
    }

    /// Fresh scene with entrance transitions, staggered by entity order.
    pub fn rebuild(
        &mut self,
        entities: &[EntityRecord],
        edges: &[EdgeRecord],
        scales: &EdgeScales,
        now: f64,
        timing: &TransitionConfig,
    ) {
        self.clear();

        for (order, entity) in entities.iter().enumerate() {
            let stagger = timing.enter_stagger_ms.saturating_mul(order as u32);
            self.nodes.insert(
                entity.id().to_string(),
                NodeVisual {
                    id: entity.id().to_string(),
                    label: entity.label.clone(),
                    position: Vec2::ZERO,
                    radius: Transition::animate(
                        0.0,
                        entity.radius,
                        now,
                        stagger,
                        timing.enter_radius_ms,
                        Easing::CubicOut,
                    ),
                    fill: Transition::settled(entity.color),
                    opacity: Transition::settled(1.0),
                    label_opacity: Transition::animate(
                        0.0,
                        1.0,
                        now,
                        timing.enter_label_delay_ms.saturating_add(stagger),
                        timing.enter_label_ms,
                        Easing::CubicInOut,
                    ),
                    exiting: false,
                },
            );
            self.draw_order.push(entity.id().to_string());
        }

        for edge in edges {
            self.edges.insert(
                edge.key.clone(),
                EdgeVisual {
                    key: edge.key.clone(),
                    weight: edge.weight,
                    endpoints: (Vec2::ZERO, Vec2::ZERO),
                    width: Transition::settled(scales.width.map(edge.weight)),
                    opacity: Transition::animate(
                        0.0,
                        scales.opacity.map(edge.weight),
                        now,
                        timing.enter_edge_delay_ms,
                        timing.enter_edge_ms,
                        Easing::CubicInOut,
                    ),
                    exiting: false,
                },
            );
        }
    }

    /// Keyed join against the new entity and relationship sets. Elements that
    /// are still fading out count as present, so a key that comes back is
    /// revived instead of duplicated.
    pub fn reconcile(
        &mut self,
        entities: &[EntityRecord],
        edges: &[EdgeRecord],
        scales: &EdgeScales,
        now: f64,
        timing: &TransitionConfig,
    ) -> (SceneDelta, SceneDelta) {
        let node_keys = entities
            .iter()
            .map(|entity| entity.id().to_string())
            .collect::<Vec<_>>();
        let node_diff = KeyedDiff::compute(self.draw_order.iter(), node_keys.iter());

        let mut nodes_removed = 0;
        for id in &node_diff.removed {
            if let Some(node) = self.nodes.get_mut(id)
                && !node.exiting
            {
                node.exiting = true;
                node.opacity.retarget(0.0, now, timing.merge_exit_ms);
                nodes_removed += 1;
            }
        }

        let by_id = entities
            .iter()
            .map(|entity| (entity.id(), entity))
            .collect::<HashMap<_, _>>();

        for id in &node_diff.updated {
            let (Some(node), Some(entity)) = (self.nodes.get_mut(id), by_id.get(id.as_str())) else {
                continue;
            };
            node.exiting = false;
            node.label = entity.label.clone();
            node.radius.retarget(entity.radius, now, timing.merge_update_ms);
            node.fill.retarget(entity.color, now, timing.merge_update_ms);
            node.opacity.retarget(1.0, now, timing.merge_update_ms);
            node.label_opacity.retarget(1.0, now, timing.merge_update_ms);
        }

        for id in &node_diff.created {
            let Some(entity) = by_id.get(id.as_str()) else {
                continue;
            };
            self.nodes.insert(
                id.clone(),
                NodeVisual {
                    id: id.clone(),
                    label: entity.label.clone(),
                    position: Vec2::ZERO,
                    radius: Transition::settled(entity.radius),
                    fill: Transition::settled(entity.color),
                    opacity: Transition::animate(
                        0.0,
                        1.0,
                        now,
                        0,
                        timing.merge_update_ms,
                        Easing::CubicInOut,
                    ),
                    label_opacity: Transition::settled(1.0),
                    exiting: false,
                },
            );
        }

        // Live entities in snapshot order, exiting ones stay underneath.
        let mut draw_order = node_diff
            .removed
            .iter()
            .filter(|id| self.nodes.contains_key(*id))
            .cloned()
            .collect::<Vec<_>>();
        draw_order.extend(node_keys);
        self.draw_order = draw_order;

        let edge_keys = edges.iter().map(|edge| edge.key.clone()).collect::<Vec<_>>();
        let edge_diff = KeyedDiff::compute(self.edges.keys(), edge_keys.iter());

        let mut edges_removed = 0;
        for key in &edge_diff.removed {
            if let Some(edge) = self.edges.get_mut(key)
                && !edge.exiting
            {
                edge.exiting = true;
                edge.opacity.retarget(0.0, now, timing.merge_exit_ms);
                edges_removed += 1;
            }
        }

        for edge in edges {
            let width = scales.width.map(edge.weight);
            let opacity = scales.opacity.map(edge.weight);
            match self.edges.get_mut(&edge.key) {
                Some(visual) => {
                    visual.exiting = false;
                    visual.weight = edge.weight;
                    visual.width.retarget(width, now, timing.merge_update_ms);
                    visual.opacity.retarget(opacity, now, timing.merge_update_ms);
                }
                None => {
                    self.edges.insert(
                        edge.key.clone(),
                        EdgeVisual {
                            key: edge.key.clone(),
                            weight: edge.weight,
                            endpoints: (Vec2::ZERO, Vec2::ZERO),
                            width: Transition::animate(
                                0.0,
                                width,
                                now,
                                0,
                                timing.merge_update_ms,
                                Easing::CubicInOut,
                            ),
                            opacity: Transition::animate(
                                0.0,
                                opacity,
                                now,
                                0,
                                timing.merge_update_ms,
                                Easing::CubicInOut,
                            ),
                            exiting: false,
                        },
                    );
                }
            }
        }

        if let Some((id, _)) = &self.glow
            && !self.nodes.get(id).is_some_and(|node| !node.exiting)
        {
            self.glow = None;
        }

        (
            SceneDelta {
                created: node_diff.created.len(),
                updated: node_diff.updated.len(),
                removed: nodes_removed,
            },
            SceneDelta {
                created: edge_diff.created.len(),
                updated: edge_diff.updated.len(),
                removed: edges_removed,
            },
        )
    }

    /// Tick handler: copies simulated positions onto live elements. Exiting
    /// elements keep the last position they were drawn at.
    pub fn sync_positions(&mut self, session: &LayoutSession) {
        for (entity, node) in session.entities.iter().zip(session.simulation.nodes()) {
            if let Some(visual) = self.nodes.get_mut(entity.id())
                && !visual.exiting
            {
                visual.position = node.position;
            }
        }

        for edge in &session.edges {
            let nodes = session.simulation.nodes();
            let (Some(source), Some(target)) = (nodes.get(edge.source), nodes.get(edge.target)) else {
                continue;
            };
            if let Some(visual) = self.edges.get_mut(&edge.key)
                && !visual.exiting
            {
                visual.endpoints = (source.position, target.position);
            }
        }
    }

    pub fn advance(&mut self, now: f64) -> usize {
        let before = self.nodes.len() + self.edges.len();
        self.nodes
            .retain(|_, node| !(node.exiting && node.opacity.finished(now)));
        self.edges
            .retain(|_, edge| !(edge.exiting && edge.opacity.finished(now)));
        let nodes = &self.nodes;
        self.draw_order.retain(|id| nodes.contains_key(id));
        before - (self.nodes.len() + self.edges.len())
    }

    pub fn animating(&self, now: f64) -> bool {
        let glow = self
            .glow
            .as_ref()
            .is_some_and(|(_, glow)| !glow.finished(now));
        glow || self.nodes.values().any(|node| {
            !(node.radius.finished(now)
                && node.fill.finished(now)
                && node.opacity.finished(now)
                && node.label_opacity.finished(now))
        }) || self
            .edges
            .values()
            .any(|edge| !(edge.width.finished(now) && edge.opacity.finished(now)))
    }

    pub fn set_glow(&mut self, id: Option<&str>, now: f64, duration_ms: u32) {
        let Some(id) = id else {
            if let Some((_, glow)) = self.glow.as_mut() {
                glow.retarget(0.0, now, duration_ms);
            }
            return;
        };

        if let Some((current, glow)) = self.glow.as_mut()
            && current.as_str() == id
        {
            glow.retarget(HOVER_GLOW_OPACITY, now, duration_ms);
            return;
        }

        self.glow = Some((
            id.to_string(),
            Transition::animate(0.0, HOVER_GLOW_OPACITY, now, 0, duration_ms, Easing::CubicInOut),
        ));
    }

    pub fn node_style(&self, id: &str, hover: Option<&HoverFocus>, now: f64) -> Option<NodeStyle> {
        let node = self.nodes.get(id)?;
        let base_opacity = node.opacity.value_at(now);
        let opacity = match hover {
            Some(focus) if !focus.includes(id) => base_opacity * HOVER_NODE_DIM,
            _ => base_opacity,
        };
        let glow_opacity = match &self.glow {
            Some((glow_id, glow)) if glow_id == id => glow.value_at(now),
            _ => 0.0,
        };

        Some(NodeStyle {
            position: node.position,
            radius: node.radius.value_at(now).max(0.0),
            fill: node.fill.value_at(now),
            opacity,
            label_opacity: node.label_opacity.value_at(now),
            glow_opacity,
            selected: self.selected.as_deref() == Some(id),
        })
    }

    pub fn edge_style(
        &self,
        key: &EdgeKey,
        hover: Option<&HoverFocus>,
        now: f64,
    ) -> Option<EdgeStyle> {
        let edge = self.edges.get(key)?;
        let base_opacity = edge.opacity.value_at(now);
        let (color, opacity) = match hover {
            Some(focus) if key.touches(&focus.entity) && !edge.exiting => {
                (focus.color, HOVER_EDGE_OPACITY)
            }
            Some(_) => (EDGE_BASE_COLOR, base_opacity * HOVER_EDGE_DIM),
            None => (EDGE_BASE_COLOR, base_opacity),
        };

        Some(EdgeStyle {
            from: edge.endpoints.0,
            to: edge.endpoints.1,
            width: edge.width.value_at(now).max(0.0),
            color,
            opacity,
        })
    }
}
