use eframe::egui::Vec2;

use crate::config::SimulationConfig;
use crate::util::fallback_direction;

use super::quadtree::{CellId, QuadTree};
use super::{Link, SimNode};

/// Offset used when two points coincide; small enough not to be visible.
const JIGGLE: f32 = 1e-3;
const DISTANCE_MIN_SQ: f32 = 1.0;

fn separated(delta: Vec2, a: usize, b: usize) -> Vec2 {
    if delta.length_sq() > f32::EPSILON {
        delta
    } else {
        fallback_direction(a, b) * JIGGLE
    }
}

/// Springs toward `link_distance`, split between the endpoints by degree.
pub(super) fn apply_links(
    nodes: &mut [SimNode],
    links: &[Link],
    degree: &[usize],
    config: &SimulationConfig,
    alpha: f32,
) {
    for link in links {
        let (source, target) = (link.source, link.target);
        if source == target {
            continue;
        }

        let delta = (nodes[target].position + nodes[target].velocity)
            - (nodes[source].position + nodes[source].velocity);
        let delta = separated(delta, source, target);
        let distance = delta.length();
        let strength = link.weight * config.link_strength_scale;
        let correction = delta * ((distance - config.link_distance) / distance * alpha * strength);

        let source_degree = degree[source] as f32;
        let target_degree = degree[target] as f32;
        let bias = source_degree / (source_degree + target_degree).max(1.0);

        nodes[target].velocity -= correction * bias;
        nodes[source].velocity += correction * (1.0 - bias);
    }
}

/// Parameters of the many-body pass for one tick.
#[derive(Clone, Copy)]
pub(super) struct Charge {
    pub(super) strength: f32,
    pub(super) alpha: f32,
    pub(super) theta_sq: f32,
    pub(super) distance_max_sq: f32,
}

impl Charge {
    fn push(self, delta: Vec2, distance_sq: f32, mass: f32) -> Vec2 {
        let distance_sq = if distance_sq < DISTANCE_MIN_SQ {
            (DISTANCE_MIN_SQ * distance_sq).sqrt().max(f32::EPSILON)
        } else {
            distance_sq
        };
        delta * (self.strength * mass * self.alpha / distance_sq)
    }
}

/// Barnes–Hut accumulation of the charge exerted on `index`. With a negative
/// strength the returned velocity change points away from other nodes.
pub(super) fn accumulate_charge(
    tree: &QuadTree,
    index: usize,
    positions: &[Vec2],
    charge: Charge,
    stack: &mut Vec<CellId>,
) -> Vec2 {
    let point = positions[index];
    let mut push = Vec2::ZERO;
    stack.clear();
    stack.push(QuadTree::ROOT);

    while let Some(id) = stack.pop() {
        let cell = tree.cell(id);
        if cell.is_leaf() {
            for &other in cell.points.iter().filter(|&&other| other != index) {
                let delta = separated(positions[other] - point, index, other);
                let distance_sq = delta.length_sq();
                if distance_sq < charge.distance_max_sq {
                    push += charge.push(delta, distance_sq, 1.0);
                }
            }
            continue;
        }

        let delta = cell.centroid - point;
        let distance_sq = delta.length_sq();
        let width = cell.bounds.width();
        let far = !cell.bounds.contains(point) && (width * width) / charge.theta_sq < distance_sq;
        if !far {
            stack.extend(tree.children(id));
        } else if distance_sq < charge.distance_max_sq {
            push += charge.push(delta, distance_sq, cell.count as f32);
        }
    }

    push
}

/// Per-axis pull toward the origin.
pub(super) fn apply_axis_pull(nodes: &mut [SimNode], strength: f32, alpha: f32) {
    for node in nodes {
        node.velocity -= node.position * (strength * alpha);
    }
}

/// Translates the layout so that its mean sits at the origin.
pub(super) fn recenter(nodes: &mut [SimNode]) {
    if nodes.is_empty() {
        return;
    }
    let mean = nodes
        .iter()
        .fold(Vec2::ZERO, |sum, node| sum + node.position)
        / nodes.len() as f32;
    if mean.length_sq() <= f32::EPSILON {
        return;
    }
    for node in nodes {
        node.position -= mean;
    }
}

#[derive(Clone, Copy)]
pub(super) struct Collision {
    pub(super) strength: f32,
    pub(super) reach_sq: f32,
}

fn resolve_overlap(
    first: usize,
    second: usize,
    predicted: &[Vec2],
    radii: &[f32],
    strength: f32,
    velocities: &mut [Vec2],
) {
    let reach = radii[first] + radii[second];
    let delta = predicted[first] - predicted[second];
    if delta.length_sq() >= reach * reach {
        return;
    }

    let delta = separated(delta, first, second);
    let distance = delta.length();
    let shove = delta * ((reach - distance) / distance * strength);

    let first_sq = radii[first] * radii[first];
    let second_sq = radii[second] * radii[second];
    let share = second_sq / (first_sq + second_sq).max(f32::EPSILON);

    velocities[first] += shove * share;
    velocities[second] -= shove * (1.0 - share);
}

/// Dual-tree walk over every pair of cells close enough to overlap.
pub(super) fn accumulate_collisions(
    tree: &QuadTree,
    first: CellId,
    second: CellId,
    predicted: &[Vec2],
    radii: &[f32],
    params: Collision,
    velocities: &mut [Vec2],
) {
    let (cell_a, cell_b) = (tree.cell(first), tree.cell(second));
    if cell_a.bounds.gap_sq(cell_b.bounds) > params.reach_sq {
        return;
    }

    let resolve = |a: usize, b: usize, velocities: &mut [Vec2]| {
        resolve_overlap(a, b, predicted, radii, params.strength, velocities);
    };

    match (cell_a.is_leaf(), cell_b.is_leaf()) {
        (true, true) if first == second => {
            for (offset, &a) in cell_a.points.iter().enumerate() {
                for &b in &cell_a.points[offset + 1..] {
                    resolve(a, b, velocities);
                }
            }
        }
        (true, true) => {
            for &a in &cell_a.points {
                for &b in &cell_b.points {
                    resolve(a, b, velocities);
                }
            }
        }
        _ if first == second => {
            let children = tree.children(first).collect::<Vec<_>>();
            for (offset, &child) in children.iter().enumerate() {
                for &other in &children[offset..] {
                    accumulate_collisions(tree, child, other, predicted, radii, params, velocities);
                }
            }
        }
        (false, true) => {
            for child in tree.children(first) {
                accumulate_collisions(tree, child, second, predicted, radii, params, velocities);
            }
        }
        (true, false) => {
            for child in tree.children(second) {
                accumulate_collisions(tree, first, child, predicted, radii, params, velocities);
            }
        }
        (false, false) if cell_a.bounds.half >= cell_b.bounds.half => {
            for child in tree.children(first) {
                accumulate_collisions(tree, child, second, predicted, radii, params, velocities);
            }
        }
        (false, false) => {
            for child in tree.children(second) {
                accumulate_collisions(tree, first, child, predicted, radii, params, velocities);
            }
        }
    }
}
