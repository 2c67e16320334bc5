mod forces;
mod quadtree;

use std::collections::HashMap;
use std::f32::consts::PI;

use eframe::egui::{Vec2, vec2};

use crate::config::SimulationConfig;
use forces::{
    Charge, Collision, accumulate_charge, accumulate_collisions, apply_axis_pull, apply_links,
    recenter,
};
use quadtree::{CellId, QuadTree};

const INITIAL_RADIUS: f32 = 10.0;

/// Entry state for a node; `None` fields are filled in by the simulation.
#[derive(Clone, Debug, PartialEq)]
pub struct NodeSeed {
    pub id: String,
    pub radius: f32,
    pub position: Option<Vec2>,
    pub velocity: Option<Vec2>,
    pub pin: Option<Vec2>,
}

impl NodeSeed {
    pub fn fresh(id: impl Into<String>, radius: f32) -> Self {
        Self {
            id: id.into(),
            radius,
            position: None,
            velocity: None,
            pin: None,
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct SimNode {
    pub id: String,
    pub radius: f32,
    pub position: Vec2,
    pub velocity: Vec2,
    pub pin: Option<Vec2>,
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Link {
    pub source: usize,
    pub target: usize,
    pub weight: f32,
}

#[derive(Default)]
struct Scratch {
    positions: Vec<Vec2>,
    predicted: Vec<Vec2>,
    radii: Vec<f32>,
    velocities: Vec<Vec2>,
    degree: Vec<usize>,
    stack: Vec<CellId>,
}

pub struct Simulation {
    config: SimulationConfig,
    nodes: Vec<SimNode>,
    links: Vec<Link>,
    index_by_id: HashMap<String, usize>,
    alpha: f32,
    alpha_target: f32,
    running: bool,
    scratch: Scratch,
}

impl Simulation {
    pub fn new(config: SimulationConfig) -> Self {
        Self {
            config,
            nodes: Vec::new(),
            links: Vec::new(),
            index_by_id: HashMap::new(),
            alpha: config.alpha_initial,
            alpha_target: 0.0,
            running: false,
            scratch: Scratch::default(),
        }
    }

    pub fn config(&self) -> &SimulationConfig {
        &self.config
    }

    /// Replaces the node set. Nodes without a position are placed on a
    /// phyllotaxis spiral by their index; links are cleared because their
    /// indices refer to the old set.
    pub fn set_nodes(&mut self, seeds: Vec<NodeSeed>) {
        let golden_angle = PI * (3.0 - 5.0_f32.sqrt());
        self.index_by_id.clear();
        self.nodes = seeds
            .into_iter()
            .enumerate()
            .map(|(index, seed)| {
                let position = seed
                    .position
                    .filter(|position| position.is_finite())
                    .unwrap_or_else(|| {
                        let radius = INITIAL_RADIUS * (0.5 + index as f32).sqrt();
                        let angle = index as f32 * golden_angle;
                        vec2(radius * angle.cos(), radius * angle.sin())
                    });
                let velocity = seed
                    .velocity
                    .filter(|velocity| velocity.is_finite())
                    .unwrap_or(Vec2::ZERO);
                SimNode {
                    id: seed.id,
                    radius: seed.radius,
                    position,
                    velocity,
                    pin: seed.pin.filter(|pin| pin.is_finite()),
                }
            })
            .collect();

        for (index, node) in self.nodes.iter().enumerate() {
            self.index_by_id.entry(node.id.clone()).or_insert(index);
        }
        self.links.clear();
    }

    /// Replaces the links; any link pointing outside the node set is dropped.
    pub fn set_links(&mut self, links: impl IntoIterator<Item = Link>) {
        let node_count = self.nodes.len();
        self.links = links
            .into_iter()
            .filter(|link| {
                link.source < node_count && link.target < node_count && link.weight.is_finite()
            })
            .collect();

        self.scratch.degree.clear();
        self.scratch.degree.resize(node_count, 0);
        for link in &self.links {
            self.scratch.degree[link.source] += 1;
            self.scratch.degree[link.target] += 1;
        }
    }

    pub fn nodes(&self) -> &[SimNode] {
        &self.nodes
    }

    pub fn links(&self) -> &[Link] {
        &self.links
    }

    pub fn index_of(&self, id: &str) -> Option<usize> {
        self.index_by_id.get(id).copied()
    }

    pub fn node(&self, id: &str) -> Option<&SimNode> {
        self.index_of(id).map(|index| &self.nodes[index])
    }

    pub fn alpha(&self) -> f32 {
        self.alpha
    }

    pub fn set_alpha(&mut self, alpha: f32) {
        self.alpha = alpha.max(0.0);
    }

    pub fn alpha_target(&self) -> f32 {
        self.alpha_target
    }

    pub fn set_alpha_target(&mut self, target: f32) {
        self.alpha_target = target.max(0.0);
    }

    pub fn restart(&mut self) {
        self.running = true;
    }

    pub fn stop(&mut self) {
        self.running = false;
    }

    pub fn is_running(&self) -> bool {
        self.running
    }

    pub fn pin(&mut self, id: &str, position: Vec2) -> bool {
        match self.index_of(id) {
            Some(index) if position.is_finite() => {
                self.nodes[index].pin = Some(position);
                true
            }
            _ => false,
        }
    }

    pub fn unpin(&mut self, id: &str) -> bool {
        match self.index_of(id) {
            Some(index) => self.nodes[index].pin.take().is_some(),
            None => false,
        }
    }

    /// One scheduled tick. Does nothing once the loop has stopped; stops the
    /// loop when alpha has cooled below `alpha_min`.
    pub fn step(&mut self) -> bool {
        if !self.running {
            return false;
        }
        self.tick();
        if self.alpha < self.config.alpha_min {
            self.running = false;
        }
        true
    }

    /// Advances the layout by exactly one integration step.
    pub fn tick(&mut self) {
        self.alpha += (self.alpha_target - self.alpha) * self.config.alpha_decay;
        if self.nodes.is_empty() {
            return;
        }

        let alpha = self.alpha;
        let config = self.config;

        apply_links(
            &mut self.nodes,
            &self.links,
            &self.scratch.degree,
            &config,
            alpha,
        );
        self.apply_charge(alpha);
        recenter(&mut self.nodes);
        self.apply_collisions();
        apply_axis_pull(&mut self.nodes, config.center_strength, alpha);

        let retain = 1.0 - config.velocity_decay;
        for node in &mut self.nodes {
            if let Some(pin) = node.pin {
                node.position = pin;
                node.velocity = Vec2::ZERO;
            } else {
                node.velocity *= retain;
                node.position += node.velocity;
            }
        }
    }

    fn apply_charge(&mut self, alpha: f32) {
        if self.config.charge_strength == 0.0 || self.nodes.len() < 2 {
            return;
        }

        let scratch = &mut self.scratch;
        scratch.positions.clear();
        scratch
            .positions
            .extend(self.nodes.iter().map(|node| node.position));

        let Some(tree) = QuadTree::build(&scratch.positions) else {
            return;
        };

        let theta = self.config.charge_theta.max(f32::EPSILON);
        let distance_max = self.config.charge_distance_max;
        let charge = Charge {
            strength: self.config.charge_strength,
            alpha,
            theta_sq: theta * theta,
            distance_max_sq: if distance_max.is_finite() {
                distance_max * distance_max
            } else {
                f32::INFINITY
            },
        };

        for (index, node) in self.nodes.iter_mut().enumerate() {
            node.velocity +=
                accumulate_charge(&tree, index, &scratch.positions, charge, &mut scratch.stack);
        }
    }

    fn apply_collisions(&mut self) {
        if self.config.collision_strength == 0.0 || self.nodes.len() < 2 {
            return;
        }

        let scratch = &mut self.scratch;
        scratch.predicted.clear();
        scratch.radii.clear();
        scratch.velocities.clear();
        let mut max_radius = 0.0_f32;
        for node in &self.nodes {
            let radius = node.radius + self.config.collision_margin;
            scratch.predicted.push(node.position + node.velocity);
            scratch.radii.push(radius);
            scratch.velocities.push(node.velocity);
            max_radius = max_radius.max(radius);
        }

        let Some(tree) = QuadTree::build(&scratch.predicted) else {
            return;
        };

        let reach = max_radius * 2.0;
        accumulate_collisions(
            &tree,
            QuadTree::ROOT,
            QuadTree::ROOT,
            &scratch.predicted,
            &scratch.radii,
            Collision {
                strength: self.config.collision_strength,
                reach_sq: reach * reach,
            },
            &mut scratch.velocities,
        );

        for (node, velocity) in self.nodes.iter_mut().zip(&scratch.velocities) {
            node.velocity = *velocity;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn seeds(ids: &[&str]) -> Vec<NodeSeed> {
        ids.iter().map(|id| NodeSeed::fresh(*id, 8.0)).collect()
    }

    fn running_simulation(ids: &[&str], links: &[(usize, usize, f32)]) -> Simulation {
        let mut simulation = Simulation::new(SimulationConfig::default());
        simulation.set_nodes(seeds(ids));
        simulation.set_links(links.iter().map(|&(source, target, weight)| Link {
            source,
            target,
            weight,
        }));
        simulation.restart();
        simulation
    }

    #[test]
    fn unplaced_nodes_get_distinct_finite_positions() {
        let simulation = running_simulation(&["a", "b", "c", "d"], &[]);
        let positions = simulation
            .nodes()
            .iter()
            .map(|node| node.position)
            .collect::<Vec<_>>();
        for (index, position) in positions.iter().enumerate() {
            assert!(position.is_finite());
            for other in &positions[index + 1..] {
                assert!((*position - *other).length() > 1.0);
            }
        }
    }

    #[test]
    fn seeded_positions_are_kept() {
        let mut simulation = Simulation::new(SimulationConfig::default());
        simulation.set_nodes(vec![NodeSeed {
            id: "a".into(),
            radius: 6.0,
            position: Some(vec2(42.0, -7.0)),
            velocity: Some(vec2(1.0, 1.0)),
            pin: None,
        }]);
        let node = simulation.node("a").expect("node");
        assert_eq!(node.position, vec2(42.0, -7.0));
        assert_eq!(node.velocity, vec2(1.0, 1.0));
    }

    #[test]
    fn out_of_range_links_are_discarded() {
        let simulation = running_simulation(&["a", "b"], &[(0, 1, 0.5), (0, 7, 0.5)]);
        assert_eq!(simulation.links().len(), 1);
    }

    #[test]
    fn alpha_decays_geometrically_and_loop_stops() {
        let mut simulation = running_simulation(&["a", "b", "c"], &[(0, 1, 0.9)]);
        simulation.step();
        assert!((simulation.alpha() - 0.98).abs() < 1e-6);

        let mut ticks = 1;
        while simulation.step() {
            ticks += 1;
            assert!(ticks < 10_000);
        }
        assert!(!simulation.is_running());
        assert!(simulation.alpha() < simulation.config().alpha_min);
        // ln(0.001) / ln(0.98) ~= 342
        assert!((330..=350).contains(&ticks));
    }

    #[test]
    fn alpha_target_keeps_the_loop_alive() {
        let mut simulation = running_simulation(&["a", "b"], &[]);
        simulation.set_alpha_target(0.3);
        for _ in 0..2_000 {
            assert!(simulation.step());
        }
        assert!((simulation.alpha() - 0.3).abs() < 1e-3);
    }

    #[test]
    fn repulsion_separates_close_nodes() {
        let mut simulation = Simulation::new(SimulationConfig::default());
        simulation.set_nodes(vec![
            NodeSeed {
                position: Some(vec2(-1.0, 0.0)),
                ..NodeSeed::fresh("a", 6.0)
            },
            NodeSeed {
                position: Some(vec2(1.0, 0.0)),
                ..NodeSeed::fresh("b", 6.0)
            },
        ]);
        simulation.restart();
        for _ in 0..50 {
            simulation.step();
        }
        let a = simulation.node("a").expect("a").position;
        let b = simulation.node("b").expect("b").position;
        // radii plus collision margins
        assert!((a - b).length() > 20.0);
    }

    #[test]
    fn links_pull_toward_target_distance() {
        let mut simulation = Simulation::new(SimulationConfig {
            charge_strength: 0.0,
            center_strength: 0.0,
            ..SimulationConfig::default()
        });
        simulation.set_nodes(vec![
            NodeSeed {
                position: Some(vec2(-300.0, 0.0)),
                ..NodeSeed::fresh("a", 6.0)
            },
            NodeSeed {
                position: Some(vec2(300.0, 0.0)),
                ..NodeSeed::fresh("b", 6.0)
            },
        ]);
        simulation.set_links([Link {
            source: 0,
            target: 1,
            weight: 1.0,
        }]);
        simulation.restart();
        for _ in 0..300 {
            simulation.step();
        }
        let distance = (simulation.nodes()[0].position - simulation.nodes()[1].position).length();
        assert!(distance < 600.0);
        assert!((distance - 100.0).abs() < 60.0);
    }

    #[test]
    fn pinned_node_is_held_and_released() {
        let mut simulation = running_simulation(&["a", "b", "c"], &[(0, 1, 1.0), (1, 2, 1.0)]);
        assert!(simulation.pin("b", vec2(250.0, 250.0)));
        for _ in 0..20 {
            simulation.step();
        }
        let pinned = simulation.node("b").expect("b");
        assert_eq!(pinned.position, vec2(250.0, 250.0));
        assert_eq!(pinned.velocity, Vec2::ZERO);

        assert!(simulation.unpin("b"));
        assert!(simulation.node("b").expect("b").pin.is_none());
        simulation.step();
        assert_ne!(simulation.node("b").expect("b").position, vec2(250.0, 250.0));
        assert!(!simulation.unpin("b"));
    }

    #[test]
    fn pinned_node_still_pushes_free_neighbours() {
        let mut simulation = Simulation::new(SimulationConfig::default());
        simulation.set_nodes(vec![
            NodeSeed {
                position: Some(Vec2::ZERO),
                pin: Some(Vec2::ZERO),
                ..NodeSeed::fresh("a", 6.0)
            },
            NodeSeed {
                position: Some(vec2(2.0, 0.0)),
                ..NodeSeed::fresh("b", 6.0)
            },
        ]);
        simulation.restart();
        for _ in 0..5 {
            simulation.step();
        }

        let a = simulation.node("a").expect("a");
        assert_eq!(a.position, Vec2::ZERO);
        assert_eq!(a.pin, Some(Vec2::ZERO));
        let b = simulation.node("b").expect("b").position;
        assert!(b.x > 2.0);
    }

    #[test]
    fn stopped_simulation_does_not_move() {
        let mut simulation = running_simulation(&["a", "b", "c"], &[(0, 2, 0.4)]);
        simulation.step();
        simulation.stop();
        let before = simulation.nodes().to_vec();
        for _ in 0..10 {
            assert!(!simulation.step());
        }
        assert_eq!(simulation.nodes(), before.as_slice());
    }

    #[test]
    fn coincident_nodes_do_not_produce_nan() {
        let mut simulation = Simulation::new(SimulationConfig::default());
        simulation.set_nodes(
            (0..6)
                .map(|index| NodeSeed {
                    position: Some(Vec2::ZERO),
                    ..NodeSeed::fresh(format!("n{index}"), 10.0)
                })
                .collect(),
        );
        simulation.restart();
        for _ in 0..30 {
            simulation.step();
        }
        assert!(simulation.nodes().iter().all(|node| node.position.is_finite()));
    }

    #[test]
    fn many_nodes_settle_without_overlap_blowup() {
        let ids = (0..60).map(|index| format!("n{index}")).collect::<Vec<_>>();
        let id_refs = ids.iter().map(String::as_str).collect::<Vec<_>>();
        let links = (1..60)
            .map(|index| (index, index / 3, 0.5))
            .collect::<Vec<_>>();
        let mut simulation = running_simulation(&id_refs, &links);
        while simulation.step() {}
        for node in simulation.nodes() {
            assert!(node.position.is_finite());
            assert!(node.position.length() < 2_000.0);
        }
    }
}
