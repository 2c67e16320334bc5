use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use eframe::egui::Color32;
use tracing::{debug, trace, warn};

use crate::config::EngineConfig;
use crate::physics::{Link, NodeSeed, Simulation};
use crate::presentation::{EdgeScales, cluster_color, node_radius, short_label};
use crate::scene::{EdgeKey, Scene, SceneDelta};
use crate::snapshot::{Entity, Snapshot};

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum FeedMode {
    /// Request/response data; every snapshot gets a fresh layout.
    #[default]
    Static,
    /// Live feed; similar consecutive snapshots are merged in place.
    Streaming,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ReconcilePath {
    Full,
    Merge,
}

/// An entity with its derived presentation attributes.
#[derive(Clone, Debug, PartialEq)]
pub struct EntityRecord {
    pub entity: Entity,
    pub label: String,
    pub radius: f32,
    pub color: Color32,
}

impl EntityRecord {
    pub fn from_entity(entity: &Entity) -> Self {
        Self {
            label: short_label(entity.display_symbol()),
            radius: node_radius(entity.influence_score),
            color: cluster_color(entity.cluster_id),
            entity: entity.clone(),
        }
    }

    pub fn id(&self) -> &str {
        &self.entity.id
    }
}

/// A relationship whose endpoints were resolved against the entity set.
#[derive(Clone, Debug, PartialEq)]
pub struct EdgeRecord {
    pub key: EdgeKey,
    pub source: usize,
    pub target: usize,
    pub weight: f32,
}

/// Simulation plus the records it was seeded from. Entities and simulation
/// nodes share indices.
pub struct LayoutSession {
    pub simulation: Simulation,
    pub entities: Vec<EntityRecord>,
    pub edges: Vec<EdgeRecord>,
    pub scales: EdgeScales,
}

impl LayoutSession {
    pub fn entity(&self, id: &str) -> Option<&EntityRecord> {
        self.simulation
            .index_of(id)
            .and_then(|index| self.entities.get(index))
    }

    pub fn contains(&self, id: &str) -> bool {
        self.simulation.index_of(id).is_some()
    }
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ReconcileOutcome {
    pub path: ReconcilePath,
    pub entities: usize,
    pub relationships: usize,
    pub dropped_relationships: usize,
    pub nodes: SceneDelta,
    pub edges: SceneDelta,
}

/// Fraction of the incoming ids that were already present.
pub fn overlap_ratio(previous: &Snapshot, incoming: &Snapshot) -> f64 {
    let previous_ids = previous.entity_ids();
    let incoming_ids = incoming.entity_ids();
    let shared = incoming_ids
        .iter()
        .filter(|id| previous_ids.contains(*id))
        .count();
    shared as f64 / incoming_ids.len().max(1) as f64
}

pub fn merge_eligible(
    mode: FeedMode,
    previous: Option<&Snapshot>,
    incoming: &Snapshot,
    threshold: f64,
) -> bool {
    match (mode, previous) {
        (FeedMode::Streaming, Some(previous)) => overlap_ratio(previous, incoming) > threshold,
        _ => false,
    }
}

struct Records {
    entities: Vec<EntityRecord>,
    edges: Vec<EdgeRecord>,
    dropped: usize,
}

fn build_records(snapshot: &Snapshot) -> Records {
    let mut index_by_id = HashMap::with_capacity(snapshot.entities.len());
    let mut entities = Vec::with_capacity(snapshot.entities.len());

    for entity in &snapshot.entities {
        if index_by_id.contains_key(entity.id.as_str()) {
            warn!(id = %entity.id, "duplicate entity id in snapshot, keeping the first");
            continue;
        }
        index_by_id.insert(entity.id.as_str(), entities.len());
        entities.push(EntityRecord::from_entity(entity));
    }

    let mut seen = HashSet::new();
    let mut edges = Vec::with_capacity(snapshot.relationships.len());
    let mut dropped = 0;

    for relationship in &snapshot.relationships {
        let endpoints = (
            index_by_id.get(relationship.source.as_str()),
            index_by_id.get(relationship.target.as_str()),
        );
        let (Some(&source), Some(&target)) = endpoints else {
            trace!(
                source = %relationship.source,
                target = %relationship.target,
                "dropping relationship with unknown endpoint"
            );
            dropped += 1;
            continue;
        };
        if !relationship.weight.is_finite() {
            trace!(source = %relationship.source, target = %relationship.target, "dropping relationship without a weight");
            dropped += 1;
            continue;
        }

        let key = EdgeKey::new(&relationship.source, &relationship.target);
        if !seen.insert(key.clone()) {
            dropped += 1;
            continue;
        }

        edges.push(EdgeRecord {
            key,
            source,
            target,
            weight: relationship.weight as f32,
        });
    }

    Records {
        entities,
        edges,
        dropped,
    }
}

fn links_of(edges: &[EdgeRecord]) -> impl Iterator<Item = Link> + '_ {
    edges.iter().map(|edge| Link {
        source: edge.source,
        target: edge.target,
        weight: edge.weight,
    })
}

/// Holds PREVIOUS and the live layout session between snapshots.
pub struct Reconciler {
    config: EngineConfig,
    previous: Option<Arc<Snapshot>>,
    session: Option<LayoutSession>,
}

impl Reconciler {
    pub fn new(config: EngineConfig) -> Self {
        Self {
            config,
            previous: None,
            session: None,
        }
    }

    pub fn previous(&self) -> Option<&Arc<Snapshot>> {
        self.previous.as_ref()
    }

    pub fn session(&self) -> Option<&LayoutSession> {
        self.session.as_ref()
    }

    pub fn session_mut(&mut self) -> Option<&mut LayoutSession> {
        self.session.as_mut()
    }

    /// Applies `incoming` to the session and the scene. Returns once every
    /// state mutation for this snapshot is in place.
    pub fn reconcile(
        &mut self,
        incoming: Arc<Snapshot>,
        mode: FeedMode,
        scene: &mut Scene,
        now: f64,
    ) -> ReconcileOutcome {
        let eligible = self.session.is_some()
            && merge_eligible(
                mode,
                self.previous.as_deref(),
                &incoming,
                self.config.reconcile.merge_overlap_threshold,
            );

        let records = build_records(&incoming);
        let outcome = if eligible {
            self.merge(records, scene, now)
        } else {
            self.rebuild(records, scene, now)
        };

        debug!(
            path = ?outcome.path,
            entities = outcome.entities,
            relationships = outcome.relationships,
            dropped = outcome.dropped_relationships,
            "reconciled snapshot"
        );

        self.previous = Some(incoming);
        outcome
    }

    /// Stops the simulation and forgets every snapshot-derived state.
    pub fn teardown(&mut self, scene: &mut Scene) {
        if let Some(mut session) = self.session.take() {
            session.simulation.stop();
        }
        self.previous = None;
        scene.clear();
    }

    fn rebuild(&mut self, records: Records, scene: &mut Scene, now: f64) -> ReconcileOutcome {
        if let Some(mut session) = self.session.take() {
            session.simulation.stop();
        }
        scene.clear();

        let Records {
            entities,
            edges,
            dropped,
        } = records;
        let mut outcome = ReconcileOutcome {
            path: ReconcilePath::Full,
            entities: entities.len(),
            relationships: edges.len(),
            dropped_relationships: dropped,
            nodes: SceneDelta::default(),
            edges: SceneDelta::default(),
        };

        if entities.is_empty() {
            return outcome;
        }

        let scales = EdgeScales::from_weights(edges.iter().map(|edge| edge.weight));
        let mut simulation = Simulation::new(self.config.simulation);
        simulation.set_nodes(
            entities
                .iter()
                .map(|entity| NodeSeed::fresh(entity.id(), entity.radius))
                .collect(),
        );
        simulation.set_links(links_of(&edges));
        simulation.set_alpha(self.config.simulation.alpha_initial);
        simulation.restart();

        scene.rebuild(&entities, &edges, &scales, now, &self.config.transitions);
        outcome.nodes.created = entities.len();
        outcome.edges.created = edges.len();

        let session = LayoutSession {
            simulation,
            entities,
            edges,
            scales,
        };
        scene.sync_positions(&session);
        self.session = Some(session);
        outcome
    }

    fn merge(&mut self, records: Records, scene: &mut Scene, now: f64) -> ReconcileOutcome {
        let Some(session) = self.session.as_mut() else {
            return self.rebuild(records, scene, now);
        };

        let Records {
            entities,
            edges,
            dropped,
        } = records;

        let seeds = entities
            .iter()
            .map(|entity| match session.simulation.node(entity.id()) {
                Some(prior) => NodeSeed {
                    id: entity.id().to_string(),
                    radius: entity.radius,
                    position: Some(prior.position),
                    velocity: Some(prior.velocity),
                    pin: prior.pin,
                },
                None => NodeSeed::fresh(entity.id(), entity.radius),
            })
            .collect();

        session.scales = EdgeScales::from_weights(edges.iter().map(|edge| edge.weight));
        session.simulation.set_nodes(seeds);
        session.simulation.set_links(links_of(&edges));
        session.entities = entities;
        session.edges = edges;

        let (nodes, edge_delta) = scene.reconcile(
            &session.entities,
            &session.edges,
            &session.scales,
            now,
            &self.config.transitions,
        );

        session
            .simulation
            .set_alpha(self.config.simulation.alpha_restart);
        session.simulation.restart();
        scene.sync_positions(session);

        ReconcileOutcome {
            path: ReconcilePath::Merge,
            entities: session.entities.len(),
            relationships: session.edges.len(),
            dropped_relationships: dropped,
            nodes,
            edges: edge_delta,
        }
    }
}

#[cfg(test)]
mod tests {
    use eframe::egui::vec2;

    use super::*;
    use crate::snapshot::Relationship;

    fn entity(id: &str, influence: f64, cluster: i64) -> Entity {
        Entity {
            id: id.to_string(),
            symbol: format!("{id}.NS"),
            cluster_id: cluster,
            influence_score: influence,
            ..Entity::default()
        }
    }

    fn snapshot(ids: &[&str], links: &[(&str, &str, f64)]) -> Arc<Snapshot> {
        Arc::new(Snapshot {
            entities: ids
                .iter()
                .enumerate()
                .map(|(index, id)| entity(id, index as f64 / 10.0, index as i64))
                .collect(),
            relationships: links
                .iter()
                .map(|(source, target, weight)| Relationship {
                    source: source.to_string(),
                    target: target.to_string(),
                    weight: *weight,
                })
                .collect(),
            ..Snapshot::default()
        })
    }

    #[test]
    fn eighty_percent_overlap_is_not_enough() {
        let previous = snapshot(&["A", "B", "C", "D", "E"], &[]);
        let swapped = snapshot(&["A", "B", "C", "D", "F"], &[]);
        let grown = snapshot(&["A", "B", "C", "D", "E", "F"], &[]);

        assert!((overlap_ratio(&previous, &swapped) - 0.8).abs() < 1e-12);
        assert!(!merge_eligible(FeedMode::Streaming, Some(&previous), &swapped, 0.8));
        assert!(merge_eligible(FeedMode::Streaming, Some(&previous), &grown, 0.8));
        assert!(!merge_eligible(FeedMode::Static, Some(&previous), &grown, 0.8));
        assert!(!merge_eligible(FeedMode::Streaming, None, &grown, 0.8));
    }

    #[test]
    fn empty_incoming_snapshot_is_never_merged() {
        let previous = snapshot(&["A"], &[]);
        let empty = snapshot(&[], &[]);
        assert_eq!(overlap_ratio(&previous, &empty), 0.0);
        assert!(!merge_eligible(FeedMode::Streaming, Some(&previous), &empty, 0.8));
    }

    #[test]
    fn paths_follow_overlap_in_streaming_mode() {
        let mut reconciler = Reconciler::new(EngineConfig::default());
        let mut scene = Scene::default();

        let first = reconciler.reconcile(
            snapshot(&["A", "B", "C", "D", "E"], &[]),
            FeedMode::Streaming,
            &mut scene,
            0.0,
        );
        assert_eq!(first.path, ReconcilePath::Full);

        let swapped = reconciler.reconcile(
            snapshot(&["A", "B", "C", "D", "F"], &[]),
            FeedMode::Streaming,
            &mut scene,
            1.0,
        );
        assert_eq!(swapped.path, ReconcilePath::Full);

        let grown = reconciler.reconcile(
            snapshot(&["A", "B", "C", "D", "F", "G"], &[]),
            FeedMode::Streaming,
            &mut scene,
            2.0,
        );
        assert_eq!(grown.path, ReconcilePath::Merge);
        assert_eq!(grown.nodes.created, 1);
        assert_eq!(grown.nodes.updated, 5);
    }

    #[test]
    fn static_mode_always_rebuilds() {
        let mut reconciler = Reconciler::new(EngineConfig::default());
        let mut scene = Scene::default();
        let data = snapshot(&["A", "B", "C"], &[("A", "B", 0.5)]);

        reconciler.reconcile(data.clone(), FeedMode::Static, &mut scene, 0.0);
        let again = reconciler.reconcile(data, FeedMode::Static, &mut scene, 1.0);
        assert_eq!(again.path, ReconcilePath::Full);
    }

    #[test]
    fn merge_keeps_positions_and_pins() {
        let mut reconciler = Reconciler::new(EngineConfig::default());
        let mut scene = Scene::default();
        let ids = ["A", "B", "C", "D", "E"];
        reconciler.reconcile(
            snapshot(&ids, &[("A", "B", 0.4), ("B", "C", 0.9)]),
            FeedMode::Streaming,
            &mut scene,
            0.0,
        );

        let session = reconciler.session_mut().expect("session");
        for _ in 0..30 {
            session.simulation.step();
        }
        assert!(session.simulation.pin("C", vec2(42.0, -7.0)));
        let before = session
            .entities
            .iter()
            .map(|entity| {
                let node = session.simulation.node(entity.id()).expect("node");
                (entity.id().to_string(), node.position, node.velocity)
            })
            .collect::<Vec<_>>();

        let outcome = reconciler.reconcile(
            snapshot(&["A", "B", "C", "D", "E", "F"], &[("A", "F", 0.3)]),
            FeedMode::Streaming,
            &mut scene,
            1.0,
        );
        assert_eq!(outcome.path, ReconcilePath::Merge);

        let session = reconciler.session().expect("session");
        for (id, position, velocity) in before {
            let node = session.simulation.node(&id).expect("carried node");
            assert_eq!(node.position, position, "{id} moved during merge");
            assert_eq!(node.velocity, velocity);
        }
        assert_eq!(
            session.simulation.node("C").and_then(|node| node.pin),
            Some(vec2(42.0, -7.0))
        );
        assert!(session.simulation.node("F").is_some_and(|node| node.pin.is_none()));
        assert!((session.simulation.alpha() - 0.3).abs() < 1e-6);
        assert!(session.simulation.is_running());
    }

    #[test]
    fn new_entity_in_merge_settles_without_panicking() {
        let mut reconciler = Reconciler::new(EngineConfig::default());
        let mut scene = Scene::default();
        reconciler.reconcile(
            snapshot(&["A", "B", "C", "D", "E"], &[]),
            FeedMode::Streaming,
            &mut scene,
            0.0,
        );
        reconciler.reconcile(
            snapshot(&["A", "B", "C", "D", "E", "F"], &[("E", "F", 1.0)]),
            FeedMode::Streaming,
            &mut scene,
            1.0,
        );

        let session = reconciler.session_mut().expect("session");
        while session.simulation.step() {}
        let fresh = session.simulation.node("F").expect("new node");
        assert!(fresh.position.is_finite());
    }

    #[test]
    fn unknown_endpoints_and_duplicates_are_dropped() {
        let mut reconciler = Reconciler::new(EngineConfig::default());
        let mut scene = Scene::default();
        let mut data = (*snapshot(
            &["A", "B"],
            &[("A", "B", 0.5), ("A", "Z", 0.5), ("A", "B", 0.7)],
        ))
        .clone();
        data.entities.push(entity("A", 0.9, 3));

        let outcome = reconciler.reconcile(Arc::new(data), FeedMode::Static, &mut scene, 0.0);
        assert_eq!(outcome.entities, 2);
        assert_eq!(outcome.relationships, 1);
        assert_eq!(outcome.dropped_relationships, 2);

        let session = reconciler.session().expect("session");
        let ids = session.entities.iter().map(EntityRecord::id).collect::<HashSet<_>>();
        for edge in &session.edges {
            assert!(ids.contains(edge.key.source.as_str()));
            assert!(ids.contains(edge.key.target.as_str()));
        }
        for edge in scene.edges() {
            assert!(scene.node(&edge.key.source).is_some());
            assert!(scene.node(&edge.key.target).is_some());
        }
        // First occurrence wins.
        assert_eq!(session.entity("A").map(|record| record.radius), Some(6.0));
    }

    #[test]
    fn empty_snapshot_starts_nothing() {
        let mut reconciler = Reconciler::new(EngineConfig::default());
        let mut scene = Scene::default();
        reconciler.reconcile(snapshot(&["A"], &[]), FeedMode::Static, &mut scene, 0.0);

        let outcome = reconciler.reconcile(snapshot(&[], &[]), FeedMode::Streaming, &mut scene, 1.0);
        assert_eq!(outcome.path, ReconcilePath::Full);
        assert!(reconciler.session().is_none());
        assert!(scene.is_empty());
        assert!(reconciler.previous().is_some());
    }

    #[test]
    fn same_snapshot_twice_derives_same_attributes() {
        let mut reconciler = Reconciler::new(EngineConfig::default());
        let mut scene = Scene::default();
        let data = snapshot(&["A", "B", "C"], &[("A", "C", 0.2)]);

        reconciler.reconcile(data.clone(), FeedMode::Static, &mut scene, 0.0);
        let first = reconciler.session().expect("session").entities.clone();
        reconciler.reconcile(data, FeedMode::Static, &mut scene, 1.0);
        let second = reconciler.session().expect("session").entities.clone();
        assert_eq!(first, second);
    }

    #[test]
    fn teardown_stops_and_forgets() {
        let mut reconciler = Reconciler::new(EngineConfig::default());
        let mut scene = Scene::default();
        reconciler.reconcile(snapshot(&["A", "B"], &[]), FeedMode::Streaming, &mut scene, 0.0);
        reconciler.teardown(&mut scene);
        assert!(reconciler.session().is_none());
        assert!(reconciler.previous().is_none());
        assert!(scene.is_empty());
    }
}
