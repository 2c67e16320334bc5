use std::collections::HashSet;
use std::fs;
use std::path::Path;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Centrality {
    #[serde(default)]
    pub degree: f64,
    #[serde(default)]
    pub betweenness: f64,
    #[serde(default)]
    pub closeness: f64,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Entity {
    pub id: String,
    #[serde(default)]
    pub symbol: String,
    #[serde(default)]
    pub cluster_id: i64,
    #[serde(default)]
    pub influence_score: f64,
    #[serde(default)]
    pub centrality: Centrality,
    #[serde(default)]
    pub connections: u32,
}

impl Entity {
    /// Symbol if the backend sent one, otherwise the id.
    pub fn display_symbol(&self) -> &str {
        if self.symbol.is_empty() {
            &self.id
        } else {
            &self.symbol
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Relationship {
    pub source: String,
    pub target: String,
    #[serde(default)]
    pub weight: f64,
}

impl Relationship {
    pub fn touches(&self, id: &str) -> bool {
        self.source == id || self.target == id
    }

    pub fn peer_of(&self, id: &str) -> Option<&str> {
        if self.source == id {
            Some(&self.target)
        } else if self.target == id {
            Some(&self.source)
        } else {
            None
        }
    }
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct NetworkStats {
    pub total_nodes: u64,
    pub total_edges: u64,
    pub density: f64,
    pub avg_degree: f64,
    pub modularity: f64,
    pub num_clusters: u64,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ClusterInfo {
    pub cluster_id: i64,
    #[serde(default)]
    pub size: u64,
    #[serde(default)]
    pub members: Vec<String>,
}

/// One complete dataset as delivered by the analytics backend.
///
/// The backend names the collections `nodes` and `edges`; both spellings are
/// accepted. Snapshots are shared behind an `Arc` once parsed and never
/// mutated afterwards.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Snapshot {
    #[serde(default, alias = "nodes")]
    pub entities: Vec<Entity>,
    #[serde(default, alias = "edges")]
    pub relationships: Vec<Relationship>,
    #[serde(default)]
    pub stats: NetworkStats,
    #[serde(default)]
    pub clusters: Vec<ClusterInfo>,
    #[serde(default)]
    pub index: Option<String>,
    #[serde(default)]
    pub period: Option<String>,
    #[serde(default)]
    pub threshold: Option<f64>,
    #[serde(default)]
    pub timestamp: Option<String>,
}

/// A peer of an entity together with the weight of the relationship.
#[derive(Clone, Debug, PartialEq)]
pub struct Connection {
    pub peer: String,
    pub weight: f64,
}

impl Snapshot {
    pub fn from_json(raw: &str) -> Result<Self> {
        serde_json::from_str(raw).context("invalid snapshot JSON")
    }

    pub fn load(path: &Path) -> Result<Self> {
        let raw = fs::read_to_string(path)
            .with_context(|| format!("failed to read snapshot {}", path.display()))?;
        Self::from_json(&raw).with_context(|| format!("failed to parse snapshot {}", path.display()))
    }

    pub fn is_empty(&self) -> bool {
        self.entities.is_empty()
    }

    pub fn entity_ids(&self) -> HashSet<&str> {
        self.entities.iter().map(|entity| entity.id.as_str()).collect()
    }

    pub fn entity(&self, id: &str) -> Option<&Entity> {
        self.entities.iter().find(|entity| entity.id == id)
    }

    pub fn relationships_of<'a>(&'a self, id: &'a str) -> impl Iterator<Item = &'a Relationship> {
        self.relationships
            .iter()
            .filter(move |relationship| relationship.touches(id))
    }

    /// Strongest relationships of `id`, heaviest first.
    pub fn top_connections(&self, id: &str, limit: usize) -> Vec<Connection> {
        let mut connections = self
            .relationships_of(id)
            .filter_map(|relationship| {
                relationship.peer_of(id).map(|peer| Connection {
                    peer: peer.to_string(),
                    weight: relationship.weight,
                })
            })
            .collect::<Vec<_>>();
        connections.sort_by(|a, b| b.weight.total_cmp(&a.weight));
        connections.truncate(limit);
        connections
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const BACKEND_JSON: &str = r#"{
        "nodes": [
            {"id": "TCS.NS", "symbol": "TCS.NS", "cluster_id": 1, "influence_score": 0.5,
             "centrality": {"degree": 0.4, "betweenness": 0.1, "closeness": 0.6},
             "connections": 2},
            {"id": "INFY.NS", "symbol": "INFY.NS", "cluster_id": 1, "influence_score": 0.2,
             "centrality": {"degree": 0.2, "betweenness": 0.0, "closeness": 0.5},
             "connections": 1},
            {"id": "ITC.NS", "symbol": "ITC.NS", "cluster_id": 3, "influence_score": 0.1,
             "centrality": {"degree": 0.1, "betweenness": 0.0, "closeness": 0.3},
             "connections": 1}
        ],
        "edges": [
            {"source": "TCS.NS", "target": "INFY.NS", "weight": 0.82},
            {"source": "ITC.NS", "target": "TCS.NS", "weight": 0.64}
        ],
        "clusters": [{"cluster_id": 1, "size": 2, "members": ["TCS.NS", "INFY.NS"]}],
        "stats": {"total_nodes": 3, "total_edges": 2, "density": 0.66, "avg_degree": 1.33,
                  "modularity": 0.12, "num_clusters": 2},
        "index": "NIFTY 50",
        "threshold": 0.6,
        "timestamp": "2026-10-18T09:15:00Z"
    }"#;

    #[test]
    fn parses_backend_field_names() {
        let snapshot = Snapshot::from_json(BACKEND_JSON).expect("parse");
        assert_eq!(snapshot.entities.len(), 3);
        assert_eq!(snapshot.relationships.len(), 2);
        assert_eq!(snapshot.stats.num_clusters, 2);
        assert_eq!(snapshot.index.as_deref(), Some("NIFTY 50"));
        assert_eq!(snapshot.entities[0].centrality.closeness, 0.6);
    }

    #[test]
    fn top_connections_are_sorted_by_weight() {
        let snapshot = Snapshot::from_json(BACKEND_JSON).expect("parse");
        let connections = snapshot.top_connections("TCS.NS", 10);
        assert_eq!(connections.len(), 2);
        assert_eq!(connections[0].peer, "INFY.NS");
        assert_eq!(connections[1].peer, "ITC.NS");

        let limited = snapshot.top_connections("TCS.NS", 1);
        assert_eq!(limited.len(), 1);
    }

    #[test]
    fn missing_optional_sections_default() {
        let snapshot =
            Snapshot::from_json(r#"{"entities": [{"id": "A"}], "relationships": []}"#).expect("parse");
        assert_eq!(snapshot.entities[0].display_symbol(), "A");
        assert_eq!(snapshot.stats, NetworkStats::default());
        assert!(snapshot.clusters.is_empty());
    }

    #[test]
    fn rejects_garbage() {
        assert!(Snapshot::from_json("not json").is_err());
    }
}
