use std::fs;
use std::path::{Path, PathBuf};

use anyhow::Context;
use directories::ProjectDirs;
use serde::{Deserialize, Serialize};

/// Solver constants. The defaults reproduce the layout the viewer was tuned
/// with; none of them are load-bearing for correctness.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SimulationConfig {
    pub alpha_initial: f32,
    pub alpha_restart: f32,
    pub alpha_decay: f32,
    pub alpha_min: f32,
    pub drag_alpha_target: f32,
    pub velocity_decay: f32,
    pub link_distance: f32,
    pub link_strength_scale: f32,
    pub charge_strength: f32,
    pub charge_distance_max: f32,
    pub charge_theta: f32,
    pub center_strength: f32,
    pub collision_margin: f32,
    pub collision_strength: f32,
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self {
            alpha_initial: 1.0,
            alpha_restart: 0.3,
            alpha_decay: 0.02,
            alpha_min: 0.001,
            drag_alpha_target: 0.3,
            velocity_decay: 0.4,
            link_distance: 100.0,
            link_strength_scale: 0.3,
            charge_strength: -200.0,
            charge_distance_max: 400.0,
            charge_theta: 0.9,
            center_strength: 0.04,
            collision_margin: 6.0,
            collision_strength: 1.0,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReconcileConfig {
    /// Merge only when the shared id fraction of the incoming set is strictly
    /// above this value.
    pub merge_overlap_threshold: f64,
}

impl Default for ReconcileConfig {
    fn default() -> Self {
        Self {
            merge_overlap_threshold: 0.8,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ViewConfig {
    pub min_zoom: f32,
    pub max_zoom: f32,
    pub initial_zoom: f32,
}

impl Default for ViewConfig {
    fn default() -> Self {
        Self {
            min_zoom: 0.2,
            max_zoom: 5.0,
            initial_zoom: 0.85,
        }
    }
}

/// Transition timings in milliseconds.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TransitionConfig {
    pub enter_radius_ms: u32,
    pub enter_stagger_ms: u32,
    pub enter_label_delay_ms: u32,
    pub enter_label_ms: u32,
    pub enter_edge_delay_ms: u32,
    pub enter_edge_ms: u32,
    pub merge_update_ms: u32,
    pub merge_exit_ms: u32,
    pub hover_glow_ms: u32,
}

impl Default for TransitionConfig {
    fn default() -> Self {
        Self {
            enter_radius_ms: 600,
            enter_stagger_ms: 15,
            enter_label_delay_ms: 300,
            enter_label_ms: 400,
            enter_edge_delay_ms: 200,
            enter_edge_ms: 800,
            merge_update_ms: 500,
            merge_exit_ms: 300,
            hover_glow_ms: 200,
        }
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub simulation: SimulationConfig,
    pub reconcile: ReconcileConfig,
    pub view: ViewConfig,
    pub transitions: TransitionConfig,
}

pub fn config_file_path() -> Option<PathBuf> {
    let proj = ProjectDirs::from("", "", "mris-graph")?;
    Some(proj.config_dir().join("engine.toml"))
}

/// Loads the per-user config, silently falling back to defaults.
pub fn load_or_default() -> EngineConfig {
    let Some(path) = config_file_path() else {
        return EngineConfig::default();
    };
    load_or_default_from_path(&path)
}

pub fn load_or_default_from_path(path: &Path) -> EngineConfig {
    let Ok(contents) = fs::read_to_string(path) else {
        return EngineConfig::default();
    };
    match toml::from_str(&contents) {
        Ok(cfg) => cfg,
        Err(error) => {
            tracing::warn!(path = %path.display(), %error, "ignoring malformed engine config");
            EngineConfig::default()
        }
    }
}

/// Loads an explicitly requested config file; errors are reported.
pub fn load_from_path(path: &Path) -> anyhow::Result<EngineConfig> {
    let contents = fs::read_to_string(path)
        .with_context(|| format!("failed to read engine config {}", path.display()))?;
    toml::from_str(&contents)
        .with_context(|| format!("failed to parse engine config {}", path.display()))
}

pub fn save_to_path(cfg: &EngineConfig, path: &Path) -> anyhow::Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)
            .with_context(|| format!("failed to create config directory {}", parent.display()))?;
    }
    let data = toml::to_string_pretty(cfg).context("failed to serialize engine config")?;
    fs::write(path, data)
        .with_context(|| format!("failed to write engine config {}", path.display()))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn engine_config_roundtrip_save_load() {
        let dir = tempdir().expect("tempdir");
        let path = dir.path().join("engine.toml");
        let cfg = EngineConfig::default();

        save_to_path(&cfg, &path).expect("save config");
        let loaded = load_from_path(&path).expect("load config");

        assert_eq!(cfg, loaded);
    }

    #[test]
    fn partial_file_keeps_defaults() {
        let dir = tempdir().expect("tempdir");
        let path = dir.path().join("engine.toml");
        fs::write(
            &path,
            "[reconcile]\nmerge_overlap_threshold = 0.9\n\n[simulation]\nalpha_decay = 0.05\n",
        )
        .expect("write");

        let loaded = load_from_path(&path).expect("load config");
        assert_eq!(loaded.reconcile.merge_overlap_threshold, 0.9);
        assert_eq!(loaded.simulation.alpha_decay, 0.05);
        assert_eq!(loaded.simulation.alpha_restart, 0.3);
        assert_eq!(loaded.view, ViewConfig::default());
    }

    #[test]
    fn malformed_file_falls_back_or_errors() {
        let dir = tempdir().expect("tempdir");
        let path = dir.path().join("engine.toml");
        fs::write(&path, "[simulation\nalpha_decay = ").expect("write");

        assert_eq!(load_or_default_from_path(&path), EngineConfig::default());
        assert!(load_from_path(&path).is_err());
    }

    #[test]
    fn missing_file_is_default() {
        let dir = tempdir().expect("tempdir");
        let loaded = load_or_default_from_path(&dir.path().join("absent.toml"));
        assert_eq!(loaded, EngineConfig::default());
    }
}
