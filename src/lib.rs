pub mod config;
pub mod engine;
pub mod feed;
pub mod interaction;
pub mod physics;
pub mod presentation;
pub mod reconcile;
pub mod scene;
pub mod snapshot;
pub mod util;

pub use engine::GraphEngine;
pub use reconcile::{FeedMode, ReconcilePath};
pub use snapshot::Snapshot;
