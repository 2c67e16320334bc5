mod app;

use std::path::PathBuf;
use std::time::Duration;

use anyhow::Result;
use clap::Parser;
use mris_graph::config;
use mris_graph::feed::FeedSource;
use tracing_subscriber::EnvFilter;

use app::Input;

#[derive(Debug, Parser)]
#[command(author, version, about)]
struct Args {
    /// Render a single snapshot JSON file.
    #[arg(long, conflicts_with = "stream")]
    snapshot: Option<PathBuf>,

    /// Follow an event stream (SSE or JSON lines); `-` reads stdin.
    #[arg(long)]
    stream: Option<String>,

    /// Pause between streamed updates when replaying a recording.
    #[arg(long, requires = "stream")]
    replay_interval_ms: Option<u64>,

    /// Engine config file; defaults to the per-user config.
    #[arg(long)]
    config: Option<PathBuf>,

    /// Rebuild the layout for every streamed snapshot instead of merging.
    #[arg(long)]
    static_mode: bool,
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let args = Args::parse();
    let engine_config = match &args.config {
        Some(path) => config::load_from_path(path)?,
        None => config::load_or_default(),
    };

    let input = match (args.snapshot, args.stream) {
        (Some(path), _) => Input::Snapshot(path),
        (None, Some(stream)) => Input::Stream {
            source: FeedSource::from_arg(&stream),
            pacing: args.replay_interval_ms.map(Duration::from_millis),
            static_mode: args.static_mode,
        },
        (None, None) => anyhow::bail!("nothing to show: pass --snapshot <file> or --stream <file|->"),
    };

    let options = eframe::NativeOptions {
        viewport: eframe::egui::ViewportBuilder::default().with_inner_size([1440.0, 920.0]),
        ..Default::default()
    };

    eframe::run_native(
        "mris-graph",
        options,
        Box::new(move |cc| Ok(Box::new(app::MrisGraphApp::new(cc, engine_config, input)))),
    )
    .map_err(|error| anyhow::anyhow!("failed to run viewer: {error}"))
}
