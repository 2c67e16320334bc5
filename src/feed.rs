use std::fs::File;
use std::io::{self, BufRead, BufReader};
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::mpsc::{self, Receiver, Sender};
use std::thread;
use std::time::Duration;

use anyhow::{Context, Result};
use serde::Deserialize;
use tracing::{debug, info, warn};

use crate::snapshot::Snapshot;

#[derive(Clone, Debug, PartialEq)]
pub enum FeedEvent {
    Update(Arc<Snapshot>),
    /// Heartbeat; `next_in` is the backend's estimate in seconds.
    Ping { next_in: Option<f64> },
    Error(String),
    Closed,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum FeedSource {
    Stdin,
    File(PathBuf),
}

impl FeedSource {
    pub fn from_arg(arg: &str) -> Self {
        if arg == "-" {
            Self::Stdin
        } else {
            Self::File(PathBuf::from(arg))
        }
    }

    fn open(&self) -> Result<Box<dyn BufRead + Send>> {
        match self {
            Self::Stdin => Ok(Box::new(BufReader::new(io::stdin()))),
            Self::File(path) => {
                let file = File::open(path)
                    .with_context(|| format!("failed to open feed {}", path.display()))?;
                Ok(Box::new(BufReader::new(file)))
            }
        }
    }
}

/// One dispatched server-sent event.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct SseFrame {
    pub event: String,
    pub data: String,
}

/// Incremental parser over an SSE text stream. Lines that are bare JSON
/// objects outside of a frame are treated as `update` events, so JSON-lines
/// recordings work as well.
pub struct SseReader<R> {
    reader: R,
    line: String,
}

impl<R: BufRead> SseReader<R> {
    pub fn new(reader: R) -> Self {
        Self {
            reader,
            line: String::new(),
        }
    }

    pub fn next_frame(&mut self) -> io::Result<Option<SseFrame>> {
        let mut event = String::new();
        let mut data: Vec<String> = Vec::new();

        loop {
            self.line.clear();
            if self.reader.read_line(&mut self.line)? == 0 {
                if data.is_empty() {
                    return Ok(None);
                }
                return Ok(Some(dispatch(event, data)));
            }

            let line = self.line.trim_end_matches(['\n', '\r']);
            if line.is_empty() {
                if data.is_empty() {
                    event.clear();
                    continue;
                }
                return Ok(Some(dispatch(event, data)));
            }

            if line.starts_with('{') && event.is_empty() && data.is_empty() {
                return Ok(Some(SseFrame {
                    event: "update".to_string(),
                    data: line.to_string(),
                }));
            }

            if line.starts_with(':') {
                continue;
            }

            let (field, value) = match line.split_once(':') {
                Some((field, value)) => (field, value.strip_prefix(' ').unwrap_or(value)),
                None => (line, ""),
            };
            match field {
                "event" => event = value.to_string(),
                "data" => data.push(value.to_string()),
                _ => {}
            }
        }
    }
}

fn dispatch(event: String, data: Vec<String>) -> SseFrame {
    SseFrame {
        event: if event.is_empty() {
            "message".to_string()
        } else {
            event
        },
        data: data.join("\n"),
    }
}

#[derive(Deserialize)]
struct PingPayload {
    next_in: Option<f64>,
}

#[derive(Deserialize)]
struct ErrorPayload {
    error: String,
}

/// Maps a frame onto a feed event; unknown event names are skipped.
pub fn decode_frame(frame: &SseFrame) -> Option<FeedEvent> {
    match frame.event.as_str() {
        "update" | "message" => Some(match Snapshot::from_json(&frame.data) {
            Ok(snapshot) => FeedEvent::Update(Arc::new(snapshot)),
            Err(error) => {
                warn!("discarding malformed update: {error:#}");
                FeedEvent::Error(format!("malformed update: {error:#}"))
            }
        }),
        "ping" => Some(FeedEvent::Ping {
            next_in: serde_json::from_str::<PingPayload>(&frame.data)
                .ok()
                .and_then(|ping| ping.next_in),
        }),
        "error" => Some(FeedEvent::Error(
            serde_json::from_str::<ErrorPayload>(&frame.data)
                .map(|payload| payload.error)
                .unwrap_or_else(|_| frame.data.clone()),
        )),
        other => {
            debug!(event = other, "ignoring unknown feed event");
            None
        }
    }
}

/// Reads every event from `reader` into `sender`, pausing after each update
/// when `pacing` is set. Ends with `Closed` unless the receiver went away.
pub fn pump_events<R: BufRead>(
    reader: R,
    sender: &Sender<FeedEvent>,
    pacing: Option<Duration>,
) -> Result<usize> {
    let mut frames = SseReader::new(reader);
    let mut updates = 0;

    while let Some(frame) = frames.next_frame().context("failed to read feed")? {
        let Some(event) = decode_frame(&frame) else {
            continue;
        };
        let is_update = matches!(event, FeedEvent::Update(_));
        if sender.send(event).is_err() {
            debug!("feed receiver dropped, stopping reader");
            return Ok(updates);
        }
        if is_update {
            updates += 1;
            if let Some(pacing) = pacing {
                thread::sleep(pacing);
            }
        }
    }

    let _ = sender.send(FeedEvent::Closed);
    Ok(updates)
}

pub fn spawn_reader(source: FeedSource, pacing: Option<Duration>) -> Result<Receiver<FeedEvent>> {
    let reader = source.open()?;
    let (tx, rx) = mpsc::channel();

    thread::Builder::new()
        .name("feed-reader".to_string())
        .spawn(move || match pump_events(reader, &tx, pacing) {
            Ok(updates) => info!(updates, "feed finished"),
            Err(error) => {
                warn!("feed reader failed: {error:#}");
                let _ = tx.send(FeedEvent::Error(format!("{error:#}")));
                let _ = tx.send(FeedEvent::Closed);
            }
        })
        .context("failed to spawn feed reader thread")?;

    info!(?source, "feed reader started");
    Ok(rx)
}
