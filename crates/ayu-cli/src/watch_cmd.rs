//! `ayu watch`: a headless observer that logs what the producer sends.
//!
//! With `--record`, every received event is also appended to a file in the
//! JSON-lines format `ayu emit` replays.

use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;
use std::sync::{Arc, Mutex};

use anyhow::{Context, Result};

use ayu_core::channel::{listen, ChannelConfig};
use ayu_core::event::{Event, EventKind};
use ayu_core::registry::SharedRegistry;
use ayu_core::session::{Session, SharedSession};

/// One log line's worth of fields for an event, after it was applied.
pub fn describe(event: &Event, session: &Session) -> String {
    let counters = session.tree().counters();
    match event {
        Event::Collection(_) => format!("collected {} tests", session.tree().total_leaves()),
        Event::Scheduled(ids) => format!("{} scheduled, {} queued", ids.len(), counters.queued),
        Event::Outcome(p) => format!(
            "{} {} ({} passed, {} failed, {} queued)",
            p.nodeid, p.outcome, counters.passed, counters.failed, counters.queued
        ),
        Event::Coverage(_) => {
            let summary = session.coverage().summary();
            format!("{:.1}% of {} statements covered", summary.percent_covered, summary.statements_total)
        }
        Event::Report(value) | Event::Debug(value) => value.to_string(),
    }
}

/// Appends events to a replayable recording.
pub struct Recorder<W: Write> {
    out: W,
    written: usize,
}

impl<W: Write> Recorder<W> {
    /// Start a recording, writing a `#` header line with the local time.
    pub fn new(mut out: W) -> std::io::Result<Self> {
        writeln!(
            out,
            "# recorded by ayu watch at {}",
            chrono::Local::now().format("%Y-%m-%d %H:%M:%S")
        )?;
        Ok(Self { out, written: 0 })
    }

    pub fn record(&mut self, event: &Event) -> std::io::Result<()> {
        let line = serde_json::to_string(event)?;
        writeln!(self.out, "{line}")?;
        self.written += 1;
        Ok(())
    }

    pub fn written(&self) -> usize {
        self.written
    }

    pub fn flush(&mut self) -> std::io::Result<()> {
        self.out.flush()
    }
}

type SharedRecorder = Arc<Mutex<Recorder<BufWriter<File>>>>;

pub async fn run_watch(config: &ChannelConfig, record: Option<&Path>) -> Result<()> {
    let recorder: Option<SharedRecorder> = match record {
        Some(path) => {
            let file = File::create(path)
                .with_context(|| format!("failed to create {}", path.display()))?;
            let recorder = Recorder::new(BufWriter::new(file))
                .with_context(|| format!("failed to write {}", path.display()))?;
            Some(Arc::new(Mutex::new(recorder)))
        }
        None => None,
    };

    let session = SharedSession::new();
    let registry = SharedRegistry::new();
    for kind in EventKind::ALL {
        let session = session.clone();
        let recorder = recorder.clone();
        registry.register(
            kind,
            Box::new(move |event| {
                let mut state = session.write();
                state.apply(event);
                tracing::info!(kind = %event.kind(), "{}", describe(event, &state));

                if let Some(recorder) = &recorder {
                    let mut recorder = recorder.lock().unwrap_or_else(|e| e.into_inner());
                    if let Err(e) = recorder.record(event) {
                        tracing::warn!(error = %e, "failed to record event");
                    }
                }
            }),
        );
    }

    let listener = listen(config, registry)
        .await
        .with_context(|| format!("failed to listen on {}", config.addr()))?;
    println!("watching on {} (Ctrl-C to stop)", listener.local_addr());

    tokio::signal::ctrl_c()
        .await
        .context("failed to wait for Ctrl-C")?;
    listener.shutdown().await;

    let state = session.read();
    let counters = state.tree().counters();
    println!(
        "{} tests: {} passed, {} failed, {} skipped, {} errors, {} still queued",
        state.tree().total_leaves(),
        counters.passed,
        counters.failed,
        counters.skipped,
        counters.error,
        counters.queued
    );
    drop(state);

    if let (Some(recorder), Some(path)) = (&recorder, record) {
        let mut recorder = recorder.lock().unwrap_or_else(|e| e.into_inner());
        recorder
            .flush()
            .with_context(|| format!("failed to flush {}", path.display()))?;
        println!("recorded {} events to {}", recorder.written(), path.display());
    }
    Ok(())
}
