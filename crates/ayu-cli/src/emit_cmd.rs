//! `ayu emit`: replay events from a file into a listening dashboard.
//!
//! The file holds one encoded event per line (the same JSON a frame body
//! carries). Blank lines and lines starting with `#` are skipped.

use std::path::Path;
use std::time::Duration;

use anyhow::{Context, Result};

use ayu_core::channel::ChannelConfig;
use ayu_core::emitter::Emitter;
use ayu_core::event::{self, Event};

/// Parse every event up front so a bad file sends nothing.
pub fn parse_events(contents: &str) -> Result<Vec<Event>> {
    contents
        .lines()
        .enumerate()
        .filter(|(_, line)| {
            let line = line.trim();
            !line.is_empty() && !line.starts_with('#')
        })
        .map(|(i, line)| {
            event::decode(line.trim().as_bytes()).with_context(|| format!("line {}: invalid event", i + 1))
        })
        .collect()
}

pub async fn run_emit(config: &ChannelConfig, file: &Path, delay_ms: u64) -> Result<()> {
    let contents = std::fs::read_to_string(file)
        .with_context(|| format!("failed to read {}", file.display()))?;
    let events = parse_events(&contents)?;

    let mut emitter = Emitter::connect(config).await;
    if !emitter.is_enabled() {
        println!("no dashboard at {}; nothing sent", config.addr());
        return Ok(());
    }

    for event in &events {
        emitter.emit(event).await;
        if delay_ms > 0 {
            tokio::time::sleep(Duration::from_millis(delay_ms)).await;
        }
    }
    emitter.close().await;

    println!(
        "sent {} of {} events to {}",
        emitter.sent(),
        events.len(),
        config.addr()
    );
    Ok(())
}
