use anyhow::{Context, Result};
use regex::Regex;
use std::io::BufRead;
use std::sync::LazyLock;
use tokio::sync::mpsc;

use crate::messages::Intent;

static SEEK: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^seek\s+(\d+(?:\.\d+)?)\s*(%)?$").unwrap());

static LOOP: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^loop\s+(on|off)$").unwrap());

pub const HELP: &str =
    "commands: record|r, play|pause|p, stop|s, seek <0..1>|seek <n>%, loop on|off, quit|q";

/// Parse one line of terminal input. Blank lines yield `None`.
pub fn parse_command(line: &str) -> Result<Option<Intent>> {
    let line = line.trim().to_lowercase();

    let intent = match line.as_str() {
        "" => return Ok(None),
        "record" | "r" => Intent::ToggleRecord,
        "play" | "pause" | "p" => Intent::PlayPause,
        "stop" | "s" => Intent::Stop,
        "quit" | "q" | "exit" => Intent::Shutdown,
        other => {
            if let Some(caps) = SEEK.captures(other) {
                let value: f64 = caps[1].parse().context("Invalid seek position")?;
                let fraction = if caps.get(2).is_some() { value / 100.0 } else { value };
                if !(0.0..=1.0).contains(&fraction) {
                    anyhow::bail!("Seek position must be between 0 and 1 (or 0% and 100%)");
                }
                Intent::Seek(fraction)
            } else if let Some(caps) = LOOP.captures(other) {
                Intent::SetLooping(&caps[1] == "on")
            } else {
                anyhow::bail!("Unknown command '{}'. {}", other, HELP);
            }
        }
    };

    Ok(Some(intent))
}

/// Read commands from stdin on a dedicated thread and forward them as
/// intents. Sends `Intent::Shutdown` when stdin closes.
///
/// Note: tokio's stdin would block runtime shutdown until the next line.
pub fn spawn_stdin_reader(tx: mpsc::Sender<Intent>) {
    std::thread::spawn(move || {
        tracing::info!("Ready. {}", HELP);

        for line in std::io::stdin().lock().lines() {
            let line = match line {
                Ok(line) => line,
                Err(e) => {
                    tracing::error!("Failed to read stdin: {}", e);
                    break;
                }
            };

            match parse_command(&line) {
                Ok(Some(intent)) => {
                    tracing::debug!("Command parsed: {:?}", intent);
                    if tx.blocking_send(intent).is_err() {
                        return;
                    }
                }
                Ok(None) => {}
                Err(e) => tracing::warn!("{:#}", e),
            }
        }

        let _ = tx.blocking_send(Intent::Shutdown);
    });
}
