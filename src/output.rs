use std::io::{self, Write};

use serde::Serialize;
use tracing::info;

use crate::app::{PrepareOutcome, ProgressEvent, ProgressSink};

#[derive(Debug, Clone, Copy)]
pub enum OutputMode {
    Human,
    Json,
}

pub struct JsonOutput;

impl JsonOutput {
    pub fn print_outcomes(outcomes: &[PrepareOutcome]) -> io::Result<()> {
        Self::print_json(&outcomes)
    }

    fn print_json<T: Serialize>(value: &T) -> io::Result<()> {
        let json = serde_json::to_string_pretty(value).map_err(io::Error::other)?;
        let mut stdout = io::stdout();
        stdout.write_all(json.as_bytes())?;
        stdout.write_all(b"\n")?;
        Ok(())
    }
}

impl ProgressSink for JsonOutput {
    fn event(&self, _event: ProgressEvent) {}
}

/// Forwards progress events to the log.
pub struct LogProgress;

impl ProgressSink for LogProgress {
    fn event(&self, event: ProgressEvent) {
        match event.elapsed {
            Some(elapsed) => info!(elapsed = ?elapsed, "{}", event.message),
            None => info!("{}", event.message),
        }
    }
}

pub fn print_summary(outcomes: &[PrepareOutcome]) {
    for outcome in outcomes {
        match outcome {
            PrepareOutcome::Prepared(report) => {
                let mode = if report.quick { " (quick)" } else { "" };
                println!("prepared {}{mode} -> {}", report.part, report.run_dir);
                println!(
                    "  reads: {} linked, {} missing; read list: {} entries",
                    report.staged.len(),
                    report.skipped.len(),
                    report.read_entries
                );
                for missing in &report.skipped {
                    println!("  missing: {missing}");
                }
                if !report.dependencies.is_empty() {
                    println!("  dependencies: {} binaries linked", report.dependencies.len());
                }
            }
            PrepareOutcome::Skipped { part, reason } => {
                println!("skipped {part}: {reason}");
            }
        }
    }
}
