// Copyright 2025 The fleetrun Authors
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Terminal rendering of run reports, and JSON export.

use anyhow::{Context, Result};
use owo_colors::OwoColorize;
use std::path::Path;
use std::time::Duration;

use crate::report::{OutcomeStatus, RunReport};

/// Print one block per node in id order, then the summary line.
pub fn print_report(report: &RunReport, quiet: bool) {
    if !quiet {
        for outcome in report.outcomes.values() {
            let marker = match outcome.status {
                OutcomeStatus::Success => "✓".green().to_string(),
                OutcomeStatus::Failed => "✗".red().to_string(),
                OutcomeStatus::TimedOut => "⏱".yellow().to_string(),
            };
            println!(
                "{} [{}] {} ({}) — {} attempt(s), {}",
                marker,
                outcome.node_id,
                outcome.node_name.bold(),
                outcome.host,
                outcome.attempts,
                format_duration(outcome.duration)
            );

            if !outcome.stdout.is_empty() {
                for line in outcome.stdout.lines() {
                    println!("  {line}");
                }
            }
            if !outcome.stderr.is_empty() {
                for line in outcome.stderr.lines() {
                    eprintln!("  {}", line.dimmed());
                }
            }
            if let Some(error) = &outcome.error {
                println!("  {}", error.red());
            }
        }
        println!();
    }

    print_summary(report);
}

fn print_summary(report: &RunReport) {
    let s = &report.summary;
    let counts = format!(
        "{} succeeded, {} failed, {} timed out (of {})",
        s.succeeded, s.failed, s.timed_out, s.total
    );
    if report.all_succeeded() {
        println!("{} {}", "Summary:".bold(), counts.green());
    } else {
        println!("{} {}", "Summary:".bold(), counts.red());
    }
    println!(
        "Duration: p50 {}, p95 {}",
        format_duration(s.p50_duration),
        format_duration(s.p95_duration)
    );

    for failed in &s.failed_nodes {
        println!(
            "  {} [{}] {}: {}",
            "failed".red(),
            failed.node_id,
            failed.node_name,
            failed.error
        );
    }
}

/// Write the full report as pretty-printed JSON.
pub fn export_json(report: &RunReport, path: &Path) -> Result<()> {
    let json = serde_json::to_string_pretty(report).context("serializing report")?;
    std::fs::write(path, json)
        .with_context(|| format!("failed to write report to {}", path.display()))?;
    println!("Report written to {}", path.display());
    Ok(())
}

fn format_duration(d: Duration) -> String {
    if d.as_secs() >= 60 {
        format!("{}m{:02}s", d.as_secs() / 60, d.as_secs() % 60)
    } else if d.as_secs() >= 1 {
        format!("{:.1}s", d.as_secs_f64())
    } else {
        format!("{}ms", d.as_millis())
    }
}
