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

use anyhow::{Context, Result};
use std::fs::OpenOptions;
use std::path::Path;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

/// Build the log filter. `RUST_LOG` wins when set so dependency logs can
/// be enabled for troubleshooting; otherwise the flags decide.
pub fn create_env_filter(verbosity: u8, quiet: bool, base_level: &str) -> EnvFilter {
    if std::env::var("RUST_LOG").is_ok() {
        return EnvFilter::from_default_env();
    }
    let directive = if quiet {
        "fleetrun=error".to_string()
    } else {
        match verbosity {
            0 => format!("fleetrun={base_level}"),
            1 => "fleetrun=debug".to_string(),
            _ => "fleetrun=trace".to_string(),
        }
    };
    EnvFilter::new(directive)
}

/// Initialize the global subscriber: stderr by default, or a log file when
/// one is configured so command output on stdout stays clean.
pub fn init_logging(
    verbosity: u8,
    quiet: bool,
    base_level: &str,
    log_file: Option<&Path>,
) -> Result<()> {
    let filter = create_env_filter(verbosity, quiet, base_level);

    match log_file {
        Some(path) => {
            let file = OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)
                .with_context(|| format!("failed to open log file {}", path.display()))?;
            tracing_subscriber::fmt()
                .with_env_filter(filter)
                .with_target(false)
                .with_ansi(false)
                .with_writer(Arc::new(file))
                .init();
        }
        None => {
            tracing_subscriber::fmt()
                .with_env_filter(filter)
                .with_target(false)
                .with_writer(std::io::stderr)
                .init();
        }
    }
    Ok(())
}
