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

use clap::{Parser, Subcommand};
use std::path::PathBuf;

use crate::config::DEFAULT_CONFIG_PATH;

#[derive(Parser, Debug)]
#[command(
    name = "fleetrun",
    about = "Run commands, image pulls, and scripts across a cluster in parallel",
    version
)]
pub struct Cli {
    /// Path to the YAML configuration file
    #[arg(short, long, global = true, default_value = DEFAULT_CONFIG_PATH)]
    pub config: PathBuf,

    /// Node selector: "all", ids ("0,3"), ranges ("0-5"), names, hosts,
    /// or any comma-separated mix
    #[arg(short, long, global = true, default_value = "all")]
    pub nodes: String,

    /// Maximum tasks running at once
    #[arg(long, global = true)]
    pub max_concurrency: Option<usize>,

    /// Retries after the first failed attempt
    #[arg(long, global = true)]
    pub max_retries: Option<u32>,

    /// Per-task timeout in seconds, connection time included
    #[arg(short = 't', long, global = true)]
    pub timeout: Option<u64>,

    /// Delay in seconds between retry attempts
    #[arg(long, global = true)]
    pub retry_delay: Option<u64>,

    /// Abort the whole run after this many seconds
    #[arg(long, global = true)]
    pub deadline: Option<u64>,

    /// Treat nonzero command exits as transient and retry them
    #[arg(long, global = true)]
    pub retry_on_failure: bool,

    /// Write the full report as JSON to this file
    #[arg(short, long, global = true)]
    pub output: Option<PathBuf>,

    /// Increase log verbosity (-v: debug, -vv: trace)
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    pub verbose: u8,

    /// Suppress everything except errors and the final summary
    #[arg(short, long, global = true, conflicts_with = "verbose")]
    pub quiet: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run a shell command on the selected nodes
    Exec {
        /// The command and its arguments
        #[arg(required = true, trailing_var_arg = true, allow_hyphen_values = true)]
        command: Vec<String>,
    },

    /// Pull a container image on the selected nodes
    Pull {
        /// Image reference, e.g. nginx:1.27
        image: String,
    },

    /// Run a local script file (or a literal body) on the selected nodes
    RunScript {
        /// Literal script body to run instead of a file
        #[arg(short, long, value_name = "BODY")]
        inline: Option<String>,

        /// Script path (omitted with --inline), then positional arguments
        #[arg(
            value_name = "SCRIPT [ARGS]...",
            required_unless_present = "inline",
            trailing_var_arg = true,
            allow_hyphen_values = true
        )]
        args: Vec<String>,
    },

    /// List the configured inventory and what a selector resolves to
    Nodes,

    /// Check connectivity to the selected nodes
    Ping,
}
