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

//! The unit of work to run remotely, and how failures of each kind are
//! classified for retry purposes.

use serde::{Deserialize, Serialize};

/// Policy for commands that run to completion but exit nonzero.
///
/// Whether such an exit is worth retrying is an operator decision: a
/// deterministic failure re-fails on every attempt, but flaky commands
/// (e.g. racing against a mount) can be retried like transient errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ExitPolicy {
    /// Nonzero exit is terminal; fail the node immediately.
    #[default]
    Fatal,
    /// Nonzero exit follows the transient path and consumes retry budget.
    Retry,
}

/// One operation fanned out across the selected nodes.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "kind", rename_all = "kebab-case")]
pub enum Operation {
    /// Run a shell command verbatim.
    Command { command: String },

    /// Pull a container image on every node.
    Pull { image: String },

    /// Run a script body inline, with optional positional arguments.
    RunScript { body: String, args: String },
}

impl Operation {
    /// Short human-readable label for log lines and report headers.
    pub fn describe(&self) -> String {
        match self {
            Operation::Command { command } => format!("exec: {command}"),
            Operation::Pull { image } => format!("pull: {image}"),
            Operation::RunScript { .. } => "run-script".to_string(),
        }
    }

    /// Lower the operation to the command string sent over the session.
    pub fn remote_command(&self) -> String {
        match self {
            Operation::Command { command } => command.clone(),
            Operation::Pull { image } => format!("docker pull {image}"),
            Operation::RunScript { body, args } => inline_script(body, args),
        }
    }

    /// Whether a nonzero exit from this operation should follow the
    /// transient (retryable) path.
    ///
    /// Commands and scripts follow the configured [`ExitPolicy`]. Image
    /// pulls are classified from the failure text instead: registry auth,
    /// missing images, and full disks will not heal on retry, while
    /// network-level failures might.
    pub fn nonzero_exit_is_transient(&self, policy: ExitPolicy, stderr: &str) -> bool {
        match self {
            Operation::Pull { .. } => pull_failure_is_transient(stderr),
            Operation::Command { .. } | Operation::RunScript { .. } => policy == ExitPolicy::Retry,
        }
    }
}

/// Build the inline form of a script run: positional arguments are bound
/// with `set --` ahead of the body, so `$1`, `$2`, ... work as expected.
fn inline_script(body: &str, args: &str) -> String {
    if args.trim().is_empty() {
        return body.to_string();
    }
    let quoted: Vec<String> = args
        .split_whitespace()
        .map(|arg| format!("\"{arg}\""))
        .collect();
    format!("set -- {}\n{}", quoted.join(" "), body)
}

/// Classify a failed `docker pull` from its stderr.
pub fn pull_failure_is_transient(stderr: &str) -> bool {
    const TERMINAL: &[&str] = &[
        "unauthorized",
        "authentication required",
        "denied",
        "no space left on device",
        "manifest unknown",
        "repository does not exist",
        "not found",
        "invalid reference format",
    ];
    let text = stderr.to_ascii_lowercase();
    !TERMINAL.iter().any(|needle| text.contains(needle))
}
