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

//! Per-node outcomes and the run-level report.
//!
//! The aggregator accepts outcomes in completion order from concurrent
//! tasks and seals them into a report ordered by node id. Every node that
//! was selected appears exactly once in the sealed report.

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Mutex;
use std::time::Duration;

use crate::error::ReportError;
use crate::node::NodeDescriptor;

/// Terminal state of one node's task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum OutcomeStatus {
    Success,
    Failed,
    TimedOut,
}

/// The immutable record of what happened on one node.
#[derive(Debug, Clone, Serialize)]
pub struct Outcome {
    pub node_id: u32,
    pub node_name: String,
    pub host: String,
    pub status: OutcomeStatus,
    /// Attempts actually started; 0 for tasks cancelled before admission.
    pub attempts: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub exit_code: Option<u32>,
    pub stdout: String,
    pub stderr: String,
    pub started_at: DateTime<Utc>,
    pub duration: Duration,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl Outcome {
    pub fn success(
        node: &NodeDescriptor,
        attempts: u32,
        exit_code: u32,
        stdout: String,
        stderr: String,
        started_at: DateTime<Utc>,
        duration: Duration,
    ) -> Self {
        Self {
            node_id: node.id,
            node_name: node.name.clone(),
            host: node.host.clone(),
            status: OutcomeStatus::Success,
            attempts,
            exit_code: Some(exit_code),
            stdout,
            stderr,
            started_at,
            duration,
            error: None,
        }
    }

    pub fn failed(
        node: &NodeDescriptor,
        attempts: u32,
        exit_code: Option<u32>,
        stdout: String,
        stderr: String,
        error: String,
        started_at: DateTime<Utc>,
        duration: Duration,
    ) -> Self {
        Self {
            node_id: node.id,
            node_name: node.name.clone(),
            host: node.host.clone(),
            status: OutcomeStatus::Failed,
            attempts,
            exit_code,
            stdout,
            stderr,
            started_at,
            duration,
            error: Some(error),
        }
    }

    pub fn timed_out(
        node: &NodeDescriptor,
        attempts: u32,
        error: String,
        started_at: DateTime<Utc>,
        duration: Duration,
    ) -> Self {
        Self {
            node_id: node.id,
            node_name: node.name.clone(),
            host: node.host.clone(),
            status: OutcomeStatus::TimedOut,
            attempts,
            exit_code: None,
            stdout: String::new(),
            stderr: String::new(),
            started_at,
            duration,
            error: Some(error),
        }
    }

    pub fn is_success(&self) -> bool {
        self.status == OutcomeStatus::Success
    }
}

/// Collects outcomes from concurrent tasks, one per selected node.
#[derive(Debug)]
pub struct Aggregator {
    expected: BTreeSet<u32>,
    outcomes: Mutex<BTreeMap<u32, Outcome>>,
}

impl Aggregator {
    pub fn new(expected: impl IntoIterator<Item = u32>) -> Self {
        Self {
            expected: expected.into_iter().collect(),
            outcomes: Mutex::new(BTreeMap::new()),
        }
    }

    /// Record a terminal outcome. A second record for the same node, or a
    /// record for a node outside the selected set, is a programming fault.
    pub fn record(&self, outcome: Outcome) -> Result<(), ReportError> {
        if !self.expected.contains(&outcome.node_id) {
            return Err(ReportError::UnexpectedNode(outcome.node_id));
        }
        let mut outcomes = self.outcomes.lock().unwrap_or_else(|e| e.into_inner());
        if outcomes.contains_key(&outcome.node_id) {
            return Err(ReportError::DuplicateOutcome(outcome.node_id));
        }
        outcomes.insert(outcome.node_id, outcome);
        Ok(())
    }

    /// Seal the collected outcomes into the final report. Valid only once
    /// every expected node has a terminal outcome.
    pub fn seal(&self) -> Result<RunReport, ReportError> {
        let mut outcomes = self.outcomes.lock().unwrap_or_else(|e| e.into_inner());
        let missing = self
            .expected
            .iter()
            .filter(|id| !outcomes.contains_key(id))
            .count();
        if missing > 0 {
            return Err(ReportError::Incomplete {
                expected: self.expected.len(),
                missing,
            });
        }
        let outcomes = std::mem::take(&mut *outcomes);
        let summary = Summary::compute(&outcomes);
        Ok(RunReport { outcomes, summary })
    }
}

/// A failed or timed-out node with its error detail.
#[derive(Debug, Clone, Serialize)]
pub struct FailedNode {
    pub node_id: u32,
    pub node_name: String,
    pub error: String,
}

/// Run-level statistics over the sealed outcomes.
#[derive(Debug, Clone, Serialize)]
pub struct Summary {
    pub total: usize,
    pub succeeded: usize,
    pub failed: usize,
    pub timed_out: usize,
    pub p50_duration: Duration,
    pub p95_duration: Duration,
    pub failed_nodes: Vec<FailedNode>,
}

impl Summary {
    fn compute(outcomes: &BTreeMap<u32, Outcome>) -> Self {
        let mut succeeded = 0;
        let mut failed = 0;
        let mut timed_out = 0;
        let mut failed_nodes = Vec::new();
        let mut durations: Vec<Duration> = Vec::with_capacity(outcomes.len());

        for outcome in outcomes.values() {
            durations.push(outcome.duration);
            match outcome.status {
                OutcomeStatus::Success => succeeded += 1,
                OutcomeStatus::Failed => failed += 1,
                OutcomeStatus::TimedOut => timed_out += 1,
            }
            if outcome.status != OutcomeStatus::Success {
                failed_nodes.push(FailedNode {
                    node_id: outcome.node_id,
                    node_name: outcome.node_name.clone(),
                    error: outcome
                        .error
                        .clone()
                        .unwrap_or_else(|| "unknown error".to_string()),
                });
            }
        }

        durations.sort_unstable();
        Self {
            total: outcomes.len(),
            succeeded,
            failed,
            timed_out,
            p50_duration: percentile(&durations, 50),
            p95_duration: percentile(&durations, 95),
            failed_nodes,
        }
    }
}

/// Nearest-rank percentile over an ascending-sorted slice.
fn percentile(sorted: &[Duration], pct: u32) -> Duration {
    if sorted.is_empty() {
        return Duration::ZERO;
    }
    let rank = (pct as usize * sorted.len()).div_ceil(100);
    sorted[rank.saturating_sub(1).min(sorted.len() - 1)]
}

/// The complete, per-node result set for one dispatch invocation.
#[derive(Debug, Clone, Serialize)]
pub struct RunReport {
    /// Ordered by ascending node id, independent of completion order.
    pub outcomes: BTreeMap<u32, Outcome>,
    pub summary: Summary,
}

impl RunReport {
    pub fn all_succeeded(&self) -> bool {
        self.summary.succeeded == self.summary.total
    }

    /// Count of nodes that did not succeed (failed or timed out).
    pub fn failure_count(&self) -> usize {
        self.summary.failed + self.summary.timed_out
    }
}
