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

//! The task dispatcher: fans one operation out across the selected nodes.
//!
//! One tokio task per node, admitted under a global semaphore so a fleet of
//! thousands never opens thousands of simultaneous sessions. Each task runs
//! a bounded retry loop: transient failures (connection loss, attempt
//! timeout) back off and retry until the budget is spent; terminal failures
//! (auth rejection, exhausted reconnects, fatal nonzero exit) are recorded
//! immediately. The failure of one node never halts progress on another.
//!
//! A global deadline cancels the whole run through a `CancellationToken`;
//! nodes that were cancelled, or never admitted, are recorded as timed out
//! so the sealed report always covers the full selected set.

use anyhow::{Context, Result};
use chrono::Utc;
use futures::future::join_all;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Semaphore;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::node::NodeDescriptor;
use crate::operation::{ExitPolicy, Operation};
use crate::pool::{ConnectionPool, PoolConfig};
use crate::report::{Aggregator, Outcome, RunReport};
use crate::transport::{ExecOutput, Transport};

/// Per-invocation dispatch tuning.
#[derive(Debug, Clone)]
pub struct DispatchOptions {
    /// Tasks allowed to run remote work simultaneously.
    pub max_concurrency: usize,
    /// Retries after the initial attempt, so the attempt budget is
    /// `1 + max_retries`.
    pub max_retries: u32,
    /// Time budget for one attempt, connection establishment included.
    pub task_timeout: Duration,
    /// Delay between a failed attempt and its retry.
    pub retry_delay: Duration,
    /// Wall-clock budget for the whole run.
    pub deadline: Option<Duration>,
    /// How a completed command with nonzero exit is classified.
    pub nonzero_exit: ExitPolicy,
}

impl Default for DispatchOptions {
    fn default() -> Self {
        Self {
            max_concurrency: 10,
            max_retries: 3,
            task_timeout: Duration::from_secs(300),
            retry_delay: Duration::from_secs(5),
            deadline: None,
            nonzero_exit: ExitPolicy::Fatal,
        }
    }
}

/// The multi-node execution engine.
///
/// Holds the connection pool so sessions are reused across consecutive
/// dispatches within one run (e.g. a pull followed by a script).
pub struct Dispatcher {
    pool: Arc<ConnectionPool>,
}

impl Dispatcher {
    pub fn new(transport: Arc<dyn Transport>, pool_config: PoolConfig) -> Self {
        Self {
            pool: Arc::new(ConnectionPool::new(transport, pool_config)),
        }
    }

    /// Pool instrumentation, used by tests and diagnostics.
    pub fn pool(&self) -> &ConnectionPool {
        &self.pool
    }

    /// Run `operation` on every node in `nodes` and seal the results.
    ///
    /// Node-local failures become per-node outcomes, never errors; the
    /// returned report covers every selected node exactly once.
    pub async fn run(
        &self,
        nodes: Vec<NodeDescriptor>,
        operation: Operation,
        options: DispatchOptions,
    ) -> Result<RunReport> {
        info!(
            nodes = nodes.len(),
            operation = %operation.describe(),
            max_concurrency = options.max_concurrency,
            "dispatching"
        );

        let aggregator = Arc::new(Aggregator::new(nodes.iter().map(|n| n.id)));
        let semaphore = Arc::new(Semaphore::new(options.max_concurrency.max(1)));
        let cancel = CancellationToken::new();

        if let Some(deadline) = options.deadline {
            let cancel = cancel.clone();
            tokio::spawn(async move {
                tokio::time::sleep(deadline).await;
                warn!(?deadline, "global deadline reached, cancelling in-flight tasks");
                cancel.cancel();
            });
        }

        let operation = Arc::new(operation);
        let handles: Vec<_> = nodes
            .iter()
            .cloned()
            .map(|node| {
                let pool = Arc::clone(&self.pool);
                let operation = Arc::clone(&operation);
                let options = options.clone();
                let semaphore = Arc::clone(&semaphore);
                let cancel = cancel.clone();
                let aggregator = Arc::clone(&aggregator);

                tokio::spawn(async move {
                    let outcome =
                        run_node_task(&pool, &node, &operation, &options, semaphore, cancel).await;
                    aggregator.record(outcome)
                })
            })
            .collect();

        for (result, node) in join_all(handles).await.into_iter().zip(&nodes) {
            match result {
                Ok(recorded) => {
                    recorded.with_context(|| format!("recording outcome for {node}"))?
                }
                Err(join_err) => {
                    // A panicking task must not hole the report.
                    error!(node = %node, error = %join_err, "task panicked");
                    aggregator
                        .record(Outcome::failed(
                            node,
                            0,
                            None,
                            String::new(),
                            String::new(),
                            format!("task execution failed: {join_err}"),
                            Utc::now(),
                            Duration::ZERO,
                        ))
                        .with_context(|| format!("recording panic outcome for {node}"))?;
                }
            }
        }

        let report = aggregator.seal().context("sealing run report")?;
        info!(
            succeeded = report.summary.succeeded,
            failed = report.summary.failed,
            timed_out = report.summary.timed_out,
            "dispatch complete"
        );
        Ok(report)
    }
}

/// Result of one attempt, classified for the retry loop.
enum Attempt {
    Success(ExecOutput),
    Transient(String, Option<ExecOutput>),
    Fatal(String, Option<ExecOutput>),
}

/// Drive one node through admission, attempts, and retries to a terminal
/// outcome. Always returns an outcome; errors never escape the task.
async fn run_node_task(
    pool: &ConnectionPool,
    node: &NodeDescriptor,
    operation: &Operation,
    options: &DispatchOptions,
    semaphore: Arc<Semaphore>,
    cancel: CancellationToken,
) -> Outcome {
    let started_at = Utc::now();
    let clock = Instant::now();

    let _permit = tokio::select! {
        _ = cancel.cancelled() => {
            return Outcome::timed_out(
                node,
                0,
                "global deadline reached before the task started".to_string(),
                started_at,
                clock.elapsed(),
            );
        }
        permit = semaphore.acquire_owned() => match permit {
            Ok(permit) => permit,
            Err(_) => {
                return Outcome::failed(
                    node,
                    0,
                    None,
                    String::new(),
                    String::new(),
                    "task admission failed: semaphore closed".to_string(),
                    started_at,
                    clock.elapsed(),
                );
            }
        },
    };

    let budget = options.max_retries.saturating_add(1);
    let mut attempts = 0u32;

    loop {
        attempts += 1;
        debug!(node = %node, attempt = attempts, budget, "starting attempt");

        let attempt = tokio::select! {
            _ = cancel.cancelled() => {
                return Outcome::timed_out(
                    node,
                    attempts,
                    "global deadline reached mid-attempt".to_string(),
                    started_at,
                    clock.elapsed(),
                );
            }
            attempt = attempt_once(pool, node, operation, options) => attempt,
        };

        match attempt {
            Attempt::Success(output) => {
                if attempts > 1 {
                    info!(node = %node, attempts, "succeeded after retry");
                }
                return Outcome::success(
                    node,
                    attempts,
                    output.exit_code,
                    output.stdout,
                    output.stderr,
                    started_at,
                    clock.elapsed(),
                );
            }
            Attempt::Fatal(detail, output) => {
                error!(node = %node, attempts, error = %detail, "terminal failure");
                let (exit_code, stdout, stderr) = split_output(output);
                return Outcome::failed(
                    node, attempts, exit_code, stdout, stderr, detail, started_at,
                    clock.elapsed(),
                );
            }
            Attempt::Transient(detail, output) => {
                if attempts >= budget {
                    error!(node = %node, attempts, error = %detail, "retries exhausted");
                    let (exit_code, stdout, stderr) = split_output(output);
                    return Outcome::failed(
                        node,
                        attempts,
                        exit_code,
                        stdout,
                        stderr,
                        format!("retries exhausted after {attempts} attempts: {detail}"),
                        started_at,
                        clock.elapsed(),
                    );
                }
                warn!(
                    node = %node,
                    attempt = attempts,
                    error = %detail,
                    delay = ?options.retry_delay,
                    "transient failure, retrying"
                );
                tokio::select! {
                    _ = cancel.cancelled() => {
                        return Outcome::timed_out(
                            node,
                            attempts,
                            "global deadline reached while waiting to retry".to_string(),
                            started_at,
                            clock.elapsed(),
                        );
                    }
                    _ = tokio::time::sleep(options.retry_delay) => {}
                }
            }
        }
    }
}

/// One attempt: lease a session, run the operation, classify the result.
/// The whole attempt, connection establishment included, is bounded by the
/// per-task timeout; on expiry the leased session is dropped as broken.
async fn attempt_once(
    pool: &ConnectionPool,
    node: &NodeDescriptor,
    operation: &Operation,
    options: &DispatchOptions,
) -> Attempt {
    let attempt = async {
        let mut lease = match pool.acquire(node).await {
            Ok(lease) => lease,
            // The pool has already retried reconnection with backoff.
            Err(err) => return Attempt::Fatal(err.to_string(), None),
        };

        match lease.exec(&operation.remote_command()).await {
            Ok(output) if output.is_success() => {
                lease.release(true);
                Attempt::Success(output)
            }
            Ok(output) => {
                // The session did its job; only the command failed.
                lease.release(true);
                let detail = format!("command exited with code {}", output.exit_code);
                if operation.nonzero_exit_is_transient(options.nonzero_exit, &output.stderr) {
                    Attempt::Transient(detail, Some(output))
                } else {
                    Attempt::Fatal(detail, Some(output))
                }
            }
            Err(err) => {
                lease.release(false);
                let detail = err.to_string();
                if err.is_transient() {
                    Attempt::Transient(detail, None)
                } else {
                    Attempt::Fatal(detail, None)
                }
            }
        }
    };

    match tokio::time::timeout(options.task_timeout, attempt).await {
        Ok(attempt) => attempt,
        Err(_) => Attempt::Transient(
            format!("attempt timed out after {:?}", options.task_timeout),
            None,
        ),
    }
}

fn split_output(output: Option<ExecOutput>) -> (Option<u32>, String, String) {
    match output {
        Some(output) => (Some(output.exit_code), output.stdout, output.stderr),
        None => (None, String::new(), String::new()),
    }
}
