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

//! Error taxonomies for the execution engine.
//!
//! Selector and inventory errors abort an invocation before any node work
//! starts. Session and pool errors are node-scoped and only ever become
//! per-node outcomes. Report errors are internal invariant violations.

use std::time::Duration;
use thiserror::Error;

/// Errors from resolving a node selector expression.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum SelectorError {
    #[error("invalid node selector '{selector}': {reason}")]
    InvalidSelector { selector: String, reason: String },

    #[error("unknown node '{0}' in selector")]
    UnknownNode(String),
}

/// Errors from building the node inventory.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum InventoryError {
    #[error("duplicate node id {0} in inventory")]
    DuplicateId(u32),
}

/// Errors surfaced by a remote session or while establishing one.
#[derive(Debug, Error)]
pub enum SessionError {
    /// Session establishment failed (network-level).
    #[error("failed to connect: {0}")]
    Connect(String),

    /// The server rejected the credentials. Never retried.
    #[error("authentication rejected: {0}")]
    Auth(String),

    /// An established session broke mid-operation.
    #[error("connection lost: {0}")]
    ConnectionLost(String),

    /// A single attempt exceeded its time budget.
    #[error("attempt timed out after {0:?}")]
    Timeout(Duration),

    /// The remote side reported a non-recoverable execution fault.
    #[error("remote execution failed: {0}")]
    Remote(String),
}

impl SessionError {
    /// Whether retrying the attempt may succeed.
    pub fn is_transient(&self) -> bool {
        match self {
            SessionError::Connect(_)
            | SessionError::ConnectionLost(_)
            | SessionError::Timeout(_) => true,
            SessionError::Auth(_) | SessionError::Remote(_) => false,
        }
    }
}

/// Errors from the connection pool.
#[derive(Debug, Error)]
pub enum PoolError {
    /// Reconnection attempts were exhausted for this node.
    #[error("no usable connection to {node} after {attempts} attempts: {last}")]
    ConnectionUnavailable {
        node: String,
        attempts: u32,
        #[source]
        last: SessionError,
    },
}

/// Internal consistency faults in the result aggregator.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ReportError {
    #[error("duplicate outcome recorded for node {0}")]
    DuplicateOutcome(u32),

    #[error("outcome recorded for node {0}, which was never selected")]
    UnexpectedNode(u32),

    #[error("cannot seal report: {missing} of {expected} nodes have no terminal outcome")]
    Incomplete { expected: usize, missing: usize },
}
