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

//! The seam between the engine and the remote-execution protocol.
//!
//! The pool and dispatcher only ever see these traits. The production
//! implementation lives in [`crate::ssh`]; tests substitute scripted
//! in-memory sessions.

use async_trait::async_trait;

use crate::error::SessionError;
use crate::node::NodeDescriptor;

/// Captured result of one remote execution.
#[derive(Debug, Clone, Default)]
pub struct ExecOutput {
    pub exit_code: u32,
    pub stdout: String,
    pub stderr: String,
}

impl ExecOutput {
    pub fn is_success(&self) -> bool {
        self.exit_code == 0
    }
}

/// One authenticated session against a single node.
///
/// A session is owned by the connection pool and leased to at most one task
/// at a time, so methods take `&mut self`.
#[async_trait]
pub trait RemoteSession: Send + Sync {
    /// Run a command and wait for it to finish.
    async fn exec(&mut self, command: &str) -> Result<ExecOutput, SessionError>;

    /// Lightweight liveness probe, run before a cached session is reused.
    async fn is_alive(&mut self) -> bool;
}

/// Factory for sessions; one per remote-execution protocol.
#[async_trait]
pub trait Transport: Send + Sync {
    async fn connect(&self, node: &NodeDescriptor)
        -> Result<Box<dyn RemoteSession>, SessionError>;
}
