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

//! Subcommand implementations. Each handler resolves its operation, hands
//! it to the shared dispatcher, renders the report, and returns the
//! process exit code (0 when every node succeeded, 1 otherwise).

pub mod exec;
pub mod nodes;
pub mod ping;
pub mod pull;
pub mod run_script;

use anyhow::Result;
use std::path::PathBuf;

use crate::dispatch::{DispatchOptions, Dispatcher};
use crate::node::NodeDescriptor;
use crate::operation::Operation;
use crate::ui;

/// Everything a dispatching subcommand needs, assembled once in `main`.
pub struct ExecutionContext {
    pub nodes: Vec<NodeDescriptor>,
    pub dispatcher: Dispatcher,
    pub options: DispatchOptions,
    pub output: Option<PathBuf>,
    pub quiet: bool,
}

impl ExecutionContext {
    /// Shared tail of every dispatching command.
    pub async fn dispatch(self, operation: Operation) -> Result<i32> {
        let report = self
            .dispatcher
            .run(self.nodes, operation, self.options)
            .await?;

        ui::print_report(&report, self.quiet);
        if let Some(path) = &self.output {
            ui::export_json(&report, path)?;
        }

        Ok(if report.all_succeeded() { 0 } else { 1 })
    }
}
