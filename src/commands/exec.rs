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

use anyhow::Result;

use super::ExecutionContext;
use crate::operation::Operation;

/// Run an arbitrary shell command across the selected nodes.
pub async fn run(ctx: ExecutionContext, command: Vec<String>) -> Result<i32> {
    let operation = Operation::Command {
        command: command.join(" "),
    };
    ctx.dispatch(operation).await
}
