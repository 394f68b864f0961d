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

/// Connectivity check: open a session to each node and run a no-op.
pub async fn run(mut ctx: ExecutionContext) -> Result<i32> {
    // A ping answers "is the node reachable right now", so one attempt
    // with a short budget beats the configured retry policy.
    ctx.options.max_retries = 0;
    ctx.options.task_timeout = ctx.options.task_timeout.min(std::time::Duration::from_secs(30));

    ctx.dispatch(Operation::Command {
        command: "true".to_string(),
    })
    .await
}
