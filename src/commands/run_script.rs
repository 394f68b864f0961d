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
use std::path::Path;
use tokio::fs;

use super::ExecutionContext;
use crate::operation::Operation;

/// Run a script on every selected node. The body comes either from
/// `--inline` or from the first positional argument, read as a local file;
/// the remaining positionals become the script's `$1`, `$2`, ...
pub async fn run(ctx: ExecutionContext, inline: Option<String>, args: Vec<String>) -> Result<i32> {
    let (body, script_args) = match inline {
        Some(body) => (body, args),
        None => {
            let (path, rest) = args
                .split_first()
                .context("script path is required when --inline is not given")?;
            let body = fs::read_to_string(Path::new(path))
                .await
                .with_context(|| format!("failed to read script {path}"))?;
            (body, rest.to_vec())
        }
    };

    ctx.dispatch(Operation::RunScript {
        body,
        args: script_args.join(" "),
    })
    .await
}
