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

use anyhow::{bail, Result};

use super::ExecutionContext;
use crate::operation::Operation;

/// Pull a container image on every selected node.
pub async fn run(ctx: ExecutionContext, image: String) -> Result<i32> {
    if image.trim().is_empty() {
        bail!("image reference must not be empty");
    }
    ctx.dispatch(Operation::Pull { image }).await
}
