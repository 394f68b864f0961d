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
use owo_colors::OwoColorize;

use crate::registry::Registry;

/// List the inventory, marking which nodes the selector resolves to.
pub fn run(registry: &Registry, selector: &str) -> Result<i32> {
    let selected = registry.resolve(selector)?;

    println!("{}", "Configured nodes:".bold());
    for node in registry.nodes() {
        let mark = if selected.iter().any(|n| n.id == node.id) {
            "*".green().to_string()
        } else {
            " ".to_string()
        };
        println!("  {mark} [{}] {node}", node.id);
        if !node.labels.is_empty() {
            let labels: Vec<String> = node
                .labels
                .iter()
                .map(|(k, v)| format!("{k}={v}"))
                .collect();
            println!("        {}", labels.join(", ").dimmed());
        }
    }
    println!(
        "\n{} of {} selected by \"{selector}\"",
        selected.len(),
        registry.len()
    );
    Ok(0)
}
