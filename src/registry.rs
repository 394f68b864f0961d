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

//! Node registry: resolves selector expressions against the inventory.
//!
//! Supported selector forms:
//! - `all` — every node
//! - `0,1,2` — explicit ids, order-independent, duplicates collapsed
//! - `0-5` — inclusive id range, expanded to the ids that exist
//! - `0,2-5,8` — mixed
//! - `node-1,10.0.0.7` — node names or hosts
//!
//! Resolution is a pure function over the loaded inventory. Explicitly
//! listed ids, names, and hosts must exist (`UnknownNode`); a range is
//! intersected with the inventory, so gaps inside it are not an error.

use std::collections::BTreeSet;

use crate::error::{InventoryError, SelectorError};
use crate::node::NodeDescriptor;

/// Immutable node inventory, ordered by ascending node id.
#[derive(Debug, Clone)]
pub struct Registry {
    nodes: Vec<NodeDescriptor>,
}

impl Registry {
    /// Build a registry from an inventory. Node ids must be unique.
    pub fn new(mut nodes: Vec<NodeDescriptor>) -> Result<Self, InventoryError> {
        nodes.sort_by_key(|n| n.id);
        for pair in nodes.windows(2) {
            if pair[0].id == pair[1].id {
                return Err(InventoryError::DuplicateId(pair[0].id));
            }
        }
        Ok(Self { nodes })
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn nodes(&self) -> &[NodeDescriptor] {
        &self.nodes
    }

    /// Resolve a selector expression into an ordered, de-duplicated set of
    /// target nodes.
    pub fn resolve(&self, selector: &str) -> Result<Vec<NodeDescriptor>, SelectorError> {
        let expr = selector.trim();
        if expr.is_empty() {
            return Err(SelectorError::InvalidSelector {
                selector: selector.to_string(),
                reason: "selector is empty".to_string(),
            });
        }

        if expr.eq_ignore_ascii_case("all") {
            return Ok(self.nodes.clone());
        }

        let mut selected: BTreeSet<u32> = BTreeSet::new();
        for part in expr.split(',') {
            let atom = part.trim();
            if atom.is_empty() {
                return Err(SelectorError::InvalidSelector {
                    selector: selector.to_string(),
                    reason: "empty element in comma list".to_string(),
                });
            }

            if let Some((start, end)) = parse_range(atom) {
                // Reversed bounds are tolerated; gaps inside the range are
                // not an error.
                let (lo, hi) = if start <= end { (start, end) } else { (end, start) };
                selected.extend(
                    self.nodes
                        .iter()
                        .map(|n| n.id)
                        .filter(|id| (lo..=hi).contains(id)),
                );
            } else if atom.bytes().all(|b| b.is_ascii_digit()) {
                let id: u32 = atom.parse().map_err(|_| SelectorError::InvalidSelector {
                    selector: selector.to_string(),
                    reason: format!("node id '{atom}' is out of range"),
                })?;
                if !self.nodes.iter().any(|n| n.id == id) {
                    return Err(SelectorError::UnknownNode(atom.to_string()));
                }
                selected.insert(id);
            } else {
                // Fall back to name, then host lookup.
                let found = self
                    .nodes
                    .iter()
                    .find(|n| n.name.eq_ignore_ascii_case(atom) || n.host == atom)
                    .ok_or_else(|| SelectorError::UnknownNode(atom.to_string()))?;
                selected.insert(found.id);
            }
        }

        Ok(self
            .nodes
            .iter()
            .filter(|n| selected.contains(&n.id))
            .cloned()
            .collect())
    }
}

/// Parse `start-end` where both sides are bare integers. Anything else
/// (including names like `node-0`) is not a range.
fn parse_range(atom: &str) -> Option<(u32, u32)> {
    let (start, end) = atom.split_once('-')?;
    if start.is_empty() || end.is_empty() {
        return None;
    }
    if !start.bytes().all(|b| b.is_ascii_digit()) || !end.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    Some((start.parse().ok()?, end.parse().ok()?))
}
