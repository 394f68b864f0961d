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

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::path::PathBuf;

/// One remote machine targeted by an operation.
///
/// Built once at inventory load time and never mutated afterwards. The `id`
/// is the stable aggregation key for the lifetime of a run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NodeDescriptor {
    pub id: u32,
    pub name: String,
    pub host: String,
    pub port: u16,
    pub user: String,

    /// Path to the private key used to authenticate against this node.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub key_file: Option<PathBuf>,

    /// Password fallback when no key file is configured.
    #[serde(default, skip_serializing)]
    pub password: Option<String>,

    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub labels: BTreeMap<String, String>,
}

impl NodeDescriptor {
    pub fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

impl fmt::Display for NodeDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({}@{}:{})", self.name, self.user, self.host, self.port)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn node(id: u32) -> NodeDescriptor {
        NodeDescriptor {
            id,
            name: format!("node-{id}"),
            host: format!("10.0.0.{id}"),
            port: 22,
            user: "root".to_string(),
            key_file: None,
            password: None,
            labels: BTreeMap::new(),
        }
    }

    #[test]
    fn test_address() {
        assert_eq!(node(3).address(), "10.0.0.3:22");
    }

    #[test]
    fn test_display_includes_name_and_endpoint() {
        assert_eq!(node(0).to_string(), "node-0 (root@10.0.0.0:22)");
    }

    #[test]
    fn test_password_is_never_serialized() {
        let mut n = node(1);
        n.password = Some("hunter2".to_string());
        let json = serde_json::to_string(&n).unwrap();
        assert!(!json.contains("hunter2"));
        assert!(!json.contains("password"));
    }
}
