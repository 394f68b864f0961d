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

//! YAML configuration: the node inventory plus connection and execution
//! defaults. CLI flags override anything set here.

use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::fs;

use crate::dispatch::DispatchOptions;
use crate::node::NodeDescriptor;
use crate::operation::ExitPolicy;
use crate::pool::PoolConfig;
use crate::ssh::SshConfig;

pub const DEFAULT_CONFIG_PATH: &str = "fleetrun.yaml";

#[derive(Debug, Serialize, Deserialize, Default)]
pub struct Config {
    #[serde(default)]
    pub nodes: Vec<NodeEntry>,

    #[serde(default)]
    pub ssh: SshSection,

    #[serde(default)]
    pub execution: ExecutionSection,

    #[serde(default)]
    pub logging: LoggingSection,
}

/// One inventory entry. Ids are assigned by position unless given
/// explicitly, so a plain list of hosts works out of the box.
#[derive(Debug, Serialize, Deserialize)]
pub struct NodeEntry {
    #[serde(default)]
    pub id: Option<u32>,
    #[serde(default)]
    pub name: Option<String>,
    pub host: String,
    #[serde(default)]
    pub port: Option<u16>,
    #[serde(default)]
    pub user: Option<String>,
    #[serde(default)]
    pub key_file: Option<PathBuf>,
    #[serde(default, skip_serializing)]
    pub password: Option<String>,
    #[serde(default)]
    pub labels: BTreeMap<String, String>,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct SshSection {
    pub user: String,
    pub port: u16,
    pub key_file: Option<PathBuf>,
    pub connect_timeout_secs: u64,
    pub connect_attempts: u32,
    pub connect_backoff_ms: u64,
    pub max_sessions_per_node: u32,
    pub strict_host_key_checking: bool,
}

impl Default for SshSection {
    fn default() -> Self {
        Self {
            user: "root".to_string(),
            port: 22,
            key_file: None,
            connect_timeout_secs: 30,
            connect_attempts: 3,
            connect_backoff_ms: 500,
            max_sessions_per_node: 1,
            strict_host_key_checking: false,
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct ExecutionSection {
    pub max_concurrency: usize,
    pub max_retries: u32,
    pub task_timeout_secs: u64,
    pub retry_delay_secs: u64,
    pub deadline_secs: Option<u64>,
    pub nonzero_exit: ExitPolicy,
}

impl Default for ExecutionSection {
    fn default() -> Self {
        Self {
            max_concurrency: 10,
            max_retries: 3,
            task_timeout_secs: 300,
            retry_delay_secs: 5,
            deadline_secs: None,
            nonzero_exit: ExitPolicy::Fatal,
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingSection {
    pub level: String,
    pub file: Option<PathBuf>,
}

impl Default for LoggingSection {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            file: None,
        }
    }
}

impl Config {
    /// Load from `path`. A missing file at the default location falls back
    /// to built-in defaults; an explicitly named file must exist.
    pub async fn load(path: &Path, explicit: bool) -> Result<Self> {
        let path = expand_tilde(path);
        if !path.exists() {
            if explicit {
                bail!("configuration file not found: {}", path.display());
            }
            tracing::debug!(path = %path.display(), "no config file, using defaults");
            return Ok(Self::default());
        }

        let content = fs::read_to_string(&path)
            .await
            .with_context(|| format!("failed to read configuration file {}", path.display()))?;
        let config: Config = serde_yaml::from_str(&content)
            .with_context(|| format!("failed to parse configuration file {}", path.display()))?;
        Ok(config)
    }

    /// Materialize the inventory, filling per-node gaps from the ssh
    /// section. Positional ids are the entry's index in the list.
    pub fn node_descriptors(&self) -> Vec<NodeDescriptor> {
        self.nodes
            .iter()
            .enumerate()
            .map(|(index, entry)| {
                let id = entry.id.unwrap_or(index as u32);
                NodeDescriptor {
                    id,
                    name: entry.name.clone().unwrap_or_else(|| format!("node-{id}")),
                    host: entry.host.clone(),
                    port: entry.port.unwrap_or(self.ssh.port),
                    user: entry.user.clone().unwrap_or_else(|| self.ssh.user.clone()),
                    key_file: entry
                        .key_file
                        .clone()
                        .or_else(|| self.ssh.key_file.clone())
                        .map(|p| expand_tilde(&p)),
                    password: entry.password.clone(),
                    labels: entry.labels.clone(),
                }
            })
            .collect()
    }

    pub fn ssh_config(&self) -> SshConfig {
        SshConfig {
            connect_timeout: Duration::from_secs(self.ssh.connect_timeout_secs),
            strict_host_key_checking: self.ssh.strict_host_key_checking,
        }
    }

    pub fn pool_config(&self) -> PoolConfig {
        PoolConfig {
            connect_attempts: self.ssh.connect_attempts,
            connect_backoff: Duration::from_millis(self.ssh.connect_backoff_ms),
            max_sessions_per_node: self.ssh.max_sessions_per_node,
        }
    }

    pub fn dispatch_options(&self) -> DispatchOptions {
        DispatchOptions {
            max_concurrency: self.execution.max_concurrency,
            max_retries: self.execution.max_retries,
            task_timeout: Duration::from_secs(self.execution.task_timeout_secs),
            retry_delay: Duration::from_secs(self.execution.retry_delay_secs),
            deadline: self.execution.deadline_secs.map(Duration::from_secs),
            nonzero_exit: self.execution.nonzero_exit,
        }
    }
}

fn expand_tilde(path: &Path) -> PathBuf {
    if let Ok(stripped) = path.strip_prefix("~") {
        if let Some(home) = std::env::var_os("HOME") {
            return PathBuf::from(home).join(stripped);
        }
    }
    path.to_path_buf()
}
