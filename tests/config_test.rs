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

use std::io::Write;
use std::time::Duration;
use tempfile::NamedTempFile;

use fleetrun::config::Config;
use fleetrun::operation::ExitPolicy;
use fleetrun::registry::Registry;

fn write_config(yaml: &str) -> NamedTempFile {
    let mut file = NamedTempFile::new().unwrap();
    file.write_all(yaml.as_bytes()).unwrap();
    file.flush().unwrap();
    file
}

#[tokio::test]
async fn test_full_config_round_trips_into_engine_settings() {
    let file = write_config(
        r#"
nodes:
  - host: 10.0.1.10
    name: gpu-a
  - host: 10.0.1.11
  - id: 7
    host: 10.0.1.99
    port: 2222
    user: admin
    labels:
      rack: b2

ssh:
  user: ops
  key_file: /keys/fleet_ed25519
  connect_timeout_secs: 5
  connect_attempts: 2
  connect_backoff_ms: 100

execution:
  max_concurrency: 6
  max_retries: 2
  task_timeout_secs: 45
  retry_delay_secs: 1
  nonzero_exit: retry

logging:
  level: debug
"#,
    );

    let config = Config::load(file.path(), true).await.unwrap();
    let nodes = config.node_descriptors();
    assert_eq!(nodes.len(), 3);
    assert_eq!(nodes[0].name, "gpu-a");
    assert_eq!(nodes[0].user, "ops");
    assert_eq!(nodes[1].name, "node-1");
    assert_eq!(nodes[2].id, 7);
    assert_eq!(nodes[2].port, 2222);
    assert_eq!(nodes[2].user, "admin");
    assert_eq!(nodes[2].labels["rack"], "b2");

    let options = config.dispatch_options();
    assert_eq!(options.max_concurrency, 6);
    assert_eq!(options.max_retries, 2);
    assert_eq!(options.task_timeout, Duration::from_secs(45));
    assert_eq!(options.nonzero_exit, ExitPolicy::Retry);

    let pool = config.pool_config();
    assert_eq!(pool.connect_attempts, 2);
    assert_eq!(pool.connect_backoff, Duration::from_millis(100));
    assert_eq!(pool.max_sessions_per_node, 1);

    assert_eq!(config.logging.level, "debug");

    // The inventory loads straight into a resolvable registry.
    let registry = Registry::new(nodes).unwrap();
    let selected = registry.resolve("0-1,7").unwrap();
    assert_eq!(selected.len(), 3);
}

#[tokio::test]
async fn test_missing_default_config_falls_back_to_defaults() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("fleetrun.yaml");

    let config = Config::load(&path, false).await.unwrap();
    assert!(config.nodes.is_empty());
    assert_eq!(config.execution.max_concurrency, 10);
}

#[tokio::test]
async fn test_missing_explicit_config_is_an_error() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("nope.yaml");

    let err = Config::load(&path, true).await.unwrap_err();
    assert!(err.to_string().contains("not found"));
}

#[tokio::test]
async fn test_invalid_yaml_reports_the_file() {
    let file = write_config("nodes: [unclosed");
    let err = Config::load(file.path(), true).await.unwrap_err();
    assert!(err.to_string().contains("parse"));
}

#[tokio::test]
async fn test_duplicate_explicit_ids_are_rejected_by_the_registry() {
    let file = write_config(
        r#"
nodes:
  - id: 3
    host: a.example.com
  - id: 3
    host: b.example.com
"#,
    );

    let config = Config::load(file.path(), true).await.unwrap();
    assert!(Registry::new(config.node_descriptors()).is_err());
}
