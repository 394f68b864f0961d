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

//! fleetrun: parallel remote execution across a configured node fleet.
//!
//! The engine is selector → pool → dispatcher → report:
//! [`registry::Registry`] resolves which nodes a run targets,
//! [`pool::ConnectionPool`] owns one reusable session per node,
//! [`dispatch::Dispatcher`] fans the operation out under a concurrency
//! bound with per-node retries, and [`report::RunReport`] is the complete,
//! id-ordered record of what happened everywhere.

pub mod cli;
pub mod commands;
pub mod config;
pub mod dispatch;
pub mod error;
pub mod node;
pub mod operation;
pub mod pool;
pub mod registry;
pub mod report;
pub mod ssh;
pub mod transport;
pub mod ui;
pub mod utils;
