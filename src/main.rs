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
use clap::Parser;
use std::path::Path;
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

use fleetrun::cli::{Cli, Commands};
use fleetrun::commands::{self, ExecutionContext};
use fleetrun::config::{Config, DEFAULT_CONFIG_PATH};
use fleetrun::dispatch::Dispatcher;
use fleetrun::operation::ExitPolicy;
use fleetrun::registry::Registry;
use fleetrun::ssh::SshTransport;
use fleetrun::utils::init_logging;

#[tokio::main]
async fn main() -> ExitCode {
    match run().await {
        Ok(code) => ExitCode::from(code),
        Err(err) => {
            eprintln!("Error: {err:#}");
            ExitCode::from(1)
        }
    }
}

async fn run() -> Result<u8> {
    let cli = Cli::parse();

    let explicit_config = cli.config != Path::new(DEFAULT_CONFIG_PATH);
    let config = Config::load(&cli.config, explicit_config).await?;

    init_logging(
        cli.verbose,
        cli.quiet,
        &config.logging.level,
        config.logging.file.as_deref(),
    )?;

    let registry = Registry::new(config.node_descriptors())?;
    if registry.is_empty() {
        bail!(
            "no nodes configured; add a `nodes:` section to {}",
            cli.config.display()
        );
    }

    if let Commands::Nodes = cli.command {
        return Ok(commands::nodes::run(&registry, &cli.nodes)? as u8);
    }

    let nodes = registry.resolve(&cli.nodes)?;

    let mut options = config.dispatch_options();
    if let Some(max_concurrency) = cli.max_concurrency {
        options.max_concurrency = max_concurrency;
    }
    if let Some(max_retries) = cli.max_retries {
        options.max_retries = max_retries;
    }
    if let Some(timeout) = cli.timeout {
        options.task_timeout = Duration::from_secs(timeout);
    }
    if let Some(retry_delay) = cli.retry_delay {
        options.retry_delay = Duration::from_secs(retry_delay);
    }
    if let Some(deadline) = cli.deadline {
        options.deadline = Some(Duration::from_secs(deadline));
    }
    if cli.retry_on_failure {
        options.nonzero_exit = ExitPolicy::Retry;
    }

    let transport = Arc::new(SshTransport::new(config.ssh_config()));
    let ctx = ExecutionContext {
        nodes,
        dispatcher: Dispatcher::new(transport, config.pool_config()),
        options,
        output: cli.output.clone(),
        quiet: cli.quiet,
    };

    let code = match cli.command {
        Commands::Exec { command } => commands::exec::run(ctx, command).await?,
        Commands::Pull { image } => commands::pull::run(ctx, image).await?,
        Commands::RunScript { inline, args } => {
            commands::run_script::run(ctx, inline, args).await?
        }
        Commands::Ping => commands::ping::run(ctx).await?,
        Commands::Nodes => unreachable!("handled before dispatch setup"),
    };
    Ok(code as u8)
}
