/*
 *  Copyright 2025-2026 Colliery Software
 *
 *  Licensed under the Apache License, Version 2.0 (the "License");
 *  you may not use this file except in compliance with the License.
 *  You may obtain a copy of the License at
 *
 *      http://www.apache.org/licenses/LICENSE-2.0
 *
 *  Unless required by applicable law or agreed to in writing, software
 *  distributed under the License is distributed on an "AS IS" BASIS,
 *  WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
 *  See the License for the specific language governing permissions and
 *  limitations under the License.
 */

//! parcelpointctl - operator interface for the parcelpoint outbox.

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use parcelpoint::config::AppConfig;
use parcelpoint::logging::{self, LoggingOptions};

mod commands;

/// parcelpointctl - runs and inspects the order event outbox
#[derive(Parser)]
#[command(name = "parcelpointctl")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Configuration file (TOML)
    #[arg(short, long, env = "PARCELPOINT_CONFIG", global = true)]
    config: Option<PathBuf>,

    /// Database URL, overriding the configuration file
    #[arg(long, global = true)]
    database_url: Option<String>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Apply pending database migrations
    Migrate,

    /// Outbox dispatcher and maintenance commands
    Outbox {
        #[command(subcommand)]
        command: OutboxCommands,
    },
}

#[derive(Subcommand)]
enum OutboxCommands {
    /// Run the dispatcher until interrupted
    Run,

    /// Reset failed events so they are delivered again
    Redrive {
        /// Event id to reset (repeatable)
        #[arg(long = "event-id", conflicts_with = "all")]
        event_ids: Vec<i64>,

        /// Reset every failed event
        #[arg(long)]
        all: bool,
    },

    /// Show event counts per status
    Status {
        /// Also list up to this many failed events
        #[arg(long, default_value_t = 0)]
        failed: usize,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let mut config = match &cli.config {
        Some(path) => AppConfig::from_file(path)
            .with_context(|| format!("Failed to load configuration from {}", path.display()))?,
        None => AppConfig::from_env().context("Failed to load configuration")?,
    };
    if let Some(url) = cli.database_url {
        config.database.url = Some(url);
    }

    let mut options = LoggingOptions::from_config(&config);
    // No worker pool runs in the CLI.
    options.pool_log = None;
    if cli.verbose {
        options.default_filter = "debug".to_string();
    }
    let _guard = logging::init(&options).context("Failed to initialize logging")?;

    match cli.command {
        Commands::Migrate => commands::migrate::run(&config).await?,
        Commands::Outbox { command } => match command {
            OutboxCommands::Run => commands::outbox::run(&config).await?,
            OutboxCommands::Redrive { event_ids, all } => {
                commands::outbox::redrive(&config, event_ids, all).await?
            }
            OutboxCommands::Status { failed } => {
                commands::outbox::status(&config, failed).await?
            }
        },
    }

    Ok(())
}
