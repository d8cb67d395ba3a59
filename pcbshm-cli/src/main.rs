// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 Ankit Kumar Pandey

//! pcbshm CLI
//!
//! Command-line interface for moving pressure PCB telemetry through a named
//! shared memory region.

use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

mod commands;

use commands::Format;

/// pcbshm - Share the latest pressure PCB snapshot between processes
#[derive(Parser)]
#[command(name = "pcbshm")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Configuration file path (defaults are used when omitted)
    #[arg(short, long)]
    pub config: Option<String>,

    /// Enable verbose logging
    #[arg(short, long)]
    pub verbose: bool,

    /// Region name, overrides `transport.region` from the configuration
    #[arg(short, long)]
    pub name: Option<String>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Create the region and publish one snapshot per input line
    Publish {
        /// Read records from this file instead of stdin
        #[arg(short, long)]
        input: Option<String>,

        /// Input record format
        #[arg(short, long, value_enum, default_value_t = Format::Csv)]
        format: Format,

        /// Close the region and exit at end of input instead of waiting for Ctrl+C
        #[arg(long)]
        exit_on_eof: bool,
    },

    /// Print the current snapshot once
    Read {
        /// Output record format
        #[arg(short, long, value_enum, default_value_t = Format::Json)]
        format: Format,

        /// Print the CSV header first
        #[arg(long)]
        header: bool,
    },

    /// Print the current snapshot repeatedly until Ctrl+C
    Watch {
        /// Output record format
        #[arg(short, long, value_enum, default_value_t = Format::Json)]
        format: Format,

        /// Print the CSV header first
        #[arg(long)]
        header: bool,

        /// Poll interval, overrides `reader.poll_interval_ms`
        #[arg(long)]
        interval_ms: Option<u64>,
    },

    /// Validate a configuration file
    Validate {
        /// Path to the configuration file
        file: String,
    },
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    // Initialize logging; stdout carries records only
    let log_level = if cli.verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(log_level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    // Dispatch to command handlers
    match cli.command {
        Commands::Publish {
            input,
            format,
            exit_on_eof,
        } => {
            commands::publish::execute(
                cli.config.as_deref(),
                cli.name.as_deref(),
                input.as_deref(),
                format,
                exit_on_eof,
            )
            .await
        }
        Commands::Read { format, header } => {
            commands::read::execute(cli.config.as_deref(), cli.name.as_deref(), format, header)
                .await
        }
        Commands::Watch {
            format,
            header,
            interval_ms,
        } => {
            commands::watch::execute(
                cli.config.as_deref(),
                cli.name.as_deref(),
                format,
                header,
                interval_ms,
            )
            .await
        }
        Commands::Validate { file } => commands::validate::execute(&file).await,
    }
}
