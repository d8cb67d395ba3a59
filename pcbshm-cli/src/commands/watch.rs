// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 Ankit Kumar Pandey

//! `pcbshm watch` command - Poll the region until Ctrl+C.
//!
//! The region is reopened on every tick, so the watcher survives publishers
//! coming and going. Ticks where no snapshot can be read are logged and
//! skipped.

use std::time::Duration;

use pcbshm_core::{PcbError, ShmError};

use super::{load_config, recall_snapshot, region_name, Format};

pub async fn execute(
    config_path: Option<&str>,
    name: Option<&str>,
    format: Format,
    header: bool,
    interval_ms: Option<u64>,
) -> Result<(), Box<dyn std::error::Error>> {
    let config = load_config(config_path)?;
    let name = region_name(name, &config);

    let period = match interval_ms {
        Some(0) => return Err("--interval-ms must be greater than zero".into()),
        Some(ms) => Duration::from_millis(ms),
        None => config.reader.poll_interval,
    };

    tracing::info!(name = %name, interval_ms = period.as_millis() as u64, "Watching region");

    let mut interval = tokio::time::interval(period);
    interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

    let ctrl_c = tokio::signal::ctrl_c();
    tokio::pin!(ctrl_c);

    format.print_header(header);

    loop {
        tokio::select! {
            _ = interval.tick() => {
                match recall_snapshot(&name, &config.transport, config.reader.recall_timeout).await {
                    Ok(data) => println!("{}", format.render(&data)?),
                    Err(PcbError::SharedMemory(ShmError::NotFound { .. })) => {
                        tracing::debug!(name = %name, "Region not available yet");
                    }
                    Err(e) => {
                        tracing::warn!(name = %name, error = %e, "Failed to read snapshot");
                    }
                }
            }
            _ = &mut ctrl_c => {
                tracing::info!("Stopping watch");
                break;
            }
        }
    }

    Ok(())
}
