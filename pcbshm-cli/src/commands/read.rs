// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 Ankit Kumar Pandey

//! `pcbshm read` command - Print the current snapshot once.

use super::{load_config, recall_snapshot, region_name, Format};

pub async fn execute(
    config_path: Option<&str>,
    name: Option<&str>,
    format: Format,
    header: bool,
) -> Result<(), Box<dyn std::error::Error>> {
    let config = load_config(config_path)?;
    let name = region_name(name, &config);

    tracing::debug!(name = %name, "Reading snapshot");

    let data = recall_snapshot(&name, &config.transport, config.reader.recall_timeout).await?;

    format.print_header(header);
    println!("{}", format.render(&data)?);

    Ok(())
}
