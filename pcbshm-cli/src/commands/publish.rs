// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 Ankit Kumar Pandey

//! `pcbshm publish` command - Own the region and publish snapshots.
//!
//! Every non-empty input line is decoded and stored, replacing the previous
//! snapshot. The region lives as long as this process holds it.

use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};

use pcbshm_core::{SharedMemory, BACKEND};

use super::{load_config, region_name, Format};

pub async fn execute(
    config_path: Option<&str>,
    name: Option<&str>,
    input: Option<&str>,
    format: Format,
    exit_on_eof: bool,
) -> Result<(), Box<dyn std::error::Error>> {
    let config = load_config(config_path)?;
    let name = region_name(name, &config);

    let mut region = SharedMemory::create_with(&name, &config.transport)?;
    tracing::info!(
        name = %name,
        namespace = %config.transport.namespace,
        backend = BACKEND,
        "Region created"
    );

    let reader: Box<dyn AsyncRead + Unpin + Send> = match input {
        Some(path) => Box::new(tokio::fs::File::open(path).await?),
        None => Box::new(tokio::io::stdin()),
    };
    let mut lines = BufReader::new(reader).lines();

    let ctrl_c = tokio::signal::ctrl_c();
    tokio::pin!(ctrl_c);

    let mut line_no = 0usize;
    let mut published = 0usize;
    let mut interrupted = false;

    loop {
        tokio::select! {
            line = lines.next_line() => {
                let Some(line) = line? else {
                    break;
                };
                line_no += 1;

                let line = line.trim();
                if line.is_empty() {
                    continue;
                }

                match format.parse(line) {
                    Ok(record) => {
                        record.store(&region)?;
                        published += 1;
                        tracing::info!(
                            line = line_no,
                            unix_sec = record.unix_sec,
                            "Published snapshot"
                        );
                    }
                    Err(e) => {
                        tracing::warn!(line = line_no, error = %e, "Skipping malformed record");
                    }
                }
            }
            _ = &mut ctrl_c => {
                interrupted = true;
                break;
            }
        }
    }

    if !interrupted && !exit_on_eof {
        tracing::info!(published, "End of input, holding region until Ctrl+C");
        ctrl_c.await?;
    }

    region.close();
    println!("✓ Published {} snapshot(s) to {}", published, name);

    Ok(())
}
