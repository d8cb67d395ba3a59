// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 Ankit Kumar Pandey

//! `pcbshm validate` command - Validate configuration file.

use pcbshm_core::{ConfigLoader, BACKEND};

pub async fn execute(file: &str) -> Result<(), Box<dyn std::error::Error>> {
    tracing::info!(file = %file, "Validating configuration");

    match ConfigLoader::load_file(file) {
        Ok(config) => {
            println!("✓ Configuration is valid");
            println!();
            println!("Transport Settings:");
            println!("  Backend:            {}", BACKEND);
            println!("  Namespace:          {}", config.transport.namespace);
            println!("  Region:             {}", config.transport.region);
            println!(
                "  File Backend Dir:   {}",
                config.transport.run_dir.display()
            );
            println!();
            println!("Reader Settings:");
            match config.reader.recall_timeout {
                Some(timeout) => println!("  Recall Timeout:     {}ms", timeout.as_millis()),
                None => println!("  Recall Timeout:     none"),
            }
            println!(
                "  Poll Interval:      {}ms",
                config.reader.poll_interval.as_millis()
            );
            Ok(())
        }
        Err(e) => {
            eprintln!("✗ Configuration validation failed:");
            eprintln!("  {}", e);
            std::process::exit(1);
        }
    }
}
