//! `ports` command implementation.

use anyhow::{Context, Result};
use serde::Serialize;
use tracing::info;

use crate::cli::PortsArgs;

#[derive(Serialize)]
struct PortEntry {
    name: String,
    kind: String,
}

/// Execute the `ports` command
pub fn run_ports(args: &PortsArgs) -> Result<()> {
    let ports: Vec<PortEntry> = ingestion::list_ports()
        .context("Failed to enumerate serial ports")?
        .into_iter()
        .map(|p| PortEntry {
            name: p.name,
            kind: p.kind,
        })
        .collect();
    info!(count = ports.len(), "Serial ports enumerated");

    if args.json {
        let json = serde_json::to_string_pretty(&ports).context("Failed to serialize ports")?;
        println!("{}", json);
    } else if ports.is_empty() {
        println!("No serial ports found");
    } else {
        println!("Serial ports ({}):", ports.len());
        for port in &ports {
            println!("  {:<24} {}", port.name, port.kind);
        }
    }

    Ok(())
}
