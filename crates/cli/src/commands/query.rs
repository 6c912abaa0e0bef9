//! `query` command implementation.

use std::time::Duration;

use anyhow::{Context, Result};
use contracts::WireSnapshot;
use state_bridge::{StateClient, GET_DATA};
use tracing::info;

use crate::cli::QueryArgs;

/// Execute the `query` command
pub async fn run_query(args: &QueryArgs) -> Result<()> {
    let client = StateClient::new(args.addr.clone()).with_timeout(Duration::from_secs(args.timeout));
    info!(addr = %client.addr(), "querying state bridge");

    match args.command.as_deref() {
        None | Some(GET_DATA) => {
            let snapshot = client
                .fetch()
                .await
                .with_context(|| format!("Failed to query {}", client.addr()))?;
            print_snapshot(&snapshot)?;
        }
        Some(command) => {
            let reply = client
                .send_raw(command)
                .await
                .with_context(|| format!("Failed to query {}", client.addr()))?;
            println!("{}", serde_json::to_string_pretty(&reply)?);
        }
    }
    Ok(())
}

fn print_snapshot(snapshot: &WireSnapshot) -> Result<()> {
    let json = serde_json::to_string_pretty(snapshot).context("Failed to serialize snapshot")?;
    println!("{json}");
    Ok(())
}
