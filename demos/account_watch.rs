//! Account watch example
//!
//! Watches the lamport balance of one or more accounts and keeps watching
//! across connection drops.
//!
//! Run with: cargo run --example account_watch -- <ws-endpoint> <address>...

use serde::Deserialize;
use solsub::core::ObservabilityConfig;
use solsub::{ClientBuilder, Listener};
use std::time::Duration;

#[derive(Deserialize)]
struct AccountValue {
    lamports: u64,
    owner: String,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let mut args = std::env::args().skip(1);
    let endpoint = args
        .next()
        .unwrap_or_else(|| "wss://api.devnet.solana.com".to_string());
    let mut addresses: Vec<String> = args.collect();
    if addresses.is_empty() {
        addresses.push("SysvarC1ock11111111111111111111111111111111".to_string());
    }

    let client = ClientBuilder::new(&endpoint)
        .with_observability(ObservabilityConfig::new("account-watch").with_json_logs(false))
        .build()?;

    for address in &addresses {
        let watched = address.clone();
        let id = client
            .account_subscribe(
                address,
                Listener::from_fn(move |payload| {
                    let slot = payload["context"]["slot"].as_u64().unwrap_or_default();
                    match serde_json::from_value::<AccountValue>(payload["value"].clone()) {
                        Ok(account) => println!(
                            "[slot {}] {} holds {} lamports (owner {})",
                            slot, watched, account.lamports, account.owner
                        ),
                        Err(e) => tracing::warn!(address = %watched, error = %e, "Unexpected account payload"),
                    }
                }),
            )
            .await?;
        tracing::info!(subscription_id = %id, address = %address, "Watching account");
    }

    if !client.wait_for_connection(Duration::from_secs(10)).await {
        tracing::warn!(endpoint = %endpoint, "Not connected yet, will keep retrying");
    }

    tokio::signal::ctrl_c().await?;
    client.terminate().await?;
    solsub::core::shutdown_observability();
    Ok(())
}
