//! Logs monitor example
//!
//! Logs every transaction mentioning a program, and optionally waits for a
//! transaction signature to finalize.
//!
//! Run with: cargo run --example logs_monitor -- <ws-endpoint> <program> [signature]

use solsub::client::logs_notification_listener;
use solsub::core::{ObservabilityConfig, RpcResponse, RpcSignatureResult};
use solsub::{ClientBuilder, Commitment, Listener};
use std::time::Duration;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let mut args = std::env::args().skip(1);
    let endpoint = args
        .next()
        .unwrap_or_else(|| "wss://api.devnet.solana.com".to_string());
    let program = args
        .next()
        .unwrap_or_else(|| "TokenkegQfeZyiNwAJbNbGKPFXCWuBvf9Ss623VQ5DA".to_string());
    let signature = args.next();

    let client = ClientBuilder::new(&endpoint)
        .with_observability(ObservabilityConfig::new("logs-monitor").with_log_level("info"))
        .build()?;

    client
        .logs_subscribe_with(
            [program.clone()],
            logs_notification_listener(program.clone()),
            Commitment::Confirmed,
        )
        .await?;

    if let Some(signature) = signature {
        let (done_tx, mut done_rx) = tokio::sync::mpsc::unbounded_channel();
        client
            .signature_subscribe(
                &signature,
                Listener::from_fn(move |payload| {
                    match serde_json::from_value::<RpcResponse<RpcSignatureResult>>(payload) {
                        Ok(result) => {
                            let _ = done_tx.send((result.context.slot, result.value.err));
                        }
                        Err(e) => tracing::warn!(error = %e, "Unexpected signature payload"),
                    }
                }),
            )
            .await?;

        tokio::spawn(async move {
            match done_rx.recv().await {
                Some((slot, None)) => tracing::info!(slot, "Transaction finalized"),
                Some((slot, Some(err))) => tracing::warn!(slot, error = %err, "Transaction failed"),
                None => {}
            }
        });
    }

    if client.wait_for_connection(Duration::from_secs(10)).await {
        tracing::info!(endpoint = %endpoint, program = %program, "Monitoring logs");
    }

    tokio::signal::ctrl_c().await?;
    tracing::info!(subscriptions = client.subscriptions().len(), "Shutting down");
    client.terminate().await?;
    Ok(())
}
