//! # lnd-gateway
//!
//! Reads RPC requests, one JSON object per line, from stdin and forwards
//! them to the node selected by `RA_ENV`. Each outcome is printed to stdout
//! as a JSON line once its reply (or deadline) arrives.
//!
//! ```text
//! $ echo '{"method":"getbalance","params":{},"path":"/wallet/alice"}' | lnd-gateway
//! {"id":"6f1c…","result":0.5}
//! ```
//!
//! ## Startup Sequence
//!
//! 1. Load configuration from `RA_*` environment variables
//! 2. Initialize telemetry
//! 3. Build the HTTP transport and the Lightning service
//! 4. Start the response listener and expiry sweeper
//! 5. Serve stdin until EOF or Ctrl+C, then drain

use std::sync::Arc;

use anyhow::{Context, Result};
use ra_lnd_gateway::adapters::http_transport;
use ra_lnd_gateway::domain::pending::CallResult;
use ra_lnd_gateway::{ChainingPolicy, Document, GatewayConfig, Handled, LightningService, RpcErrorObject};
use ra_lnd_telemetry::{init_telemetry, TelemetryConfig};
use serde_json::{json, Value};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::task::JoinHandle;
use tracing::{error, info};

fn render(id: &str, outcome: CallResult) -> Value {
    match outcome {
        Ok(result) => json!({ "id": id, "result": result }),
        Err(e) => json!({ "id": id, "error": RpcErrorObject::from(e) }),
    }
}

async fn serve_stdin(service: &LightningService, printers: &mut Vec<JoinHandle<()>>) -> Result<()> {
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    while let Some(line) = lines.next_line().await.context("reading stdin")? {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        let document = Document::rpc_request(line.to_string());
        match service.handle_document(document).await {
            Ok(Handled::Submitted(pending)) => {
                let id = pending.id().to_string();
                printers.push(tokio::spawn(async move {
                    println!("{}", render(&id, pending.wait().await));
                }));
            }
            Ok(other) => info!(handled = ?other, "Request not submitted"),
            Err(e) => {
                error!(error = %e, "Request refused");
                println!("{}", json!({ "error": RpcErrorObject::new(e.code(), e.to_string()) }));
            }
        }
    }
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let config = GatewayConfig::from_env().context("loading RA_* configuration")?;
    let _telemetry = init_telemetry(TelemetryConfig::from_env()).context("initializing telemetry")?;

    let (transport, inbound) = http_transport(config.timeouts.default, config.limits.inbound_buffer)
        .context("building HTTP transport")?;
    let service = LightningService::new(config, Arc::new(transport), ChainingPolicy::wallet_defaults())
        .context("building Lightning service")?;
    service.start(Arc::new(inbound));

    let mut printers = Vec::new();
    let interrupted = tokio::select! {
        result = serve_stdin(&service, &mut printers) => {
            result?;
            false
        }
        _ = tokio::signal::ctrl_c() => {
            info!("Received shutdown signal");
            true
        }
    };
    drain(&service, printers, interrupted).await;
    Ok(())
}

/// Wait for every output task, then stop the service.
///
/// After EOF each submitted call settles by reply or deadline. When
/// interrupted the service stops first, failing pending calls with `Closed`.
async fn drain(service: &LightningService, printers: Vec<JoinHandle<()>>, interrupted: bool) {
    if interrupted {
        service.shutdown();
    }
    for printer in printers {
        if let Err(e) = printer.await {
            error!(error = %e, "Output task failed");
        }
    }
    if !interrupted {
        service.shutdown();
    }
}
