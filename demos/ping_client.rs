//! Ping client.
//!
//! Sends `ping` and `info` to a service queue and prints the replies.
//!
//! Run with: cargo run --example ping_client -- svc.echo
//!
//! Requires: an AMQP broker (BROKER_URI, default localhost) and a running
//! service, e.g. `echo_service`.

use std::time::Duration;

use anyhow::Result;

use mq_service::{CorrelationId, Request, RpcClient, RpcConfig, Version, DEFAULT_BROKER_URI};

#[tokio::main]
async fn main() -> Result<()> {
    // ---
    env_logger::init();

    let service = std::env::args().nth(1).unwrap_or_else(|| "svc.echo".to_string());
    let broker_uri = std::env::var("BROKER_URI").unwrap_or_else(|_| DEFAULT_BROKER_URI.to_string());

    let config = RpcConfig::client(broker_uri).with_reply_timeout(Duration::from_secs(5));
    let client = RpcClient::with_config(&config).await?;

    // ---
    // ping
    let id = CorrelationId::generate();
    let reply = client
        .call(&service, id.as_str(), Request::new("ping").to_bytes()?)
        .await?;
    println!("ping {id}: {} byte reply", reply.map(|b| b.len()).unwrap_or(0));

    // ---
    // info
    let id = CorrelationId::generate();
    if let Some(body) = client
        .call(&service, id.as_str(), Request::new("info").to_bytes()?)
        .await?
    {
        let version: Version = serde_json::from_slice(&body)?;
        println!(
            "{} {} ({}), built {}",
            version.name, version.version, version.description, version.date
        );
    }

    client.close().await?;
    Ok(())
}
