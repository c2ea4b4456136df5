//! Service and client sharing the in-process broker.
//!
//! Run with: cargo run --example memory_roundtrip
//!
//! No external broker required.

use std::time::Duration;

use anyhow::Result;

use mq_service::{BasicRunner, Request, RpcClient, RpcConfig, Service, Version};

#[tokio::main]
async fn main() -> Result<()> {
    // ---
    env_logger::init();

    let uri = "memory://roundtrip";

    let service = Service::connect(&RpcConfig::service(uri, "svc.audio")).await?;
    let version = Version::new("audio", "roundtrip", "In-memory demo", "0.1.0");
    let runner = BasicRunner::new(service.clone(), version).into_ptr();
    let dispatch = service.dispatch(runner.clone())?;

    let client = RpcClient::connect(uri).await?;

    for cmd in ["ping", "info", "bogus"] {
        let request = Request::new(cmd).with_param("from", "memory_roundtrip");
        client.request("svc.audio", cmd, request.to_bytes()?).await?;

        match client.await_reply_timeout(cmd, Duration::from_secs(1)).await? {
            Some(body) => println!("{cmd:>5} -> {}", String::from_utf8_lossy(&body)),
            None => println!("{cmd:>5} -> <no reply>"),
        }
    }

    client.close().await?;
    runner.cleanup().await;
    dispatch.await?;
    Ok(())
}
