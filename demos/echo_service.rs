//! Echo service over a message broker.
//!
//! Answers `echo` with its parameters as a JSON object, `info` with its
//! version record and `ping` with an empty body.
//!
//! Run with: cargo run --example echo_service
//!
//! Settings come from `~/.config/ds/echo_service.yaml`, written with defaults
//! on first start. Requires an AMQP broker at the configured `broker_uri`.

use std::sync::Arc;

use anyhow::Result;
use bytes::Bytes;
use tracing_subscriber::EnvFilter;

use mq_service::{
    //
    read_config,
    CommandRunner,
    Delivery,
    Request,
    RpcConfig,
    Service,
    Version,
};

struct EchoRunner {
    service: Service,
    version: Version,
}

#[async_trait::async_trait]
impl CommandRunner for EchoRunner {
    async fn run_by_name(&self, request: Request, delivery: Delivery) {
        // ---
        match request.cmd.as_str() {
            "echo" => match serde_json::to_vec(&request.params) {
                Ok(body) => self.service.answer(&delivery, Bytes::from(body)).await,
                Err(e) => self.service.error_result(&delivery, &e, "Echo").await,
            },
            "info" => self.service.info(&delivery, &self.version).await,
            _ => self.service.run_common(&request, &delivery).await,
        }
    }

    async fn cleanup(&self) {
        // ---
        if let Err(e) = self.service.close().await {
            eprintln!("close failed: {e}");
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    // ---
    let mut config: RpcConfig = read_config("echo_service.yaml")?;
    if config.queue_name.is_none() {
        config.queue_name = Some("svc.echo".to_string());
    }

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(config.log_level())),
        )
        .init();

    let service = Service::connect(&config).await?;
    let runner = Arc::new(EchoRunner {
        service: service.clone(),
        version: Version::new("demo", "echo", "Echoes request parameters", env!("CARGO_PKG_VERSION")),
    });

    println!(
        "echo_service listening on {} ({} mode)",
        service.queue(),
        config.run_mode_name()
    );

    // Exits the process on Ctrl+C / SIGTERM.
    service.serve(runner).await?;
    Ok(())
}
