//! hookrelay entry point.
//!
//! This binary is the composition root. Responsibilities:
//!
//! 1. **Parse configuration**: load `hookrelay.toml` (or `--config`), apply
//!    command-line overrides, and validate.
//! 2. **Wire observability**: install `tracing-subscriber` and, when an OTLP
//!    endpoint is configured, an OpenTelemetry exporter layer.
//! 3. **Construct infrastructure**: pick the delivery sink, build the
//!    [`engine::Relay`] and the webhook router.
//! 4. **Run until signalled**: serve webhooks until SIGINT/SIGTERM, then
//!    stop accepting requests and drain open aggregation buckets.

mod config;
mod telemetry;

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use delivery::{HttpSink, LogSink};
use dispatch::SummaryRenderer;
use engine::Relay;
use events::DeliverySink;
use listener::{build_router, AppState, ListenerError};
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::config::Config;

/// Relays webhook events to a chat destination, combining bursts of related
/// events into single notifications.
#[derive(Debug, Parser)]
#[command(name = "hookrelay", version, about)]
struct Cli {
    /// Configuration file (default: ./hookrelay.toml when present).
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Address to listen on, overriding `server.bind`.
    #[arg(long)]
    bind: Option<String>,

    /// Log level, overriding `telemetry.log_level`. `RUST_LOG` wins over both.
    #[arg(long)]
    log_level: Option<String>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let mut config = Config::load(cli.config.as_deref()).context("loading configuration")?;
    if let Some(bind) = cli.bind {
        config.server.bind = bind;
    }
    if let Some(level) = cli.log_level {
        config.telemetry.log_level = level;
    }
    config.validate().context("validating configuration")?;

    let telemetry = telemetry::init(&config.telemetry)?;

    let settings = config.relay_settings()?;
    let sink: Arc<dyn DeliverySink> = match config.http_sink()? {
        Some(http) => {
            info!(url = %http.url, "Delivering notifications over HTTP");
            Arc::new(HttpSink::new(http))
        }
        None => Arc::new(LogSink::new(config.delivery.room.clone())),
    };
    let relay = Arc::new(Relay::new(&settings, Arc::new(SummaryRenderer), sink));
    info!(window = ?settings.window, "Relay started");

    if config.server.webhook_secret.is_none() {
        warn!("No webhook secret configured; signatures are not verified");
    }

    let addr = config.bind_addr()?;
    let tcp = TcpListener::bind(addr)
        .await
        .with_context(|| format!("binding {addr}"))?;

    let shutdown = CancellationToken::new();
    tokio::spawn(cancel_on_signal(shutdown.clone()));

    let served = run(
        tcp,
        relay,
        config.server.webhook_secret.as_deref(),
        shutdown,
    )
    .await;
    telemetry.shutdown();
    served.context("serving webhooks")
}

/// Serves webhooks until `shutdown` is cancelled, then drains the relay.
///
/// The drain runs whether or not the server stopped on an error.
async fn run(
    tcp: TcpListener,
    relay: Arc<Relay>,
    webhook_secret: Option<&str>,
    shutdown: CancellationToken,
) -> Result<(), ListenerError> {
    let router = build_router(AppState::new(Arc::clone(&relay), webhook_secret));
    let served = listener::serve(tcp, router, shutdown).await;
    if let Err(err) = &served {
        warn!(error = %err, "Webhook server stopped with an error");
    }
    relay.shutdown().await;
    served
}

/// Cancels `token` on Ctrl-C or SIGTERM.
async fn cancel_on_signal(token: CancellationToken) {
    let ctrl_c = async {
        if let Err(err) = tokio::signal::ctrl_c().await {
            warn!(error = %err, "Cannot listen for Ctrl-C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{signal, SignalKind};
        match signal(SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(err) => {
                warn!(error = %err, "Cannot listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };
    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }
    info!("Shutdown requested");
    token.cancel();
}

#[cfg(test)]
mod tests {
    use super::*;

    use async_trait::async_trait;
    use events::{DeliveryError, DeliveryId, OutboundMessage, RelaySettings};
    use parking_lot::Mutex;
    use serde_json::json;

    #[derive(Default)]
    struct RecordingSink {
        messages: Mutex<Vec<OutboundMessage>>,
    }

    #[async_trait]
    impl DeliverySink for RecordingSink {
        async fn deliver(&self, message: OutboundMessage) -> Result<(), DeliveryError> {
            self.messages.lock().push(message);
            Ok(())
        }
    }

    #[tokio::test]
    async fn stopping_the_server_drains_open_buckets() {
        let sink = Arc::new(RecordingSink::default());
        let relay = Arc::new(Relay::new(
            &RelaySettings::default(),
            Arc::new(SummaryRenderer),
            sink.clone(),
        ));
        let payload = json!({
            "action": "labeled",
            "label": {"name": "bug", "color": "d73a4a"},
            "issue": {"number": 3, "title": "Crash", "labels": [{"name": "bug", "color": "d73a4a"}]},
            "repository": {"full_name": "octo/widgets"},
            "sender": {"id": 1, "login": "mona"},
        });
        relay
            .handle("issues", DeliveryId::new("d-1").unwrap(), payload)
            .await
            .unwrap();
        assert_eq!(relay.windows().open_buckets(), 1);

        let tcp = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let shutdown = CancellationToken::new();
        shutdown.cancel();
        run(tcp, Arc::clone(&relay), None, shutdown).await.unwrap();

        assert_eq!(relay.windows().open_buckets(), 0);
        assert_eq!(sink.messages.lock().len(), 1);
    }
}
