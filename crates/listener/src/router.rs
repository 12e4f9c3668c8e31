//! HTTP routes and server lifecycle.

use std::sync::Arc;

use axum::body::Bytes;
use axum::extract::State;
use axum::http::{HeaderMap, StatusCode};
use axum::routing::{get, post};
use axum::{Json, Router};
use engine::{Handled, Relay};
use events::DeliveryId;
use serde_json::{json, Value};
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, Span};

use crate::{verify_signature, ListenerError};

const EVENT_HEADER: &str = "x-github-event";
const DELIVERY_HEADER: &str = "x-github-delivery";
const SIGNATURE_HEADER: &str = "x-hub-signature-256";

/// Shared handler state.
#[derive(Clone)]
pub struct AppState {
    relay: Arc<Relay>,
    secret: Option<Arc<[u8]>>,
}

impl AppState {
    /// `secret` enables signature verification on every delivery.
    pub fn new(relay: Arc<Relay>, secret: Option<&str>) -> Self {
        Self {
            relay,
            secret: secret.map(|s| Arc::from(s.as_bytes())),
        }
    }
}

pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/webhook", post(receive_webhook))
        .route("/health", get(health))
        .with_state(state)
}

/// Serves `router` until `shutdown` is cancelled, then finishes in-flight
/// requests and returns.
pub async fn serve(
    listener: TcpListener,
    router: Router,
    shutdown: CancellationToken,
) -> Result<(), ListenerError> {
    let addr = listener.local_addr()?;
    info!(%addr, "Webhook listener started");
    axum::serve(listener, router)
        .with_graceful_shutdown(async move { shutdown.cancelled().await })
        .await?;
    info!("Webhook listener stopped");
    Ok(())
}

async fn health() -> Json<Value> {
    Json(json!({ "status": "ok" }))
}

#[instrument(skip_all, fields(event_type, delivery_id))]
async fn receive_webhook(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<(StatusCode, Json<Value>), ListenerError> {
    let event_type = header(&headers, EVENT_HEADER)?;
    let delivery_id = DeliveryId::new(header(&headers, DELIVERY_HEADER)?).ok_or(
        ListenerError::MissingHeader {
            header: DELIVERY_HEADER,
        },
    )?;
    let span = Span::current();
    span.record("event_type", event_type);
    span.record("delivery_id", delivery_id.as_str());

    if let Some(secret) = &state.secret {
        let signature = headers.get(SIGNATURE_HEADER).and_then(|v| v.to_str().ok());
        verify_signature(secret, &body, signature)?;
    }

    if body.is_empty() {
        return Err(ListenerError::InvalidBody {
            message: "empty body".to_string(),
        });
    }
    let payload: Value =
        serde_json::from_slice(&body).map_err(|e| ListenerError::InvalidBody {
            message: e.to_string(),
        })?;

    let handled = state.relay.handle(event_type, delivery_id, payload).await?;
    debug!(?handled, "Webhook processed");

    let (status, label) = match handled {
        Handled::Ignored => (StatusCode::ACCEPTED, "ignored"),
        Handled::Buffered => (StatusCode::OK, "buffered"),
        Handled::Cancelled => (StatusCode::OK, "cancelled"),
        Handled::Delivered(d) if d.suppressed => (StatusCode::OK, "suppressed"),
        Handled::Delivered(_) => (StatusCode::OK, "delivered"),
    };
    Ok((status, Json(json!({ "status": label }))))
}

fn header<'h>(headers: &'h HeaderMap, name: &'static str) -> Result<&'h str, ListenerError> {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .filter(|v| !v.is_empty())
        .ok_or(ListenerError::MissingHeader { header: name })
}
