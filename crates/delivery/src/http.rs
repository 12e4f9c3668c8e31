//! Sink that POSTs notifications as JSON.

use std::time::Duration;

use async_trait::async_trait;
use events::{DeliveryError, DeliverySink, OutboundMessage, RetryPolicy};
use reqwest::header::{HeaderMap, CONTENT_TYPE, RETRY_AFTER};
use serde::Serialize;
use tracing::{debug, warn};

/// Upper bound for one back-off step.
const MAX_BACKOFF: Duration = Duration::from_secs(30);

/// Destination settings for [`HttpSink`].
#[derive(Debug, Clone)]
pub struct HttpSinkConfig {
    /// Endpoint receiving the JSON body.
    pub url: String,
    /// Opaque destination id forwarded with every notification.
    pub room: Option<String>,
    /// Total attempts per notification, including the first.
    pub max_attempts: u32,
    /// First back-off step; doubles with every retry.
    pub base_delay: Duration,
}

impl HttpSinkConfig {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            room: None,
            max_attempts: 3,
            base_delay: Duration::from_millis(500),
        }
    }
}

#[derive(Serialize)]
struct Body<'a> {
    #[serde(flatten)]
    message: &'a OutboundMessage,
    room: Option<&'a str>,
}

/// Posts each rendered notification to an HTTP endpoint.
///
/// Suppressed notifications are not posted. Failures are retried according
/// to [`DeliveryError::retry_policy`], honouring `Retry-After`.
#[derive(Debug, Clone)]
pub struct HttpSink {
    client: reqwest::Client,
    config: HttpSinkConfig,
}

impl HttpSink {
    pub fn new(config: HttpSinkConfig) -> Self {
        Self::with_client(reqwest::Client::new(), config)
    }

    pub fn with_client(client: reqwest::Client, config: HttpSinkConfig) -> Self {
        Self { client, config }
    }

    async fn post_once(&self, body: &[u8]) -> Result<(), DeliveryError> {
        let response = self
            .client
            .post(&self.config.url)
            .header(CONTENT_TYPE, "application/json")
            .body(body.to_vec())
            .send()
            .await
            .map_err(|e| DeliveryError::Transport {
                message: e.to_string(),
            })?;

        let status = response.status();
        if status.is_success() {
            return Ok(());
        }
        Err(DeliveryError::Status {
            status: status.as_u16(),
            retry_after: retry_after(response.headers()),
        })
    }

    fn backoff(&self, attempt: u32) -> Duration {
        self.config
            .base_delay
            .saturating_mul(1u32 << attempt.saturating_sub(1).min(16))
            .min(MAX_BACKOFF)
    }
}

#[async_trait]
impl DeliverySink for HttpSink {
    async fn deliver(&self, message: OutboundMessage) -> Result<(), DeliveryError> {
        if message.suppressed {
            debug!(notification_id = %message.id, "Suppressed notification not posted");
            return Ok(());
        }

        let body = serde_json::to_vec(&Body {
            message: &message,
            room: self.config.room.as_deref(),
        })
        .map_err(|e| DeliveryError::Encoding {
            message: e.to_string(),
        })?;

        let max_attempts = self.config.max_attempts.max(1);
        let mut attempt = 1;
        loop {
            let err = match self.post_once(&body).await {
                Ok(()) => return Ok(()),
                Err(err) => err,
            };
            let after = match err.retry_policy() {
                RetryPolicy::Retryable { after } if attempt < max_attempts => after,
                _ => return Err(err),
            };
            let delay = after.unwrap_or_else(|| self.backoff(attempt));
            warn!(
                notification_id = %message.id,
                attempt,
                max_attempts,
                ?delay,
                error = %err,
                "Delivery failed; retrying"
            );
            tokio::time::sleep(delay).await;
            attempt += 1;
        }
    }
}

/// Parses `Retry-After` as delay-seconds or an HTTP date, capped at
/// [`MAX_BACKOFF`].
fn retry_after(headers: &HeaderMap) -> Option<Duration> {
    let value = headers.get(RETRY_AFTER)?.to_str().ok()?.trim();
    let delay = match value.parse::<u64>() {
        Ok(seconds) => Duration::from_secs(seconds),
        Err(_) => {
            let date = chrono::DateTime::parse_from_rfc2822(value).ok()?;
            date.signed_duration_since(chrono::Utc::now())
                .to_std()
                .unwrap_or(Duration::ZERO)
        }
    };
    Some(delay.min(MAX_BACKOFF))
}

#[cfg(test)]
mod tests {
    use super::*;
    use events::{DeliveryId, EventType, NotificationId, RenderContext, TemplateId};
    use reqwest::header::HeaderValue;
    use wiremock::matchers::{body_partial_json, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn message(suppressed: bool) -> OutboundMessage {
        OutboundMessage {
            id: NotificationId::new_random(),
            template_id: TemplateId::new("watch/started").unwrap(),
            context: RenderContext::new(),
            suppressed,
            text: (!suppressed).then(|| "mona started watching octo/widgets".to_string()),
            event_type: EventType::Watch,
            delivery_ids: vec![DeliveryId::new("d-1").unwrap()],
        }
    }

    fn sink(server: &MockServer) -> HttpSink {
        let mut config = HttpSinkConfig::new(format!("{}/notify", server.uri()));
        config.room = Some("!ops:example.org".into());
        config.base_delay = Duration::from_millis(5);
        HttpSink::new(config)
    }

    #[tokio::test]
    async fn posts_rendered_notification() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/notify"))
            .and(body_partial_json(serde_json::json!({
                "template_id": "watch/started",
                "suppressed": false,
                "text": "mona started watching octo/widgets",
                "delivery_ids": ["d-1"],
                "room": "!ops:example.org",
            })))
            .respond_with(ResponseTemplate::new(200))
            .expect(1)
            .mount(&server)
            .await;

        sink(&server).deliver(message(false)).await.unwrap();
    }

    #[tokio::test]
    async fn suppressed_notifications_are_not_posted() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200))
            .expect(0)
            .mount(&server)
            .await;

        sink(&server).deliver(message(true)).await.unwrap();
    }

    #[tokio::test]
    async fn server_errors_are_retried() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(503))
            .up_to_n_times(1)
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200))
            .expect(1)
            .mount(&server)
            .await;

        sink(&server).deliver(message(false)).await.unwrap();
    }

    #[tokio::test]
    async fn client_errors_are_not_retried() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(400))
            .expect(1)
            .mount(&server)
            .await;

        let err = sink(&server).deliver(message(false)).await.unwrap_err();
        assert_eq!(
            err,
            DeliveryError::Status {
                status: 400,
                retry_after: None
            }
        );
    }

    #[tokio::test]
    async fn gives_up_after_max_attempts() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(500))
            .expect(3)
            .mount(&server)
            .await;

        let err = sink(&server).deliver(message(false)).await.unwrap_err();
        assert_eq!(err.retry_policy(), RetryPolicy::Retryable { after: None });
    }

    #[test]
    fn retry_after_seconds_are_parsed() {
        let mut headers = HeaderMap::new();
        headers.insert(RETRY_AFTER, HeaderValue::from_static("7"));
        assert_eq!(retry_after(&headers), Some(Duration::from_secs(7)));
    }

    #[test]
    fn large_retry_after_is_capped() {
        let mut headers = HeaderMap::new();
        headers.insert(RETRY_AFTER, HeaderValue::from_static("86400"));
        assert_eq!(retry_after(&headers), Some(MAX_BACKOFF));

        headers.insert(
            RETRY_AFTER,
            HeaderValue::from_static("Fri, 31 Dec 9999 23:59:59 GMT"),
        );
        assert_eq!(retry_after(&headers), Some(MAX_BACKOFF));
    }

    #[test]
    fn past_retry_after_date_means_now() {
        let mut headers = HeaderMap::new();
        headers.insert(
            RETRY_AFTER,
            HeaderValue::from_static("Wed, 21 Oct 2015 07:28:00 GMT"),
        );
        assert_eq!(retry_after(&headers), Some(Duration::ZERO));
    }

    #[test]
    fn backoff_doubles_and_is_capped() {
        let sink = HttpSink::new(HttpSinkConfig::new("http://localhost"));
        assert_eq!(sink.backoff(1), Duration::from_millis(500));
        assert_eq!(sink.backoff(2), Duration::from_millis(1000));
        assert_eq!(sink.backoff(20), MAX_BACKOFF);
    }
}
