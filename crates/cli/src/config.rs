//! `hookrelay.toml` loading and validation.
//!
//! Every section and key is optional. The file is parsed into the raw shape
//! below, then converted into the validated values the other crates consume;
//! the process never starts with a configuration that fails conversion.

use std::collections::{BTreeMap, BTreeSet};
use std::net::SocketAddr;
use std::path::Path;
use std::time::Duration;

use delivery::HttpSinkConfig;
use events::{
    AggregationWindow, ConfigError, EventType, RelaySettings, TemplateId, TemplateSettings,
};
use serde::Deserialize;

/// Path tried when `--config` is not given.
pub const DEFAULT_PATH: &str = "hookrelay.toml";

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    pub server: ServerConfig,
    pub aggregation: AggregationConfig,
    pub templates: TemplatesConfig,
    pub delivery: DeliveryConfig,
    pub telemetry: TelemetryConfig,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ServerConfig {
    pub bind: String,
    /// Shared secret for `X-Hub-Signature-256`; unsigned requests are
    /// accepted when unset.
    pub webhook_secret: Option<String>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: "127.0.0.1:8080".to_string(),
            webhook_secret: None,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct AggregationConfig {
    /// Window length in seconds; negative disables aggregation.
    pub timeout_secs: i64,
}

impl Default for AggregationConfig {
    fn default() -> Self {
        Self { timeout_secs: 1 }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct TemplatesConfig {
    pub disabled: Vec<String>,
    pub overrides: BTreeMap<String, String>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeliveryKind {
    #[default]
    Log,
    Http,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct DeliveryConfig {
    pub kind: DeliveryKind,
    pub url: Option<String>,
    pub max_attempts: u32,
    pub room: Option<String>,
}

impl Default for DeliveryConfig {
    fn default() -> Self {
        Self {
            kind: DeliveryKind::Log,
            url: None,
            max_attempts: 3,
            room: None,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct TelemetryConfig {
    pub log_level: String,
    pub json: bool,
    pub otlp_endpoint: Option<String>,
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            json: false,
            otlp_endpoint: None,
        }
    }
}

impl Config {
    /// Loads `path`, or [`DEFAULT_PATH`] if it exists, or the defaults.
    ///
    /// An explicitly given path must exist.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let path = match path {
            Some(path) => path,
            None if Path::new(DEFAULT_PATH).exists() => Path::new(DEFAULT_PATH),
            None => return Ok(Self::default()),
        };
        let text = std::fs::read_to_string(path).map_err(|e| ConfigError::Unreadable {
            path: path.display().to_string(),
            message: e.to_string(),
        })?;
        Self::from_toml(&text)
    }

    pub fn from_toml(text: &str) -> Result<Self, ConfigError> {
        toml::from_str(text).map_err(|e| ConfigError::Parse {
            message: e.to_string(),
        })
    }

    /// Checks every value; run after applying command-line overrides.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.bind_addr()?;
        self.relay_settings()?;
        self.http_sink()?;
        if self.telemetry.log_level.trim().is_empty() {
            return Err(invalid("telemetry.log_level", "must not be empty"));
        }
        Ok(())
    }

    pub fn bind_addr(&self) -> Result<SocketAddr, ConfigError> {
        self.server
            .bind
            .parse()
            .map_err(|e| invalid("server.bind", format!("{e}")))
    }

    pub fn relay_settings(&self) -> Result<RelaySettings, ConfigError> {
        let disabled = self
            .templates
            .disabled
            .iter()
            .map(|name| {
                name.parse::<EventType>()
                    .map_err(|_| invalid("templates.disabled", format!("unknown event type '{name}'")))
            })
            .collect::<Result<BTreeSet<_>, _>>()?;

        let overrides = self
            .templates
            .overrides
            .iter()
            .map(|(from, to)| {
                let pair = TemplateId::new(from.as_str()).zip(TemplateId::new(to.as_str()));
                pair.ok_or_else(|| invalid("templates.overrides", "template ids must not be empty"))
            })
            .collect::<Result<BTreeMap<_, _>, _>>()?;

        Ok(RelaySettings {
            window: AggregationWindow::from_secs(self.aggregation.timeout_secs),
            templates: TemplateSettings {
                disabled,
                overrides,
            },
        })
    }

    /// Settings for the HTTP sink; `None` when delivering to the log.
    pub fn http_sink(&self) -> Result<Option<HttpSinkConfig>, ConfigError> {
        if self.delivery.kind == DeliveryKind::Log {
            return Ok(None);
        }
        let url = self
            .delivery
            .url
            .as_deref()
            .filter(|u| u.starts_with("http://") || u.starts_with("https://"))
            .ok_or_else(|| invalid("delivery.url", "an http(s) URL is required for kind = \"http\""))?;
        if self.delivery.max_attempts == 0 {
            return Err(invalid("delivery.max_attempts", "must be at least 1"));
        }
        Ok(Some(HttpSinkConfig {
            url: url.to_string(),
            room: self.delivery.room.clone(),
            max_attempts: self.delivery.max_attempts,
            base_delay: Duration::from_millis(500),
        }))
    }
}

fn invalid(field: &str, message: impl Into<String>) -> ConfigError {
    ConfigError::Invalid {
        field: field.to_string(),
        message: message.into(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_file_gives_defaults() {
        let config = Config::from_toml("").unwrap();
        config.validate().unwrap();
        assert_eq!(config.bind_addr().unwrap().port(), 8080);
        let settings = config.relay_settings().unwrap();
        assert_eq!(
            settings.window,
            AggregationWindow::Fixed(Duration::from_secs(1))
        );
        assert!(config.http_sink().unwrap().is_none());
    }

    #[test]
    fn full_file_is_converted() {
        let config = Config::from_toml(
            r#"
            [server]
            bind = "0.0.0.0:9000"
            webhook_secret = "s3cret"

            [aggregation]
            timeout_secs = -1

            [templates]
            disabled = ["watch", "star"]
            overrides = { "push" = "push_compact" }

            [delivery]
            kind = "http"
            url = "https://chat.example.org/hooks/abc"
            max_attempts = 5
            room = "!ops:example.org"

            [telemetry]
            log_level = "debug"
            json = true
            "#,
        )
        .unwrap();
        config.validate().unwrap();

        let settings = config.relay_settings().unwrap();
        assert_eq!(settings.window, AggregationWindow::Disabled);
        assert!(settings.templates.is_disabled(EventType::Watch));
        assert_eq!(
            settings
                .templates
                .resolve(TemplateId::new("push").unwrap())
                .as_str(),
            "push_compact"
        );

        let sink = config.http_sink().unwrap().unwrap();
        assert_eq!(sink.max_attempts, 5);
        assert_eq!(sink.room.as_deref(), Some("!ops:example.org"));
    }

    #[test]
    fn http_delivery_needs_a_url() {
        let config = Config::from_toml("[delivery]\nkind = \"http\"\n").unwrap();
        let err = config.validate().unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { ref field, .. } if field == "delivery.url"));
    }

    #[test]
    fn unknown_disabled_event_type_is_rejected() {
        let config = Config::from_toml("[templates]\ndisabled = [\"sponsorship\"]\n").unwrap();
        assert!(config.relay_settings().is_err());
    }

    #[test]
    fn unknown_keys_are_parse_errors() {
        let err = Config::from_toml("[server]\nport = 80\n").unwrap_err();
        assert!(matches!(err, ConfigError::Parse { .. }));
    }

    #[test]
    fn bad_bind_address_is_rejected() {
        let config = Config::from_toml("[server]\nbind = \"localhost\"\n").unwrap();
        assert!(config.bind_addr().is_err());
    }

    #[test]
    fn explicit_missing_file_is_unreadable() {
        let err = Config::load(Some(Path::new("/nonexistent/hookrelay.toml"))).unwrap_err();
        assert!(matches!(err, ConfigError::Unreadable { .. }));
    }
}
