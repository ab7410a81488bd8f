//! ==============================================================================
//! service.rs - client side of the remote hardware-access service
//! ==============================================================================
//!
//! purpose:
//!     the controller never touches pins itself. the remote service is the only
//!     source of truth for direction, level and configuration, reached through
//!     this small contract:
//!
//!         GET  /api/pins                 -> { "<position>": pin_info, ... }
//!         POST /api/pin/{p}/setup        { "direction": "INPUT"|"OUTPUT" }
//!         POST /api/pin/{p}/write        { "state": bool }
//!         GET  /api/pin/{p}/read
//!         GET  /api/gpio-info
//!
//!     every action reply is { success, message, pin_info, [state] }.
//!
//! design:
//!     - PinService trait: the seam. controller.rs depends on it only.
//!     - HttpPinService: reqwest implementation used by the binary.
//!     - mock::MockPinService (tests): simulated board with call counters.
//!
//! timeouts:
//!     none by default. `request_timeout` on HttpPinService is the hook; an
//!     elapsed request comes back as ControlError::Transport like any other
//!     network failure.
//!
//! ==============================================================================

use crate::domain::{lenient_level, pins_from_wire, Direction, GpioInfo, Level, Pin, PinInfo, Position};
use crate::error::ControlError;
use anyhow::{anyhow, Result};
use async_trait::async_trait;
use serde::Deserialize;
use std::collections::BTreeMap;
use std::time::Duration;

/// decoded reply of setup / write / read
#[derive(Debug, Clone, PartialEq)]
pub struct ActionReply {
    pub success: bool,
    pub message: String,
    /// fresh state of the addressed pin
    pub pin: Option<Pin>,
    /// level reported by read
    pub level: Option<Level>,
}

#[async_trait]
pub trait PinService: Send + Sync {
    /// full snapshot of the header
    async fn fetch_pins(&self) -> Result<BTreeMap<Position, Pin>, ControlError>;
    async fn setup(&self, position: Position, direction: Direction) -> Result<ActionReply, ControlError>;
    async fn write(&self, position: Position, level: Level) -> Result<ActionReply, ControlError>;
    async fn read(&self, position: Position) -> Result<ActionReply, ControlError>;
    async fn gpio_info(&self) -> Result<GpioInfo, ControlError>;
}

// ==============================================================================
// http implementation
// ==============================================================================

#[derive(Debug, Deserialize)]
struct ActionResponse {
    success: bool,
    #[serde(default)]
    message: String,
    #[serde(default, deserialize_with = "lenient_level")]
    state: Option<bool>,
    #[serde(default)]
    pin_info: Option<serde_json::Value>,
}

impl ActionResponse {
    fn into_reply(self, position: Position) -> Result<ActionReply, ControlError> {
        // the service answers `{}` for pins it does not know
        let pin = match self.pin_info {
            Some(serde_json::Value::Object(map)) if !map.is_empty() => {
                let info: PinInfo = serde_json::from_value(serde_json::Value::Object(map))
                    .map_err(|e| ControlError::transport(format!("malformed pin_info: {}", e)))?;
                Some(info.into_pin(position))
            }
            _ => None,
        };
        Ok(ActionReply {
            success: self.success,
            message: self.message,
            pin,
            level: self.state.map(Level::from),
        })
    }
}

#[derive(Debug, Clone)]
pub struct HttpPinService {
    base_url: String,
    http: reqwest::Client,
}

impl HttpPinService {
    pub fn new(base_url: &str, request_timeout: Option<Duration>) -> Result<Self> {
        let base_url = base_url.trim().trim_end_matches('/').to_string();
        if base_url.is_empty() {
            return Err(anyhow!("pin service base url is empty"));
        }

        let mut builder = reqwest::Client::builder();
        if let Some(timeout) = request_timeout {
            builder = builder.timeout(timeout);
        }
        let http = builder
            .build()
            .map_err(|e| anyhow!("Failed to build http client: {}", e))?;

        Ok(Self { base_url, http })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn pin_url(&self, position: Position, action: &str) -> String {
        format!("{}/api/pin/{}/{}", self.base_url, position, action)
    }

    async fn decode_action(
        response: reqwest::Response,
        position: Position,
    ) -> Result<ActionReply, ControlError> {
        let status = response.status();
        let bytes = response.bytes().await?;

        // failures still carry {success: false, message} with a 5xx status
        match serde_json::from_slice::<ActionResponse>(&bytes) {
            Ok(body) if status.is_success() || !body.success => body.into_reply(position),
            Ok(_) => Err(ControlError::transport(format!("HTTP {}", status))),
            Err(e) if status.is_success() => {
                Err(ControlError::transport(format!("invalid reply from pin service: {}", e)))
            }
            Err(_) => Err(ControlError::transport(format!(
                "HTTP {}: {}",
                status,
                String::from_utf8_lossy(&bytes).trim()
            ))),
        }
    }
}

#[async_trait]
impl PinService for HttpPinService {
    async fn fetch_pins(&self) -> Result<BTreeMap<Position, Pin>, ControlError> {
        let url = format!("{}/api/pins", self.base_url);
        tracing::debug!("GET {}", url);

        let response = self.http.get(&url).send().await?;
        if !response.status().is_success() {
            return Err(ControlError::transport(format!(
                "Failed to load pins (HTTP {})",
                response.status()
            )));
        }
        let raw: BTreeMap<String, PinInfo> = response
            .json()
            .await
            .map_err(|e| ControlError::transport(format!("invalid pin map: {}", e)))?;

        pins_from_wire(raw).map_err(ControlError::transport)
    }

    async fn setup(&self, position: Position, direction: Direction) -> Result<ActionReply, ControlError> {
        let url = self.pin_url(position, "setup");
        tracing::debug!("POST {} direction={}", url, direction);

        let response = self
            .http
            .post(&url)
            .json(&serde_json::json!({ "direction": direction.as_str() }))
            .send()
            .await?;
        Self::decode_action(response, position).await
    }

    async fn write(&self, position: Position, level: Level) -> Result<ActionReply, ControlError> {
        let url = self.pin_url(position, "write");
        tracing::debug!("POST {} state={}", url, level);

        let response = self
            .http
            .post(&url)
            .json(&serde_json::json!({ "state": level.is_high() }))
            .send()
            .await?;
        Self::decode_action(response, position).await
    }

    async fn read(&self, position: Position) -> Result<ActionReply, ControlError> {
        let url = self.pin_url(position, "read");
        tracing::debug!("GET {}", url);

        let response = self.http.get(&url).send().await?;
        Self::decode_action(response, position).await
    }

    async fn gpio_info(&self) -> Result<GpioInfo, ControlError> {
        let url = format!("{}/api/gpio-info", self.base_url);
        tracing::debug!("GET {}", url);

        let response = self.http.get(&url).send().await?;
        if !response.status().is_success() {
            return Err(ControlError::transport(format!("HTTP {}", response.status())));
        }
        response
            .json()
            .await
            .map_err(|e| ControlError::transport(format!("invalid gpio info: {}", e)))
    }
}

// ==============================================================================
// mock implementation (tests)
// ==============================================================================
