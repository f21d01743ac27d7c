//! HTTP push transport
//!
//! The manager POSTs each envelope as JSON to `<route>/v1/events` on the
//! destination hub's agent. The agent's [`event_router`] queues it for the
//! dispatcher and answers 202 without waiting for processing.

use std::collections::BTreeMap;
use std::path::Path;
use std::time::Duration;

use async_trait::async_trait;
use axum::extract::State;
use axum::http::StatusCode;
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::Deserialize;
use tokio::sync::mpsc;
use tracing::{debug, warn};

use crate::envelope::MessageEnvelope;
use crate::error::TransportError;
use crate::producer::MessageProducer;

/// Path agents accept events on
pub const EVENTS_PATH: &str = "/v1/events";

/// Default request timeout for event delivery
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

/// Static table of hub name to agent base URL
///
/// ```yaml
/// hubs:
///   hub-a: http://fleethub-agent.hub-a.svc:8080
///   hub-b: http://fleethub-agent.hub-b.svc:8080
/// ```
#[derive(Clone, Debug, Default, Deserialize, PartialEq, Eq)]
pub struct HubRoutes {
    /// Hub name to base URL
    #[serde(default)]
    pub hubs: BTreeMap<String, String>,
}

impl HubRoutes {
    /// Parse routes from YAML
    pub fn from_yaml(yaml: &str) -> Result<Self, TransportError> {
        serde_yaml::from_str(yaml).map_err(|e| TransportError::Routes(e.to_string()))
    }

    /// Load routes from a YAML file
    pub fn load(path: &Path) -> Result<Self, TransportError> {
        let yaml = std::fs::read_to_string(path)
            .map_err(|e| TransportError::Routes(format!("{}: {}", path.display(), e)))?;
        Self::from_yaml(&yaml)
    }

    /// Events URL for a hub
    pub fn events_url(&self, hub: &str) -> Option<String> {
        self.hubs
            .get(hub)
            .map(|base| format!("{}{}", base.trim_end_matches('/'), EVENTS_PATH))
    }
}

/// Producer that POSTs envelopes to each hub's agent
pub struct HttpProducer {
    client: reqwest::Client,
    routes: HubRoutes,
}

impl HttpProducer {
    /// Create a producer over `routes`
    pub fn new(routes: HubRoutes) -> Result<Self, TransportError> {
        let client = reqwest::Client::builder()
            .timeout(DEFAULT_REQUEST_TIMEOUT)
            .build()
            .map_err(|e| TransportError::Request {
                destination: "*".to_string(),
                message: e.to_string(),
            })?;
        Ok(Self { client, routes })
    }
}

#[async_trait]
impl MessageProducer for HttpProducer {
    async fn send(&self, envelope: &MessageEnvelope) -> Result<(), TransportError> {
        let url = self
            .routes
            .events_url(&envelope.destination)
            .ok_or_else(|| TransportError::UnknownDestination(envelope.destination.clone()))?;

        let response = self
            .client
            .post(&url)
            .json(envelope)
            .send()
            .await
            .map_err(|e| TransportError::Request {
                destination: envelope.destination.clone(),
                message: e.to_string(),
            })?;

        let status = response.status();
        if !status.is_success() {
            return Err(TransportError::Rejected {
                destination: envelope.destination.clone(),
                status: status.as_u16(),
            });
        }

        debug!(hub = %envelope.destination, %url, message_type = %envelope.type_, "Message posted");
        Ok(())
    }
}

/// Router accepting `POST /v1/events` and forwarding into `tx`
pub fn event_router(tx: mpsc::Sender<MessageEnvelope>) -> Router {
    Router::new()
        .route(EVENTS_PATH, post(events_handler))
        .route("/healthz", get(|| async { "ok" }))
        .with_state(tx)
}

async fn events_handler(
    State(tx): State<mpsc::Sender<MessageEnvelope>>,
    Json(envelope): Json<MessageEnvelope>,
) -> StatusCode {
    let hub = envelope.destination.clone();
    match tx.send(envelope).await {
        Ok(()) => StatusCode::ACCEPTED,
        Err(_) => {
            warn!(hub = %hub, "Agent queue closed, rejecting event");
            StatusCode::SERVICE_UNAVAILABLE
        }
    }
}
