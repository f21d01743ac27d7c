//! Wire format of the cross-hub migration protocol
//!
//! Every message is a JSON envelope `{type, source, destination, payload}`.
//! The envelope is decoded first; the payload is decoded only once the type
//! is known, so a receiver can tell an unknown type from a malformed payload.

use std::fmt;

use k8s_openapi::api::core::v1::Secret;
use serde::{Deserialize, Serialize};

use fleethub_common::crd::KlusterletConfig;
use fleethub_common::Error;

/// Known message types
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum MessageType {
    /// Sent to each source hub with its bootstrap descriptors and clusters
    MigrationFrom,
    /// Sent to the destination hub with the service account to authorize
    MigrationTo,
}

impl MessageType {
    /// Wire name of this message type
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::MigrationFrom => "migration.from",
            Self::MigrationTo => "migration.to",
        }
    }

    /// Parse a wire name, returning None for unknown types
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "migration.from" => Some(Self::MigrationFrom),
            "migration.to" => Some(Self::MigrationTo),
            _ => None,
        }
    }
}

impl fmt::Display for MessageType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A routed protocol message
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct MessageEnvelope {
    /// Wire message type, kept as a string so unknown types survive decoding
    #[serde(rename = "type")]
    pub type_: String,
    /// Sender identity
    pub source: String,
    /// Receiving hub
    pub destination: String,
    /// Type-specific payload
    pub payload: serde_json::Value,
}

impl MessageEnvelope {
    /// Build an envelope, serializing `payload`
    pub fn new<P: Serialize>(
        type_: MessageType,
        source: impl Into<String>,
        destination: impl Into<String>,
        payload: &P,
    ) -> Result<Self, Error> {
        let payload = serde_json::to_value(payload)
            .map_err(|e| Error::serialization_for_kind(type_.as_str(), e.to_string()))?;
        Ok(Self {
            type_: type_.as_str().to_string(),
            source: source.into(),
            destination: destination.into(),
            payload,
        })
    }

    /// Known message type, if any
    pub fn message_type(&self) -> Option<MessageType> {
        MessageType::parse(&self.type_)
    }

    /// Decode the payload as `P`
    pub fn decode_payload<P: for<'de> Deserialize<'de>>(&self) -> Result<P, Error> {
        serde_json::from_value(self.payload.clone())
            .map_err(|e| Error::serialization_for_kind(self.type_.clone(), e.to_string()))
    }

    /// Decode an envelope from raw JSON bytes
    pub fn from_slice(bytes: &[u8]) -> Result<Self, Error> {
        serde_json::from_slice(bytes).map_err(|e| Error::serialization_for_kind("envelope", e.to_string()))
    }
}

/// Payload of `migration.from`
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct MigrationFromEvent {
    /// Descriptor for the destination hub
    pub bootstrap_secret: Secret,
    /// Descriptor for the source hub, kept so clusters can fall back
    pub original_bootstrap_secret: Secret,
    /// Routing policy listing both descriptors
    pub routing_policy: KlusterletConfig,
    /// Clusters this source hub must hand over
    pub managed_clusters: Vec<String>,
}

/// Payload of `migration.to`
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct MigrationToEvent {
    /// Migration service account name (the migration name)
    pub service_account_name: String,
    /// Namespace the service account is installed in on managed clusters
    pub service_account_install_namespace: String,
}
