//! Cross-hub migration messages and the transports that carry them
//!
//! Delivery is asynchronous and at-least-once; receivers must treat every
//! message as an idempotent upsert.

#![warn(missing_docs)]

pub mod envelope;
pub mod error;
pub mod http;
pub mod producer;

pub use envelope::{MessageEnvelope, MessageType, MigrationFromEvent, MigrationToEvent};
pub use error::TransportError;
pub use http::{event_router, HttpProducer, HubRoutes};
pub use producer::{InMemoryTransport, MessageProducer};
