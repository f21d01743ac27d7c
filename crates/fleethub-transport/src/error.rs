//! Transport error types

use thiserror::Error;

/// Errors sending or receiving protocol messages
#[derive(Debug, Error)]
pub enum TransportError {
    /// No channel or route is known for the destination
    #[error("no route to hub {0}")]
    UnknownDestination(String),

    /// The destination's receiver has gone away
    #[error("channel to hub {0} is closed")]
    ChannelClosed(String),

    /// The HTTP request could not be sent
    #[error("request to hub {destination} failed: {message}")]
    Request {
        /// Destination hub
        destination: String,
        /// Underlying error text
        message: String,
    },

    /// The receiving hub answered with a non-success status
    #[error("hub {destination} rejected message with status {status}")]
    Rejected {
        /// Destination hub
        destination: String,
        /// HTTP status code
        status: u16,
    },

    /// The routes file could not be read or parsed
    #[error("invalid hub routes: {0}")]
    Routes(String),
}

impl TransportError {
    /// Destination the failed send was addressed to, if any
    pub fn destination(&self) -> Option<&str> {
        match self {
            Self::UnknownDestination(d) | Self::ChannelClosed(d) => Some(d),
            Self::Request { destination, .. } | Self::Rejected { destination, .. } => Some(destination),
            Self::Routes(_) => None,
        }
    }
}

impl From<TransportError> for fleethub_common::Error {
    fn from(e: TransportError) -> Self {
        let destination = e
            .destination()
            .unwrap_or(fleethub_common::error::UNKNOWN_CONTEXT)
            .to_string();
        fleethub_common::Error::transport(destination, e.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_conversion_keeps_destination() {
        let err: fleethub_common::Error = TransportError::Rejected {
            destination: "hub-a".to_string(),
            status: 500,
        }
        .into();
        match err {
            fleethub_common::Error::Transport { destination, message } => {
                assert_eq!(destination, "hub-a");
                assert!(message.contains("500"));
            }
            other => panic!("unexpected error: {other}"),
        }
    }
}
