//! Error types for fleethub
//!
//! Errors carry the migration, hub or destination they relate to so that a
//! failed reconcile or message handler can be traced back to its input.

use thiserror::Error;

/// Default context value when no specific context is available
pub const UNKNOWN_CONTEXT: &str = "unknown";

/// Main error type for fleethub operations
#[derive(Debug, Error)]
pub enum Error {
    /// Kubernetes API error
    #[error("kubernetes error: {source}")]
    Kube {
        /// The underlying kube-rs error
        #[from]
        source: kube::Error,
    },

    /// A ManagedClusterMigration spec is unusable as written
    #[error("validation error for {migration}: {message}")]
    Validation {
        /// Name of the migration with invalid configuration
        migration: String,
        /// Description of what's invalid
        message: String,
    },

    /// Cluster-to-hub resolution failed
    #[error("resolution error for {migration}: {message}")]
    Resolution {
        /// Name of the migration being resolved
        migration: String,
        /// Description of what failed
        message: String,
    },

    /// Credential material or hub endpoint is malformed or missing
    #[error("credential error for hub {hub}: {message}")]
    Credential {
        /// Hub whose credential could not be used
        hub: String,
        /// Description of what's wrong
        message: String,
    },

    /// Serialization/deserialization error
    #[error("serialization error: {message}")]
    Serialization {
        /// Description of what failed
        message: String,
        /// The payload or resource kind being processed (if known)
        kind: Option<String>,
    },

    /// Sending a message to another hub failed
    #[error("transport error to {destination}: {message}")]
    Transport {
        /// Destination identity of the message
        destination: String,
        /// Description of what failed
        message: String,
    },

    /// Internal/operational error
    #[error("internal error [{context}]: {message}")]
    Internal {
        /// Description of what failed
        message: String,
        /// Context where the error occurred (e.g., "coordinator", "detach")
        context: String,
    },
}

impl Error {
    /// Create a validation error for a migration
    pub fn validation(migration: impl Into<String>, msg: impl Into<String>) -> Self {
        Self::Validation {
            migration: migration.into(),
            message: msg.into(),
        }
    }

    /// Create a resolution error for a migration
    pub fn resolution(migration: impl Into<String>, msg: impl Into<String>) -> Self {
        Self::Resolution {
            migration: migration.into(),
            message: msg.into(),
        }
    }

    /// Create a credential error for a hub
    pub fn credential(hub: impl Into<String>, msg: impl Into<String>) -> Self {
        Self::Credential {
            hub: hub.into(),
            message: msg.into(),
        }
    }

    /// Create a serialization error with the given message
    pub fn serialization(msg: impl Into<String>) -> Self {
        Self::Serialization {
            message: msg.into(),
            kind: None,
        }
    }

    /// Create a serialization error with payload kind context
    pub fn serialization_for_kind(kind: impl Into<String>, msg: impl Into<String>) -> Self {
        Self::Serialization {
            message: msg.into(),
            kind: Some(kind.into()),
        }
    }

    /// Create a transport error for a destination
    pub fn transport(destination: impl Into<String>, msg: impl Into<String>) -> Self {
        Self::Transport {
            destination: destination.into(),
            message: msg.into(),
        }
    }

    /// Create an internal error with the given message
    pub fn internal(msg: impl Into<String>) -> Self {
        Self::Internal {
            message: msg.into(),
            context: UNKNOWN_CONTEXT.to_string(),
        }
    }

    /// Create an internal error with context
    pub fn internal_with_context(context: impl Into<String>, msg: impl Into<String>) -> Self {
        Self::Internal {
            message: msg.into(),
            context: context.into(),
        }
    }

    /// Check if this error is retryable
    ///
    /// Validation and serialization errors need a spec or payload fix.
    /// Resolution errors are retried because inventory catches up eventually.
    pub fn is_retryable(&self) -> bool {
        match self {
            Error::Kube { source } => !matches!(
                source,
                kube::Error::Api(ae) if (400..500).contains(&ae.code) && ae.code != 404 && ae.code != 409
            ),
            Error::Validation { .. } => false,
            Error::Resolution { .. } => true,
            Error::Credential { .. } => true,
            Error::Serialization { .. } => false,
            Error::Transport { .. } => true,
            Error::Internal { .. } => true,
        }
    }

    /// True if this wraps a Kubernetes 409 Conflict
    pub fn is_conflict(&self) -> bool {
        matches!(self, Error::Kube { source: kube::Error::Api(ae) } if ae.code == 409)
    }

    /// True if this wraps a Kubernetes 404 Not Found
    pub fn is_not_found(&self) -> bool {
        matches!(self, Error::Kube { source: kube::Error::Api(ae) } if ae.code == 404)
    }
}
