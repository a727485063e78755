//! Cluster client errors

use std::time::Duration;
use thiserror::Error;

/// Errors that can occur when talking to the Kubernetes API
#[derive(Debug, Error)]
pub enum ClusterError {
    /// Kubernetes client/transport error
    #[error("Kubernetes error: {0}")]
    Kube(#[from] kube::Error),

    /// Resource not found
    #[error("Not found: {0}")]
    NotFound(String),

    /// Resource with the same name already exists
    #[error("Already exists: {0}")]
    AlreadyExists(String),

    /// Request exceeded the per-operation timeout
    #[error("Timed out after {after:?}: {operation}")]
    Timeout {
        /// Operation that timed out
        operation: String,
        /// Configured bound
        after: Duration,
    },

    /// Object could not be decoded into its typed form
    #[error("Decode error: {0}")]
    Decode(String),

    /// Any other API failure
    #[error("Cluster API error: {0}")]
    Api(String),
}

impl ClusterError {
    /// Whether the error reports a missing resource.
    pub fn is_not_found(&self) -> bool {
        match self {
            Self::NotFound(_) => true,
            Self::Kube(kube::Error::Api(response)) => response.code == 404,
            _ => false,
        }
    }
}
