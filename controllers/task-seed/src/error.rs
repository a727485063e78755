//! Controller-specific error types.
//!
//! This module defines error types specific to the TaskSeed Controller
//! that are not covered by upstream library errors.

use cluster_client::ClusterError;
use thiserror::Error;

/// Errors that can occur in the TaskSeed Controller.
#[derive(Debug, Error)]
pub enum ControllerError {
    /// Kubernetes API error
    #[error("Cluster error: {0}")]
    Cluster(#[from] ClusterError),

    /// Invalid process configuration (fatal at startup)
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// TaskSeed spec failed validation
    #[error("Invalid spec: {0}")]
    InvalidSpec(String),

    /// The seed Job could not be created
    #[error("Job submission failed: {0}")]
    JobSubmission(String),

    /// Object is missing required metadata (name or namespace)
    #[error("Missing metadata: {0}")]
    MissingMetadata(String),
}

impl From<kube::Error> for ControllerError {
    fn from(err: kube::Error) -> Self {
        Self::Cluster(ClusterError::Kube(err))
    }
}
