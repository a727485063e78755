//! ClusterClient trait for mocking
//!
//! This trait abstracts the Kubernetes calls made by the reconciler. The
//! kube-backed `KubeClusterClient` implements it for production and
//! `MockClusterClient` implements it for unit tests.

use crate::error::ClusterError;
use crds::TaskSeed;
use k8s_openapi::api::batch::v1::{CronJob, Job};

/// Trait for cluster API operations
///
/// All async methods must be `Send` to work with Tokio's work-stealing runtime.
#[async_trait::async_trait]
pub trait ClusterClientTrait: Send + Sync {
    // TaskSeed operations
    async fn list_task_seeds(&self, namespace: &str) -> Result<Vec<TaskSeed>, ClusterError>;
    async fn patch_task_seed_status(&self, namespace: &str, name: &str, patch: &serde_json::Value) -> Result<(), ClusterError>;

    // Job operations
    /// Returns `Ok(None)` when the Job does not exist.
    async fn get_job(&self, namespace: &str, name: &str) -> Result<Option<Job>, ClusterError>;
    async fn list_jobs(&self, namespace: &str, label_selector: &str) -> Result<Vec<Job>, ClusterError>;
    async fn create_job(&self, namespace: &str, job: &Job) -> Result<Job, ClusterError>;
    async fn delete_job(&self, namespace: &str, name: &str) -> Result<(), ClusterError>;

    // CronJob operations
    /// Returns `Ok(None)` when the CronJob does not exist.
    async fn get_cron_job(&self, namespace: &str, name: &str) -> Result<Option<CronJob>, ClusterError>;
    async fn create_cron_job(&self, namespace: &str, cron_job: &CronJob) -> Result<CronJob, ClusterError>;
    async fn replace_cron_job(&self, namespace: &str, name: &str, cron_job: &CronJob) -> Result<CronJob, ClusterError>;
    /// Fails with `ClusterError::NotFound` when there is nothing to delete.
    async fn delete_cron_job(&self, namespace: &str, name: &str) -> Result<(), ClusterError>;
}
