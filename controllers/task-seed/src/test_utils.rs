//! Test utilities for unit testing the reconciler
//!
//! This module provides helpers for creating test data and setting up test scenarios.

#[cfg(test)]
use crate::config::{ControllerConfig, JobDefaults, LogFormat, SeedDefaults};
#[cfg(test)]
use crate::naming::{instance_labels, LABEL_MAINTENANCE};
#[cfg(test)]
use crds::{TaskSeed, TaskSeedSpec};
#[cfg(test)]
use k8s_openapi::api::batch::v1::{Job, JobStatus};
#[cfg(test)]
use std::time::Duration;

/// Namespace used throughout the reconciler tests
#[cfg(test)]
pub const TEST_NAMESPACE: &str = "default";

/// Helper to create a controller config suitable for tests
#[cfg(test)]
pub fn create_test_config() -> ControllerConfig {
    ControllerConfig {
        namespace: TEST_NAMESPACE.to_string(),
        poll_interval: Duration::from_millis(50),
        request_timeout: Duration::from_secs(1),
        job_history_limit: 3,
        log_format: LogFormat::Text,
        seed_job_image: "ghcr.io/example/seeder:test".to_string(),
        seed_job_pull_policy: "IfNotPresent".to_string(),
        seed_defaults: SeedDefaults {
            mongo_uri: "mongodb://mongo:27017".to_string(),
            ..SeedDefaults::default()
        },
        job_defaults: JobDefaults::default(),
    }
}

/// Helper to create a TaskSeed with name, uid and generation set
#[cfg(test)]
pub fn create_test_task_seed(name: &str, namespace: &str) -> TaskSeed {
    create_test_task_seed_with_spec(
        name,
        namespace,
        TaskSeedSpec {
            size: Some(10),
            mode: "upsert".to_string(),
            done_ratio: Some(0.3),
            ..Default::default()
        },
    )
}

/// UID the fixtures assign to the TaskSeed `name`
#[cfg(test)]
pub fn test_uid(name: &str) -> String {
    format!("uid-{name}")
}

/// Helper to create a TaskSeed with a custom spec
#[cfg(test)]
pub fn create_test_task_seed_with_spec(name: &str, namespace: &str, spec: TaskSeedSpec) -> TaskSeed {
    let mut seed = TaskSeed::new(name, spec);
    seed.metadata.namespace = Some(namespace.to_string());
    seed.metadata.uid = Some(test_uid(name));
    seed.metadata.generation = Some(1);
    seed
}

/// Helper to create a one-shot seed Job labelled for `instance`
///
/// `created_at` is an RFC 3339 creation timestamp. The Job carries the
/// labels but no owner reference.
#[cfg(test)]
pub fn create_test_job(name: &str, instance: &str, created_at: &str, status: JobStatus) -> Job {
    let mut job: Job = serde_json::from_value(serde_json::json!({
        "apiVersion": "batch/v1",
        "kind": "Job",
        "metadata": {
            "name": name,
            "namespace": TEST_NAMESPACE,
            "creationTimestamp": created_at,
        },
    }))
    .expect("job fixture should deserialize");
    job.metadata.labels = Some(instance_labels(instance, &test_uid(instance)));
    job.status = Some(status);
    job
}

/// Helper to create a maintenance Job spawned by the CronJob of `instance`
#[cfg(test)]
pub fn create_test_maintenance_job(name: &str, instance: &str, status: JobStatus) -> Job {
    let mut job = create_test_job(name, instance, "2024-01-01T00:00:00Z", status);
    if let Some(labels) = job.metadata.labels.as_mut() {
        labels.insert(LABEL_MAINTENANCE.to_string(), "true".to_string());
    }
    job
}

/// Helper to build a JobStatus from its JSON form
#[cfg(test)]
pub fn job_status(value: serde_json::Value) -> JobStatus {
    serde_json::from_value(value).expect("job status fixture should deserialize")
}

