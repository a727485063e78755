//! Status reporting for TaskSeed resources.
//!
//! Derives the observed phase from a live seed Job and writes the
//! `TaskSeedStatus` through a merge patch on the status subresource.

use crate::error::ControllerError;
use cluster_client::ClusterClientTrait;
use crds::{SeedPhase, TaskSeedStatus};
use k8s_openapi::api::batch::v1::Job;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::Time;
use tracing::debug;

/// Phase, message and timestamp read off a Job.
#[derive(Debug, Clone, PartialEq)]
pub struct JobOutcome {
    /// Derived seeding phase
    pub phase: SeedPhase,
    /// Failure message, empty otherwise
    pub message: String,
    /// Completion, failure or start time, whichever applies
    pub last_run_time: Option<Time>,
}

/// Derive the seeding phase from a Job's live status.
///
/// Success wins over failure, failure over activity; a Job reporting
/// nothing yet is `Pending`.
pub fn derive_job_phase(job: &Job) -> JobOutcome {
    let Some(status) = job.status.as_ref() else {
        return JobOutcome {
            phase: SeedPhase::Pending,
            message: String::new(),
            last_run_time: None,
        };
    };

    if status.succeeded.unwrap_or(0) > 0 {
        return JobOutcome {
            phase: SeedPhase::Succeeded,
            message: String::new(),
            last_run_time: status.completion_time.clone(),
        };
    }

    let failed = status
        .conditions
        .iter()
        .flatten()
        .find(|c| c.type_ == "Failed" && c.status == "True");
    if let Some(condition) = failed {
        let message = condition
            .message
            .as_deref()
            .map(str::trim)
            .filter(|m| !m.is_empty())
            .unwrap_or("job failed")
            .to_string();
        return JobOutcome {
            phase: SeedPhase::Failed,
            message,
            last_run_time: status
                .completion_time
                .clone()
                .or_else(|| condition.last_transition_time.clone()),
        };
    }

    let phase = if status.active.unwrap_or(0) > 0 {
        SeedPhase::Running
    } else {
        SeedPhase::Pending
    };
    JobOutcome {
        phase,
        message: String::new(),
        last_run_time: status.start_time.clone(),
    }
}

/// Merge-patch body replacing the whole status.
pub fn status_patch(status: &TaskSeedStatus) -> serde_json::Value {
    serde_json::json!({ "status": status })
}

/// Writes TaskSeed status through the cluster client.
pub struct StatusReporter<'a> {
    client: &'a (dyn ClusterClientTrait + Send + Sync),
}

impl<'a> StatusReporter<'a> {
    /// Creates a reporter writing through `client`.
    pub fn new(client: &'a (dyn ClusterClientTrait + Send + Sync)) -> Self {
        Self { client }
    }

    /// Patch the status subresource of `namespace/name`.
    pub async fn patch(&self, namespace: &str, name: &str, status: &TaskSeedStatus) -> Result<(), ControllerError> {
        debug!(
            taskseed = %name,
            namespace,
            phase = %status.phase,
            job = status.job_name.as_deref().unwrap_or(""),
            "Patching TaskSeed status"
        );
        self.client
            .patch_task_seed_status(namespace, name, &status_patch(status))
            .await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::{create_test_job, job_status};
    use serde_json::json;

    fn job(status: serde_json::Value) -> Job {
        create_test_job("seed-demo-0123abcd", "demo", "2024-01-01T00:00:00Z", job_status(status))
    }

    #[test]
    fn test_succeeded_uses_completion_time() {
        let outcome = derive_job_phase(&job(json!({
            "succeeded": 1,
            "startTime": "2024-01-01T00:00:00Z",
            "completionTime": "2024-01-01T00:05:00Z"
        })));

        assert_eq!(outcome.phase, SeedPhase::Succeeded);
        assert!(outcome.message.is_empty());
        let expected: Time = serde_json::from_value(json!("2024-01-01T00:05:00Z")).unwrap();
        assert_eq!(outcome.last_run_time, Some(expected));
    }

    #[test]
    fn test_failure_takes_precedence_over_active() {
        let outcome = derive_job_phase(&job(json!({
            "active": 1,
            "conditions": [
                { "type": "Failed", "status": "True", "message": "BackoffLimitExceeded" }
            ]
        })));

        assert_eq!(outcome.phase, SeedPhase::Failed);
        assert_eq!(outcome.message, "BackoffLimitExceeded");
    }

    #[test]
    fn test_blank_failure_message_defaults() {
        let outcome = derive_job_phase(&job(json!({
            "conditions": [{ "type": "Failed", "status": "True", "message": "  " }]
        })));
        assert_eq!(outcome.message, "job failed");
    }

    #[test]
    fn test_false_failure_condition_ignored() {
        let outcome = derive_job_phase(&job(json!({
            "active": 1,
            "startTime": "2024-01-01T00:00:00Z",
            "conditions": [{ "type": "Failed", "status": "False" }]
        })));

        assert_eq!(outcome.phase, SeedPhase::Running);
        assert!(outcome.last_run_time.is_some());
    }

    #[test]
    fn test_all_zero_is_pending() {
        let outcome = derive_job_phase(&job(json!({ "active": 0, "succeeded": 0, "failed": 0 })));
        assert_eq!(outcome.phase, SeedPhase::Pending);
        assert!(outcome.last_run_time.is_none());

        let mut bare = job(json!({}));
        bare.status = None;
        assert_eq!(derive_job_phase(&bare).phase, SeedPhase::Pending);
    }

    #[test]
    fn test_status_patch_writes_nulls() {
        let patch = status_patch(&TaskSeedStatus {
            phase: SeedPhase::Failed,
            message: "invalid".to_string(),
            observed_generation: 2,
            ..Default::default()
        });

        assert_eq!(patch["status"]["phase"], "Failed");
        assert_eq!(patch["status"]["observedGeneration"], 2);
        assert!(patch["status"]["jobName"].is_null());
        assert!(patch["status"].as_object().unwrap().contains_key("appliedHash"));
    }
}
