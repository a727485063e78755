//! TaskSeed CRD
//!
//! Declares the desired seeding run for a MongoDB collection. Every spec
//! field is optional: unset fields fall back to the controller's
//! process-wide defaults when the intent is resolved.

use k8s_openapi::apimachinery::pkg::apis::meta::v1::Time;
use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(CustomResource, Debug, Clone, Serialize, Deserialize, JsonSchema, Default, PartialEq)]
#[kube(
    group = "tasks.huma.io",
    version = "v1alpha1",
    kind = "TaskSeed",
    plural = "taskseeds",
    namespaced,
    status = "TaskSeedStatus",
    printcolumn = r#"{"name":"Phase", "type":"string", "jsonPath":".status.phase"}"#,
    printcolumn = r#"{"name":"Job", "type":"string", "jsonPath":".status.jobName"}"#,
    printcolumn = r#"{"name":"Hash", "type":"string", "priority":1, "jsonPath":".status.appliedHash"}"#,
    printcolumn = r#"{"name":"Age", "type":"date", "jsonPath":".metadata.creationTimestamp"}"#
)]
#[serde(rename_all = "camelCase")]
pub struct TaskSeedSpec {
    /// Number of documents to generate (must be greater than zero)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub size: Option<i64>,

    /// Random seed driving document generation
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub seed: Option<i64>,

    /// Seeding mode: append, replace, upsert or maintain (case-insensitive)
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub mode: String,

    /// Free-form version tag; changing it forces a new run
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub seed_version: String,

    /// Prefix used for generated task titles
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub title_prefix: String,

    /// Pool of tags to draw from
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tags: Vec<String>,

    /// Fraction of generated tasks marked done, in [0, 1]
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub done_ratio: Option<f64>,

    /// Minimum number of tags per document
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tag_count_min: Option<i64>,

    /// Maximum number of tags per document
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tag_count_max: Option<i64>,

    /// Lower bound of the creation-time window (RFC 3339)
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub created_at_start: String,

    /// Upper bound of the creation-time window (RFC 3339)
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub created_at_end: String,

    /// Target database name
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub database: String,

    /// Target collection name
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub collection: String,

    /// MongoDB connection settings
    #[serde(default)]
    pub mongodb: MongoConnectionSpec,

    /// Per-instance overrides for the generated Job lifecycle
    #[serde(default)]
    pub job: JobLifecycleSpec,

    /// Cron expression for the recurring maintenance run; empty disables it
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub maintenance_schedule: String,
}

/// MongoDB connection source.
///
/// When `uriSecretRef` is set it always wins and `uri` is ignored.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, Default, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct MongoConnectionSpec {
    /// Literal connection URI
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub uri: String,

    /// Reference to a Secret key holding the connection URI
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub uri_secret_ref: Option<SecretKeyRef>,
}

/// Reference to a key within a Secret in the same namespace.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, Default, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct SecretKeyRef {
    /// Secret name
    #[serde(default)]
    pub name: String,

    /// Key within the Secret (defaults to `uri`)
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub key: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, Default, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct JobLifecycleSpec {
    /// Seconds a finished Job is kept before the TTL controller removes it
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ttl_seconds_after_finished: Option<i32>,

    /// Pod retries before the Job is marked failed
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub backoff_limit: Option<i32>,

    /// Wall-clock limit for the Job in seconds
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub active_deadline_seconds: Option<i64>,
}

/// Observed state of a `TaskSeed`.
///
/// Fields are never skipped on serialization: a merge patch built from this
/// struct carries explicit `null`s, so each write replaces the previous
/// status instead of merging into it.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, Default, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct TaskSeedStatus {
    /// Lifecycle phase of the current seeding run
    #[serde(default)]
    pub phase: SeedPhase,

    /// Human-readable detail, empty on success
    #[serde(default)]
    pub message: String,

    /// Name of the Job backing the current run
    #[serde(default)]
    pub job_name: Option<String>,

    /// Fingerprint of the resolved intent last submitted
    #[serde(default)]
    pub applied_hash: Option<String>,

    /// Start or completion time of the current run
    #[serde(default)]
    #[schemars(with = "Option<String>")]
    pub last_run_time: Option<Time>,

    /// Generation of the spec this status was computed from
    #[serde(default)]
    pub observed_generation: i64,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, JsonSchema, PartialEq, Eq, Default)]
/// Seeding run phase
///
/// Serializes as PascalCase ("Succeeded", "Failed", etc.) and also accepts
/// lowercase on read.
#[serde(rename_all = "PascalCase")]
pub enum SeedPhase {
    /// Job submitted but no pod running yet
    #[default]
    #[serde(alias = "pending")]
    Pending,

    /// Job has active pods
    #[serde(alias = "running")]
    Running,

    /// Job completed successfully
    #[serde(alias = "succeeded")]
    Succeeded,

    /// Spec invalid, submission rejected, or Job failed
    #[serde(alias = "failed")]
    Failed,
}

impl SeedPhase {
    /// Wire representation of the phase.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "Pending",
            Self::Running => "Running",
            Self::Succeeded => "Succeeded",
            Self::Failed => "Failed",
        }
    }
}

impl fmt::Display for SeedPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
