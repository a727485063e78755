//! Deterministic resource names, labels and ownership for seed workloads.

use crate::error::ControllerError;
use crds::TaskSeed;
use k8s_openapi::api::batch::v1::Job;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::OwnerReference;
use kube::Resource;
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;

/// Kubernetes limit for object names and label values
pub const NAME_LIMIT: usize = 63;
/// CronJob names leave room for the suffix the CronJob controller appends
pub const CRON_JOB_NAME_LIMIT: usize = 52;

/// Component label
pub const LABEL_NAME: &str = "app.kubernetes.io/name";
/// Instance name label, clamped
pub const LABEL_INSTANCE: &str = "app.kubernetes.io/instance";
/// Manager label
pub const LABEL_MANAGED_BY: &str = "app.kubernetes.io/managed-by";
/// TaskSeed name label, clamped
pub const LABEL_SEED: &str = "tasks.huma.io/seed";
/// Short fingerprint of a one-shot Job
pub const LABEL_HASH: &str = "tasks.huma.io/hash";
/// Marks the maintenance CronJob and its Jobs
pub const LABEL_MAINTENANCE: &str = "tasks.huma.io/maintenance";
/// UID of the owning TaskSeed; the only label Jobs are selected by
pub const LABEL_SEED_UID: &str = "tasks.huma.io/seed-uid";

const COMPONENT: &str = "task-seeder";
const MANAGER: &str = "task-seed-controller";
const NAME_PREFIX: &str = "seed";
const MAINTENANCE_SUFFIX: &str = "maintain";
/// Hex digits of the full instance name kept when the name is shortened
const INSTANCE_DIGEST_LEN: usize = 6;

fn is_separator(c: char) -> bool {
    c == '-' || c == '.'
}

/// Build `seed-<instance>-<suffix>` within `limit` characters.
///
/// Only the instance segment is shortened so the suffix survives. A
/// shortened segment ends in a digest of the full instance name, so
/// instances sharing a long prefix still get distinct names.
fn bounded_name(instance: &str, suffix: &str, limit: usize) -> String {
    let fixed = NAME_PREFIX.len() + suffix.len() + 2;
    let room = limit.saturating_sub(fixed);
    let lowered = instance.to_lowercase();

    if lowered.chars().count() <= room {
        let segment = lowered.trim_end_matches(is_separator);
        return format!("{NAME_PREFIX}-{segment}-{suffix}");
    }

    let digest = format!("{:x}", Sha256::digest(lowered.as_bytes()));
    let digest: String = digest.chars().take(INSTANCE_DIGEST_LEN).collect();
    let head: String = lowered
        .chars()
        .take(room.saturating_sub(INSTANCE_DIGEST_LEN + 1))
        .collect();
    let head = head.trim_end_matches(is_separator);

    if head.is_empty() {
        format!("{NAME_PREFIX}-{digest}-{suffix}")
    } else {
        format!("{NAME_PREFIX}-{head}-{digest}-{suffix}")
    }
}

/// Name of the one-shot seed Job for an instance and fingerprint prefix.
pub fn seed_job_name(instance: &str, short_fingerprint: &str) -> String {
    bounded_name(instance, short_fingerprint, NAME_LIMIT)
}

/// Name of the recurring maintenance CronJob for an instance.
pub fn maintenance_cron_job_name(instance: &str) -> String {
    bounded_name(instance, MAINTENANCE_SUFFIX, CRON_JOB_NAME_LIMIT)
}

/// Clamp a label value to the 63 character limit.
pub fn label_value(value: &str) -> String {
    let bounded: String = value.chars().take(NAME_LIMIT).collect();
    bounded
        .trim_end_matches(|c: char| !c.is_ascii_alphanumeric())
        .to_string()
}

/// Labels shared by every workload created for an instance.
///
/// The name labels are clamped and may be shared by instances with a long
/// common prefix; `uid` is what the selectors match on.
pub fn instance_labels(instance: &str, uid: &str) -> BTreeMap<String, String> {
    let instance = label_value(instance);
    BTreeMap::from([
        (LABEL_NAME.to_string(), COMPONENT.to_string()),
        (LABEL_INSTANCE.to_string(), instance.clone()),
        (LABEL_MANAGED_BY.to_string(), MANAGER.to_string()),
        (LABEL_SEED.to_string(), instance),
        (LABEL_SEED_UID.to_string(), label_value(uid)),
    ])
}

/// Selects every Job belonging to the TaskSeed `uid`, maintenance runs included.
pub fn instance_selector(uid: &str) -> String {
    format!("{LABEL_SEED_UID}={}", label_value(uid))
}

/// Selects only the one-shot seed Jobs of the TaskSeed `uid`.
pub fn one_shot_selector(uid: &str) -> String {
    format!("{},!{LABEL_MAINTENANCE}", instance_selector(uid))
}

/// UID of the TaskSeed, required to label and select its workloads.
pub fn seed_uid(seed: &TaskSeed) -> Result<&str, ControllerError> {
    seed.metadata
        .uid
        .as_deref()
        .ok_or_else(|| ControllerError::MissingMetadata("TaskSeed missing uid".to_string()))
}

/// Whether `job` carries an owner reference to the TaskSeed `uid`.
pub fn is_owned_by(job: &Job, uid: &str) -> bool {
    job.metadata
        .owner_references
        .iter()
        .flatten()
        .any(|owner| owner.uid == uid)
}

/// Controller owner reference pointing back at the TaskSeed.
pub fn owner_reference(seed: &TaskSeed) -> Result<OwnerReference, ControllerError> {
    seed.controller_owner_ref(&()).ok_or_else(|| {
        ControllerError::MissingMetadata("TaskSeed has no name or uid for owner reference".to_string())
    })
}
