//! Workload builder
//!
//! Translates a resolved intent into the one-shot seed `Job` and the
//! optional maintenance `CronJob`. Construction is pure: nothing here talks
//! to the cluster.

use crate::config::{ControllerConfig, JobDefaults};
use crate::error::ControllerError;
use crate::hasher::short_fingerprint;
use crate::naming::{
    instance_labels, maintenance_cron_job_name, owner_reference, seed_job_name, seed_uid, LABEL_HASH,
    LABEL_MAINTENANCE,
};
use crate::resolver::{MongoConnection, ResolvedIntent, SeedMode};
use crds::{JobLifecycleSpec, TaskSeed};
use k8s_openapi::api::batch::v1::{CronJob, CronJobSpec, Job, JobSpec, JobTemplateSpec};
use k8s_openapi::api::core::v1::{
    Container, EnvVar, EnvVarSource, PodSpec, PodTemplateSpec, SecretKeySelector,
};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use std::collections::BTreeMap;

const CONTAINER_NAME: &str = "seeder";
const SEEDER_COMMAND: &str = "/app/seeder";

/// Lifecycle knobs applied to a seed Job.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct JobSettings {
    /// Seconds a finished Job is kept
    pub ttl_seconds_after_finished: i32,
    /// Pod retries before the Job fails
    pub backoff_limit: i32,
    /// Wall-clock bound on a run
    pub active_deadline_seconds: i64,
}

impl JobSettings {
    /// Per-instance override else process default, field by field.
    pub fn resolve(defaults: &JobDefaults, overrides: &JobLifecycleSpec) -> Self {
        Self {
            ttl_seconds_after_finished: overrides
                .ttl_seconds_after_finished
                .unwrap_or(defaults.ttl_seconds_after_finished),
            backoff_limit: overrides.backoff_limit.unwrap_or(defaults.backoff_limit),
            active_deadline_seconds: overrides
                .active_deadline_seconds
                .unwrap_or(defaults.active_deadline_seconds),
        }
    }
}

fn literal(name: &str, value: impl ToString) -> EnvVar {
    EnvVar {
        name: name.to_string(),
        value: Some(value.to_string()),
        ..Default::default()
    }
}

fn mongo_uri_env(connection: &MongoConnection) -> EnvVar {
    match connection {
        MongoConnection::Uri(uri) => literal("MONGODB_URI", uri),
        MongoConnection::Secret { name, key } => EnvVar {
            name: "MONGODB_URI".to_string(),
            value_from: Some(EnvVarSource {
                secret_key_ref: Some(SecretKeySelector {
                    name: name.clone(),
                    key: key.clone(),
                    ..Default::default()
                }),
                ..Default::default()
            }),
            ..Default::default()
        },
    }
}

/// Environment handed to the seeder executable.
///
/// `mode` is passed separately so the maintenance run can force `maintain`.
pub fn seed_env(intent: &ResolvedIntent, mode: SeedMode) -> Vec<EnvVar> {
    let mut env = vec![
        mongo_uri_env(&intent.connection),
        literal("MONGODB_DB", &intent.database),
        literal("MONGODB_COLLECTION", &intent.collection),
        literal("SEED_COUNT", intent.size),
        literal("SEED_MODE", mode),
        literal("SEED_RANDOM_SEED", intent.random_seed),
        literal("SEED_TITLE_PREFIX", &intent.title_prefix),
        literal("SEED_DONE_RATIO", intent.done_ratio),
        literal("SEED_TAG_COUNT_MIN", intent.tag_count_min),
        literal("SEED_TAG_COUNT_MAX", intent.tag_count_max),
    ];

    if !intent.seed_version.is_empty() {
        env.push(literal("SEED_VERSION", &intent.seed_version));
    }
    if !intent.tags.is_empty() {
        env.push(literal("SEED_TAGS", intent.tags.join(",")));
    }
    if let Some(start) = &intent.created_at_start {
        env.push(literal("SEED_CREATED_AT_START", start));
    }
    if let Some(end) = &intent.created_at_end {
        env.push(literal("SEED_CREATED_AT_END", end));
    }
    env
}

fn job_spec(
    config: &ControllerConfig,
    settings: JobSettings,
    labels: &BTreeMap<String, String>,
    env: Vec<EnvVar>,
) -> JobSpec {
    JobSpec {
        ttl_seconds_after_finished: Some(settings.ttl_seconds_after_finished),
        backoff_limit: Some(settings.backoff_limit),
        active_deadline_seconds: Some(settings.active_deadline_seconds),
        template: PodTemplateSpec {
            metadata: Some(ObjectMeta {
                labels: Some(labels.clone()),
                ..Default::default()
            }),
            spec: Some(PodSpec {
                restart_policy: Some("Never".to_string()),
                automount_service_account_token: Some(false),
                containers: vec![Container {
                    name: CONTAINER_NAME.to_string(),
                    image: Some(config.seed_job_image.clone()),
                    image_pull_policy: Some(config.seed_job_pull_policy.clone()),
                    command: Some(vec![SEEDER_COMMAND.to_string()]),
                    env: Some(env),
                    ..Default::default()
                }],
                ..Default::default()
            }),
        },
        ..Default::default()
    }
}

fn instance_name(seed: &TaskSeed) -> Result<&str, ControllerError> {
    seed.metadata
        .name
        .as_deref()
        .ok_or_else(|| ControllerError::MissingMetadata("TaskSeed missing name".to_string()))
}

/// Build the one-shot seed Job for `fingerprint`.
pub fn build_seed_job(
    config: &ControllerConfig,
    seed: &TaskSeed,
    intent: &ResolvedIntent,
    fingerprint: &str,
) -> Result<Job, ControllerError> {
    let instance = instance_name(seed)?;
    let short = short_fingerprint(fingerprint);

    let mut labels = instance_labels(instance, seed_uid(seed)?);
    labels.insert(LABEL_HASH.to_string(), short.to_string());

    let settings = JobSettings::resolve(&config.job_defaults, &seed.spec.job);

    Ok(Job {
        metadata: ObjectMeta {
            name: Some(seed_job_name(instance, short)),
            namespace: seed.metadata.namespace.clone(),
            labels: Some(labels.clone()),
            owner_references: Some(vec![owner_reference(seed)?]),
            ..Default::default()
        },
        spec: Some(job_spec(config, settings, &labels, seed_env(intent, intent.mode))),
        status: None,
    })
}

/// Build the recurring maintenance CronJob running on `schedule`.
///
/// Always runs the seeder in `maintain` mode, whatever the instance's mode.
pub fn build_maintenance_cron_job(
    config: &ControllerConfig,
    seed: &TaskSeed,
    intent: &ResolvedIntent,
    schedule: &str,
) -> Result<CronJob, ControllerError> {
    let instance = instance_name(seed)?;

    let mut labels = instance_labels(instance, seed_uid(seed)?);
    labels.insert(LABEL_MAINTENANCE.to_string(), "true".to_string());

    let settings = JobSettings::resolve(&config.job_defaults, &seed.spec.job);

    Ok(CronJob {
        metadata: ObjectMeta {
            name: Some(maintenance_cron_job_name(instance)),
            namespace: seed.metadata.namespace.clone(),
            labels: Some(labels.clone()),
            owner_references: Some(vec![owner_reference(seed)?]),
            ..Default::default()
        },
        spec: Some(CronJobSpec {
            schedule: schedule.trim().to_string(),
            concurrency_policy: Some("Forbid".to_string()),
            successful_jobs_history_limit: Some(1),
            failed_jobs_history_limit: Some(1),
            job_template: JobTemplateSpec {
                metadata: Some(ObjectMeta {
                    labels: Some(labels.clone()),
                    ..Default::default()
                }),
                spec: Some(job_spec(config, settings, &labels, seed_env(intent, SeedMode::Maintain))),
            },
            ..Default::default()
        }),
        status: None,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::naming::LABEL_SEED_UID;
    use crate::resolver::resolve;
    use crate::test_utils::{create_test_config, create_test_task_seed, create_test_task_seed_with_spec, TEST_NAMESPACE};
    use crds::{MongoConnectionSpec, SecretKeyRef, TaskSeedSpec};

    fn env_value<'a>(env: &'a [EnvVar], name: &str) -> Option<&'a str> {
        env.iter().find(|e| e.name == name).and_then(|e| e.value.as_deref())
    }

    fn container_env(spec: &JobSpec) -> Vec<EnvVar> {
        spec.template
            .spec
            .as_ref()
            .and_then(|pod| pod.containers.first())
            .and_then(|c| c.env.clone())
            .unwrap_or_default()
    }

    #[test]
    fn test_job_settings_override_pattern() {
        let defaults = JobDefaults::default();
        let overrides = JobLifecycleSpec {
            backoff_limit: Some(5),
            ..Default::default()
        };
        let settings = JobSettings::resolve(&defaults, &overrides);

        assert_eq!(settings.backoff_limit, 5);
        assert_eq!(settings.ttl_seconds_after_finished, 300);
        assert_eq!(settings.active_deadline_seconds, 300);
    }

    #[test]
    fn test_seed_job_shape() {
        let config = create_test_config();
        let seed = create_test_task_seed("demo", TEST_NAMESPACE);
        let intent = resolve(&config.seed_defaults, &seed.spec).unwrap();
        let job = build_seed_job(&config, &seed, &intent, "0123abcd0123abcd").unwrap();

        assert_eq!(job.metadata.name.as_deref(), Some("seed-demo-0123abcd"));
        let labels = job.metadata.labels.clone().unwrap();
        assert_eq!(labels.get(LABEL_HASH).map(String::as_str), Some("0123abcd"));
        assert_eq!(labels.get(LABEL_SEED_UID).map(String::as_str), Some("uid-demo"));
        assert!(!labels.contains_key(LABEL_MAINTENANCE));

        let owners = job.metadata.owner_references.clone().unwrap();
        assert_eq!(owners.len(), 1);
        assert_eq!(owners[0].uid, "uid-demo");

        let spec = job.spec.unwrap();
        assert_eq!(spec.backoff_limit, Some(1));
        assert_eq!(spec.ttl_seconds_after_finished, Some(300));
        let pod = spec.template.spec.clone().unwrap();
        assert_eq!(pod.restart_policy.as_deref(), Some("Never"));
        assert_eq!(pod.automount_service_account_token, Some(false));
        assert_eq!(pod.containers[0].name, "seeder");
        assert_eq!(pod.containers[0].image.as_deref(), Some("ghcr.io/example/seeder:test"));

        let env = container_env(&spec);
        assert_eq!(env_value(&env, "MONGODB_URI"), Some("mongodb://mongo:27017"));
        assert_eq!(env_value(&env, "MONGODB_DB"), Some("taskdb"));
        assert_eq!(env_value(&env, "SEED_COUNT"), Some("10"));
        assert_eq!(env_value(&env, "SEED_MODE"), Some("upsert"));
        assert_eq!(env_value(&env, "SEED_DONE_RATIO"), Some("0.3"));
        assert_eq!(env_value(&env, "SEED_TAGS"), Some("demo,seed"));
        assert!(env_value(&env, "SEED_VERSION").is_none());
        assert!(env_value(&env, "SEED_CREATED_AT_START").is_none());
    }

    #[test]
    fn test_conditional_env_and_secret_uri() {
        let config = create_test_config();
        let seed = create_test_task_seed_with_spec(
            "demo",
            TEST_NAMESPACE,
            TaskSeedSpec {
                seed_version: "v2".to_string(),
                created_at_start: "2024-01-01T00:00:00Z".to_string(),
                created_at_end: "2024-06-01T00:00:00Z".to_string(),
                mongodb: MongoConnectionSpec {
                    uri: "mongodb://ignored:27017".to_string(),
                    uri_secret_ref: Some(SecretKeyRef {
                        name: "mongo".to_string(),
                        key: "connection".to_string(),
                    }),
                },
                ..Default::default()
            },
        );
        let intent = resolve(&config.seed_defaults, &seed.spec).unwrap();
        let env = seed_env(&intent, intent.mode);

        assert_eq!(env_value(&env, "SEED_VERSION"), Some("v2"));
        assert_eq!(env_value(&env, "SEED_CREATED_AT_START"), Some("2024-01-01T00:00:00Z"));
        assert_eq!(env_value(&env, "SEED_CREATED_AT_END"), Some("2024-06-01T00:00:00Z"));

        let uri = env.iter().find(|e| e.name == "MONGODB_URI").unwrap();
        assert!(uri.value.is_none());
        let selector = uri
            .value_from
            .as_ref()
            .and_then(|source| source.secret_key_ref.as_ref())
            .unwrap();
        assert_eq!(selector.name, "mongo");
        assert_eq!(selector.key, "connection");
    }

    #[test]
    fn test_maintenance_cron_job_forces_maintain_mode() {
        let config = create_test_config();
        let seed = create_test_task_seed("demo", TEST_NAMESPACE);
        let intent = resolve(&config.seed_defaults, &seed.spec).unwrap();
        let cron_job = build_maintenance_cron_job(&config, &seed, &intent, " 0 3 * * * ").unwrap();

        assert_eq!(cron_job.metadata.name.as_deref(), Some("seed-demo-maintain"));
        let spec = cron_job.spec.unwrap();
        assert_eq!(spec.schedule, "0 3 * * *");
        assert_eq!(spec.concurrency_policy.as_deref(), Some("Forbid"));
        assert_eq!(spec.successful_jobs_history_limit, Some(1));

        let template_labels = spec.job_template.metadata.and_then(|m| m.labels).unwrap();
        assert_eq!(template_labels.get(LABEL_MAINTENANCE).map(String::as_str), Some("true"));
        assert_eq!(template_labels.get(LABEL_SEED_UID).map(String::as_str), Some("uid-demo"));

        let env = container_env(&spec.job_template.spec.unwrap());
        assert_eq!(env_value(&env, "SEED_MODE"), Some("maintain"));
    }

    #[test]
    fn test_missing_uid_is_rejected() {
        let config = create_test_config();
        let mut seed = create_test_task_seed("demo", TEST_NAMESPACE);
        seed.metadata.uid = None;
        let intent = resolve(&config.seed_defaults, &seed.spec).unwrap();

        assert!(matches!(
            build_seed_job(&config, &seed, &intent, "0123abcd"),
            Err(ControllerError::MissingMetadata(_))
        ));
    }
}
