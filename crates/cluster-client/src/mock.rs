//! Mock ClusterClient for unit testing
//!
//! This module provides an in-memory implementation of `ClusterClientTrait`
//! so reconciler tests can run without an API server. Status patches are
//! recorded and applied to the stored `TaskSeed`, which lets tests drive
//! several reconciliation passes against the same state.

use crate::cluster_trait::ClusterClientTrait;
use crate::error::ClusterError;
use crds::{TaskSeed, TaskSeedStatus};
use k8s_openapi::api::batch::v1::{CronJob, Job, JobStatus};
use kube::api::ObjectMeta;
use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

type Key = (String, String);

fn key(namespace: &str, name: &str) -> Key {
    (namespace.to_string(), name.to_string())
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// A status patch captured by the mock.
#[derive(Debug, Clone)]
pub struct RecordedPatch {
    /// Namespace of the patched TaskSeed
    pub namespace: String,
    /// Name of the patched TaskSeed
    pub name: String,
    /// Raw merge-patch body
    pub body: serde_json::Value,
}

/// Mock ClusterClient for testing
///
/// Clones share state, so a test can hand one clone to the reconciler and
/// inspect the other afterwards.
#[derive(Clone, Default)]
pub struct MockClusterClient {
    task_seeds: Arc<Mutex<BTreeMap<Key, TaskSeed>>>,
    jobs: Arc<Mutex<BTreeMap<Key, Job>>>,
    cron_jobs: Arc<Mutex<HashMap<Key, CronJob>>>,
    patches: Arc<Mutex<Vec<RecordedPatch>>>,
    job_creates: Arc<Mutex<u32>>,
    deleted_jobs: Arc<Mutex<Vec<String>>>,
    // Failure injection
    list_failure: Arc<Mutex<Option<String>>>,
    job_create_failure: Arc<Mutex<Option<String>>>,
    cron_job_write_failure: Arc<Mutex<Option<String>>>,
    status_patch_failure: Arc<Mutex<Option<String>>>,
}

impl std::fmt::Debug for MockClusterClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MockClusterClient").finish_non_exhaustive()
    }
}

impl MockClusterClient {
    /// Create an empty mock cluster
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a TaskSeed to the mock store (for test setup)
    pub fn add_task_seed(&self, seed: TaskSeed) {
        let namespace = seed.metadata.namespace.clone().unwrap_or_else(|| "default".to_string());
        let name = seed.metadata.name.clone().unwrap_or_default();
        lock(&self.task_seeds).insert((namespace, name), seed);
    }

    /// Fetch a stored TaskSeed
    pub fn task_seed(&self, namespace: &str, name: &str) -> Option<TaskSeed> {
        lock(&self.task_seeds).get(&key(namespace, name)).cloned()
    }

    /// Replace the spec of a stored TaskSeed and bump its generation
    pub fn update_task_seed_spec(&self, namespace: &str, name: &str, spec: crds::TaskSeedSpec) {
        if let Some(seed) = lock(&self.task_seeds).get_mut(&key(namespace, name)) {
            seed.spec = spec;
            seed.metadata.generation = Some(seed.metadata.generation.unwrap_or(0) + 1);
        }
    }

    /// Add a Job to the mock store (for test setup)
    pub fn add_job(&self, job: Job) {
        let namespace = job.metadata.namespace.clone().unwrap_or_else(|| "default".to_string());
        let name = job.metadata.name.clone().unwrap_or_default();
        lock(&self.jobs).insert((namespace, name), job);
    }

    /// Fetch a stored Job
    pub fn job(&self, namespace: &str, name: &str) -> Option<Job> {
        lock(&self.jobs).get(&key(namespace, name)).cloned()
    }

    /// All Jobs stored in a namespace, ordered by name
    pub fn jobs(&self, namespace: &str) -> Vec<Job> {
        lock(&self.jobs)
            .iter()
            .filter(|((ns, _), _)| ns == namespace)
            .map(|(_, job)| job.clone())
            .collect()
    }

    /// Overwrite the status of a stored Job
    pub fn set_job_status(&self, namespace: &str, name: &str, status: JobStatus) {
        if let Some(job) = lock(&self.jobs).get_mut(&key(namespace, name)) {
            job.status = Some(status);
        }
    }

    /// Add a CronJob to the mock store (for test setup)
    pub fn add_cron_job(&self, cron_job: CronJob) {
        let namespace = cron_job.metadata.namespace.clone().unwrap_or_else(|| "default".to_string());
        let name = cron_job.metadata.name.clone().unwrap_or_default();
        lock(&self.cron_jobs).insert((namespace, name), cron_job);
    }

    /// Fetch a stored CronJob
    pub fn cron_job(&self, namespace: &str, name: &str) -> Option<CronJob> {
        lock(&self.cron_jobs).get(&key(namespace, name)).cloned()
    }

    /// Every status patch received, in order
    pub fn status_patches(&self) -> Vec<RecordedPatch> {
        lock(&self.patches).clone()
    }

    /// Number of successful `create_job` calls
    pub fn job_create_count(&self) -> u32 {
        *lock(&self.job_creates)
    }

    /// Names of Jobs removed through `delete_job`
    pub fn deleted_jobs(&self) -> Vec<String> {
        lock(&self.deleted_jobs).clone()
    }

    /// Make `list_task_seeds` fail with the given message
    pub fn fail_list_with(&self, message: impl Into<String>) {
        *lock(&self.list_failure) = Some(message.into());
    }

    /// Make `create_job` fail with the given message
    pub fn fail_job_create_with(&self, message: impl Into<String>) {
        *lock(&self.job_create_failure) = Some(message.into());
    }

    /// Make CronJob create/replace/delete fail with the given message
    pub fn fail_cron_job_writes_with(&self, message: impl Into<String>) {
        *lock(&self.cron_job_write_failure) = Some(message.into());
    }

    /// Make status patches for one TaskSeed name fail
    pub fn fail_status_patch_for(&self, name: impl Into<String>) {
        *lock(&self.status_patch_failure) = Some(name.into());
    }

    fn cron_write_failure(&self) -> Option<ClusterError> {
        lock(&self.cron_job_write_failure).clone().map(ClusterError::Api)
    }
}

/// Matches `key=value`, `key` and `!key` terms joined by commas.
fn selector_matches(selector: &str, labels: Option<&BTreeMap<String, String>>) -> bool {
    selector.split(',').map(str::trim).filter(|term| !term.is_empty()).all(|term| {
        if let Some(absent) = term.strip_prefix('!') {
            return labels.is_none_or(|l| !l.contains_key(absent));
        }
        match term.split_once('=') {
            Some((k, v)) => labels.and_then(|l| l.get(k)).is_some_and(|value| value == v),
            None => labels.is_some_and(|l| l.contains_key(term)),
        }
    })
}

fn stamp(metadata: &mut ObjectMeta, namespace: &str) {
    metadata.namespace = Some(namespace.to_string());
    metadata.uid = Some(uuid::Uuid::new_v4().to_string());
    metadata.resource_version = Some("1".to_string());
}

fn bump_version(version: Option<&str>) -> String {
    let current: u64 = version.and_then(|v| v.parse().ok()).unwrap_or(0);
    (current + 1).to_string()
}

#[async_trait::async_trait]
impl ClusterClientTrait for MockClusterClient {
    async fn list_task_seeds(&self, namespace: &str) -> Result<Vec<TaskSeed>, ClusterError> {
        if let Some(message) = lock(&self.list_failure).clone() {
            return Err(ClusterError::Api(message));
        }
        Ok(lock(&self.task_seeds)
            .iter()
            .filter(|((ns, _), _)| ns == namespace)
            .map(|(_, seed)| seed.clone())
            .collect())
    }

    async fn patch_task_seed_status(
        &self,
        namespace: &str,
        name: &str,
        patch: &serde_json::Value,
    ) -> Result<(), ClusterError> {
        if lock(&self.status_patch_failure).as_deref() == Some(name) {
            return Err(ClusterError::Api(format!("status patch rejected for {name}")));
        }
        let status: TaskSeedStatus = serde_json::from_value(patch["status"].clone())
            .map_err(|e| ClusterError::Decode(e.to_string()))?;
        let mut seeds = lock(&self.task_seeds);
        let seed = seeds
            .get_mut(&key(namespace, name))
            .ok_or_else(|| ClusterError::NotFound(format!("taskseed {namespace}/{name}")))?;
        seed.status = Some(status);
        lock(&self.patches).push(RecordedPatch {
            namespace: namespace.to_string(),
            name: name.to_string(),
            body: patch.clone(),
        });
        Ok(())
    }

    async fn get_job(&self, namespace: &str, name: &str) -> Result<Option<Job>, ClusterError> {
        Ok(self.job(namespace, name))
    }

    async fn list_jobs(&self, namespace: &str, label_selector: &str) -> Result<Vec<Job>, ClusterError> {
        Ok(self
            .jobs(namespace)
            .into_iter()
            .filter(|job| selector_matches(label_selector, job.metadata.labels.as_ref()))
            .collect())
    }

    async fn create_job(&self, namespace: &str, job: &Job) -> Result<Job, ClusterError> {
        if let Some(message) = lock(&self.job_create_failure).clone() {
            return Err(ClusterError::Api(message));
        }
        let name = job.metadata.name.clone().unwrap_or_default();
        let mut jobs = lock(&self.jobs);
        if jobs.contains_key(&key(namespace, &name)) {
            return Err(ClusterError::AlreadyExists(format!("job {namespace}/{name}")));
        }
        let mut created = job.clone();
        stamp(&mut created.metadata, namespace);
        jobs.insert(key(namespace, &name), created.clone());
        *lock(&self.job_creates) += 1;
        Ok(created)
    }

    async fn delete_job(&self, namespace: &str, name: &str) -> Result<(), ClusterError> {
        match lock(&self.jobs).remove(&key(namespace, name)) {
            Some(_) => {
                lock(&self.deleted_jobs).push(name.to_string());
                Ok(())
            }
            None => Err(ClusterError::NotFound(format!("job {namespace}/{name}"))),
        }
    }

    async fn get_cron_job(&self, namespace: &str, name: &str) -> Result<Option<CronJob>, ClusterError> {
        Ok(self.cron_job(namespace, name))
    }

    async fn create_cron_job(&self, namespace: &str, cron_job: &CronJob) -> Result<CronJob, ClusterError> {
        if let Some(err) = self.cron_write_failure() {
            return Err(err);
        }
        let name = cron_job.metadata.name.clone().unwrap_or_default();
        let mut cron_jobs = lock(&self.cron_jobs);
        if cron_jobs.contains_key(&key(namespace, &name)) {
            return Err(ClusterError::AlreadyExists(format!("cronjob {namespace}/{name}")));
        }
        let mut created = cron_job.clone();
        stamp(&mut created.metadata, namespace);
        cron_jobs.insert(key(namespace, &name), created.clone());
        Ok(created)
    }

    async fn replace_cron_job(&self, namespace: &str, name: &str, cron_job: &CronJob) -> Result<CronJob, ClusterError> {
        if let Some(err) = self.cron_write_failure() {
            return Err(err);
        }
        let mut cron_jobs = lock(&self.cron_jobs);
        let existing = cron_jobs
            .get(&key(namespace, name))
            .ok_or_else(|| ClusterError::NotFound(format!("cronjob {namespace}/{name}")))?;
        if existing.metadata.resource_version != cron_job.metadata.resource_version {
            return Err(ClusterError::Api(format!(
                "conflict replacing cronjob {namespace}/{name}: stale resourceVersion"
            )));
        }
        let mut replaced = cron_job.clone();
        replaced.metadata.uid = existing.metadata.uid.clone();
        replaced.metadata.namespace = Some(namespace.to_string());
        replaced.metadata.resource_version =
            Some(bump_version(existing.metadata.resource_version.as_deref()));
        cron_jobs.insert(key(namespace, name), replaced.clone());
        Ok(replaced)
    }

    async fn delete_cron_job(&self, namespace: &str, name: &str) -> Result<(), ClusterError> {
        if let Some(err) = self.cron_write_failure() {
            return Err(err);
        }
        match lock(&self.cron_jobs).remove(&key(namespace, name)) {
            Some(_) => Ok(()),
            None => Err(ClusterError::NotFound(format!("cronjob {namespace}/{name}"))),
        }
    }
}
