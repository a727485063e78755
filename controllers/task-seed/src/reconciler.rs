//! Reconciliation logic for TaskSeed CRDs.
//!
//! Each pass lists every TaskSeed in the watched namespace and, per
//! instance, resolves the spec, fingerprints it, and makes sure exactly one
//! seed Job exists for that fingerprint. The Job's live status is mirrored
//! back into the TaskSeed status. Nothing is cached between passes.

use crate::config::ControllerConfig;
use crate::error::ControllerError;
use crate::hasher::{fingerprint, short_fingerprint};
use crate::naming::{
    instance_selector, is_owned_by, maintenance_cron_job_name, one_shot_selector, seed_job_name, seed_uid,
};
use crate::resolver::{resolve, ResolvedIntent};
use crate::status::{derive_job_phase, StatusReporter};
use crate::workload::{build_maintenance_cron_job, build_seed_job};
use cluster_client::ClusterClientTrait;
use crds::{SeedPhase, TaskSeed, TaskSeedStatus};
use k8s_openapi::api::batch::v1::Job;
use tracing::{debug, error, info, warn};

const WAITING_FOR_ACTIVE_JOB: &str = "waiting for active seed job";

/// Outcome counts for one reconciliation pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PassSummary {
    /// Instances reconciled without error
    pub reconciled: usize,
    /// Instances whose reconciliation returned an error
    pub failed: usize,
}

/// Reconciles TaskSeed resources into seed Jobs and maintenance CronJobs.
pub struct Reconciler {
    client: Box<dyn ClusterClientTrait + Send + Sync>,
    config: ControllerConfig,
}

impl Reconciler {
    /// Creates a new reconciler instance.
    pub fn new(client: Box<dyn ClusterClientTrait + Send + Sync>, config: ControllerConfig) -> Self {
        Self { client, config }
    }

    fn reporter(&self) -> StatusReporter<'_> {
        StatusReporter::new(self.client.as_ref())
    }

    /// Run one pass over every TaskSeed in the configured namespace.
    ///
    /// A failed list abandons the pass. Failures of individual instances are
    /// logged and counted; the remaining instances are still processed.
    pub async fn reconcile_all(&self) -> Result<PassSummary, ControllerError> {
        let namespace = &self.config.namespace;
        let seeds = self.client.list_task_seeds(namespace).await?;

        let mut summary = PassSummary::default();
        for seed in &seeds {
            match self.reconcile_task_seed(seed).await {
                Ok(()) => summary.reconciled += 1,
                Err(e) => {
                    summary.failed += 1;
                    error!(
                        taskseed = seed.metadata.name.as_deref().unwrap_or("<unknown>"),
                        namespace = %namespace,
                        error = %e,
                        "Failed to reconcile TaskSeed"
                    );
                }
            }
        }
        Ok(summary)
    }

    /// Reconciles a single TaskSeed.
    ///
    /// Errors are returned only when the cluster could not be read or the
    /// status could not be written. Invalid specs and rejected Job
    /// submissions are reported through a `Failed` status instead.
    pub async fn reconcile_task_seed(&self, seed: &TaskSeed) -> Result<(), ControllerError> {
        let name = seed
            .metadata
            .name
            .as_deref()
            .ok_or_else(|| ControllerError::MissingMetadata("TaskSeed missing name".to_string()))?;
        let namespace = seed.metadata.namespace.as_deref().unwrap_or(&self.config.namespace);
        let generation = seed.metadata.generation.unwrap_or_default();
        let previous = seed.status.clone().unwrap_or_default();

        debug!(taskseed = %name, namespace, generation, "Reconciling TaskSeed");

        let intent = match resolve(&self.config.seed_defaults, &seed.spec) {
            Ok(intent) => intent,
            Err(ControllerError::InvalidSpec(message)) => {
                warn!(taskseed = %name, namespace, error = %message, "TaskSeed spec is invalid");
                let status = TaskSeedStatus {
                    phase: SeedPhase::Failed,
                    message,
                    observed_generation: generation,
                    ..Default::default()
                };
                return self.reporter().patch(namespace, name, &status).await;
            }
            Err(e) => return Err(e),
        };

        let uid = seed_uid(seed)?;
        let hash = fingerprint(&intent);
        let job_name = seed_job_name(name, short_fingerprint(&hash));

        if let Some(job) = self.client.get_job(namespace, &job_name).await? {
            if !is_owned_by(&job, uid) {
                warn!(
                    taskseed = %name,
                    namespace,
                    job = %job_name,
                    "Seed Job name taken by a Job this TaskSeed does not own"
                );
                let status = TaskSeedStatus {
                    phase: SeedPhase::Failed,
                    message: format!("seed job {job_name} exists and is not owned by this TaskSeed"),
                    observed_generation: generation,
                    ..Default::default()
                };
                return self.reporter().patch(namespace, name, &status).await;
            }
            self.reconcile_maintenance_logged(seed, &intent, namespace).await;

            let outcome = derive_job_phase(&job);
            debug!(taskseed = %name, namespace, job = %job_name, phase = %outcome.phase, "Observed seed Job");
            let status = TaskSeedStatus {
                phase: outcome.phase,
                message: outcome.message,
                job_name: Some(job_name),
                applied_hash: Some(hash),
                last_run_time: outcome.last_run_time,
                observed_generation: generation,
            };
            return self.reporter().patch(namespace, name, &status).await;
        }

        // Already applied and the Job has since expired.
        if previous.applied_hash.as_deref() == Some(hash.as_str()) && previous.phase == SeedPhase::Succeeded {
            self.reconcile_maintenance_logged(seed, &intent, namespace).await;
            if previous.observed_generation < generation {
                let status = TaskSeedStatus {
                    observed_generation: generation,
                    ..previous
                };
                return self.reporter().patch(namespace, name, &status).await;
            }
            debug!(taskseed = %name, namespace, "TaskSeed already seeded, nothing to do");
            return Ok(());
        }

        if let Some(active) = self.find_active_job(namespace, uid).await? {
            let active_name = active.metadata.name.clone();
            info!(
                taskseed = %name,
                namespace,
                job = active_name.as_deref().unwrap_or(""),
                "Seed Job still active, deferring new run"
            );
            let status = TaskSeedStatus {
                phase: SeedPhase::Running,
                message: WAITING_FOR_ACTIVE_JOB.to_string(),
                job_name: active_name,
                applied_hash: previous.applied_hash,
                last_run_time: active.status.and_then(|s| s.start_time),
                observed_generation: generation,
            };
            return self.reporter().patch(namespace, name, &status).await;
        }

        let job = build_seed_job(&self.config, seed, &intent, &hash)?;
        if let Err(e) = self.client.create_job(namespace, &job).await {
            let failure = ControllerError::JobSubmission(e.to_string());
            error!(taskseed = %name, namespace, job = %job_name, error = %failure, "Failed to create seed Job");
            let status = TaskSeedStatus {
                phase: SeedPhase::Failed,
                message: e.to_string(),
                observed_generation: generation,
                ..Default::default()
            };
            return self.reporter().patch(namespace, name, &status).await;
        }
        info!(taskseed = %name, namespace, job = %job_name, hash = %hash, "Created seed Job");

        self.reconcile_maintenance_logged(seed, &intent, namespace).await;
        self.prune_stale_jobs(namespace, name, uid, &job_name).await;

        let status = TaskSeedStatus {
            phase: SeedPhase::Pending,
            message: String::new(),
            job_name: Some(job_name),
            applied_hash: Some(hash),
            last_run_time: None,
            observed_generation: generation,
        };
        self.reporter().patch(namespace, name, &status).await
    }

    /// First Job of the TaskSeed `uid`, maintenance runs included, with active pods.
    async fn find_active_job(&self, namespace: &str, uid: &str) -> Result<Option<Job>, ControllerError> {
        let jobs = self.client.list_jobs(namespace, &instance_selector(uid)).await?;
        Ok(jobs
            .into_iter()
            .find(|job| job.status.as_ref().and_then(|s| s.active).unwrap_or(0) > 0))
    }

    async fn reconcile_maintenance_logged(&self, seed: &TaskSeed, intent: &ResolvedIntent, namespace: &str) {
        if let Err(e) = self.reconcile_maintenance(seed, intent, namespace).await {
            error!(
                taskseed = seed.metadata.name.as_deref().unwrap_or("<unknown>"),
                namespace,
                error = %e,
                "Failed to reconcile maintenance CronJob"
            );
        }
    }

    /// Converge the maintenance CronJob on the instance's schedule.
    ///
    /// A blank schedule removes the CronJob; an already absent one is fine.
    pub async fn reconcile_maintenance(
        &self,
        seed: &TaskSeed,
        intent: &ResolvedIntent,
        namespace: &str,
    ) -> Result<(), ControllerError> {
        let instance = seed
            .metadata
            .name
            .as_deref()
            .ok_or_else(|| ControllerError::MissingMetadata("TaskSeed missing name".to_string()))?;
        let cron_job_name = maintenance_cron_job_name(instance);
        let schedule = seed.spec.maintenance_schedule.trim();

        if schedule.is_empty() {
            return match self.client.delete_cron_job(namespace, &cron_job_name).await {
                Ok(()) => {
                    info!(taskseed = %instance, namespace, cronjob = %cron_job_name, "Deleted maintenance CronJob");
                    Ok(())
                }
                Err(e) if e.is_not_found() => Ok(()),
                Err(e) => Err(e.into()),
            };
        }

        let mut desired = build_maintenance_cron_job(&self.config, seed, intent, schedule)?;
        match self.client.get_cron_job(namespace, &cron_job_name).await? {
            None => {
                self.client.create_cron_job(namespace, &desired).await?;
                info!(taskseed = %instance, namespace, cronjob = %cron_job_name, schedule, "Created maintenance CronJob");
            }
            Some(existing) => {
                if existing.spec == desired.spec && existing.metadata.labels == desired.metadata.labels {
                    debug!(taskseed = %instance, namespace, cronjob = %cron_job_name, "Maintenance CronJob up to date");
                    return Ok(());
                }
                desired.metadata.resource_version = existing.metadata.resource_version;
                self.client.replace_cron_job(namespace, &cron_job_name, &desired).await?;
                info!(taskseed = %instance, namespace, cronjob = %cron_job_name, schedule, "Updated maintenance CronJob");
            }
        }
        Ok(())
    }

    /// Delete finished one-shot Jobs beyond the history limit.
    ///
    /// Failures are logged only; Job TTLs remain the primary cleanup.
    pub async fn prune_stale_jobs(&self, namespace: &str, instance: &str, uid: &str, current_job: &str) {
        let jobs = match self.client.list_jobs(namespace, &one_shot_selector(uid)).await {
            Ok(jobs) => jobs,
            Err(e) => {
                warn!(taskseed = %instance, namespace, error = %e, "Failed to list seed Jobs for pruning");
                return;
            }
        };

        for stale in jobs_to_prune(jobs, self.config.job_history_limit, current_job) {
            match self.client.delete_job(namespace, &stale).await {
                Ok(()) => info!(taskseed = %instance, namespace, job = %stale, "Pruned stale seed Job"),
                Err(e) if e.is_not_found() => {}
                Err(e) => warn!(taskseed = %instance, namespace, job = %stale, error = %e, "Failed to prune seed Job"),
            }
        }
    }
}

/// Names of finished Jobs older than the newest `keep`.
///
/// Active and not yet started Jobs are never selected, nor is `current_job`.
fn jobs_to_prune(jobs: Vec<Job>, keep: usize, current_job: &str) -> Vec<String> {
    let mut finished: Vec<Job> = jobs
        .into_iter()
        .filter(|job| job.metadata.name.as_deref() != Some(current_job))
        .filter(|job| matches!(derive_job_phase(job).phase, SeedPhase::Succeeded | SeedPhase::Failed))
        .collect();

    // Newest first; name breaks ties so the order is stable.
    finished.sort_by(|a, b| {
        b.metadata
            .creation_timestamp
            .cmp(&a.metadata.creation_timestamp)
            .then_with(|| b.metadata.name.cmp(&a.metadata.name))
    });

    finished
        .into_iter()
        .skip(keep)
        .filter_map(|job| job.metadata.name)
        .collect()
}
