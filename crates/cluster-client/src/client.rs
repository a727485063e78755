//! kube-backed implementation of [`ClusterClientTrait`].

use crate::cluster_trait::ClusterClientTrait;
use crate::error::ClusterError;
use crds::TaskSeed;
use k8s_openapi::api::batch::v1::{CronJob, Job};
use kube::api::{
    Api, ApiResource, DeleteParams, DynamicObject, ListParams, Patch, PatchParams, PostParams,
};
use kube::Client;
use std::future::Future;
use std::time::Duration;
use tracing::{debug, warn};

/// Cluster client backed by the Kubernetes API server.
///
/// Every request is bounded by `request_timeout` so a single slow call
/// cannot stall a reconciliation pass.
#[derive(Clone)]
pub struct KubeClusterClient {
    client: Client,
    request_timeout: Duration,
}

impl std::fmt::Debug for KubeClusterClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KubeClusterClient")
            .field("request_timeout", &self.request_timeout)
            .finish_non_exhaustive()
    }
}

impl KubeClusterClient {
    /// Creates a client with the given per-request timeout.
    pub fn new(client: Client, request_timeout: Duration) -> Self {
        Self {
            client,
            request_timeout,
        }
    }

    fn jobs(&self, namespace: &str) -> Api<Job> {
        Api::namespaced(self.client.clone(), namespace)
    }

    fn cron_jobs(&self, namespace: &str) -> Api<CronJob> {
        Api::namespaced(self.client.clone(), namespace)
    }

    fn task_seeds(&self, namespace: &str) -> Api<TaskSeed> {
        Api::namespaced(self.client.clone(), namespace)
    }

    /// Runs a single API call under the request timeout.
    async fn bounded<T, F>(&self, operation: String, call: F) -> Result<T, ClusterError>
    where
        F: Future<Output = Result<T, kube::Error>> + Send,
    {
        match tokio::time::timeout(self.request_timeout, call).await {
            Ok(result) => result.map_err(|e| classify(e, &operation)),
            Err(_elapsed) => Err(ClusterError::Timeout {
                operation,
                after: self.request_timeout,
            }),
        }
    }
}

/// Maps well-known API status codes onto typed errors.
fn classify(err: kube::Error, operation: &str) -> ClusterError {
    match &err {
        kube::Error::Api(response) if response.code == 404 => {
            ClusterError::NotFound(operation.to_string())
        }
        kube::Error::Api(response) if response.code == 409 => {
            ClusterError::AlreadyExists(format!("{operation}: {}", response.message))
        }
        _ => ClusterError::Kube(err),
    }
}

#[async_trait::async_trait]
impl ClusterClientTrait for KubeClusterClient {
    async fn list_task_seeds(&self, namespace: &str) -> Result<Vec<TaskSeed>, ClusterError> {
        // List untyped so a single malformed object does not fail the whole list.
        let resource = ApiResource::erase::<TaskSeed>(&());
        let api: Api<DynamicObject> =
            Api::namespaced_with(self.client.clone(), namespace, &resource);
        let list = self
            .bounded(
                format!("list taskseeds in {namespace}"),
                api.list(&ListParams::default()),
            )
            .await?;

        let mut seeds = Vec::with_capacity(list.items.len());
        for object in list.items {
            let name = object
                .metadata
                .name
                .clone()
                .unwrap_or_else(|| "<unknown>".to_string());
            match object.try_parse::<TaskSeed>() {
                Ok(seed) => seeds.push(seed),
                Err(e) => warn!(taskseed = %name, namespace, error = %e, "Skipping undecodable TaskSeed"),
            }
        }
        debug!(namespace, count = seeds.len(), "Listed TaskSeeds");
        Ok(seeds)
    }

    async fn patch_task_seed_status(
        &self,
        namespace: &str,
        name: &str,
        patch: &serde_json::Value,
    ) -> Result<(), ClusterError> {
        let api = self.task_seeds(namespace);
        let pp = PatchParams::default();
        self.bounded(
            format!("patch status of taskseed {namespace}/{name}"),
            api.patch_status(name, &pp, &Patch::Merge(patch)),
        )
        .await?;
        Ok(())
    }

    async fn get_job(&self, namespace: &str, name: &str) -> Result<Option<Job>, ClusterError> {
        let api = self.jobs(namespace);
        self.bounded(format!("get job {namespace}/{name}"), api.get_opt(name))
            .await
    }

    async fn list_jobs(
        &self,
        namespace: &str,
        label_selector: &str,
    ) -> Result<Vec<Job>, ClusterError> {
        let api = self.jobs(namespace);
        let lp = ListParams::default().labels(label_selector);
        let list = self
            .bounded(
                format!("list jobs in {namespace} matching {label_selector}"),
                api.list(&lp),
            )
            .await?;
        Ok(list.items)
    }

    async fn create_job(&self, namespace: &str, job: &Job) -> Result<Job, ClusterError> {
        let api = self.jobs(namespace);
        let name = job.metadata.name.as_deref().unwrap_or("<unnamed>");
        self.bounded(
            format!("create job {namespace}/{name}"),
            api.create(&PostParams::default(), job),
        )
        .await
    }

    async fn delete_job(&self, namespace: &str, name: &str) -> Result<(), ClusterError> {
        let api = self.jobs(namespace);
        self.bounded(
            format!("delete job {namespace}/{name}"),
            api.delete(name, &DeleteParams::background()),
        )
        .await?;
        Ok(())
    }

    async fn get_cron_job(
        &self,
        namespace: &str,
        name: &str,
    ) -> Result<Option<CronJob>, ClusterError> {
        let api = self.cron_jobs(namespace);
        self.bounded(format!("get cronjob {namespace}/{name}"), api.get_opt(name))
            .await
    }

    async fn create_cron_job(
        &self,
        namespace: &str,
        cron_job: &CronJob,
    ) -> Result<CronJob, ClusterError> {
        let api = self.cron_jobs(namespace);
        let name = cron_job.metadata.name.as_deref().unwrap_or("<unnamed>");
        self.bounded(
            format!("create cronjob {namespace}/{name}"),
            api.create(&PostParams::default(), cron_job),
        )
        .await
    }

    async fn replace_cron_job(
        &self,
        namespace: &str,
        name: &str,
        cron_job: &CronJob,
    ) -> Result<CronJob, ClusterError> {
        let api = self.cron_jobs(namespace);
        self.bounded(
            format!("replace cronjob {namespace}/{name}"),
            api.replace(name, &PostParams::default(), cron_job),
        )
        .await
    }

    async fn delete_cron_job(&self, namespace: &str, name: &str) -> Result<(), ClusterError> {
        let api = self.cron_jobs(namespace);
        self.bounded(
            format!("delete cronjob {namespace}/{name}"),
            api.delete(name, &DeleteParams::background()),
        )
        .await?;
        Ok(())
    }
}
