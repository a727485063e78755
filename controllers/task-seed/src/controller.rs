//! Main controller implementation.
//!
//! This module contains the `Controller` struct that drives the
//! reconciliation passes on a fixed interval until a shutdown signal arrives.

use crate::config::ControllerConfig;
use crate::error::ControllerError;
use crate::reconciler::Reconciler;
use cluster_client::{ClusterClientTrait, KubeClusterClient};
use kube::Client;
use std::time::{Duration, Instant};
use tokio::sync::watch;
use tokio::time::{interval, MissedTickBehavior};
use tracing::{error, info, warn};

/// Main controller for TaskSeed management.
pub struct Controller {
    reconciler: Reconciler,
    namespace: String,
    poll_interval: Duration,
}

impl Controller {
    /// Creates a controller talking to the cluster from the ambient kubeconfig.
    pub async fn new(config: ControllerConfig) -> Result<Self, ControllerError> {
        info!("Initializing TaskSeed Controller");

        let kube_client = Client::try_default().await?;
        let cluster = KubeClusterClient::new(kube_client, config.request_timeout);

        Ok(Self::with_client(Box::new(cluster), config))
    }

    /// Creates a controller over an existing cluster client.
    pub fn with_client(client: Box<dyn ClusterClientTrait + Send + Sync>, config: ControllerConfig) -> Self {
        let namespace = config.namespace.clone();
        let poll_interval = config.poll_interval;
        Self {
            reconciler: Reconciler::new(client, config),
            namespace,
            poll_interval,
        }
    }

    /// Runs the controller until SIGINT or SIGTERM.
    pub async fn run(self) -> Result<(), ControllerError> {
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        tokio::spawn(shutdown_signal(shutdown_tx));
        self.run_until(shutdown_rx).await
    }

    /// Runs reconciliation passes until `shutdown` turns true.
    ///
    /// The flag is only checked between passes, so a pass in flight always
    /// completes.
    pub async fn run_until(self, mut shutdown: watch::Receiver<bool>) -> Result<(), ControllerError> {
        info!(
            namespace = %self.namespace,
            poll_interval_ms = self.poll_interval.as_millis() as u64,
            "TaskSeed Controller running"
        );

        let mut ticker = interval(self.poll_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            if *shutdown.borrow() {
                break;
            }
            tokio::select! {
                _ = ticker.tick() => {}
                changed = shutdown.changed() => {
                    if changed.is_err() {
                        warn!("Shutdown channel closed, stopping");
                        break;
                    }
                    continue;
                }
            }
            self.tick().await;
        }

        info!("TaskSeed Controller stopped");
        Ok(())
    }

    async fn tick(&self) {
        let started = Instant::now();
        match self.reconciler.reconcile_all().await {
            Ok(summary) => info!(
                namespace = %self.namespace,
                reconciled = summary.reconciled,
                failed = summary.failed,
                elapsed_ms = started.elapsed().as_millis() as u64,
                "Reconciliation pass complete"
            ),
            Err(e) => error!(
                namespace = %self.namespace,
                error = %e,
                "Reconciliation pass abandoned, retrying next interval"
            ),
        }
    }
}

/// Flip `shutdown` to true on SIGINT or SIGTERM.
async fn shutdown_signal(shutdown: watch::Sender<bool>) {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!(error = %e, "Failed to listen for SIGINT");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                warn!(error = %e, "Failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };
    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {}
        () = terminate => {}
    }

    info!("Shutdown signal received, finishing current pass");
    // Receiver gone means the loop already exited.
    let _ = shutdown.send(true);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::{create_test_config, create_test_task_seed, TEST_NAMESPACE};
    use cluster_client::MockClusterClient;

    #[tokio::test]
    async fn test_stops_before_first_pass_when_already_shut_down() {
        let mock = MockClusterClient::new();
        mock.add_task_seed(create_test_task_seed("demo", TEST_NAMESPACE));
        let controller = Controller::with_client(Box::new(mock.clone()), create_test_config());

        let (tx, rx) = watch::channel(false);
        tx.send(true).unwrap();
        controller.run_until(rx).await.unwrap();

        assert_eq!(mock.job_create_count(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_runs_passes_until_shutdown() {
        let mock = MockClusterClient::new();
        mock.add_task_seed(create_test_task_seed("demo", TEST_NAMESPACE));
        let controller = Controller::with_client(Box::new(mock.clone()), create_test_config());

        let (tx, rx) = watch::channel(false);
        let handle = tokio::spawn(controller.run_until(rx));

        // Test config polls every 50ms; the paused clock advances on its own.
        tokio::time::sleep(Duration::from_millis(180)).await;
        tx.send(true).unwrap();
        handle.await.unwrap().unwrap();

        assert_eq!(mock.job_create_count(), 1);
        assert!(mock.status_patches().len() >= 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_list_failure_keeps_loop_alive() {
        let mock = MockClusterClient::new();
        mock.fail_list_with("apiserver unavailable");
        let controller = Controller::with_client(Box::new(mock.clone()), create_test_config());

        let (tx, rx) = watch::channel(false);
        let handle = tokio::spawn(controller.run_until(rx));

        tokio::time::sleep(Duration::from_millis(120)).await;
        assert!(!handle.is_finished());
        tx.send(true).unwrap();
        assert!(handle.await.unwrap().is_ok());
    }
}
