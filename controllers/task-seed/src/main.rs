//! TaskSeed Controller
//!
//! Turns declarative `TaskSeed` resources into Kubernetes Jobs that seed a
//! MongoDB collection with synthetic tasks, plus an optional maintenance
//! CronJob.
//!
//! The controller polls the namespace on a fixed interval instead of
//! watching. Each spec is reduced to a content fingerprint and the seed Job
//! name is derived from it, so re-running a pass never launches a duplicate
//! run and a spec change always launches a new one.

mod config;
mod controller;
mod error;
mod hasher;
mod naming;
mod reconciler;
mod resolver;
mod status;
mod test_utils;
mod workload;

use crate::config::{ControllerConfig, LogFormat};
use crate::error::ControllerError;
use controller::Controller;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

fn init_tracing(format: LogFormat) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    match format {
        LogFormat::Text => tracing_subscriber::fmt().with_env_filter(filter).init(),
        LogFormat::Json => tracing_subscriber::fmt().json().with_env_filter(filter).init(),
    }
}

#[tokio::main]
async fn main() -> Result<(), ControllerError> {
    let config = match ControllerConfig::from_env() {
        Ok(config) => config,
        Err(e) => {
            init_tracing(LogFormat::Text);
            error!(error = %e, "Invalid controller configuration");
            std::process::exit(1);
        }
    };
    init_tracing(config.log_format);

    // kube's rustls transport needs a process-wide crypto provider.
    if rustls::crypto::ring::default_provider().install_default().is_err() {
        warn!("rustls crypto provider already installed");
    }

    info!("Starting TaskSeed Controller");
    info!(
        namespace = %config.namespace,
        poll_interval_ms = config.poll_interval.as_millis() as u64,
        request_timeout_ms = config.request_timeout.as_millis() as u64,
        job_history_limit = config.job_history_limit,
        image = %config.seed_job_image,
        pull_policy = %config.seed_job_pull_policy,
        "Configuration loaded"
    );

    let controller = Controller::new(config).await?;
    controller.run().await?;

    Ok(())
}
