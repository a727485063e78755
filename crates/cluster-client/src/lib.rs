//! Cluster API Client
//!
//! The narrow slice of the Kubernetes API the task seed controller needs:
//! listing `TaskSeed`s, managing seed `Job`s and maintenance `CronJob`s, and
//! merge-patching `TaskSeed` status.
//!
//! # Example
//!
//! ```no_run
//! use cluster_client::{ClusterClientTrait, KubeClusterClient};
//! use std::time::Duration;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let client = kube::Client::try_default().await?;
//! let cluster = KubeClusterClient::new(client, Duration::from_secs(10));
//!
//! for seed in cluster.list_task_seeds("default").await? {
//!     println!("{:?}", seed.metadata.name);
//! }
//! # Ok(())
//! # }
//! ```
//!
//! # Features
//!
//! - **Bounded calls**: every request is wrapped in a per-operation timeout
//! - **Tolerant listing**: one malformed `TaskSeed` never hides the others
//! - **Mocking**: `MockClusterClient` (feature `test-util`) for unit tests

pub mod client;
pub mod error;
#[path = "trait.rs"]
pub mod cluster_trait;
#[cfg(feature = "test-util")]
pub mod mock;

pub use client::KubeClusterClient;
pub use cluster_trait::ClusterClientTrait;
pub use error::ClusterError;
#[cfg(feature = "test-util")]
pub use mock::MockClusterClient;
