//! TaskSeed Kubernetes CRD Definitions
//!
//! This crate provides the `TaskSeed` custom resource consumed by the
//! task seed controller. A `TaskSeed` describes the desired synthetic-data
//! seeding run for a MongoDB collection; the controller realises it as
//! batch Jobs and reports progress on the status subresource.

pub mod task_seed;

pub use task_seed::*;

/// API group shared by every resource in this crate.
pub const API_GROUP: &str = "tasks.huma.io";

/// API version of the `TaskSeed` resource.
pub const API_VERSION: &str = "v1alpha1";
