//! # CRD Generator
//!
//! Generates the `TaskSeed` CustomResourceDefinition YAML from the Rust
//! type definitions.
//!
//! ```bash
//! cargo run -p crds --bin crdgen > deploy/crd/taskseed.yaml
//! cargo run -p crds --bin crdgen | kubectl apply -f -
//! ```

use anyhow::{Context, Result};
use crds::TaskSeed;
use kube::core::CustomResourceExt;

fn main() -> Result<()> {
    let crd = TaskSeed::crd();
    let yaml = serde_yaml::to_string(&crd).context("Failed to serialize TaskSeed CRD")?;
    print!("{yaml}");
    Ok(())
}
