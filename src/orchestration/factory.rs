//! Runtime factory for creating the configured container runtime

use crate::config::Config;
use crate::orchestration::podman::PodmanRuntime;
use crate::orchestration::runtime::ContainerRuntime;
use std::sync::Arc;

/// Create the container runtime named by `runtime.binary`
pub fn create_runtime(config: &Config) -> Arc<dyn ContainerRuntime> {
    Arc::new(PodmanRuntime::new(config.runtime.binary.clone()))
}
