//! Container runtime abstraction
//!
//! Provides a trait for the backend operations a build needs, implemented
//! by the Podman/Docker CLI runtime and by an in-memory runtime in tests.

use crate::error::{BoxerError, BoxerResult};
use crate::orchestration::types::{ContainerSpec, ImageConfig, ImageRef};
use async_trait::async_trait;
use std::path::Path;

/// Abstract container runtime interface
///
/// Any method may fail with a backend error; callers treat those as fatal.
#[async_trait]
pub trait ContainerRuntime: Send + Sync {
    /// Check if the runtime is available on this system
    async fn is_available(&self) -> BoxerResult<bool>;

    /// Ensure the runtime is ready to accept commands
    async fn ensure_ready(&self) -> BoxerResult<()>;

    /// Resolve an image name to its id, pulling it if missing locally
    async fn resolve_image(&self, name: &str) -> BoxerResult<ImageRef>;

    /// Check if an image exists locally
    async fn image_exists(&self, image: &ImageRef) -> BoxerResult<bool>;

    /// Create (but do not start) the container `spec.name` and return its id
    async fn create(&self, spec: &ContainerSpec) -> BoxerResult<String>;

    /// Start a created container, stream its output, and wait for it to exit
    async fn start_and_wait(
        &self,
        container_id: &str,
        on_output: &(dyn Fn(String) + Send + Sync),
    ) -> BoxerResult<i32>;

    /// Copy a host path into a container
    async fn copy_into(&self, container_id: &str, src: &Path, dest: &str) -> BoxerResult<()>;

    /// Commit a container's filesystem with the given config
    async fn commit(&self, container_id: &str, config: &ImageConfig) -> BoxerResult<ImageRef>;

    /// Whether [`commit_config`](Self::commit_config) is supported
    ///
    /// Backends that return false get config-only images by committing an
    /// unstarted container instead.
    fn commits_config_directly(&self) -> bool {
        false
    }

    /// Produce a new image from `base` that differs only in config
    async fn commit_config(&self, base: &ImageRef, _config: &ImageConfig) -> BoxerResult<ImageRef> {
        Err(BoxerError::Commit {
            container: base.to_string(),
            reason: format!("{} cannot commit config without a container", self.runtime_name()),
        })
    }

    /// Add a name to an image
    async fn tag(&self, image: &ImageRef, name: &str) -> BoxerResult<()>;

    /// Remove a container, running or not
    async fn remove(&self, container_id: &str) -> BoxerResult<()>;

    /// Get the human-readable runtime name for display
    fn runtime_name(&self) -> &'static str;
}
