//! Accumulated build state

use crate::orchestration::{ImageConfig, ImageRef};
use serde::Serialize;

/// Mutable state of one build run
///
/// Config fields are last-write-wins in script order. `image` is the most
/// recently committed (or cached) image and is the base for the next step.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BuildState {
    pub config: ImageConfig,
    pub image: Option<ImageRef>,
    /// Directory `run` steps execute in while inside an `inside` block
    pub inside: Option<String>,
}

impl BuildState {
    /// Working directory for in-container commands
    pub fn run_workdir(&self) -> &str {
        self.inside.as_deref().unwrap_or(&self.config.workdir)
    }

    /// Resolve `path` against the image working directory
    pub fn resolve_workdir(&self, path: &str) -> String {
        join_dir(&self.config.workdir, path)
    }

    /// Resolve `path` against the directory `run` steps currently use
    pub fn resolve_run_dir(&self, path: &str) -> String {
        join_dir(self.run_workdir(), path)
    }

    /// Snapshot of the terminal artifact
    pub fn output(&self) -> BuildOutput {
        BuildOutput {
            image: self.image.clone(),
            config: self.config.clone(),
        }
    }
}

fn join_dir(base: &str, path: &str) -> String {
    if path.starts_with('/') {
        path.to_string()
    } else {
        format!("{}/{}", base.trim_end_matches('/'), path)
    }
}

/// The produced artifact: terminal image plus its configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BuildOutput {
    pub image: Option<ImageRef>,
    pub config: ImageConfig,
}

impl BuildOutput {
    /// Final committed image id, empty before any successful commit
    pub fn image_id(&self) -> &str {
        self.image.as_ref().map(ImageRef::as_str).unwrap_or("")
    }
}
