//! Shared container and image types
//!
//! Contains data structures passed across the runtime boundary.
//! The actual execution logic is in the runtime implementations.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use uuid::Uuid;

/// Opaque identifier of a committed image, as returned by the runtime
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ImageRef(String);

impl ImageRef {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// First 12 characters of the id, skipping any `sha256:` prefix
    pub fn short(&self) -> &str {
        let id = self.0.strip_prefix("sha256:").unwrap_or(&self.0);
        &id[..12.min(id.len())]
    }
}

impl fmt::Display for ImageRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Image configuration carried into every commit
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImageConfig {
    pub user: String,
    pub workdir: String,
    pub cmd: Vec<String>,
    pub entrypoint: Vec<String>,
    pub env: BTreeMap<String, String>,
    pub exposed_ports: BTreeSet<String>,
    pub volumes: BTreeSet<String>,
    pub labels: BTreeMap<String, String>,
}

impl Default for ImageConfig {
    fn default() -> Self {
        Self {
            user: "root".to_string(),
            workdir: "/".to_string(),
            cmd: vec!["/bin/sh".to_string()],
            entrypoint: vec!["/bin/sh".to_string(), "-c".to_string()],
            env: BTreeMap::new(),
            exposed_ports: BTreeSet::new(),
            volumes: BTreeSet::new(),
            labels: BTreeMap::new(),
        }
    }
}

impl ImageConfig {
    /// Render the configuration as Dockerfile-style `--change` instructions
    pub fn to_changes(&self) -> Vec<String> {
        let mut changes = vec![
            format!("USER {}", self.user),
            format!("WORKDIR {}", self.workdir),
            format!("ENTRYPOINT {}", json_array(&self.entrypoint)),
            format!("CMD {}", json_array(&self.cmd)),
        ];

        for (k, v) in &self.env {
            changes.push(format!("ENV {}={}", k, json_string(v)));
        }
        for port in &self.exposed_ports {
            changes.push(format!("EXPOSE {}", port));
        }
        if !self.volumes.is_empty() {
            let volumes: Vec<String> = self.volumes.iter().cloned().collect();
            changes.push(format!("VOLUME {}", json_array(&volumes)));
        }
        for (k, v) in &self.labels {
            changes.push(format!("LABEL {}={}", json_string(k), json_string(v)));
        }

        changes
    }

    /// Process argv of a container started from this config
    pub fn process_argv(&self) -> Vec<String> {
        self.entrypoint.iter().chain(&self.cmd).cloned().collect()
    }
}

fn json_array(items: &[String]) -> String {
    serde_json::to_string(items).unwrap_or_else(|_| "[]".to_string())
}

fn json_string(s: &str) -> String {
    serde_json::to_string(s).unwrap_or_else(|_| format!("\"{}\"", s))
}

/// Everything needed to create an ephemeral step container
#[derive(Debug, Clone)]
pub struct ContainerSpec {
    /// Container name, known before the runtime is asked to create it
    pub name: String,
    /// Image the container is created from
    pub image: ImageRef,
    /// User the process runs as
    pub user: String,
    /// Working directory inside the container
    pub workdir: String,
    /// Environment variables
    pub env: BTreeMap<String, String>,
    /// Process argv; the first element becomes the entrypoint
    pub argv: Vec<String>,
}

impl ContainerSpec {
    /// Spec for running `argv` on top of `image` with the given config
    pub fn new(image: ImageRef, config: &ImageConfig, argv: Vec<String>) -> Self {
        Self {
            name: format!("boxer-step-{}", Uuid::new_v4()),
            image,
            user: config.user.clone(),
            workdir: config.workdir.clone(),
            env: config.env.clone(),
            argv,
        }
    }

    /// Human-readable command line, used in error messages
    pub fn command_line(&self) -> String {
        self.argv.join(" ")
    }
}
