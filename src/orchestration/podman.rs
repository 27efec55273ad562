//! Podman container runtime
//!
//! Implements the ContainerRuntime trait by driving the `podman` CLI.
//! Only subcommands that Docker shares are used, so `docker` works as
//! the binary too.

use crate::error::{BoxerError, BoxerResult};
use crate::orchestration::runtime::ContainerRuntime;
use crate::orchestration::types::{ContainerSpec, ImageConfig, ImageRef};
use async_trait::async_trait;
use std::path::Path;
use std::process::Stdio;
use tokio::process::Command;
use tracing::{debug, info};

/// Label attached to every ephemeral step container
pub const STEP_LABEL: &str = "io.boxer.step=true";

/// Container runtime driving a Podman-compatible CLI
pub struct PodmanRuntime {
    binary: String,
}

impl PodmanRuntime {
    /// Create a runtime for the given CLI binary
    pub fn new(binary: impl Into<String>) -> Self {
        Self {
            binary: binary.into(),
        }
    }

    /// Check if the binary is installed
    async fn installed(&self) -> bool {
        Command::new(&self.binary)
            .arg("--version")
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status()
            .await
            .map(|s| s.success())
            .unwrap_or(false)
    }

    /// Execute a runtime command and return the output
    async fn exec(&self, args: &[&str]) -> BoxerResult<std::process::Output> {
        debug!("Executing: {} {:?}", self.binary, args);

        Command::new(&self.binary)
            .args(args)
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .output()
            .await
            .map_err(|e| BoxerError::command_failed(format!("{} {:?}", self.binary, args), e))
    }

    /// Pull an image
    async fn pull(&self, image: &str) -> BoxerResult<()> {
        info!("Pulling image: {}", image);

        let output = self.exec(&["pull", image]).await?;

        if output.status.success() {
            Ok(())
        } else {
            let stderr = String::from_utf8_lossy(&output.stderr);
            Err(BoxerError::ImagePull {
                image: image.to_string(),
                reason: stderr.to_string(),
            })
        }
    }

    /// Look up the id of a local image
    async fn inspect_id(&self, image: &str) -> BoxerResult<Option<ImageRef>> {
        let output = self
            .exec(&["image", "inspect", "--format", "{{.Id}}", image])
            .await?;

        if !output.status.success() {
            return Ok(None);
        }

        let id = String::from_utf8_lossy(&output.stdout).trim().to_string();
        Ok((!id.is_empty()).then(|| ImageRef::new(id)))
    }
}

/// Build the argument list for `create`
///
/// The first argv element is passed as the entrypoint so the image's own
/// entrypoint never wraps the step command.
pub(crate) fn create_args(spec: &ContainerSpec) -> Vec<String> {
    let mut args = vec![
        "create".to_string(),
        "--name".to_string(),
        spec.name.clone(),
        "--label".to_string(),
        STEP_LABEL.to_string(),
        "--user".to_string(),
        spec.user.clone(),
        "--workdir".to_string(),
        spec.workdir.clone(),
    ];

    for (k, v) in &spec.env {
        args.push("-e".to_string());
        args.push(format!("{}={}", k, v));
    }

    if let Some((entrypoint, rest)) = spec.argv.split_first() {
        args.push("--entrypoint".to_string());
        args.push(entrypoint.clone());
        args.push(spec.image.to_string());
        args.extend(rest.iter().cloned());
    } else {
        args.push(spec.image.to_string());
    }

    args
}

/// Build the argument list for `commit`
pub(crate) fn commit_args(container_id: &str, config: &ImageConfig) -> Vec<String> {
    let mut args = vec!["commit".to_string()];
    for change in config.to_changes() {
        args.push("--change".to_string());
        args.push(change);
    }
    args.push(container_id.to_string());
    args
}

/// Commit prints progress before the id; the id is the last line
fn parse_commit_output(stdout: &str) -> Option<ImageRef> {
    stdout
        .lines()
        .map(str::trim)
        .rfind(|line| !line.is_empty())
        .map(ImageRef::new)
}

#[async_trait]
impl ContainerRuntime for PodmanRuntime {
    async fn is_available(&self) -> BoxerResult<bool> {
        Ok(self.installed().await)
    }

    async fn ensure_ready(&self) -> BoxerResult<()> {
        if !self.is_available().await? {
            return Err(BoxerError::RuntimeNotFound(self.binary.clone()));
        }

        let output = self.exec(&["info"]).await?;
        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(BoxerError::command_exec(
                format!("{} info", self.binary),
                stderr,
            ));
        }

        Ok(())
    }

    async fn resolve_image(&self, name: &str) -> BoxerResult<ImageRef> {
        if let Some(id) = self.inspect_id(name).await? {
            return Ok(id);
        }

        self.pull(name).await?;

        self.inspect_id(name).await?.ok_or_else(|| BoxerError::ImagePull {
            image: name.to_string(),
            reason: "image missing after pull".to_string(),
        })
    }

    async fn image_exists(&self, image: &ImageRef) -> BoxerResult<bool> {
        Ok(self.inspect_id(image.as_str()).await?.is_some())
    }

    async fn create(&self, spec: &ContainerSpec) -> BoxerResult<String> {
        let args = create_args(spec);

        debug!("Creating container: {} {:?}", self.binary, args);

        let args_refs: Vec<&str> = args.iter().map(String::as_str).collect();
        let output = self.exec(&args_refs).await?;

        if output.status.success() {
            let container_id = String::from_utf8_lossy(&output.stdout).trim().to_string();
            debug!(
                "Container created: {}",
                &container_id[..12.min(container_id.len())]
            );
            Ok(container_id)
        } else {
            let stderr = String::from_utf8_lossy(&output.stderr);
            Err(BoxerError::ContainerStart(stderr.to_string()))
        }
    }

    async fn start_and_wait(
        &self,
        container_id: &str,
        on_output: &(dyn Fn(String) + Send + Sync),
    ) -> BoxerResult<i32> {
        debug!("Starting container attached: {}", container_id);

        let mut child = Command::new(&self.binary)
            .args(["start", "--attach", container_id])
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| BoxerError::command_failed(format!("{} start", self.binary), e))?;

        super::stream_child_output(&mut child, on_output).await;

        let status = child
            .wait()
            .await
            .map_err(|e| BoxerError::command_failed(format!("{} start", self.binary), e))?;

        Ok(status.code().unwrap_or(-1))
    }

    async fn copy_into(&self, container_id: &str, src: &Path, dest: &str) -> BoxerResult<()> {
        let src = src.display().to_string();
        let target = format!("{}:{}", container_id, dest);
        let output = self.exec(&["cp", &src, &target]).await?;

        if output.status.success() {
            Ok(())
        } else {
            let stderr = String::from_utf8_lossy(&output.stderr);
            Err(BoxerError::command_exec(format!("{} cp", self.binary), stderr))
        }
    }

    async fn commit(&self, container_id: &str, config: &ImageConfig) -> BoxerResult<ImageRef> {
        let args = commit_args(container_id, config);
        let args_refs: Vec<&str> = args.iter().map(String::as_str).collect();
        let output = self.exec(&args_refs).await?;

        if !output.status.success() {
            return Err(BoxerError::Commit {
                container: container_id.to_string(),
                reason: String::from_utf8_lossy(&output.stderr).to_string(),
            });
        }

        parse_commit_output(&String::from_utf8_lossy(&output.stdout)).ok_or_else(|| {
            BoxerError::Commit {
                container: container_id.to_string(),
                reason: "no image id in commit output".to_string(),
            }
        })
    }

    async fn tag(&self, image: &ImageRef, name: &str) -> BoxerResult<()> {
        let output = self.exec(&["tag", image.as_str(), name]).await?;

        if output.status.success() {
            info!("Tagged {} as {}", image.short(), name);
            Ok(())
        } else {
            let stderr = String::from_utf8_lossy(&output.stderr);
            Err(BoxerError::command_exec(format!("{} tag", self.binary), stderr))
        }
    }

    async fn remove(&self, container_id: &str) -> BoxerResult<()> {
        debug!("Removing container: {}", container_id);

        let output = self.exec(&["rm", "-f", container_id]).await?;

        if output.status.success() {
            Ok(())
        } else {
            // Ignore error if container doesn't exist
            let stderr = String::from_utf8_lossy(&output.stderr);
            if stderr.to_lowercase().contains("no such container") {
                Ok(())
            } else {
                Err(BoxerError::command_exec(format!("{} rm", self.binary), stderr))
            }
        }
    }

    fn runtime_name(&self) -> &'static str {
        if self.binary.ends_with("docker") {
            "Docker"
        } else {
            "Podman"
        }
    }
}
