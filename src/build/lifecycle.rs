//! Ephemeral container lifecycle
//!
//! Turns a step's action into runtime calls. Every container created here
//! is removed before the step returns, whatever the outcome, and is tracked
//! until then so an abort can release it.

use crate::build::state::BuildState;
use crate::error::{BoxerError, BoxerResult};
use crate::orchestration::{step_error_output, ContainerRuntime, ContainerSpec, ImageConfig, ImageRef};
use std::collections::HashSet;
use std::future::Future;
use std::path::Path;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tracing::{debug, info, warn};

type ActiveSet = Arc<Mutex<HashSet<String>>>;

/// Creates, runs, commits, and removes step containers
pub struct ContainerLifecycle {
    runtime: Arc<dyn ContainerRuntime>,
    step_timeout: Option<Duration>,
    active: ActiveSet,
}

impl ContainerLifecycle {
    pub fn new(runtime: Arc<dyn ContainerRuntime>, step_timeout: Option<Duration>) -> Self {
        Self {
            runtime,
            step_timeout,
            active: Arc::new(Mutex::new(HashSet::new())),
        }
    }

    /// Handle that can release in-flight containers from outside the build
    pub fn abort_handle(&self) -> AbortHandle {
        AbortHandle {
            runtime: self.runtime.clone(),
            active: self.active.clone(),
        }
    }

    /// Number of containers currently owned by a step
    pub fn active_count(&self) -> usize {
        lock(&self.active).len()
    }

    pub async fn resolve_base(&self, name: &str) -> BoxerResult<ImageRef> {
        self.runtime.resolve_image(name).await
    }

    pub async fn image_exists(&self, image: &ImageRef) -> BoxerResult<bool> {
        self.runtime.image_exists(image).await
    }

    /// Config-only step
    ///
    /// Nothing is executed. Backends that cannot commit config directly get
    /// an unstarted container, owned and released like any step container.
    pub async fn commit_config(&self, base: &ImageRef, config: &ImageConfig) -> BoxerResult<ImageRef> {
        if self.runtime.commits_config_directly() {
            return self
                .bounded(
                    || format!("config commit on {}", base.short()),
                    self.runtime.commit_config(base, config),
                )
                .await;
        }

        let spec = ContainerSpec::new(base.clone(), config, config.process_argv());
        self.with_container(&spec, |id| async move { self.commit(&id, config).await })
            .await
    }

    pub async fn tag(&self, image: &ImageRef, name: &str) -> BoxerResult<()> {
        self.runtime.tag(image, name).await
    }

    /// Run `argv` on top of `base` and commit the result
    pub async fn run(
        &self,
        base: &ImageRef,
        state: &BuildState,
        argv: Vec<String>,
    ) -> BoxerResult<ImageRef> {
        let spec = &run_spec(base, state, argv);
        self.with_container(spec, |id| async move {
            self.execute(&id, spec).await?;
            self.commit(&id, &state.config).await
        })
        .await
    }

    /// Copy a host path into `base` at `dest` and commit the result
    pub async fn copy(
        &self,
        base: &ImageRef,
        config: &ImageConfig,
        src: &Path,
        dest: &str,
    ) -> BoxerResult<ImageRef> {
        let spec = ContainerSpec::new(base.clone(), config, config.process_argv());

        self.with_container(&spec, |id| async move {
            self.bounded(
                || format!("copying {} to {}", src.display(), dest),
                self.runtime.copy_into(&id, src, dest),
            )
            .await?;
            self.commit(&id, config).await
        })
        .await
    }

    /// Run `argv` in a throwaway container and return its output
    ///
    /// Nothing is committed.
    pub async fn capture(
        &self,
        base: &ImageRef,
        state: &BuildState,
        argv: Vec<String>,
    ) -> BoxerResult<String> {
        let spec = &run_spec(base, state, argv);
        self.with_container(spec, |id| async move {
            let lines = self.execute(&id, spec).await?;
            Ok(lines.join("\n"))
        })
        .await
    }

    /// Start a created container and wait for a zero exit status
    async fn execute(&self, container_id: &str, spec: &ContainerSpec) -> BoxerResult<Vec<String>> {
        let lines: Arc<Mutex<Vec<String>>> = Arc::default();
        let sink = {
            let lines = lines.clone();
            move |line: String| {
                info!("| {}", line);
                lock(&lines).push(line);
            }
        };

        let code = self
            .bounded(
                || format!("`{}`", spec.command_line()),
                self.runtime.start_and_wait(container_id, &sink),
            )
            .await?;

        let output = std::mem::take(&mut *lock(&lines));
        if code != 0 {
            return Err(BoxerError::NonZeroExit {
                command: spec.command_line(),
                code,
                output: step_error_output(&output),
            });
        }

        Ok(output)
    }

    async fn commit(&self, container_id: &str, config: &ImageConfig) -> BoxerResult<ImageRef> {
        self.bounded(
            || format!("commit of {}", container_id),
            self.runtime.commit(container_id, config),
        )
        .await
    }

    /// Await a backend call under the step deadline
    async fn bounded<T>(
        &self,
        operation: impl FnOnce() -> String,
        wait: impl Future<Output = BoxerResult<T>>,
    ) -> BoxerResult<T> {
        match self.step_timeout {
            Some(limit) => tokio::time::timeout(limit, wait)
                .await
                .map_err(|_| BoxerError::Timeout {
                    operation: operation(),
                    limit,
                })?,
            None => wait.await,
        }
    }

    /// Create a container, hand it to `body`, and always remove it
    ///
    /// The container is tracked by name from before `create` is issued, so
    /// an abort or a timed out create still releases it.
    async fn with_container<T, F, Fut>(&self, spec: &ContainerSpec, body: F) -> BoxerResult<T>
    where
        F: FnOnce(String) -> Fut,
        Fut: Future<Output = BoxerResult<T>>,
    {
        let name = spec.name.clone();
        lock(&self.active).insert(name.clone());

        let created = self
            .bounded(
                || format!("creating a container from {}", spec.image.short()),
                self.runtime.create(spec),
            )
            .await;
        let result = match created {
            Ok(container_id) => {
                debug!("Step container {} created from {}", name, spec.image.short());
                body(container_id).await
            }
            Err(e) => Err(e),
        };

        let removed = self.runtime.remove(&name).await;
        if removed.is_ok() {
            lock(&self.active).remove(&name);
        }

        match (result, removed) {
            (Ok(value), Ok(())) => Ok(value),
            (Ok(_), Err(e)) => Err(e),
            (Err(e), Ok(())) => Err(e),
            (Err(e), Err(remove_err)) => {
                warn!("Failed to remove container {}: {}", name, remove_err);
                Err(e)
            }
        }
    }
}

fn run_spec(base: &ImageRef, state: &BuildState, argv: Vec<String>) -> ContainerSpec {
    ContainerSpec {
        workdir: state.run_workdir().to_string(),
        ..ContainerSpec::new(base.clone(), &state.config, argv)
    }
}

fn lock<T>(mutex: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Releases containers still owned by an interrupted build
#[derive(Clone)]
pub struct AbortHandle {
    runtime: Arc<dyn ContainerRuntime>,
    active: ActiveSet,
}

impl AbortHandle {
    /// Remove every tracked container, returning how many were released
    pub async fn release(&self) -> usize {
        let ids: Vec<String> = lock(&self.active).drain().collect();
        let mut released = 0;

        for id in ids {
            match self.runtime.remove(&id).await {
                Ok(()) => {
                    info!("Released container {}", id);
                    released += 1;
                }
                Err(e) => warn!("Failed to release container {}: {}", id, e),
            }
        }

        released
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use crate::orchestration::mock::MockRuntime;

    async fn setup(timeout: Option<Duration>) -> (Arc<MockRuntime>, ContainerLifecycle, ImageRef) {
        let runtime = Arc::new(MockRuntime::new());
        let lifecycle = ContainerLifecycle::new(runtime.clone(), timeout);
        let base = runtime.resolve_image("alpine").await.unwrap();
        (runtime, lifecycle, base)
    }

    fn sh(cmd: &str) -> Vec<String> {
        vec!["/bin/sh".to_string(), "-c".to_string(), cmd.to_string()]
    }

    #[tokio::test]
    async fn run_commits_and_removes() {
        let (runtime, lifecycle, base) = setup(None).await;

        let image = lifecycle
            .run(&base, &BuildState::default(), sh("echo hi"))
            .await
            .unwrap();

        assert_ne!(image, base);
        assert_eq!(runtime.creates(), 1);
        assert_eq!(runtime.commits(), 1);
        assert_eq!(runtime.live_containers(), 0);
        assert_eq!(lifecycle.active_count(), 0);
    }

    #[tokio::test]
    async fn non_zero_exit_is_handler_error_and_cleans_up() {
        let (runtime, lifecycle, base) = setup(None).await;
        runtime.exit_with("false", 3);
        runtime.output_for("false", "something broke");

        let err = lifecycle
            .run(&base, &BuildState::default(), sh("false"))
            .await
            .unwrap_err();

        assert_eq!(err.kind(), ErrorKind::Handler);
        assert!(matches!(err, BoxerError::NonZeroExit { code: 3, ref output, .. } if output == "something broke"));
        assert_eq!(runtime.commits(), 0);
        assert_eq!(runtime.live_containers(), 0);
    }

    #[tokio::test]
    async fn commit_failure_cleans_up() {
        let (runtime, lifecycle, base) = setup(None).await;
        runtime.fail_commits(true);

        let err = lifecycle
            .run(&base, &BuildState::default(), sh("true"))
            .await
            .unwrap_err();

        assert_eq!(err.kind(), ErrorKind::Backend);
        assert_eq!(runtime.live_containers(), 0);
        assert_eq!(lifecycle.active_count(), 0);
    }

    #[tokio::test]
    async fn timeout_releases_container() {
        let (runtime, lifecycle, base) = setup(Some(Duration::from_millis(20))).await;
        runtime.hang(true);

        let err = lifecycle
            .run(&base, &BuildState::default(), sh("sleep infinity"))
            .await
            .unwrap_err();

        assert_eq!(err.kind(), ErrorKind::Timeout);
        assert_eq!(runtime.live_containers(), 0);
    }

    #[tokio::test]
    async fn slow_commit_hits_deadline() {
        let (runtime, lifecycle, base) = setup(Some(Duration::from_millis(20))).await;
        runtime.hang_commits(true);

        let err = lifecycle
            .run(&base, &BuildState::default(), sh("true"))
            .await
            .unwrap_err();

        assert_eq!(err.kind(), ErrorKind::Timeout);
        assert!(err.to_string().contains("commit"));
        assert_eq!(runtime.live_containers(), 0);
        assert_eq!(lifecycle.active_count(), 0);
    }

    #[tokio::test]
    async fn slow_create_hits_deadline_and_is_released() {
        let (runtime, lifecycle, base) = setup(Some(Duration::from_millis(20))).await;
        runtime.hang_creates(true);

        let err = lifecycle
            .run(&base, &BuildState::default(), sh("true"))
            .await
            .unwrap_err();

        assert_eq!(err.kind(), ErrorKind::Timeout);
        assert_eq!(runtime.removals(), 1);
        assert_eq!(runtime.live_containers(), 0);
        assert_eq!(lifecycle.active_count(), 0);
    }

    #[tokio::test]
    async fn direct_config_commit_hits_deadline() {
        let (runtime, lifecycle, base) = setup(Some(Duration::from_millis(20))).await;
        runtime.hang_commits(true);

        let err = lifecycle
            .commit_config(&base, &ImageConfig::default())
            .await
            .unwrap_err();

        assert_eq!(err.kind(), ErrorKind::Timeout);
        assert_eq!(runtime.creates(), 0);
    }

    #[tokio::test]
    async fn config_commit_without_direct_support_uses_unstarted_container() {
        let (runtime, lifecycle, base) = setup(None).await;
        runtime.config_via_container(true);

        let config = ImageConfig {
            user: "app".to_string(),
            ..ImageConfig::default()
        };
        let image = lifecycle.commit_config(&base, &config).await.unwrap();

        assert_eq!(runtime.image_config(&image).unwrap().user, "app");
        assert_eq!(runtime.creates(), 1);
        assert_eq!(runtime.commits(), 1);
        assert_eq!(runtime.config_commits(), 0);
        assert_eq!(runtime.live_containers(), 0);
    }

    #[tokio::test]
    async fn abort_during_config_commit_releases_container() {
        let (runtime, lifecycle, base) = setup(None).await;
        runtime.config_via_container(true);
        runtime.hang_commits(true);
        let abort = lifecycle.abort_handle();

        let config = ImageConfig::default();
        let step = lifecycle.commit_config(&base, &config);
        let interrupted = tokio::time::timeout(Duration::from_millis(20), step).await;
        assert!(interrupted.is_err());
        assert_eq!(runtime.live_containers(), 1);

        assert_eq!(abort.release().await, 1);
        assert_eq!(runtime.live_containers(), 0);
        assert_eq!(lifecycle.active_count(), 0);
    }

    #[tokio::test]
    async fn run_uses_inside_dir() {
        let (runtime, lifecycle, base) = setup(None).await;
        runtime.output_for("pwd", "/work");

        let state = BuildState {
            inside: Some("/work".to_string()),
            ..BuildState::default()
        };
        let out = lifecycle.capture(&base, &state, sh("pwd")).await.unwrap();

        assert_eq!(out, "/work");
        assert_eq!(runtime.commits(), 0);
        assert_eq!(runtime.live_containers(), 0);
    }

    #[tokio::test]
    async fn copy_commits_copied_path() {
        let (runtime, lifecycle, base) = setup(None).await;

        lifecycle
            .copy(&base, &ImageConfig::default(), Path::new("/host/src"), "/app")
            .await
            .unwrap();

        let copies = runtime.copies();
        assert_eq!(copies.len(), 1);
        assert_eq!(copies[0].2, "/app");
        assert_eq!(runtime.live_containers(), 0);
    }

    #[tokio::test]
    async fn abort_handle_releases_interrupted_step() {
        let (runtime, lifecycle, base) = setup(None).await;
        runtime.hang(true);
        let abort = lifecycle.abort_handle();

        let state = BuildState::default();
        let step = lifecycle.run(&base, &state, sh("sleep infinity"));
        let interrupted = tokio::time::timeout(Duration::from_millis(20), step).await;
        assert!(interrupted.is_err());
        assert_eq!(runtime.live_containers(), 1);

        assert_eq!(abort.release().await, 1);
        assert_eq!(runtime.live_containers(), 0);
        assert_eq!(lifecycle.active_count(), 0);
    }
}
