//! In-memory runtime for exercising the build core without a backend

use crate::error::{BoxerError, BoxerResult};
use crate::orchestration::runtime::ContainerRuntime;
use crate::orchestration::types::{ContainerSpec, ImageConfig, ImageRef};
use async_trait::async_trait;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

#[derive(Default)]
struct MockState {
    next_id: u64,
    images: HashMap<String, ImageConfig>,
    containers: HashMap<String, ContainerSpec>,
    tags: Vec<(ImageRef, String)>,
    copies: Vec<(String, PathBuf, String)>,
    workdirs: Vec<String>,
    creates: usize,
    commits: usize,
    config_commits: usize,
    removals: usize,
    exit_codes: Vec<(String, i32)>,
    outputs: Vec<(String, String)>,
    fail_commit: bool,
    hang: bool,
    hang_create: bool,
    hang_commit: bool,
    config_via_container: bool,
}

#[derive(Default)]
pub(crate) struct MockRuntime {
    state: Mutex<MockState>,
}

impl MockRuntime {
    pub fn new() -> Self {
        Self::default()
    }

    fn with_state<T>(&self, f: impl FnOnce(&mut MockState) -> T) -> T {
        let mut state = self.state.lock().unwrap();
        f(&mut state)
    }

    /// Commands whose command line contains `needle` exit with `code`
    pub fn exit_with(&self, needle: &str, code: i32) {
        self.with_state(|s| s.exit_codes.push((needle.to_string(), code)));
    }

    /// Commands whose command line contains `needle` print `output`
    pub fn output_for(&self, needle: &str, output: &str) {
        self.with_state(|s| s.outputs.push((needle.to_string(), output.to_string())));
    }

    pub fn fail_commits(&self, fail: bool) {
        self.with_state(|s| s.fail_commit = fail);
    }

    /// Started containers never exit
    pub fn hang(&self, hang: bool) {
        self.with_state(|s| s.hang = hang);
    }

    /// `create` registers the container but never returns
    pub fn hang_creates(&self, hang: bool) {
        self.with_state(|s| s.hang_create = hang);
    }

    /// Commits never return
    pub fn hang_commits(&self, hang: bool) {
        self.with_state(|s| s.hang_commit = hang);
    }

    /// Behave like a CLI backend that needs a container for config commits
    pub fn config_via_container(&self, enabled: bool) {
        self.with_state(|s| s.config_via_container = enabled);
    }

    pub fn forget_image(&self, image: &ImageRef) {
        self.with_state(|s| s.images.remove(image.as_str()));
    }

    pub fn creates(&self) -> usize {
        self.with_state(|s| s.creates)
    }

    pub fn commits(&self) -> usize {
        self.with_state(|s| s.commits)
    }

    pub fn config_commits(&self) -> usize {
        self.with_state(|s| s.config_commits)
    }

    pub fn removals(&self) -> usize {
        self.with_state(|s| s.removals)
    }

    pub fn live_containers(&self) -> usize {
        self.with_state(|s| s.containers.len())
    }

    pub fn tags(&self) -> Vec<(ImageRef, String)> {
        self.with_state(|s| s.tags.clone())
    }

    pub fn copies(&self) -> Vec<(String, PathBuf, String)> {
        self.with_state(|s| s.copies.clone())
    }

    /// Working directory of every container created so far
    pub fn workdirs(&self) -> Vec<String> {
        self.with_state(|s| s.workdirs.clone())
    }

    pub fn image_config(&self, image: &ImageRef) -> Option<ImageConfig> {
        self.with_state(|s| s.images.get(image.as_str()).cloned())
    }

    fn new_image(state: &mut MockState, config: ImageConfig) -> ImageRef {
        state.next_id += 1;
        let id = format!("sha256:{:064x}", state.next_id);
        state.images.insert(id.clone(), config);
        ImageRef::new(id)
    }
}

#[async_trait]
impl ContainerRuntime for MockRuntime {
    async fn is_available(&self) -> BoxerResult<bool> {
        Ok(true)
    }

    async fn ensure_ready(&self) -> BoxerResult<()> {
        Ok(())
    }

    async fn resolve_image(&self, name: &str) -> BoxerResult<ImageRef> {
        if name.starts_with("missing") {
            return Err(BoxerError::ImagePull {
                image: name.to_string(),
                reason: "manifest unknown".to_string(),
            });
        }
        let id = format!("sha256:base-{}", name);
        self.with_state(|s| {
            s.images.entry(id.clone()).or_default();
        });
        Ok(ImageRef::new(id))
    }

    async fn image_exists(&self, image: &ImageRef) -> BoxerResult<bool> {
        Ok(self.with_state(|s| s.images.contains_key(image.as_str())))
    }

    async fn create(&self, spec: &ContainerSpec) -> BoxerResult<String> {
        let hang = self.with_state(|s| {
            if !s.images.contains_key(spec.image.as_str()) {
                return Err(BoxerError::ContainerStart(format!(
                    "image not known: {}",
                    spec.image
                )));
            }
            s.creates += 1;
            s.workdirs.push(spec.workdir.clone());
            s.containers.insert(spec.name.clone(), spec.clone());
            Ok(s.hang_create)
        })?;

        if hang {
            std::future::pending::<()>().await;
        }
        Ok(spec.name.clone())
    }

    async fn start_and_wait(
        &self,
        container_id: &str,
        on_output: &(dyn Fn(String) + Send + Sync),
    ) -> BoxerResult<i32> {
        let (hang, code, output) = self.with_state(|s| {
            let line = s
                .containers
                .get(container_id)
                .map(ContainerSpec::command_line)
                .unwrap_or_default();
            let code = s
                .exit_codes
                .iter()
                .find(|(needle, _)| line.contains(needle.as_str()))
                .map(|(_, code)| *code)
                .unwrap_or(0);
            let output = s
                .outputs
                .iter()
                .find(|(needle, _)| line.contains(needle.as_str()))
                .map(|(_, out)| out.clone());
            (s.hang, code, output)
        });

        if hang {
            std::future::pending::<()>().await;
        }

        if let Some(output) = output {
            for line in output.lines() {
                on_output(line.to_string());
            }
        }
        Ok(code)
    }

    async fn copy_into(&self, container_id: &str, src: &Path, dest: &str) -> BoxerResult<()> {
        self.with_state(|s| {
            s.copies
                .push((container_id.to_string(), src.to_path_buf(), dest.to_string()))
        });
        Ok(())
    }

    async fn commit(&self, container_id: &str, config: &ImageConfig) -> BoxerResult<ImageRef> {
        if self.with_state(|s| s.hang_commit) {
            std::future::pending::<()>().await;
        }
        self.with_state(|s| {
            if s.fail_commit || !s.containers.contains_key(container_id) {
                return Err(BoxerError::Commit {
                    container: container_id.to_string(),
                    reason: "storage driver error".to_string(),
                });
            }
            s.commits += 1;
            Ok(Self::new_image(s, config.clone()))
        })
    }

    fn commits_config_directly(&self) -> bool {
        self.with_state(|s| !s.config_via_container)
    }

    async fn commit_config(
        &self,
        base: &ImageRef,
        config: &ImageConfig,
    ) -> BoxerResult<ImageRef> {
        if self.with_state(|s| s.hang_commit) {
            std::future::pending::<()>().await;
        }
        self.with_state(|s| {
            if s.fail_commit || !s.images.contains_key(base.as_str()) {
                return Err(BoxerError::Commit {
                    container: base.to_string(),
                    reason: "storage driver error".to_string(),
                });
            }
            s.config_commits += 1;
            Ok(Self::new_image(s, config.clone()))
        })
    }

    async fn tag(&self, image: &ImageRef, name: &str) -> BoxerResult<()> {
        self.with_state(|s| s.tags.push((image.clone(), name.to_string())));
        Ok(())
    }

    async fn remove(&self, container_id: &str) -> BoxerResult<()> {
        self.with_state(|s| {
            s.containers.remove(container_id);
            s.removals += 1;
        });
        Ok(())
    }

    fn runtime_name(&self) -> &'static str {
        "Mock"
    }
}
