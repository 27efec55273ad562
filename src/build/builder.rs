//! Verb dispatcher
//!
//! Wraps every verb in the same cache-consult, execute, record sequence:
//!
//! 1. Validate arguments (no backend or cache work on mismatch)
//! 2. Derive the cache key from the current image, verb, and arguments
//! 3. Hit: advance the state to the cached image without running the verb
//! 4. Miss: report the step, execute it, insert the result, then commit the
//!    new state
//!
//! The state is only replaced once a step has fully succeeded, so a failed
//! step leaves the build exactly as it was before.

use crate::build::lifecycle::{AbortHandle, ContainerLifecycle};
use crate::build::observer::{StepObserver, StepOutcome, StepRecord, TracingObserver};
use crate::build::state::{BuildOutput, BuildState};
use crate::build::verbs::{self, VerbDef};
use crate::cache::{CacheKey, CacheStore};
use crate::error::{BoxerError, BoxerResult};
use crate::orchestration::{ContainerRuntime, ImageRef};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

/// Per-build settings
pub struct BuildOptions {
    /// Deadline for each in-container command
    pub step_timeout: Option<Duration>,
    /// Directory host paths in the script are relative to
    pub context_dir: PathBuf,
    /// Sink for step records
    pub observer: Arc<dyn StepObserver>,
}

impl Default for BuildOptions {
    fn default() -> Self {
        Self {
            step_timeout: None,
            context_dir: PathBuf::from("."),
            observer: Arc::new(TracingObserver),
        }
    }
}

/// One build chain: its state, cache, and backend
pub struct Builder {
    lifecycle: ContainerLifecycle,
    cache: Arc<CacheStore>,
    state: BuildState,
    context_dir: PathBuf,
    observer: Arc<dyn StepObserver>,
    last_key: Option<CacheKey>,
}

impl Builder {
    pub fn new(runtime: Arc<dyn ContainerRuntime>, cache: Arc<CacheStore>, options: BuildOptions) -> Self {
        Self {
            lifecycle: ContainerLifecycle::new(runtime, options.step_timeout),
            cache,
            state: BuildState::default(),
            context_dir: options.context_dir,
            observer: options.observer,
            last_key: None,
        }
    }

    pub fn state(&self) -> &BuildState {
        &self.state
    }

    /// The produced artifact so far
    pub fn output(&self) -> BuildOutput {
        self.state.output()
    }

    pub fn image(&self) -> Option<&ImageRef> {
        self.state.image.as_ref()
    }

    pub fn lifecycle(&self) -> &ContainerLifecycle {
        &self.lifecycle
    }

    pub fn abort_handle(&self) -> AbortHandle {
        self.lifecycle.abort_handle()
    }

    pub fn context_dir(&self) -> &Path {
        &self.context_dir
    }

    /// Key of the most recently dispatched step
    pub fn last_key(&self) -> Option<&CacheKey> {
        self.last_key.as_ref()
    }

    /// Set the directory `run` steps execute in, returning the previous one
    ///
    /// Relative directories nest inside the current one.
    pub fn set_inside(&mut self, dir: Option<String>) -> Option<String> {
        let dir = dir.map(|d| self.state.resolve_run_dir(&d));
        std::mem::replace(&mut self.state.inside, dir)
    }

    /// Dispatch a verb by name
    pub async fn dispatch(&mut self, name: &str, args: &[String]) -> BoxerResult<StepOutcome> {
        let verb = verbs::lookup(name).ok_or_else(|| BoxerError::UnknownVerb(name.to_string()))?;
        verb.args.validate(name, args)?;

        self.step(verb, args)
            .await
            .map_err(|e| e.in_step(name, args))
    }

    async fn step(&mut self, verb: &'static VerbDef, args: &[String]) -> BoxerResult<StepOutcome> {
        if verb.kind.requires_image() && self.state.image.is_none() {
            return Err(BoxerError::handler(verb.name, "no base image; call from() first"));
        }

        let extra = verb.kind.key_material(&self.state, args, &self.context_dir)?;
        let key = CacheKey::derive(self.state.image.as_ref(), verb.name, args, &extra);
        self.last_key = Some(key.clone());

        if let Some(image) = self.cache.lookup(&key).await? {
            if self.lifecycle.image_exists(&image).await? {
                debug!("Cache hit {} -> {}", key, image.short());
                self.advance(verb, args, image);
                self.report(verb, args, StepOutcome::Cached).await;
                return Ok(StepOutcome::Cached);
            }

            warn!(
                "Cached image {} for `{}` no longer exists, rebuilding",
                image.short(),
                verb.name
            );
            self.cache.evict(&key).await?;
        }

        self.report(verb, args, StepOutcome::Executed).await;

        let mut next = self.state.clone();
        verb.kind.apply(&mut next, args);

        let image = verb
            .kind
            .execute(&self.lifecycle, &self.state, &next, args, &self.context_dir)
            .await?;
        self.cache.insert(&key, &image).await?;

        next.image = Some(image);
        self.state = next;
        Ok(StepOutcome::Executed)
    }

    fn advance(&mut self, verb: &VerbDef, args: &[String], image: ImageRef) {
        verb.kind.apply(&mut self.state, args);
        self.state.image = Some(image);
    }

    async fn report(&self, verb: &VerbDef, args: &[String], outcome: StepOutcome) {
        let record = StepRecord {
            verb: verb.name.to_string(),
            args: args.to_vec(),
            outcome,
        };
        self.observer.record(&record).await;
    }
}
