//! Verb table
//!
//! Every verb is a static entry: a name, an argument spec checked before
//! anything else happens, and a kind that knows how to apply the verb to the
//! build state (on hit and miss alike) and how to execute it against the
//! backend (on miss only).

use crate::build::lifecycle::ContainerLifecycle;
use crate::build::state::BuildState;
use crate::cache::key::digest_path;
use crate::error::{BoxerError, BoxerResult};
use crate::orchestration::{ImageConfig, ImageRef};
use std::path::{Path, PathBuf};

/// Arity constraints for a verb
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ArgSpec {
    pub min: usize,
    pub max: Option<usize>,
    /// Arguments are key/value pairs
    pub pairs: bool,
}

impl ArgSpec {
    pub const fn exactly(n: usize) -> Self {
        Self {
            min: n,
            max: Some(n),
            pairs: false,
        }
    }

    pub const fn at_least(n: usize) -> Self {
        Self {
            min: n,
            max: None,
            pairs: false,
        }
    }

    pub const fn pairs() -> Self {
        Self {
            min: 2,
            max: None,
            pairs: true,
        }
    }

    /// Check `args` against this spec
    pub fn validate(&self, verb: &str, args: &[String]) -> BoxerResult<()> {
        let n = args.len();

        if self.pairs && n % 2 != 0 {
            return Err(BoxerError::argument(
                verb,
                format!("expected key/value pairs, got {} arguments", n),
            ));
        }

        match self.max {
            Some(max) if max == self.min && n != max => Err(BoxerError::argument(
                verb,
                format!("expected {} argument{}, got {}", max, plural(max), n),
            )),
            Some(max) if n > max => Err(BoxerError::argument(
                verb,
                format!("expected at most {} arguments, got {}", max, n),
            )),
            _ if n < self.min => Err(BoxerError::argument(
                verb,
                format!("expected at least {} argument{}, got {}", self.min, plural(self.min), n),
            )),
            _ => Ok(()),
        }
    }
}

fn plural(n: usize) -> &'static str {
    if n == 1 {
        ""
    } else {
        "s"
    }
}

/// What a verb does
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VerbKind {
    From,
    Run,
    Copy,
    User,
    Workdir,
    Cmd,
    Entrypoint,
    Env,
    Label,
    Expose,
    Volume,
    Tag,
}

/// Static description of a verb
#[derive(Debug)]
pub struct VerbDef {
    pub name: &'static str,
    pub args: ArgSpec,
    pub kind: VerbKind,
}

pub static VERB_TABLE: &[VerbDef] = &[
    VerbDef { name: "from", args: ArgSpec::exactly(1), kind: VerbKind::From },
    VerbDef { name: "run", args: ArgSpec::at_least(1), kind: VerbKind::Run },
    VerbDef { name: "copy", args: ArgSpec::exactly(2), kind: VerbKind::Copy },
    VerbDef { name: "user", args: ArgSpec::exactly(1), kind: VerbKind::User },
    VerbDef { name: "workdir", args: ArgSpec::exactly(1), kind: VerbKind::Workdir },
    VerbDef { name: "cmd", args: ArgSpec::at_least(1), kind: VerbKind::Cmd },
    VerbDef { name: "entrypoint", args: ArgSpec::at_least(1), kind: VerbKind::Entrypoint },
    VerbDef { name: "env", args: ArgSpec::pairs(), kind: VerbKind::Env },
    VerbDef { name: "label", args: ArgSpec::pairs(), kind: VerbKind::Label },
    VerbDef { name: "expose", args: ArgSpec::at_least(1), kind: VerbKind::Expose },
    VerbDef { name: "volume", args: ArgSpec::at_least(1), kind: VerbKind::Volume },
    VerbDef { name: "tag", args: ArgSpec::exactly(1), kind: VerbKind::Tag },
];

/// Find a verb by name
pub fn lookup(name: &str) -> Option<&'static VerbDef> {
    VERB_TABLE.iter().find(|v| v.name == name)
}

impl VerbKind {
    /// Whether the verb needs a current image to build on
    pub fn requires_image(self) -> bool {
        self != Self::From
    }

    /// Verbs whose backend effect is a commit without execution
    pub fn is_config_only(self) -> bool {
        matches!(
            self,
            Self::User
                | Self::Workdir
                | Self::Cmd
                | Self::Entrypoint
                | Self::Env
                | Self::Label
                | Self::Expose
                | Self::Volume
        )
    }

    /// Apply the verb's state change; the image reference is set by the caller
    pub fn apply(self, state: &mut BuildState, args: &[String]) {
        match self {
            Self::From => state.config = ImageConfig::default(),
            Self::User => state.config.user = args[0].clone(),
            Self::Workdir => state.config.workdir = state.resolve_workdir(&args[0]),
            Self::Cmd => state.config.cmd = args.to_vec(),
            Self::Entrypoint => state.config.entrypoint = args.to_vec(),
            Self::Env => {
                for pair in args.chunks_exact(2) {
                    state.config.env.insert(pair[0].clone(), pair[1].clone());
                }
            }
            Self::Label => {
                for pair in args.chunks_exact(2) {
                    state.config.labels.insert(pair[0].clone(), pair[1].clone());
                }
            }
            Self::Expose => state.config.exposed_ports.extend(args.iter().cloned()),
            Self::Volume => state.config.volumes.extend(args.iter().cloned()),
            Self::Run | Self::Copy | Self::Tag => {}
        }
    }

    /// Verb-specific cache key material beyond verb, args, and parent
    pub fn key_material(
        self,
        state: &BuildState,
        args: &[String],
        context_dir: &Path,
    ) -> BoxerResult<Vec<String>> {
        match self {
            Self::Copy => {
                let source = copy_source(context_dir, &args[0]);
                if !source.exists() {
                    return Err(BoxerError::handler(
                        "copy",
                        format!("source not found: {}", source.display()),
                    ));
                }
                Ok(vec![digest_path(&source)?])
            }
            Self::Run => Ok(state.inside.iter().cloned().collect()),
            _ => Ok(Vec::new()),
        }
    }

    /// Perform the backend side of the verb
    ///
    /// `before` is the state the step starts from; `next` already has the
    /// verb applied.
    pub async fn execute(
        self,
        lifecycle: &ContainerLifecycle,
        before: &BuildState,
        next: &BuildState,
        args: &[String],
        context_dir: &Path,
    ) -> BoxerResult<ImageRef> {
        if self == Self::From {
            return lifecycle.resolve_base(&args[0]).await;
        }

        let Some(base) = before.image.as_ref() else {
            return Err(BoxerError::handler(
                verb_name(self),
                "no base image; call from() first",
            ));
        };

        match self {
            Self::Run => lifecycle.run(base, next, run_argv(args)).await,
            Self::Copy => {
                let source = copy_source(context_dir, &args[0]);
                let dest = next.resolve_workdir(&args[1]);
                lifecycle.copy(base, &next.config, &source, &dest).await
            }
            Self::Tag => {
                lifecycle.tag(base, &args[0]).await?;
                Ok(base.clone())
            }
            _ => lifecycle.commit_config(base, &next.config).await,
        }
    }
}

fn verb_name(kind: VerbKind) -> &'static str {
    VERB_TABLE
        .iter()
        .find(|v| v.kind == kind)
        .map(|v| v.name)
        .unwrap_or("verb")
}

/// A single argument is a shell line; several are an argv
pub fn run_argv(args: &[String]) -> Vec<String> {
    match args {
        [line] => vec!["/bin/sh".to_string(), "-c".to_string(), line.clone()],
        argv => argv.to_vec(),
    }
}

fn copy_source(context_dir: &Path, source: &str) -> PathBuf {
    let path = Path::new(source);
    if path.is_absolute() {
        path.to_path_buf()
    } else {
        context_dir.join(path)
    }
}
