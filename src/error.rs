//! Error types for Boxer
//!
//! All modules use `BoxerResult<T>` as their return type.

use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

/// Result type alias for Boxer operations
pub type BoxerResult<T> = Result<T, BoxerError>;

/// Coarse classification of failures, used for exit reporting and tests
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Argument,
    Cache,
    Backend,
    Handler,
    Timeout,
    Aborted,
    Script,
    Config,
    Io,
}

/// All errors that can occur in Boxer
#[derive(Error, Debug)]
pub enum BoxerError {
    // Argument errors
    #[error("Unknown verb: {0}")]
    UnknownVerb(String),

    #[error("Invalid arguments for `{verb}`: {reason}")]
    Argument { verb: String, reason: String },

    // Cache errors
    #[error("Cache store {path} is unreadable: {reason}")]
    CacheRead { path: PathBuf, reason: String },

    #[error("Cache store {path} is unwritable: {reason}")]
    CacheWrite { path: PathBuf, reason: String },

    // Backend errors
    #[error("Container runtime not found: {0}. Install Podman or set runtime.binary")]
    RuntimeNotFound(String),

    #[error("Container failed to start: {0}")]
    ContainerStart(String),

    #[error("Commit of container {container} failed: {reason}")]
    Commit { container: String, reason: String },

    #[error("Image pull failed: {image}: {reason}")]
    ImagePull { image: String, reason: String },

    #[error("Command failed: {command}")]
    CommandFailed {
        command: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Command execution error: {command}, stderr: {stderr}")]
    CommandExecution { command: String, stderr: String },

    // Handler errors
    #[error("Container command exited with code {code}: {command}\n{output}")]
    NonZeroExit {
        command: String,
        code: i32,
        output: String,
    },

    #[error("`{verb}` failed: {reason}")]
    Handler { verb: String, reason: String },

    #[error("{operation} exceeded its deadline of {limit:?}")]
    Timeout { operation: String, limit: Duration },

    #[error("Build aborted")]
    Aborted,

    /// A failure inside a specific step, carrying the verb and its arguments
    #[error("step `{verb} {}` failed: {source}", .args.join(" "))]
    Step {
        verb: String,
        args: Vec<String>,
        #[source]
        source: Box<BoxerError>,
    },

    // Script errors
    #[error("Script error: {0}")]
    Script(String),

    #[error("Script not found: {0}")]
    ScriptNotFound(PathBuf),

    // Configuration errors
    #[error("Invalid configuration at {path}: {reason}")]
    ConfigInvalid { path: PathBuf, reason: String },

    #[error("Failed to create config directory {path}: {source}")]
    ConfigDirCreate {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    // IO errors
    #[error("IO error: {context}")]
    Io {
        context: String,
        #[source]
        source: std::io::Error,
    },

    // Serialization errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("TOML serialize error: {0}")]
    TomlSerialize(#[from] toml::ser::Error),
}

impl BoxerError {
    /// Create an IO error with context
    pub fn io(context: impl Into<String>, source: std::io::Error) -> Self {
        Self::Io {
            context: context.into(),
            source,
        }
    }

    /// Create a command failed error
    pub fn command_failed(command: impl Into<String>, source: std::io::Error) -> Self {
        Self::CommandFailed {
            command: command.into(),
            source,
        }
    }

    /// Create a command execution error
    pub fn command_exec(command: impl Into<String>, stderr: impl Into<String>) -> Self {
        Self::CommandExecution {
            command: command.into(),
            stderr: stderr.into(),
        }
    }

    /// Create an argument error for a verb
    pub fn argument(verb: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Argument {
            verb: verb.into(),
            reason: reason.into(),
        }
    }

    /// Create a verb-specific handler error
    pub fn handler(verb: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Handler {
            verb: verb.into(),
            reason: reason.into(),
        }
    }

    /// Wrap this error with the verb and arguments of the step that raised it
    pub fn in_step(self, verb: &str, args: &[String]) -> Self {
        match self {
            step @ Self::Step { .. } => step,
            other => Self::Step {
                verb: verb.to_string(),
                args: args.to_vec(),
                source: Box::new(other),
            },
        }
    }

    /// Classify the error
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::UnknownVerb(_) | Self::Argument { .. } => ErrorKind::Argument,
            Self::CacheRead { .. } | Self::CacheWrite { .. } => ErrorKind::Cache,
            Self::RuntimeNotFound(_)
            | Self::ContainerStart(_)
            | Self::Commit { .. }
            | Self::ImagePull { .. }
            | Self::CommandFailed { .. }
            | Self::CommandExecution { .. } => ErrorKind::Backend,
            Self::NonZeroExit { .. } | Self::Handler { .. } => ErrorKind::Handler,
            Self::Timeout { .. } => ErrorKind::Timeout,
            Self::Aborted => ErrorKind::Aborted,
            Self::Step { source, .. } => source.kind(),
            Self::Script(_) | Self::ScriptNotFound(_) => ErrorKind::Script,
            Self::ConfigInvalid { .. } | Self::ConfigDirCreate { .. } => ErrorKind::Config,
            Self::Io { .. } | Self::Json(_) | Self::TomlSerialize(_) => ErrorKind::Io,
        }
    }

    /// Get actionable hint for the error
    pub fn hint(&self) -> Option<&'static str> {
        match self {
            Self::RuntimeNotFound(_) => Some("Install Podman: https://podman.io/docs/installation"),
            Self::CacheRead { .. } => Some("Run: box cache clear"),
            Self::Timeout { .. } => Some("Raise the deadline with --timeout or build.step_timeout_secs"),
            Self::Step { source, .. } => source.hint(),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_display() {
        let err = BoxerError::UnknownVerb("frob".to_string());
        assert!(err.to_string().contains("Unknown verb: frob"));
    }

    #[test]
    fn step_error_names_verb_and_args() {
        let err = BoxerError::NonZeroExit {
            command: "/bin/sh -c false".to_string(),
            code: 1,
            output: String::new(),
        }
        .in_step("run", &["false".to_string()]);

        assert!(err.to_string().starts_with("step `run false` failed"));
        assert_eq!(err.kind(), ErrorKind::Handler);
    }

    #[test]
    fn step_wrapping_is_idempotent() {
        let err = BoxerError::Aborted
            .in_step("run", &["a".to_string()])
            .in_step("tag", &["b".to_string()]);
        assert!(err.to_string().contains("`run a`"));
    }

    #[test]
    fn error_kinds() {
        assert_eq!(
            BoxerError::argument("user", "expected 1 argument").kind(),
            ErrorKind::Argument
        );
        assert_eq!(
            BoxerError::ContainerStart("boom".to_string()).kind(),
            ErrorKind::Backend
        );
        assert_eq!(
            BoxerError::Timeout {
                operation: "run".to_string(),
                limit: Duration::from_secs(5)
            }
            .kind(),
            ErrorKind::Timeout
        );
    }

    #[test]
    fn error_hint() {
        let err = BoxerError::RuntimeNotFound("podman".to_string());
        assert!(err.hint().unwrap().contains("podman.io"));
        assert_eq!(BoxerError::Aborted.hint(), None);
    }
}
