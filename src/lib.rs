//! Boxer - scriptable container image builder
//!
//! Runs a Lua build script one verb at a time. Each verb executes in an
//! ephemeral container (or as a config-only commit), and the committed image
//! is cached under a key derived from the verb, its arguments, and the image
//! it built on, so unchanged prefixes of a script are skipped on rebuild.

pub mod build;
pub mod cache;
pub mod cli;
pub mod config;
pub mod error;
pub mod orchestration;
pub mod script;
pub mod ui;

pub use error::{BoxerError, BoxerResult};
