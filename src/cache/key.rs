//! Cache key derivation
//!
//! A key is the SHA256 of the step's lineage and identity. Every field is
//! length-prefixed so that argument boundaries cannot be shifted to collide
//! (`run("a b")` and `run("a", "b")` hash differently).

use crate::error::{BoxerError, BoxerResult};
use crate::orchestration::ImageRef;
use sha2::{Digest, Sha256};
use std::fmt;
use std::fs;
use std::path::Path;
use walkdir::WalkDir;

/// Marker hashed in place of the parent for the first step of a chain
const NO_PARENT: &str = "scratch";

/// Deterministic identifier of a (verb, arguments, predecessor image) triple
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey(String);

impl CacheKey {
    /// Derive the key for a step
    ///
    /// `extra` is verb-specific key material such as a digest of copied files.
    pub fn derive(
        parent: Option<&ImageRef>,
        verb: &str,
        args: &[String],
        extra: &[String],
    ) -> Self {
        let mut hasher = Sha256::new();

        update_field(&mut hasher, parent.map(ImageRef::as_str).unwrap_or(NO_PARENT));
        update_field(&mut hasher, verb);

        hasher.update((args.len() as u64).to_le_bytes());
        for arg in args {
            update_field(&mut hasher, arg);
        }

        hasher.update((extra.len() as u64).to_le_bytes());
        for item in extra {
            update_field(&mut hasher, item);
        }

        Self(hex::encode(hasher.finalize()))
    }

    /// Rebuild a key read back from storage
    pub fn from_hex(hex: impl Into<String>) -> Self {
        Self(hex.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

fn update_field(hasher: &mut Sha256, field: &str) {
    hasher.update((field.len() as u64).to_le_bytes());
    hasher.update(field.as_bytes());
}

/// Hash a file or directory tree's names and contents
///
/// Directory entries are visited in file-name order so the digest does not
/// depend on filesystem iteration order.
pub fn digest_path(path: &Path) -> BoxerResult<String> {
    let mut hasher = Sha256::new();

    for entry in WalkDir::new(path).sort_by_file_name() {
        let entry = entry.map_err(|e| {
            let context = format!("walking {}", path.display());
            match e.into_io_error() {
                Some(source) => BoxerError::io(context, source),
                None => BoxerError::io(context, std::io::Error::other("filesystem loop")),
            }
        })?;

        let relative = entry
            .path()
            .strip_prefix(path)
            .unwrap_or(entry.path())
            .to_string_lossy()
            .to_string();
        update_field(&mut hasher, &relative);

        if entry.file_type().is_file() {
            let contents = fs::read(entry.path()).map_err(|e| {
                BoxerError::io(format!("reading {}", entry.path().display()), e)
            })?;
            hasher.update((contents.len() as u64).to_le_bytes());
            hasher.update(&contents);
        } else if entry.file_type().is_symlink() {
            let target = fs::read_link(entry.path()).map_err(|e| {
                BoxerError::io(format!("reading link {}", entry.path().display()), e)
            })?;
            update_field(&mut hasher, &target.to_string_lossy());
        }
    }

    Ok(hex::encode(hasher.finalize()))
}
