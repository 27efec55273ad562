//! Persistent step cache
//!
//! Maps a step's cache key to the image its execution committed, so an
//! unchanged step can be skipped on rebuild.
//!
//! # Key model
//!
//! - Keys hash the verb name, its arguments, any extra key material the verb
//!   contributes, and the image the step builds on
//! - Because the predecessor image is part of the key, identical steps on
//!   different chains never share an entry
//! - Entries are write-once: inserting an existing key is a no-op
//!
//! # Policy
//!
//! | Mode | Lookups | Inserts |
//! |------|---------|---------|
//! | default | yes | yes |
//! | no-cache | always miss | yes |
//! | no-cache, writes disabled | always miss | dropped |

pub mod key;
pub mod store;

pub use key::CacheKey;
pub use store::{CacheEntry, CachePolicy, CacheStore};
