//! Scope-owned reference cache for reftrack.
//!
//! Graphs fetched independently (repeated server responses describing
//! overlapping entities) are walked and merged into one canonical record per
//! entity id:
//!
//! - [`ReferenceCache`]: the id → [`CacheEntry`] map and the merge walk
//! - [`ScopeHandle`]: binds cache operations to one consumer scope and
//!   releases its ownership when the scope ends
//! - [`IdentityResolver`] / [`MergeFunction`]: pluggable identity and
//!   shallow-merge rules, bundled in [`CacheConfig`]
//!
//! An entry lives while at least one scope owns it. Out-of-band changes are
//! pushed with [`ReferenceCache::update`]; entities introduced by such an
//! update inherit the owners of the record they were reached through.
//!
//! The cache is single-threaded. Hosts that share it across execution
//! contexts must guard the whole cache with one lock per call.

mod cache;
mod config;
mod entry;
mod error;
mod scope;
mod walk;

pub use cache::ReferenceCache;
pub use config::{
    CacheConfig, CacheSettings, FieldIdResolver, IdentityResolver, MergeFunction, ShallowMerge,
    TypedIdResolver,
};
pub use entry::CacheEntry;
pub use error::{ConfigError, ConfigResult};
pub use scope::{ScopeHandle, SharedCache};

pub use reftrack_types::{EntityId, Node, Record, RecordLink, RecordRef, Scalar, ScopeId};
