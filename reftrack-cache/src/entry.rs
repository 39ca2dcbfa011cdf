use reftrack_types::{EntityId, RecordRef, ScopeId};
use std::collections::BTreeSet;

/// One cached entity: its canonical record and the scopes that own it.
///
/// A live entry always has at least one owner. The cache deletes an entry
/// as soon as its last scope is cleaned up.
#[derive(Debug, Clone)]
pub struct CacheEntry {
    pub(crate) id: EntityId,
    pub(crate) scopes: BTreeSet<ScopeId>,
    pub(crate) reference: RecordRef,
}

impl CacheEntry {
    pub(crate) fn new(id: EntityId, reference: RecordRef, scopes: BTreeSet<ScopeId>) -> Self {
        Self {
            id,
            scopes,
            reference,
        }
    }

    #[must_use]
    pub fn id(&self) -> &EntityId {
        &self.id
    }

    /// The owning scopes, in sorted order.
    #[must_use]
    pub fn scopes(&self) -> &BTreeSet<ScopeId> {
        &self.scopes
    }

    /// The canonical record every merge for this id converges onto.
    #[must_use]
    pub fn reference(&self) -> &RecordRef {
        &self.reference
    }

    #[must_use]
    pub fn is_owned_by(&self, scope: &ScopeId) -> bool {
        self.scopes.contains(scope)
    }
}
