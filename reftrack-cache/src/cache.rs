use reftrack_types::{EntityId, Node, RecordRef, ScopeId};
use std::cell::RefCell;
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::rc::Rc;
use tracing::debug;

use crate::config::CacheConfig;
use crate::entry::CacheEntry;
use crate::scope::SharedCache;
use crate::walk::{Owners, WalkState};

/// Deduplicating cache of canonical entity records, owned by scopes.
///
/// Every record whose id resolves is merged onto a single canonical record
/// per id, and callers get that record back in place of their own. An entry
/// stays alive while at least one scope owns it.
#[derive(Debug, Default)]
pub struct ReferenceCache {
    pub(crate) config: CacheConfig,
    pub(crate) entries: BTreeMap<EntityId, CacheEntry>,
    /// Scope → ids it owns. Mirrors `CacheEntry::scopes`.
    pub(crate) scope_index: HashMap<ScopeId, BTreeSet<EntityId>>,
}

impl ReferenceCache {
    #[must_use]
    pub fn new(config: CacheConfig) -> Self {
        Self {
            config,
            entries: BTreeMap::new(),
            scope_index: HashMap::new(),
        }
    }

    /// Wraps the cache for sharing between [`ScopeHandle`](crate::ScopeHandle)s.
    #[must_use]
    pub fn into_shared(self) -> SharedCache {
        Rc::new(RefCell::new(self))
    }

    #[must_use]
    pub fn config(&self) -> &CacheConfig {
        &self.config
    }

    /// Merges `node` into the cache on behalf of `scope`.
    ///
    /// Returns a structurally equivalent graph in which every entity record
    /// is replaced by its canonical record. Sequences are rebuilt; records
    /// without an id are kept and their properties rewritten in place.
    ///
    /// An edge back to a record enclosing it on the walked path is written as
    /// a [`Node::Link`], so graphs with back-references do not keep
    /// themselves alive after eviction.
    ///
    /// The walk recurses once per nesting level. Graphs nested deeper than
    /// the thread stack allows (JSON input is capped at 128 levels by
    /// `serde_json`) must be split by the caller.
    pub fn add_reference(&mut self, node: &Node, scope: &ScopeId) -> Node {
        self.add_reference_owned_by(node, std::slice::from_ref(scope))
    }

    /// Like [`add_reference`](Self::add_reference), registering every scope
    /// in `scopes` as an owner. Existing owners are kept.
    ///
    /// An empty slice behaves like [`add_reference_unscoped`](Self::add_reference_unscoped).
    pub fn add_reference_owned_by(&mut self, node: &Node, scopes: &[ScopeId]) -> Node {
        if scopes.is_empty() {
            return self.add_reference_unscoped(node);
        }
        let mut state = WalkState::default();
        self.walk_node(node, &Owners::Scopes(scopes), &mut state)
    }

    /// Merges `node` without registering any owner.
    ///
    /// Entities already cached keep their owners. A new entity takes the
    /// owners of the nearest cached record it was reached through; with no
    /// such record it is returned as-is and not cached.
    pub fn add_reference_unscoped(&mut self, node: &Node) -> Node {
        let top = node
            .to_record()
            .and_then(|record| self.lookup(&record))
            .map(|entry| entry.scopes.clone())
            .unwrap_or_default();
        let mut state = WalkState::default();
        self.walk_node(node, &Owners::Inherit(top), &mut state)
    }

    /// Returns the canonical record for `id`.
    #[must_use]
    pub fn find_reference(&self, id: &str) -> Option<RecordRef> {
        self.entries.get(id).map(|entry| entry.reference.clone())
    }

    /// Returns the canonical record for the entity `node` denotes, resolving
    /// its id with the configured resolver.
    #[must_use]
    pub fn find_reference_for(&self, node: &Node) -> Option<RecordRef> {
        node.to_record()
            .and_then(|record| self.lookup(&record))
            .map(|entry| entry.reference.clone())
    }

    fn lookup(&self, record: &RecordRef) -> Option<&CacheEntry> {
        let id = self.config.resolve(&record.borrow())?;
        self.entries.get(&id)
    }

    /// Releases `scope`'s ownership of every entry it owns, deleting entries
    /// left without owners. Returns the deleted entries.
    ///
    /// A deleted record stays reachable from records that still hold it and
    /// is freed with the last of them.
    ///
    /// Unknown or already released scopes are a no-op.
    pub fn cleanup(&mut self, scope: &ScopeId) -> Vec<CacheEntry> {
        let Some(ids) = self.scope_index.remove(scope) else {
            return Vec::new();
        };

        let mut evicted = Vec::new();
        for id in ids {
            let orphaned = match self.entries.get_mut(&id) {
                Some(entry) => {
                    entry.scopes.remove(scope);
                    entry.scopes.is_empty()
                }
                None => false,
            };
            if orphaned {
                if let Some(entry) = self.entries.remove(&id) {
                    evicted.push(entry);
                }
            }
        }
        debug!(scope = %scope, evicted = evicted.len(), remaining = self.entries.len(), "scope cleaned up");
        evicted
    }

    /// Applies an out-of-band update to the canonical record for `id`,
    /// shallow-merging `event` with the configured merge function.
    ///
    /// Returns false when `id` is not cached (the entity may have been
    /// evicted since the event was issued).
    pub fn update(&mut self, id: &str, event: &Node) -> bool {
        let Some(canonical) = self.find_reference(id) else {
            return false;
        };
        if let Some(incoming) = event.to_record() {
            if !incoming.ptr_eq(&canonical) {
                self.config
                    .merger
                    .merge(&mut canonical.borrow_mut(), &incoming.borrow());
            }
        }
        self.rewalk(id, canonical);
        true
    }

    /// Like [`update`](Self::update) with a caller-supplied callback that
    /// mutates the canonical record in place.
    ///
    /// The callback may add, replace or remove nested values. Afterwards the
    /// record is walked again without an explicit scope, so new nested
    /// entities are cached and owned by the scopes that own `id`.
    pub fn update_with<E, F>(&mut self, id: &str, event: E, callback: F) -> bool
    where
        F: FnOnce(&RecordRef, E),
    {
        let Some(canonical) = self.find_reference(id) else {
            return false;
        };
        callback(&canonical, event);
        self.rewalk(id, canonical);
        true
    }

    fn rewalk(&mut self, id: &str, canonical: RecordRef) {
        debug!(id = %id, "applying async update");
        self.add_reference_unscoped(&Node::Record(canonical));
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    #[must_use]
    pub fn contains(&self, id: &str) -> bool {
        self.entries.contains_key(id)
    }

    #[must_use]
    pub fn entry(&self, id: &str) -> Option<&CacheEntry> {
        self.entries.get(id)
    }

    /// Owners of `id`, if cached.
    #[must_use]
    pub fn scopes_of(&self, id: &str) -> Option<&BTreeSet<ScopeId>> {
        self.entries.get(id).map(|entry| &entry.scopes)
    }

    /// Entries in id order.
    pub fn entries(&self) -> impl Iterator<Item = &CacheEntry> {
        self.entries.values()
    }

    /// Drops every entry and scope registration.
    pub fn clear(&mut self) {
        self.entries.clear();
        self.scope_index.clear();
    }
}
