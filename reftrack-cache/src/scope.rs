//! Per-scope facade over a shared [`ReferenceCache`].

use reftrack_types::{Node, ScopeId};
use std::cell::RefCell;
use std::collections::BTreeMap;
use std::rc::Rc;
use tracing::warn;

use crate::ReferenceCache;
use crate::entry::CacheEntry;

/// A cache shared by every scope of one host.
pub type SharedCache = Rc<RefCell<ReferenceCache>>;

/// Binds cache operations to one scope and releases the scope's ownership
/// when it ends.
///
/// The handle keeps the canonical values it bound by name, the way a view
/// keeps its bound properties. Ownership is tracked per entry, not per
/// binding: rebinding a name does not release the previous value, only
/// [`destroy`](Self::destroy) (or drop) does.
pub struct ScopeHandle {
    cache: SharedCache,
    scope: ScopeId,
    bindings: BTreeMap<String, Node>,
    released: bool,
}

impl ScopeHandle {
    #[must_use]
    pub fn new(cache: &SharedCache, scope: impl Into<ScopeId>) -> Self {
        Self {
            cache: Rc::clone(cache),
            scope: scope.into(),
            bindings: BTreeMap::new(),
            released: false,
        }
    }

    /// Creates a handle for a freshly generated scope id.
    #[must_use]
    pub fn generate(cache: &SharedCache) -> Self {
        Self::new(cache, ScopeId::generate())
    }

    #[must_use]
    pub fn scope_id(&self) -> &ScopeId {
        &self.scope
    }

    /// Merges `node` into the cache for this scope and binds the canonical
    /// result as `name`. Returns the bound value.
    pub fn set(&mut self, name: impl Into<String>, node: &Node) -> Node {
        let canonical = self.add(node);
        self.bindings.insert(name.into(), canonical.clone());
        canonical
    }

    /// Merges `node` into the cache for this scope without binding it.
    ///
    /// Used for entities joined into a structure the scope already manages.
    pub fn add(&self, node: &Node) -> Node {
        self.cache.borrow_mut().add_reference(node, &self.scope)
    }

    #[must_use]
    pub fn get(&self, name: &str) -> Option<&Node> {
        self.bindings.get(name)
    }

    pub fn bindings(&self) -> impl Iterator<Item = (&str, &Node)> {
        self.bindings.iter().map(|(name, node)| (name.as_str(), node))
    }

    /// Ends the scope. Returns the entries evicted because this scope was
    /// their last owner.
    pub fn destroy(mut self) -> Vec<CacheEntry> {
        self.release()
    }

    fn release(&mut self) -> Vec<CacheEntry> {
        if self.released {
            return Vec::new();
        }
        self.released = true;
        self.bindings.clear();
        match self.cache.try_borrow_mut() {
            Ok(mut cache) => cache.cleanup(&self.scope),
            Err(_) => {
                warn!(scope = %self.scope, "cache busy while releasing scope; ownership leaked");
                Vec::new()
            }
        }
    }
}

impl Drop for ScopeHandle {
    fn drop(&mut self) {
        self.release();
    }
}
