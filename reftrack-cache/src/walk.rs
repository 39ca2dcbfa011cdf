//! The recursive merge walk.
//!
//! One walk visits an input graph depth first. Every record that resolves to
//! an id is merged onto its canonical record, the owners of the walk are
//! registered on the entry, and the canonical record's properties are walked
//! in turn. Sequences are rebuilt element by element; records without an id
//! are walked in place and kept.
//!
//! Each physical record is processed at most once per walk: keyed records
//! are tracked per id, unkeyed records by address. This is what terminates
//! walks over cyclic graphs.
//!
//! Every record the walk writes back is held by an owning handle, except a
//! record whose properties are being walked further up the current path.
//! That edge closes a cycle and is written as a [`Node::Link`]. Since every
//! property of every record the walk reaches is rewritten, the owning edges
//! between walked records never form a cycle, and evicted records are freed
//! with their last outside handle.
//!
//! The walk recurses once per nesting level; depth is bounded by the thread
//! stack.

use reftrack_types::{EntityId, Node, RecordRef, ScopeId};
use std::collections::{BTreeSet, HashMap, HashSet};
use tracing::{debug, trace};

use crate::ReferenceCache;
use crate::entry::CacheEntry;

/// Who owns the entities reached by a walk.
pub(crate) enum Owners<'s> {
    /// Explicit scopes, registered on every entity reached.
    Scopes(&'s [ScopeId]),
    /// No explicit scope: new entities take the owners of the nearest
    /// cached record they were reached through.
    Inherit(BTreeSet<ScopeId>),
}

/// Per-walk state, dropped when the walk returns.
#[derive(Default)]
pub(crate) struct WalkState {
    visited: HashMap<EntityId, Vec<usize>>,
    plain: HashSet<usize>,
    /// Records whose properties are being walked.
    path: HashSet<usize>,
}

impl WalkState {
    fn seen(&self, id: &EntityId, record: &RecordRef) -> bool {
        self.visited
            .get(id)
            .is_some_and(|addrs| addrs.contains(&record.addr()))
    }

    fn mark(&mut self, id: &EntityId, record: &RecordRef) {
        let addrs = self.visited.entry(id.clone()).or_default();
        if !addrs.contains(&record.addr()) {
            addrs.push(record.addr());
        }
    }

    /// The node to write back for an edge to `record`.
    fn edge_to(&self, record: RecordRef) -> Node {
        if self.path.contains(&record.addr()) {
            Node::Link(record.downgrade())
        } else {
            Node::Record(record)
        }
    }
}

impl ReferenceCache {
    pub(crate) fn walk_node(&mut self, node: &Node, owners: &Owners<'_>, state: &mut WalkState) -> Node {
        match node {
            Node::Scalar(_) => node.clone(),
            Node::Sequence(items) => {
                let mut walked = Vec::with_capacity(items.len());
                for item in items {
                    walked.push(self.walk_node(item, owners, state));
                }
                Node::Sequence(walked)
            }
            Node::Record(record) => self.walk_record(record, owners, state),
            Node::Link(link) => match link.upgrade() {
                Some(record) => self.walk_record(&record, owners, state),
                None => node.clone(),
            },
        }
    }

    fn walk_record(&mut self, record: &RecordRef, owners: &Owners<'_>, state: &mut WalkState) -> Node {
        let id = self.config.resolve(&record.borrow());
        let walked = match id {
            Some(id) => self.walk_entity(record, id, owners, state),
            None => {
                if state.plain.insert(record.addr()) {
                    self.walk_properties(record, owners, state);
                }
                record.clone()
            }
        };
        state.edge_to(walked)
    }

    fn walk_entity(
        &mut self,
        record: &RecordRef,
        id: EntityId,
        owners: &Owners<'_>,
        state: &mut WalkState,
    ) -> RecordRef {
        if state.seen(&id, record) {
            return match self.entries.get(&id) {
                Some(entry) => entry.reference.clone(),
                None => record.clone(),
            };
        }
        state.mark(&id, record);

        if self.config.trace {
            trace!(id = %id, "walking entity");
        }

        let (canonical, inherited) = match self.entries.get_mut(&id) {
            Some(entry) => {
                let canonical = entry.reference.clone();
                if !canonical.ptr_eq(record) {
                    self.config
                        .merger
                        .merge(&mut canonical.borrow_mut(), &record.borrow());
                }
                let inherited = match owners {
                    Owners::Scopes(scopes) => {
                        for scope in *scopes {
                            if entry.scopes.insert(scope.clone()) {
                                self.scope_index
                                    .entry(scope.clone())
                                    .or_default()
                                    .insert(id.clone());
                            }
                        }
                        None
                    }
                    Owners::Inherit(_) => Some(entry.scopes.clone()),
                };
                (canonical, inherited)
            }
            None => {
                let scopes: BTreeSet<ScopeId> = match owners {
                    Owners::Scopes(scopes) => scopes.iter().cloned().collect(),
                    Owners::Inherit(scopes) => scopes.clone(),
                };
                if scopes.is_empty() {
                    // Nothing could own it; walk through without caching.
                    self.walk_properties(record, owners, state);
                    return record.clone();
                }
                for scope in &scopes {
                    self.scope_index
                        .entry(scope.clone())
                        .or_default()
                        .insert(id.clone());
                }
                debug!(id = %id, owners = scopes.len(), "cache entry created");
                let inherited = match owners {
                    Owners::Scopes(_) => None,
                    Owners::Inherit(_) => Some(scopes.clone()),
                };
                self.entries
                    .insert(id.clone(), CacheEntry::new(id.clone(), record.clone(), scopes));
                (record.clone(), inherited)
            }
        };
        state.mark(&id, &canonical);

        match inherited {
            Some(scopes) => self.walk_properties(&canonical, &Owners::Inherit(scopes), state),
            None => self.walk_properties(&canonical, owners, state),
        }
        canonical
    }

    /// Replaces every non-private property of `record` with its walked value.
    fn walk_properties(&mut self, record: &RecordRef, owners: &Owners<'_>, state: &mut WalkState) {
        // Snapshot: the walk may come back to this record through a cycle.
        let props: Vec<(String, Node)> = record
            .borrow()
            .iter()
            .filter(|(key, _)| !self.config.is_private(key))
            .map(|(key, value)| (key.clone(), value.clone()))
            .collect();

        // Already on the path when a merge re-walks an enclosing canonical.
        let entered = state.path.insert(record.addr());
        for (key, value) in props {
            if let Node::Scalar(_) = value {
                continue;
            }
            let walked = self.walk_node(&value, owners, state);
            record.borrow_mut().insert(key, walked);
        }
        if entered {
            state.path.remove(&record.addr());
        }
    }
}
