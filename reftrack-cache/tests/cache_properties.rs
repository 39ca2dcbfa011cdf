//! Property-based tests for the reference cache.
//!
//! These check the guarantees every host relies on:
//! - Identity: re-adding a record yields the same canonical instance and
//!   never duplicates an owner
//! - Presence: merging records of one id yields the union of their
//!   properties, with the later value winning on overlap
//! - Termination: walks over cyclic graphs finish
//! - Eviction: an entry lives exactly as long as one of its owners

use proptest::prelude::*;
use reftrack_cache::{Node, Record, RecordRef, ReferenceCache, ScopeId};
use std::collections::{BTreeMap, BTreeSet};

// =============================================================================
// HELPER STRATEGIES
// =============================================================================

fn key_strategy() -> impl Strategy<Value = String> {
    prop::string::string_regex("[a-z]{1,6}").unwrap()
}

fn props_strategy() -> impl Strategy<Value = BTreeMap<String, i64>> {
    prop::collection::btree_map(key_strategy(), any::<i64>(), 0..8)
}

fn scope_strategy() -> impl Strategy<Value = ScopeId> {
    (0u8..6).prop_map(|n| ScopeId::named(format!("s{n}")))
}

fn make_entity(id: &str, props: &BTreeMap<String, i64>) -> Node {
    let mut record = Record::new().with("id", id);
    for (k, v) in props {
        if k != "id" {
            record.insert(k.clone(), *v);
        }
    }
    Node::record(record)
}

// =============================================================================
// IDENTITY
// =============================================================================

proptest! {
    #[test]
    fn readding_yields_same_instance(props in props_strategy(), scope in scope_strategy()) {
        let mut cache = ReferenceCache::default();
        let input = make_entity("E", &props);

        let first = cache.add_reference(&input, &scope);
        let second = cache.add_reference(&input, &scope);

        prop_assert_eq!(&first, &second);
        prop_assert_eq!(cache.find_reference("E"), first.as_record().cloned());
        prop_assert_eq!(cache.scopes_of("E").map(BTreeSet::len), Some(1));
    }

    #[test]
    fn one_entry_per_id(ids in prop::collection::vec(0u8..5, 1..20)) {
        let mut cache = ReferenceCache::default();
        let graph = Node::Sequence(
            ids.iter()
                .map(|n| make_entity(&format!("E{n}"), &BTreeMap::new()))
                .collect(),
        );

        let out = cache.add_reference(&graph, &ScopeId::named("v"));

        let distinct: BTreeSet<u8> = ids.iter().copied().collect();
        prop_assert_eq!(cache.len(), distinct.len());
        for (n, item) in ids.iter().zip(out.as_sequence().unwrap()) {
            let canonical = cache.find_reference(&format!("E{n}")).unwrap();
            prop_assert!(item.as_record().unwrap().ptr_eq(&canonical));
        }
    }
}

// =============================================================================
// PRESENCE
// =============================================================================

proptest! {
    #[test]
    fn merge_yields_union_later_wins(a in props_strategy(), b in props_strategy(), a_first in any::<bool>()) {
        let mut cache = ReferenceCache::default();
        let scope = ScopeId::named("v");
        let (first, second) = if a_first { (&a, &b) } else { (&b, &a) };

        cache.add_reference(&make_entity("E", first), &scope);
        cache.add_reference(&make_entity("E", second), &scope);

        let canonical = cache.find_reference("E").unwrap();
        let mut expected = first.clone();
        expected.extend(second.iter().map(|(k, v)| (k.clone(), *v)));
        expected.remove("id");
        for (k, v) in &expected {
            prop_assert_eq!(canonical.get(k), Some(Node::from(*v)));
        }
        prop_assert_eq!(canonical.borrow().len(), expected.len() + 1);
    }
}

// =============================================================================
// TERMINATION
// =============================================================================

proptest! {
    #[test]
    fn cyclic_rings_terminate(len in 1usize..8, entry in 0usize..8) {
        let mut cache = ReferenceCache::default();
        let ring: Vec<RecordRef> = (0..len)
            .map(|i| RecordRef::new(Record::new().with("id", format!("R{i}"))))
            .collect();
        for i in 0..len {
            ring[i].set("next", ring[(i + 1) % len].clone());
        }

        let start = Node::from(ring[entry % len].clone());
        cache.add_reference(&start, &ScopeId::named("v"));

        prop_assert_eq!(cache.len(), len);
        for i in 0..len {
            let canonical = cache.find_reference(&format!("R{i}")).unwrap();
            let next = canonical.get("next").unwrap();
            let expected = cache.find_reference(&format!("R{}", (i + 1) % len)).unwrap();
            prop_assert!(next.to_record().unwrap().ptr_eq(&expected));
        }
        // Exactly one edge closes the ring.
        let links = (0..len)
            .filter(|i| cache.find_reference(&format!("R{i}")).unwrap().get("next").unwrap().is_link())
            .count();
        prop_assert_eq!(links, 1);
    }
}

// =============================================================================
// EVICTION
// =============================================================================

proptest! {
    #[test]
    fn entry_lives_while_any_owner_remains(
        owners in prop::collection::btree_set(scope_strategy(), 1..6),
        shift in 0usize..6,
    ) {
        let mut cache = ReferenceCache::default();
        for scope in &owners {
            cache.add_reference(&make_entity("E", &BTreeMap::new()), scope);
        }

        let mut remaining: Vec<ScopeId> = owners.iter().cloned().collect();
        let shift = shift % remaining.len();
        remaining.rotate_left(shift);

        while let Some(scope) = remaining.pop() {
            cache.cleanup(&scope);
            prop_assert_eq!(cache.contains("E"), !remaining.is_empty());
            // Repeat cleanup is a no-op.
            prop_assert!(cache.cleanup(&scope).is_empty());
        }
    }
}
