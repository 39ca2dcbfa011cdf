//! The graph model: scalars, sequences and shared records.
//!
//! A [`Node`] owns its scalars and sequences by value, but records are held
//! through [`RecordRef`] handles. Cloning a node clones handles, never record
//! contents, so the same record may appear in several places of one graph (or
//! in itself) and every holder observes in-place mutation.
//!
//! A [`RecordLink`] is the non-owning form of a handle. The cache writes one
//! wherever a record refers back to a record that encloses it, so that graphs
//! with back-references never form strong `Rc` cycles and are freed once the
//! last owning handle goes away.

use serde_json::Number;
use std::cell::{Ref, RefCell, RefMut};
use std::collections::BTreeMap;
use std::collections::btree_map;
use std::fmt;
use std::rc::{Rc, Weak};

use crate::{Error, Result};

/// A leaf value.
#[derive(Debug, Clone, PartialEq)]
pub enum Scalar {
    Null,
    Bool(bool),
    Number(Number),
    String(String),
}

/// A tagged graph value.
///
/// Equality compares scalars and sequences structurally and records by
/// identity (see [`RecordRef::ptr_eq`]). A [`Node::Link`] equals a
/// [`Node::Record`] pointing at the same record.
#[derive(Debug, Clone)]
pub enum Node {
    Scalar(Scalar),
    Sequence(Vec<Node>),
    Record(RecordRef),
    /// Back-reference to an enclosing record. Does not keep it alive.
    Link(RecordLink),
}

impl Node {
    /// The null scalar.
    #[must_use]
    pub const fn null() -> Self {
        Self::Scalar(Scalar::Null)
    }

    /// Creates a numeric node, rejecting NaN and infinities.
    pub fn number(value: f64) -> Result<Self> {
        Number::from_f64(value)
            .map(|n| Self::Scalar(Scalar::Number(n)))
            .ok_or(Error::NonFiniteNumber(value))
    }

    /// Wraps a record into a fresh allocation.
    #[must_use]
    pub fn record(record: Record) -> Self {
        Self::Record(RecordRef::new(record))
    }

    #[must_use]
    pub fn is_null(&self) -> bool {
        matches!(self, Self::Scalar(Scalar::Null))
    }

    /// The owning handle, if this node holds one. Links are not included,
    /// see [`to_record`](Self::to_record).
    #[must_use]
    pub fn as_record(&self) -> Option<&RecordRef> {
        match self {
            Self::Record(record) => Some(record),
            _ => None,
        }
    }

    /// The record this node refers to, through a handle or a live link.
    #[must_use]
    pub fn to_record(&self) -> Option<RecordRef> {
        match self {
            Self::Record(record) => Some(record.clone()),
            Self::Link(link) => link.upgrade(),
            _ => None,
        }
    }

    #[must_use]
    pub fn is_link(&self) -> bool {
        matches!(self, Self::Link(_))
    }

    fn record_addr(&self) -> Option<usize> {
        match self {
            Self::Record(record) => Some(record.addr()),
            Self::Link(link) => Some(link.addr()),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_sequence(&self) -> Option<&[Node]> {
        match self {
            Self::Sequence(items) => Some(items),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_scalar(&self) -> Option<&Scalar> {
        match self {
            Self::Scalar(scalar) => Some(scalar),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::Scalar(Scalar::String(s)) => Some(s),
            _ => None,
        }
    }
}

impl PartialEq for Node {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Self::Scalar(a), Self::Scalar(b)) => a == b,
            (Self::Sequence(a), Self::Sequence(b)) => a == b,
            (Self::Record(_) | Self::Link(_), Self::Record(_) | Self::Link(_)) => {
                self.record_addr() == other.record_addr()
            }
            _ => false,
        }
    }
}

impl From<&str> for Node {
    fn from(value: &str) -> Self {
        Self::Scalar(Scalar::String(value.to_string()))
    }
}

impl From<String> for Node {
    fn from(value: String) -> Self {
        Self::Scalar(Scalar::String(value))
    }
}

impl From<bool> for Node {
    fn from(value: bool) -> Self {
        Self::Scalar(Scalar::Bool(value))
    }
}

impl From<i64> for Node {
    fn from(value: i64) -> Self {
        Self::Scalar(Scalar::Number(value.into()))
    }
}

impl From<RecordRef> for Node {
    fn from(value: RecordRef) -> Self {
        Self::Record(value)
    }
}

impl From<RecordLink> for Node {
    fn from(value: RecordLink) -> Self {
        Self::Link(value)
    }
}

impl From<Record> for Node {
    fn from(value: Record) -> Self {
        Self::record(value)
    }
}

impl From<Vec<Node>> for Node {
    fn from(value: Vec<Node>) -> Self {
        Self::Sequence(value)
    }
}

/// A mapping of property name to node.
#[derive(Debug, Clone, Default)]
pub struct Record {
    properties: BTreeMap<String, Node>,
}

impl Record {
    /// Creates an empty record.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style insert, handy for fixtures.
    #[must_use]
    pub fn with(mut self, key: impl Into<String>, value: impl Into<Node>) -> Self {
        self.properties.insert(key.into(), value.into());
        self
    }

    #[must_use]
    pub fn get(&self, key: &str) -> Option<&Node> {
        self.properties.get(key)
    }

    /// Returns a string property, if present and a string.
    #[must_use]
    pub fn get_str(&self, key: &str) -> Option<&str> {
        self.get(key).and_then(Node::as_str)
    }

    /// Sets a property, returning the previous value.
    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<Node>) -> Option<Node> {
        self.properties.insert(key.into(), value.into())
    }

    pub fn remove(&mut self, key: &str) -> Option<Node> {
        self.properties.remove(key)
    }

    #[must_use]
    pub fn contains_key(&self, key: &str) -> bool {
        self.properties.contains_key(key)
    }

    pub fn iter(&self) -> btree_map::Iter<'_, String, Node> {
        self.properties.iter()
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.properties.keys().map(String::as_str)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.properties.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.properties.is_empty()
    }

    /// Removes every property.
    pub fn clear(&mut self) {
        self.properties.clear();
    }
}

impl<'a> IntoIterator for &'a Record {
    type Item = (&'a String, &'a Node);
    type IntoIter = btree_map::Iter<'a, String, Node>;

    fn into_iter(self) -> Self::IntoIter {
        self.properties.iter()
    }
}

impl<K: Into<String>> FromIterator<(K, Node)> for Record {
    fn from_iter<I: IntoIterator<Item = (K, Node)>>(iter: I) -> Self {
        Self {
            properties: iter.into_iter().map(|(k, v)| (k.into(), v)).collect(),
        }
    }
}

/// Shared handle to a single [`Record`] allocation.
///
/// Two handles are equal iff they point at the same allocation. Borrowing
/// follows `RefCell` rules: do not hold a [`borrow_mut`](Self::borrow_mut)
/// guard while walking into nested records, since a cyclic graph may lead
/// back to the same allocation.
#[derive(Clone, Default)]
pub struct RecordRef(Rc<RefCell<Record>>);

impl RecordRef {
    #[must_use]
    pub fn new(record: Record) -> Self {
        Self(Rc::new(RefCell::new(record)))
    }

    pub fn borrow(&self) -> Ref<'_, Record> {
        self.0.borrow()
    }

    pub fn borrow_mut(&self) -> RefMut<'_, Record> {
        self.0.borrow_mut()
    }

    /// Returns true if both handles point at the same record.
    #[must_use]
    pub fn ptr_eq(&self, other: &Self) -> bool {
        Rc::ptr_eq(&self.0, &other.0)
    }

    /// Stable address of the allocation, usable as an identity key.
    #[must_use]
    pub fn addr(&self) -> usize {
        Rc::as_ptr(&self.0) as *const () as usize
    }

    /// Creates a non-owning link to this record.
    #[must_use]
    pub fn downgrade(&self) -> RecordLink {
        RecordLink(Rc::downgrade(&self.0))
    }

    /// Clones the value of one property out of the record.
    #[must_use]
    pub fn get(&self, key: &str) -> Option<Node> {
        self.0.borrow().get(key).cloned()
    }

    /// Clones a string property out of the record.
    #[must_use]
    pub fn get_str(&self, key: &str) -> Option<String> {
        self.0.borrow().get_str(key).map(str::to_string)
    }

    /// Sets a property, returning the previous value.
    pub fn set(&self, key: impl Into<String>, value: impl Into<Node>) -> Option<Node> {
        self.0.borrow_mut().insert(key, value)
    }

    /// Snapshot of the property names.
    #[must_use]
    pub fn keys(&self) -> Vec<String> {
        self.0.borrow().keys().map(str::to_string).collect()
    }

    /// Drops every property.
    pub fn clear(&self) {
        self.0.borrow_mut().clear();
    }
}

impl PartialEq for RecordRef {
    fn eq(&self, other: &Self) -> bool {
        self.ptr_eq(other)
    }
}

impl Eq for RecordRef {}

impl fmt::Debug for RecordRef {
    // Shallow on purpose: records may be cyclic.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut dbg = f.debug_struct("RecordRef");
        dbg.field("addr", &format_args!("{:#x}", self.addr()));
        match self.0.try_borrow() {
            Ok(record) => dbg.field("keys", &record.keys().collect::<Vec<_>>()),
            Err(_) => dbg.field("keys", &"<borrowed>"),
        };
        dbg.finish()
    }
}

/// Non-owning handle to a [`Record`].
///
/// Reads go through [`upgrade`](Self::upgrade), which fails once every
/// [`RecordRef`] to the record has been dropped.
#[derive(Clone)]
pub struct RecordLink(Weak<RefCell<Record>>);

impl RecordLink {
    #[must_use]
    pub fn upgrade(&self) -> Option<RecordRef> {
        self.0.upgrade().map(RecordRef)
    }

    /// Returns true while the record is still held by some [`RecordRef`].
    #[must_use]
    pub fn is_alive(&self) -> bool {
        self.0.strong_count() > 0
    }

    /// Address of the linked allocation. Stays unique while the link lives.
    #[must_use]
    pub fn addr(&self) -> usize {
        Weak::as_ptr(&self.0) as *const () as usize
    }
}

impl PartialEq for RecordLink {
    fn eq(&self, other: &Self) -> bool {
        Weak::ptr_eq(&self.0, &other.0)
    }
}

impl Eq for RecordLink {}

impl fmt::Debug for RecordLink {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RecordLink")
            .field("addr", &format_args!("{:#x}", self.addr()))
            .field("alive", &self.is_alive())
            .finish()
    }
}
