//! Conversion between [`Node`] graphs and `serde_json::Value` trees.
//!
//! Importing always allocates a fresh record per JSON object. Exporting
//! follows shared records and live links as many times as they are
//! referenced. A record reached again on its own path is either rendered by
//! a caller-supplied stub or fails with [`Error::Cycle`]. Dead links export
//! as `null`.
//!
//! Both directions recurse once per nesting level, so depth is bounded by the
//! thread stack. JSON text parsed with `serde_json` is capped at 128 levels.

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::{Map, Value};
use std::collections::HashSet;

use crate::{Error, Node, Record, RecordRef, Result, Scalar};

impl From<Value> for Node {
    fn from(value: Value) -> Self {
        match value {
            Value::Null => Node::Scalar(Scalar::Null),
            Value::Bool(b) => Node::Scalar(Scalar::Bool(b)),
            Value::Number(n) => Node::Scalar(Scalar::Number(n)),
            Value::String(s) => Node::Scalar(Scalar::String(s)),
            Value::Array(items) => Node::Sequence(items.into_iter().map(Node::from).collect()),
            Value::Object(map) => Node::record(
                map.into_iter()
                    .map(|(k, v)| (k, Node::from(v)))
                    .collect::<Record>(),
            ),
        }
    }
}

impl Node {
    /// Parses a JSON document into a fresh graph.
    pub fn from_json_str(s: &str) -> Result<Self> {
        let value: Value = serde_json::from_str(s)?;
        Ok(value.into())
    }

    /// Exports the graph as a JSON tree, failing on cycles.
    pub fn to_json(&self) -> Result<Value> {
        self.to_json_with(|_| None)
    }

    /// Exports the graph as a JSON tree. A record reached again on its own
    /// path is rendered by `stub`; returning `None` fails with
    /// [`Error::Cycle`].
    pub fn to_json_with<F>(&self, mut stub: F) -> Result<Value>
    where
        F: FnMut(&Record) -> Option<Value>,
    {
        let mut exporter = Exporter {
            path: Vec::new(),
            on_path: HashSet::new(),
            stub: &mut stub,
        };
        exporter.export(self)
    }
}

impl RecordRef {
    /// Exports the record as a JSON object.
    pub fn to_json(&self) -> Result<Value> {
        Node::Record(self.clone()).to_json()
    }

    /// Like [`Node::to_json_with`].
    pub fn to_json_with<F>(&self, stub: F) -> Result<Value>
    where
        F: FnMut(&Record) -> Option<Value>,
    {
        Node::Record(self.clone()).to_json_with(stub)
    }
}

struct Exporter<'a> {
    path: Vec<String>,
    on_path: HashSet<usize>,
    stub: &'a mut dyn FnMut(&Record) -> Option<Value>,
}

impl Exporter<'_> {
    fn export(&mut self, node: &Node) -> Result<Value> {
        match node {
            Node::Scalar(Scalar::Null) => Ok(Value::Null),
            Node::Scalar(Scalar::Bool(b)) => Ok(Value::Bool(*b)),
            Node::Scalar(Scalar::Number(n)) => Ok(Value::Number(n.clone())),
            Node::Scalar(Scalar::String(s)) => Ok(Value::String(s.clone())),
            Node::Sequence(items) => {
                let mut out = Vec::with_capacity(items.len());
                for (i, item) in items.iter().enumerate() {
                    self.path.push(i.to_string());
                    out.push(self.export(item)?);
                    self.path.pop();
                }
                Ok(Value::Array(out))
            }
            Node::Record(record) => self.export_record(record),
            Node::Link(link) => match link.upgrade() {
                Some(record) => self.export_record(&record),
                None => Ok(Value::Null),
            },
        }
    }

    fn export_record(&mut self, record: &RecordRef) -> Result<Value> {
        let addr = record.addr();
        if !self.on_path.insert(addr) {
            return match (self.stub)(&record.borrow()) {
                Some(stub) => Ok(stub),
                None => Err(Error::Cycle(format!("/{}", self.path.join("/")))),
            };
        }
        let mut out = Map::new();
        // Snapshot so no borrow is held across recursion.
        let props: Vec<(String, Node)> = record
            .borrow()
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect();
        for (key, value) in props {
            self.path.push(key.clone());
            let exported = self.export(&value)?;
            self.path.pop();
            out.insert(key, exported);
        }
        self.on_path.remove(&addr);
        Ok(Value::Object(out))
    }
}

impl Serialize for Node {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        self.to_json()
            .map_err(serde::ser::Error::custom)?
            .serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for Node {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        Value::deserialize(deserializer).map(Node::from)
    }
}
