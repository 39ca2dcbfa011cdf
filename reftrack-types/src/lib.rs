//! Core type definitions for reftrack.
//!
//! This crate defines the graph model that the reference cache works on:
//! - [`Node`]: a tagged value: [`Scalar`], sequence of nodes, or [`Record`]
//! - [`RecordRef`]: a shared handle to one mutable Record allocation
//! - [`RecordLink`]: the non-owning form of a `RecordRef`
//! - [`EntityId`] and [`ScopeId`]: entity identity and owning scope handles
//!
//! Graphs arrive as deserialized JSON and leave as JSON, so conversion to and
//! from `serde_json::Value` lives here as well.

mod ids;
mod json;
mod node;

pub use ids::{EntityId, ScopeId};
pub use node::{Node, Record, RecordLink, RecordRef, Scalar};

/// Result type alias using the crate's error type.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in type operations.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("entity id must not be empty")]
    EmptyId,

    #[error("cyclic reference at {0}")]
    Cycle(String),

    #[error("number is not finite: {0}")]
    NonFiniteNumber(f64),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}
