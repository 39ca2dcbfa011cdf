//! Identity, merge and filtering rules for a [`ReferenceCache`](crate::ReferenceCache).
//!
//! Configuration is fixed when the cache is built. [`CacheSettings`] is the
//! serializable form used by tools that load settings from JSON.

use reftrack_types::{EntityId, Node, Record, Scalar};
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::{ConfigError, ConfigResult};

/// Decides which records are entities and what their id is.
///
/// Must be deterministic and free of side effects. Two records denote the
/// same entity iff they resolve to equal ids; colliding ids for distinct
/// entities are a configuration error the cache cannot detect.
pub trait IdentityResolver {
    fn resolve(&self, record: &Record) -> Option<EntityId>;
}

impl<F> IdentityResolver for F
where
    F: Fn(&Record) -> Option<EntityId>,
{
    fn resolve(&self, record: &Record) -> Option<EntityId> {
        self(record)
    }
}

/// Applies an incoming record's own properties onto the canonical one.
///
/// Implementations must not recurse into nested records; the cache walks
/// nested values itself after the merge.
pub trait MergeFunction {
    fn merge(&self, canonical: &mut Record, incoming: &Record);
}

impl<F> MergeFunction for F
where
    F: Fn(&mut Record, &Record),
{
    fn merge(&self, canonical: &mut Record, incoming: &Record) {
        self(canonical, incoming)
    }
}

/// Reads the id from a single field.
///
/// Non-empty strings and non-zero numbers are ids; anything else (missing,
/// empty, zero, nested values) means "not an entity".
#[derive(Debug, Clone)]
pub struct FieldIdResolver {
    field: String,
}

impl FieldIdResolver {
    #[must_use]
    pub fn new(field: impl Into<String>) -> Self {
        Self {
            field: field.into(),
        }
    }
}

impl Default for FieldIdResolver {
    fn default() -> Self {
        Self::new("id")
    }
}

impl IdentityResolver for FieldIdResolver {
    fn resolve(&self, record: &Record) -> Option<EntityId> {
        id_component(record.get(&self.field)?).and_then(|id| EntityId::new(id).ok())
    }
}

/// Combines a type field and an id field into `"<type>/<id>"`.
///
/// Lets unrelated types share numeric ids, e.g. `BlogEntry/1` and `Author/1`.
#[derive(Debug, Clone)]
pub struct TypedIdResolver {
    type_field: String,
    id_field: String,
}

impl TypedIdResolver {
    #[must_use]
    pub fn new(type_field: impl Into<String>, id_field: impl Into<String>) -> Self {
        Self {
            type_field: type_field.into(),
            id_field: id_field.into(),
        }
    }
}

impl Default for TypedIdResolver {
    fn default() -> Self {
        Self::new("type", "id")
    }
}

impl IdentityResolver for TypedIdResolver {
    fn resolve(&self, record: &Record) -> Option<EntityId> {
        let kind = id_component(record.get(&self.type_field)?)?;
        let id = id_component(record.get(&self.id_field)?)?;
        EntityId::new(format!("{kind}/{id}")).ok()
    }
}

fn id_component(node: &Node) -> Option<String> {
    match node {
        Node::Scalar(Scalar::String(s)) if !s.is_empty() => Some(s.clone()),
        Node::Scalar(Scalar::Number(n)) if n.as_f64() != Some(0.0) => Some(n.to_string()),
        _ => None,
    }
}

/// Default merge: copies every property of `incoming`, overwriting.
#[derive(Debug, Clone, Copy, Default)]
pub struct ShallowMerge;

impl MergeFunction for ShallowMerge {
    fn merge(&self, canonical: &mut Record, incoming: &Record) {
        for (key, value) in incoming {
            canonical.insert(key.clone(), value.clone());
        }
    }
}

type PrivateFilter = Box<dyn Fn(&str) -> bool>;

/// Runtime configuration of a cache.
pub struct CacheConfig {
    pub(crate) resolver: Box<dyn IdentityResolver>,
    pub(crate) merger: Box<dyn MergeFunction>,
    pub(crate) private: PrivateFilter,
    pub(crate) trace: bool,
}

impl CacheConfig {
    /// Field `id` identity, shallow merge, `$`-prefixed names private.
    #[must_use]
    pub fn new() -> Self {
        Self {
            resolver: Box::new(FieldIdResolver::default()),
            merger: Box::new(ShallowMerge),
            private: Box::new(|name: &str| name.starts_with('$')),
            trace: false,
        }
    }

    #[must_use]
    pub fn with_resolver(mut self, resolver: impl IdentityResolver + 'static) -> Self {
        self.resolver = Box::new(resolver);
        self
    }

    #[must_use]
    pub fn with_merge(mut self, merger: impl MergeFunction + 'static) -> Self {
        self.merger = Box::new(merger);
        self
    }

    /// Sets the predicate for host-private property names. Private
    /// properties are left untouched when an entity's properties are walked.
    #[must_use]
    pub fn with_private_filter(mut self, filter: impl Fn(&str) -> bool + 'static) -> Self {
        self.private = Box::new(filter);
        self
    }

    /// Emits a trace event for every entity visited by a walk.
    #[must_use]
    pub fn with_trace(mut self, trace: bool) -> Self {
        self.trace = trace;
        self
    }

    /// Resolves the id of a record under this configuration.
    #[must_use]
    pub fn resolve(&self, record: &Record) -> Option<EntityId> {
        self.resolver.resolve(record)
    }

    #[must_use]
    pub fn is_private(&self, name: &str) -> bool {
        (self.private)(name)
    }

    #[must_use]
    pub fn trace(&self) -> bool {
        self.trace
    }
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for CacheConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CacheConfig")
            .field("trace", &self.trace)
            .finish_non_exhaustive()
    }
}

/// Serializable cache settings.
///
/// ```json
/// { "id_field": "id", "type_field": "type", "private_prefix": "$", "trace": false }
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheSettings {
    /// Field holding the entity id.
    pub id_field: String,
    /// When set, ids are `"<type>/<id>"` built from this field and `id_field`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub type_field: Option<String>,
    /// Property names with this prefix are host-private. `None` disables it.
    pub private_prefix: Option<String>,
    pub trace: bool,
}

impl Default for CacheSettings {
    fn default() -> Self {
        Self {
            id_field: "id".to_string(),
            type_field: None,
            private_prefix: Some("$".to_string()),
            trace: false,
        }
    }
}

impl CacheSettings {
    pub fn from_json_str(s: &str) -> ConfigResult<Self> {
        Ok(serde_json::from_str(s)?)
    }

    /// Builds the runtime configuration these settings describe.
    pub fn into_config(self) -> ConfigResult<CacheConfig> {
        if self.id_field.is_empty() {
            return Err(ConfigError::EmptyField {
                setting: "id_field",
            });
        }
        let mut config = CacheConfig::new().with_trace(self.trace);
        config = match self.type_field {
            Some(type_field) if type_field.is_empty() => {
                return Err(ConfigError::EmptyField {
                    setting: "type_field",
                });
            }
            Some(type_field) => {
                config.with_resolver(TypedIdResolver::new(type_field, self.id_field))
            }
            None => config.with_resolver(FieldIdResolver::new(self.id_field)),
        };
        config = match self.private_prefix {
            Some(prefix) if !prefix.is_empty() => {
                config.with_private_filter(move |name: &str| name.starts_with(prefix.as_str()))
            }
            _ => config.with_private_filter(|_: &str| false),
        };
        Ok(config)
    }
}
