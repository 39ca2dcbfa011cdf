//! Scenario replay for the reftrack reference cache.
//!
//! A scenario is a JSON document holding cache settings and an ordered list
//! of steps, the same calls a host binding layer makes: bind a fetched graph
//! into a scope, join extra entities into a scope, push an async update,
//! look an entity up, destroy a scope. Replaying it yields a report of every
//! step plus a snapshot of the final cache.
//!
//! Graphs are reported as JSON. An entity reached again inside itself (a post
//! whose comments point back at the post) is reported as `{"$ref": "<id>"}`.

use reftrack_cache::{CacheSettings, ConfigError, ReferenceCache, ScopeHandle, SharedCache};
use reftrack_types::{EntityId, Node, ScopeId};
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use std::collections::BTreeMap;
use std::path::Path;
use thiserror::Error;
use tracing::{debug, info};

/// Result type for replay operations.
pub type ReplayResult<T> = Result<T, ReplayError>;

/// Errors that can occur while loading or replaying a scenario.
#[derive(Debug, Error)]
pub enum ReplayError {
    /// A step referred to a scope that was never opened or already destroyed.
    #[error("unknown scope: {0}")]
    UnknownScope(String),

    /// A graph could not be exported: a record without an id contains itself.
    #[error("graph error: {0}")]
    Graph(#[from] reftrack_types::Error),

    #[error("config error: {0}")]
    Config(#[from] ConfigError),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// A recorded sequence of cache operations.
#[derive(Debug, Clone, Deserialize)]
pub struct Scenario {
    #[serde(default)]
    pub settings: CacheSettings,
    pub steps: Vec<Step>,
}

impl Scenario {
    pub fn from_json_str(s: &str) -> ReplayResult<Self> {
        Ok(serde_json::from_str(s)?)
    }

    pub fn load(path: &Path) -> ReplayResult<Self> {
        let text = std::fs::read_to_string(path)?;
        Self::from_json_str(&text)
    }
}

/// One host-side operation.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum Step {
    /// Merge `data` into `scope` and bind it as `property`.
    Set {
        scope: String,
        property: String,
        data: Node,
    },
    /// Merge `data` into `scope` without binding it.
    Add { scope: String, data: Node },
    /// Push an out-of-band partial update for `id`.
    Update { id: String, data: Node },
    /// Look up the canonical record for `id`.
    Find { id: String },
    /// End `scope`.
    Destroy { scope: String },
}

/// Outcome of one step.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum StepReport {
    Set {
        scope: String,
        property: String,
        value: Value,
    },
    Add {
        scope: String,
        value: Value,
    },
    Update {
        id: String,
        found: bool,
    },
    Find {
        id: String,
        value: Option<Value>,
    },
    Destroy {
        scope: String,
        evicted: Vec<EntityId>,
    },
}

/// One cache entry at the end of a replay.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EntrySnapshot {
    pub id: EntityId,
    pub scopes: Vec<ScopeId>,
    pub record: Value,
}

/// Open scope name → property → bound value.
pub type OpenScopes = BTreeMap<String, BTreeMap<String, Value>>;

/// Everything a replay produced.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Report {
    pub steps: Vec<StepReport>,
    pub cache: Vec<EntrySnapshot>,
    /// Scopes still open when the scenario ended, with their bindings.
    pub open_scopes: OpenScopes,
}

/// Drives a cache and its scopes through scenario steps.
pub struct Replayer {
    cache: SharedCache,
    scopes: BTreeMap<String, ScopeHandle>,
}

impl Replayer {
    pub fn new(settings: CacheSettings) -> ReplayResult<Self> {
        let config = settings.into_config()?;
        Ok(Self {
            cache: ReferenceCache::new(config).into_shared(),
            scopes: BTreeMap::new(),
        })
    }

    /// The cache being driven.
    #[must_use]
    pub fn cache(&self) -> &SharedCache {
        &self.cache
    }

    fn scope(&mut self, name: &str) -> &mut ScopeHandle {
        let cache = &self.cache;
        self.scopes.entry(name.to_string()).or_insert_with(|| {
            debug!(scope = name, "opening scope");
            ScopeHandle::new(cache, name)
        })
    }

    /// Applies one step.
    pub fn apply(&mut self, step: &Step) -> ReplayResult<StepReport> {
        let report = match step {
            Step::Set {
                scope,
                property,
                data,
            } => {
                let data = fetch(data)?;
                let bound = self.scope(scope).set(property.as_str(), &data);
                StepReport::Set {
                    scope: scope.clone(),
                    property: property.clone(),
                    value: export(&self.cache.borrow(), &bound)?,
                }
            }
            Step::Add { scope, data } => {
                let data = fetch(data)?;
                let added = self.scope(scope).add(&data);
                StepReport::Add {
                    scope: scope.clone(),
                    value: export(&self.cache.borrow(), &added)?,
                }
            }
            Step::Update { id, data } => {
                let data = fetch(data)?;
                StepReport::Update {
                    id: id.clone(),
                    found: self.cache.borrow_mut().update(id, &data),
                }
            }
            Step::Find { id } => {
                let cache = self.cache.borrow();
                let value = match cache.find_reference(id) {
                    Some(record) => Some(export(&cache, &Node::Record(record))?),
                    None => None,
                };
                StepReport::Find {
                    id: id.clone(),
                    value,
                }
            }
            Step::Destroy { scope } => {
                let handle = self
                    .scopes
                    .remove(scope)
                    .ok_or_else(|| ReplayError::UnknownScope(scope.clone()))?;
                let evicted = handle.destroy().into_iter().map(|e| e.id().clone()).collect();
                StepReport::Destroy {
                    scope: scope.clone(),
                    evicted,
                }
            }
        };
        Ok(report)
    }

    /// Snapshot of the cache and the still-open scopes.
    pub fn snapshot(&self) -> ReplayResult<(Vec<EntrySnapshot>, OpenScopes)> {
        let cache = self.cache.borrow();
        let mut entries = Vec::with_capacity(cache.len());
        for entry in cache.entries() {
            entries.push(EntrySnapshot {
                id: entry.id().clone(),
                scopes: entry.scopes().iter().cloned().collect(),
                record: export(&cache, &Node::Record(entry.reference().clone()))?,
            });
        }

        let mut open = OpenScopes::new();
        for (name, handle) in &self.scopes {
            let mut bindings = BTreeMap::new();
            for (property, value) in handle.bindings() {
                bindings.insert(property.to_string(), export(&cache, value)?);
            }
            open.insert(name.clone(), bindings);
        }
        Ok((entries, open))
    }
}

/// Exports `node`, rendering an entity met again on its own path as a
/// reference to its id.
fn export(cache: &ReferenceCache, node: &Node) -> ReplayResult<Value> {
    let value = node.to_json_with(|record| {
        cache
            .config()
            .resolve(record)
            .map(|id| json!({ "$ref": id.as_str() }))
    })?;
    Ok(value)
}

/// Every step sees freshly allocated records, as if the graph had just been
/// fetched, so replaying a scenario twice starts from the same input.
fn fetch(data: &Node) -> ReplayResult<Node> {
    Ok(Node::from(data.to_json()?))
}

/// Replays a whole scenario against a fresh cache.
pub fn run(scenario: &Scenario) -> ReplayResult<Report> {
    let mut replayer = Replayer::new(scenario.settings.clone())?;
    let mut steps = Vec::with_capacity(scenario.steps.len());
    for step in &scenario.steps {
        steps.push(replayer.apply(step)?);
    }
    let (cache, open_scopes) = replayer.snapshot()?;
    info!(
        steps = steps.len(),
        entries = cache.len(),
        open_scopes = open_scopes.len(),
        "scenario replayed"
    );
    Ok(Report {
        steps,
        cache,
        open_scopes,
    })
}
