use reftrack_cache::{
    CacheConfig, CacheSettings, ConfigError, EntityId, FieldIdResolver, IdentityResolver,
    MergeFunction, Node, Record, ReferenceCache, ScopeId, ShallowMerge, TypedIdResolver,
};
use serde_json::json;

fn record(value: serde_json::Value) -> Record {
    Node::from(value).as_record().unwrap().borrow().clone()
}

fn resolve(resolver: &dyn IdentityResolver, value: serde_json::Value) -> Option<String> {
    resolver.resolve(&record(value)).map(|id| id.to_string())
}

// ── FieldIdResolver ───────────────────────────────────────────────

#[test]
fn field_resolver_reads_strings_and_numbers() {
    let r = FieldIdResolver::default();
    assert_eq!(resolve(&r, json!({"id": "abc"})), Some("abc".into()));
    assert_eq!(resolve(&r, json!({"id": 42})), Some("42".into()));
}

#[test]
fn field_resolver_rejects_falsy_and_nested_values() {
    let r = FieldIdResolver::default();
    assert_eq!(resolve(&r, json!({})), None);
    assert_eq!(resolve(&r, json!({"id": ""})), None);
    assert_eq!(resolve(&r, json!({"id": 0})), None);
    assert_eq!(resolve(&r, json!({"id": null})), None);
    assert_eq!(resolve(&r, json!({"id": false})), None);
    assert_eq!(resolve(&r, json!({"id": {"nested": 1}})), None);
}

#[test]
fn field_resolver_custom_field() {
    let r = FieldIdResolver::new("uuid");
    assert_eq!(resolve(&r, json!({"uuid": "u-1", "id": "ignored"})), Some("u-1".into()));
    assert_eq!(resolve(&r, json!({"id": "x"})), None);
}

// ── TypedIdResolver ───────────────────────────────────────────────

#[test]
fn typed_resolver_combines_type_and_id() {
    let r = TypedIdResolver::default();
    assert_eq!(
        resolve(&r, json!({"type": "BlogEntry", "id": 1})),
        Some("BlogEntry/1".into())
    );
    assert_eq!(resolve(&r, json!({"id": 1})), None);
    assert_eq!(resolve(&r, json!({"type": "BlogEntry"})), None);
}

#[test]
fn typed_resolver_separates_types_with_same_id() {
    let config = CacheConfig::new().with_resolver(TypedIdResolver::default());
    let mut cache = ReferenceCache::new(config);
    cache.add_reference(
        &Node::from(json!([
            {"type": "BlogEntry", "id": 1},
            {"type": "Author", "id": 1}
        ])),
        &ScopeId::named("v1"),
    );

    assert!(cache.contains("BlogEntry/1"));
    assert!(cache.contains("Author/1"));
}

// ── Closures as configuration ─────────────────────────────────────

#[test]
fn closure_resolver() {
    let config = CacheConfig::new()
        .with_resolver(|r: &Record| r.get_str("key").and_then(|k| EntityId::new(k).ok()));
    let mut cache = ReferenceCache::new(config);
    cache.add_reference(&Node::from(json!({"key": "k1", "id": "i1"})), &ScopeId::named("v1"));

    assert!(cache.contains("k1"));
    assert!(!cache.contains("i1"));
}

#[test]
fn closure_merge_first_writer_wins() {
    let config = CacheConfig::new().with_merge(|canonical: &mut Record, incoming: &Record| {
        for (k, v) in incoming {
            if !canonical.contains_key(k) {
                canonical.insert(k.clone(), v.clone());
            }
        }
    });
    let mut cache = ReferenceCache::new(config);
    cache.add_reference(&Node::from(json!({"id": "E1", "title": "a"})), &ScopeId::named("v1"));
    cache.add_reference(
        &Node::from(json!({"id": "E1", "title": "b", "body": "x"})),
        &ScopeId::named("v1"),
    );

    let canonical = cache.find_reference("E1").unwrap();
    assert_eq!(canonical.get_str("title").as_deref(), Some("a"));
    assert_eq!(canonical.get_str("body").as_deref(), Some("x"));
}

#[test]
fn shallow_merge_overwrites_and_keeps() {
    let mut canonical = record(json!({"a": 1, "b": 1}));
    ShallowMerge.merge(&mut canonical, &record(json!({"b": 2, "c": {"d": 3}})));
    assert_eq!(
        Node::from(canonical).to_json().unwrap(),
        json!({"a": 1, "b": 2, "c": {"d": 3}})
    );
}

// ── CacheSettings ─────────────────────────────────────────────────

#[test]
fn settings_defaults_from_empty_object() {
    let settings = CacheSettings::from_json_str("{}").unwrap();
    assert_eq!(settings, CacheSettings::default());
    assert_eq!(settings.id_field, "id");
    assert_eq!(settings.private_prefix.as_deref(), Some("$"));
    assert!(!settings.trace);
}

#[test]
fn settings_reject_empty_fields() {
    let settings = CacheSettings {
        id_field: String::new(),
        ..CacheSettings::default()
    };
    assert!(matches!(
        settings.into_config(),
        Err(ConfigError::EmptyField { setting: "id_field" })
    ));

    let settings = CacheSettings {
        type_field: Some(String::new()),
        ..CacheSettings::default()
    };
    assert!(matches!(
        settings.into_config(),
        Err(ConfigError::EmptyField { setting: "type_field" })
    ));
}

#[test]
fn settings_report_bad_json() {
    assert!(matches!(
        CacheSettings::from_json_str("{\"trace\": \"yes\"}"),
        Err(ConfigError::Serialization(_))
    ));
}

#[test]
fn settings_build_typed_config() {
    let settings =
        CacheSettings::from_json_str(r#"{"type_field": "type", "trace": true}"#).unwrap();
    let config = settings.into_config().unwrap();
    assert!(config.trace());
    assert_eq!(
        config
            .resolve(&record(json!({"type": "BlogEntry", "id": 3})))
            .map(|id| id.to_string()),
        Some("BlogEntry/3".into())
    );
}

#[test]
fn settings_without_private_prefix_walk_everything() {
    let settings = CacheSettings::from_json_str(r#"{"private_prefix": null}"#).unwrap();
    let mut cache = ReferenceCache::new(settings.into_config().unwrap());
    cache.add_reference(
        &Node::from(json!({"id": "E1", "$meta": {"id": "M1"}})),
        &ScopeId::named("v1"),
    );
    assert!(cache.contains("M1"));
}

#[test]
fn settings_custom_private_prefix() {
    let config = CacheSettings {
        private_prefix: Some("_".into()),
        ..CacheSettings::default()
    }
    .into_config()
    .unwrap();
    assert!(config.is_private("_host"));
    assert!(!config.is_private("$host"));
}
