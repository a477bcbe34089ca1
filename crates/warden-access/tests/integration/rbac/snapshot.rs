//! Seeding the store from an exported snapshot.

use crate::common::{bound, ids, World};
use serde_json::json;
use std::fs;
use warden_access::{AccessConfig, AccessError, AccessSnapshot, Arguments, AuthContext, Effect, Mode, Policy, RbacStore};

const SNAPSHOT: &str = r#"{
    "rules": [
        {"name": "wui_rule", "body": {"FIND": {"r'^auth[a-zA-Z]+$'": ["dashboard-app"]}}}
    ],
    "policies": [
        {"name": "agents_read", "actions": ["agent:read"], "resources": ["agent:id:*"], "effect": "allow"},
        {"name": "agent_456_hidden", "actions": ["agent:read"], "resources": ["agent:id:456"], "effect": "deny", "level": 1},
        {"name": "groups_create", "actions": ["group:create"], "resources": ["*:*:*"], "effect": "allow"}
    ],
    "roles": [
        {"name": "readonly", "policies": ["agents_read", "agent_456_hidden"]},
        {"name": "wui", "policies": ["groups_create"], "rules": ["wui_rule"]}
    ],
    "users": [
        {"name": "analyst", "roles": ["readonly"], "allow_run_as": true}
    ]
}"#;

#[test]
fn test_policy_lookup_after_load() {
    let store = RbacStore::from_snapshot(&AccessSnapshot::from_json(SNAPSHOT).unwrap()).unwrap();

    let policy = store.get_policy("groups_create").unwrap();
    assert_eq!(
        policy,
        Policy::allow("groups_create")
            .for_actions(["group:create"])
            .on_resources(["*:*:*"])
    );
    assert_eq!(store.get_policy("agent_456_hidden").unwrap().effect, Effect::Deny);
    assert_eq!(store.list_roles().len(), 2);
}

#[test]
fn test_snapshot_from_file() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("rbac.json");
    fs::write(&path, SNAPSHOT).unwrap();

    let raw = fs::read_to_string(&path).unwrap();
    let snapshot = AccessSnapshot::from_json(&raw).unwrap();
    assert_eq!(snapshot.rules.len(), 1);
    assert_eq!(snapshot.users[0].roles, vec!["readonly".to_string()]);
}

#[test]
fn test_invalid_snapshot_loads_nothing() {
    let snapshot = AccessSnapshot::from_json(
        r#"{"policies": [{"name": "bad", "actions": ["agent:read"], "resources": ["agent:id:{agent_list}"], "effect": "allow"}],
            "roles": [{"name": "orphan"}]}"#,
    )
    .unwrap();

    let store = RbacStore::new();
    let err = store.load_snapshot(&snapshot).unwrap_err();
    assert!(matches!(err, AccessError::InvalidPolicy(_)));
    assert!(store.get_role("orphan").is_none());
}

#[tokio::test]
async fn test_loaded_model_drives_the_gate() {
    let world = World::new();
    world
        .store
        .load_snapshot(&AccessSnapshot::from_json(SNAPSHOT).unwrap())
        .unwrap();

    let analyst = world.gate.context_for(&world.store, "analyst", None).unwrap();
    assert_eq!(analyst.mode(), AccessConfig::default().default_mode);
    let agents = world
        .gate
        .call(&analyst, "get_agents", Arguments::new(), |a| async move {
            Ok::<_, AccessError>(bound(&a, "agent_list"))
        })
        .await
        .unwrap();
    assert_eq!(agents, ids(&["123"]));

    let err = world
        .gate
        .authorize(&analyst, "create_group", &Arguments::new())
        .await
        .unwrap_err();
    assert!(err.is_access_denied());

    let as_wui = AuthContext::for_user(
        &world.store,
        "analyst",
        Mode::White,
        Some(json!({"authorization": {"authUser": "dashboard-app"}})),
    )
    .unwrap();
    assert!(world
        .gate
        .authorize(&as_wui, "create_group", &Arguments::new())
        .await
        .is_ok());
}
