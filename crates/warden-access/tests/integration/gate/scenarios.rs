//! End-to-end gate decisions.

use crate::common::{args, bound, context, ids, World};
use serde_json::{json, Value};
use std::collections::BTreeSet;
use warden_access::{
    AccessError, Arguments, AuditDecision, AuditQuery, AuthContext, Effect, Mode, Policy, Role, User,
};

async fn permitted_agents(world: &World, ctx: &AuthContext, params: Arguments) -> Result<BTreeSet<String>, AccessError> {
    world
        .gate
        .call(ctx, "get_agents", params, |bound_args| async move {
            Ok::<_, AccessError>(bound(&bound_args, "agent_list"))
        })
        .await
}

#[tokio::test]
async fn test_black_mode_keeps_unmentioned_agents() {
    let world = World::new();
    let ctx = context(Mode::Black, &[("agent:read", "agent:id:123", Effect::Allow, 0)]);

    let agents = permitted_agents(&world, &ctx, Arguments::new()).await.unwrap();
    assert_eq!(agents, ids(&["123", "456"]));
}

#[tokio::test]
async fn test_white_mode_keeps_only_granted_agents() {
    let world = World::new();
    let ctx = context(Mode::White, &[("agent:read", "agent:id:123", Effect::Allow, 0)]);

    let agents = permitted_agents(&world, &ctx, Arguments::new()).await.unwrap();
    assert_eq!(agents, ids(&["123"]));
}

#[tokio::test]
async fn test_wildcard_follows_current_agents() {
    let world = World::new();
    let ctx = context(Mode::White, &[("agent:read", "agent:id:*", Effect::Allow, 0)]);

    world.agents.insert("id", ["789"]);
    world.agents.remove("id", "123");

    let agents = permitted_agents(&world, &ctx, Arguments::new()).await.unwrap();
    assert_eq!(agents, ids(&["456", "789"]));
}

#[tokio::test]
async fn test_higher_level_literal_overrides_wildcard_deny() {
    let world = World::new();
    world.agents.insert("id", ["001"]);

    for mode in [Mode::Black, Mode::White] {
        let ctx = context(
            mode,
            &[
                ("agent:read", "agent:id:*", Effect::Deny, 0),
                ("agent:read", "agent:id:001", Effect::Allow, 1),
            ],
        );
        let agents = permitted_agents(&world, &ctx, Arguments::new()).await.unwrap();
        assert_eq!(agents, ids(&["001"]), "mode {mode:?}");
    }
}

#[tokio::test]
async fn test_equal_level_conflict_denies() {
    let world = World::new();
    let ctx = context(
        Mode::Black,
        &[
            ("agent:read", "agent:id:123", Effect::Allow, 3),
            ("agent:*", "agent:id:123", Effect::Deny, 3),
        ],
    );

    let agents = permitted_agents(&world, &ctx, Arguments::new()).await.unwrap();
    assert_eq!(agents, ids(&["456"]));
}

#[tokio::test]
async fn test_denied_request_reports_failed_items() {
    let world = World::new();
    let ctx = context(Mode::White, &[("agent:read", "agent:id:123", Effect::Allow, 0)]);
    let params = args(json!({"agent_list": ["123", "999"]}));

    let authorization = world.gate.authorize(&ctx, "get_agents", &params).await.unwrap();
    assert_eq!(authorization.permitted("agent_list"), Some(&ids(&["123"])));
    assert_eq!(authorization.failed_items(), ids(&["999"]));

    let agents = permitted_agents(&world, &ctx, params).await.unwrap();
    assert_eq!(agents, ids(&["123"]));
}

#[tokio::test]
async fn test_fully_denied_call_is_refused_with_code_4000() {
    let world = World::new();
    let ctx = context(Mode::White, &[("agent:read", "agent:id:123", Effect::Allow, 0)]);
    let mut invoked = false;

    let result = world
        .gate
        .call(&ctx, "get_agents", args(json!({"agent_list": ["456"]})), |_| {
            invoked = true;
            async { Ok::<_, AccessError>(()) }
        })
        .await;

    let err = result.unwrap_err();
    assert_eq!(err.application_code(), Some(4000));
    assert_eq!(err.http_status(), 403);
    assert!(!invoked);
}

#[tokio::test]
async fn test_resourceless_operation() {
    let world = World::new();
    let params = args(json!({"group_id": "ops"}));

    let allowed = context(Mode::White, &[("group:create", "*:*:*", Effect::Allow, 0)]);
    let received = world
        .gate
        .call(&allowed, "create_group", params.clone(), |a| async move { Ok::<_, AccessError>(a) })
        .await
        .unwrap();
    assert_eq!(received, params);

    let nobody = context(Mode::White, &[]);
    let err = world
        .gate
        .call(&nobody, "create_group", params.clone(), |a| async move { Ok::<_, AccessError>(a) })
        .await
        .unwrap_err();
    assert!(err.is_access_denied());

    let permissive = context(Mode::Black, &[]);
    assert!(world
        .gate
        .call(&permissive, "create_group", params, |a| async move { Ok::<_, AccessError>(a) })
        .await
        .is_ok());
}

#[tokio::test]
async fn test_resourceless_deny_beats_black_default() {
    let world = World::new();
    let ctx = context(Mode::Black, &[("group:create", "*:*:*", Effect::Deny, 0)]);

    let err = world
        .gate
        .authorize(&ctx, "create_group", &Arguments::new())
        .await
        .unwrap_err();
    assert!(err.is_access_denied());
}

#[tokio::test]
async fn test_decisions_are_audited() {
    let world = World::new();
    let ctx = context(Mode::White, &[("agent:read", "agent:id:123", Effect::Allow, 0)]);

    permitted_agents(&world, &ctx, Arguments::new()).await.unwrap();
    permitted_agents(&world, &ctx, args(json!({"agent_list": ["456"]})))
        .await
        .unwrap_err();

    let history = world.gate.history().expect("gate built from configuration");
    let events = history.query(&AuditQuery::new().for_principal("tester"));
    assert_eq!(events.len(), 2);
    assert_eq!(events[0].decision, AuditDecision::Partial);
    assert_eq!(events[0].permitted, ids(&["123"]));
    assert_eq!(events[1].decision, AuditDecision::Denied);
    assert_eq!(events[1].denied, ids(&["456"]));
}

#[tokio::test]
async fn test_context_resolved_from_store() {
    let world = World::new();
    world
        .store
        .add_policy(
            Policy::allow("read_123")
                .for_actions(["agent:read"])
                .on_resources(["agent:id:123"]),
        )
        .unwrap();
    world
        .store
        .add_policy(
            Policy::allow("read_all_technical")
                .for_actions(["agent:read"])
                .on_resources(["agent:id:*"]),
        )
        .unwrap();
    world.store.add_role(Role::new("reader").with_policy("read_123"));
    world
        .store
        .add_role(Role::new("technical").with_policy("read_all_technical").with_rule("rule3"));
    world.store.add_user(User::new("dashboard-app").with_role("reader").run_as());

    let plain = AuthContext::for_user(&world.store, "dashboard-app", Mode::White, None).unwrap();
    assert_eq!(
        permitted_agents(&world, &plain, Arguments::new()).await.unwrap(),
        ids(&["123"])
    );

    let technical = AuthContext::for_user(
        &world.store,
        "dashboard-app",
        Mode::White,
        Some(json!({"definition": "technicalRule"})),
    )
    .unwrap();
    assert_eq!(
        permitted_agents(&world, &technical, Arguments::new()).await.unwrap(),
        ids(&["123", "456"])
    );
}

#[tokio::test]
async fn test_call_current_uses_task_context() {
    let world = World::new();
    let ctx = context(Mode::White, &[("agent:read", "agent:id:456", Effect::Allow, 0)]);

    let agents = ctx
        .scope(world.gate.call_current("get_agents", Arguments::new(), |a| async move {
            Ok::<_, AccessError>(a["agent_list"].clone())
        }))
        .await
        .unwrap();
    assert_eq!(agents, json!(["456"]));

    let err = world
        .gate
        .call_current("get_agents", Arguments::new(), |_| async { Ok::<_, AccessError>(Value::Null) })
        .await
        .unwrap_err();
    assert!(matches!(err, AccessError::ContextNotSet));
}
