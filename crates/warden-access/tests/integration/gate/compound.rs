//! Operations declaring several resource parameters.

use crate::common::{args, bound, context, ids, World};
use serde_json::json;
use warden_access::{AccessError, Arguments, Effect, Mode, OperationSpec};

#[tokio::test]
async fn test_subsets_align_with_their_parameters() {
    let world = World::new();
    let ctx = context(
        Mode::White,
        &[
            ("group:modify_assignments", "agent:id:*", Effect::Allow, 0),
            ("group:modify_assignments", "group:id:web", Effect::Allow, 0),
        ],
    );

    let (agents, groups) = world
        .gate
        .call(
            &ctx,
            "assign_agents_to_group",
            args(json!({"agent_list": ["456"], "group_list": ["web", "dmz"]})),
            |a| async move { Ok::<_, AccessError>((bound(&a, "agent_list"), bound(&a, "group_list"))) },
        )
        .await
        .unwrap();

    assert_eq!(agents, ids(&["456"]));
    assert_eq!(groups, ids(&["web"]));
}

#[tokio::test]
async fn test_one_empty_subset_still_runs() {
    let world = World::new();
    let ctx = context(
        Mode::White,
        &[("group:modify_assignments", "agent:id:123", Effect::Allow, 0)],
    );

    let groups = world
        .gate
        .call(
            &ctx,
            "assign_agents_to_group",
            args(json!({"agent_list": ["123"], "group_list": ["dmz"]})),
            |a| async move { Ok::<_, AccessError>(a["group_list"].clone()) },
        )
        .await
        .unwrap();

    assert_eq!(groups, json!([]));
}

#[tokio::test]
async fn test_all_subsets_empty_is_refused() {
    let world = World::new();
    let ctx = context(Mode::White, &[]);

    let err = world
        .gate
        .authorize(
            &ctx,
            "assign_agents_to_group",
            &args(json!({"agent_list": ["123"], "group_list": ["dmz"]})),
        )
        .await
        .unwrap_err();

    match err {
        AccessError::AccessDenied { operation, denied } => {
            assert_eq!(operation, "assign_agents_to_group");
            assert_eq!(denied, ids(&["123", "dmz"]));
        }
        other => panic!("unexpected error: {other}"),
    }
}

#[tokio::test]
async fn test_explicit_binding_of_wildcard_descriptor() {
    let world = World::new();
    world
        .gate
        .register(
            OperationSpec::new("sync_groups")
                .action("group:read")
                .resource_into("group:id:*", "groups")
                .unwrap(),
        )
        .unwrap();
    let ctx = context(Mode::Black, &[("group:read", "group:id:dmz", Effect::Deny, 0)]);

    let groups = world
        .gate
        .call(&ctx, "sync_groups", Arguments::new(), |a| async move {
            Ok::<_, AccessError>(bound(&a, "groups"))
        })
        .await
        .unwrap();

    assert_eq!(groups, ids(&["default", "web"]));
}

#[tokio::test]
async fn test_multi_action_operation_needs_every_action() {
    let world = World::new();
    world
        .gate
        .register(
            OperationSpec::new("upgrade_agents")
                .action("agent:read")
                .action("agent:upgrade")
                .resource("agent:id:{agent_list}")
                .unwrap(),
        )
        .unwrap();
    let ctx = context(
        Mode::White,
        &[
            ("agent:*", "agent:id:*", Effect::Allow, 0),
            ("agent:upgrade", "agent:id:123", Effect::Deny, 1),
        ],
    );

    let authorization = world
        .gate
        .authorize(&ctx, "upgrade_agents", &Arguments::new())
        .await
        .unwrap();
    assert_eq!(authorization.permitted("agent_list"), Some(&ids(&["456"])));
}
