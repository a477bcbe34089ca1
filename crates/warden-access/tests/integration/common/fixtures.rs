//! Shared fixtures: a store, providers for agents and groups, and a gate with
//! the platform's usual operations registered.

use serde_json::{json, Value};
use std::collections::BTreeSet;
use std::sync::Arc;
use warden_access::{
    AccessConfig, Arguments, Assignment, AuthContext, AuthorizationGate, Effect, Mode, OperationSpec,
    RbacStore, ResourceExpander, ResourceProvider, Rule, StaticProvider,
};

/// Agents known to the fixture world.
pub const AGENTS: [&str; 2] = ["123", "456"];

/// Groups known to the fixture world.
pub const GROUPS: [&str; 3] = ["default", "dmz", "web"];

/// Fixture world.
pub struct World {
    pub store: Arc<RbacStore>,
    pub agents: Arc<StaticProvider>,
    pub groups: Arc<StaticProvider>,
    pub gate: AuthorizationGate,
}

impl World {
    /// Builds the world with the default providers.
    pub fn new() -> Self {
        Self::with_providers(Vec::new())
    }

    /// Builds the world, letting `overrides` replace or add providers.
    pub fn with_providers(overrides: Vec<(&str, Arc<dyn ResourceProvider>)>) -> Self {
        let store = Arc::new(RbacStore::new());
        for rule in sample_rules() {
            store.add_rule(rule).expect("fixture rules are unique");
        }

        let agents = Arc::new(StaticProvider::with_ids("id", AGENTS));
        let groups = Arc::new(StaticProvider::with_ids("id", GROUPS));

        let mut expander = ResourceExpander::new();
        store.register_with(&mut expander);
        expander.register("agent", agents.clone());
        expander.register("group", groups.clone());
        for (resource_type, provider) in overrides {
            expander.register(resource_type, provider);
        }

        let gate = AuthorizationGate::from_config(Arc::new(expander), &AccessConfig::default());
        register_operations(&gate);

        Self {
            store,
            agents,
            groups,
            gate,
        }
    }
}

/// Registers the operations used across the suite.
pub fn register_operations(gate: &AuthorizationGate) {
    let specs = [
        OperationSpec::new("get_agents")
            .action("agent:read")
            .resource("agent:id:{agent_list}"),
        OperationSpec::new("restart_agents")
            .action("agent:restart")
            .resource("agent:id:{agent_list}"),
        OperationSpec::new("assign_agents_to_group")
            .action("group:modify_assignments")
            .resource("agent:id:{agent_list}&group:id:{group_list}"),
        OperationSpec::new("get_rules")
            .action("rule:read")
            .resource("rule:id:{rule_ids}"),
        Ok(OperationSpec::new("create_group").action("group:create")),
    ];

    for spec in specs {
        gate.register(spec.expect("fixture descriptors are valid"))
            .expect("fixture operations are valid");
    }
}

/// Two `FIND` rules on authentication fields and one `MATCH` rule.
pub fn sample_rules() -> Vec<Rule> {
    vec![
        Rule::new("rule1", json!({"FIND": {"r''^auth[a-zA-Z]+$''": ["administrator"]}})),
        Rule::new("rule2", json!({"FIND": {"r''^auth[a-zA-Z]+$''": ["administrator-app"]}})),
        Rule::new("rule3", json!({"MATCH": {"definition": "technicalRule"}})),
    ]
}

/// Context holding the given `(action, resource, effect, level)` grants.
pub fn context(mode: Mode, grants: &[(&str, &str, Effect, i32)]) -> AuthContext {
    let assignments = grants
        .iter()
        .map(|(action, resource, effect, level)| {
            Assignment::new(*action, resource, *effect, *level).expect("fixture grants are valid")
        })
        .collect();
    AuthContext::new("tester", mode, assignments)
}

/// Argument map from a JSON object.
pub fn args(value: Value) -> Arguments {
    match value {
        Value::Object(map) => map,
        _ => Arguments::new(),
    }
}

/// Identifier set.
pub fn ids(values: &[&str]) -> BTreeSet<String> {
    values.iter().map(|s| s.to_string()).collect()
}

/// Identifiers bound to `name`, as a set.
pub fn bound(args: &Arguments, name: &str) -> BTreeSet<String> {
    args.get(name)
        .and_then(Value::as_array)
        .map(|items| items.iter().filter_map(Value::as_str).map(str::to_string).collect())
        .unwrap_or_default()
}
