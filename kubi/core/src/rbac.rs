//! Resolves the effective permissions of a service account by walking binding -> role chains.

use ahash::AHashMap as HashMap;
use kubi_k8s_api::{
    self as k8s, ClusterRole, ClusterRoleBinding, ResourceExt, ResourceId, ResourceSnapshot,
    Role, RoleBinding, Subject,
};
use serde::Serialize;
use tracing::{debug, trace};

/// The wildcard token in RBAC verbs and resources.
pub const WILDCARD: &str = "*";

const SERVICE_ACCOUNT: &str = "ServiceAccount";
const ROLE: &str = "Role";
const CLUSTER_ROLE: &str = "ClusterRole";

/// A flattened RBAC policy rule. Each field preserves the order of the source rule.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PolicyRule {
    pub verbs: Vec<String>,
    pub resources: Vec<String>,
    pub api_groups: Vec<String>,
    pub resource_names: Vec<String>,
    pub non_resource_urls: Vec<String>,
}

/// The rules granted to a service account in a namespace.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EffectivePermissions {
    pub namespace: String,
    pub principal: String,
    pub rules: Vec<PolicyRule>,
}

/// Collects the rules of every role bound to the `principal` service account.
///
/// Role bindings may reference a `Role` (looked up in the binding's namespace) or a
/// `ClusterRole`; cluster role bindings only honor `ClusterRole` references. A reference to a role
/// that doesn't exist contributes nothing.
///
/// Rules are concatenated, not deduplicated: overlapping grants from several bindings appear once
/// per binding. The result is stably sorted by each rule's first verb.
pub fn resolve_effective(
    namespace: &str,
    principal: &str,
    role_bindings: &[RoleBinding],
    cluster_role_bindings: &[ClusterRoleBinding],
    roles: &[Role],
    cluster_roles: &[ClusterRole],
) -> Vec<PolicyRule> {
    let roles = roles
        .iter()
        .map(|role| (ResourceId::of(role), role.rules.as_deref()))
        .collect::<HashMap<_, _>>();
    let cluster_roles = cluster_roles
        .iter()
        .map(|role| (role.name_any(), role.rules.as_deref()))
        .collect::<HashMap<_, _>>();

    let mut rules = Vec::new();
    for binding in role_bindings {
        if !binding_applies(binding.subjects.as_deref(), namespace, principal) {
            continue;
        }
        let role_ref = &binding.role_ref;
        let granted = match role_ref.kind.as_str() {
            ROLE => {
                let id = ResourceId::new(binding.namespace().unwrap_or_default(), &role_ref.name);
                roles.get(&id).copied()
            }
            CLUSTER_ROLE => cluster_roles.get(&role_ref.name).copied(),
            kind => {
                debug!(
                    binding = %binding.name_any(),
                    %kind,
                    "Ignoring unknown role reference kind"
                );
                continue;
            }
        };
        push_granted(&mut rules, &binding.name_any(), &role_ref.name, granted);
    }

    for binding in cluster_role_bindings {
        if !binding_applies(binding.subjects.as_deref(), namespace, principal) {
            continue;
        }
        let role_ref = &binding.role_ref;
        if role_ref.kind != CLUSTER_ROLE {
            trace!(
                binding = %binding.name_any(),
                kind = %role_ref.kind,
                "Ignoring non-ClusterRole reference"
            );
            continue;
        }
        let granted = cluster_roles.get(&role_ref.name).copied();
        push_granted(&mut rules, &binding.name_any(), &role_ref.name, granted);
    }

    rules.sort_by(|a, b| a.first_verb().cmp(b.first_verb()));
    rules
}

fn push_granted(
    rules: &mut Vec<PolicyRule>,
    binding: &str,
    role: &str,
    granted: Option<Option<&[k8s::PolicyRule]>>,
) {
    match granted {
        Some(granted) => rules.extend(granted.unwrap_or_default().iter().map(PolicyRule::from)),
        None => trace!(%binding, %role, "Referenced role not found"),
    }
}

/// A binding applies to a service account when one of its subjects names it and that subject's
/// namespace is either unset or the queried namespace.
fn binding_applies(subjects: Option<&[Subject]>, namespace: &str, principal: &str) -> bool {
    subjects.unwrap_or_default().iter().any(|subject| {
        subject.kind == SERVICE_ACCOUNT
            && subject.name == principal
            && subject
                .namespace
                .as_deref()
                .map_or(true, |ns| ns.is_empty() || ns == namespace)
    })
}

/// Returns true if any rule grants a wildcard verb or resource.
pub fn has_wildcard_rule(rules: Option<&[k8s::PolicyRule]>) -> bool {
    rules.unwrap_or_default().iter().any(|rule| {
        rule.verbs.iter().any(|v| v == WILDCARD)
            || rule.resources.iter().flatten().any(|r| r == WILDCARD)
    })
}

// === impl PolicyRule ===

impl PolicyRule {
    /// The rule's first verb, or the empty string if it has none.
    pub fn first_verb(&self) -> &str {
        self.verbs.first().map(String::as_str).unwrap_or_default()
    }
}

impl From<&k8s::PolicyRule> for PolicyRule {
    fn from(rule: &k8s::PolicyRule) -> Self {
        Self {
            verbs: rule.verbs.clone(),
            resources: rule.resources.clone().unwrap_or_default(),
            api_groups: rule.api_groups.clone().unwrap_or_default(),
            resource_names: rule.resource_names.clone().unwrap_or_default(),
            non_resource_urls: rule.non_resource_urls.clone().unwrap_or_default(),
        }
    }
}

// === impl EffectivePermissions ===

impl EffectivePermissions {
    pub fn resolve(namespace: &str, principal: &str, snapshot: &ResourceSnapshot) -> Self {
        let rules = resolve_effective(
            namespace,
            principal,
            &snapshot.role_bindings,
            &snapshot.cluster_role_bindings,
            &snapshot.roles,
            &snapshot.cluster_roles,
        );
        Self {
            namespace: namespace.to_string(),
            principal: principal.to_string(),
            rules,
        }
    }
}
