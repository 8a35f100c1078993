//! Seeded roles. These are fixed at startup and protected from the mutating API.

use once_cell::sync::Lazy;

use super::model::{Action, Feature, ResourceRule, RoleDefinition};

pub const ADMIN: &str = "admin";
pub const USER: &str = "user";
pub const VIEWER: &str = "viewer";

/// Namespace where `user` may not exec into workloads.
pub const PROTECTED_NAMESPACE: &str = "kube-system";

pub const BUILTIN_ROLE_NAMES: [&str; 3] = [ADMIN, USER, VIEWER];

pub fn is_builtin(name: &str) -> bool {
    BUILTIN_ROLE_NAMES.iter().any(|b| b.eq_ignore_ascii_case(name))
}

static BUILTINS: Lazy<Vec<RoleDefinition>> = Lazy::new(|| vec![admin(), user(), viewer()]);

/// Fresh copies of the three seeded roles.
pub fn builtin_roles() -> Vec<RoleDefinition> { BUILTINS.clone() }

fn admin() -> RoleDefinition {
    RoleDefinition {
        name: ADMIN.into(),
        description: "Full access to every resource, namespace and feature".into(),
        allow: vec![ResourceRule::new(["*"], Action::ALL, ["*"])],
        deny: vec![],
        allowed_features: vec!["*".into()],
        denied_features: vec![],
        is_custom: false,
    }
}

fn user() -> RoleDefinition {
    RoleDefinition {
        name: USER.into(),
        description: "Day-to-day operations without cluster administration".into(),
        allow: vec![ResourceRule::new(
            ["*"],
            [Action::View, Action::Logs, Action::Scale, Action::Restart, Action::Create, Action::Apply, Action::Edit, Action::PortForward],
            ["*"],
        )],
        deny: vec![
            ResourceRule::new(["*"], [Action::Exec], [PROTECTED_NAMESPACE]),
            ResourceRule::new(["nodes", "namespaces"], [Action::Delete], ["*"]),
        ],
        allowed_features: vec!["*".into()],
        denied_features: vec![Feature::SettingsAdmin.into(), Feature::SettingsSecurity.into()],
        is_custom: false,
    }
}

fn viewer() -> RoleDefinition {
    RoleDefinition {
        name: VIEWER.into(),
        description: "Read-only access to resources and logs".into(),
        allow: vec![ResourceRule::new(["*"], [Action::View, Action::Logs], ["*"])],
        deny: vec![],
        allowed_features: [
            Feature::Dashboard, Feature::Topology, Feature::Metrics,
            Feature::EventTimeline, Feature::AuditLogs, Feature::SettingsGeneral,
        ].into_iter().map(String::from).collect(),
        denied_features: vec![],
        is_custom: false,
    }
}
