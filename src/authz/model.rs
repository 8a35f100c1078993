//! Role, rule and permission vocabulary for the console's authorization layer.

use serde::{Deserialize, Serialize};
use std::fmt::{Display, Formatter};
use std::str::FromStr;

use super::pattern::{matches, matches_any};

/// Verb a caller wants to perform on a cluster resource.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(rename_all = "kebab-case")]
pub enum Action {
    View,
    Create,
    Edit,
    Apply,
    Delete,
    Scale,
    Restart,
    Exec,
    PortForward,
    Logs,
}

impl Action {
    pub const ALL: [Action; 10] = [
        Action::View, Action::Create, Action::Edit, Action::Apply, Action::Delete,
        Action::Scale, Action::Restart, Action::Exec, Action::PortForward, Action::Logs,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Action::View => "view",
            Action::Create => "create",
            Action::Edit => "edit",
            Action::Apply => "apply",
            Action::Delete => "delete",
            Action::Scale => "scale",
            Action::Restart => "restart",
            Action::Exec => "exec",
            Action::PortForward => "port-forward",
            Action::Logs => "logs",
        }
    }
}

impl Display for Action {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result { f.write_str(self.as_str()) }
}

impl FromStr for Action {
    type Err = String;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Action::ALL.iter().copied().find(|a| a.as_str().eq_ignore_ascii_case(s)).ok_or_else(|| format!("unknown action: {}", s))
    }
}

/// Coarse UI surface tag, independent of resource rules.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(rename_all = "snake_case")]
pub enum Feature {
    Dashboard,
    Topology,
    Metrics,
    HelmManagement,
    SecurityScan,
    AiAssistant,
    Terminal,
    Reports,
    Templates,
    EventTimeline,
    AuditLogs,
    PortForward,
    Gitops,
    Velero,
    CostEstimate,
    NetworkPolicy,
    RbacViz,
    SettingsGeneral,
    SettingsAdmin,
    SettingsSecurity,
    SettingsNotif,
}

impl Feature {
    pub fn all() -> &'static [Feature] {
        &[
            Feature::Dashboard, Feature::Topology, Feature::Metrics, Feature::HelmManagement,
            Feature::SecurityScan, Feature::AiAssistant, Feature::Terminal, Feature::Reports,
            Feature::Templates, Feature::EventTimeline, Feature::AuditLogs, Feature::PortForward,
            Feature::Gitops, Feature::Velero, Feature::CostEstimate, Feature::NetworkPolicy,
            Feature::RbacViz, Feature::SettingsGeneral, Feature::SettingsAdmin,
            Feature::SettingsSecurity, Feature::SettingsNotif,
        ]
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Feature::Dashboard => "dashboard",
            Feature::Topology => "topology",
            Feature::Metrics => "metrics",
            Feature::HelmManagement => "helm_management",
            Feature::SecurityScan => "security_scan",
            Feature::AiAssistant => "ai_assistant",
            Feature::Terminal => "terminal",
            Feature::Reports => "reports",
            Feature::Templates => "templates",
            Feature::EventTimeline => "event_timeline",
            Feature::AuditLogs => "audit_logs",
            Feature::PortForward => "port_forward",
            Feature::Gitops => "gitops",
            Feature::Velero => "velero",
            Feature::CostEstimate => "cost_estimate",
            Feature::NetworkPolicy => "network_policy",
            Feature::RbacViz => "rbac_viz",
            Feature::SettingsGeneral => "settings_general",
            Feature::SettingsAdmin => "settings_admin",
            Feature::SettingsSecurity => "settings_security",
            Feature::SettingsNotif => "settings_notif",
        }
    }
}

impl Display for Feature {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result { f.write_str(self.as_str()) }
}

impl FromStr for Feature {
    type Err = String;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Feature::all().iter().copied().find(|f| f.as_str().eq_ignore_ascii_case(s)).ok_or_else(|| format!("unknown feature: {}", s))
    }
}

/// One resource/action/namespace grant or denial. Rules are replaced wholesale
/// with their role, never edited in place.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct ResourceRule {
    #[serde(default)]
    pub resources: Vec<String>,
    /// Action names; `*` matches every verb including ones outside [`Action`].
    #[serde(default)]
    pub actions: Vec<String>,
    #[serde(default)]
    pub namespaces: Vec<String>,
}

impl ResourceRule {
    pub fn new<R, A, N>(resources: R, actions: A, namespaces: N) -> Self
    where
        R: IntoIterator, R::Item: Into<String>,
        A: IntoIterator, A::Item: Into<String>,
        N: IntoIterator, N::Item: Into<String>,
    {
        Self {
            resources: resources.into_iter().map(Into::into).collect(),
            actions: actions.into_iter().map(Into::into).collect(),
            namespaces: namespaces.into_iter().map(Into::into).collect(),
        }
    }

    /// Full match of the triple. An empty namespace is cluster-scoped and
    /// passes every namespace pattern.
    pub fn matches(&self, resource: &str, action: &str, namespace: &str) -> bool {
        matches_any(&self.resources, resource)
            && self.actions.iter().any(|a| a == "*" || a.eq_ignore_ascii_case(action))
            && (namespace.is_empty() || matches_any(&self.namespaces, namespace))
    }

    pub(crate) fn describe(&self) -> String {
        format!("{} on [{}] in [{}]", self.actions.join(","), self.resources.join(","), self.namespaces.join(","))
    }
}

impl From<Action> for String {
    fn from(a: Action) -> Self { a.as_str().to_string() }
}

impl From<Feature> for String {
    fn from(f: Feature) -> Self { f.as_str().to_string() }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct RoleDefinition {
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub allow: Vec<ResourceRule>,
    #[serde(default)]
    pub deny: Vec<ResourceRule>,
    #[serde(default)]
    pub allowed_features: Vec<String>,
    #[serde(default)]
    pub denied_features: Vec<String>,
    #[serde(default)]
    pub is_custom: bool,
}

impl RoleDefinition {
    pub fn feature_allowed(&self, feature: &str) -> bool {
        if self.denied_features.iter().any(|p| matches(p, feature)) { return false; }
        self.allowed_features.iter().any(|p| matches(p, feature))
    }
}

/// Outcome of one evaluation. There is no undecided state.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Decision {
    pub allow: bool,
    pub reason: String,
}

impl Decision {
    pub fn allow(reason: impl Into<String>) -> Self { Self { allow: true, reason: reason.into() } }
    pub fn deny(reason: impl Into<String>) -> Self { Self { allow: false, reason: reason.into() } }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn action_wire_names() {
        assert_eq!(serde_json::to_string(&Action::PortForward).unwrap(), "\"port-forward\"");
        assert_eq!("PORT-FORWARD".parse::<Action>().unwrap(), Action::PortForward);
        assert!("drain".parse::<Action>().is_err());
    }

    #[test]
    fn feature_catalogue_round_trips_names() {
        assert_eq!(Feature::all().len(), 21);
        for f in Feature::all() {
            assert_eq!(f.as_str().parse::<Feature>().unwrap(), *f);
            assert_eq!(serde_json::to_string(f).unwrap(), format!("\"{}\"", f.as_str()));
        }
    }

    #[test]
    fn rule_needs_all_three_axes() {
        let rule = ResourceRule::new(["pods"], ["exec"], ["kube-system"]);
        assert!(rule.matches("pods", "exec", "kube-system"));
        assert!(!rule.matches("pods", "view", "kube-system"));
        assert!(!rule.matches("deployments", "exec", "kube-system"));
        assert!(!rule.matches("pods", "exec", "default"));
        // cluster-scoped
        assert!(rule.matches("pods", "exec", ""));
    }

    #[test]
    fn unknown_action_only_via_wildcard() {
        let named = ResourceRule::new(["*"], ["view"], ["*"]);
        let star = ResourceRule::new(["*"], ["*"], ["*"]);
        assert!(!named.matches("pods", "drain", "default"));
        assert!(star.matches("pods", "drain", "default"));
    }

    #[test]
    fn denied_feature_wins() {
        let role = RoleDefinition {
            name: "ops".into(),
            allowed_features: vec!["*".into()],
            denied_features: vec!["settings_*".into()],
            ..Default::default()
        };
        assert!(role.feature_allowed("dashboard"));
        assert!(!role.feature_allowed("settings_admin"));
        assert!(!role.feature_allowed("settings_general"));
    }
}
