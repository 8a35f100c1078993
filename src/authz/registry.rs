//! Role registry and evaluator.
//!
//! Roles live in a process-local map guarded by a reader/writer lock; custom
//! roles are mirrored to a [`PolicyStore`]. Every mutation persists first and
//! only then touches memory, so a failed write leaves both sides unchanged.
//! Mutations are serialized end to end by `writes`; readers only ever take
//! the map lock and never wait on store I/O.
//!
//! Evaluation order for a resource check:
//! 1. unknown role denies
//! 2. first matching deny rule denies
//! 3. first matching allow rule allows
//! 4. otherwise deny
//!
//! Feature checks apply the same precedence to the feature pattern lists.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use parking_lot::{Mutex, RwLock};
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::store::PolicyStore;
use crate::tprintln;

use super::builtin::{builtin_roles, is_builtin};
use super::model::{Decision, Feature, RoleDefinition};

#[derive(Debug, Error)]
pub enum RoleError {
    #[error("role name is required")]
    EmptyName,
    #[error("cannot create role with built-in name: {0}")]
    Conflict(String),
    #[error("cannot modify built-in role: {0}")]
    BuiltIn(String),
    #[error("role not found: {0}")]
    NotFound(String),
    #[error("failed to persist role: {0}")]
    Persist(String),
}

pub struct Authorizer {
    roles: RwLock<HashMap<String, RoleDefinition>>,
    store: Arc<dyn PolicyStore>,
    writes: Mutex<()>,
}

impl Authorizer {
    /// Registry seeded with the built-in roles only.
    pub fn new(store: Arc<dyn PolicyStore>) -> Self {
        let mut map = HashMap::new();
        for r in builtin_roles() { map.insert(r.name.clone(), r); }
        Self { roles: RwLock::new(map), store, writes: Mutex::new(()) }
    }

    /// Registry seeded with built-ins plus every custom role the store holds.
    pub fn with_persisted_roles(store: Arc<dyn PolicyStore>) -> anyhow::Result<Self> {
        let az = Self::new(store);
        let n = az.load_custom_roles()?;
        info!(target: "authz", "loaded {} custom role(s)", n);
        Ok(az)
    }

    /// Pull custom roles from the store into memory. Records that collide
    /// with a built-in name are skipped.
    pub fn load_custom_roles(&self) -> anyhow::Result<usize> {
        let persisted = self.store.load_roles()?;
        let mut loaded = 0usize;
        let mut map = self.roles.write();
        for mut role in persisted {
            if role.name.trim().is_empty() || is_builtin(&role.name) {
                warn!(target: "authz", "skipping persisted role with reserved or empty name: '{}'", role.name);
                continue;
            }
            role.is_custom = true;
            map.insert(role.name.clone(), role);
            loaded += 1;
        }
        Ok(loaded)
    }

    pub fn get_role(&self, name: &str) -> Option<RoleDefinition> {
        self.roles.read().get(name).cloned()
    }

    /// All roles, built-ins first then custom roles by name.
    pub fn list_roles(&self) -> Vec<RoleDefinition> {
        let mut out: Vec<RoleDefinition> = self.roles.read().values().cloned().collect();
        out.sort_by(|a, b| a.is_custom.cmp(&b.is_custom).then_with(|| a.name.cmp(&b.name)));
        out
    }

    /// Upsert by name; last write wins. Custom roles are persisted first.
    pub fn register_role(&self, role: RoleDefinition) -> Result<(), RoleError> {
        let _w = self.writes.lock();
        if role.is_custom {
            self.store.save_role(&role).map_err(|e| RoleError::Persist(e.to_string()))?;
        }
        tprintln!("authz.register_role name={} custom={}", role.name, role.is_custom);
        self.roles.write().insert(role.name.clone(), role);
        Ok(())
    }

    pub fn create_custom_role(&self, mut role: RoleDefinition) -> Result<RoleDefinition, RoleError> {
        role.name = role.name.trim().to_string();
        if role.name.is_empty() { return Err(RoleError::EmptyName); }
        if is_builtin(&role.name) { return Err(RoleError::Conflict(role.name)); }
        role.is_custom = true;
        self.register_role(role.clone())?;
        info!(target: "authz", "custom role created: {}", role.name);
        Ok(role)
    }

    /// Replace a custom role's definition. The path name wins over any name in the body.
    pub fn update_custom_role(&self, name: &str, mut role: RoleDefinition) -> Result<RoleDefinition, RoleError> {
        let name = name.trim();
        if name.is_empty() { return Err(RoleError::EmptyName); }
        if is_builtin(name) { return Err(RoleError::BuiltIn(name.to_string())); }
        role.name = name.to_string();
        role.is_custom = true;
        self.register_role(role.clone())?;
        info!(target: "authz", "custom role updated: {}", role.name);
        Ok(role)
    }

    pub fn delete_role(&self, name: &str) -> Result<(), RoleError> {
        if is_builtin(name) { return Err(RoleError::BuiltIn(name.to_string())); }
        let _w = self.writes.lock();
        if !self.roles.read().contains_key(name) { return Err(RoleError::NotFound(name.to_string())); }
        self.store.delete_role(name).map_err(|e| RoleError::Persist(e.to_string()))?;
        self.roles.write().remove(name);
        info!(target: "authz", "custom role deleted: {}", name);
        Ok(())
    }

    pub fn is_allowed(&self, role: &str, resource: &str, action: &str, namespace: &str) -> Decision {
        let roles = self.roles.read();
        let Some(def) = roles.get(role) else {
            return Decision::deny(format!("unknown role: {}", role));
        };
        if let Some(rule) = def.deny.iter().find(|r| r.matches(resource, action, namespace)) {
            debug!(target: "authz", role, resource, action, namespace, "deny rule matched");
            return Decision::deny(format!(
                "denied by deny rule: {} cannot {} {} in {} (rule: {})",
                role, action, resource, namespace, rule.describe()
            ));
        }
        if def.allow.iter().any(|r| r.matches(resource, action, namespace)) {
            return Decision::allow("allowed");
        }
        Decision::deny(format!("no allow rule for: {} to {} {} in {}", role, action, resource, namespace))
    }

    pub fn is_feature_allowed(&self, role: &str, feature: &str) -> bool {
        self.roles.read().get(role).map(|def| def.feature_allowed(feature)).unwrap_or(false)
    }

    /// Every known feature mapped to whether `role` may use it.
    pub fn feature_permissions(&self, role: &str) -> BTreeMap<Feature, bool> {
        let roles = self.roles.read();
        let def = roles.get(role);
        Feature::all()
            .iter()
            .map(|f| (*f, def.map(|d| d.feature_allowed(f.as_str())).unwrap_or(false)))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::authz::model::ResourceRule;
    use crate::store::MemoryStore;

    fn az() -> Authorizer { Authorizer::new(Arc::new(MemoryStore::default())) }

    #[test]
    fn viewer_cannot_delete_pods() {
        let d = az().is_allowed("viewer", "pods", "delete", "default");
        assert!(!d.allow);
        assert!(d.reason.contains("no allow rule"), "{}", d.reason);
    }

    #[test]
    fn user_exec_in_protected_namespace_cites_deny_rule() {
        let a = az();
        let d = a.is_allowed("user", "pods", "exec", "kube-system");
        assert!(!d.allow);
        assert!(d.reason.starts_with("denied by deny rule"), "{}", d.reason);
        assert!(d.reason.contains("exec"));
        // exec elsewhere is simply not granted
        let d2 = a.is_allowed("user", "pods", "exec", "default");
        assert!(!d2.allow);
        assert!(d2.reason.contains("no allow rule"));
    }

    #[test]
    fn user_cannot_delete_cluster_kinds() {
        let a = az();
        assert!(!a.is_allowed("user", "nodes", "delete", "").allow);
        assert!(!a.is_allowed("user", "namespaces", "delete", "").allow);
        assert!(a.is_allowed("user", "deployments", "scale", "default").allow);
    }

    #[test]
    fn unknown_role_denies_everything() {
        let a = az();
        let d = a.is_allowed("ghost", "pods", "view", "default");
        assert!(!d.allow);
        assert_eq!(d.reason, "unknown role: ghost");
        assert!(!a.is_feature_allowed("ghost", "dashboard"));
        assert!(a.feature_permissions("ghost").values().all(|v| !*v));
    }

    #[test]
    fn admin_allowed_everywhere() {
        let a = az();
        for act in crate::authz::Action::ALL {
            assert!(a.is_allowed("admin", "secrets", act.as_str(), "kube-system").allow);
        }
        assert!(a.feature_permissions("admin").values().all(|v| *v));
    }

    #[test]
    fn deny_beats_allow_in_custom_role() {
        let a = az();
        a.register_role(RoleDefinition {
            name: "ops".into(),
            allow: vec![ResourceRule::new(["*"], ["*"], ["*"])],
            deny: vec![ResourceRule::new(["secrets"], ["view"], ["prod-*"])],
            is_custom: true,
            ..Default::default()
        }).unwrap();
        assert!(!a.is_allowed("ops", "secrets", "view", "prod-eu").allow);
        assert!(a.is_allowed("ops", "secrets", "view", "staging").allow);
        // cluster-scoped requests match every namespace pattern
        assert!(!a.is_allowed("ops", "secrets", "view", "").allow);
    }

    #[test]
    fn builtin_roles_are_protected() {
        let a = az();
        for n in ["admin", "user", "viewer"] {
            assert!(matches!(a.delete_role(n), Err(RoleError::BuiltIn(_))));
            assert!(matches!(a.update_custom_role(n, RoleDefinition::default()), Err(RoleError::BuiltIn(_))));
            let r = RoleDefinition { name: n.into(), ..Default::default() };
            assert!(matches!(a.create_custom_role(r), Err(RoleError::Conflict(_))));
        }
        assert!(matches!(a.delete_role("ghost"), Err(RoleError::NotFound(_))));
        assert!(matches!(a.create_custom_role(RoleDefinition::default()), Err(RoleError::EmptyName)));
    }

    #[test]
    fn list_puts_builtins_first() {
        let a = az();
        a.create_custom_role(RoleDefinition { name: "aaa".into(), ..Default::default() }).unwrap();
        let names: Vec<String> = a.list_roles().into_iter().map(|r| r.name).collect();
        assert_eq!(names, vec!["admin", "user", "viewer", "aaa"]);
    }
}
