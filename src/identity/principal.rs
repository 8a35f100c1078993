use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct Attrs {
    #[serde(default)]
    pub ip: Option<String>,
    #[serde(default)]
    pub auth_method: Option<String>,
}

/// Authenticated caller, established once at login and carried unchanged
/// through every request on that session.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct Principal {
    pub user_id: String,
    pub role: String,
    #[serde(default)]
    pub attrs: Attrs,
}

impl Principal {
    pub fn new(user_id: impl Into<String>, role: impl Into<String>) -> Self {
        Self { user_id: user_id.into(), role: role.into(), attrs: Attrs::default() }
    }
}
