//! Role-based authorization: resource rules and UI feature gates evaluated
//! with deny-overrides-allow precedence.

pub mod pattern;
pub mod model;
pub mod builtin;
mod registry;

pub use pattern::matches;
pub use model::{Action, Decision, Feature, ResourceRule, RoleDefinition};
pub use builtin::{is_builtin, ADMIN, PROTECTED_NAMESPACE, USER, VIEWER};
pub use registry::{Authorizer, RoleError};
