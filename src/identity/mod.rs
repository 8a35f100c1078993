//! Caller identity: principals, sessions with CSRF tokens, credential checks
//! and the per-request context extractor.

mod principal;
mod session;
mod provider;
mod request_context;

pub use principal::{Attrs, Principal};
pub use session::{Session, SessionManager, SessionToken};
pub use provider::{hash_password, verify_password, CredentialVerifier, LocalCredentials};
pub use request_context::{client_ip, RequestContext};
