use std::collections::HashMap;

use anyhow::{anyhow, Result};
use argon2::{Argon2, PasswordHasher, PasswordVerifier};
use parking_lot::RwLock;
use password_hash::{PasswordHash, SaltString};

use crate::tprintln;

/// Checks a username/password pair and yields the account's role.
/// `Ok(None)` means the credentials were wrong; `Err` is an infrastructure failure.
pub trait CredentialVerifier: Send + Sync {
    fn verify(&self, username: &str, password: &str) -> Result<Option<String>>;
}

pub fn hash_password(password: &str) -> Result<String> {
    let mut salt_bytes = [0u8; 16];
    getrandom::getrandom(&mut salt_bytes).map_err(|e| anyhow!(e.to_string()))?;
    let salt = SaltString::encode_b64(&salt_bytes).map_err(|e| anyhow!(e.to_string()))?;
    let phc = Argon2::default().hash_password(password.as_bytes(), &salt).map_err(|e| anyhow!(e.to_string()))?.to_string();
    Ok(phc)
}

pub fn verify_password(hash: &str, password: &str) -> bool {
    match PasswordHash::new(hash) {
        Ok(parsed) => Argon2::default().verify_password(password.as_bytes(), &parsed).is_ok(),
        Err(_) => false,
    }
}

#[derive(Debug, Clone)]
struct Account {
    phc: String,
    role: String,
}

/// In-memory accounts with Argon2 PHC hashes.
#[derive(Default)]
pub struct LocalCredentials {
    accounts: RwLock<HashMap<String, Account>>,
}

impl LocalCredentials {
    pub fn new() -> Self { Self::default() }

    /// Create or replace an account.
    pub fn add_user(&self, username: &str, password: &str, role: &str) -> Result<()> {
        if username.trim().is_empty() { return Err(anyhow!("username is required")); }
        let phc = hash_password(password)?;
        self.accounts.write().insert(username.to_ascii_lowercase(), Account { phc, role: role.to_string() });
        tprintln!("credentials.add_user user={} role={}", username, role);
        Ok(())
    }

    pub fn remove_user(&self, username: &str) -> bool {
        self.accounts.write().remove(&username.to_ascii_lowercase()).is_some()
    }

    pub fn set_role(&self, username: &str, role: &str) -> bool {
        match self.accounts.write().get_mut(&username.to_ascii_lowercase()) {
            Some(a) => { a.role = role.to_string(); true }
            None => false,
        }
    }

    pub fn len(&self) -> usize { self.accounts.read().len() }
    pub fn is_empty(&self) -> bool { self.accounts.read().is_empty() }
}

impl CredentialVerifier for LocalCredentials {
    fn verify(&self, username: &str, password: &str) -> Result<Option<String>> {
        let account = self.accounts.read().get(&username.to_ascii_lowercase()).cloned();
        let Some(account) = account else {
            // keep timing comparable for unknown users
            let _ = verify_password("$argon2id$v=19$m=19456,t=2,p=1$c2FsdHNhbHRzYWx0$AAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAA", password);
            return Ok(None);
        };
        Ok(verify_password(&account.phc, password).then_some(account.role))
    }
}
