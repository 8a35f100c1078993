//! Persistence for custom roles and access requests.
//!
//! The in-memory registries are authoritative for the life of the process;
//! a [`PolicyStore`] only mirrors them so state survives a restart. Two
//! implementations are provided: [`MemoryStore`] (tests, ephemeral runs) and
//! [`JsonFileStore`] (one pretty-printed JSON file per collection, written via
//! tmp + rename).

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use parking_lot::{Mutex, RwLock};
use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::access::AccessRequest;
use crate::authz::RoleDefinition;
use crate::tprintln;

pub trait PolicyStore: Send + Sync {
    fn load_roles(&self) -> Result<Vec<RoleDefinition>>;
    fn save_role(&self, role: &RoleDefinition) -> Result<()>;
    fn delete_role(&self, name: &str) -> Result<()>;
    fn load_access_requests(&self) -> Result<Vec<AccessRequest>>;
    fn save_access_request(&self, req: &AccessRequest) -> Result<()>;
}

#[derive(Default)]
pub struct MemoryStore {
    roles: RwLock<BTreeMap<String, RoleDefinition>>,
    requests: RwLock<BTreeMap<String, AccessRequest>>,
}

impl PolicyStore for MemoryStore {
    fn load_roles(&self) -> Result<Vec<RoleDefinition>> { Ok(self.roles.read().values().cloned().collect()) }
    fn save_role(&self, role: &RoleDefinition) -> Result<()> {
        self.roles.write().insert(role.name.clone(), role.clone());
        Ok(())
    }
    fn delete_role(&self, name: &str) -> Result<()> {
        self.roles.write().remove(name);
        Ok(())
    }
    fn load_access_requests(&self) -> Result<Vec<AccessRequest>> { Ok(self.requests.read().values().cloned().collect()) }
    fn save_access_request(&self, req: &AccessRequest) -> Result<()> {
        self.requests.write().insert(req.id.clone(), req.clone());
        Ok(())
    }
}

const ROLES_FILE: &str = "roles.json";
const REQUESTS_FILE: &str = "access_requests.json";

/// Directory-backed store. Writes are serialized by a single mutex so a
/// read-modify-write of one collection never interleaves with another.
pub struct JsonFileStore {
    dir: PathBuf,
    write_lock: Mutex<()>,
}

impl JsonFileStore {
    pub fn open(dir: impl Into<PathBuf>) -> Result<Self> {
        let dir = dir.into();
        std::fs::create_dir_all(&dir).with_context(|| format!("creating store directory {}", dir.display()))?;
        Ok(Self { dir, write_lock: Mutex::new(()) })
    }

    pub fn dir(&self) -> &Path { &self.dir }

    fn read_map<T: DeserializeOwned>(&self, file: &str) -> Result<BTreeMap<String, T>> {
        let path = self.dir.join(file);
        if !path.exists() { return Ok(BTreeMap::new()); }
        let bytes = std::fs::read(&path).with_context(|| format!("reading {}", path.display()))?;
        if bytes.iter().all(|b| b.is_ascii_whitespace()) { return Ok(BTreeMap::new()); }
        serde_json::from_slice(&bytes).with_context(|| format!("parsing {}", path.display()))
    }

    fn write_map<T: Serialize>(&self, file: &str, map: &BTreeMap<String, T>) -> Result<()> {
        let path = self.dir.join(file);
        let tmp = path.with_extension("json.tmp");
        let bytes = serde_json::to_vec_pretty(map)?;
        std::fs::write(&tmp, bytes).with_context(|| format!("writing {}", tmp.display()))?;
        std::fs::rename(&tmp, &path).with_context(|| format!("replacing {}", path.display()))?;
        tprintln!("store.write file={} entries={}", path.display(), map.len());
        Ok(())
    }
}

impl PolicyStore for JsonFileStore {
    fn load_roles(&self) -> Result<Vec<RoleDefinition>> {
        Ok(self.read_map::<RoleDefinition>(ROLES_FILE)?.into_values().collect())
    }

    fn save_role(&self, role: &RoleDefinition) -> Result<()> {
        let _g = self.write_lock.lock();
        let mut map = self.read_map::<RoleDefinition>(ROLES_FILE)?;
        map.insert(role.name.clone(), role.clone());
        self.write_map(ROLES_FILE, &map)
    }

    fn delete_role(&self, name: &str) -> Result<()> {
        let _g = self.write_lock.lock();
        let mut map = self.read_map::<RoleDefinition>(ROLES_FILE)?;
        if map.remove(name).is_some() {
            self.write_map(ROLES_FILE, &map)?;
        }
        Ok(())
    }

    fn load_access_requests(&self) -> Result<Vec<AccessRequest>> {
        Ok(self.read_map::<AccessRequest>(REQUESTS_FILE)?.into_values().collect())
    }

    fn save_access_request(&self, req: &AccessRequest) -> Result<()> {
        let _g = self.write_lock.lock();
        let mut map = self.read_map::<AccessRequest>(REQUESTS_FILE)?;
        map.insert(req.id.clone(), req.clone());
        self.write_map(REQUESTS_FILE, &map)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn role(name: &str) -> RoleDefinition {
        RoleDefinition { name: name.into(), is_custom: true, allowed_features: vec!["dashboard".into()], ..Default::default() }
    }

    #[test]
    fn json_store_survives_reopen() -> Result<()> {
        let tmp = tempfile::tempdir()?;
        {
            let s = JsonFileStore::open(tmp.path())?;
            s.save_role(&role("ops"))?;
            s.save_role(&role("dev"))?;
            s.delete_role("dev")?;
            s.delete_role("never-existed")?;
        }
        let s = JsonFileStore::open(tmp.path())?;
        let roles = s.load_roles()?;
        assert_eq!(roles.len(), 1);
        assert_eq!(roles[0], role("ops"));
        assert!(s.load_access_requests()?.is_empty());
        Ok(())
    }

    #[test]
    fn corrupt_file_is_an_error() -> Result<()> {
        let tmp = tempfile::tempdir()?;
        std::fs::write(tmp.path().join(ROLES_FILE), b"{not json")?;
        let s = JsonFileStore::open(tmp.path())?;
        assert!(s.load_roles().is_err());
        Ok(())
    }
}
