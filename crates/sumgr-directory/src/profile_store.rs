use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::sync::RwLock;
use sumgr_contracts::AppResult;
use sumgr_contracts::models::Profile;
use sumgr_kernel::runtime::{read_lock, write_lock};

/// Read side of the stored security profiles. Local and synchronous.
pub trait ProfileStore: Send + Sync {
    fn get_profile(&self, package_name: &str, uid: i32) -> AppResult<Option<Profile>>;

    fn should_unmount(&self, uid: i32) -> bool;
}

/// On-disk export consumed by [`MemoryProfileStore::from_export`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ProfileExport {
    pub profiles: Vec<Profile>,
    pub unmount_uids: Vec<i32>,
}

#[derive(Debug, Default)]
pub struct MemoryProfileStore {
    profiles: RwLock<HashMap<(String, i32), Profile>>,
    unmount_uids: RwLock<HashSet<i32>>,
}

impl MemoryProfileStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_export(export: ProfileExport) -> Self {
        let store = Self::new();
        for profile in export.profiles {
            store.set_profile(profile);
        }
        for uid in export.unmount_uids {
            store.set_should_unmount(uid, true);
        }
        store
    }

    /// Keyed by `(profile.name, profile.current_uid)`.
    pub fn set_profile(&self, profile: Profile) {
        let key = (profile.name.clone(), profile.current_uid);
        write_lock(&self.profiles, "profile_store_profiles").insert(key, profile);
    }

    pub fn remove_profile(&self, package_name: &str, uid: i32) -> Option<Profile> {
        write_lock(&self.profiles, "profile_store_profiles").remove(&(package_name.to_string(), uid))
    }

    pub fn set_should_unmount(&self, uid: i32, value: bool) {
        let mut uids = write_lock(&self.unmount_uids, "profile_store_unmount");
        if value {
            uids.insert(uid);
        } else {
            uids.remove(&uid);
        }
    }

    pub fn len(&self) -> usize {
        read_lock(&self.profiles, "profile_store_profiles").len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl ProfileStore for MemoryProfileStore {
    fn get_profile(&self, package_name: &str, uid: i32) -> AppResult<Option<Profile>> {
        Ok(read_lock(&self.profiles, "profile_store_profiles")
            .get(&(package_name.to_string(), uid))
            .cloned())
    }

    fn should_unmount(&self, uid: i32) -> bool {
        read_lock(&self.unmount_uids, "profile_store_unmount").contains(&uid)
    }
}

#[cfg(test)]
#[path = "../tests/profile_store/profile_store_tests.rs"]
mod profile_store_tests;
