use crate::ErrorKind;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::sync::Arc;

/// Width of the uid range owned by one device user account.
pub const PER_USER_RANGE: i32 = 100_000;
/// The shell uid; always listed because its profile is commonly edited.
pub const SHELL_UID: i32 = 2000;
pub const DEFAULT_SELINUX_DOMAIN: &str = "u:r:su:s0";

pub fn user_index_of(uid: i32) -> i32 {
    uid / PER_USER_RANGE
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum NamespaceMode {
    #[default]
    Inherited,
    Global,
    Individual,
}

/// Stored policy for one package under one uid.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Profile {
    pub name: String,
    pub current_uid: i32,
    pub allow_su: bool,
    pub root_use_default: bool,
    pub root_template: Option<String>,
    pub uid: i32,
    pub gid: i32,
    pub groups: Vec<i32>,
    pub capabilities: Vec<i32>,
    pub selinux_domain: String,
    pub namespace: NamespaceMode,
    pub rules: String,
    pub non_root_use_default: bool,
    pub umount_modules: bool,
}

impl Default for Profile {
    fn default() -> Self {
        Self {
            name: String::new(),
            current_uid: 0,
            allow_su: false,
            root_use_default: true,
            root_template: None,
            uid: 0,
            gid: 0,
            groups: Vec::new(),
            capabilities: Vec::new(),
            selinux_domain: DEFAULT_SELINUX_DOMAIN.to_string(),
            namespace: NamespaceMode::Inherited,
            rules: String::new(),
            non_root_use_default: true,
            umount_modules: true,
        }
    }
}

impl Profile {
    pub fn for_package(name: impl Into<String>, current_uid: i32) -> Self {
        Self {
            name: name.into(),
            current_uid,
            ..Self::default()
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PackageFlags(u32);

impl PackageFlags {
    pub const NONE: Self = Self(0);
    pub const SYSTEM: Self = Self(1);
    pub const SHARED_UID: Self = Self(1 << 1);
    pub const RESOURCE_OVERLAY: Self = Self(1 << 2);

    pub const fn from_bits(bits: u32) -> Self {
        Self(bits)
    }

    pub const fn bits(self) -> u32 {
        self.0
    }

    pub const fn contains(self, other: Self) -> bool {
        self.0 & other.0 == other.0
    }

    pub const fn union(self, other: Self) -> Self {
        Self(self.0 | other.0)
    }

    pub fn insert(&mut self, other: Self) {
        self.0 |= other.0;
    }
}

/// Package record as reported by the enumeration service. Carried through
/// the directory untouched.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PackageMeta {
    pub package_name: String,
    pub uid: i32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
    #[serde(default)]
    pub flags: PackageFlags,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_dir: Option<String>,
}

impl PackageMeta {
    pub fn new(package_name: impl Into<String>, uid: i32) -> Self {
        Self {
            package_name: package_name.into(),
            uid,
            label: None,
            flags: PackageFlags::NONE,
            version_name: None,
            source_dir: None,
        }
    }

    pub fn is_system(&self) -> bool {
        self.flags.contains(PackageFlags::SYSTEM)
    }

    pub fn is_resource_overlay(&self) -> bool {
        self.flags.contains(PackageFlags::RESOURCE_OVERLAY)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PackageIdentity {
    pub package_name: String,
    pub uid: i32,
}

impl PackageIdentity {
    pub fn new(package_name: impl Into<String>, uid: i32) -> Self {
        Self {
            package_name: package_name.into(),
            uid,
        }
    }

    pub fn user_index(&self) -> i32 {
        user_index_of(self.uid)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AppRecord {
    pub display_label: String,
    pub identity: PackageIdentity,
    pub meta: PackageMeta,
    pub profile: Option<Profile>,
}

impl AppRecord {
    pub fn new(meta: PackageMeta, profile: Option<Profile>) -> Self {
        let display_label = meta
            .label
            .as_deref()
            .map(str::trim)
            .filter(|value| !value.is_empty())
            .map(ToString::to_string)
            .unwrap_or_else(|| meta.package_name.clone());
        Self {
            display_label,
            identity: PackageIdentity::new(meta.package_name.clone(), meta.uid),
            meta,
            profile,
        }
    }

    pub fn package_name(&self) -> &str {
        self.identity.package_name.as_str()
    }

    pub fn uid(&self) -> i32 {
        self.identity.uid
    }

    pub fn user_index(&self) -> i32 {
        self.identity.user_index()
    }

    pub fn is_system_app(&self) -> bool {
        self.meta.is_system()
    }

    pub fn allows_root(&self) -> bool {
        self.profile.as_ref().is_some_and(|profile| profile.allow_su)
    }

    pub fn has_custom_profile(&self) -> bool {
        let Some(profile) = self.profile.as_ref() else {
            return false;
        };
        if profile.allow_su {
            !profile.root_use_default
        } else {
            !profile.non_root_use_default
        }
    }

    /// Same identity and metadata, new profile.
    pub fn with_profile(&self, profile: Option<Profile>) -> Self {
        Self {
            display_label: self.display_label.clone(),
            identity: self.identity.clone(),
            meta: self.meta.clone(),
            profile,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GroupedEntry {
    pub uid: i32,
    pub members: Vec<AppRecord>,
    pub primary: AppRecord,
    pub any_allows_root: bool,
    pub any_custom: bool,
    pub should_unmount: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub owner_label: Option<String>,
}

impl GroupedEntry {
    pub fn is_shared(&self) -> bool {
        self.members.len() > 1
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DirectoryFilters {
    pub show_system_apps: bool,
    pub show_only_primary_user_apps: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum SearchStatus {
    #[default]
    Default,
    Loading,
    Empty,
    Show,
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchView {
    pub text: String,
    pub status: SearchStatus,
    pub results: Vec<AppRecord>,
    pub matched_groups: Vec<GroupedEntry>,
}

/// Published state of the directory. A new value replaces the previous one
/// on every change; it is never edited after publication.
#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DirectorySnapshot {
    pub generation: u64,
    #[serde(skip_serializing)]
    pub all_records: Arc<Vec<AppRecord>>,
    pub visible_records: Vec<AppRecord>,
    pub groups: Vec<GroupedEntry>,
    pub live_user_ids: BTreeSet<i32>,
    pub is_refreshing: bool,
    pub needs_refresh: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_error: Option<ErrorKind>,
    pub filters: DirectoryFilters,
    pub search: SearchView,
}

impl DirectorySnapshot {
    pub fn group_for_uid(&self, uid: i32) -> Option<&GroupedEntry> {
        self.groups.iter().find(|group| group.uid == uid)
    }
}
