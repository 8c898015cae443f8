use crate::profile_store::ProfileStore;
use std::collections::{HashMap, HashSet};
use sumgr_contracts::models::{AppRecord, PackageIdentity, PackageMeta, Profile};

fn lookup_profile(store: &dyn ProfileStore, package_name: &str, uid: i32) -> Option<Profile> {
    match store.get_profile(package_name, uid) {
        Ok(profile) => profile,
        Err(error) => {
            tracing::warn!(
                event = "profile_lookup_failed",
                package = package_name,
                uid,
                code = error.code.as_str(),
                message = error.message.as_str()
            );
            None
        }
    }
}

/// Builds fresh records from enumerated packages. Resource overlays and
/// duplicate identities are dropped.
pub(crate) fn join_records(packages: Vec<PackageMeta>, store: &dyn ProfileStore) -> Vec<AppRecord> {
    let mut seen = HashSet::<PackageIdentity>::new();
    let mut records = Vec::with_capacity(packages.len());
    for meta in packages {
        if meta.is_resource_overlay() {
            continue;
        }
        if !seen.insert(PackageIdentity::new(meta.package_name.clone(), meta.uid)) {
            continue;
        }
        let profile = lookup_profile(store, &meta.package_name, meta.uid);
        records.push(AppRecord::new(meta, profile));
    }
    records
}

pub(crate) fn reload_profiles(records: &[AppRecord], store: &dyn ProfileStore) -> Vec<AppRecord> {
    records
        .iter()
        .map(|record| record.with_profile(lookup_profile(store, record.package_name(), record.uid())))
        .collect()
}

/// Records whose profile differs between two reads of the same list.
pub(crate) fn changed_records(
    previous: &[AppRecord],
    reloaded: &[AppRecord],
) -> HashMap<PackageIdentity, AppRecord> {
    previous
        .iter()
        .zip(reloaded.iter())
        .filter(|(before, after)| before.identity == after.identity && before.profile != after.profile)
        .map(|(_, after)| (after.identity.clone(), after.clone()))
        .collect()
}
