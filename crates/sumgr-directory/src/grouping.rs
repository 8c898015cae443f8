use crate::naming::OwnerNaming;
use crate::policy::{compare_groups, compare_members};
use crate::profile_store::ProfileStore;
use std::collections::{BTreeMap, HashMap};
use sumgr_contracts::models::{AppRecord, GroupedEntry, PackageIdentity};

/// Partitions `visible` by uid into ordered groups.
pub fn build_groups(
    visible: &[AppRecord],
    store: &dyn ProfileStore,
    naming: &dyn OwnerNaming,
) -> Vec<GroupedEntry> {
    let mut by_uid = BTreeMap::<i32, Vec<AppRecord>>::new();
    for record in visible {
        by_uid.entry(record.uid()).or_default().push(record.clone());
    }

    let mut groups = by_uid
        .into_iter()
        .filter_map(|(uid, mut members)| {
            members.sort_by(compare_members);
            let primary = members.first()?.clone();
            let owner_label = if members.len() > 1 {
                naming.owner_label(uid, &members)
            } else {
                None
            };
            Some(GroupedEntry {
                uid,
                any_allows_root: members.iter().any(AppRecord::allows_root),
                any_custom: members.iter().any(AppRecord::has_custom_profile),
                should_unmount: store.should_unmount(uid),
                owner_label,
                primary,
                members,
            })
        })
        .collect::<Vec<_>>();
    groups.sort_by(compare_groups);
    groups
}

/// Replaces records in place by identity. Order is left untouched.
pub fn patch_records(
    records: &mut [AppRecord],
    patches: &HashMap<PackageIdentity, AppRecord>,
) -> usize {
    let mut patched = 0;
    for record in records.iter_mut() {
        if let Some(replacement) = patches.get(&record.identity) {
            *record = replacement.clone();
            patched += 1;
        }
    }
    patched
}

/// Patches members and primaries in place and re-evaluates the per-group
/// flags. Neither members nor groups are re-sorted.
pub fn patch_groups(
    groups: &mut [GroupedEntry],
    patches: &HashMap<PackageIdentity, AppRecord>,
) -> usize {
    let mut patched = 0;
    for group in groups.iter_mut() {
        let touched = patch_records(&mut group.members, patches);
        if touched == 0 {
            continue;
        }
        patched += touched;
        if let Some(replacement) = patches.get(&group.primary.identity) {
            group.primary = replacement.clone();
        }
        group.any_allows_root = group.members.iter().any(AppRecord::allows_root);
        group.any_custom = group.members.iter().any(AppRecord::has_custom_profile);
    }
    patched
}

#[cfg(test)]
#[path = "../tests/grouping/grouping_tests.rs"]
mod grouping_tests;
