use std::cmp::Ordering;
use sumgr_contracts::models::{
    AppRecord, DirectoryFilters, GroupedEntry, PER_USER_RANGE, SHELL_UID,
};

/// Locale-aware label ordering used by the flat list.
pub trait LabelCollator: Send + Sync {
    fn compare(&self, left: &str, right: &str) -> Ordering;
}

/// Case-folded comparison, raw labels as tiebreak.
#[derive(Debug, Clone, Copy, Default)]
pub struct CaseFoldCollator;

impl LabelCollator for CaseFoldCollator {
    fn compare(&self, left: &str, right: &str) -> Ordering {
        casefold_cmp(left, right).then_with(|| left.cmp(right))
    }
}

pub(crate) fn casefold_cmp(left: &str, right: &str) -> Ordering {
    left.chars()
        .flat_map(char::to_lowercase)
        .cmp(right.chars().flat_map(char::to_lowercase))
}

/// 0 allows root, 1 custom profile, 2 anything else.
pub fn record_rank(record: &AppRecord) -> u8 {
    if record.allows_root() {
        0
    } else if record.has_custom_profile() {
        1
    } else {
        2
    }
}

pub fn is_visible(record: &AppRecord, filters: DirectoryFilters, self_package: &str) -> bool {
    if record.package_name() == self_package {
        return false;
    }
    if record.allows_root() || record.has_custom_profile() {
        return true;
    }

    let user_ok = !filters.show_only_primary_user_apps || record.uid() / PER_USER_RANGE == 0;
    let system_ok =
        record.uid() == SHELL_UID || filters.show_system_apps || !record.is_system_app();
    user_ok && system_ok
}

pub fn filter_and_sort(
    records: &[AppRecord],
    filters: DirectoryFilters,
    self_package: &str,
    collator: &dyn LabelCollator,
) -> Vec<AppRecord> {
    let mut visible = records
        .iter()
        .filter(|record| is_visible(record, filters, self_package))
        .cloned()
        .collect::<Vec<_>>();
    visible.sort_by(|left, right| {
        record_rank(left)
            .cmp(&record_rank(right))
            .then_with(|| collator.compare(&left.display_label, &right.display_label))
            .then_with(|| left.identity.cmp(&right.identity))
    });
    visible
}

/// Ordering inside one uid group.
pub fn compare_members(left: &AppRecord, right: &AppRecord) -> Ordering {
    record_rank(left)
        .cmp(&record_rank(right))
        .then_with(|| casefold_cmp(&left.display_label, &right.display_label))
        .then_with(|| left.identity.cmp(&right.identity))
}

/// 0 any root, 1 any custom, 2 shared uid, 3 should unmount, 4 the rest.
pub fn group_rank(group: &GroupedEntry) -> u8 {
    if group.any_allows_root {
        0
    } else if group.any_custom {
        1
    } else if group.is_shared() {
        2
    } else if group.should_unmount {
        3
    } else {
        4
    }
}

pub fn compare_groups(left: &GroupedEntry, right: &GroupedEntry) -> Ordering {
    let left_rank = group_rank(left);
    let by_rank = left_rank.cmp(&group_rank(right));
    if by_rank != Ordering::Equal {
        return by_rank;
    }
    if left_rank == 2 {
        return left.uid.cmp(&right.uid);
    }
    casefold_cmp(&left.primary.display_label, &right.primary.display_label)
        .then_with(|| left.uid.cmp(&right.uid))
}

#[cfg(test)]
#[path = "../tests/policy/policy_tests.rs"]
mod policy_tests;
