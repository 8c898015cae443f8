use super::*;
use crate::naming::SharedUidNaming;
use crate::profile_store::MemoryProfileStore;
use std::collections::BTreeSet;
use sumgr_contracts::models::{PackageMeta, Profile};

fn record(package: &str, uid: i32, label: &str) -> AppRecord {
    let mut meta = PackageMeta::new(package, uid);
    meta.label = Some(label.to_string());
    AppRecord::new(meta, None)
}

fn rooted(record: AppRecord) -> AppRecord {
    let mut profile = Profile::for_package(record.package_name(), record.uid());
    profile.allow_su = true;
    record.with_profile(Some(profile))
}

#[test]
fn shared_uid_group_should_lead_with_root_member() {
    let visible = vec![
        record("com.example.suite.mail", 10_050, "Mail"),
        record("com.example.suite.calendar", 10_050, "Calendar"),
        rooted(record("com.example.suite.sync", 10_050, "Sync")),
        record("com.example.other", 10_051, "Other"),
    ];
    let store = MemoryProfileStore::new();

    let groups = build_groups(&visible, &store, &SharedUidNaming::new());

    let group = groups
        .iter()
        .find(|group| group.uid == 10_050)
        .expect("group for 10050");
    assert_eq!(group.primary.package_name(), "com.example.suite.sync");
    assert!(group.any_allows_root);
    assert_eq!(crate::policy::group_rank(group), 0);
    assert_eq!(groups[0].uid, 10_050);
    assert!(group.owner_label.is_some());
    let labels = group
        .members
        .iter()
        .map(|member| member.display_label.as_str())
        .collect::<Vec<_>>();
    assert_eq!(labels, vec!["Sync", "Calendar", "Mail"]);
}

#[test]
fn group_members_should_match_uid_partition() {
    let visible = vec![
        record("com.example.a", 10_001, "A"),
        record("com.example.b", 10_002, "B"),
        record("com.example.c", 10_001, "C"),
        record("com.example.d", 1_010_001, "D"),
    ];
    let store = MemoryProfileStore::new();
    let groups = build_groups(&visible, &store, &SharedUidNaming::new());

    assert_eq!(groups.len(), 3);
    for group in &groups {
        let expected = visible
            .iter()
            .filter(|record| record.uid() == group.uid)
            .map(|record| record.identity.clone())
            .collect::<BTreeSet<_>>();
        let actual = group
            .members
            .iter()
            .map(|record| record.identity.clone())
            .collect::<BTreeSet<_>>();
        assert_eq!(actual, expected);
        assert!(group.members.contains(&group.primary));
        if group.members.len() == 1 {
            assert!(group.owner_label.is_none());
        }
    }
}

#[test]
fn should_unmount_should_come_from_store() {
    let visible = vec![record("com.example.a", 10_001, "A")];
    let store = MemoryProfileStore::new();
    store.set_should_unmount(10_001, true);

    let groups = build_groups(&visible, &store, &SharedUidNaming::new());
    assert!(groups[0].should_unmount);
}

#[test]
fn patch_groups_should_refresh_flags_without_reordering() {
    let visible = vec![
        record("com.example.a", 10_001, "Alpha"),
        record("com.example.b", 10_001, "Bravo"),
    ];
    let store = MemoryProfileStore::new();
    let mut groups = build_groups(&visible, &store, &SharedUidNaming::new());

    let patched_bravo = rooted(visible[1].clone());
    let patches = HashMap::from([(patched_bravo.identity.clone(), patched_bravo.clone())]);
    let touched = patch_groups(&mut groups, &patches);

    assert_eq!(touched, 1);
    let group = &groups[0];
    assert!(group.any_allows_root);
    assert_eq!(group.primary.package_name(), "com.example.a");
    assert_eq!(group.members[1], patched_bravo);
}

#[test]
fn patch_records_should_ignore_unknown_identities() {
    let mut records = vec![record("com.example.a", 10_001, "Alpha")];
    let stranger = rooted(record("com.example.z", 10_009, "Zulu"));
    let patches = HashMap::from([(stranger.identity.clone(), stranger)]);

    assert_eq!(patch_records(&mut records, &patches), 0);
    assert!(records[0].profile.is_none());
}
