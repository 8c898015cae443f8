use super::*;
use crate::models::*;

fn profile(allow_su: bool, root_default: bool, non_root_default: bool) -> Profile {
    Profile {
        allow_su,
        root_use_default: root_default,
        non_root_use_default: non_root_default,
        ..Profile::for_package("com.example", 10_050)
    }
}

#[test]
fn absent_profile_never_reports_root_or_custom() {
    let record = AppRecord::new(PackageMeta::new("com.example", 10_050), None);
    assert!(!record.allows_root());
    assert!(!record.has_custom_profile());
}

#[test]
fn custom_profile_depends_on_active_branch() {
    let root_custom = AppRecord::new(
        PackageMeta::new("com.example", 10_050),
        Some(profile(true, false, true)),
    );
    assert!(root_custom.allows_root());
    assert!(root_custom.has_custom_profile());

    let root_default = root_custom.with_profile(Some(profile(true, true, false)));
    assert!(root_default.allows_root());
    assert!(!root_default.has_custom_profile());

    let non_root_custom = root_custom.with_profile(Some(profile(false, true, false)));
    assert!(!non_root_custom.allows_root());
    assert!(non_root_custom.has_custom_profile());
}

#[test]
fn with_profile_keeps_identity_and_meta() {
    let mut meta = PackageMeta::new("com.example", 1_010_050);
    meta.label = Some("  Example  ".to_string());
    meta.flags = PackageFlags::SYSTEM.union(PackageFlags::SHARED_UID);
    let record = AppRecord::new(meta.clone(), None);
    let updated = record.with_profile(Some(profile(true, true, true)));

    assert_eq!(updated.display_label, "Example");
    assert_eq!(updated.identity, record.identity);
    assert_eq!(updated.meta, meta);
    assert_eq!(updated.user_index(), 10);
    assert!(updated.is_system_app());
}

#[test]
fn label_falls_back_to_package_name() {
    let mut meta = PackageMeta::new("com.example.tool", 10_001);
    meta.label = Some("   ".to_string());
    assert_eq!(AppRecord::new(meta, None).display_label, "com.example.tool");
}

#[test]
fn error_kind_serializes_camel_case() {
    let text = serde_json::to_string(&ErrorKind::RemoteCallFailed).expect("serialize kind");
    assert_eq!(text, "\"remoteCallFailed\"");
}
