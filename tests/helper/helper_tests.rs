use super::*;
use std::io::Cursor;
use std::sync::Mutex;

const USERS_OUTPUT: &str = "Users:\n\tUserInfo{0:Owner:c13} running\n\tUserInfo{10:Work profile:1030} running\n\tUserInfo{11:Guest:814}\n";

const USER0_PACKAGES: &str = "\
package:/data/app/~~a1b2==/com.example.mail-x9==/base.apk=com.example.mail uid:10050
package:/data/app/~~c3d4==/com.example.sync-y8==/base.apk=com.example.sync uid:10050
package:/system/priv-app/Settings/Settings.apk=com.android.settings uid:1000
package:/product/overlay/NavigationBarModeGestural/NavigationBarModeGesturalOverlay.apk=com.android.internal.systemui.navbar.gestural uid:10100
";

const USER10_PACKAGES: &str =
    "package:/data/app/~~e5f6==/com.example.mail-x9==/base.apk=com.example.mail uid:10050\n";

const OVERLAYS: &str = "android\n[x] com.android.internal.systemui.navbar.gestural\n[ ] com.android.theme.icon.square\n";

#[derive(Default)]
struct FakeRunner {
    calls: Mutex<Vec<String>>,
    fail_users: bool,
}

impl CommandRunner for FakeRunner {
    fn run(&self, program: &str, args: &[String]) -> AppResult<String> {
        let command = format!("{program} {}", args.join(" "));
        self.calls
            .lock()
            .expect("lock calls")
            .push(command.clone());
        match command.as_str() {
            "pm list users" if self.fail_users => {
                Err(AppError::new("helper_command_failed", "pm unavailable"))
            }
            "pm list users" => Ok(USERS_OUTPUT.to_string()),
            "pm list packages -U -f --user 0" => Ok(USER0_PACKAGES.to_string()),
            "pm list packages -U -f --user 10" => Ok(USER10_PACKAGES.to_string()),
            command if command.starts_with("cmd overlay list") => Ok(OVERLAYS.to_string()),
            _ => Err(AppError::new("helper_command_failed", "unexpected command")),
        }
    }
}

#[test]
fn should_parse_users_with_running_state() {
    let users = parse_users(USERS_OUTPUT);
    assert_eq!(
        users,
        vec![
            UserLine { id: 0, running: true },
            UserLine { id: 10, running: true },
            UserLine { id: 11, running: false },
        ]
    );
}

#[test]
fn should_parse_packages_and_flag_system_paths() {
    let packages = parse_packages(USER0_PACKAGES, 0);
    assert_eq!(packages.len(), 4);
    assert_eq!(packages[0].package_name, "com.example.mail");
    assert_eq!(packages[0].uid, 10_050);
    assert_eq!(
        packages[0].source_dir.as_deref(),
        Some("/data/app/~~a1b2==/com.example.mail-x9==/base.apk")
    );
    assert!(!packages[0].is_system());
    assert!(packages[2].is_system());
    assert!(packages[3].is_system());

    let secondary = parse_packages(USER10_PACKAGES, 10);
    assert_eq!(secondary[0].uid, 1_010_050);
}

#[test]
fn should_parse_overlay_names_only() {
    let overlays = parse_overlays(OVERLAYS);
    assert_eq!(overlays.len(), 2);
    assert!(overlays.contains("com.android.theme.icon.square"));
    assert!(!overlays.contains("android"));
}

#[test]
fn alive_strategy_should_skip_stopped_users() {
    let backend = PmBackend::new(Box::new(FakeRunner::default()));
    assert_eq!(
        backend
            .list_user_ids(UserQueryStrategy::AliveUsers)
            .expect("alive users"),
        vec![0, 10]
    );
    assert_eq!(
        backend
            .list_user_ids(UserQueryStrategy::UsersExcludingDying)
            .expect("all users"),
        vec![0, 10, 11]
    );
}

#[test]
fn list_packages_should_mark_overlays_and_shared_uids() {
    // user 11 has no canned output, so the listing fails as a whole
    let backend = PmBackend::new(Box::new(FakeRunner::default()));
    assert!(backend.list_packages(0).is_err());

    let backend = PmBackend::new(Box::new(AliveOnlyRunner));
    let packages = backend.list_packages(0).expect("list packages");
    let gestural = packages
        .iter()
        .find(|package| package.package_name == "com.android.internal.systemui.navbar.gestural")
        .expect("overlay listed");
    assert!(gestural.is_resource_overlay());

    let mail = packages
        .iter()
        .find(|package| package.package_name == "com.example.mail" && package.uid == 10_050)
        .expect("mail for user 0");
    assert!(mail.flags.contains(PackageFlags::SHARED_UID));
    let secondary_mail = packages
        .iter()
        .find(|package| package.uid == 1_010_050)
        .expect("mail for user 10");
    assert!(!secondary_mail.flags.contains(PackageFlags::SHARED_UID));
}

/// Reports only running users so every listed user has canned packages.
struct AliveOnlyRunner;

impl CommandRunner for AliveOnlyRunner {
    fn run(&self, program: &str, args: &[String]) -> AppResult<String> {
        if program == "pm" && args.join(" ") == "list users" {
            return Ok(
                "Users:\n\tUserInfo{0:Owner:c13} running\n\tUserInfo{10:Work:1030} running\n"
                    .to_string(),
            );
        }
        FakeRunner::default().run(program, args)
    }
}

#[test]
fn capabilities_should_degrade_without_user_listing() {
    let backend = PmBackend::new(Box::new(FakeRunner {
        fail_users: true,
        ..FakeRunner::default()
    }));
    assert_eq!(
        backend.capabilities().negotiate(),
        UserQueryStrategy::PrimaryOnly
    );
}

#[test]
fn serve_should_answer_until_shutdown() {
    let backend = PmBackend::new(Box::new(FakeRunner::default()));
    let input = Cursor::new(
        [
            r#"{"id":1,"method":"hello"}"#,
            "not json",
            r#"{"id":2,"method":"listUserIds","strategy":"aliveUsers"}"#,
            r#"{"id":3,"method":"shutdown"}"#,
            r#"{"id":4,"method":"hello"}"#,
        ]
        .join("\n"),
    );
    let mut output = Vec::new();

    let handled = serve(&backend, input, &mut output).expect("serve");
    assert_eq!(handled, 4);

    let responses = String::from_utf8(output)
        .expect("utf8 output")
        .lines()
        .map(|line| serde_json::from_str::<WireResponse>(line).expect("decode response"))
        .collect::<Vec<_>>();
    assert_eq!(responses.len(), 4);

    let hello: HelloPayload = responses[0].clone().into_result().expect("hello");
    assert_eq!(hello.protocol_version, PROTOCOL_VERSION);
    assert!(hello.capabilities.alive_users);

    assert!(!responses[1].ok);
    assert_eq!(responses[1].id, 0);

    let users: Vec<i32> = responses[2].clone().into_result().expect("users");
    assert_eq!(users, vec![0, 10]);

    assert_eq!(responses[3].id, 3);
    assert!(responses[3].ok);
}

#[test]
fn serve_should_report_backend_errors_per_request() {
    let backend = PmBackend::new(Box::new(FakeRunner {
        fail_users: true,
        ..FakeRunner::default()
    }));
    let input = Cursor::new(r#"{"id":7,"method":"listUserIds","strategy":"usersExcludingDying"}"#);
    let mut output = Vec::new();

    serve(&backend, input, &mut output).expect("serve");
    let response: WireResponse = serde_json::from_slice(output.trim_ascii()).expect("decode");
    assert_eq!(response.id, 7);
    assert!(!response.ok);
    assert!(
        response
            .error
            .as_deref()
            .is_some_and(|error| error.starts_with("helper_command_failed"))
    );
}

#[test]
fn parsed_packages_should_fall_back_to_package_name_labels() {
    let packages = parse_packages(USER0_PACKAGES, 0);
    assert!(!packages.is_empty());
    for meta in packages {
        assert!(meta.label.is_none());
        let record = sumgr_contracts::models::AppRecord::new(meta.clone(), None);
        assert_eq!(record.display_label, meta.package_name);
    }
}
