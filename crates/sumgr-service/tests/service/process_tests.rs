use super::*;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use sumgr_contracts::ErrorKind;

const HELLO: &str =
    r#"{"id":1,"ok":true,"result":{"protocolVersion":1,"capabilities":{"aliveUsers":true}}}"#;

fn shell_helper(script: &str) -> ProcessServiceBinder {
    ProcessServiceBinder::new(vec!["sh".to_string(), "-c".to_string(), script.to_string()])
}

fn counting_hook() -> (DisconnectHook, Arc<AtomicUsize>) {
    let counter = Arc::new(AtomicUsize::new(0));
    let hook_counter = Arc::clone(&counter);
    let hook: DisconnectHook = Arc::new(move |_reason: &str| {
        hook_counter.fetch_add(1, Ordering::SeqCst);
    });
    (hook, counter)
}

#[test]
fn should_handshake_and_answer_requests() {
    let binder = shell_helper(&format!(
        "read line; echo '{HELLO}'; read line; echo '{{\"id\":2,\"ok\":true,\"result\":[0,10]}}'; read line"
    ));
    let (hook, disconnects) = counting_hook();

    let mut channel = binder.bind(hook).expect("bind helper");
    let capabilities = channel.capabilities().expect("cached capabilities");
    assert_eq!(capabilities.negotiate(), UserQueryStrategy::AliveUsers);

    let ids = channel
        .list_user_ids(UserQueryStrategy::AliveUsers)
        .expect("list users");
    assert_eq!(ids, vec![0, 10]);

    channel.release();
    assert_eq!(disconnects.load(Ordering::SeqCst), 0);
}

#[test]
fn should_notify_disconnect_when_helper_exits() {
    let binder = shell_helper(&format!("read line; echo '{HELLO}'; exit 0"));
    let (hook, disconnects) = counting_hook();

    let mut channel = binder.bind(hook).expect("bind helper");
    let error = channel.list_packages(0).expect_err("helper is gone");
    assert!(!error.message().is_empty());
    assert_eq!(disconnects.load(Ordering::SeqCst), 1);

    let _ = channel.list_packages(0).expect_err("still gone");
    assert_eq!(disconnects.load(Ordering::SeqCst), 1);
}

#[test]
fn should_reject_protocol_mismatch() {
    let binder = shell_helper(
        r#"read line; echo '{"id":1,"ok":true,"result":{"protocolVersion":99,"capabilities":{}}}'; read line"#,
    );
    let (hook, _) = counting_hook();

    let error = binder.bind(hook).err().expect("mismatch rejected");
    assert_eq!(error.kind(), ErrorKind::ServiceUnavailable);
    assert_eq!(error.context_value("actual"), Some("99"));
}

#[test]
fn should_report_missing_helper_as_unavailable() {
    let binder = ProcessServiceBinder::new(vec!["/nonexistent/sumgr-helper".to_string()]);
    let (hook, _) = counting_hook();

    let error = binder.bind(hook).err().expect("spawn fails");
    assert_eq!(error.kind(), ErrorKind::ServiceUnavailable);
    assert_eq!(error.context_value("command"), Some("/nonexistent/sumgr-helper"));
}

#[test]
fn elevated_helper_should_wrap_exe_in_su() {
    let binder = ProcessServiceBinder::elevated_helper(Path::new("/data/local/tmp/sumgr"));
    assert_eq!(
        binder.command(),
        ["su", "-c", "/data/local/tmp/sumgr serve"]
    );
}

#[test]
fn elevated_helper_should_quote_paths_with_spaces() {
    let binder = ProcessServiceBinder::elevated_helper(Path::new("/data/local/tmp/su mgr/it's"));
    assert_eq!(
        binder.command()[2],
        r"'/data/local/tmp/su mgr/it'\''s' serve"
    );
}

#[test]
fn quoted_helper_path_should_survive_the_shell() {
    let dir = std::env::temp_dir().join(format!("sumgr helper {}", std::process::id()));
    std::fs::create_dir_all(&dir).expect("create dir");
    let exe = dir.join("echo args");
    std::fs::write(&exe, "#!/bin/sh\necho \"$1\"\n").expect("write script");
    let mut permissions = std::fs::metadata(&exe).expect("metadata").permissions();
    std::os::unix::fs::PermissionsExt::set_mode(&mut permissions, 0o755);
    std::fs::set_permissions(&exe, permissions).expect("chmod");

    let script = ProcessServiceBinder::elevated_helper(&exe).command()[2].clone();
    let output = std::process::Command::new("sh")
        .args(["-c", script.as_str()])
        .output()
        .expect("run shell");
    let _ = std::fs::remove_dir_all(&dir);

    assert!(output.status.success());
    assert_eq!(String::from_utf8_lossy(&output.stdout).trim(), HELPER_SERVE_ARG);
}
