use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use tempfile::TempDir;

fn run_phasegate(dir: &Path, args: &[&str]) -> std::process::Output {
    Command::new(env!("CARGO_BIN_EXE_phasegate"))
        .current_dir(dir)
        .args(args)
        .output()
        .expect("run phasegate")
}

fn run_hook(dir: &Path, payload: &str) -> std::process::Output {
    let mut child = Command::new(env!("CARGO_BIN_EXE_phasegate"))
        .current_dir(dir)
        .arg("hook")
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()
        .expect("spawn phasegate hook");
    child
        .stdin
        .take()
        .expect("stdin")
        .write_all(payload.as_bytes())
        .expect("write payload");
    child.wait_with_output().expect("wait phasegate hook")
}

fn git(dir: &Path, args: &[&str]) {
    let out = Command::new("git")
        .current_dir(dir)
        .args(args)
        .output()
        .expect("run git");
    assert!(
        out.status.success(),
        "git {:?} failed: {}",
        args,
        String::from_utf8_lossy(&out.stderr)
    );
}

fn setup_repo() -> (TempDir, PathBuf) {
    let tmp = TempDir::new().expect("tmpdir");
    let dir = tmp.path().to_path_buf();
    git(&dir, &["init", "-b", "main"]);
    git(&dir, &["config", "user.name", "Test User"]);
    git(&dir, &["config", "user.email", "test@example.com"]);
    fs::write(dir.join("README.md"), "# app\n").unwrap();
    git(&dir, &["add", "."]);
    git(&dir, &["commit", "-m", "init"]);
    (tmp, dir)
}

fn write_config(dir: &Path, profile: &str, runner_script: &str) {
    fs::create_dir_all(dir.join(".phasegate")).unwrap();
    fs::write(
        dir.join(".phasegate/config.toml"),
        format!(
            "profile = \"{}\"\n\n\
             [runner]\n\
             command = \"sh\"\n\
             args = [\"-c\", \"{}\"]\n\
             timeout_secs = 60\n\
             reset = []\n",
            profile, runner_script
        ),
    )
    .unwrap();
}

fn stage_ui_change(dir: &Path) {
    fs::create_dir_all(dir.join("Views")).unwrap();
    fs::write(dir.join("Views/Home.swift"), "struct HomeView {}\n").unwrap();
    git(dir, &["add", "Views/Home.swift"]);
}

fn stage_ui_test(dir: &Path) {
    fs::create_dir_all(dir.join("AppUITests")).unwrap();
    fs::write(
        dir.join("AppUITests/HomeUITests.swift"),
        "final class HomeUITests {}\n",
    )
    .unwrap();
    git(dir, &["add", "AppUITests/HomeUITests.swift"]);
}

const COMMIT_PAYLOAD: &str =
    r#"{"tool_name":"Bash","tool_input":{"command":"git commit -m 'add home view'"}}"#;

#[test]
fn commit_with_ui_change_and_no_ui_test_blocks() {
    let (_tmp, dir) = setup_repo();
    write_config(&dir, "strict", "echo '** TEST SUCCEEDED **'");
    stage_ui_change(&dir);

    let out = run_hook(&dir, COMMIT_PAYLOAD);
    assert_eq!(out.status.code(), Some(2));
    let stderr = String::from_utf8_lossy(&out.stderr);
    assert!(stderr.contains("GIT-TRUTH GATE"), "stderr: {}", stderr);
    assert!(stderr.contains("Views/Home.swift"));
}

#[test]
fn commit_with_ui_test_and_passing_run_allows() {
    let (_tmp, dir) = setup_repo();
    write_config(&dir, "strict", "echo '** TEST SUCCEEDED **'");
    stage_ui_change(&dir);
    stage_ui_test(&dir);

    let out = run_hook(&dir, COMMIT_PAYLOAD);
    assert_eq!(
        out.status.code(),
        Some(0),
        "stderr: {}",
        String::from_utf8_lossy(&out.stderr)
    );

    // The run outcome is persisted for status and reuse.
    let record = fs::read_to_string(dir.join(".phasegate/test_run_state.json")).unwrap();
    assert!(record.contains("\"success\": true"));
    assert!(record.contains("Views/Home.swift"));
}

#[test]
fn commit_with_failing_run_blocks_and_names_cases() {
    let (_tmp, dir) = setup_repo();
    write_config(
        &dir,
        "strict",
        "echo \\\"Test Case '-[HomeUITests testTap]' failed (0.2 seconds)\\\"; \
         echo '** TEST FAILED **'; exit 65",
    );
    stage_ui_change(&dir);
    stage_ui_test(&dir);

    let out = run_hook(&dir, COMMIT_PAYLOAD);
    assert_eq!(out.status.code(), Some(2));
    let stderr = String::from_utf8_lossy(&out.stderr);
    assert!(stderr.contains("COMMIT GATE"), "stderr: {}", stderr);
    assert!(stderr.contains("testTap"));
}

#[test]
fn non_ui_commit_skips_the_runner() {
    let (_tmp, dir) = setup_repo();
    // A runner that would fail loudly if it ever ran.
    write_config(&dir, "strict", "exit 70");
    fs::create_dir_all(dir.join("Services")).unwrap();
    fs::write(dir.join("Services/Sync.swift"), "struct Sync {}\n").unwrap();
    git(&dir, &["add", "Services/Sync.swift"]);

    let out = run_hook(&dir, COMMIT_PAYLOAD);
    assert_eq!(
        out.status.code(),
        Some(0),
        "stderr: {}",
        String::from_utf8_lossy(&out.stderr)
    );
    assert!(!dir.join(".phasegate/test_run_state.json").exists());
}

#[test]
fn amend_commit_is_not_gated() {
    let (_tmp, dir) = setup_repo();
    write_config(&dir, "strict", "exit 70");
    stage_ui_change(&dir);

    let payload = r#"{"tool_name":"Bash","tool_input":{"command":"git commit --amend --no-edit"}}"#;
    let out = run_hook(&dir, payload);
    assert_eq!(out.status.code(), Some(0));
}

#[test]
fn persisting_infra_flake_blocks_under_strict() {
    let (_tmp, dir) = setup_repo();
    write_config(&dir, "strict", "exit 64");
    stage_ui_change(&dir);
    stage_ui_test(&dir);

    let out = run_hook(&dir, COMMIT_PAYLOAD);
    assert_eq!(out.status.code(), Some(2));
    let stderr = String::from_utf8_lossy(&out.stderr);
    assert!(stderr.contains("environment unusable"), "stderr: {}", stderr);
}

#[test]
fn persisting_infra_flake_warns_and_allows_under_lenient() {
    let (_tmp, dir) = setup_repo();
    write_config(&dir, "lenient", "exit 64");
    stage_ui_change(&dir);
    stage_ui_test(&dir);

    let out = run_hook(&dir, COMMIT_PAYLOAD);
    assert_eq!(
        out.status.code(),
        Some(0),
        "stderr: {}",
        String::from_utf8_lossy(&out.stderr)
    );
    let stderr = String::from_utf8_lossy(&out.stderr);
    assert!(stderr.contains("WARNING"), "stderr: {}", stderr);
}

#[test]
fn lenient_reuses_a_fresh_covering_run() {
    let (_tmp, dir) = setup_repo();
    // A runner that would fail if invoked: reuse must skip it.
    write_config(&dir, "lenient", "exit 70");
    stage_ui_change(&dir);
    stage_ui_test(&dir);

    let now = std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap()
        .as_secs();
    fs::write(
        dir.join(".phasegate/test_run_state.json"),
        format!(
            "{{\"last_run_epoch\": {}, \"success\": true, \
              \"tested_files\": [\"Views/Home.swift\", \"AppUITests/HomeUITests.swift\"], \
              \"summary\": \"UI tests passed\"}}",
            now - 60
        ),
    )
    .unwrap();

    let out = run_hook(&dir, COMMIT_PAYLOAD);
    assert_eq!(
        out.status.code(),
        Some(0),
        "stderr: {}",
        String::from_utf8_lossy(&out.stderr)
    );
}

#[test]
fn strict_ignores_a_recorded_run_and_reruns() {
    let (_tmp, dir) = setup_repo();
    write_config(&dir, "strict", "exit 70");
    stage_ui_change(&dir);
    stage_ui_test(&dir);

    let now = std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap()
        .as_secs();
    fs::write(
        dir.join(".phasegate/test_run_state.json"),
        format!(
            "{{\"last_run_epoch\": {}, \"success\": true, \
              \"tested_files\": [\"Views/Home.swift\", \"AppUITests/HomeUITests.swift\"], \
              \"summary\": \"UI tests passed\"}}",
            now - 60
        ),
    )
    .unwrap();

    // always-rerun invokes the (failing) runner and blocks.
    let out = run_hook(&dir, COMMIT_PAYLOAD);
    assert_eq!(out.status.code(), Some(2));
}

#[test]
fn write_side_ui_gate_counts_the_in_flight_file() {
    let (_tmp, dir) = setup_repo();
    write_config(&dir, "strict", "echo '** TEST SUCCEEDED **'");
    run_phasegate(&dir, &["phase", "set", "implementing"]);
    run_phasegate(&dir, &["mark", "tests-written", "--user-verified"]);

    // Writing a UI file with no UI test anywhere in the change set blocks.
    let payload =
        r#"{"tool_name":"Write","tool_input":{"file_path":"Views/Settings.swift"}}"#;
    let out = run_hook(&dir, payload);
    assert_eq!(out.status.code(), Some(2));
    assert!(String::from_utf8_lossy(&out.stderr).contains("GIT-TRUTH GATE"));

    // Once a UI test is staged the same write passes.
    stage_ui_test(&dir);
    let out = run_hook(&dir, payload);
    assert_eq!(
        out.status.code(),
        Some(0),
        "stderr: {}",
        String::from_utf8_lossy(&out.stderr)
    );
}

#[test]
fn validate_command_runs_the_commit_gate_and_records_validation() {
    let (_tmp, dir) = setup_repo();
    write_config(&dir, "strict", "echo '** TEST SUCCEEDED **'");
    stage_ui_change(&dir);
    stage_ui_test(&dir);

    let out = run_phasegate(&dir, &["validate"]);
    assert_eq!(
        out.status.code(),
        Some(0),
        "stderr: {}",
        String::from_utf8_lossy(&out.stderr)
    );
    let state = fs::read_to_string(dir.join(".phasegate/workflow_state.json")).unwrap();
    assert!(state.contains("\"validated\": true"));
    assert!(state.contains("\"current_phase\": \"validating\""));
}

#[test]
fn status_finds_the_run_record_from_a_subdirectory() {
    let (_tmp, dir) = setup_repo();
    write_config(&dir, "strict", "echo '** TEST SUCCEEDED **'");
    stage_ui_change(&dir);
    stage_ui_test(&dir);
    let out = run_hook(&dir, COMMIT_PAYLOAD);
    assert_eq!(out.status.code(), Some(0));

    // The record lives at the repo root; status invoked deeper in the
    // tree must still find it.
    let out = run_phasegate(&dir.join("Views"), &["status"]);
    assert!(out.status.success());
    let stdout = String::from_utf8_lossy(&out.stdout);
    assert!(stdout.contains("last test run"), "stdout: {}", stdout);
    assert!(stdout.contains("UI tests passed"), "stdout: {}", stdout);
}

#[test]
fn test_run_is_recorded_in_the_audit_trail() {
    let (_tmp, dir) = setup_repo();
    write_config(&dir, "strict", "echo '** TEST SUCCEEDED **'");
    stage_ui_change(&dir);
    stage_ui_test(&dir);

    run_hook(&dir, COMMIT_PAYLOAD);
    let events = fs::read_to_string(dir.join(".phasegate/gate.events.jsonl")).unwrap();
    assert!(events.contains("test.run"));
    assert!(events.contains("\"success\":true"));
}
