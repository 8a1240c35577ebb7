//! CLI contract tests.

use assert_cmd::Command;

fn cli() -> Command {
    let mut cmd = Command::cargo_bin("self-defence").expect("binary should build");
    cmd.env_remove("SELF_DEFENCE_CONFIG")
        .env_remove("SELF_DEFENCE_LOG_DIR")
        .env_remove("RUST_LOG");
    cmd
}

fn config_file(contents: &str) -> (tempfile::TempDir, std::path::PathBuf) {
    let tmp = tempfile::tempdir().expect("should create temp dir");
    let path = tmp.path().join("self-defence.toml");
    std::fs::write(&path, contents).expect("should write config");
    (tmp, path)
}

fn stdout_of(output: &std::process::Output) -> String {
    String::from_utf8_lossy(&output.stdout).into_owned()
}

#[test]
fn check_without_region_reports_disabled_filter() {
    let (_tmp, path) = config_file("[logging]\nlevel = \"warn\"\n");
    let output = cli()
        .arg("--config")
        .arg(&path)
        .arg("check")
        .output()
        .expect("should run");
    assert!(output.status.success());
    let stdout = stdout_of(&output);
    assert!(stdout.contains("region: not declared, filter disabled"));
    assert!(stdout.contains("main: offset 0 (unset), 0 action(s) (unset)"));
    assert!(stdout.contains("configuration ok"));
}

#[test]
fn check_fails_on_invalid_ratio() {
    let (_tmp, path) = config_file(
        "[region]\nkey = 1\n\n[[main.action]]\nvalue = 1\ntarget = \"/x\"\nratio = 150\n",
    );
    let output = cli()
        .arg("--config")
        .arg(&path)
        .arg("check")
        .output()
        .expect("should run");
    assert!(!output.status.success());
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("invalid sampling ratio 150"));
}

#[test]
fn check_fails_on_missing_explicit_config() {
    let tmp = tempfile::tempdir().expect("should create temp dir");
    let output = cli()
        .arg("--config")
        .arg(tmp.path().join("absent.toml"))
        .arg("check")
        .output()
        .expect("should run");
    assert!(!output.status.success());
}

#[test]
fn probe_without_region_passes() {
    let (_tmp, path) = config_file("");
    let output = cli()
        .arg("--config")
        .arg(&path)
        .args(["probe", "--server", "www", "--connection-id", "7", "--json"])
        .output()
        .expect("should run");
    assert!(output.status.success());
    assert_eq!(stdout_of(&output).trim(), r#"{"verdict":"pass"}"#);
}

#[test]
fn dump_without_region_fails() {
    let (_tmp, path) = config_file("");
    let output = cli()
        .arg("--config")
        .arg(&path)
        .arg("dump")
        .output()
        .expect("should run");
    assert!(!output.status.success());
}
