//! Binary-level exit code contract.

use assert_cmd::Command;

fn acctsync() -> Command {
    let mut cmd = Command::cargo_bin("acctsync").unwrap();
    for var in [
        "ACCTSYNC_CREDS",
        "ACCTSYNC_PROFILE",
        "ACCTSYNC_ENDPOINT",
        "ACCTSYNC_TOKEN",
        "RUST_LOG",
    ] {
        cmd.env_remove(var);
    }
    cmd
}

#[test]
fn test_missing_file_argument_is_usage_error() {
    let output = acctsync().arg("export").output().unwrap();
    assert_eq!(output.status.code(), Some(2));
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("Usage"), "stderr: {stderr}");
}

#[test]
fn test_import_without_file_is_usage_error() {
    let output = acctsync().arg("import").output().unwrap();
    assert_eq!(output.status.code(), Some(2));
}

#[test]
fn test_missing_credentials_is_config_error() {
    let dir = tempfile::TempDir::new().unwrap();
    let output = acctsync()
        .current_dir(dir.path())
        .args(["--creds", "does-not-exist.json", "export", "out.csv"])
        .output()
        .unwrap();
    assert_eq!(output.status.code(), Some(3));
    assert!(!dir.path().join("out.csv").exists());
}

#[test]
fn test_missing_profile_is_config_error_json() {
    let dir = tempfile::TempDir::new().unwrap();
    let creds = dir.path().join("creds.json");
    std::fs::write(&creds, r#"{"prod": {"endpoint": "x", "token": "y"}}"#).unwrap();

    let output = acctsync()
        .current_dir(dir.path())
        .arg("--json")
        .arg("--creds")
        .arg(&creds)
        .arg("delete-all")
        .output()
        .unwrap();
    assert_eq!(output.status.code(), Some(3));
    let err: serde_json::Value = serde_json::from_slice(&output.stderr).unwrap();
    assert_eq!(err["error"]["code"], "CONFIG_ERROR");
}

#[test]
fn test_out_of_range_batch_size_is_usage_error() {
    let dir = tempfile::TempDir::new().unwrap();
    let creds = dir.path().join("creds.json");
    std::fs::write(&creds, r#"{"sandbox": {"endpoint": "x", "token": "y"}}"#).unwrap();

    let output = acctsync()
        .current_dir(dir.path())
        .arg("--json")
        .arg("--creds")
        .arg(&creds)
        .args(["import", "accounts.csv", "--batch-size", "0"])
        .output()
        .unwrap();
    assert_eq!(output.status.code(), Some(2));
    let err: serde_json::Value = serde_json::from_slice(&output.stderr).unwrap();
    assert_eq!(err["error"]["code"], "INVALID_ARGUMENT");
}

#[test]
fn test_version() {
    let output = acctsync().arg("version").output().unwrap();
    assert!(output.status.success());
    assert!(String::from_utf8_lossy(&output.stdout).starts_with("acctsync "));
}
