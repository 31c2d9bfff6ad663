use std::process::Command;

fn run_vasm(args: &[&str]) -> (String, String, bool) {
    let output = Command::new(env!("CARGO_BIN_EXE_vasm"))
        .args(args)
        .output()
        .expect("failed to execute vasm");

    let stdout = String::from_utf8_lossy(&output.stdout).to_string();
    let stderr = String::from_utf8_lossy(&output.stderr).to_string();
    (stdout, stderr, output.status.success())
}

fn assert_success(args: &[&str]) -> String {
    let (stdout, stderr, success) = run_vasm(args);
    assert!(success, "vasm {:?} should succeed, stderr:\n{}", args, stderr);
    stdout
}

#[test]
fn test_info_text() {
    let stdout = assert_success(&["info"]);
    assert!(stdout.contains("int args:"));
    #[cfg(target_arch = "x86_64")]
    assert!(stdout.contains("6 (rdi, rsi, rdx, rcx, r8, r9)"));
    #[cfg(target_arch = "aarch64")]
    assert!(stdout.contains("8 (x0, x1, x2, x3, x4, x5, x6, x7)"));
}

#[test]
fn test_info_json() {
    let stdout = assert_success(&["info", "--json"]);
    let value: serde_json::Value = serde_json::from_str(&stdout).unwrap();
    assert_eq!(value["abi"]["float_args"].as_array().unwrap().len(), 8);
    assert!(value["page_size"].as_u64().unwrap() >= 4096);
}

#[test]
fn test_probe() {
    assert_eq!(assert_success(&["probe", "40", "2"]), "42\n");
    assert_eq!(assert_success(&["probe", "-10", "3"]), "-7\n");
}

#[test]
fn test_probe_with_config() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("vasm.toml");
    std::fs::write(&path, "page_size = 4096\ntrace = true\n").unwrap();

    let (stdout, stderr, success) = run_vasm(&["probe", "1", "2", "--config", path.to_str().unwrap()]);
    assert!(success, "stderr:\n{}", stderr);
    assert_eq!(stdout, "3\n");
    assert!(stderr.contains("finalized code page"));
}

#[test]
fn test_bad_config_fails() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("vasm.toml");
    std::fs::write(&path, "page_size = 0\n").unwrap();

    let (_, stderr, success) = run_vasm(&["probe", "1", "2", "--config", path.to_str().unwrap()]);
    assert!(!success);
    assert!(stderr.contains("page_size"));
}

#[test]
fn test_unmappable_page_size_exits() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("vasm.toml");
    std::fs::write(&path, "page_size = 4611686018427387904\n").unwrap();

    let (stdout, stderr, success) = run_vasm(&["probe", "1", "2", "--config", path.to_str().unwrap()]);
    assert!(!success);
    assert!(stdout.is_empty());
    assert!(stderr.contains("cannot obtain executable memory"), "stderr:\n{}", stderr);
}

#[test]
fn test_stress() {
    let stdout = assert_success(&["stress", "--threads", "16", "--chunk", "128"]);
    assert_eq!(stdout, "ok: 16 threads x 128 bytes\n");
}
