//! Tests for the `ctester-peer` command line.

use std::io::Write;
use std::process::{Command, Stdio};

use ctester::peer::{ChunkRole, NetworkChunk, PeerExit, Transaction, TransactionSet};

fn peer_bin() -> Command {
    let mut cmd = Command::new(env!("CARGO_BIN_EXE_ctester-peer"));
    cmd.env_remove("CTESTER_LOG_FORMAT")
        .env_remove("CTESTER_LEDGER_CAPACITY");
    cmd
}

#[test]
fn test_version_prints_package_version() {
    let out = peer_bin().arg("version").output().unwrap();
    assert!(out.status.success());
    let text = String::from_utf8(out.stdout).unwrap();
    assert!(text.contains(env!("CARGO_PKG_VERSION")));
}

#[test]
fn test_check_accepts_written_script() {
    let script = TransactionSet::new(vec![
        Transaction::new(vec![NetworkChunk::send(*b"GET /\r\n")]).then(NetworkChunk::expect(
            vec![0x48, 0x54, 0x54, 0x50],
        )),
    ]);
    let mut file = tempfile::NamedTempFile::new().unwrap();
    file.write_all(script.to_toml_string().unwrap().as_bytes())
        .unwrap();

    let parsed = TransactionSet::from_toml_file(file.path()).unwrap();
    assert_eq!(parsed, script);
    assert_eq!(parsed.transactions[0].chunks[1].role, ChunkRole::Expect);

    let out = peer_bin().arg("check").arg(file.path()).output().unwrap();
    assert!(out.status.success());
    let text = String::from_utf8(out.stdout).unwrap();
    assert!(text.starts_with("transactions=1 chunks=2"));
}

#[test]
fn test_check_rejects_bad_hex() {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    file.write_all(b"[[transactions]]\n[[transactions.chunks]]\nrole = \"send\"\npayload = \"zz\"\n")
        .unwrap();
    let out = peer_bin().arg("check").arg(file.path()).output().unwrap();
    assert_eq!(out.status.code(), Some(1));
}

#[test]
fn test_config_defaults_lists_keys() {
    let out = peer_bin().args(["config", "defaults"]).output().unwrap();
    assert!(out.status.success());
    let text = String::from_utf8(out.stdout).unwrap();
    assert!(text.contains("CTESTER_LEDGER_CAPACITY=4096"));
    assert!(text.contains("CTESTER_LOG_FORMAT=pretty"));
}

#[test]
fn test_config_show_applies_env() {
    let out = peer_bin()
        .args(["config", "show"])
        .env("CTESTER_LEDGER_CAPACITY", "64")
        .output()
        .unwrap();
    let text = String::from_utf8(out.stdout).unwrap();
    assert!(text.contains("CTESTER_LEDGER_CAPACITY=64"));
}

#[test]
fn test_run_without_launch_request_is_runtime_error() {
    let out = peer_bin()
        .arg("run")
        .stdin(Stdio::null())
        .output()
        .unwrap();
    assert_eq!(PeerExit::from_status(out.status), PeerExit::RuntimeError);
    assert!(out.stdout.is_empty());
}

#[test]
fn test_help_lists_every_variable() {
    let out = peer_bin().arg("help").output().unwrap();
    assert!(out.status.success());
    let text = String::from_utf8(out.stderr).unwrap();
    for key in [
        "CTESTER_LEDGER_CAPACITY",
        "CTESTER_CHECK_RESOLUTIONS",
        "CTESTER_PEER_BIN",
        "CTESTER_PEER_CONNECT_ATTEMPTS",
        "CTESTER_PEER_CONNECT_DELAY_MS",
        "CTESTER_PEER_OVERFLOW_WINDOW",
        "CTESTER_LOG_LEVEL",
        "CTESTER_LOG_FORMAT",
    ] {
        assert!(text.contains(key), "missing {key}");
    }
}

#[test]
fn test_unknown_command_fails() {
    let out = peer_bin().arg("serve").output().unwrap();
    assert!(!out.status.success());
}
