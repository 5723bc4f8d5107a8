//! End-to-end tests for the `kiln` binary

use assert_cmd::Command;
use predicates::prelude::*;
use std::fs;
use std::path::Path;
use tempfile::TempDir;

const BASE_CONFIG: &str = r#"
[[compilers]]
version = "0.8.18"
optimizer = { enabled = true, runs = 200 }

[[compilers]]
version = "0.7.6"

[overrides."src/Legacy.sol"]
version = "0.7.6"

[networks.tiny]
allow_unlimited_contract_size = false
max_artifact_size = 1

[networks.devnet]
allow_unlimited_contract_size = true
"#;

fn project(extra: &str) -> TempDir {
    let dir = TempDir::new().unwrap();
    fs::write(dir.path().join("kiln.toml"), format!("{}{}", BASE_CONFIG, extra)).unwrap();
    fs::create_dir_all(dir.path().join("src")).unwrap();
    fs::write(
        dir.path().join("src/Token.sol"),
        "pragma solidity ^0.8.0;\ncontract Token {}\n",
    )
    .unwrap();
    fs::write(
        dir.path().join("src/Legacy.sol"),
        "pragma solidity >=0.7.0 <0.9.0;\ncontract Legacy {}\n",
    )
    .unwrap();
    dir
}

fn kiln(dir: &Path) -> Command {
    let mut cmd = Command::cargo_bin("kiln").unwrap();
    cmd.current_dir(dir)
        .env_remove("KILN_NETWORK")
        .env_remove("KILN_JSON")
        .env_remove("KILN_LOG")
        .env_remove("KILN_SOURCES")
        .env_remove("KILN_CACHE")
        .env_remove("KILN_JOBS")
        .env("NO_COLOR", "1");
    cmd
}

#[test]
fn test_help() {
    Command::cargo_bin("kiln")
        .unwrap()
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("EXIT CODES"));
}

#[test]
fn test_plan_lists_every_source() {
    let dir = project("");
    kiln(dir.path())
        .arg("plan")
        .assert()
        .success()
        .stdout(predicate::str::contains("src/Token.sol"))
        .stdout(predicate::str::contains("src/Legacy.sol"))
        .stdout(predicate::str::contains("override"))
        .stdout(predicate::str::contains("2 file(s) in 2 batch(es)"));
}

#[test]
fn test_plan_json() {
    let dir = project("");
    let output = kiln(dir.path()).args(["plan", "--json"]).output().unwrap();
    assert!(output.status.success());

    let plan: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    let files = plan["files"].as_array().unwrap();
    assert_eq!(files.len(), 2);
    assert_eq!(files[0]["path"], "src/Legacy.sol");
    assert_eq!(files[0]["source"], "override");
    assert_eq!(files[1]["source"], "default");
    assert_eq!(plan["batches"].as_array().unwrap().len(), 2);
}

#[test]
fn test_unknown_network_is_config_error() {
    let dir = project("");
    kiln(dir.path())
        .args(["build", "--network", "sepolia"])
        .assert()
        .code(96)
        .stderr(predicate::str::contains("sepolia"));
}

#[test]
fn test_missing_config_is_config_error() {
    let dir = TempDir::new().unwrap();
    kiln(dir.path()).arg("plan").assert().code(96);
}

#[test]
fn test_missing_compiler_is_partial_failure() {
    let dir = project("\n[compiler]\ncommand = \"kiln-test-no-such-solc-{version}\"\n");
    kiln(dir.path())
        .args(["build", "--network", "devnet"])
        .assert()
        .code(100)
        .stdout(predicate::str::contains("kiln-test-no-such-solc-0.8.18"));
}

#[cfg(unix)]
mod fake_solc {
    use super::*;
    use std::os::unix::fs::PermissionsExt;

    const OUTPUT: &str = r#"{"contracts":{"src/Token.sol":{"Token":{"abi":[],"evm":{"bytecode":{"object":"6080"},"deployedBytecode":{"object":"6080"}}}},"src/Legacy.sol":{"Legacy":{"abi":[],"evm":{"bytecode":{"object":"6080"},"deployedBytecode":{"object":"60"}}}}}}"#;

    /// Project whose compiler is a script echoing canned standard-json output
    fn project_with_fake_solc() -> TempDir {
        let dir = TempDir::new().unwrap();
        let script = dir.path().join("fake-solc");
        fs::write(&script, format!("#!/bin/sh\ncat >/dev/null\necho '{}'\n", OUTPUT)).unwrap();
        fs::set_permissions(&script, fs::Permissions::from_mode(0o755)).unwrap();

        let extra = format!("\n[compiler]\ncommand = \"{}\"\n", script.display());
        fs::write(dir.path().join("kiln.toml"), format!("{}{}", BASE_CONFIG, extra)).unwrap();
        fs::create_dir_all(dir.path().join("src")).unwrap();
        fs::write(
            dir.path().join("src/Token.sol"),
            "pragma solidity ^0.8.0;\ncontract Token {}\n",
        )
        .unwrap();
        fs::write(
            dir.path().join("src/Legacy.sol"),
            "pragma solidity ^0.7.0;\ncontract Legacy {}\n",
        )
        .unwrap();
        dir
    }

    #[test]
    fn test_build_succeeds() {
        let dir = project_with_fake_solc();
        kiln(dir.path())
            .args(["build", "--network", "devnet"])
            .assert()
            .success()
            .stdout(predicate::str::contains("2 contract(s)"));

        let artifacts = dir.path().join("cache_kiln/artifacts/src");
        assert!(artifacts.is_dir());
        assert!(dir.path().join("cache_kiln/validation-report.json").is_file());
        assert!(dir.path().join("cache_kiln/build-info.json").is_file());
        assert!(!dir.path().join("cache_kiln/.kiln-lock").exists());
    }

    #[test]
    fn test_build_json_report() {
        let dir = project_with_fake_solc();
        let output = kiln(dir.path())
            .args(["build", "--network", "devnet", "--json"])
            .output()
            .unwrap();
        assert_eq!(output.status.code(), Some(0));

        let report: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
        assert_eq!(report["status"], "success");
        assert_eq!(report["network"], "devnet");
        assert_eq!(report["batches"].as_array().unwrap().len(), 2);
        assert_eq!(report["artifacts"].as_array().unwrap().len(), 2);
    }

    #[test]
    fn test_size_limit_is_fatal() {
        let dir = project_with_fake_solc();
        kiln(dir.path())
            .args(["build", "--network", "tiny"])
            .assert()
            .code(101)
            .stderr(predicate::str::contains("src/Token.sol:Token"));

        // The report is on disk even though the build was aborted
        let report = fs::read_to_string(dir.path().join("cache_kiln/validation-report.json")).unwrap();
        let report: serde_json::Value = serde_json::from_str(&report).unwrap();
        assert_eq!(report["enforced"], true);
        assert!(!dir.path().join("cache_kiln/artifacts").exists());
    }

    #[test]
    fn test_network_from_env() {
        let dir = project_with_fake_solc();
        kiln(dir.path())
            .env("KILN_NETWORK", "tiny")
            .arg("build")
            .assert()
            .code(101);
    }
}
