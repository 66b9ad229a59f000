use std::path::Path;

use assert_cmd::Command;
use eyre::Context as _;
use predicates::prelude::*;

fn keyring_cmd(cfg_dir: &Path, data_dir: &Path) -> Command {
    let mut cmd = Command::new(assert_cmd::cargo::cargo_bin!("observer-keyring"));
    cmd.env("OBSERVER_KEYRING_CONFIG_DIR", cfg_dir)
        .env("OBSERVER_KEYRING_DATA_DIR", data_dir)
        .env_remove("OBSERVER_KEYRING_BUILD_MODE")
        .env_remove("OBSERVER_KEYRING_DAPP_ORIGIN_PRODUCTION")
        .env_remove("OBSERVER_KEYRING_DAPP_ORIGIN_DEVELOPMENT");
    cmd
}

#[test]
fn serve_refuses_to_start_without_an_app_origin() -> eyre::Result<()> {
    let cfg_dir = tempfile::tempdir()?;
    let data_dir = tempfile::tempdir()?;

    keyring_cmd(cfg_dir.path(), data_dir.path())
        .args(["serve", "--ephemeral", "--build-mode", "production"])
        .write_stdin("")
        .assert()
        .failure()
        .stderr(predicate::str::contains("dapp_origin_production is not set"));
    Ok(())
}

#[test]
fn accounts_persist_across_invocations() -> eyre::Result<()> {
    let cfg_dir = tempfile::tempdir()?;
    let data_dir = tempfile::tempdir()?;
    let address = "0x7777777777777777777777777777777777777777";

    let out = keyring_cmd(cfg_dir.path(), data_dir.path())
        .args(["accounts", "create", address])
        .output()
        .context("run accounts create")?;
    assert!(
        out.status.success(),
        "accounts create failed: {}",
        String::from_utf8_lossy(&out.stderr)
    );
    let created: serde_json::Value = serde_json::from_slice(&out.stdout)?;
    assert_eq!(created["address"], serde_json::json!(address));
    assert!(
        data_dir.path().join("keyring_state.json").exists(),
        "state file should be written through"
    );

    let out = keyring_cmd(cfg_dir.path(), data_dir.path())
        .args(["accounts", "list"])
        .output()
        .context("run accounts list")?;
    let listed: serde_json::Value = serde_json::from_slice(&out.stdout)?;
    assert_eq!(listed, serde_json::json!([created]));

    keyring_cmd(cfg_dir.path(), data_dir.path())
        .args(["accounts", "create", address])
        .assert()
        .failure()
        .stderr(predicate::str::contains("already exists"));
    Ok(())
}

#[test]
fn paths_reports_the_overridden_dirs() -> eyre::Result<()> {
    let cfg_dir = tempfile::tempdir()?;
    let data_dir = tempfile::tempdir()?;

    let out = keyring_cmd(cfg_dir.path(), data_dir.path())
        .arg("paths")
        .output()
        .context("run paths")?;
    assert!(out.status.success(), "paths exited non-zero");
    let v: serde_json::Value = serde_json::from_slice(&out.stdout)?;
    assert_eq!(
        v["data_dir"].as_str().map(Path::new),
        Some(data_dir.path()),
        "{v}"
    );
    assert!(
        cfg_dir.path().join("config.toml").exists(),
        "first run writes the default config"
    );
    Ok(())
}
