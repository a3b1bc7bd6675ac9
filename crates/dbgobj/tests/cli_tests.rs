use std::{fs, path::PathBuf};

use assert_cmd::Command;
use predicates::prelude::*;
use tempfile::TempDir;
use tracing::info;

const SESSION: &str = r#"
[runtime]
process_id = 100
name = "CoreCLR"

[[metadata.types]]
module = "app"
token = 0x02000002
name = "App.Program"
methods = [
    { module = "app", token = 0x06000001, name = "Main" },
    { module = "app", token = 0x06000002, name = "Run" },
]

[[steps]]
action = "module"
label = "app"
info = { name = "app", filename = "app.dll", address = 0x1000 }

[[steps]]
action = "breakpoints"
selection = [{ kind = "type", module = "app", token = 0x02000002 }]

[[steps]]
action = "breakpoints"
selection = [{ kind = "method", module = "app", token = 0x06000001 }]

[[steps]]
action = "bind"
requests = [
    { location = "app!app.dll:0x06000001+0", module = "app", address = 0x1100 },
    { location = "app!app.dll:0x06000042+0" },
]
"#;

/// Temp directory holding an empty config file and the given scenario.
fn setup(scenario: &str) -> (TempDir, PathBuf, PathBuf) {
    let dir = tempfile::tempdir().unwrap();
    let config = dir.path().join("config.toml");
    fs::write(&config, "").unwrap();
    let path = dir.path().join("scenario.toml");
    fs::write(&path, scenario).unwrap();
    (dir, config, path)
}

fn dbgobj(config: &PathBuf) -> Command {
    let mut cmd = Command::cargo_bin("dbgobj").unwrap();
    cmd.arg("--config").arg(config);
    cmd
}

#[test]
fn test_help_command() {
    dbgobj_common::logging::ensure_test_logging(None);
    info!("Running test");
    let mut cmd = Command::cargo_bin("dbgobj").unwrap();
    cmd.arg("--help").assert().success().stdout(predicate::str::contains("Debugger Object Model"));
}

#[test]
fn test_version_command() {
    dbgobj_common::logging::ensure_test_logging(None);
    info!("Running test");
    let mut cmd = Command::cargo_bin("dbgobj").unwrap();
    cmd.arg("--version").assert().success().stdout(predicate::str::contains("dbgobj"));
}

#[test]
fn test_missing_subcommand() {
    dbgobj_common::logging::ensure_test_logging(None);
    info!("Running test");
    let mut cmd = Command::cargo_bin("dbgobj").unwrap();
    cmd.assert().failure().stderr(predicate::str::contains("Usage"));
}

#[test]
fn test_simulate_text_report() {
    dbgobj_common::logging::ensure_test_logging(None);
    info!("Running test");
    let (_dir, config, scenario) = setup(SESSION);

    dbgobj(&config)
        .arg("simulate")
        .arg(&scenario)
        .assert()
        .success()
        .stdout(predicate::str::contains("Runtime: CoreCLR (pid 100)"))
        .stdout(predicate::str::contains("breakpoints: added 2, duplicates 0, skipped 0"))
        .stdout(predicate::str::contains("breakpoints: added 0, duplicates 1, skipped 0"))
        .stdout(predicate::str::contains("bind: requested 2, bound 1"))
        .stdout(predicate::str::contains("Breakpoints (2):"))
        .stdout(predicate::str::contains("Bound breakpoints (1):"))
        .stdout(predicate::str::contains("app!app.dll:0x06000001+0 in app!app.dll @ 0x1100"));
}

#[test]
fn test_simulate_json_report() {
    dbgobj_common::logging::ensure_test_logging(None);
    info!("Running test");
    let (_dir, config, scenario) = setup(SESSION);

    let output = dbgobj(&config).arg("simulate").arg(&scenario).arg("--json").output().unwrap();
    assert!(output.status.success());

    let report: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(report["runtime"], "CoreCLR (pid 100)");
    assert_eq!(report["pause_requested"], false);
    assert_eq!(report["modules"][0]["id"], "app!app.dll");
    assert_eq!(report["breakpoints"].as_array().unwrap().len(), 2);
    assert_eq!(report["bound_breakpoints"][0]["address"], "0x1100");

    // The unmatched bind request's data is the only thing released.
    let released = report["released"].as_array().unwrap();
    assert_eq!(released.len(), 1);
    assert_eq!(released[0], "bound app!app.dll:0x06000042+0");

    let events: Vec<_> =
        report["events"].as_array().unwrap().iter().filter_map(|e| e.as_str()).collect();
    assert!(events.contains(&"created module"));
    assert!(events.contains(&"added 2 breakpoint(s)"));
    assert!(events.contains(&"bound 1 breakpoint(s)"));
}

#[test]
fn test_closing_a_module_unbinds_it() {
    dbgobj_common::logging::ensure_test_logging(None);
    info!("Running test");
    let scenario = format!("{SESSION}\n[[steps]]\naction = \"close\"\nlabels = [\"app\"]\n");
    let (_dir, config, scenario) = setup(&scenario);

    let output = dbgobj(&config).arg("simulate").arg(&scenario).arg("--json").output().unwrap();
    assert!(output.status.success());

    let report: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    assert!(report["modules"].as_array().unwrap().is_empty());
    assert!(report["bound_breakpoints"].as_array().unwrap().is_empty());
    assert_eq!(report["breakpoints"].as_array().unwrap().len(), 2);

    let released = report["released"].as_array().unwrap();
    assert!(released.iter().any(|r| r == "module app"));
    assert!(released.iter().any(|r| r == "bound app!app.dll:0x06000001+0"));
}

#[test]
fn test_cancelled_tracepoint_prompt() {
    dbgobj_common::logging::ensure_test_logging(None);
    info!("Running test");
    let scenario = r#"
        [runtime]
        process_id = 1
        name = "CoreCLR"

        [prompt]
        cancel = true

        [[metadata.types]]
        module = "app"
        token = 0x02000002
        name = "App.Program"
        methods = [{ module = "app", token = 0x06000001 }]

        [[steps]]
        action = "breakpoints"
        kind = "tracepoint"
        selection = [{ kind = "type", module = "app", token = 0x02000002 }]
    "#;
    let (_dir, config, scenario) = setup(scenario);

    dbgobj(&config)
        .arg("simulate")
        .arg(&scenario)
        .assert()
        .success()
        .stdout(predicate::str::contains("tracepoints: cancelled"))
        .stdout(predicate::str::contains("Breakpoints (0):"));
}

#[test]
fn test_unknown_label_fails() {
    dbgobj_common::logging::ensure_test_logging(None);
    info!("Running test");
    let scenario = r#"
        [runtime]
        process_id = 1
        name = "CoreCLR"

        [[steps]]
        action = "close"
        labels = ["ghost"]
    "#;
    let (_dir, config, scenario) = setup(scenario);

    dbgobj(&config)
        .arg("simulate")
        .arg(&scenario)
        .assert()
        .failure()
        .stderr(predicate::str::contains("Unknown object label: ghost"));
}

#[test]
fn test_missing_scenario_file() {
    dbgobj_common::logging::ensure_test_logging(None);
    info!("Running test");
    let (dir, config, _) = setup("");

    dbgobj(&config)
        .arg("simulate")
        .arg(dir.path().join("missing.toml"))
        .assert()
        .failure()
        .stderr(predicate::str::contains("Failed to read scenario file"));
}

#[test]
fn test_config_command() {
    dbgobj_common::logging::ensure_test_logging(None);
    info!("Running test");
    let (_dir, config, _) = setup("");

    dbgobj(&config)
        .arg("config")
        .assert()
        .success()
        .stdout(predicate::str::contains("[manager]"))
        .stdout(predicate::str::contains("dispatcher_thread_name = \"dbg-dispatch\""));

    dbgobj(&config)
        .arg("config")
        .arg("--path")
        .assert()
        .success()
        .stdout(predicate::str::contains("config.toml"));
}
