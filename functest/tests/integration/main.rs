// Copyright (c) The functest Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! End-to-end tests for the `functest` binary.
//!
//! Each test lays out a scratch source tree with `config.ini` and a few `sh` scripts standing in
//! for functional tests, then runs the built binary against it.

#![cfg(unix)]

mod fixtures;

use color_eyre::eyre::Result;
use fixtures::BuildTree;
use functest_runner::{
    exit_codes::FunctestExitCode,
    timings::{TimingRecord, Timings},
};
use pretty_assertions::assert_eq;

#[test]
fn failing_test_fails_the_run() -> Result<()> {
    let tree = BuildTree::out_of_tree()?;
    tree.add_test("pass.py", "exit 0")?;
    tree.add_test("fail.py", "exit 1")?;

    let output = tree.cli().unchecked(true).output();
    assert_eq!(
        output.exit_code(),
        Some(FunctestExitCode::TEST_RUN_FAILED),
        "{output}"
    );
    // One job, equal (unknown) durations: tests start in name order.
    assert_eq!(tree.ran()?, ["fail", "pass"]);
    assert!(
        output
            .stderr_as_str()
            .contains("2 tests run: 1 passed, 1 failed, 0 skipped"),
        "{output}"
    );

    let junit = std::fs::read_to_string(tree.build_dir().join("junit_results.xml"))?;
    assert!(junit.contains("lyokocoin_abc_tests"), "{junit}");
    assert!(junit.contains("fail.py"), "{junit}");
    Ok(())
}

#[test]
fn named_tests_only() -> Result<()> {
    let tree = BuildTree::out_of_tree()?;
    tree.add_test("pass.py", "exit 0")?;
    tree.add_test("fail.py", "exit 1")?;

    let output = tree.cli().args(["pass", "--nocleanup"]).output();
    assert_eq!(output.exit_code(), Some(FunctestExitCode::OK));
    assert_eq!(tree.ran()?, ["pass"]);
    Ok(())
}

#[test]
fn passthrough_flags_reach_tests() -> Result<()> {
    let tree = BuildTree::out_of_tree()?;
    let args_log = tree.build_dir().join("args.log");
    tree.add_test("echo_args.py", &format!(r#"echo "$@" > '{args_log}'"#))?;

    tree.cli().args(["echo_args", "--loglevel=debug"]).output();

    let args = std::fs::read_to_string(&args_log)?;
    let args: Vec<_> = args.split_whitespace().collect();
    let srcdir = format!("--srcdir={}", tree.build_dir().join("src"));
    assert_eq!(args[..2], [srcdir.as_str(), "--loglevel=debug"]);
    assert!(
        args.iter().any(|arg| arg.starts_with("--configfile=") && arg.ends_with("config.ini")),
        "{args:?}"
    );
    assert!(args.iter().any(|arg| arg.starts_with("--portseed=")), "{args:?}");
    Ok(())
}

#[test]
fn nothing_selected_is_an_error() -> Result<()> {
    let tree = BuildTree::out_of_tree()?;
    tree.add_test("pass.py", "exit 0")?;
    tree.add_test("fail.py", "exit 1")?;

    let output = tree
        .cli()
        .args(["--exclude", "pass,fail"])
        .unchecked(true)
        .output();
    assert_eq!(
        output.exit_code(),
        Some(FunctestExitCode::NO_TESTS_RUN),
        "{output}"
    );
    assert!(tree.ran()?.is_empty());
    // The run's temporary directory is only created once there is work to do.
    assert!(
        !tree.tmpdir_prefix().exists(),
        "{} should not have been created",
        tree.tmpdir_prefix()
    );
    Ok(())
}

#[test]
fn out_of_tree_build_records_timings() -> Result<()> {
    let tree = BuildTree::out_of_tree()?;
    tree.add_test("pass.py", "exit 0")?;
    tree.add_test("fail.py", "exit 1")?;

    tree.cli().unchecked(true).output();

    let timings = Timings::load(tree.build_dir().join("timing.json"))?;
    assert_eq!(timings.records(), &[TimingRecord::new("pass.py", 0)]);
    assert!(!tree.tests_dir().join("timing.json").exists());

    // Only the empty run directory was left, and it was removed.
    let leftovers = tree.tmpdir_prefix().read_dir_utf8()?.count();
    assert_eq!(leftovers, 0);
    Ok(())
}

#[test]
fn in_tree_build_leaves_timings_alone() -> Result<()> {
    let tree = BuildTree::in_tree()?;
    tree.add_test("pass.py", "exit 0")?;

    tree.cli().output();

    assert_eq!(tree.ran()?, ["pass"]);
    assert!(!tree.tests_dir().join("timing.json").exists());
    assert!(!tree.build_dir().join("timing.json").exists());
    Ok(())
}

#[test]
fn malformed_timings_are_ignored() -> Result<()> {
    let tree = BuildTree::out_of_tree()?;
    tree.add_test("pass.py", "exit 0")?;
    tree.add_test("also_pass.py", "exit 0")?;
    std::fs::write(tree.tests_dir().join("timing.json"), "{not json")?;
    std::fs::write(tree.build_dir().join("timing.json"), "[{\"name\": ")?;

    let output = tree.cli().unchecked(true).output();
    assert_eq!(output.exit_code(), Some(FunctestExitCode::OK), "{output}");
    assert_eq!(tree.ran()?, ["also_pass", "pass"]);
    assert!(
        output.stderr_as_str().contains("ignoring recorded durations"),
        "{output}"
    );

    // The build directory's file is replaced with this run's results.
    let timings = Timings::load(tree.build_dir().join("timing.json"))?;
    assert_eq!(
        timings.records(),
        &[
            TimingRecord::new("also_pass.py", 0),
            TimingRecord::new("pass.py", 0)
        ]
    );
    Ok(())
}

#[test]
fn windows_build_needs_force() -> Result<()> {
    let tree = BuildTree::out_of_tree()?;
    tree.add_test("pass.py", "exit 0")?;
    tree.write_config_ini(".exe", true)?;

    let output = tree.cli().output();
    assert!(
        output.stderr_as_str().contains("disabled on Windows"),
        "{output}"
    );
    assert!(tree.ran()?.is_empty());

    tree.cli().args(["--force"]).output();
    assert_eq!(tree.ran()?, ["pass"]);
    Ok(())
}

#[test]
fn disabled_component_skips_everything() -> Result<()> {
    let tree = BuildTree::out_of_tree()?;
    tree.add_test("pass.py", "exit 0")?;
    tree.write_config_ini("", false)?;

    let output = tree.cli().output();
    assert!(
        output.stderr_as_str().contains("no functional tests to run"),
        "{output}"
    );
    assert!(tree.ran()?.is_empty());
    Ok(())
}

#[test]
fn coverage_skips_unreadable_records() -> Result<()> {
    const FIND_DIR: &str = r#"for arg in "$@"; do
  case "$arg" in --coveragedir=*) dir="${arg#--coveragedir=}";; esac
done"#;

    let tree = BuildTree::out_of_tree()?;
    tree.add_test(
        "covers_all.py",
        &format!(
            r#"{FIND_DIR}
printf 'help\ngetinfo\nstop\n' > "$dir/rpc_interface.txt"
printf 'help\ngetinfo\nstop\n' > "$dir/coverage.covers_all""#
        ),
    )?;
    tree.add_test(
        "garbled.py",
        &format!(
            r#"{FIND_DIR}
printf '\377\376\n' > "$dir/coverage.garbled""#
        ),
    )?;

    let output = tree.cli().args(["--coverage"]).unchecked(true).output();
    assert_eq!(output.exit_code(), Some(FunctestExitCode::OK), "{output}");
    assert!(
        output.stdout_as_str().contains("All RPC commands covered."),
        "{output}"
    );
    assert!(
        output
            .stderr_as_str()
            .contains("skipping unreadable coverage record"),
        "{output}"
    );
    Ok(())
}
