// Copyright (c) The functest Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Work done before the pool starts: environment checks, the shared cache and the run's temporary
//! directory.
//!
//! The checks here only warn. A stray daemon or a stale cache makes flaky failures more likely,
//! but does not make the run invalid.

use crate::{
    config::{BuildEnv, ExecutablesConfig},
    errors::{CachePopulateError, TempDirError},
    runner::RunFlags,
};
use camino::{Utf8Path, Utf8PathBuf};
use chrono::Local;
use std::io;

/// The prefix of the per-run temporary directory.
pub const RUN_TMPDIR_PREFIX: &str = "lyokocoin_test_runner_";

/// Warns if a process called `daemon` is already running on this machine.
///
/// Uses `pidof`, so this is a no-op where `pidof` isn't available.
pub fn warn_if_daemon_running(daemon: &str) {
    let output = duct::cmd!("pidof", daemon)
        .stdout_capture()
        .stderr_null()
        .unchecked()
        .run();
    match output {
        Ok(output) if !output.stdout.trim_ascii().is_empty() => {
            tracing::warn!(
                "there is already a {daemon} process running on this system. \
                 Tests may fail unexpectedly due to resource contention!"
            );
        }
        Ok(_) => {}
        Err(err) => tracing::trace!("unable to check for running {daemon}: {err}"),
    }
}

/// Warns if the shared cache directory exists.
pub fn warn_if_cache_dir(cache_dir: &Utf8Path) {
    if cache_dir.is_dir() {
        tracing::warn!(
            "there is a cache directory here: {cache_dir}. \
             If tests fail unexpectedly, try deleting the cache directory."
        );
    }
}

/// Removes the shared cache directory. Failures are logged and otherwise ignored.
pub fn flush_cache(cache_dir: &Utf8Path) {
    match std::fs::remove_dir_all(cache_dir) {
        Ok(()) => tracing::debug!("flushed cache directory {cache_dir}"),
        Err(err) if err.kind() == io::ErrorKind::NotFound => {}
        Err(err) => tracing::warn!("failed to flush cache directory {cache_dir}: {err}"),
    }
}

/// Returns the environment variables that point tests at the executables under test.
///
/// If the daemon variable is already set, the caller's environment is trusted for both and
/// nothing is returned.
pub fn executable_env(
    build_env: &BuildEnv,
    executables: &ExecutablesConfig,
) -> Vec<(String, String)> {
    let daemon_set = std::env::var_os(executables.daemon_env()).is_some();
    executable_env_impl(build_env, executables, daemon_set)
}

fn executable_env_impl(
    build_env: &BuildEnv,
    executables: &ExecutablesConfig,
    daemon_set: bool,
) -> Vec<(String, String)> {
    if daemon_set {
        return Vec::new();
    }
    vec![
        (
            executables.daemon_env().to_owned(),
            build_env.executable_path(executables.daemon()).into_string(),
        ),
        (
            executables.cli_env().to_owned(),
            build_env.executable_path(executables.cli()).into_string(),
        ),
    ]
}

/// Runs the cache population script once, with the shared flags and its own temporary directory.
pub fn populate_cache(
    script: &Utf8Path,
    flags: &RunFlags,
    run_tmpdir: &Utf8Path,
) -> Result<(), CachePopulateError> {
    let mut args = flags.args().to_vec();
    args.push(format!("--tmpdir={}", run_tmpdir.join("cache")));

    tracing::debug!("populating cache with {script}");
    let mut expr = duct::cmd(script.as_std_path(), args);
    for (key, value) in flags.env() {
        expr = expr.env(key, value);
    }
    let output = expr
        .stdout_capture()
        .stderr_capture()
        .unchecked()
        .run()
        .map_err(|err| CachePopulateError::Exec {
            script: script.to_owned(),
            err,
        })?;

    if !output.status.success() {
        return Err(CachePopulateError::Failed {
            script: script.to_owned(),
            status: output.status.to_string(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        });
    }
    Ok(())
}

/// Creates the temporary directory for this run under `prefix`, named after the current time.
///
/// Fails if the directory already exists.
pub fn create_run_tmpdir(prefix: &Utf8Path) -> Result<Utf8PathBuf, TempDirError> {
    let dir = prefix.join(format!(
        "{RUN_TMPDIR_PREFIX}{}",
        Local::now().format("%Y%m%d_%H%M%S")
    ));
    std::fs::create_dir_all(prefix).map_err(|err| TempDirError::create(prefix, err))?;
    std::fs::create_dir(&dir).map_err(|err| TempDirError::create(&dir, err))?;
    tracing::debug!("temporary test directory at {dir}");
    Ok(dir)
}

/// Removes `dir` if it is empty. Returns true if it was removed.
///
/// Tests that succeed clean up after themselves, so anything left behind belongs to a failure
/// and is kept for inspection.
pub fn remove_if_empty(dir: &Utf8Path) -> Result<bool, TempDirError> {
    let mut entries = dir
        .read_dir_utf8()
        .map_err(|err| TempDirError::remove(dir, err))?;
    if entries.next().is_some() {
        tracing::debug!("keeping non-empty temporary directory {dir}");
        return Ok(false);
    }
    std::fs::remove_dir(dir).map_err(|err| TempDirError::remove(dir, err))?;
    Ok(true)
}
