// Copyright (c) The functest Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Configuration for a run.
//!
//! There are two sources of configuration:
//!
//! * [`BuildEnv`] is read from the `config.ini` file generated by the build system. It says where
//!   the sources and build products are, and which components were built.
//! * [`RunnerConfig`] is the runner profile: scheduling parameters, the test variant table and the
//!   names of the executables under test. It is built from a default embedded in the binary,
//!   optionally overlaid with a user-provided TOML file.

use crate::{
    errors::{BuildEnvError, ConfigParseError, ConfigParseErrorKind},
    test_list::VariantTable,
};
use camino::{Utf8Path, Utf8PathBuf};
use config::{Config, ConfigBuilder, ConfigError, File, FileFormat, builder::DefaultState};
use itertools::Itertools;
use serde::Deserialize;
use std::{collections::BTreeSet, time::Duration};

/// The runner profile.
#[derive(Clone, Debug, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct RunnerConfig {
    jobs: usize,
    extended_cutoff: u64,
    skip_exit_code: i32,
    #[serde(with = "humantime_serde")]
    poll_interval: Duration,
    #[serde(with = "humantime_serde")]
    ci_timeout: Duration,
    portseed_range: u32,
    non_scripts: Vec<String>,
    cache_script: String,
    test_params: VariantTable,
    junit: JunitConfig,
    executables: ExecutablesConfig,
}

impl RunnerConfig {
    /// The default runner profile, embedded at build time.
    pub const DEFAULT_CONFIG: &'static str = include_str!("../default-config.toml");

    /// The name reported for the embedded default in errors and logs.
    pub const DEFAULT_CONFIG_NAME: &'static str = "<default config>";

    /// Reads the runner profile, overlaying `config_file` on the embedded default if given.
    ///
    /// Tables are merged key by key, so an override file only needs to mention the settings it
    /// changes. Unknown keys are reported as warnings and otherwise ignored.
    pub fn from_sources(config_file: Option<&Utf8Path>) -> Result<Self, ConfigParseError> {
        let mut builder = Self::make_default_config();
        let config_file = match config_file {
            Some(file) => {
                builder = builder.add_source(File::new(file.as_str(), FileFormat::Toml));
                file.to_owned()
            }
            None => Utf8PathBuf::from(Self::DEFAULT_CONFIG_NAME),
        };

        let (config, unknown) = Self::build_and_deserialize_config(&builder)
            .map_err(|kind| ConfigParseError::new(&config_file, kind))?;
        if !unknown.is_empty() {
            tracing::warn!(
                "ignoring unknown config keys in {config_file}: {}",
                unknown.iter().join(", ")
            );
        }

        Ok(config)
    }

    /// The default number of tests run in parallel.
    pub fn jobs(&self) -> usize {
        self.jobs
    }

    /// The cutoff, in seconds, used for runs that are neither extended nor explicit.
    pub fn extended_cutoff(&self) -> u64 {
        self.extended_cutoff
    }

    /// The exit code a test uses to report that it was skipped.
    pub fn skip_exit_code(&self) -> i32 {
        self.skip_exit_code
    }

    /// The pause between sweeps over running tests.
    pub fn poll_interval(&self) -> Duration {
        self.poll_interval
    }

    /// The wall-clock bound after which a test is interrupted in CI mode.
    pub fn ci_timeout(&self) -> Duration {
        self.ci_timeout
    }

    /// The range the per-run portseed offset is drawn from.
    pub fn portseed_range(&self) -> u32 {
        self.portseed_range
    }

    /// Files in the tests directory that are not tests.
    pub fn non_scripts(&self) -> &[String] {
        &self.non_scripts
    }

    /// The name of the cache population script, relative to the tests directory.
    pub fn cache_script(&self) -> &str {
        &self.cache_script
    }

    /// Extra argument variants per test.
    pub fn test_params(&self) -> &VariantTable {
        &self.test_params
    }

    /// JUnit settings.
    pub fn junit(&self) -> &JunitConfig {
        &self.junit
    }

    /// The executables under test.
    pub fn executables(&self) -> &ExecutablesConfig {
        &self.executables
    }

    // ---
    // Helper methods
    // ---

    fn make_default_config() -> ConfigBuilder<DefaultState> {
        Config::builder().add_source(File::from_str(Self::DEFAULT_CONFIG, FileFormat::Toml))
    }

    fn build_and_deserialize_config(
        builder: &ConfigBuilder<DefaultState>,
    ) -> Result<(Self, BTreeSet<String>), ConfigParseErrorKind> {
        let config = builder
            .build_cloned()
            .map_err(|error| ConfigParseErrorKind::Build(Box::new(error)))?;

        let mut ignored = BTreeSet::new();
        let mut cb = |path: serde_ignored::Path| {
            ignored.insert(path.to_string());
        };
        let ignored_de = serde_ignored::Deserializer::new(config, &mut cb);
        let config: Self = serde_path_to_error::deserialize(ignored_de).map_err(|error| {
            // The config crate also reports the key; drop it so the path is only shown once.
            let path = error.path().clone();
            let error = match error.into_inner() {
                ConfigError::At { error, .. } => *error,
                other => other,
            };
            ConfigParseErrorKind::Deserialize(Box::new(serde_path_to_error::Error::new(
                path, error,
            )))
        })?;

        Ok((config, ignored))
    }
}

/// JUnit settings in the runner profile.
#[derive(Clone, Debug, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct JunitConfig {
    report_name: String,
}

impl JunitConfig {
    /// The name of the test suite in the report.
    pub fn report_name(&self) -> &str {
        &self.report_name
    }
}

/// The executables under test, and the environment variables used to pass their paths to tests.
#[derive(Clone, Debug, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct ExecutablesConfig {
    daemon: String,
    cli: String,
    daemon_env: String,
    cli_env: String,
}

impl ExecutablesConfig {
    /// The daemon executable name, without extension.
    pub fn daemon(&self) -> &str {
        &self.daemon
    }

    /// The cli executable name, without extension.
    pub fn cli(&self) -> &str {
        &self.cli
    }

    /// The environment variable holding the daemon path.
    pub fn daemon_env(&self) -> &str {
        &self.daemon_env
    }

    /// The environment variable holding the cli path.
    pub fn cli_env(&self) -> &str {
        &self.cli_env
    }
}

/// The build environment, read from `config.ini`.
#[derive(Clone, Debug)]
pub struct BuildEnv {
    config_file: Utf8PathBuf,
    src_dir: Utf8PathBuf,
    build_dir: Utf8PathBuf,
    exeext: String,
    components: Components,
}

impl BuildEnv {
    /// The default location of `config.ini`, relative to the build directory.
    pub const DEFAULT_CONFIG_PATH: &'static str = "test/config.ini";

    /// The extension that marks a Windows build.
    pub const WINDOWS_EXEEXT: &'static str = ".exe";

    /// Reads the build environment from `config_file`.
    pub fn load(config_file: impl Into<Utf8PathBuf>) -> Result<Self, BuildEnvError> {
        let config_file = config_file.into();
        if !config_file.is_file() {
            return Err(BuildEnvError::NotFound { path: config_file });
        }

        let parse_err = |err| BuildEnvError::Parse {
            path: config_file.clone(),
            err,
        };
        let deserialized: BuildEnvDeserialize = Config::builder()
            .add_source(File::new(config_file.as_str(), FileFormat::Ini))
            .build()
            .and_then(|config| config.try_deserialize())
            .map_err(parse_err)?;

        tracing::trace!(
            "read build environment from {config_file}: {:?}",
            deserialized.environment
        );

        Ok(Self {
            config_file,
            src_dir: deserialized.environment.srcdir,
            build_dir: deserialized.environment.builddir,
            exeext: deserialized.environment.exeext,
            components: deserialized.components,
        })
    }

    /// The path `config.ini` was read from. Forwarded to every test.
    pub fn config_file(&self) -> &Utf8Path {
        &self.config_file
    }

    /// The source directory.
    pub fn src_dir(&self) -> &Utf8Path {
        &self.src_dir
    }

    /// The build directory.
    pub fn build_dir(&self) -> &Utf8Path {
        &self.build_dir
    }

    /// The extension of built executables, e.g. `.exe` on Windows. Usually empty.
    pub fn exeext(&self) -> &str {
        &self.exeext
    }

    /// Returns true if this is a Windows build.
    pub fn is_windows(&self) -> bool {
        self.exeext == Self::WINDOWS_EXEEXT
    }

    /// The components that were built.
    pub fn components(&self) -> &Components {
        &self.components
    }

    /// The directory containing the functional tests.
    pub fn tests_dir(&self) -> Utf8PathBuf {
        self.src_dir.join("test").join("functional")
    }

    /// The shared cache directory.
    pub fn cache_dir(&self) -> Utf8PathBuf {
        self.build_dir.join("test").join("cache")
    }

    /// Returns true if the build happens out of tree.
    pub fn has_separate_build_dir(&self) -> bool {
        self.src_dir != self.build_dir
    }

    /// The timing file checked into the source tree. Always read, never written.
    pub fn src_timings_path(&self) -> Utf8PathBuf {
        self.tests_dir().join("timing.json")
    }

    /// The timing file in the build directory, used only for out-of-tree builds.
    pub fn build_timings_path(&self) -> Option<Utf8PathBuf> {
        self.has_separate_build_dir().then(|| self.build_dir.join("timing.json"))
    }

    /// The default location of the JUnit report.
    pub fn default_junit_path(&self) -> Utf8PathBuf {
        self.build_dir.join("junit_results.xml")
    }

    /// The path to a built executable.
    pub fn executable_path(&self, name: &str) -> Utf8PathBuf {
        self.build_dir.join("src").join(format!("{name}{}", self.exeext))
    }
}

/// Which components were enabled at configure time.
///
/// A component missing from `config.ini` is disabled.
#[derive(Copy, Clone, Debug, Default, Deserialize, Eq, PartialEq)]
pub struct Components {
    #[serde(alias = "ENABLE_WALLET", default)]
    enable_wallet: bool,
    #[serde(alias = "ENABLE_UTILS", default)]
    enable_utils: bool,
    #[serde(alias = "ENABLE_LYOKOCOIND", default)]
    enable_lyokocoind: bool,
}

impl Components {
    /// Returns true if every component the functional tests need is enabled.
    pub fn all_enabled(&self) -> bool {
        self.enable_wallet && self.enable_utils && self.enable_lyokocoind
    }
}

#[derive(Debug, Deserialize)]
struct BuildEnvDeserialize {
    environment: EnvironmentSection,
    #[serde(default)]
    components: Components,
}

#[derive(Debug, Deserialize)]
struct EnvironmentSection {
    #[serde(alias = "SRCDIR")]
    srcdir: Utf8PathBuf,
    #[serde(alias = "BUILDDIR")]
    builddir: Utf8PathBuf,
    #[serde(alias = "EXEEXT", default)]
    exeext: String,
}
