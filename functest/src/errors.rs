// Copyright (c) The functest Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

use crate::output::{NO_HEADING, StderrStyles};
use functest_runner::{errors::*, exit_codes::FunctestExitCode};
use owo_colors::OwoColorize;
use std::{error::Error, path::PathBuf};
use thiserror::Error;

pub(crate) type Result<T, E = ExpectedError> = std::result::Result<T, E>;

// The #[error()] strings are placeholders: errors are meant to be printed with display_to_stderr,
// which colorizes them.

/// An error that stops a run before or after its tests have executed.
#[derive(Debug, Error)]
#[doc(hidden)]
pub enum ExpectedError {
    #[error("failed to read build environment")]
    BuildEnv {
        #[from]
        err: BuildEnvError,
    },
    #[error("failed to parse runner config")]
    ConfigParse {
        #[from]
        err: ConfigParseError,
    },
    #[error("failed to discover tests")]
    DiscoverTests {
        #[from]
        err: DiscoverTestsError,
    },
    #[error("temporary directory error")]
    TempDir {
        #[from]
        err: TempDirError,
    },
    #[error("failed to save timings")]
    WriteTimings { err: TimingsError },
    #[error("cache population failed")]
    CachePopulate {
        #[from]
        err: CachePopulateError,
    },
    #[error("test pool error")]
    TestPool {
        #[from]
        err: TestPoolError,
    },
    #[error("coverage error")]
    Coverage {
        #[from]
        err: CoverageError,
    },
    #[error("failed to write JUnit report")]
    JunitWrite {
        #[from]
        err: JunitWriteError,
    },
    #[error("failed to write summary")]
    WriteSummary { err: std::io::Error },
    #[error("no tests to run")]
    NoTestsRun { requested: Vec<String> },
    #[error("system temporary directory is not UTF-8")]
    SystemTempDirNotUtf8 { path: PathBuf },
}

impl ExpectedError {
    pub(crate) fn write_timings(err: TimingsError) -> Self {
        Self::WriteTimings { err }
    }

    pub(crate) fn write_summary(err: std::io::Error) -> Self {
        Self::WriteSummary { err }
    }

    /// Returns the exit code for the process.
    pub fn process_exit_code(&self) -> i32 {
        match self {
            Self::BuildEnv { .. }
            | Self::ConfigParse { .. }
            | Self::DiscoverTests { .. }
            | Self::TempDir { .. }
            | Self::SystemTempDirNotUtf8 { .. }
            | Self::TestPool { .. } => FunctestExitCode::SETUP_ERROR,
            Self::CachePopulate { .. } => FunctestExitCode::CACHE_POPULATE_FAILED,
            Self::Coverage { .. } => FunctestExitCode::COVERAGE_FAILED,
            Self::JunitWrite { .. } | Self::WriteTimings { .. } | Self::WriteSummary { .. } => {
                FunctestExitCode::WRITE_OUTPUT_ERROR
            }
            Self::NoTestsRun { .. } => FunctestExitCode::NO_TESTS_RUN,
        }
    }

    /// Displays this error to stderr.
    pub fn display_to_stderr(&self, styles: &StderrStyles) {
        let mut next_error = match &self {
            Self::BuildEnv { err } => {
                tracing::error!("{err}");
                err.source()
            }
            Self::ConfigParse { err } => {
                tracing::error!(
                    "failed to parse runner config at `{}`",
                    err.config_file().style(styles.bold)
                );
                Some(err.kind() as &dyn Error)
            }
            Self::DiscoverTests { err } => {
                tracing::error!("{err}");
                err.source()
            }
            Self::TempDir { err } => {
                tracing::error!("{err}");
                err.source()
            }
            Self::WriteTimings { err } => {
                tracing::error!("{err}");
                err.source()
            }
            Self::CachePopulate { err } => {
                tracing::error!("{err}");
                if let Some(stderr) = err.stderr().filter(|s| !s.is_empty()) {
                    tracing::error!(
                        target: NO_HEADING,
                        "\n{}\n{stderr}",
                        "stderr:".style(styles.bold)
                    );
                }
                err.source()
            }
            Self::TestPool { err } => {
                tracing::error!("internal error: {err}");
                None
            }
            Self::Coverage { err } => {
                tracing::error!("{err}");
                err.source()
            }
            Self::JunitWrite { err } => {
                tracing::error!("{err}");
                err.source()
            }
            Self::WriteSummary { err } => {
                tracing::error!("failed to write summary to stdout");
                Some(err as &dyn Error)
            }
            Self::NoTestsRun { requested } => {
                if requested.is_empty() {
                    tracing::error!("no tests to run");
                } else {
                    tracing::error!(
                        "no tests to run (requested: {})",
                        requested.join(", ").style(styles.warning_text)
                    );
                }
                None
            }
            Self::SystemTempDirNotUtf8 { path } => {
                tracing::error!(
                    "system temporary directory `{}` is not valid UTF-8 (pass --tmpdirprefix)",
                    path.display().style(styles.bold)
                );
                None
            }
        };

        while let Some(err) = next_error {
            tracing::error!(target: NO_HEADING, "\nCaused by:\n  {}", err);
            next_error = err.source();
        }
    }
}
