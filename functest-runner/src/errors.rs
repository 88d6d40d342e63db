// Copyright (c) The functest Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Errors produced by functest.

use camino::{Utf8Path, Utf8PathBuf};
use config::ConfigError;
use std::{error, fmt};
use thiserror::Error;

/// An error that occurred while parsing the runner profile.
#[derive(Debug, Error)]
#[error("failed to parse runner config at `{config_file}`")]
#[non_exhaustive]
pub struct ConfigParseError {
    config_file: Utf8PathBuf,
    #[source]
    kind: ConfigParseErrorKind,
}

impl ConfigParseError {
    pub(crate) fn new(config_file: impl Into<Utf8PathBuf>, kind: ConfigParseErrorKind) -> Self {
        Self {
            config_file: config_file.into(),
            kind,
        }
    }

    /// Returns the config file for this error.
    pub fn config_file(&self) -> &Utf8Path {
        &self.config_file
    }

    /// Returns the kind of error this is.
    pub fn kind(&self) -> &ConfigParseErrorKind {
        &self.kind
    }
}

/// The kind of error that occurred while parsing the runner profile.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum ConfigParseErrorKind {
    /// An error occurred while building the config from its sources.
    #[error(transparent)]
    Build(Box<ConfigError>),

    /// An error occurred while deserializing the config.
    #[error(transparent)]
    Deserialize(Box<serde_path_to_error::Error<ConfigError>>),
}

/// An error that occurred while reading the build environment (`config.ini`).
#[derive(Debug, Error)]
pub enum BuildEnvError {
    /// The file does not exist.
    #[error("build environment config `{path}` not found (was the build configured?)")]
    NotFound {
        /// The path that was looked up.
        path: Utf8PathBuf,
    },

    /// The file exists but could not be parsed.
    #[error("failed to parse build environment config `{path}`")]
    Parse {
        /// The path to the file.
        path: Utf8PathBuf,

        /// The underlying error.
        #[source]
        err: ConfigError,
    },
}

/// An error that occurred while discovering test scripts on disk.
#[derive(Debug, Error)]
#[error("failed to read tests directory `{tests_dir}`")]
pub struct DiscoverTestsError {
    tests_dir: Utf8PathBuf,
    #[source]
    err: std::io::Error,
}

impl DiscoverTestsError {
    pub(crate) fn new(tests_dir: impl Into<Utf8PathBuf>, err: std::io::Error) -> Self {
        Self {
            tests_dir: tests_dir.into(),
            err,
        }
    }
}

/// An error that occurred while loading or saving a timing file.
#[derive(Debug, Error)]
pub enum TimingsError {
    /// The timing file could not be read.
    #[error("failed to read timing file `{path}`")]
    Read {
        /// The timing file.
        path: Utf8PathBuf,

        /// The underlying error.
        #[source]
        err: std::io::Error,
    },

    /// The timing file is not a list of `{name, time}` records.
    #[error("failed to parse timing file `{path}`")]
    Parse {
        /// The timing file.
        path: Utf8PathBuf,

        /// The underlying error.
        #[source]
        err: serde_json::Error,
    },

    /// The timing file could not be written.
    #[error("failed to write timing file `{path}`")]
    Write {
        /// The timing file.
        path: Utf8PathBuf,

        /// The underlying error.
        #[source]
        err: atomicwrites::Error<std::io::Error>,
    },
}

/// An error returned by [`TestPool`](crate::runner::TestPool).
#[derive(Debug, Error)]
pub enum TestPoolError {
    /// An outcome was requested, but nothing is running and nothing is pending.
    ///
    /// This indicates that the caller asked for more outcomes than there were work items.
    #[error("no running or pending tests left to wait for")]
    Exhausted,
}

/// An error that occurred while writing the JUnit report.
#[derive(Debug, Error)]
pub enum JunitWriteError {
    /// Creating the file or its parent directory failed.
    #[error("error writing JUnit report to `{file}`")]
    Fs {
        /// The file being written.
        file: Utf8PathBuf,

        /// The underlying error.
        #[source]
        error: std::io::Error,
    },

    /// Serializing the report failed.
    #[error("error serializing JUnit report to `{file}`")]
    Serialize {
        /// The file being written.
        file: Utf8PathBuf,

        /// The underlying error.
        #[source]
        error: quick_junit::SerializeError,
    },
}

/// An error produced by the [coverage auditor](crate::coverage::CoverageAuditor).
#[derive(Debug, Error)]
pub enum CoverageError {
    /// Creating the shared coverage directory failed.
    #[error("failed to create coverage directory")]
    CreateDir {
        /// The underlying error.
        #[source]
        err: std::io::Error,
    },

    /// The reference list of commands is missing.
    #[error("no coverage reference found at `{path}`")]
    ReferenceNotFound {
        /// The expected path to the reference file.
        path: Utf8PathBuf,
    },

    /// Reading a file in the coverage directory failed.
    #[error("failed to read coverage file `{path}`")]
    Read {
        /// The file that failed to be read.
        path: Utf8PathBuf,

        /// The underlying error.
        #[source]
        err: std::io::Error,
    },

    /// Walking the coverage directory failed.
    #[error("failed to walk coverage directory `{dir}`")]
    Walk {
        /// The coverage directory.
        dir: Utf8PathBuf,

        /// The underlying error.
        #[source]
        err: walkdir::Error,
    },

    /// Removing the coverage directory failed.
    #[error("failed to remove coverage directory `{dir}`")]
    Cleanup {
        /// The coverage directory.
        dir: Utf8PathBuf,

        /// The underlying error.
        #[source]
        err: std::io::Error,
    },
}

/// An error that occurred while running the cache population script.
#[derive(Debug, Error)]
pub enum CachePopulateError {
    /// The script could not be started.
    #[error("failed to execute cache script `{script}`")]
    Exec {
        /// The script path.
        script: Utf8PathBuf,

        /// The underlying error.
        #[source]
        err: std::io::Error,
    },

    /// The script exited unsuccessfully.
    #[error("cache script `{script}` failed with {status}")]
    Failed {
        /// The script path.
        script: Utf8PathBuf,

        /// The exit status, formatted for display.
        status: String,

        /// Captured standard error.
        stderr: String,
    },
}

impl CachePopulateError {
    /// Returns captured standard error from the script, if any.
    pub fn stderr(&self) -> Option<&str> {
        match self {
            Self::Exec { .. } => None,
            Self::Failed { stderr, .. } => Some(stderr),
        }
    }
}

/// An error that occurred while creating or removing the per-run temporary directory.
#[derive(Debug, Error)]
#[error("failed to {action} temporary directory `{dir}`")]
pub struct TempDirError {
    action: &'static str,
    dir: Utf8PathBuf,
    #[source]
    err: std::io::Error,
}

impl TempDirError {
    pub(crate) fn create(dir: impl Into<Utf8PathBuf>, err: std::io::Error) -> Self {
        Self {
            action: "create",
            dir: dir.into(),
            err,
        }
    }

    pub(crate) fn remove(dir: impl Into<Utf8PathBuf>, err: std::io::Error) -> Self {
        Self {
            action: "remove",
            dir: dir.into(),
            err,
        }
    }
}

/// Displays an error along with its chain of sources, one per line.
pub struct DisplayErrorChain<E>(E);

impl<E: error::Error> DisplayErrorChain<E> {
    /// Creates a new `DisplayErrorChain`.
    pub fn new(error: E) -> Self {
        Self(error)
    }
}

impl<E: error::Error> fmt::Display for DisplayErrorChain<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)?;

        let mut source = self.0.source();
        while let Some(err) = source {
            write!(f, "\n  caused by: {err}")?;
            source = err.source();
        }

        Ok(())
    }
}
