// Copyright (c) The functest Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! RPC coverage reporting.
//!
//! Every test writes the commands it invoked into files in a shared directory. One of the tests
//! also writes the complete list of commands there, as reported by the cli's `help`. Once the pool
//! has drained, the commands nobody invoked are reported.

use crate::errors::{CoverageError, DisplayErrorChain};
use camino::{Utf8Path, Utf8PathBuf};
use camino_tempfile::Utf8TempDir;
use std::{collections::BTreeSet, fmt};
use walkdir::WalkDir;

/// The file listing every known command, relative to the coverage directory.
pub const REFERENCE_FILE_NAME: &str = "rpc_interface.txt";

/// The prefix of files listing the commands a test invoked.
pub const RECORD_FILE_PREFIX: &str = "coverage.";

/// Owns the shared coverage directory for a run.
#[derive(Debug)]
pub struct CoverageAuditor {
    dir: Utf8TempDir,
}

impl CoverageAuditor {
    /// Creates a fresh coverage directory under the system temporary directory.
    pub fn new() -> Result<Self, CoverageError> {
        let dir = camino_tempfile::Builder::new()
            .prefix("coverage")
            .tempdir()
            .map_err(|err| CoverageError::CreateDir { err })?;
        Ok(Self { dir })
    }

    /// The shared coverage directory.
    pub fn dir(&self) -> &Utf8Path {
        self.dir.path()
    }

    /// The flag that tells a test where to write its coverage records.
    pub fn flag(&self) -> String {
        format!("--coveragedir={}", self.dir())
    }

    /// Computes the commands in the reference list that no test invoked.
    ///
    /// Record files may be anywhere below the coverage directory. Records that can't be read as
    /// UTF-8 text are skipped with a warning; a missing or unreadable reference list is an error.
    pub fn report(&self) -> Result<CoverageReport, CoverageError> {
        let reference = self.dir().join(REFERENCE_FILE_NAME);
        if !reference.is_file() {
            return Err(CoverageError::ReferenceNotFound { path: reference });
        }
        let mut uncovered = read_commands(&reference)?;

        for entry in WalkDir::new(self.dir()) {
            let entry = entry.map_err(|err| CoverageError::Walk {
                dir: self.dir().to_owned(),
                err,
            })?;
            let is_record = entry.file_type().is_file()
                && entry
                    .file_name()
                    .to_str()
                    .is_some_and(|name| name.starts_with(RECORD_FILE_PREFIX));
            if !is_record {
                continue;
            }

            let path = match Utf8PathBuf::from_path_buf(entry.into_path()) {
                Ok(path) => path,
                Err(path) => {
                    tracing::warn!("skipping coverage record with non-UTF-8 path {path:?}");
                    continue;
                }
            };
            match read_commands(&path) {
                Ok(commands) => {
                    for command in commands {
                        uncovered.remove(&command);
                    }
                }
                Err(err) => {
                    tracing::warn!(
                        "skipping unreadable coverage record: {}",
                        DisplayErrorChain::new(err)
                    );
                }
            }
        }

        Ok(CoverageReport { uncovered })
    }

    /// Removes the coverage directory.
    pub fn cleanup(self) -> Result<(), CoverageError> {
        let dir = self.dir().to_owned();
        tracing::debug!("cleaning up coverage data at {dir}");
        self.dir
            .close()
            .map_err(|err| CoverageError::Cleanup { dir, err })
    }
}

/// The result of a coverage audit.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct CoverageReport {
    uncovered: BTreeSet<String>,
}

impl CoverageReport {
    /// The commands that were never invoked, in sorted order.
    pub fn uncovered(&self) -> &BTreeSet<String> {
        &self.uncovered
    }
}

impl fmt::Display for CoverageReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.uncovered.is_empty() {
            return writeln!(f, "All RPC commands covered.");
        }

        writeln!(f, "Uncovered RPC commands:")?;
        for command in &self.uncovered {
            writeln!(f, "  - {command}")?;
        }
        Ok(())
    }
}

/// Reads a newline-separated command list, ignoring surrounding whitespace and blank lines.
fn read_commands(path: &Utf8Path) -> Result<BTreeSet<String>, CoverageError> {
    let contents = std::fs::read_to_string(path).map_err(|err| CoverageError::Read {
        path: path.to_owned(),
        err,
    })?;
    Ok(contents
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .map(str::to_owned)
        .collect())
}
