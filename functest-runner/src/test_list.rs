// Copyright (c) The functest Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Test identities and discovery of test scripts.

use crate::{errors::DiscoverTestsError, helpers::strip_script_ext};
use camino::Utf8Path;
use indexmap::IndexMap;
use itertools::Itertools;
use std::{collections::BTreeSet, fmt};

/// Extra argument variants for tests, keyed by script name.
///
/// A test listed here runs once without arguments and once more per variant.
pub type VariantTable = IndexMap<String, Vec<Vec<String>>>;

/// The identity of a single invocation of a test script.
///
/// Two invocations of the same script with different argument variants are distinct work items,
/// but they are keyed in the timing store by [`Self::key`].
#[derive(Clone, Debug, Eq, PartialEq, Hash, PartialOrd, Ord)]
pub struct TestId {
    name: String,
    args: Vec<String>,
}

impl TestId {
    /// Creates a bare invocation of `name`.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            args: Vec::new(),
        }
    }

    /// Creates an invocation of `name` with extra arguments.
    pub fn with_args(
        name: impl Into<String>,
        args: impl IntoIterator<Item = impl Into<String>>,
    ) -> Self {
        Self {
            name: name.into(),
            args: args.into_iter().map(Into::into).collect(),
        }
    }

    /// The script name, e.g. `txn_clone.py`.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The extra arguments this invocation is run with.
    pub fn args(&self) -> &[String] {
        &self.args
    }

    /// The script name without its `.py` extension.
    pub fn stem(&self) -> &str {
        strip_script_ext(&self.name)
    }

    /// The timing-history key: the name and arguments joined by single spaces.
    pub fn key(&self) -> String {
        self.to_string()
    }
}

impl fmt::Display for TestId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name)?;
        for arg in &self.args {
            write!(f, " {arg}")?;
        }
        Ok(())
    }
}

/// Expands each candidate into its bare invocation followed by one invocation per variant.
pub fn expand_variants<'a>(
    candidates: impl IntoIterator<Item = &'a str>,
    variants: &VariantTable,
) -> Vec<TestId> {
    let mut out = Vec::new();
    for name in candidates {
        out.push(TestId::new(name));
        if let Some(variants) = variants.get(name) {
            out.extend(
                variants
                    .iter()
                    .map(|args| TestId::with_args(name, args.iter().cloned())),
            );
        }
    }
    out
}

/// The set of test scripts found in the tests directory.
#[derive(Clone, Debug)]
pub struct TestScripts {
    scripts: BTreeSet<String>,
}

impl TestScripts {
    /// Reads all `*.py` files in `tests_dir`, leaving out `non_scripts`.
    pub fn discover(
        tests_dir: &Utf8Path,
        non_scripts: &[String],
    ) -> Result<Self, DiscoverTestsError> {
        let entries = tests_dir
            .read_dir_utf8()
            .map_err(|err| DiscoverTestsError::new(tests_dir, err))?;

        let mut scripts = BTreeSet::new();
        for entry in entries {
            let entry = entry.map_err(|err| DiscoverTestsError::new(tests_dir, err))?;
            let file_name = entry.file_name();
            if file_name.ends_with(".py") && !non_scripts.iter().any(|n| n == file_name) {
                scripts.insert(file_name.to_owned());
            }
        }

        tracing::debug!("discovered {} test scripts in {tests_dir}", scripts.len());
        Ok(Self { scripts })
    }

    /// Creates a script set from an explicit list of names.
    pub fn from_names(names: impl IntoIterator<Item = impl Into<String>>) -> Self {
        Self {
            scripts: names.into_iter().map(Into::into).collect(),
        }
    }

    /// Returns the number of scripts.
    pub fn len(&self) -> usize {
        self.scripts.len()
    }

    /// Returns true if there are no scripts.
    pub fn is_empty(&self) -> bool {
        self.scripts.is_empty()
    }

    /// Iterates over script names in sorted order.
    pub fn iter(&self) -> impl Iterator<Item = &str> + '_ {
        self.scripts.iter().map(String::as_str)
    }

    /// Keeps only the scripts named in `requested`. Names are accepted with or without `.py`.
    ///
    /// Requested names that match no script are returned so that they can be reported.
    pub fn retain_requested(&mut self, requested: &[String]) -> Vec<String> {
        let unknown = requested
            .iter()
            .filter(|req| {
                !self
                    .scripts
                    .iter()
                    .any(|script| script == *req || strip_script_ext(script) == req.as_str())
            })
            .cloned()
            .collect();

        self.scripts.retain(|script| {
            requested
                .iter()
                .any(|req| req == script || req == strip_script_ext(script))
        });
        unknown
    }

    /// Removes the scripts named in a comma-separated `exclude` list (names given without `.py`).
    pub fn exclude(&mut self, exclude: &str) {
        for name in exclude.split(',').filter(|n| !n.is_empty()) {
            let script = format!("{name}.py");
            if self.scripts.remove(&script) {
                tracing::debug!("excluding {script}");
            }
        }
    }
}

/// Formats a list of test ids for log messages.
pub fn display_ids(ids: &[TestId]) -> String {
    ids.iter().join(", ")
}
