// Copyright (c) The functest Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Historical test durations.
//!
//! The timing file is a JSON list of `{"name": ..., "time": ...}` records, sorted by name. Records
//! may carry additional fields; those are kept across merges.

use crate::{
    errors::{DisplayErrorChain, TimingsError},
    runner::{Outcome, TestStatus},
};
use atomicwrites::{AtomicFile, OverwriteBehavior};
use camino::{Utf8Path, Utf8PathBuf};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::io::{self, Write};

/// A single timing record.
#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct TimingRecord {
    /// The timing key of the test, see [`TestId::key`](crate::test_list::TestId::key).
    pub name: String,

    /// The wall-clock duration of the last passing run, in seconds.
    pub time: u64,

    /// Any other fields present in the file.
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

impl TimingRecord {
    /// Creates a new record with no extra fields.
    pub fn new(name: impl Into<String>, time: u64) -> Self {
        Self {
            name: name.into(),
            time,
            extra: serde_json::Map::new(),
        }
    }

    /// Updates `self` in place with the fields of `newer`.
    fn update(&mut self, newer: TimingRecord) {
        self.time = newer.time;
        self.extra.extend(newer.extra);
    }
}

/// Timing records loaded from a file.
#[derive(Clone, Debug)]
pub struct Timings {
    path: Utf8PathBuf,
    existing: Vec<TimingRecord>,
}

impl Timings {
    /// Loads timings from `path`.
    ///
    /// A missing file produces an empty set of timings.
    pub fn load(path: impl Into<Utf8PathBuf>) -> Result<Self, TimingsError> {
        let path = path.into();
        let existing = match std::fs::read_to_string(&path) {
            Ok(contents) => serde_json::from_str(&contents).map_err(|err| TimingsError::Parse {
                path: path.clone(),
                err,
            })?,
            Err(err) if err.kind() == io::ErrorKind::NotFound => Vec::new(),
            Err(err) => return Err(TimingsError::Read { path, err }),
        };
        Ok(Self { path, existing })
    }

    /// Loads timings from `path`, falling back to empty timings if the file can't be read or
    /// parsed.
    ///
    /// The fallback is logged as a warning. Without recorded durations, every test is scheduled
    /// as if it were quick.
    pub fn load_or_empty(path: impl Into<Utf8PathBuf>) -> Self {
        let path = path.into();
        match Self::load(path.clone()) {
            Ok(timings) => timings,
            Err(err) => {
                tracing::warn!("ignoring recorded durations: {}", DisplayErrorChain::new(err));
                Self::empty(path)
            }
        }
    }

    /// Creates timings for `path` without reading it.
    pub fn empty(path: impl Into<Utf8PathBuf>) -> Self {
        Self {
            path: path.into(),
            existing: Vec::new(),
        }
    }

    /// The path this store reads from and writes to.
    pub fn path(&self) -> &Utf8Path {
        &self.path
    }

    /// The records currently loaded.
    pub fn records(&self) -> &[TimingRecord] {
        &self.existing
    }

    /// Looks up the duration recorded for `key`.
    pub fn get(&self, key: &str) -> Option<u64> {
        self.existing
            .iter()
            .find(|record| record.name == key)
            .map(|record| record.time)
    }

    /// Returns the existing records merged with records for every passing outcome.
    pub fn merged_with(&self, outcomes: &[Outcome]) -> Vec<TimingRecord> {
        merge(self.existing.clone(), passed_records(outcomes))
    }

    /// Merges records for passing outcomes into the file on disk.
    ///
    /// Failed and skipped runs are left out: their durations reflect early aborts or timeouts
    /// rather than the real cost of the test.
    pub fn save(&self, outcomes: &[Outcome]) -> Result<Vec<TimingRecord>, TimingsError> {
        let merged = self.merged_with(outcomes);

        AtomicFile::new(&self.path, OverwriteBehavior::AllowOverwrite)
            .write(|file| {
                serde_json::to_writer_pretty(&mut *file, &merged)?;
                file.write_all(b"\n")
            })
            .map_err(|err| TimingsError::Write {
                path: self.path.clone(),
                err,
            })?;

        tracing::debug!("saved {} timing records to {}", merged.len(), self.path);
        Ok(merged)
    }

    #[cfg(test)]
    pub(crate) fn extend_for_test(&mut self, records: impl IntoIterator<Item = TimingRecord>) {
        self.existing.extend(records);
    }
}

/// Folds `new` into `existing` by name.
///
/// A record already present is updated in place by a newer record for the same name, and records
/// only present on one side are kept. The result is sorted by name.
pub fn merge(
    existing: impl IntoIterator<Item = TimingRecord>,
    new: impl IntoIterator<Item = TimingRecord>,
) -> Vec<TimingRecord> {
    let mut merged: IndexMap<String, TimingRecord> = IndexMap::new();
    for record in existing.into_iter().chain(new) {
        match merged.get_mut(&record.name) {
            Some(current) => current.update(record),
            None => {
                merged.insert(record.name.clone(), record);
            }
        }
    }

    let mut merged: Vec<_> = merged.into_values().collect();
    merged.sort_by(|a, b| a.name.cmp(&b.name));
    merged
}

fn passed_records(outcomes: &[Outcome]) -> Vec<TimingRecord> {
    outcomes
        .iter()
        .filter(|outcome| outcome.status == TestStatus::Passed)
        .map(|outcome| TimingRecord::new(outcome.id.key(), outcome.duration_secs))
        .collect()
}
