// Copyright (c) The functest Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Choosing which tests to run and in what order.
//!
//! Tests are expanded into their argument variants, filtered by their last recorded duration, and
//! sorted slowest-first so that long tests start early and overlap with many short ones.

use crate::{
    test_list::{TestId, VariantTable, expand_variants},
    timings::Timings,
};
use std::cmp::Reverse;

/// The maximum historical duration a test may have and still be selected.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum Cutoff {
    /// Tests that took longer than this many seconds are left out.
    Seconds(u64),

    /// Every test is selected.
    Unlimited,
}

impl Cutoff {
    /// Picks the cutoff for a run.
    ///
    /// Explicitly named tests and extended runs are never cut off. Otherwise `default_secs`
    /// applies.
    pub fn for_run(explicit_tests: bool, extended: bool, default_secs: u64) -> Self {
        if explicit_tests || extended {
            Cutoff::Unlimited
        } else {
            Cutoff::Seconds(default_secs)
        }
    }

    /// Returns true if a test with this duration is within the cutoff.
    pub fn admits(self, duration_secs: u64) -> bool {
        match self {
            Cutoff::Seconds(max) => duration_secs <= max,
            Cutoff::Unlimited => true,
        }
    }
}

/// Where historical durations are looked up.
#[derive(Copy, Clone, Debug)]
pub struct TimingSources<'a> {
    /// Timings stored alongside the sources. Always consulted.
    pub src: &'a Timings,

    /// Timings stored in a separate build directory, if there is one. Preferred over `src`.
    pub build: Option<&'a Timings>,
}

impl<'a> TimingSources<'a> {
    /// Creates a new set of timing sources.
    pub fn new(src: &'a Timings, build: Option<&'a Timings>) -> Self {
        Self { src, build }
    }

    /// Returns the last recorded duration for `key`, or 0 if the test has never passed.
    ///
    /// Unknown tests get 0 so that they always run.
    pub fn duration_of(&self, key: &str) -> u64 {
        self.build
            .and_then(|build| build.get(key))
            .or_else(|| self.src.get(key))
            .unwrap_or(0)
    }
}

/// Produces the ordered work list for a run.
///
/// The result is sorted by descending duration, with ties broken by ascending timing key.
pub fn select<'a>(
    candidates: impl IntoIterator<Item = &'a str>,
    variants: &VariantTable,
    cutoff: Cutoff,
    sources: &TimingSources<'_>,
) -> Vec<TestId> {
    let mut selected: Vec<_> = expand_variants(candidates, variants)
        .into_iter()
        .map(|id| {
            let key = id.key();
            let duration = sources.duration_of(&key);
            (duration, key, id)
        })
        .filter(|(duration, _, id)| {
            let admitted = cutoff.admits(*duration);
            if !admitted {
                tracing::trace!("{id} exceeds cutoff ({duration} s)");
            }
            admitted
        })
        .collect();

    selected.sort_by(|(da, ka, _), (db, kb, _)| (Reverse(da), ka).cmp(&(Reverse(db), kb)));
    selected.into_iter().map(|(_, _, id)| id).collect()
}
