// Copyright (c) The functest Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Reporting on a run.
//!
//! [`RunAggregator`] receives outcomes from the pool as they complete, logs each of them, and once
//! the pool has drained produces the summary table, the JUnit report and updated timings.

mod junit;
mod summary;

use crate::{
    errors::{JunitWriteError, TimingsError},
    helpers::{Glyphs, plural},
    runner::{Outcome, TestStatus},
    timings::{TimingRecord, Timings},
};
use camino::Utf8Path;
use chrono::{DateTime, FixedOffset, Local};
use owo_colors::{OwoColorize, Style};
use std::{io, time::Duration};

/// Collects the outcomes of a run.
#[derive(Debug)]
pub struct RunAggregator {
    outcomes: Vec<Outcome>,
    start_time: DateTime<FixedOffset>,
    styles: Styles,
    glyphs: Glyphs,
}

impl RunAggregator {
    /// Creates a new aggregator for a run starting now.
    pub fn new() -> Self {
        Self {
            outcomes: Vec::new(),
            start_time: Local::now().fixed_offset(),
            styles: Styles::default(),
            glyphs: Glyphs::detect(),
        }
    }

    /// Colorizes output.
    pub fn colorize(&mut self) {
        self.styles.colorize();
    }

    /// Records an outcome and logs it.
    ///
    /// Passing and skipped tests are logged at debug level. Failures are always logged, along with
    /// everything the test wrote.
    pub fn record(&mut self, outcome: Outcome) {
        let name = outcome.id.style(self.styles.bold);
        match outcome.status {
            TestStatus::Passed => {
                tracing::debug!(
                    target: "functest::no_heading",
                    "\n{name} passed, Duration: {} s",
                    outcome.duration_secs,
                );
            }
            TestStatus::Skipped => {
                tracing::debug!(target: "functest::no_heading", "\n{name} skipped");
            }
            TestStatus::Failed => {
                tracing::info!(
                    target: "functest::no_heading",
                    "\n{name} failed, Duration: {} s (portseed {}, tmpdir {})\n\n\
                     {}\n{}\n\n{}\n{}\n",
                    outcome.duration_secs,
                    outcome.portseed,
                    outcome.tmpdir,
                    "stdout:".style(self.styles.bold),
                    outcome.stdout,
                    "stderr:".style(self.styles.bold),
                    outcome.stderr,
                );
            }
        }
        self.outcomes.push(outcome);
    }

    /// The outcomes recorded so far, in completion order.
    pub fn outcomes(&self) -> &[Outcome] {
        &self.outcomes
    }

    /// Returns true if every recorded test passed.
    ///
    /// Skipped tests count as not passing.
    pub fn is_success(&self) -> bool {
        self.outcomes
            .iter()
            .all(|outcome| outcome.status.is_success())
    }

    /// Returns the number of recorded tests with the given status.
    pub fn count(&self, status: TestStatus) -> usize {
        self.outcomes
            .iter()
            .filter(|outcome| outcome.status == status)
            .count()
    }

    /// The sum of all test durations, in seconds.
    pub fn accumulated_secs(&self) -> u64 {
        self.outcomes
            .iter()
            .map(|outcome| outcome.duration_secs)
            .sum()
    }

    /// Writes the summary table for the run.
    pub fn write_summary(&self, runtime: Duration, writer: &mut dyn io::Write) -> io::Result<()> {
        summary::write_summary(
            &self.outcomes,
            runtime.as_secs(),
            &self.styles,
            &self.glyphs,
            writer,
        )
    }

    /// Returns a one-line description of the run's result, for logging.
    pub fn final_status_line(&self) -> String {
        let total = self.outcomes.len();
        let failed = self.count(TestStatus::Failed);
        let skipped = self.count(TestStatus::Skipped);
        format!(
            "{total} {} run: {} passed, {failed} failed, {skipped} skipped",
            plural::tests_str(total),
            self.count(TestStatus::Passed),
        )
    }

    /// Writes the JUnit report to `path`.
    pub fn write_junit(
        &self,
        path: &Utf8Path,
        report_name: &str,
        runtime: Duration,
    ) -> Result<(), JunitWriteError> {
        junit::write_report(&self.outcomes, path, report_name, runtime, self.start_time)?;
        tracing::debug!("wrote JUnit report to {path}");
        Ok(())
    }

    /// Merges the durations of passing tests into `timings` and saves them.
    pub fn save_timings(&self, timings: &Timings) -> Result<Vec<TimingRecord>, TimingsError> {
        let records = timings.save(&self.outcomes)?;
        let passed = self.count(TestStatus::Passed);
        tracing::debug!(
            "updated timings for {passed} {} ({} {} not recorded)",
            plural::tests_str(passed),
            self.outcomes.len() - passed,
            plural::were_plural_if(self.outcomes.len() - passed != 1),
        );
        Ok(records)
    }
}

impl Default for RunAggregator {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Clone, Debug, Default)]
struct Styles {
    bold: Style,
    pass: Style,
    fail: Style,
    skip: Style,
}

impl Styles {
    fn colorize(&mut self) {
        self.bold = Style::new().bold();
        self.pass = Style::new().blue();
        self.fail = Style::new().red();
        self.skip = Style::new().bright_black();
    }

    fn for_status(&self, status: TestStatus) -> Style {
        match status {
            TestStatus::Passed => self.pass,
            TestStatus::Failed => self.fail,
            TestStatus::Skipped => self.skip,
        }
    }
}
