// Copyright (c) The functest Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Code to generate JUnit XML reports from test outcomes.

use crate::{
    errors::JunitWriteError,
    runner::{Outcome, TestStatus},
};
use camino::Utf8Path;
use chrono::{DateTime, FixedOffset};
use quick_junit::{NonSuccessKind, Report, TestCase, TestCaseStatus, TestSuite};
use std::{fs::File, time::Duration};

/// Writes a report with a single suite named `report_name`, with one test case per outcome.
///
/// Captured output is attached to every test case, including passing ones.
pub(super) fn write_report(
    outcomes: &[Outcome],
    path: &Utf8Path,
    report_name: &str,
    runtime: Duration,
    start_time: DateTime<FixedOffset>,
) -> Result<(), JunitWriteError> {
    let mut test_suite = TestSuite::new(report_name);
    test_suite.set_time(runtime).set_timestamp(start_time);

    let mut skipped = 0;
    for outcome in outcomes {
        let status = match outcome.status {
            TestStatus::Passed => TestCaseStatus::success(),
            TestStatus::Failed => TestCaseStatus::non_success(NonSuccessKind::Failure),
            TestStatus::Skipped => {
                skipped += 1;
                TestCaseStatus::skipped()
            }
        };

        let name = outcome.id.key();
        let mut test_case = TestCase::new(name.as_str(), status);
        test_case
            .set_classname(name.as_str())
            .set_time(Duration::from_secs(outcome.duration_secs))
            .set_system_out(outcome.stdout.as_str())
            .set_system_err(outcome.stderr.as_str());
        test_suite.add_test_case(test_case);
    }

    // quick-junit counts failures itself but has no attribute for skips.
    test_suite.extra.insert("id".into(), "0".into());
    test_suite
        .extra
        .insert("skipped".into(), skipped.to_string().into());

    let mut report = Report::new(report_name);
    report
        .set_timestamp(start_time)
        .set_time(runtime)
        .add_test_suite(test_suite);

    if let Some(dir) = path.parent() {
        std::fs::create_dir_all(dir).map_err(|error| JunitWriteError::Fs {
            file: dir.to_owned(),
            error,
        })?;
    }
    let f = File::create(path).map_err(|error| JunitWriteError::Fs {
        file: path.to_owned(),
        error,
    })?;
    report
        .serialize(f)
        .map_err(|error| JunitWriteError::Serialize {
            file: path.to_owned(),
            error,
        })
}
