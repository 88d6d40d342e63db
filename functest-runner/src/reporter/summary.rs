// Copyright (c) The functest Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

use super::Styles;
use crate::{
    helpers::Glyphs,
    runner::{Outcome, TestStatus},
};
use owo_colors::OwoColorize;
use std::io;
use swrite::{SWrite, swriteln};

const STATUS_WIDTH: usize = 9;

/// Writes one row per test sorted case-insensitively by name, then a line for the whole run.
///
/// The run line says "Passed" unless some test failed: skips don't count against it here, even
/// though they do for the exit code.
pub(super) fn write_summary(
    outcomes: &[Outcome],
    runtime_secs: u64,
    styles: &Styles,
    glyphs: &Glyphs,
    writer: &mut dyn io::Write,
) -> io::Result<()> {
    let mut rows: Vec<_> = outcomes
        .iter()
        .map(|outcome| (outcome.id.key(), outcome))
        .collect();
    rows.sort_by_cached_key(|(key, _)| key.to_lowercase());
    let width = rows
        .iter()
        .map(|(key, _)| key.len())
        .fold("TEST".len(), usize::max);

    let mut out = String::new();
    let header = format!("{:<width$} | {:<STATUS_WIDTH$} | DURATION", "TEST", "STATUS");
    swriteln!(out, "\n{}\n", header.style(styles.bold));

    let mut any_failed = false;
    let mut time_sum = 0;
    for (key, outcome) in &rows {
        any_failed |= outcome.status == TestStatus::Failed;
        time_sum += outcome.duration_secs;

        let glyph = match outcome.status {
            TestStatus::Passed => glyphs.tick,
            TestStatus::Failed => glyphs.cross,
            TestStatus::Skipped => glyphs.circle,
        };
        let row = format!(
            "{key:<width$} | {glyph}{:<status_width$} | {} s",
            outcome.status,
            outcome.duration_secs,
            status_width = STATUS_WIDTH - glyph.chars().count(),
        );
        swriteln!(out, "{}", row.style(styles.for_status(outcome.status)));
    }

    let status = if any_failed {
        format!("{}Failed", glyphs.cross)
    } else {
        format!("{}Passed", glyphs.tick)
    };
    let all = format!("{:<width$} | {status:<STATUS_WIDTH$} | {time_sum} s (accumulated)", "ALL");
    swriteln!(out, "\n{}", all.style(styles.bold));
    swriteln!(out, "Runtime: {runtime_secs} s");

    writer.write_all(out.as_bytes())
}
