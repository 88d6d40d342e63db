// Copyright (c) The functest Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Exit codes used by `functest`.

/// Documented exit codes for `functest` failures.
///
/// `functest` runs may fail for a variety of reasons. This structure documents the exit codes that
/// may occur in case of expected failures.
///
/// Unknown/unexpected failures will always result in exit code 1.
pub enum FunctestExitCode {}

impl FunctestExitCode {
    /// No errors occurred and every test passed.
    pub const OK: i32 = 0;

    /// One or more tests did not pass.
    ///
    /// Skipped tests count as not passing.
    pub const TEST_RUN_FAILED: i32 = 1;

    /// No tests were selected to run.
    pub const NO_TESTS_RUN: i32 = 4;

    /// An error was encountered while attempting to set up the run: reading configuration,
    /// discovering tests, or creating the temporary directory.
    pub const SETUP_ERROR: i32 = 96;

    /// The cache population script failed.
    pub const CACHE_POPULATE_FAILED: i32 = 97;

    /// The coverage report could not be produced.
    pub const COVERAGE_FAILED: i32 = 98;

    /// Writing the JUnit report or the timing file failed.
    pub const WRITE_OUTPUT_ERROR: i32 = 110;
}
