// Copyright (c) The functest Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

#![warn(missing_docs)]

//! Core functionality for the `functest` functional test runner.
//!
//! The basic flow is:
//!
//! 1. [`test_list`] discovers test scripts and expands them into [`TestId`](test_list::TestId)s.
//! 2. [`selector::select`] filters those by historical duration and orders them slowest-first.
//! 3. [`runner::TestPool`] runs them as child processes under bounded concurrency and yields
//!    [`Outcome`](runner::Outcome)s in completion order.
//! 4. [`reporter::RunAggregator`] collects the outcomes into a summary table, a JUnit report, and
//!    updated [`timings`].
//!
//! [`coverage`] and [`preflight`] cover the side channels around a run.

pub mod config;
pub mod coverage;
pub mod errors;
pub mod exit_codes;
mod helpers;
pub mod preflight;
pub mod reporter;
pub mod runner;
pub mod selector;
pub mod test_list;
pub mod timings;
