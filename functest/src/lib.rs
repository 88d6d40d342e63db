// Copyright (c) The functest Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! A parallel runner for functional test scripts.
//!
//! `functest` discovers the test scripts of a build, picks the ones worth running based on how
//! long they took last time, runs them in parallel with isolated ports and directories, and
//! reports the results as a summary table and a JUnit file.
//!
//! The core lives in the `functest-runner` crate. This crate holds command-line handling, output
//! setup and error reporting.

#![warn(missing_docs)]

mod dispatch;
mod errors;
mod output;

#[doc(hidden)]
pub use dispatch::*;
#[doc(hidden)]
pub use errors::*;
