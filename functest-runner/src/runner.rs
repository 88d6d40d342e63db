// Copyright (c) The functest Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! The test pool: runs work items as child processes under bounded concurrency.
//!
//! The pool is driven from a single thread. Each call to [`TestPool::next_outcome`] tops up the
//! running set from the pending queue, then sweeps over all running processes on a fixed interval
//! until one of them has exited. Outcomes are therefore returned in completion order, not
//! submission order.

use crate::{errors::TestPoolError, test_list::TestId};
use camino::{Utf8Path, Utf8PathBuf};
use duct::Handle;
use std::{
    collections::VecDeque,
    fmt,
    io::{self, Write},
    process::Output,
    time::{Duration, Instant, SystemTime, UNIX_EPOCH},
};

/// The exit code a test uses to report that it passed.
pub const TEST_EXIT_PASSED: i32 = 0;

/// The default exit code a test uses to report that it was skipped.
pub const DEFAULT_SKIP_EXIT_CODE: i32 = 77;

/// The default pause between two sweeps over running processes.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(500);

/// The default wall-clock bound after which a test is interrupted in CI mode.
pub const DEFAULT_CI_TIMEOUT: Duration = Duration::from_secs(40 * 60);

/// The default range for the per-run portseed offset.
///
/// This is the size of the port range divided by the maximum number of nodes a test may start.
pub const DEFAULT_PORTSEED_RANGE: u32 = 625;

/// Returns true if the runner appears to be executing on a CI service.
pub fn detect_ci() -> bool {
    std::env::var("TRAVIS").is_ok_and(|v| v == "true")
        || std::env::var_os("TEAMCITY_VERSION").is_some()
        || is_ci::cached()
}

/// The terminal status of a test.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash)]
pub enum TestStatus {
    /// The test exited with [`TEST_EXIT_PASSED`] and wrote nothing to standard error.
    Passed,

    /// The test failed.
    Failed,

    /// The test exited with the skip exit code.
    Skipped,
}

impl TestStatus {
    /// Classifies a finished process.
    ///
    /// Any output on standard error turns an otherwise passing run into a failure. A process
    /// killed by a signal has no exit code and is a failure.
    pub fn classify(exit_code: Option<i32>, stderr: &str, skip_exit_code: i32) -> Self {
        match exit_code {
            Some(TEST_EXIT_PASSED) if stderr.is_empty() => TestStatus::Passed,
            Some(code) if code == skip_exit_code => TestStatus::Skipped,
            _ => TestStatus::Failed,
        }
    }

    /// Returns true if the test passed.
    pub fn is_success(self) -> bool {
        match self {
            TestStatus::Passed => true,
            TestStatus::Failed | TestStatus::Skipped => false,
        }
    }
}

impl fmt::Display for TestStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TestStatus::Passed => f.pad("Passed"),
            TestStatus::Failed => f.pad("Failed"),
            TestStatus::Skipped => f.pad("Skipped"),
        }
    }
}

/// Flags and environment shared by every test invocation in a run.
#[derive(Clone, Debug, Default)]
pub struct RunFlags {
    args: Vec<String>,
    env: Vec<(String, String)>,
}

impl RunFlags {
    /// Creates a new set of flags.
    pub fn new(args: impl IntoIterator<Item = impl Into<String>>) -> Self {
        Self {
            args: args.into_iter().map(Into::into).collect(),
            env: Vec::new(),
        }
    }

    /// Appends a flag.
    pub fn push_arg(&mut self, arg: impl Into<String>) -> &mut Self {
        self.args.push(arg.into());
        self
    }

    /// Sets an environment variable for every test process.
    pub fn set_env(&mut self, key: impl Into<String>, value: impl Into<String>) -> &mut Self {
        self.env.push((key.into(), value.into()));
        self
    }

    /// The flags passed to every test.
    pub fn args(&self) -> &[String] {
        &self.args
    }

    /// The environment variables set on every test.
    pub fn env(&self) -> &[(String, String)] {
        &self.env
    }
}

/// A test that has been dequeued and assigned its isolation resources.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct WorkItem {
    /// The test being run.
    pub id: TestId,

    /// The isolation token, passed to the test as `--portseed`.
    pub portseed: u32,

    /// The private working directory, passed to the test as `--tmpdir`.
    pub tmpdir: Utf8PathBuf,
}

impl WorkItem {
    fn new(id: TestId, portseed: u32, run_tmpdir: &Utf8Path) -> Self {
        let tmpdir = run_tmpdir.join(format!("{}_{}", id.stem(), portseed));
        Self {
            id,
            portseed,
            tmpdir,
        }
    }

    /// Returns the arguments the test executable is invoked with.
    pub fn command_args(&self, flags: &RunFlags) -> Vec<String> {
        let mut args = self.id.args().to_vec();
        args.extend(flags.args().iter().cloned());
        args.push(format!("--portseed={}", self.portseed));
        args.push(format!("--tmpdir={}", self.tmpdir));
        args
    }
}

/// The terminal classification and captured output of a completed work item.
#[derive(Clone, Debug)]
pub struct Outcome {
    /// The test that ran.
    pub id: TestId,

    /// How the test finished.
    pub status: TestStatus,

    /// The wall-clock time the test took, in whole seconds.
    pub duration_secs: u64,

    /// Captured standard output.
    pub stdout: String,

    /// Captured standard error.
    pub stderr: String,

    /// The isolation token the test ran with.
    pub portseed: u32,

    /// The private working directory the test ran with.
    pub tmpdir: Utf8PathBuf,
}

impl Outcome {
    fn from_output(work: WorkItem, start: Instant, output: &Output, skip_exit_code: i32) -> Self {
        let stdout = String::from_utf8_lossy(&output.stdout).into_owned();
        let stderr = String::from_utf8_lossy(&output.stderr).into_owned();
        let status = TestStatus::classify(output.status.code(), &stderr, skip_exit_code);
        Self {
            id: work.id,
            status,
            duration_secs: start.elapsed().as_secs(),
            stdout,
            stderr,
            portseed: work.portseed,
            tmpdir: work.tmpdir,
        }
    }

    /// An outcome for a test whose process could not be started or polled.
    fn exec_fail(work: WorkItem, start: Instant, context: &str, err: &io::Error) -> Self {
        Self {
            id: work.id,
            status: TestStatus::Failed,
            duration_secs: start.elapsed().as_secs(),
            stdout: String::new(),
            stderr: format!("{context}: {err}\n"),
            portseed: work.portseed,
            tmpdir: work.tmpdir,
        }
    }

    #[cfg(test)]
    pub(crate) fn new_for_test(id: TestId, status: TestStatus, duration_secs: u64) -> Self {
        Self {
            id,
            status,
            duration_secs,
            stdout: String::new(),
            stderr: String::new(),
            portseed: 0,
            tmpdir: Utf8PathBuf::new(),
        }
    }
}

/// Builder for a [`TestPool`].
#[derive(Clone, Debug)]
pub struct TestPoolBuilder {
    tests_dir: Utf8PathBuf,
    run_tmpdir: Utf8PathBuf,
    flags: RunFlags,
    jobs: usize,
    skip_exit_code: i32,
    poll_interval: Duration,
    timeout: Option<Duration>,
    portseed_range: u32,
    progress: bool,
}

impl TestPoolBuilder {
    /// Creates a new builder.
    ///
    /// * `tests_dir` is where test executables are found.
    /// * `run_tmpdir` is the isolation root: each test gets a private subdirectory of it.
    /// * `flags` are passed to every test.
    pub fn new(
        tests_dir: impl Into<Utf8PathBuf>,
        run_tmpdir: impl Into<Utf8PathBuf>,
        flags: RunFlags,
    ) -> Self {
        Self {
            tests_dir: tests_dir.into(),
            run_tmpdir: run_tmpdir.into(),
            flags,
            jobs: 1,
            skip_exit_code: DEFAULT_SKIP_EXIT_CODE,
            poll_interval: DEFAULT_POLL_INTERVAL,
            timeout: None,
            portseed_range: DEFAULT_PORTSEED_RANGE,
            progress: false,
        }
    }

    /// Sets the maximum number of concurrently running tests. Values below 1 are raised to 1.
    pub fn set_jobs(&mut self, jobs: usize) -> &mut Self {
        self.jobs = jobs.max(1);
        self
    }

    /// Sets the exit code that marks a test as skipped.
    pub fn set_skip_exit_code(&mut self, code: i32) -> &mut Self {
        self.skip_exit_code = code;
        self
    }

    /// Sets the pause between sweeps over running processes.
    pub fn set_poll_interval(&mut self, interval: Duration) -> &mut Self {
        self.poll_interval = interval;
        self
    }

    /// Sets the wall-clock bound after which a running test is sent an interrupt.
    ///
    /// `None` (the default) never interrupts tests.
    pub fn set_timeout(&mut self, timeout: Option<Duration>) -> &mut Self {
        self.timeout = timeout;
        self
    }

    /// Sets the range the per-run portseed offset is drawn from. Values below 1 are raised to 1.
    pub fn set_portseed_range(&mut self, range: u32) -> &mut Self {
        self.portseed_range = range.max(1);
        self
    }

    /// If true, a `.` is printed to standard error for every sweep that finds nothing finished.
    pub fn set_progress(&mut self, progress: bool) -> &mut Self {
        self.progress = progress;
        self
    }

    /// Creates the pool over `work`, which is run front to back.
    pub fn build(&self, work: impl IntoIterator<Item = TestId>) -> TestPool {
        let portseed_offset = portseed_offset(self.portseed_range);
        tracing::debug!(
            "starting test pool with {} jobs, portseed offset {portseed_offset}",
            self.jobs
        );
        TestPool {
            config: self.clone(),
            pending: work.into_iter().collect(),
            running: Vec::with_capacity(self.jobs),
            finished: VecDeque::new(),
            portseed_offset,
        }
    }
}

/// Runs tests as child processes, at most `jobs` at a time.
#[derive(Debug)]
pub struct TestPool {
    config: TestPoolBuilder,
    pending: VecDeque<TestId>,
    running: Vec<RunningTest>,
    // Work items that failed to start; reported before anything else.
    finished: VecDeque<Outcome>,
    portseed_offset: u32,
}

impl TestPool {
    /// Returns the number of tests currently running.
    pub fn running_count(&self) -> usize {
        self.running.len()
    }

    /// Returns the number of tests not yet started.
    pub fn pending_count(&self) -> usize {
        self.pending.len()
    }

    /// The offset added to every portseed in this pool.
    pub fn portseed_offset(&self) -> u32 {
        self.portseed_offset
    }

    /// Waits for the next test to finish and returns its outcome.
    ///
    /// Must be called once per work item. Calling it after every outcome has been returned is an
    /// error.
    pub fn next_outcome(&mut self) -> Result<Outcome, TestPoolError> {
        self.fill();

        if let Some(outcome) = self.finished.pop_front() {
            return Ok(outcome);
        }
        if self.running.is_empty() {
            return Err(TestPoolError::Exhausted);
        }

        loop {
            std::thread::sleep(self.config.poll_interval);
            if let Some(outcome) = self.sweep() {
                return Ok(outcome);
            }
            if self.config.progress {
                let mut stderr = io::stderr().lock();
                // Progress dots are best-effort.
                let _ = write!(stderr, ".");
                let _ = stderr.flush();
            }
        }
    }

    // ---
    // Helper methods
    // ---

    /// Starts pending tests until `jobs` are running or nothing is left.
    fn fill(&mut self) {
        while self.running.len() + self.finished.len() < self.config.jobs {
            let Some(id) = self.pending.pop_front() else {
                break;
            };
            let portseed = self.pending.len() as u32 + self.portseed_offset;
            let work = WorkItem::new(id, portseed, &self.config.run_tmpdir);
            let start = Instant::now();

            match self.launch(&work) {
                Ok(handle) => {
                    tracing::trace!("started {} (portseed {portseed})", work.id);
                    self.running.push(RunningTest {
                        work,
                        start,
                        handle,
                        interrupted: false,
                    });
                }
                Err(err) => {
                    tracing::trace!("failed to start {}: {err}", work.id);
                    let outcome = Outcome::exec_fail(work, start, "failed to start test", &err);
                    self.finished.push_back(outcome);
                }
            }
        }
    }

    fn launch(&self, work: &WorkItem) -> io::Result<Handle> {
        let program = self.config.tests_dir.join(work.id.name());
        let mut expr = duct::cmd(
            program.into_std_path_buf(),
            work.command_args(&self.config.flags),
        );
        for (key, value) in self.config.flags.env() {
            expr = expr.env(key, value);
        }
        expr.stdout_capture().stderr_capture().unchecked().start()
    }

    /// Makes one pass over the running set, returning the first test found to have exited.
    fn sweep(&mut self) -> Option<Outcome> {
        for index in 0..self.running.len() {
            let running = &mut self.running[index];
            if let Some(timeout) = self.config.timeout {
                if !running.interrupted && running.start.elapsed() > timeout {
                    running.interrupt();
                }
            }

            let finished = match running.handle.try_wait() {
                Ok(Some(output)) => Some(Ok(Outcome::from_output(
                    running.work.clone(),
                    running.start,
                    output,
                    self.config.skip_exit_code,
                ))),
                Ok(None) => None,
                Err(err) => Some(Err(err)),
            };

            if let Some(result) = finished {
                let running = self.running.remove(index);
                let outcome = match result {
                    Ok(outcome) => outcome,
                    Err(err) => Outcome::exec_fail(
                        running.work,
                        running.start,
                        "failed to wait for test",
                        &err,
                    ),
                };
                tracing::trace!("{} finished: {}", outcome.id, outcome.status);
                return Some(outcome);
            }
        }
        None
    }
}

#[derive(Debug)]
struct RunningTest {
    work: WorkItem,
    start: Instant,
    handle: Handle,
    interrupted: bool,
}

impl RunningTest {
    /// Sends a single interrupt to the test. It stays in the running set until it exits.
    fn interrupt(&mut self) {
        self.interrupted = true;
        tracing::warn!(
            "{} has been running for over {} s, interrupting it",
            self.work.id,
            self.start.elapsed().as_secs()
        );

        cfg_if::cfg_if! {
            if #[cfg(unix)] {
                for pid in self.handle.pids() {
                    // SAFETY: kill has no memory safety preconditions.
                    if unsafe { libc::kill(pid as libc::pid_t, libc::SIGINT) } != 0 {
                        let err = io::Error::last_os_error();
                        tracing::warn!("failed to interrupt {} (pid {pid}): {err}", self.work.id);
                    }
                }
            } else {
                if let Err(err) = self.handle.kill() {
                    tracing::warn!("failed to terminate {}: {err}", self.work.id);
                }
            }
        }
    }
}

/// Derives a per-run offset from the current time, to step over leftovers of an earlier run that
/// was terminated abnormally.
fn portseed_offset(range: u32) -> u32 {
    let millis = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis();
    (millis % u128::from(range.max(1))) as u32
}
