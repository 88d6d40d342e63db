// Copyright (c) The functest Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

use crate::{
    ExpectedError, Result,
    output::{OutputContext, OutputOpts},
};
use camino::{Utf8Path, Utf8PathBuf};
use clap::{Args, Parser};
use functest_runner::{
    config::{BuildEnv, RunnerConfig},
    coverage::CoverageAuditor,
    errors::DisplayErrorChain,
    exit_codes::FunctestExitCode,
    preflight,
    reporter::RunAggregator,
    runner::{RunFlags, TestPoolBuilder, detect_ci},
    selector::{Cutoff, TimingSources, select},
    test_list::{TestScripts, display_ids},
    timings::Timings,
};
use std::{
    io::{IsTerminal, Write},
    time::Instant,
};
use supports_color::Stream;

/// Runs functional test scripts in parallel.
///
/// Arguments after the options are test names (with or without `.py`). Arguments that start with
/// `--` are passed through to every test.
#[derive(Debug, Parser)]
#[command(
    version,
    styles = crate::output::clap_styles::style(),
    max_term_width = 100
)]
pub struct App {
    #[clap(flatten)]
    output: OutputOpts,

    #[clap(flatten)]
    config_opts: ConfigOpts,

    #[clap(flatten)]
    filter_opts: FilterOpts,

    #[clap(flatten)]
    runner_opts: RunnerOpts,

    #[clap(flatten)]
    reporter_opts: ReporterOpts,
}

impl App {
    /// Initializes the output context.
    pub fn init_output(&self) -> OutputContext {
        self.output.init()
    }

    /// Executes the app.
    ///
    /// Returns the exit code.
    pub fn exec(self, output: OutputContext) -> Result<i32> {
        let build_env = BuildEnv::load(self.config_opts.config_file.clone())?;
        let profile = RunnerConfig::from_sources(self.config_opts.runner_config.as_deref())?;

        if build_env.is_windows() && !self.runner_opts.force {
            tracing::info!("tests currently disabled on Windows by default. Use --force to enable");
            return Ok(FunctestExitCode::OK);
        }
        if !build_env.components().all_enabled() {
            tracing::info!(
                "no functional tests to run. Wallet, utils, and {} must all be enabled",
                profile.executables().daemon()
            );
            tracing::info!(
                "rerun `configure` with -enable-wallet, -with-utils and -with-daemon and rerun make"
            );
            return Ok(FunctestExitCode::OK);
        }

        let (test_names, passthrough) = split_trailing(&self.filter_opts.args);

        let tests_dir = build_env.tests_dir();
        let mut scripts = TestScripts::discover(&tests_dir, profile.non_scripts())?;
        if !test_names.is_empty() {
            for unknown in scripts.retain_requested(&test_names) {
                tracing::warn!("test `{unknown}` not found in {tests_dir}, ignoring");
            }
        }
        if let Some(exclude) = &self.filter_opts.exclude {
            scripts.exclude(exclude);
        }

        let cutoff = Cutoff::for_run(
            !test_names.is_empty(),
            self.filter_opts.extended,
            profile.extended_cutoff(),
        );
        let src_timings = Timings::load_or_empty(build_env.src_timings_path());
        let build_timings = build_env.build_timings_path().map(Timings::load_or_empty);
        let work = select(
            scripts.iter(),
            profile.test_params(),
            cutoff,
            &TimingSources::new(&src_timings, build_timings.as_ref()),
        );

        if work.is_empty() {
            return Err(ExpectedError::NoTestsRun {
                requested: test_names,
            });
        }

        let run_tmpdir = preflight::create_run_tmpdir(&self.runner_opts.tmpdir_prefix()?)?;

        let cache_dir = build_env.cache_dir();
        if !self.runner_opts.keep_cache {
            preflight::flush_cache(&cache_dir);
        }
        preflight::warn_if_daemon_running(profile.executables().daemon());
        preflight::warn_if_cache_dir(&cache_dir);

        let coverage = if self.runner_opts.coverage {
            let auditor = CoverageAuditor::new()?;
            tracing::debug!("initializing coverage directory at {}", auditor.dir());
            Some(auditor)
        } else {
            None
        };

        let mut flags = RunFlags::new([format!("--srcdir={}", build_env.build_dir().join("src"))]);
        for arg in passthrough {
            flags.push_arg(arg);
        }
        flags.push_arg(format!("--configfile={}", absolute_config_path(&build_env)));
        flags.push_arg(format!("--cachedir={cache_dir}"));
        if let Some(auditor) = &coverage {
            flags.push_arg(auditor.flag());
        }
        for (key, value) in preflight::executable_env(&build_env, profile.executables()) {
            flags.set_env(key, value);
        }

        let jobs = self.runner_opts.jobs.unwrap_or_else(|| profile.jobs());
        if work.len() > 1 && jobs > 1 {
            preflight::populate_cache(
                &tests_dir.join(profile.cache_script()),
                &flags,
                &run_tmpdir,
            )?;
        }

        let ci = self.runner_opts.ci_mode();
        let count = work.len();
        tracing::debug!(
            "running {count} tests with {jobs} jobs{}: {}",
            if ci { " (CI mode)" } else { "" },
            display_ids(&work),
        );

        let mut builder = TestPoolBuilder::new(tests_dir.clone(), run_tmpdir.clone(), flags);
        builder
            .set_jobs(jobs)
            .set_skip_exit_code(profile.skip_exit_code())
            .set_poll_interval(profile.poll_interval())
            .set_timeout(ci.then(|| profile.ci_timeout()))
            .set_portseed_range(profile.portseed_range())
            .set_progress(std::io::stderr().is_terminal() && !output.quiet);
        let mut pool = builder.build(work);

        let mut aggregator = RunAggregator::new();
        if output.color.should_colorize(Stream::Stdout) {
            aggregator.colorize();
        }

        let start = Instant::now();
        for _ in 0..count {
            aggregator.record(pool.next_outcome()?);
        }
        let runtime = start.elapsed();

        let mut stdout = std::io::stdout().lock();
        aggregator
            .write_summary(runtime, &mut stdout)
            .and_then(|()| stdout.flush())
            .map_err(ExpectedError::write_summary)?;

        let junit_path = self
            .reporter_opts
            .junit_output
            .unwrap_or_else(|| build_env.default_junit_path());
        aggregator.write_junit(&junit_path, profile.junit().report_name(), runtime)?;

        if let Some(build_timings) = &build_timings {
            aggregator
                .save_timings(build_timings)
                .map_err(ExpectedError::write_timings)?;
        }

        if let Some(auditor) = coverage {
            let report = auditor.report()?;
            write!(stdout, "{report}").map_err(ExpectedError::write_summary)?;
            if let Err(err) = auditor.cleanup() {
                tracing::warn!("{}", DisplayErrorChain::new(err));
            }
        }

        discard_run_tmpdir(&run_tmpdir);

        tracing::info!("{}", aggregator.final_status_line());
        if aggregator.is_success() {
            Ok(FunctestExitCode::OK)
        } else {
            Ok(FunctestExitCode::TEST_RUN_FAILED)
        }
    }
}

#[derive(Debug, Args)]
#[command(next_help_heading = "Config options")]
struct ConfigOpts {
    /// Build environment file written by the build system
    #[arg(
        long = "configfile",
        value_name = "PATH",
        default_value = BuildEnv::DEFAULT_CONFIG_PATH
    )]
    config_file: Utf8PathBuf,

    /// Runner profile overriding the built-in defaults
    #[arg(long, value_name = "PATH", env = "FUNCTEST_RUNNER_CONFIG")]
    runner_config: Option<Utf8PathBuf>,
}

#[derive(Debug, Args)]
#[command(next_help_heading = "Filter options")]
struct FilterOpts {
    /// Comma-separated list of tests to leave out (names without `.py`)
    #[arg(long, short = 'x', value_name = "TESTS")]
    exclude: Option<String>,

    /// Run the extended test suite in addition to the basic tests
    #[arg(long)]
    extended: bool,

    /// Test names, and `--` flags to pass through to every test
    #[arg(
        value_name = "TESTS_OR_FLAGS",
        trailing_var_arg = true,
        allow_hyphen_values = true,
        help_heading = None
    )]
    args: Vec<String>,
}

#[derive(Debug, Args)]
#[command(next_help_heading = "Runner options")]
struct RunnerOpts {
    /// Number of tests to run in parallel [default: from runner profile]
    #[arg(long, short, value_name = "N", value_parser = parse_jobs)]
    jobs: Option<usize>,

    /// Generate a basic coverage report for the RPC interface
    #[arg(long)]
    coverage: bool,

    /// Run tests even on platforms where they are disabled by default
    #[arg(long, short)]
    force: bool,

    /// Don't flush the cache directory at startup
    #[arg(long = "keepcache", short)]
    keep_cache: bool,

    /// Root for the run's temporary directory [default: system temp dir]
    #[arg(long = "tmpdirprefix", short, value_name = "DIR")]
    tmpdir_prefix: Option<Utf8PathBuf>,

    /// Run in CI mode, with a timeout per test [default: detected]
    #[arg(long, overrides_with = "no_ci")]
    ci: bool,

    /// Don't run in CI mode
    #[arg(long, overrides_with = "ci")]
    no_ci: bool,
}

impl RunnerOpts {
    fn tmpdir_prefix(&self) -> Result<Utf8PathBuf> {
        match &self.tmpdir_prefix {
            Some(prefix) => Ok(prefix.clone()),
            None => Utf8PathBuf::try_from(std::env::temp_dir())
                .map_err(|err| ExpectedError::SystemTempDirNotUtf8 {
                    path: err.into_path_buf(),
                }),
        }
    }

    fn ci_mode(&self) -> bool {
        if self.ci {
            true
        } else if self.no_ci {
            false
        } else {
            detect_ci()
        }
    }
}

#[derive(Debug, Args)]
#[command(next_help_heading = "Reporter options")]
struct ReporterOpts {
    /// Path for the JUnit report [default: <BUILDDIR>/junit_results.xml]
    #[arg(long = "junitoutput", short = 'J', value_name = "PATH")]
    junit_output: Option<Utf8PathBuf>,
}

fn parse_jobs(input: &str) -> Result<usize, String> {
    match input.parse::<usize>() {
        Ok(0) => Err("must be at least 1".to_owned()),
        Ok(jobs) => Ok(jobs),
        Err(err) => Err(err.to_string()),
    }
}

/// Splits trailing arguments into test names and flags passed through to tests.
fn split_trailing(args: &[String]) -> (Vec<String>, Vec<String>) {
    let (passthrough, names): (Vec<_>, Vec<_>) =
        args.iter().cloned().partition(|arg| arg.starts_with("--"));
    (names, passthrough)
}

fn absolute_config_path(build_env: &BuildEnv) -> Utf8PathBuf {
    build_env
        .config_file()
        .canonicalize_utf8()
        .unwrap_or_else(|_| build_env.config_file().to_owned())
}

fn discard_run_tmpdir(dir: &Utf8Path) {
    if let Err(err) = preflight::remove_if_empty(dir) {
        tracing::warn!("{}", DisplayErrorChain::new(err));
    }
}
