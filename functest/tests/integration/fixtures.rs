// Copyright (c) The functest Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

use camino::{Utf8Path, Utf8PathBuf};
use camino_tempfile::Utf8TempDir;
use color_eyre::eyre::{Result, WrapErr};
use indoc::formatdoc;
use std::{
    borrow::Cow,
    fmt,
    os::unix::fs::PermissionsExt,
    process::{Command, ExitStatus},
};

/// Environment variables that change the binary's behavior and must not leak in from the
/// developer's shell.
const SCRUBBED_ENV: &[&str] = &[
    "FUNCTEST_LOG",
    "FUNCTEST_QUIET",
    "FUNCTEST_COLOR",
    "FUNCTEST_RUNNER_CONFIG",
    "LYOKOCOIND",
    "LYOKOCOINCLI",
];

/// A scratch source tree and build directory, laid out the way the build system leaves them.
pub struct BuildTree {
    root: Utf8TempDir,
    src_dir: Utf8PathBuf,
    build_dir: Utf8PathBuf,
}

impl BuildTree {
    /// A tree built out of tree, with separate source and build directories.
    pub fn out_of_tree() -> Result<Self> {
        Self::new(false)
    }

    /// A tree built in tree, where the source and build directories are the same.
    pub fn in_tree() -> Result<Self> {
        Self::new(true)
    }

    fn new(in_tree: bool) -> Result<Self> {
        let root = camino_tempfile::Builder::new()
            .prefix("functest-tree-")
            .tempdir()?;
        let src_dir = root.path().join("src");
        let build_dir = if in_tree {
            src_dir.clone()
        } else {
            root.path().join("build")
        };

        let tree = Self {
            root,
            src_dir,
            build_dir,
        };
        std::fs::create_dir_all(tree.tests_dir())?;
        std::fs::create_dir_all(tree.build_dir.join("test"))?;
        tree.write_config_ini("", true)?;
        std::fs::write(tree.runner_config(), "poll-interval = \"20ms\"\n")?;
        Ok(tree)
    }

    pub fn build_dir(&self) -> &Utf8Path {
        &self.build_dir
    }

    pub fn tests_dir(&self) -> Utf8PathBuf {
        self.src_dir.join("test").join("functional")
    }

    pub fn config_ini(&self) -> Utf8PathBuf {
        self.build_dir.join("test").join("config.ini")
    }

    pub fn runner_config(&self) -> Utf8PathBuf {
        self.root.path().join("runner.toml")
    }

    /// The prefix passed as `--tmpdirprefix`. Not created up front.
    pub fn tmpdir_prefix(&self) -> Utf8PathBuf {
        self.root.path().join("tmp")
    }

    /// The file that tests added with [`Self::add_test`] append their names to.
    pub fn ran_log(&self) -> Utf8PathBuf {
        self.root.path().join("ran.log")
    }

    /// Rewrites `config.ini` with the given executable extension and component state.
    pub fn write_config_ini(&self, exeext: &str, components_enabled: bool) -> Result<()> {
        let enabled = if components_enabled { "true" } else { "false" };
        let contents = formatdoc! {"
            [environment]
            SRCDIR={src}
            BUILDDIR={build}
            EXEEXT={exeext}

            [components]
            ENABLE_WALLET=true
            ENABLE_UTILS={enabled}
            ENABLE_LYOKOCOIND=true
            ",
            src = self.src_dir,
            build = self.build_dir,
        };
        let path = self.config_ini();
        std::fs::write(&path, contents).wrap_err_with(|| format!("writing {path}"))
    }

    /// Adds a test that records its name in [`Self::ran_log`], runs `body` and exits with the
    /// status of its last command.
    pub fn add_test(&self, name: &str, body: &str) -> Result<Utf8PathBuf> {
        let script = format!(
            "echo {name} >> '{log}'\n{body}",
            name = name.trim_end_matches(".py"),
            log = self.ran_log(),
        );
        self.add_script(name, &script)
    }

    /// Writes an executable `sh` script called `name` into the tests directory.
    pub fn add_script(&self, name: &str, body: &str) -> Result<Utf8PathBuf> {
        let path = self.tests_dir().join(name);
        std::fs::write(&path, format!("#!/bin/sh\n{body}\n"))
            .wrap_err_with(|| format!("writing {path}"))?;
        std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755))
            .wrap_err_with(|| format!("making {path} executable"))?;
        Ok(path)
    }

    /// Names of the tests that ran, in the order they started.
    pub fn ran(&self) -> Result<Vec<String>> {
        match std::fs::read_to_string(self.ran_log()) {
            Ok(contents) => Ok(contents.lines().map(str::to_owned).collect()),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(Vec::new()),
            Err(err) => Err(err).wrap_err("reading ran.log"),
        }
    }

    /// A command line pointed at this tree, running one test at a time outside CI mode.
    pub fn cli(&self) -> FunctestCli {
        let mut cli = FunctestCli::for_test();
        cli.args([
            "--configfile",
            self.config_ini().as_str(),
            "--runner-config",
            self.runner_config().as_str(),
            "--tmpdirprefix",
            self.tmpdir_prefix().as_str(),
            "--no-ci",
            "--jobs",
            "1",
            "--color",
            "never",
        ]);
        cli
    }
}

#[derive(Clone, Debug)]
pub struct FunctestCli {
    args: Vec<String>,
    unchecked: bool,
}

impl FunctestCli {
    pub fn for_test() -> Self {
        Self {
            args: Vec::new(),
            unchecked: false,
        }
    }

    pub fn args(&mut self, args: impl IntoIterator<Item = impl Into<String>>) -> &mut Self {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    pub fn unchecked(&mut self, unchecked: bool) -> &mut Self {
        self.unchecked = unchecked;
        self
    }

    pub fn output(&self) -> FunctestOutput {
        let mut command = Command::new(env!("CARGO_BIN_EXE_functest"));
        command.args(&self.args);
        for var in SCRUBBED_ENV {
            command.env_remove(var);
        }
        let output = command.output().expect("failed to execute functest");

        let ret = FunctestOutput {
            command,
            exit_status: output.status,
            stdout: output.stdout,
            stderr: output.stderr,
        };

        if !self.unchecked && !output.status.success() {
            panic!("command failed:\n\n{ret}");
        }

        ret
    }
}

pub struct FunctestOutput {
    pub command: Command,
    pub exit_status: ExitStatus,
    pub stdout: Vec<u8>,
    pub stderr: Vec<u8>,
}

impl FunctestOutput {
    pub fn exit_code(&self) -> Option<i32> {
        self.exit_status.code()
    }

    pub fn stdout_as_str(&self) -> Cow<'_, str> {
        String::from_utf8_lossy(&self.stdout)
    }

    pub fn stderr_as_str(&self) -> Cow<'_, str> {
        String::from_utf8_lossy(&self.stderr)
    }
}

impl fmt::Display for FunctestOutput {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "command: {:?}\nexit code: {:?}\n\
                   --- stdout ---\n{}\n\n--- stderr ---\n{}\n\n",
            self.command,
            self.exit_status.code(),
            self.stdout_as_str(),
            self.stderr_as_str(),
        )
    }
}

// Make Debug output the same as Display output, so failed assertions are readable.
impl fmt::Debug for FunctestOutput {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(self, f)
    }
}
