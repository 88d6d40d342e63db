// Copyright (c) The functest Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Integration tests for the test pool.
//!
//! These run small `sh` scripts as tests, so they are only built on Unix.

#![cfg(unix)]


use color_eyre::eyre::Result;
use fixtures::{ScriptDir, drain, ids};
use functest_runner::{
    runner::{RunFlags, TestStatus},
    test_list::TestId,
};
use pretty_assertions::assert_eq;
use std::{collections::BTreeMap, time::Duration};

#[test]
fn classifies_outcomes() -> Result<()> {
    let dir = ScriptDir::new()?;
    dir.add_script("pass.py", r#"echo "$@"; echo "daemon=$LYOKOCOIND""#)?;
    dir.add_script("noisy.py", "echo 'warning: something odd' >&2")?;
    dir.add_script("skip.py", "echo 'wallet disabled' >&2; exit 77")?;
    dir.add_script("fail.py", "exit 1")?;

    let mut flags = RunFlags::new(["--srcdir=/build/src"]);
    flags.set_env("LYOKOCOIND", "/build/src/lyokocoind");
    let mut pool = dir
        .pool_builder(flags)
        .set_jobs(4)
        .build(ids(&["pass.py", "noisy.py", "skip.py", "fail.py"]));

    let outcomes: BTreeMap<_, _> = drain(&mut pool, 4)?
        .into_iter()
        .map(|outcome| (outcome.id.key(), outcome))
        .collect();

    let statuses: BTreeMap<_, _> = outcomes
        .iter()
        .map(|(key, outcome)| (key.as_str(), outcome.status))
        .collect();
    assert_eq!(
        statuses,
        BTreeMap::from([
            ("fail.py", TestStatus::Failed),
            ("noisy.py", TestStatus::Failed),
            ("pass.py", TestStatus::Passed),
            ("skip.py", TestStatus::Skipped),
        ])
    );

    let pass = &outcomes["pass.py"];
    assert_eq!(
        pass.stdout,
        format!(
            "--srcdir=/build/src --portseed={} --tmpdir={}\ndaemon=/build/src/lyokocoind\n",
            pass.portseed, pass.tmpdir
        )
    );
    assert_eq!(
        pass.tmpdir,
        dir.run_tmpdir().join(format!("pass_{}", pass.portseed))
    );
    assert_eq!(outcomes["noisy.py"].stderr, "warning: something odd\n");

    Ok(())
}

#[test]
fn variant_args_come_first() -> Result<()> {
    let dir = ScriptDir::new()?;
    dir.add_script("txn_clone.py", r#"echo "$@""#)?;

    let mut pool = dir
        .pool_builder(RunFlags::new(["--cachedir=/cache"]))
        .build([TestId::with_args("txn_clone.py", ["--mineblock"])]);
    let outcome = pool.next_outcome()?;

    assert_eq!(outcome.status, TestStatus::Passed);
    assert!(
        outcome
            .stdout
            .starts_with("--mineblock --cachedir=/cache --portseed="),
        "{}",
        outcome.stdout
    );
    assert_eq!(outcome.tmpdir.file_name(), Some(&*format!("txn_clone_{}", outcome.portseed)));
    Ok(())
}

#[test]
fn yields_in_completion_order() -> Result<()> {
    let dir = ScriptDir::new()?;
    dir.add_script("slow.py", "sleep 1")?;
    dir.add_script("fast.py", "exit 0")?;

    let mut pool = dir
        .pool_builder(RunFlags::default())
        .set_jobs(2)
        .build(ids(&["slow.py", "fast.py"]));
    let outcomes = drain(&mut pool, 2)?;

    let order: Vec<_> = outcomes.iter().map(|outcome| outcome.id.key()).collect();
    assert_eq!(order, vec!["fast.py", "slow.py"]);
    Ok(())
}

#[test]
fn portseeds_follow_queue_position() -> Result<()> {
    let dir = ScriptDir::new()?;
    for name in ["a.py", "b.py", "c.py"] {
        dir.add_script(name, "exit 0")?;
    }

    let mut pool = dir
        .pool_builder(RunFlags::default())
        .set_jobs(1)
        .build(ids(&["a.py", "b.py", "c.py"]));
    let offset = pool.portseed_offset();

    let first = pool.next_outcome()?;
    assert_eq!(pool.running_count(), 0);
    assert_eq!(pool.pending_count(), 2);
    let rest = drain(&mut pool, 2)?;

    let portseeds: Vec<_> = std::iter::once(&first)
        .chain(&rest)
        .map(|outcome| (outcome.id.key(), outcome.portseed))
        .collect();
    assert_eq!(
        portseeds,
        vec![
            ("a.py".to_owned(), offset + 2),
            ("b.py".to_owned(), offset + 1),
            ("c.py".to_owned(), offset),
        ]
    );
    Ok(())
}

#[test]
fn never_exceeds_jobs() -> Result<()> {
    const JOBS: usize = 2;

    let dir = ScriptDir::new()?;
    let log = dir.tests_dir().join("events.log");
    let names = ["t1.py", "t2.py", "t3.py", "t4.py", "t5.py", "t6.py"];
    for name in names {
        dir.add_script(
            name,
            r#"echo start >> "$EVENT_LOG"; sleep 0.2; echo end >> "$EVENT_LOG""#,
        )?;
    }

    let mut flags = RunFlags::default();
    flags.set_env("EVENT_LOG", log.as_str());
    let mut pool = dir.pool_builder(flags).set_jobs(JOBS).build(ids(&names));

    let mut outcomes = Vec::new();
    for _ in 0..names.len() {
        outcomes.push(pool.next_outcome()?);
        assert!(pool.running_count() <= JOBS);
    }
    assert!(outcomes.iter().all(|outcome| outcome.status == TestStatus::Passed));

    let mut running = 0usize;
    let mut max_running = 0;
    for event in std::fs::read_to_string(&log)?.lines() {
        match event {
            "start" => running += 1,
            "end" => running -= 1,
            other => panic!("unexpected event {other:?}"),
        }
        max_running = max_running.max(running);
    }
    assert_eq!(running, 0);
    assert!(
        (1..=JOBS).contains(&max_running),
        "{max_running} tests ran at once with {JOBS} jobs"
    );
    Ok(())
}

#[test]
fn spawn_failure_is_a_failed_outcome() -> Result<()> {
    let dir = ScriptDir::new()?;
    dir.add_script("pass.py", "exit 0")?;

    let mut pool = dir
        .pool_builder(RunFlags::default())
        .set_jobs(2)
        .build(ids(&["missing.py", "pass.py"]));
    let outcomes = drain(&mut pool, 2)?;

    let missing = outcomes
        .iter()
        .find(|outcome| outcome.id.name() == "missing.py")
        .expect("missing.py has an outcome");
    assert_eq!(missing.status, TestStatus::Failed);
    assert!(
        missing.stderr.starts_with("failed to start test"),
        "{}",
        missing.stderr
    );

    let pass = outcomes
        .iter()
        .find(|outcome| outcome.id.name() == "pass.py")
        .expect("pass.py has an outcome");
    assert_eq!(pass.status, TestStatus::Passed);
    Ok(())
}

#[test]
fn timeout_sends_interrupt() -> Result<()> {
    let dir = ScriptDir::new()?;
    dir.add_script(
        "hang.py",
        r#"trap 'echo interrupted; kill "$child" 2>/dev/null; exit 5' INT
sleep 30 &
child=$!
wait "$child""#,
    )?;

    let mut pool = dir
        .pool_builder(RunFlags::default())
        .set_timeout(Some(Duration::from_millis(200)))
        .build(ids(&["hang.py"]));
    let outcome = pool.next_outcome()?;

    assert_eq!(outcome.status, TestStatus::Failed);
    assert_eq!(outcome.stdout, "interrupted\n");
    assert!(outcome.duration_secs < 30);
    Ok(())
}

#[test]
fn interrupted_test_keeps_its_slot() -> Result<()> {
    let dir = ScriptDir::new()?;
    let log = dir.tests_dir().join("events.log");
    // Survives SIGINT and keeps running well past the timeout.
    dir.add_script(
        "stubborn.py",
        r#"trap 'echo int' INT
echo stubborn >> "$EVENT_LOG"
i=0
while [ $i -lt 10 ]; do sleep 0.1; i=$((i+1)); done
echo stubborn-done >> "$EVENT_LOG"
echo done"#,
    )?;
    dir.add_script("next.py", r#"echo next >> "$EVENT_LOG""#)?;

    let mut flags = RunFlags::default();
    flags.set_env("EVENT_LOG", log.as_str());
    let mut pool = dir
        .pool_builder(flags)
        .set_jobs(1)
        .set_timeout(Some(Duration::from_millis(200)))
        .build(ids(&["stubborn.py", "next.py"]));

    let stubborn = pool.next_outcome()?;
    assert_eq!(stubborn.id, TestId::new("stubborn.py"));
    assert_eq!(stubborn.status, TestStatus::Passed);
    // Interrupted exactly once, however many polls passed after the timeout.
    assert_eq!(stubborn.stdout, "int\ndone\n");
    assert!(stubborn.duration_secs >= 1);

    let next = pool.next_outcome()?;
    assert_eq!(next.id, TestId::new("next.py"));
    assert_eq!(next.status, TestStatus::Passed);

    assert_eq!(
        std::fs::read_to_string(&log)?,
        "stubborn\nstubborn-done\nnext\n",
        "next.py must not start while the interrupted test is still running"
    );
    Ok(())
}
