// Copyright (c) Facebook, Inc. and its affiliates.
//
// One benchmark cycle per workload size, strictly sequential:
//
//   Idle -> Preparing -> Running -> Draining -> Archiving -> next size
//
// Preparing and Running failures abort the whole suite since later sizes
// assume the baseline they establish; Archiving failures only cost that
// size its log copy.
use anyhow::{bail, Result};
use log::{debug, error, info, warn};
use serde::Serialize;
use std::collections::HashSet;
use std::fs;
use std::thread::sleep;
use std::time::Instant;

use super::{proc, progress, store, workload, BenchError, Config};
use sb_util::{prog_exiting, unix_now};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum RunnerState {
    Idle,
    Preparing,
    Running,
    Draining,
    Archiving,
    Done,
}

#[derive(Debug, Serialize)]
pub struct CycleResult {
    pub size: usize,
    pub reached_iteration: u64,
    pub timed_out: bool,
    pub archived: bool,
    pub archive_path: String,
    pub started_at: u64,
    pub ended_at: u64,
}

pub struct RunCtx<'a> {
    cfg: &'a Config,
    state: RunnerState,
}

impl<'a> RunCtx<'a> {
    pub fn new(cfg: &'a Config) -> Self {
        Self {
            cfg,
            state: RunnerState::Idle,
        }
    }

    fn set_state(&mut self, state: RunnerState) {
        debug!("run: {:?} -> {:?}", self.state, state);
        self.state = state;
    }

    fn truncate_log(&self) -> Result<()> {
        fs::OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(true)
            .open(&self.cfg.log_path)?;
        Ok(())
    }

    fn prepare(&mut self, size: usize) -> Result<()> {
        self.set_state(RunnerState::Preparing);
        self.truncate_log()?;
        workload::write(self.cfg, size)?;
        store::reset(self.cfg, size)?;
        Ok(())
    }

    // Poll the scheduling log until the player reports more than
    // cfg.iterations iterations, the optional timeout expires, or the
    // harness is interrupted. Returns (last observed iteration, timed_out).
    fn run_until(&mut self) -> Result<(u64, bool)> {
        self.set_state(RunnerState::Running);
        info!(
            "run: Running player until {} iterations",
            self.cfg.iterations
        );

        let _child = proc::start(&self.cfg.start_script)?;
        let started = Instant::now();

        loop {
            if prog_exiting() {
                bail!("exiting");
            }

            let cur = progress::current_iteration(&self.cfg.log_path)?;
            if cur > self.cfg.iterations {
                info!("run: Stopping at iteration {}", cur);
                return Ok((cur, false));
            }

            if let Some(limit) = self.cfg.poll_timeout {
                if started.elapsed() >= limit {
                    warn!(
                        "run: Stuck at iteration {} after {:?}, giving up on this size",
                        cur, limit
                    );
                    return Ok((cur, true));
                }
            }

            sleep(self.cfg.poll_intv);
        }
    }

    fn drain(&mut self) -> Result<()> {
        self.set_state(RunnerState::Draining);
        proc::kill_all_matching(&self.cfg.target_pattern, &self.cfg.user, &HashSet::new())
    }

    fn archive(&mut self, size: usize) -> Result<String> {
        self.set_state(RunnerState::Archiving);
        let dst = format!("{}.{}", &self.cfg.log_path, size);
        fs::copy(&self.cfg.log_path, &dst).map_err(|e| BenchError::ArchiveCopy {
            src: self.cfg.log_path.clone(),
            dst: dst.clone(),
            source: e,
        })?;
        info!("run: Archived log to {:?}", &dst);
        Ok(dst)
    }
}

pub fn run_suite(cfg: &Config) -> Result<Vec<CycleResult>> {
    let mut ctx = RunCtx::new(cfg);

    // A stale player instance from an earlier run would keep appending to
    // the log and corrupt every cycle; sweep before the first size.
    info!(
        "run: Clearing stale processes matching {:?}",
        &cfg.boot_kill_pattern
    );
    proc::kill_all_matching(&cfg.boot_kill_pattern, &cfg.user, &HashSet::new())?;

    let mut results = Vec::with_capacity(cfg.sizes.len());
    for &size in cfg.sizes.iter() {
        info!("run: Doing {} items now", size);
        let started_at = unix_now();

        ctx.prepare(size)?;
        let (reached_iteration, timed_out) = ctx.run_until()?;
        ctx.drain()?;

        let archive_path = format!("{}.{}", &cfg.log_path, size);
        let archived = match ctx.archive(size) {
            Ok(_) => true,
            Err(e) => {
                error!("run: {:#}", &e);
                false
            }
        };

        results.push(CycleResult {
            size,
            reached_iteration,
            timed_out,
            archived,
            archive_path,
            started_at,
            ended_at: unix_now(),
        });
    }

    ctx.set_state(RunnerState::Done);
    info!("run: All {} sizes done", cfg.sizes.len());
    Ok(results)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use std::os::unix::fs::PermissionsExt;
    use std::time::Duration;

    // A stand-in player: appends one finished-looking iteration line to the
    // log and exits, leaving nothing to drain.
    fn write_target_script(dir: &std::path::Path, log_path: &str, iteration: u64) -> String {
        let path = dir.join("start.sh");
        let mut f = fs::OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(true)
            .open(&path)
            .unwrap();
        writeln!(f, "#!/bin/sh").unwrap();
        writeln!(
            f,
            "echo \"2019-03-20 12:00:05 INFO start_iteration {} begin\" >> {}",
            iteration, log_path
        )
        .unwrap();
        let mut perm = f.metadata().unwrap().permissions();
        perm.set_mode(perm.mode() | 0o755);
        f.set_permissions(perm).unwrap();
        path.to_str().unwrap().to_string()
    }

    fn test_config(dir: &std::path::Path, sizes: Vec<usize>) -> Config {
        let top = dir.to_str().unwrap().to_string();
        Config {
            workload_path: format!("{}/benchmark.xml", &top),
            store_path: format!("{}/context_store.sqlite", &top),
            log_path: format!("{}/scheduling_manager.log", &top),
            start_script: format!("{}/start.sh", &top),
            images_dir: "/tmp".into(),
            user: "sched-bench-no-such-user".into(),
            target_pattern: "sched-bench-no-such-cmdline".into(),
            boot_kill_pattern: "sched-bench-no-such-cmdline".into(),
            sizes,
            iterations: 30,
            sample_count: 100,
            poll_intv: Duration::from_millis(10),
            poll_timeout: None,
        }
    }

    #[test]
    fn test_suite_over_two_sizes() {
        let dir = tempfile::tempdir().unwrap();
        let mut cfg = test_config(dir.path(), vec![1, 5]);
        cfg.start_script = write_target_script(dir.path(), &cfg.log_path, 31);

        let results = run_suite(&cfg).unwrap();
        assert_eq!(results.len(), 2);

        for (result, &size) in results.iter().zip(cfg.sizes.iter()) {
            assert_eq!(result.size, size);
            assert_eq!(result.reached_iteration, 31);
            assert!(!result.timed_out);
            assert!(result.archived);

            let archive = format!("{}.{}", &cfg.log_path, size);
            assert_eq!(result.archive_path, archive);
            let md = fs::metadata(&archive).unwrap();
            assert!(md.len() > 0);
        }

        // the workload document left behind belongs to the last size
        let doc = fs::read_to_string(&cfg.workload_path).unwrap();
        assert_eq!(doc.matches("<content-item").count(), 5);
    }

    #[test]
    fn test_poll_timeout_skips_size() {
        let dir = tempfile::tempdir().unwrap();
        let mut cfg = test_config(dir.path(), vec![2]);
        // player never reports any iteration
        cfg.start_script = write_target_script(dir.path(), "/dev/null", 0);
        cfg.poll_timeout = Some(Duration::from_millis(100));

        let results = run_suite(&cfg).unwrap();
        assert_eq!(results.len(), 1);
        assert!(results[0].timed_out);
        assert_eq!(results[0].reached_iteration, 0);
        // the truncated log still archives, just empty of iterations
        assert!(results[0].archived);
    }

    #[test]
    fn test_archive_failure_is_isolated() {
        let dir = tempfile::tempdir().unwrap();
        let cfg = test_config(dir.path(), vec![1]);
        let mut ctx = RunCtx::new(&cfg);

        // no log file at all
        let err = ctx.archive(1).unwrap_err();
        match err.downcast_ref::<BenchError>() {
            Some(BenchError::ArchiveCopy { .. }) => {}
            other => panic!("unexpected error {:?}", other),
        }
    }

    #[test]
    fn test_prepare_rebuilds_baseline() {
        let dir = tempfile::tempdir().unwrap();
        let cfg = test_config(dir.path(), vec![3]);
        let mut ctx = RunCtx::new(&cfg);

        fs::write(&cfg.log_path, "leftover from a previous run\n").unwrap();
        ctx.prepare(3).unwrap();

        // log truncated, workload and store rebuilt for this size
        assert_eq!(fs::metadata(&cfg.log_path).unwrap().len(), 0);
        let doc = fs::read_to_string(&cfg.workload_path).unwrap();
        assert_eq!(doc.matches("<content-item").count(), 3);
        assert!(fs::metadata(&cfg.store_path).unwrap().len() > 0);
    }
}
