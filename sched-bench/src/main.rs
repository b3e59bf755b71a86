// Copyright (c) Facebook, Inc. and its affiliates.
use anyhow::Result;
use log::{error, info};
use std::fs;
use std::io::Write;
use std::path::Path;
use std::process::exit;
use std::time::Duration;

use sb_util::*;
use sched_bench_intf::Args;

mod proc;
mod progress;
mod run;
mod store;
mod workload;

#[derive(Debug, thiserror::Error)]
pub enum BenchError {
    #[error("failed to tear down history store {path:?} ({source})")]
    StoreTeardown {
        path: String,
        source: std::io::Error,
    },
    #[error("workload has no items to sample into the history store")]
    EmptyWorkload,
    #[error("malformed iteration count in log line {line:?}")]
    LogParse { line: String },
    #[error("failed to signal pid {pid} (errno {errno})")]
    ProcessSignal { pid: i32, errno: i32 },
    #[error("failed to archive {src:?} to {dst:?} ({source})")]
    ArchiveCopy {
        src: String,
        dst: String,
        source: std::io::Error,
    },
}

#[derive(Debug)]
pub struct Config {
    pub workload_path: String,
    pub store_path: String,
    pub log_path: String,
    pub start_script: String,
    pub images_dir: String,
    pub user: String,
    pub target_pattern: String,
    pub boot_kill_pattern: String,
    pub sizes: Vec<usize>,
    pub iterations: u64,
    pub sample_count: usize,
    pub poll_intv: Duration,
    pub poll_timeout: Option<Duration>,
}

impl Config {
    fn new(args: &Args) -> Self {
        Self {
            workload_path: format!("{}/config/benchmark.xml", &args.dir),
            store_path: format!("{}/context_store.sqlite", &args.dir),
            log_path: match &args.log_file {
                Some(v) => v.clone(),
                None => format!("{}/{}", &args.dir, Args::DFL_LOG_FILE),
            },
            start_script: match &args.start_script {
                Some(v) => v.clone(),
                None => format!("{}/{}", &args.dir, Args::DFL_START_SCRIPT),
            },
            images_dir: args.images_dir.clone(),
            user: args.user.clone(),
            target_pattern: args.target_pattern.clone(),
            boot_kill_pattern: args.boot_kill_pattern.clone(),
            sizes: args.sizes.clone(),
            iterations: args.iterations,
            sample_count: args.sample_count,
            poll_intv: Duration::from_secs(args.poll_intv),
            poll_timeout: match args.poll_timeout {
                0 => None,
                v => Some(Duration::from_secs(v)),
            },
        }
    }

    fn prepare_dirs(&self) -> Result<()> {
        for path in [&self.workload_path, &self.store_path, &self.log_path].iter() {
            if let Some(parent) = Path::new(path.as_str()).parent() {
                fs::create_dir_all(parent)?;
            }
        }
        Ok(())
    }
}

fn save_result(path: &str, results: &[run::CycleResult]) -> Result<()> {
    let serialized = serde_json::to_string_pretty(results)?;
    let mut f = fs::OpenOptions::new()
        .write(true)
        .create(true)
        .truncate(true)
        .open(path)?;
    f.write_all(serialized.as_ref())?;
    Ok(())
}

fn main() {
    setup_prog_state();

    let args = match Args::parse() {
        Ok(v) => v,
        Err(e) => {
            init_logging(0);
            error!("Failed to process arguments ({:#})", &e);
            exit(1);
        }
    };
    init_logging(args.verbosity);

    let cfg = Config::new(&args);
    if let Err(e) = cfg.prepare_dirs() {
        error!("Failed to prepare directories under {:?} ({:#})", &args.dir, &e);
        exit(1);
    }

    let results = match run::run_suite(&cfg) {
        Ok(v) => v,
        Err(e) => {
            error!("Benchmark suite aborted ({:#})", &e);
            exit(1);
        }
    };

    if let Some(path) = args.result.as_ref() {
        if let Err(e) = save_result(path, &results) {
            error!("Failed to write result file {:?} ({:#})", path, &e);
            exit(1);
        }
        info!("Result summary saved to {:?}", path);
    }
}
