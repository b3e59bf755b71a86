// Copyright (c) Facebook, Inc. and its affiliates.
use anyhow::{bail, Result};
use clap::{App, AppSettings, ArgMatches};
use serde::{Deserialize, Serialize};

lazy_static::lazy_static! {
    static ref ARGS_STR: String = {
        let dfl_args = Args::default();
        format!(
            "-d, --dir=[TOPDIR]           'Top dir of the player install (dfl: {dfl_dir})'
             -r, --result=[RESULTFILE]    'Per-size result summary json file'
             -s, --sizes=[LIST]           'Workload sizes, comma list and A-B ranges (dfl: 1-500)'
             -i, --iterations=[NR]        'Scheduling iterations to wait for per size (dfl: {dfl_iter})'
                 --sample-count=[NR]      'History rows seeded into the context store (dfl: {dfl_samples})'
                 --poll-intv=[SECS]       'Log poll interval (dfl: {dfl_intv}s)'
                 --poll-timeout=[SECS]    'Max wait for iteration progress, 0 for unbounded (dfl: {dfl_timeout})'
                 --images-dir=[DIR]       'Dir holding the referenced image assets (dfl: {dfl_images})'
             -u, --user=[NAME]            'User owning the player processes (dfl: {dfl_user})'
                 --target-pattern=[PAT]   'Cmdline substring identifying player processes (dfl: {dfl_target})'
                 --boot-kill-pattern=[PAT] 'Cmdline substring swept before the suite starts (dfl: {dfl_boot})'
                 --start-script=[PATH]    'Player startup script (dfl: TOPDIR/{dfl_script})'
                 --log-file=[PATH]        'Player scheduling log (dfl: TOPDIR/{dfl_log})'
             -v...                        'Sets the level of verbosity'",
            dfl_dir = dfl_args.dir,
            dfl_iter = dfl_args.iterations,
            dfl_samples = dfl_args.sample_count,
            dfl_intv = dfl_args.poll_intv,
            dfl_timeout = dfl_args.poll_timeout,
            dfl_images = dfl_args.images_dir,
            dfl_user = dfl_args.user,
            dfl_target = dfl_args.target_pattern,
            dfl_boot = dfl_args.boot_kill_pattern,
            dfl_script = Args::DFL_START_SCRIPT,
            dfl_log = Args::DFL_LOG_FILE,
        )
    };
}

const HELP_BODY: &str = "\
Drives the signage player through a sequence of workload sizes. For each
size the harness rewrites the content-descriptor document, reseeds the
context history store, starts the player, waits for the scheduling log to
report enough iterations, kills the player and archives the log.";

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Args {
    pub dir: String,
    pub result: Option<String>,
    pub sizes: Vec<usize>,
    pub iterations: u64,
    pub sample_count: usize,
    pub poll_intv: u64,
    pub poll_timeout: u64,
    pub images_dir: String,
    pub user: String,
    pub target_pattern: String,
    pub boot_kill_pattern: String,
    pub start_script: Option<String>,
    pub log_file: Option<String>,

    #[serde(skip)]
    pub verbosity: u32,
}

impl Default for Args {
    fn default() -> Self {
        Self {
            dir: "/var/lib/sched-bench".into(),
            result: None,
            sizes: (Self::DFL_SIZE_FIRST..=Self::DFL_SIZE_LAST).collect(),
            iterations: 30,
            sample_count: 1001,
            poll_intv: 2,
            poll_timeout: 0,
            images_dir: "/tmp".into(),
            user: "signage".into(),
            target_pattern: "signage".into(),
            boot_kill_pattern: "python3".into(),
            start_script: None,
            log_file: None,
            verbosity: 0,
        }
    }
}

impl Args {
    pub const DFL_SIZE_FIRST: usize = 1;
    pub const DFL_SIZE_LAST: usize = 500;
    pub const DFL_START_SCRIPT: &'static str = "start_scheduler_for_benchmark.sh";
    pub const DFL_LOG_FILE: &'static str = "logs/scheduling_manager.log";

    pub fn parse() -> Result<Self> {
        let matches = App::new("sched-bench")
            .version(clap::crate_version!())
            .about(HELP_BODY)
            .args_from_usage(&ARGS_STR)
            .setting(AppSettings::UnifiedHelpMessage)
            .setting(AppSettings::DeriveDisplayOrder)
            .get_matches();

        let mut args = Args::default();
        args.process_cmdline(&matches)?;
        Ok(args)
    }

    fn process_cmdline(&mut self, matches: &ArgMatches) -> Result<()> {
        if let Some(v) = matches.value_of("dir") {
            self.dir = v.trim_end_matches('/').to_string();
        }
        if let Some(v) = matches.value_of("result") {
            self.result = Some(v.to_string());
        }
        if let Some(v) = matches.value_of("sizes") {
            self.sizes = parse_size_list(v)?;
        }
        if let Some(v) = matches.value_of("iterations") {
            self.iterations = v.parse::<u64>()?;
        }
        if let Some(v) = matches.value_of("sample-count") {
            self.sample_count = v.parse::<usize>()?;
            if self.sample_count == 0 {
                bail!("sample-count must be >= 1");
            }
        }
        if let Some(v) = matches.value_of("poll-intv") {
            self.poll_intv = v.parse::<u64>()?;
            if self.poll_intv == 0 {
                bail!("poll-intv must be >= 1");
            }
        }
        if let Some(v) = matches.value_of("poll-timeout") {
            self.poll_timeout = v.parse::<u64>()?;
        }
        if let Some(v) = matches.value_of("images-dir") {
            self.images_dir = v.trim_end_matches('/').to_string();
        }
        if let Some(v) = matches.value_of("user") {
            self.user = v.to_string();
        }
        if let Some(v) = matches.value_of("target-pattern") {
            self.target_pattern = v.to_string();
        }
        if let Some(v) = matches.value_of("boot-kill-pattern") {
            self.boot_kill_pattern = v.to_string();
        }
        if let Some(v) = matches.value_of("start-script") {
            self.start_script = Some(v.to_string());
        }
        if let Some(v) = matches.value_of("log-file") {
            self.log_file = Some(v.to_string());
        }
        self.verbosity = matches.occurrences_of("v") as u32;
        Ok(())
    }
}

// "1,5,10-20" -> [1, 5, 10..=20]
pub fn parse_size_list(input: &str) -> Result<Vec<usize>> {
    let mut sizes = Vec::new();
    for tok in input.split(',') {
        let tok = tok.trim();
        if tok.is_empty() {
            continue;
        }
        match tok.split_once('-') {
            Some((first, last)) => {
                let first = first.trim().parse::<usize>()?;
                let last = last.trim().parse::<usize>()?;
                if first == 0 || last < first {
                    bail!("invalid size range {:?}", tok);
                }
                sizes.extend(first..=last);
            }
            None => {
                let v = tok.parse::<usize>()?;
                if v == 0 {
                    bail!("workload sizes must be >= 1");
                }
                sizes.push(v);
            }
        }
    }
    if sizes.is_empty() {
        bail!("no workload sizes specified");
    }
    Ok(sizes)
}
