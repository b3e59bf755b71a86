// Copyright (c) Facebook, Inc. and its affiliates.
//
// Player process lifecycle. The player is an opaque set of OS processes
// identified only by owning user and a cmdline substring; enumeration is
// in-process so there is no helper subprocess to exclude from the kill set.
use anyhow::{Context, Result};
use log::{debug, info, warn};
use std::collections::HashSet;
use std::process::{Child, Command, Stdio};
use sysinfo::{ProcessRefreshKind, RefreshKind, System, Users};

use super::BenchError;

pub fn list_matching(pattern: &str, user: &str) -> Vec<(i32, String)> {
    let sys = System::new_with_specifics(
        RefreshKind::new().with_processes(ProcessRefreshKind::everything()),
    );
    let users = Users::new_with_refreshed_list();

    let mut matched = Vec::new();
    for (pid, process) in sys.processes() {
        let owner = process
            .user_id()
            .and_then(|uid| users.get_user_by_id(uid))
            .map(|u| u.name().to_string())
            .unwrap_or_default();
        if owner != user {
            continue;
        }
        let cmdline = if process.cmd().is_empty() {
            process.name().to_string()
        } else {
            process.cmd().join(" ")
        };
        if cmdline.contains(pattern) {
            matched.push((pid.as_u32() as i32, cmdline));
        }
    }
    matched
}

// Own pid and explicit exclusions are dropped even when their cmdline
// matches the pattern.
fn filter_victims(
    matched: Vec<(i32, String)>,
    own_pid: i32,
    exclude_pids: &HashSet<i32>,
) -> Vec<(i32, String)> {
    matched
        .into_iter()
        .filter(|(pid, _)| {
            if *pid == own_pid {
                info!("proc: Ignoring own pid {}", pid);
                return false;
            }
            if exclude_pids.contains(pid) {
                info!("proc: Ignoring excluded pid {}", pid);
                return false;
            }
            true
        })
        .collect()
}

fn kill_one(pid: i32) -> std::result::Result<(), BenchError> {
    if unsafe { libc::kill(pid as libc::pid_t, libc::SIGKILL) } < 0 {
        let errno = unsafe { *libc::__errno_location() };
        return Err(BenchError::ProcessSignal { pid, errno });
    }
    Ok(())
}

pub fn kill_all_matching(pattern: &str, user: &str, exclude_pids: &HashSet<i32>) -> Result<()> {
    let matched = list_matching(pattern, user);
    if matched.is_empty() {
        debug!(
            "proc: Nothing matching {:?} owned by {:?}",
            pattern, user
        );
        return Ok(());
    }

    let own_pid = std::process::id() as i32;
    for (pid, cmdline) in filter_victims(matched, own_pid, exclude_pids) {
        info!("proc: Killing {} ({:?})", pid, &cmdline);
        if let Err(e) = kill_one(pid) {
            // the process exiting on its own is the end state we wanted
            warn!("proc: {}", &e);
        }
    }
    Ok(())
}

// Fire-and-forget launch; the player daemonizes its own components and the
// handle is never waited on.
pub fn start(script: &str) -> Result<Child> {
    let child = Command::new(script)
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .spawn()
        .with_context(|| format!("launching {:?}", script))?;
    info!("proc: Started {:?} (pid {})", script, child.id());
    Ok(child)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_filter_never_selects_own_or_excluded() {
        let matched = vec![
            (100, "player scheduler".to_string()),
            (200, "player renderer".to_string()),
            (300, "player watchdog".to_string()),
        ];
        let mut exclude = HashSet::new();
        exclude.insert(300);

        let victims = filter_victims(matched, 200, &exclude);
        let pids: Vec<i32> = victims.iter().map(|(pid, _)| *pid).collect();
        assert_eq!(pids, vec![100]);
    }

    #[test]
    fn test_filter_empty_input() {
        assert!(filter_victims(Vec::new(), 1, &HashSet::new()).is_empty());
    }

    #[test]
    fn test_kill_all_without_matches_is_noop() {
        // no user or cmdline will ever match these
        kill_all_matching("sched-bench-no-such-cmdline", "sched-bench-no-such-user", &HashSet::new())
            .unwrap();
    }

    #[test]
    fn test_kill_one_reports_gone_process() {
        // pid from the far end of the default pid space, long exited
        let err = match kill_one(i32::MAX - 1) {
            Err(e) => e,
            Ok(()) => return, // improbable live pid, nothing to assert
        };
        match err {
            BenchError::ProcessSignal { errno, .. } => assert_eq!(errno, libc::ESRCH),
            other => panic!("unexpected error {:?}", other),
        }
    }
}
