// Copyright (c) Facebook, Inc. and its affiliates.
//
// The scheduling log is the only progress signal the player gives us.
// Iteration lines look like
//
//   2019-03-20 12:00:01 INFO start_iteration 42 ...
//
// with the counter as the field after the marker (5th whitespace token).
use anyhow::Result;
use std::fs;
use std::io;
use std::path::Path;

use super::BenchError;
use sched_bench_intf::ITER_MARKER;

const ITER_TOKEN_POS: usize = 4;

// Missing log means the player hasn't created it yet, not an error. A line
// that carries the marker but no parsable counter is a broken log contract
// and surfaces as such instead of reading as "no progress".
pub fn current_iteration<P: AsRef<Path>>(log_path: P) -> Result<u64> {
    let content = match fs::read_to_string(&log_path) {
        Ok(v) => v,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(0),
        Err(e) => return Err(e.into()),
    };

    for line in content.lines().rev() {
        if !line.contains(ITER_MARKER) {
            continue;
        }
        return line
            .split_whitespace()
            .nth(ITER_TOKEN_POS)
            .and_then(|tok| tok.parse::<u64>().ok())
            .ok_or_else(|| {
                BenchError::LogParse {
                    line: line.to_string(),
                }
                .into()
            });
    }
    Ok(0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn write_log(lines: &[&str]) -> tempfile::NamedTempFile {
        let mut f = tempfile::NamedTempFile::new().unwrap();
        for line in lines {
            writeln!(f, "{}", line).unwrap();
        }
        f.flush().unwrap();
        f
    }

    #[test]
    fn test_missing_log_reads_as_zero() {
        assert_eq!(current_iteration("/no/such/dir/scheduling.log").unwrap(), 0);
    }

    #[test]
    fn test_log_without_marker_reads_as_zero() {
        let f = write_log(&[
            "2019-03-20 12:00:00 INFO scheduler_started",
            "2019-03-20 12:00:01 DEBUG fetching content set",
        ]);
        assert_eq!(current_iteration(f.path()).unwrap(), 0);
    }

    #[test]
    fn test_most_recent_marker_wins() {
        let f = write_log(&[
            "2019-03-20 12:00:01 INFO start_iteration 1 begin",
            "2019-03-20 12:00:03 DEBUG ranking items",
            "2019-03-20 12:00:05 INFO start_iteration 42 begin",
            "2019-03-20 12:00:06 DEBUG item chosen",
        ]);
        assert_eq!(current_iteration(f.path()).unwrap(), 42);
    }

    #[test]
    fn test_malformed_marker_line_is_an_error() {
        let f = write_log(&["2019-03-20 12:00:05 INFO start_iteration oops"]);
        let err = current_iteration(f.path()).unwrap_err();
        match err.downcast_ref::<BenchError>() {
            Some(BenchError::LogParse { .. }) => {}
            other => panic!("unexpected error {:?}", other),
        }
    }

    #[test]
    fn test_truncated_marker_line_is_an_error() {
        let f = write_log(&["2019-03-20 12:00:05 INFO start_iteration"]);
        assert!(current_iteration(f.path()).is_err());
    }
}
