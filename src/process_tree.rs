//! Process Tree Tracker: enumerates descendant PIDs of a root by walking
//! `/proc`, and best-effort signals a set of PIDs.
//!
//! The teacher repo signals whole process groups (`kill(-pgid, sig)`) but
//! never walks genealogies. `descendants()` is a supplement grounded in the
//! `/proc/{pid}/stat` field-parsing idiom used elsewhere in the retrieval
//! pack for exactly this purpose (extracting `pgrp`/`tpgid` from the stat
//! line); here the same parse extracts `ppid` (field 4) to build a
//! child-of relation over every pid currently in `/proc`.

use std::collections::{HashMap, HashSet};
use std::fs;
use std::io;

use crate::process_signal::signal_process_group_or_pid;

/// Parses `ppid` out of `/proc/{pid}/stat`. The second field (`comm`) is
/// parenthesized and may itself contain spaces or parentheses, so we split
/// on the *last* `)` rather than whitespace naively.
fn parse_ppid(stat: &str) -> Option<i32> {
    let close = stat.rfind(')')?;
    let rest = stat.get(close + 1..)?;
    let mut fields = rest.split_whitespace();
    fields.next()?; // state
    fields.next()?.parse().ok()
}

fn read_ppid(pid: i32) -> Option<i32> {
    let stat = fs::read_to_string(format!("/proc/{pid}/stat")).ok()?;
    parse_ppid(&stat)
}

fn all_pids() -> Vec<i32> {
    let Ok(entries) = fs::read_dir("/proc") else {
        return Vec::new();
    };
    entries
        .filter_map(|entry| entry.ok())
        .filter_map(|entry| entry.file_name().to_str()?.parse::<i32>().ok())
        .collect()
}

/// Returns every pid transitively descended from `root`, not including
/// `root` itself. Walks `/proc` once to build a `pid -> ppid` map, then
/// does a breadth-first expansion from `root`.
pub fn descendants(root: i32) -> HashSet<i32> {
    let mut children_of: HashMap<i32, Vec<i32>> = HashMap::new();
    for pid in all_pids() {
        if let Some(ppid) = read_ppid(pid) {
            children_of.entry(ppid).or_default().push(pid);
        }
    }

    let mut result = HashSet::new();
    let mut frontier = vec![root];
    while let Some(pid) = frontier.pop() {
        if let Some(children) = children_of.get(&pid) {
            for &child in children {
                if result.insert(child) {
                    frontier.push(child);
                }
            }
        }
    }
    result
}

/// Best-effort delivers `signal` to every pid in `pids`. `ESRCH` (already
/// dead) and `EPERM` are not fatal to the batch; other errors are
/// collected and returned so the caller can log them, but the whole batch
/// is still attempted.
pub fn signal_all(pids: impl IntoIterator<Item = i32>, signal: i32) -> Vec<(i32, io::Error)> {
    let mut failures = Vec::new();
    for pid in pids {
        if let Err(err) = signal_process_group_or_pid(pid, signal, true) {
            failures.push((pid, err));
        }
    }
    failures
}
