// src/runner/metrics.rs

//! Resource sampling for a running process, read from `/proc`.
//!
//! Keys match what the admin shell's detail view expects: `cpu` in percent
//! and `memory` in MB.

use std::collections::BTreeMap;
use std::fs;
use std::time::Instant;

/// Tracks cpu-time deltas between samples for one pid.
#[derive(Debug)]
pub struct CpuTracker {
    pid: u32,
    last_ticks: Option<u64>,
    last_sampled: Option<Instant>,
}

impl CpuTracker {
    pub fn new(pid: u32) -> Self {
        Self {
            pid,
            last_ticks: None,
            last_sampled: None,
        }
    }

    /// Take one sample. Returns `None` when `/proc/<pid>` is gone or
    /// unreadable (the process exited between ticks, or a non-Linux host).
    pub fn sample(&mut self) -> Option<BTreeMap<String, f64>> {
        let ticks = total_cpu_ticks(self.pid)?;
        let now = Instant::now();

        let cpu_percent = match (self.last_ticks, self.last_sampled) {
            (Some(prev_ticks), Some(prev_at)) => {
                let elapsed = now.duration_since(prev_at).as_secs_f64();
                if elapsed > 0.0 {
                    let delta = ticks.saturating_sub(prev_ticks) as f64;
                    (delta / clock_ticks_per_sec() / elapsed) * 100.0
                } else {
                    0.0
                }
            }
            // First sample has no baseline.
            _ => 0.0,
        };

        self.last_ticks = Some(ticks);
        self.last_sampled = Some(now);

        let mut metrics = BTreeMap::new();
        metrics.insert("cpu".to_string(), round2(cpu_percent));
        if let Some(mb) = resident_memory_mb(self.pid) {
            metrics.insert("memory".to_string(), round2(mb));
        }
        Some(metrics)
    }
}

/// utime + stime from `/proc/<pid>/stat`, in clock ticks.
fn total_cpu_ticks(pid: u32) -> Option<u64> {
    let stat = fs::read_to_string(format!("/proc/{pid}/stat")).ok()?;

    // The comm field is parenthesised and may contain spaces; everything
    // after the closing paren is space-separated, starting at field 3.
    let rest = stat.rsplit_once(')').map(|(_, rest)| rest)?;
    let fields: Vec<&str> = rest.split_whitespace().collect();

    // utime and stime are fields 14 and 15 overall, i.e. indices 11 and 12
    // after the paren.
    let utime: u64 = fields.get(11)?.parse().ok()?;
    let stime: u64 = fields.get(12)?.parse().ok()?;
    Some(utime + stime)
}

/// VmRSS from `/proc/<pid>/status`, converted to MB.
fn resident_memory_mb(pid: u32) -> Option<f64> {
    let status = fs::read_to_string(format!("/proc/{pid}/status")).ok()?;
    for line in status.lines() {
        if let Some(rest) = line.strip_prefix("VmRSS:") {
            let kb: f64 = rest
                .trim()
                .trim_end_matches("kB")
                .trim()
                .parse()
                .ok()?;
            return Some(kb / 1024.0);
        }
    }
    None
}

fn clock_ticks_per_sec() -> f64 {
    // SAFETY: sysconf with a constant name.
    let ticks = unsafe { libc::sysconf(libc::_SC_CLK_TCK) };
    if ticks > 0 { ticks as f64 } else { 100.0 }
}

fn round2(v: f64) -> f64 {
    (v * 100.0).round() / 100.0
}
