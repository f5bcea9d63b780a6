//! Resident memory sampling for result and run-context measurements.

/// Current resident set size in bytes, where the platform exposes it.
pub fn resident_bytes() -> Option<i64> {
    let status = std::fs::read_to_string("/proc/self/status").ok()?;
    parse_vm_rss(&status)
}

/// Change in resident memory since `before`; 0 when either sample is missing.
pub fn delta_since(before: Option<i64>) -> i64 {
    match (before, resident_bytes()) {
        (Some(before), Some(after)) => after - before,
        _ => 0,
    }
}

fn parse_vm_rss(status: &str) -> Option<i64> {
    let line = status.lines().find(|l| l.starts_with("VmRSS:"))?;
    let kb: i64 = line.split_whitespace().nth(1)?.parse().ok()?;
    Some(kb * 1024)
}
