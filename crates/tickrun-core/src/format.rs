//! Human-readable duration and memory formatting shared by the run contexts.

use std::time::Duration;

/// Format a duration the way the run summary shows it ("< 1 sec", "3 secs", "2 mins").
pub fn format_duration(duration: Duration) -> String {
    let secs = duration.as_secs();
    if secs == 0 {
        return "< 1 sec".to_string();
    }

    let (value, unit) = match secs {
        s if s < 60 => (s, "sec"),
        s if s < 3600 => (s / 60, "min"),
        s if s < 86_400 => (s / 3600, "hr"),
        s => (s / 86_400, "day"),
    };
    if value == 1 {
        format!("1 {}", unit)
    } else {
        format!("{} {}s", value, unit)
    }
}

/// Format a signed byte count ("0 B", "512 B", "1.5 KB", "-2.0 MB").
pub fn format_memory(bytes: i64) -> String {
    const UNITS: [&str; 4] = ["KB", "MB", "GB", "TB"];

    let sign = if bytes < 0 { "-" } else { "" };
    let magnitude = bytes.unsigned_abs();
    if magnitude < 1024 {
        return format!("{}{} B", sign, magnitude);
    }

    let mut value = magnitude as f64 / 1024.0;
    let mut unit = 0;
    while value >= 1024.0 && unit < UNITS.len() - 1 {
        value /= 1024.0;
        unit += 1;
    }
    format!("{}{:.1} {}", sign, value, UNITS[unit])
}
