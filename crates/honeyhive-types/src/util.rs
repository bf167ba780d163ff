use chrono::Utc;

/// Current UTC time in unix milliseconds
pub fn now_millis() -> i64 {
    Utc::now().timestamp_millis()
}

/// Current UTC time in unix nanoseconds
pub fn now_nanos() -> i64 {
    Utc::now()
        .timestamp_nanos_opt()
        .unwrap_or(i64::MAX)
}

/// Convert a nanosecond timestamp to milliseconds
pub fn nanos_to_millis(ns: i64) -> i64 {
    ns / 1_000_000
}

/// Truncate a string to a maximum length
pub fn truncate(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        s.to_string()
    } else {
        s.chars().take(max).collect::<String>() + "...(truncated)"
    }
}
