//! Formatting helpers for terminal tables.

/// Truncate a string to a maximum length, adding ellipsis if needed
pub fn truncate_string(s: &str, max_len: usize) -> String {
    if s.chars().count() <= max_len {
        s.to_string()
    } else if max_len <= 3 {
        s.chars().take(max_len).collect()
    } else {
        let truncated: String = s.chars().take(max_len - 3).collect();
        format!("{}...", truncated)
    }
}

/// Format an optional string, returning a default if None or empty
pub fn format_optional(value: Option<&str>, default: &str) -> String {
    value.filter(|v| !v.is_empty()).unwrap_or(default).to_string()
}

/// Amount with currency code and thousands separators, `-` when absent
pub fn format_money(amount: Option<f64>, currency: &str) -> String {
    let Some(amount) = amount else {
        return "-".to_string();
    };
    let cents = (amount.abs() * 100.0).round() as u64;
    let whole = (cents / 100).to_string();
    let mut grouped = String::new();
    for (i, c) in whole.chars().enumerate() {
        if i > 0 && (whole.len() - i) % 3 == 0 {
            grouped.push(',');
        }
        grouped.push(c);
    }
    let sign = if amount < 0.0 { "-" } else { "" };
    format!("{} {}{}.{:02}", currency, sign, grouped, cents % 100)
}

/// Human-readable time left, e.g. `4m 05s`, or `expired`
pub fn format_remaining(secs: i64) -> String {
    if secs <= 0 {
        "expired".to_string()
    } else if secs < 3600 {
        format!("{}m {:02}s", secs / 60, secs % 60)
    } else {
        format!("{}h {:02}m", secs / 3600, (secs % 3600) / 60)
    }
}

/// Time left until the unix timestamp `exp`, as seen at `now`
pub fn format_expiry(exp: i64, now: i64) -> String {
    format_remaining(exp.saturating_sub(now))
}
