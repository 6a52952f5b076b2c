use chrono::{DateTime, Utc};

const KIB: f64 = 1024.0;
const MIB: f64 = KIB * 1024.0;
const GIB: f64 = MIB * 1024.0;

/// Human readable size for a byte count transmitted as text.
///
/// Sizes above a GiB stay in GB rather than stepping up to TB.
pub fn format_size(bytes: Option<&str>) -> String {
    let Some(num) = bytes
        .map(str::trim)
        .filter(|raw| !raw.is_empty())
        .and_then(|raw| raw.parse::<f64>().ok())
        .filter(|num| num.is_finite() && *num >= 0.0)
    else {
        return "Unknown size".to_string();
    };

    if num < KIB {
        format!("{num} B")
    } else if num < MIB {
        format!("{:.1} KB", num / KIB)
    } else if num < GIB {
        format!("{:.1} MB", num / MIB)
    } else {
        format!("{:.2} GB", num / GIB)
    }
}

/// Coarse "time ago" wording for list rows.
pub fn format_age(at: DateTime<Utc>, now: DateTime<Utc>) -> String {
    let seconds = (now - at).num_seconds().max(0);
    let minutes = seconds / 60;
    let hours = minutes / 60;
    let days = hours / 24;

    let distance = if minutes < 1 {
        "less than a minute".to_string()
    } else if minutes < 45 {
        plural(minutes, "minute")
    } else if hours < 24 {
        format!("about {}", plural(hours.max(1), "hour"))
    } else if days < 30 {
        plural(days, "day")
    } else if days < 365 {
        format!("about {}", plural(days / 30, "month"))
    } else {
        format!("about {}", plural(days / 365, "year"))
    };
    format!("{distance} ago")
}

fn plural(count: i64, unit: &str) -> String {
    if count == 1 {
        format!("1 {unit}")
    } else {
        format!("{count} {unit}s")
    }
}
