//! Connect-timeout parsing: a bare number of seconds or `<n>ms|s|m|h`.

use regex::Regex;
use std::time::Duration;

/// Parse a positive duration
///
/// # Errors
///
/// Empty, malformed or zero input.
pub fn parse_duration(duration_str: &str) -> Result<Duration, String> {
    let trimmed = duration_str.trim();
    if trimmed.is_empty() {
        return Err("duration cannot be empty".to_string());
    }

    let duration_regex = Regex::new(r"^(?P<number>\d+)(?P<unit>ms|s|m|h)?$")
        .map_err(|e| format!("failed to compile regex: {e}"))?;
    let lower = trimmed.to_lowercase();
    let captures = duration_regex.captures(&lower).ok_or_else(|| {
        format!("invalid duration '{trimmed}', expected <number>[ms|s|m|h] (e.g. '5s', '500ms')")
    })?;

    let number: u64 = captures
        .name("number")
        .map(|m| m.as_str())
        .unwrap_or_default()
        .parse()
        .map_err(|e| format!("invalid number in duration '{trimmed}': {e}"))?;
    if number == 0 {
        return Err(format!("duration '{trimmed}' must be positive"));
    }

    let duration = match captures.name("unit").map(|m| m.as_str()) {
        Some("ms") => Duration::from_millis(number),
        None | Some("s") => Duration::from_secs(number),
        Some("m") => Duration::from_secs(number.saturating_mul(60)),
        Some("h") => Duration::from_secs(number.saturating_mul(3600)),
        Some(unit) => return Err(format!("unsupported duration unit '{unit}'")),
    };
    Ok(duration)
}
