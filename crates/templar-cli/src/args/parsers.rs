//! Custom value parsers for CLI arguments.

use std::time::Duration;

use templar_common_config::TemplateData;

/// Parse `--data` as a JSON object.
pub fn parse_data(s: &str) -> Result<TemplateData, String> {
    const NOT_A_DICT: &str = r#"--data must be a dictionary, e.g. --data '{"foo": "bar"}'"#;

    let value: serde_json::Value = serde_json::from_str(s).map_err(|e| format!("{NOT_A_DICT}: {e}"))?;
    match value {
        serde_json::Value::Object(map) => Ok(map.into_iter().collect()),
        _ => Err(NOT_A_DICT.to_string()),
    }
}

/// Parse a duration with unit suffix (e.g., "500ms", "2s", "1m")
pub fn parse_duration(s: &str) -> Result<Duration, String> {
    let s = s.trim();

    if s.is_empty() {
        return Err("Duration cannot be empty".to_string());
    }

    let (num, unit) = if let Some(num) = s.strip_suffix("ms") {
        (num, "ms")
    } else if let Some(num) = s.strip_suffix('s') {
        (num, "s")
    } else if let Some(num) = s.strip_suffix('m') {
        (num, "m")
    } else {
        (s, "s")
    };

    let value: u64 = num.parse().map_err(|_| format!("Invalid number: {num}"))?;

    let millis = match unit {
        "ms" => value,
        "s" => value * 1000,
        _ => value * 60 * 1000,
    };

    if millis == 0 {
        return Err("Duration must be positive".to_string());
    }
    Ok(Duration::from_millis(millis))
}
