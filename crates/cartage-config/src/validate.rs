//! Validation helpers for environment-sourced settings values.

use crate::error::{ConfigError, ConfigResult};

/// Reject empty or whitespace-only values.
pub(crate) fn non_empty(name: &'static str, value: String) -> ConfigResult<String> {
    if value.trim().is_empty() {
        return Err(ConfigError::invalid(name, "must not be empty", value));
    }
    Ok(value)
}

/// Parse a finite, non-negative floating point value.
pub(crate) fn non_negative_f64(name: &'static str, value: &str) -> ConfigResult<f64> {
    let parsed: f64 = value
        .parse()
        .map_err(|_| ConfigError::invalid(name, "must be a number", value.to_string()))?;
    if !parsed.is_finite() || parsed < 0.0 {
        return Err(ConfigError::invalid(
            name,
            "must be finite and non-negative",
            value.to_string(),
        ));
    }
    Ok(parsed)
}

/// Parse a finite, strictly positive floating point value.
pub(crate) fn positive_f64(name: &'static str, value: &str) -> ConfigResult<f64> {
    let parsed = non_negative_f64(name, value)?;
    if parsed == 0.0 {
        return Err(ConfigError::invalid(
            name,
            "must be greater than zero",
            value.to_string(),
        ));
    }
    Ok(parsed)
}

/// Parse an unsigned integer (used for millisecond pauses).
pub(crate) fn parse_u64(name: &'static str, value: &str) -> ConfigResult<u64> {
    value
        .parse()
        .map_err(|_| ConfigError::invalid(name, "must be an unsigned integer", value.to_string()))
}

/// Parse a comma-separated suffix list, rejecting empty segments.
pub(crate) fn suffix_list(name: &'static str, value: &str) -> ConfigResult<Vec<String>> {
    let suffixes: Vec<String> = value
        .split(',')
        .map(str::trim)
        .filter(|segment| !segment.is_empty())
        .map(str::to_string)
        .collect();
    if suffixes.is_empty() {
        return Err(ConfigError::invalid(
            name,
            "must contain at least one suffix",
            value.to_string(),
        ));
    }
    Ok(suffixes)
}
