//! Environment lookup and parsing for [`Settings`].
//!
//! # Design
//! - `from_lookup` takes an injectable lookup function so tests can supply a
//!   map instead of mutating process-global environment state.
//! - Variable names are the single source of truth for the configuration
//!   contract; defaults exist only for courtesy knobs.

use std::path::PathBuf;
use std::time::Duration;

use crate::error::{ConfigError, ConfigResult};
use crate::model::{PROVIDER_COUNT, Settings};
use crate::validate;

const PROVIDER_VARS: [&str; PROVIDER_COUNT] = [
    "MINER01", "MINER02", "MINER03", "MINER04", "MINER05", "MINER06",
];

const DEFAULT_DEAL_WRITE_PAUSE_MS: u64 = 2_000;

const DEFAULT_RETENTION_SUFFIXES: [&str; 5] =
    [".tar", ".tar.aes", ".tar.aes.car", ".deal", ".done"];

/// Load settings from the process environment.
///
/// # Errors
///
/// Returns an error if a required variable is absent or fails validation.
pub fn from_env() -> ConfigResult<Settings> {
    from_lookup(|name| std::env::var(name).ok())
}

/// Load settings through the provided variable lookup.
///
/// # Errors
///
/// Returns an error if a required variable is absent or fails validation.
pub fn from_lookup<F>(lookup: F) -> ConfigResult<Settings>
where
    F: Fn(&str) -> Option<String>,
{
    let server_id = require_non_empty(&lookup, "SERVER_ID")?;
    let source_dir = require_path(&lookup, "SOURCE_DIR")?;
    let target_dir = require_path(&lookup, "TARGET_DIR")?;
    let state_dir = require_path(&lookup, "STATE_DIR")?;
    let age_threshold_hours =
        validate::non_negative_f64("AGE_THRESHOLD_HOURS", &require(&lookup, "AGE_THRESHOLD_HOURS")?)?;
    let min_size_gib = validate::positive_f64("MIN_SIZE_GIB", &require(&lookup, "MIN_SIZE_GIB")?)?;
    let max_size_gib = validate::positive_f64("MAX_SIZE_GIB", &require(&lookup, "MAX_SIZE_GIB")?)?;
    if min_size_gib > max_size_gib {
        return Err(ConfigError::invalid(
            "MIN_SIZE_GIB",
            "must not exceed MAX_SIZE_GIB",
            min_size_gib.to_string(),
        ));
    }
    let archive_password = require_non_empty(&lookup, "ARCHIVE_PASSWORD")?;
    let web_server_host = require_non_empty(&lookup, "WEB_SERVER_HOST")?;
    let wallet_address = require_non_empty(&lookup, "WALLET_ADDRESS")?;

    let mut providers: [String; PROVIDER_COUNT] = Default::default();
    for (slot, name) in providers.iter_mut().zip(PROVIDER_VARS) {
        *slot = require_non_empty(&lookup, name)?;
    }

    let car_binary = require_path(&lookup, "CAR_BIN")?;

    let deal_write_pause = match lookup("DEAL_WRITE_PAUSE_MS") {
        Some(raw) => Duration::from_millis(validate::parse_u64("DEAL_WRITE_PAUSE_MS", &raw)?),
        None => Duration::from_millis(DEFAULT_DEAL_WRITE_PAUSE_MS),
    };

    let retention_suffixes = match lookup("RETENTION_SUFFIXES") {
        Some(raw) => validate::suffix_list("RETENTION_SUFFIXES", &raw)?,
        None => DEFAULT_RETENTION_SUFFIXES
            .iter()
            .map(|suffix| (*suffix).to_string())
            .collect(),
    };

    Ok(Settings {
        server_id,
        source_dir,
        target_dir,
        state_dir,
        age_threshold_hours,
        min_size_gib,
        max_size_gib,
        archive_password,
        web_server_host,
        wallet_address,
        providers,
        car_binary,
        deal_write_pause,
        retention_suffixes,
    })
}

fn require<F>(lookup: &F, name: &'static str) -> ConfigResult<String>
where
    F: Fn(&str) -> Option<String>,
{
    lookup(name).ok_or(ConfigError::missing(name))
}

fn require_non_empty<F>(lookup: &F, name: &'static str) -> ConfigResult<String>
where
    F: Fn(&str) -> Option<String>,
{
    validate::non_empty(name, require(lookup, name)?)
}

fn require_path<F>(lookup: &F, name: &'static str) -> ConfigResult<PathBuf>
where
    F: Fn(&str) -> Option<String>,
{
    require_non_empty(lookup, name).map(PathBuf::from)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn base_vars() -> HashMap<&'static str, String> {
        let mut vars = HashMap::new();
        vars.insert("SERVER_ID", "sv01".to_string());
        vars.insert("SOURCE_DIR", "/srv/users".to_string());
        vars.insert("TARGET_DIR", "/srv/archives".to_string());
        vars.insert("STATE_DIR", "/srv/state".to_string());
        vars.insert("AGE_THRESHOLD_HOURS", "48".to_string());
        vars.insert("MIN_SIZE_GIB", "3".to_string());
        vars.insert("MAX_SIZE_GIB", "5".to_string());
        vars.insert("ARCHIVE_PASSWORD", "secret".to_string());
        vars.insert("WEB_SERVER_HOST", "198.51.100.7".to_string());
        vars.insert("WALLET_ADDRESS", "f1wallet".to_string());
        for (index, name) in PROVIDER_VARS.into_iter().enumerate() {
            vars.insert(name, format!("f0100{index}"));
        }
        vars.insert("CAR_BIN", "/usr/local/bin/car".to_string());
        vars
    }

    fn lookup_in<'a>(
        vars: &'a HashMap<&'static str, String>,
    ) -> impl Fn(&str) -> Option<String> + 'a {
        move |name| vars.get(name).cloned()
    }

    #[test]
    fn loads_complete_environment() {
        let vars = base_vars();
        let settings = from_lookup(lookup_in(&vars)).unwrap();
        assert_eq!(settings.server_id, "sv01");
        assert_eq!(settings.providers[0], "f01000");
        assert_eq!(settings.providers[5], "f01005");
        assert_eq!(settings.deal_write_pause, Duration::from_secs(2));
        assert_eq!(settings.retention_suffixes.len(), 5);
    }

    #[test]
    fn missing_variable_is_reported_by_name() {
        let mut vars = base_vars();
        vars.remove("WALLET_ADDRESS");
        let err = from_lookup(lookup_in(&vars)).unwrap_err();
        assert!(matches!(
            err,
            ConfigError::MissingVar { name: "WALLET_ADDRESS" }
        ));
    }

    #[test]
    fn min_above_max_is_rejected() {
        let mut vars = base_vars();
        vars.insert("MIN_SIZE_GIB", "6".to_string());
        let err = from_lookup(lookup_in(&vars)).unwrap_err();
        assert!(matches!(err, ConfigError::InvalidVar { name: "MIN_SIZE_GIB", .. }));
    }

    #[test]
    fn pause_and_suffix_overrides_apply() {
        let mut vars = base_vars();
        vars.insert("DEAL_WRITE_PAUSE_MS", "0".to_string());
        vars.insert("RETENTION_SUFFIXES", ".tar.aes.car,.deal".to_string());
        let settings = from_lookup(lookup_in(&vars)).unwrap();
        assert_eq!(settings.deal_write_pause, Duration::ZERO);
        assert_eq!(
            settings.retention_suffixes,
            vec![".tar.aes.car".to_string(), ".deal".to_string()]
        );
    }
}
