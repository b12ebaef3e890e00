use std::{collections::HashMap, fs, path::Path, time::Duration};

use anyhow::Context;

pub const DEFAULT_SETTINGS_FILE: &str = "roster.toml";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CoordinatorSettings {
    pub temp_id_prefix: String,
    pub default_role: String,
    pub remote_timeout: Option<Duration>,
}

impl Default for CoordinatorSettings {
    fn default() -> Self {
        Self {
            temp_id_prefix: "temp_".into(),
            default_role: "member".into(),
            remote_timeout: None,
        }
    }
}

/// Defaults, then `roster.toml` in the working directory, then `ROSTER__*` env vars.
pub fn load_settings() -> CoordinatorSettings {
    let mut settings = CoordinatorSettings::default();

    if let Ok(raw) = fs::read_to_string(DEFAULT_SETTINGS_FILE) {
        if let Err(err) = apply_file_overrides(&mut settings, &raw) {
            tracing::warn!("config: ignoring {DEFAULT_SETTINGS_FILE}: {err:#}");
        }
    }

    let env: HashMap<String, String> = std::env::vars()
        .filter(|(key, _)| key.starts_with("ROSTER__"))
        .collect();
    apply_env_overrides(&mut settings, &env);

    settings
}

/// Like [`load_settings`] but the file must exist and parse.
pub fn load_settings_from(path: &Path) -> anyhow::Result<CoordinatorSettings> {
    let raw = fs::read_to_string(path)
        .with_context(|| format!("failed to read settings file '{}'", path.display()))?;
    let mut settings = CoordinatorSettings::default();
    apply_file_overrides(&mut settings, &raw)
        .with_context(|| format!("failed to parse settings file '{}'", path.display()))?;
    Ok(settings)
}

pub fn apply_file_overrides(settings: &mut CoordinatorSettings, raw: &str) -> anyhow::Result<()> {
    let file_cfg = toml::from_str::<HashMap<String, toml::Value>>(raw)?;

    if let Some(v) = file_cfg.get("temp_id_prefix").and_then(toml::Value::as_str) {
        if !v.is_empty() {
            settings.temp_id_prefix = v.to_string();
        }
    }
    if let Some(v) = file_cfg.get("default_role").and_then(toml::Value::as_str) {
        settings.default_role = v.to_string();
    }
    if let Some(v) = file_cfg
        .get("remote_timeout_ms")
        .and_then(toml::Value::as_integer)
    {
        settings.remote_timeout = timeout_from_millis(v);
    }

    Ok(())
}

pub fn apply_env_overrides(settings: &mut CoordinatorSettings, env: &HashMap<String, String>) {
    if let Some(v) = env.get("ROSTER__TEMP_ID_PREFIX") {
        if !v.is_empty() {
            settings.temp_id_prefix = v.clone();
        }
    }
    if let Some(v) = env.get("ROSTER__DEFAULT_ROLE") {
        if !v.is_empty() {
            settings.default_role = v.clone();
        }
    }
    if let Some(v) = env.get("ROSTER__REMOTE_TIMEOUT_MS") {
        if let Ok(parsed) = v.trim().parse::<i64>() {
            settings.remote_timeout = timeout_from_millis(parsed);
        }
    }
}

// Zero or negative disables the timeout.
fn timeout_from_millis(ms: i64) -> Option<Duration> {
    u64::try_from(ms)
        .ok()
        .filter(|ms| *ms > 0)
        .map(Duration::from_millis)
}

#[cfg(test)]
#[path = "tests/config_tests.rs"]
mod tests;
