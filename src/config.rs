use std::{env, io};

use secrecy::SecretString;
use serde::Serialize;
use tracing::debug;

const DEFAULT_TELEMETRY_BUFFER_MAX_BYTES: u64 = 5 * 1024 * 1024;
const DEFAULT_TELEMETRY_BUFFER_MAX_FILES: usize = 5;
const DEFAULT_ANALYSIS_ENDPOINT: &str =
    "https://generativelanguage.googleapis.com/v1beta/models";
const DEFAULT_MONITOR_API_BASE: &str = "http://127.0.0.1:8000/api";
const DEFAULT_MONITOR_STREAM_URL: &str = "ws://127.0.0.1:8000/ws/updates";

#[derive(Clone, Debug)]
pub struct AppConfig {
    pub analysis_endpoint: String,
    pub analysis_api_key: Option<SecretString>,
    pub analysis_model: String,
    pub analysis_timeout_secs: u64,
    pub analysis_cache_enabled: bool,
    pub monitor_api_base: String,
    pub monitor_stream_url: String,
    pub stream_reconnect_secs: u64,
    pub monitor_poll_secs: u64,
    pub hold_duration_ms: u64,
    pub telemetry_enabled_by_default: bool,
    pub telemetry_batch_size: usize,
    pub telemetry_buffer_max_bytes: u64,
    pub telemetry_buffer_max_files: usize,
    pub settings_file_name: String,
}

#[derive(Clone, Debug, Serialize)]
pub struct PublicAppConfig {
    pub analysis_endpoint: String,
    pub analysis_model: String,
    pub analysis_timeout_secs: u64,
    pub analysis_cache_enabled: bool,
    pub monitor_api_base: String,
    pub monitor_stream_url: String,
    pub stream_reconnect_secs: u64,
    pub monitor_poll_secs: u64,
    pub hold_duration_ms: u64,
    pub telemetry_enabled_by_default: bool,
    pub telemetry_batch_size: usize,
    pub telemetry_buffer_max_bytes: u64,
    pub telemetry_buffer_max_files: usize,
    pub settings_file_name: String,
    pub has_analysis_key: bool,
}

impl AppConfig {
    pub fn from_env() -> Self {
        load_dotenv_if_applicable();
        Self {
            analysis_endpoint: env::var("ANALYSIS_ENDPOINT")
                .unwrap_or_else(|_| DEFAULT_ANALYSIS_ENDPOINT.to_string()),
            analysis_api_key: env::var("ANALYSIS_API_KEY")
                .ok()
                .filter(|v| !v.trim().is_empty())
                .map(SecretString::from),
            analysis_model: env::var("ANALYSIS_MODEL")
                .unwrap_or_else(|_| "gemini-2.0-flash".to_string()),
            analysis_timeout_secs: parse_u64("ANALYSIS_TIMEOUT_SECS", 120),
            analysis_cache_enabled: parse_bool("ANALYSIS_CACHE_ENABLED", true),
            monitor_api_base: env::var("MONITOR_API_BASE")
                .unwrap_or_else(|_| DEFAULT_MONITOR_API_BASE.to_string()),
            monitor_stream_url: env::var("MONITOR_STREAM_URL")
                .unwrap_or_else(|_| DEFAULT_MONITOR_STREAM_URL.to_string()),
            stream_reconnect_secs: parse_u64("STREAM_RECONNECT_SECS", 5).max(1),
            monitor_poll_secs: parse_u64("MONITOR_POLL_SECS", 30).max(1),
            hold_duration_ms: parse_u64("HOLD_DURATION_MS", 2_000).max(1),
            telemetry_enabled_by_default: parse_bool("TELEMETRY_ENABLED", true),
            telemetry_batch_size: parse_usize("TELEMETRY_BATCH_SIZE", 25).max(1),
            telemetry_buffer_max_bytes: parse_u64(
                "TELEMETRY_BUFFER_MAX_BYTES",
                DEFAULT_TELEMETRY_BUFFER_MAX_BYTES,
            ),
            telemetry_buffer_max_files: parse_usize(
                "TELEMETRY_BUFFER_MAX_FILES",
                DEFAULT_TELEMETRY_BUFFER_MAX_FILES,
            )
            .max(1),
            settings_file_name: env::var("SETTINGS_FILE_NAME")
                .unwrap_or_else(|_| "disaster-ai-settings.json".to_string()),
        }
    }

    pub fn public_profile(&self) -> PublicAppConfig {
        PublicAppConfig {
            analysis_endpoint: self.analysis_endpoint.clone(),
            analysis_model: self.analysis_model.clone(),
            analysis_timeout_secs: self.analysis_timeout_secs,
            analysis_cache_enabled: self.analysis_cache_enabled,
            monitor_api_base: self.monitor_api_base.clone(),
            monitor_stream_url: self.monitor_stream_url.clone(),
            stream_reconnect_secs: self.stream_reconnect_secs,
            monitor_poll_secs: self.monitor_poll_secs,
            hold_duration_ms: self.hold_duration_ms,
            telemetry_enabled_by_default: self.telemetry_enabled_by_default,
            telemetry_batch_size: self.telemetry_batch_size,
            telemetry_buffer_max_bytes: self.telemetry_buffer_max_bytes,
            telemetry_buffer_max_files: self.telemetry_buffer_max_files,
            settings_file_name: self.settings_file_name.clone(),
            has_analysis_key: self.analysis_api_key.is_some(),
        }
    }
}

fn load_dotenv_if_applicable() {
    if !should_load_dotenv() {
        debug!("skipping .env load outside dev mode");
        return;
    }

    if let Err(err) = dotenvy::dotenv() {
        match &err {
            dotenvy::Error::Io(io_err) if io_err.kind() == io::ErrorKind::NotFound => {}
            _ => debug!(?err, "unable to load .env file"),
        }
    }
}

fn should_load_dotenv() -> bool {
    cfg!(debug_assertions) || parse_bool("ALLOW_DOTENV", false)
}

fn parse_bool(key: &str, default: bool) -> bool {
    env::var(key)
        .map(|v| matches!(v.trim(), "1" | "true" | "TRUE" | "True"))
        .unwrap_or(default)
}

fn parse_u64(key: &str, default: u64) -> u64 {
    env::var(key)
        .ok()
        .and_then(|v| v.parse::<u64>().ok())
        .unwrap_or(default)
}

fn parse_usize(key: &str, default: usize) -> usize {
    env::var(key)
        .ok()
        .and_then(|v| v.parse::<usize>().ok())
        .unwrap_or(default)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builds_public_profile_without_secrets() {
        env::set_var("ANALYSIS_API_KEY", "secret");
        env::set_var("ANALYSIS_MODEL", "custom-model");
        env::set_var("HOLD_DURATION_MS", "1500");
        env::set_var("TELEMETRY_ENABLED", "false");

        let config = AppConfig::from_env();
        let public = config.public_profile();

        assert_eq!(public.analysis_model, "custom-model");
        assert_eq!(public.hold_duration_ms, 1500);
        assert!(!public.telemetry_enabled_by_default);
        assert!(public.has_analysis_key);
        assert!(config.analysis_api_key.is_some());
        assert_eq!(
            public.telemetry_buffer_max_bytes,
            DEFAULT_TELEMETRY_BUFFER_MAX_BYTES
        );

        env::remove_var("ANALYSIS_API_KEY");
        env::remove_var("ANALYSIS_MODEL");
        env::remove_var("HOLD_DURATION_MS");
        env::remove_var("TELEMETRY_ENABLED");
    }

    #[test]
    fn invalid_numeric_env_falls_back_to_default() {
        env::set_var("MONITOR_POLL_SECS", "not-a-number");
        let config = AppConfig::from_env();
        assert_eq!(config.monitor_poll_secs, 30);
        env::remove_var("MONITOR_POLL_SECS");
    }
}
