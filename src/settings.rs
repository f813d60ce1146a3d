use std::fs;
use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::warn;

pub const DEFAULT_PAGE_SIZE: u16 = 100;
pub const DEFAULT_RENAME_SPACING_MS: u64 = 110;
pub const DEFAULT_AUTH_POLL_INTERVAL_SECS: u64 = 2;
pub const DEFAULT_AUTH_TIMEOUT_SECS: u64 = 5 * 60;

const PAGE_SIZE_ENV: &str = "BATCHNAME_PAGE_SIZE";
const RENAME_SPACING_ENV: &str = "BATCHNAME_RENAME_SPACING_MS";

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct AppSettings {
    pub page_size: u16,
    pub rename_spacing_ms: u64,
    pub auth_poll_interval_secs: u64,
    pub auth_timeout_secs: u64,
}

impl Default for AppSettings {
    fn default() -> Self {
        Self {
            page_size: DEFAULT_PAGE_SIZE,
            rename_spacing_ms: DEFAULT_RENAME_SPACING_MS,
            auth_poll_interval_secs: DEFAULT_AUTH_POLL_INTERVAL_SECS,
            auth_timeout_secs: DEFAULT_AUTH_TIMEOUT_SECS,
        }
    }
}

impl AppSettings {
    /// Reads `settings.json`, falling back to defaults when the file is
    /// missing or unreadable, then applies environment overrides.
    pub fn load(path: &Path) -> Self {
        let mut settings = match fs::read_to_string(path) {
            Ok(raw) => serde_json::from_str::<AppSettings>(&raw).unwrap_or_else(|err| {
                warn!(path = %path.display(), "ignoring malformed settings file: {err}");
                AppSettings::default()
            }),
            Err(_) => AppSettings::default(),
        };
        settings.apply_env_overrides();
        settings.sanitize();
        settings
    }

    pub fn rename_spacing(&self) -> Duration {
        Duration::from_millis(self.rename_spacing_ms)
    }

    pub fn auth_poll_interval(&self) -> Duration {
        Duration::from_secs(self.auth_poll_interval_secs)
    }

    pub fn auth_timeout(&self) -> Duration {
        Duration::from_secs(self.auth_timeout_secs)
    }

    fn apply_env_overrides(&mut self) {
        if let Some(page_size) = env_var_non_empty(PAGE_SIZE_ENV).and_then(|v| v.parse().ok()) {
            self.page_size = page_size;
        }
        if let Some(spacing) = env_var_non_empty(RENAME_SPACING_ENV).and_then(|v| v.parse().ok()) {
            self.rename_spacing_ms = spacing;
        }
    }

    fn sanitize(&mut self) {
        // S3 caps a listing page at 1000 keys.
        self.page_size = self.page_size.clamp(1, 1000);
        self.auth_poll_interval_secs = self.auth_poll_interval_secs.max(1);
        self.auth_timeout_secs = self.auth_timeout_secs.max(self.auth_poll_interval_secs);
    }
}

fn env_var_non_empty(key: &str) -> Option<String> {
    std::env::var(key)
        .ok()
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn missing_file_yields_defaults() {
        let dir = TempDir::new().unwrap();
        let settings = AppSettings::load(&dir.path().join("settings.json"));
        assert_eq!(settings.rename_spacing_ms, DEFAULT_RENAME_SPACING_MS);
        assert_eq!(settings.auth_timeout_secs, DEFAULT_AUTH_TIMEOUT_SECS);
    }

    #[test]
    fn partial_file_keeps_remaining_defaults_and_clamps() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("settings.json");
        fs::write(&path, r#"{ "authTimeoutSecs": 30, "authPollIntervalSecs": 0 }"#).unwrap();

        let settings = AppSettings::load(&path);
        assert_eq!(settings.auth_timeout_secs, 30);
        assert_eq!(settings.auth_poll_interval_secs, 1);
        assert_eq!(settings.rename_spacing_ms, DEFAULT_RENAME_SPACING_MS);
    }

    #[test]
    fn malformed_file_falls_back_to_defaults() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("settings.json");
        fs::write(&path, "{ pageSize: ").unwrap();
        assert_eq!(AppSettings::load(&path).auth_timeout_secs, DEFAULT_AUTH_TIMEOUT_SECS);
    }
}
