//! Session and HTTP store settings parsed from environment variables.

use std::time::Duration;

use crate::model::{DEFAULT_GRID_COLS, DEFAULT_GRID_ROW_HEIGHT};

#[cfg(test)]
#[path = "config_test.rs"]
mod tests;

pub const DEFAULT_SAVE_DEBOUNCE_MS: u64 = 100;
pub const DEFAULT_SAVE_GRACE_MS: u64 = 500;
pub const DEFAULT_API_URL: &str = "http://127.0.0.1:8000/api";
pub const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 30;
pub const DEFAULT_CONNECT_TIMEOUT_SECS: u64 = 5;

/// Timing and grid geometry for a [`crate::session::BoardSession`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SessionConfig {
    /// Delay between a settings change and its save.
    pub save_debounce: Duration,
    /// How long reconciles stay suppressed after a save completes.
    pub save_grace: Duration,
    pub grid_cols: u32,
    pub grid_row_height: u32,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            save_debounce: Duration::from_millis(DEFAULT_SAVE_DEBOUNCE_MS),
            save_grace: Duration::from_millis(DEFAULT_SAVE_GRACE_MS),
            grid_cols: DEFAULT_GRID_COLS,
            grid_row_height: DEFAULT_GRID_ROW_HEIGHT,
        }
    }
}

impl SessionConfig {
    /// Build from environment variables, falling back to defaults.
    ///
    /// - `GRIDLAYOUT_SAVE_DEBOUNCE_MS`: default 100
    /// - `GRIDLAYOUT_SAVE_GRACE_MS`: default 500
    /// - `GRIDLAYOUT_GRID_COLS`: default 12
    /// - `GRIDLAYOUT_ROW_HEIGHT`: default 100
    #[must_use]
    pub fn from_env() -> Self {
        Self {
            save_debounce: Duration::from_millis(env_parse("GRIDLAYOUT_SAVE_DEBOUNCE_MS", DEFAULT_SAVE_DEBOUNCE_MS)),
            save_grace: Duration::from_millis(env_parse("GRIDLAYOUT_SAVE_GRACE_MS", DEFAULT_SAVE_GRACE_MS)),
            grid_cols: env_parse("GRIDLAYOUT_GRID_COLS", DEFAULT_GRID_COLS),
            grid_row_height: env_parse("GRIDLAYOUT_ROW_HEIGHT", DEFAULT_GRID_ROW_HEIGHT),
        }
    }
}

/// Where [`crate::http::HttpRepository`] finds the studyboard API.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpConfig {
    /// API root, e.g. `http://127.0.0.1:8000/api`. No trailing slash.
    pub base_url: String,
    pub request_timeout: Duration,
    pub connect_timeout: Duration,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self::with_base_url(DEFAULT_API_URL)
    }
}

impl HttpConfig {
    #[must_use]
    pub fn with_base_url(base_url: &str) -> Self {
        Self {
            base_url: base_url.trim_end_matches('/').to_owned(),
            request_timeout: Duration::from_secs(DEFAULT_REQUEST_TIMEOUT_SECS),
            connect_timeout: Duration::from_secs(DEFAULT_CONNECT_TIMEOUT_SECS),
        }
    }

    /// Build from environment variables.
    ///
    /// - `STUDYBOARD_API_URL`: default `http://127.0.0.1:8000/api`
    /// - `STUDYBOARD_REQUEST_TIMEOUT_SECS`: default 30
    /// - `STUDYBOARD_CONNECT_TIMEOUT_SECS`: default 5
    #[must_use]
    pub fn from_env() -> Self {
        let base_url = std::env::var("STUDYBOARD_API_URL").unwrap_or_else(|_| DEFAULT_API_URL.to_owned());
        Self {
            request_timeout: Duration::from_secs(env_parse(
                "STUDYBOARD_REQUEST_TIMEOUT_SECS",
                DEFAULT_REQUEST_TIMEOUT_SECS,
            )),
            connect_timeout: Duration::from_secs(env_parse(
                "STUDYBOARD_CONNECT_TIMEOUT_SECS",
                DEFAULT_CONNECT_TIMEOUT_SECS,
            )),
            ..Self::with_base_url(&base_url)
        }
    }
}

pub(crate) fn env_parse<T>(key: &str, default: T) -> T
where
    T: std::str::FromStr + Copy,
{
    match std::env::var(key) {
        Ok(raw) => raw.trim().parse::<T>().unwrap_or(default),
        Err(_) => default,
    }
}
