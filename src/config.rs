//! Server configuration parsed from environment variables.

use gridlayout::model::DEFAULT_USER_ID;

#[cfg(test)]
#[path = "config_test.rs"]
mod tests;

pub const DEFAULT_PORT: u16 = 8000;
pub const DEFAULT_DB_MAX_CONNECTIONS: u32 = 5;

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("{0} is required")]
    Missing(&'static str),
    #[error("invalid {key}: {value:?}")]
    Invalid { key: &'static str, value: String },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerConfig {
    pub database_url: String,
    pub port: u16,
    pub db_max_connections: u32,
    /// Owner of the single customization document this server serves.
    pub user_id: String,
}

impl ServerConfig {
    /// Build from environment variables.
    ///
    /// Required:
    /// - `DATABASE_URL`
    ///
    /// Optional:
    /// - `PORT`: default 8000
    /// - `DB_MAX_CONNECTIONS`: default 5
    /// - `CUSTOMIZATION_USER_ID`: default `default`
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] if `DATABASE_URL` is missing or `PORT` is not a port number.
    pub fn from_env() -> Result<Self, ConfigError> {
        let database_url = std::env::var("DATABASE_URL")
            .map_err(|_| ConfigError::Missing("DATABASE_URL"))?
            .trim()
            .to_owned();
        if database_url.is_empty() {
            return Err(ConfigError::Missing("DATABASE_URL"));
        }

        let port = match std::env::var("PORT") {
            Ok(raw) => raw
                .trim()
                .parse::<u16>()
                .map_err(|_| ConfigError::Invalid { key: "PORT", value: raw.clone() })?,
            Err(_) => DEFAULT_PORT,
        };

        let user_id = std::env::var("CUSTOMIZATION_USER_ID")
            .map(|v| v.trim().to_owned())
            .unwrap_or_default();

        Ok(Self {
            database_url,
            port,
            db_max_connections: env_parse("DB_MAX_CONNECTIONS", DEFAULT_DB_MAX_CONNECTIONS),
            user_id: if user_id.is_empty() { DEFAULT_USER_ID.to_owned() } else { user_id },
        })
    }
}

fn env_parse<T>(key: &str, default: T) -> T
where
    T: std::str::FromStr + Copy,
{
    match std::env::var(key) {
        Ok(raw) => raw.trim().parse::<T>().unwrap_or(default),
        Err(_) => default,
    }
}
