use std::sync::{Mutex, MutexGuard, PoisonError};

use super::*;

static ENV_LOCK: Mutex<()> = Mutex::new(());

fn env_guard() -> MutexGuard<'static, ()> {
    ENV_LOCK.lock().unwrap_or_else(PoisonError::into_inner)
}

/// # Safety
/// Callers hold [`env_guard`] so no other test touches these variables.
unsafe fn clear_server_env() {
    unsafe {
        std::env::remove_var("DATABASE_URL");
        std::env::remove_var("PORT");
        std::env::remove_var("DB_MAX_CONNECTIONS");
        std::env::remove_var("CUSTOMIZATION_USER_ID");
    }
}

#[test]
fn from_env_requires_database_url() {
    let _env = env_guard();
    unsafe { clear_server_env() };
    assert_eq!(ServerConfig::from_env(), Err(ConfigError::Missing("DATABASE_URL")));

    unsafe { std::env::set_var("DATABASE_URL", "   ") };
    assert_eq!(ServerConfig::from_env(), Err(ConfigError::Missing("DATABASE_URL")));

    unsafe { clear_server_env() };
}

#[test]
fn from_env_applies_defaults() {
    let _env = env_guard();
    unsafe {
        clear_server_env();
        std::env::set_var("DATABASE_URL", "postgres://localhost/studyboard");
    }

    let cfg = ServerConfig::from_env().unwrap();
    assert_eq!(cfg.database_url, "postgres://localhost/studyboard");
    assert_eq!(cfg.port, DEFAULT_PORT);
    assert_eq!(cfg.db_max_connections, DEFAULT_DB_MAX_CONNECTIONS);
    assert_eq!(cfg.user_id, "default");

    unsafe { clear_server_env() };
}

#[test]
fn from_env_parses_overrides() {
    let _env = env_guard();
    unsafe {
        clear_server_env();
        std::env::set_var("DATABASE_URL", "postgres://db/studyboard");
        std::env::set_var("PORT", "9100");
        std::env::set_var("DB_MAX_CONNECTIONS", "12");
        std::env::set_var("CUSTOMIZATION_USER_ID", "alice");
    }

    let cfg = ServerConfig::from_env().unwrap();
    assert_eq!(cfg.port, 9100);
    assert_eq!(cfg.db_max_connections, 12);
    assert_eq!(cfg.user_id, "alice");

    unsafe { clear_server_env() };
}

#[test]
fn from_env_rejects_bad_port() {
    let _env = env_guard();
    unsafe {
        clear_server_env();
        std::env::set_var("DATABASE_URL", "postgres://db/studyboard");
        std::env::set_var("PORT", "eighty");
    }

    assert_eq!(ServerConfig::from_env(), Err(ConfigError::Invalid { key: "PORT", value: "eighty".into() }));

    unsafe { clear_server_env() };
}

#[test]
fn bad_pool_size_falls_back_to_default() {
    unsafe { std::env::set_var("__STUDYBOARD_TEST_POOL__", "many") };
    assert_eq!(env_parse("__STUDYBOARD_TEST_POOL__", 5_u32), 5);
    unsafe { std::env::remove_var("__STUDYBOARD_TEST_POOL__") };
}
