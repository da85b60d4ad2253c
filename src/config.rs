use std::env;

use anyhow::{Context, anyhow};
use chrono_tz::Tz;

/// Minimum length of the session signing key, in bytes.
const MIN_SECRET_LEN: usize = 32;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AppEnv {
    Development,
    Production,
}

#[derive(Clone, Debug)]
pub struct SessionConfig {
    pub secret: String,
    pub ttl_secs: i64,
    pub cookie_name: String,
    /// Sets the `Secure` attribute on the session cookie.
    pub secure_cookie: bool,
}

#[derive(Clone)]
pub struct Config {
    pub database_url: String,
    pub server_addr: String,
    pub db_max_connections: u32,
    pub app_env: AppEnv,
    pub session: SessionConfig,

    /// Wall-clock zone all attendance timestamps are recorded in.
    pub timezone: Tz,
    pub late_grace_minutes: i64,

    // Rate limiting
    pub rate_login_per_min: u32,
    pub rate_protected_per_min: u32,

    pub api_prefix: String,
    pub log_dir: String,
    pub log_level: String,
}

fn var_or(key: &str, default: &str) -> String {
    env::var(key).unwrap_or_else(|_| default.to_string())
}

fn parse_var<T>(key: &str, default: &str) -> anyhow::Result<T>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    let raw = var_or(key, default);
    raw.parse::<T>()
        .map_err(|e| anyhow!("{key} has an invalid value {raw:?}: {e}"))
}

impl AppEnv {
    fn parse(raw: &str) -> Self {
        match raw.trim().to_ascii_lowercase().as_str() {
            "development" | "dev" | "local" => AppEnv::Development,
            _ => AppEnv::Production,
        }
    }
}

impl Config {
    pub fn from_env() -> anyhow::Result<Self> {
        dotenvy::dotenv().ok();

        let secret = env::var("SESSION_SECRET").context("SESSION_SECRET must be set")?;
        if secret.len() < MIN_SECRET_LEN {
            return Err(anyhow!(
                "SESSION_SECRET must be at least {MIN_SECRET_LEN} bytes"
            ));
        }

        let app_env = AppEnv::parse(&var_or("APP_ENV", "production"));

        let tz_name = var_or("APP_TIMEZONE", "Asia/Jakarta");
        let timezone: Tz = tz_name
            .parse()
            .map_err(|e| anyhow!("APP_TIMEZONE {tz_name:?} is not a valid IANA zone: {e}"))?;

        Ok(Self {
            server_addr: env::var("SERVER_ADDR").context("SERVER_ADDR must be set")?,
            database_url: env::var("DATABASE_URL").context("DATABASE_URL must be set")?,
            db_max_connections: parse_var("DB_MAX_CONNECTIONS", "10")?,
            app_env,
            session: SessionConfig {
                secret,
                ttl_secs: parse_var("SESSION_TTL_SECS", "28800")?, // default 8 hours
                cookie_name: var_or("SESSION_COOKIE_NAME", "hr_session"),
                secure_cookie: app_env == AppEnv::Production,
            },

            timezone,
            late_grace_minutes: parse_var("LATE_GRACE_MINUTES", "0")?,

            rate_login_per_min: parse_var("RATE_LOGIN_PER_MIN", "30")?,
            rate_protected_per_min: parse_var("RATE_PROTECTED_PER_MIN", "1000")?,

            api_prefix: var_or("API_PREFIX", "/api"),
            log_dir: var_or("LOG_DIR", "logs"),
            log_level: var_or("LOG_LEVEL", "info"),
        })
    }

    pub fn is_development(&self) -> bool {
        self.app_env == AppEnv::Development
    }

    /// Current wall-clock instant in the configured zone.
    pub fn local_now(&self) -> chrono::NaiveDateTime {
        chrono::Utc::now().with_timezone(&self.timezone).naive_local()
    }
}

#[cfg(test)]
pub mod test_support {
    use super::*;

    pub const TEST_SECRET: &str = "test-secret-key-that-is-long-enough-0123456789";

    pub fn test_config() -> Config {
        Config {
            database_url: "mysql://hr:hr@127.0.0.1:3306/hr_test".to_string(),
            server_addr: "127.0.0.1:0".to_string(),
            db_max_connections: 1,
            app_env: AppEnv::Development,
            session: SessionConfig {
                secret: TEST_SECRET.to_string(),
                ttl_secs: 3600,
                cookie_name: "hr_session".to_string(),
                secure_cookie: false,
            },
            timezone: chrono_tz::Asia::Jakarta,
            late_grace_minutes: 5,
            rate_login_per_min: 1000,
            rate_protected_per_min: 1000,
            api_prefix: "/api".to_string(),
            log_dir: "logs".to_string(),
            log_level: "debug".to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn app_env_accepts_common_spellings() {
        assert_eq!(AppEnv::parse("development"), AppEnv::Development);
        assert_eq!(AppEnv::parse(" DEV "), AppEnv::Development);
        assert_eq!(AppEnv::parse("production"), AppEnv::Production);
        assert_eq!(AppEnv::parse("anything-else"), AppEnv::Production);
    }
}
