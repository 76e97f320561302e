use loyalty_hub_api::state::DatabaseOptions;
use std::env;

#[derive(Clone, Debug)]
pub struct Config {
    pub port: u16,
    pub database: DatabaseOptions,
    pub jwt_secret: String,
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        let url = required("DATABASE_URL")?;
        let jwt_secret = required("JWT_SECRET")?;

        Ok(Config {
            port: parse_or("PORT", 8080)?,
            database: DatabaseOptions {
                url,
                max_connections: parse_or("DATABASE_MAX_CONNECTIONS", 10)?,
                sql_logging: parse_or("SQL_LOGGING", false)?,
            },
            jwt_secret,
        })
    }
}

fn required(key: &'static str) -> Result<String, ConfigError> {
    env::var(key)
        .ok()
        .filter(|value| !value.trim().is_empty())
        .ok_or(ConfigError::MissingVar(key))
}

fn parse_or<T: std::str::FromStr>(key: &'static str, default: T) -> Result<T, ConfigError> {
    match env::var(key) {
        Ok(raw) => raw
            .trim()
            .parse()
            .map_err(|_| ConfigError::InvalidValue(key.to_string())),
        Err(_) => Ok(default),
    }
}

#[derive(Debug)]
pub enum ConfigError {
    MissingVar(&'static str),
    InvalidValue(String),
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigError::MissingVar(var) => write!(f, "Missing environment variable: {}", var),
            ConfigError::InvalidValue(var) => write!(f, "Invalid value for: {}", var),
        }
    }
}

impl std::error::Error for ConfigError {}
