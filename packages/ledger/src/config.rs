use std::time::Duration;

/// Tunables of the redemption ledger
#[derive(Clone, Debug)]
pub struct LedgerConfig {
    /// Draws before activation gives up with `CollisionExhausted`
    pub code_attempts: u32,
    /// How long an activated code can be consumed
    pub validity: chrono::Duration,
    /// Deadline for every store call
    pub store_timeout: Duration,
}

impl Default for LedgerConfig {
    fn default() -> Self {
        Self {
            code_attempts: 10,
            validity: chrono::Duration::minutes(5),
            store_timeout: Duration::from_secs(5),
        }
    }
}

impl LedgerConfig {
    /// Reads overrides from the environment. Unset or unparsable values keep
    /// the default.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            code_attempts: env_parse("REDEMPTION_CODE_ATTEMPTS")
                .filter(|n: &u32| *n > 0)
                .unwrap_or(defaults.code_attempts),
            validity: env_parse("REDEMPTION_VALIDITY_SECONDS")
                .filter(|s: &i64| *s > 0)
                .map(chrono::Duration::seconds)
                .unwrap_or(defaults.validity),
            store_timeout: env_parse("STORE_TIMEOUT_MS")
                .filter(|ms: &u64| *ms > 0)
                .map(Duration::from_millis)
                .unwrap_or(defaults.store_timeout),
        }
    }
}

fn env_parse<T: std::str::FromStr>(key: &str) -> Option<T> {
    let raw = std::env::var(key).ok()?;
    match raw.parse() {
        Ok(value) => Some(value),
        Err(_) => {
            tracing::warn!(key, value = %raw, "Ignoring unparsable config value");
            None
        }
    }
}
