use std::{str::FromStr, time::Duration};

use anyhow::{Context, Result};

#[derive(Clone, Debug)]
pub struct ServiceConfig {
    pub database_url: String,
    /// Notifications are only logged when unset.
    pub redis_url: Option<String>,
    pub expire_every: Duration,
    pub settle_every: Duration,
    pub sweep_concurrency: usize,
}

impl ServiceConfig {
    pub fn from_env() -> Result<Self> {
        let database_url = std::env::var("DATABASE_URL").context("DATABASE_URL is required")?;
        let redis_url = std::env::var("REDIS_URL").ok().filter(|url| !url.is_empty());

        Ok(Self {
            database_url,
            redis_url,
            expire_every: Duration::from_secs(var_or("EXPIRE_EVERY_SECS", 60)?),
            settle_every: Duration::from_secs(var_or("SETTLE_EVERY_SECS", 3_600)?),
            sweep_concurrency: var_or("SWEEP_CONCURRENCY", 4)?,
        })
    }
}

fn var_or<T>(name: &str, default: T) -> Result<T>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match std::env::var(name) {
        Ok(raw) => raw
            .trim()
            .parse()
            .with_context(|| format!("{name} must be a number, got {raw:?}")),
        Err(_) => Ok(default),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unset_variables_fall_back_to_defaults() {
        let value: u64 = var_or("HUB_PLATFORM_TEST_UNSET_VARIABLE", 60).unwrap();
        assert_eq!(value, 60);
    }
}
