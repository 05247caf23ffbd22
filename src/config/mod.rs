//! Service configuration read from the environment.
//!
//! | Variable            | Default        |
//! |---------------------|----------------|
//! | `HOST`              | `0.0.0.0`      |
//! | `PORT`              | `8000`         |
//! | `SECRET`            | `secret`       |
//! | `REDIS_URL`         | unset          |
//! | `REDIS_PORT`        | unset          |
//! | `CACHE_TTL_SECS`    | `600`          |
//! | `CACHE_KEY`         | `data`         |
//! | `COLLECTION`        | `documents`    |
//! | `DATA_DIR`          | `./data`       |
//! | `STREAM_FILE`       | `./stream.txt` |
//! | `MAX_REQUEST_BYTES` | `52428800`     |
//!
//! `REDIS_PORT` alone means a Redis instance on `127.0.0.1`; `REDIS_URL` wins
//! when both are set. With neither, the in-process cache is used.

use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use thiserror::Error;

use crate::cache::CacheKey;

/// Configuration errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid value `{value}` for {var}: {reason}")]
    Invalid {
        var: &'static str,
        value: String,
        reason: String,
    },
}

/// Everything the service binary needs to start.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub host: String,
    pub port: u16,
    pub secret: String,
    pub redis_url: Option<String>,
    pub cache_ttl: Duration,
    pub cache_key: CacheKey,
    pub collection: String,
    pub data_dir: PathBuf,
    pub stream_file: PathBuf,
    pub max_request_bytes: usize,
}

impl AppConfig {
    /// Loads `.env` if present, then reads the process environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        match dotenvy::dotenv() {
            Ok(path) => tracing::debug!(path = %path.display(), "loaded .env"),
            Err(e) if e.not_found() => {}
            Err(e) => tracing::warn!(error = %e, "ignoring unreadable .env"),
        }
        Self::from_lookup(|var| std::env::var(var).ok())
    }

    /// Builds a configuration from an arbitrary variable source.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let non_blank = |var: &str| lookup(var).filter(|v| !v.trim().is_empty());

        let cache_ttl_secs: u64 = parse_or(&lookup, "CACHE_TTL_SECS", 600)?;
        if cache_ttl_secs == 0 {
            return Err(invalid("CACHE_TTL_SECS", "0", "must be greater than zero"));
        }

        let cache_key_raw = lookup("CACHE_KEY").unwrap_or_else(|| "data".to_owned());
        let cache_key = CacheKey::new(cache_key_raw.clone())
            .map_err(|e| invalid("CACHE_KEY", &cache_key_raw, &e.to_string()))?;

        let collection = lookup("COLLECTION").unwrap_or_else(|| "documents".to_owned());
        if collection.trim().is_empty() {
            return Err(invalid("COLLECTION", &collection, "must not be empty"));
        }

        let redis_url = match non_blank("REDIS_URL") {
            Some(url) => Some(url),
            None => match non_blank("REDIS_PORT") {
                Some(_) => {
                    let port: u16 = parse_or(&lookup, "REDIS_PORT", 6379)?;
                    Some(format!("redis://127.0.0.1:{port}"))
                }
                None => None,
            },
        };

        Ok(Self {
            host: non_blank("HOST").unwrap_or_else(|| "0.0.0.0".to_owned()),
            port: parse_or(&lookup, "PORT", 8000)?,
            secret: lookup("SECRET").unwrap_or_else(|| "secret".to_owned()),
            redis_url,
            cache_ttl: Duration::from_secs(cache_ttl_secs),
            cache_key,
            collection,
            data_dir: non_blank("DATA_DIR").unwrap_or_else(|| "./data".to_owned()).into(),
            stream_file: non_blank("STREAM_FILE")
                .unwrap_or_else(|| "./stream.txt".to_owned())
                .into(),
            max_request_bytes: parse_or(&lookup, "MAX_REQUEST_BYTES", 50 * 1024 * 1024)?,
        })
    }

    /// `host:port` to bind.
    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

fn invalid(var: &'static str, value: &str, reason: &str) -> ConfigError {
    ConfigError::Invalid {
        var,
        value: value.to_owned(),
        reason: reason.to_owned(),
    }
}

fn parse_or<F, T>(lookup: &F, var: &'static str, default: T) -> Result<T, ConfigError>
where
    F: Fn(&str) -> Option<String>,
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match lookup(var) {
        None => Ok(default),
        Some(raw) => raw
            .trim()
            .parse()
            .map_err(|e: T::Err| invalid(var, &raw, &e.to_string())),
    }
}
