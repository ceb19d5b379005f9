use std::collections::HashMap;
use std::env;
use std::time::Duration;

use url::Url;

pub const DEFAULT_REGISTRY_URL: &str = "https://pub.dartlang.org";
pub const DEFAULT_HTTP_TIMEOUT: Duration = Duration::from_secs(120);
pub const DEFAULT_GIT_TIMEOUT: Duration = Duration::from_secs(300);

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("{key} must be an absolute http(s) URL (got '{value}')")]
    InvalidUrl { key: &'static str, value: String },
    #[error("{key} must be a positive integer (got '{value}')")]
    InvalidNumber { key: &'static str, value: String },
}

#[derive(Debug, Clone)]
pub(crate) struct EnvSnapshot {
    vars: HashMap<String, String>,
}

impl EnvSnapshot {
    pub(crate) fn capture() -> Self {
        Self {
            vars: env::vars().collect(),
        }
    }

    pub(crate) fn var(&self, key: &str) -> Option<&str> {
        self.vars
            .get(key)
            .map(String::as_str)
            .filter(|value| !value.trim().is_empty())
    }

    #[cfg(test)]
    pub(crate) fn testing(pairs: &[(&str, &str)]) -> Self {
        let vars = pairs
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect();
        Self { vars }
    }
}

#[derive(Debug, Clone)]
pub struct Config {
    pub(crate) network: NetworkConfig,
    pub(crate) fetch: FetchConfig,
}

impl Config {
    /// Builds a configuration snapshot from the current process environment.
    ///
    /// # Errors
    /// Returns an error if a `DEPDIFF_*` variable holds an unusable value.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_snapshot(&EnvSnapshot::capture())
    }

    pub(crate) fn from_snapshot(snapshot: &EnvSnapshot) -> Result<Self, ConfigError> {
        let registry_url = match snapshot.var("DEPDIFF_REGISTRY_URL") {
            Some(value) => parse_registry_url(value)?,
            None => parse_registry_url(DEFAULT_REGISTRY_URL)?,
        };
        Ok(Self {
            network: NetworkConfig {
                registry_url,
                http_timeout: seconds(snapshot, "DEPDIFF_HTTP_TIMEOUT")?
                    .unwrap_or(DEFAULT_HTTP_TIMEOUT),
                git_timeout: seconds(snapshot, "DEPDIFF_GIT_TIMEOUT")?
                    .unwrap_or(DEFAULT_GIT_TIMEOUT),
            },
            fetch: FetchConfig {
                workers: positive(snapshot, "DEPDIFF_DOWNLOADS")?,
            },
        })
    }

    #[must_use]
    pub fn network(&self) -> &NetworkConfig {
        &self.network
    }

    #[must_use]
    pub fn fetch(&self) -> &FetchConfig {
        &self.fetch
    }

    /// Overrides the worker count, e.g. from `--jobs`.
    #[must_use]
    pub fn with_workers(mut self, workers: Option<usize>) -> Self {
        if let Some(workers) = workers.filter(|count| *count > 0) {
            self.fetch.workers = Some(workers);
        }
        self
    }
}

#[derive(Debug, Clone)]
pub struct NetworkConfig {
    pub registry_url: Url,
    pub http_timeout: Duration,
    pub git_timeout: Duration,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct FetchConfig {
    pub workers: Option<usize>,
}

fn parse_registry_url(value: &str) -> Result<Url, ConfigError> {
    let invalid = || ConfigError::InvalidUrl {
        key: "DEPDIFF_REGISTRY_URL",
        value: value.to_string(),
    };
    let url = Url::parse(value.trim()).map_err(|_| invalid())?;
    if !matches!(url.scheme(), "http" | "https") || url.cannot_be_a_base() {
        return Err(invalid());
    }
    Ok(url)
}

fn positive(snapshot: &EnvSnapshot, key: &'static str) -> Result<Option<usize>, ConfigError> {
    let Some(raw) = snapshot.var(key) else {
        return Ok(None);
    };
    match raw.trim().parse::<usize>() {
        Ok(value) if value > 0 => Ok(Some(value)),
        _ => Err(ConfigError::InvalidNumber {
            key,
            value: raw.to_string(),
        }),
    }
}

fn seconds(snapshot: &EnvSnapshot, key: &'static str) -> Result<Option<Duration>, ConfigError> {
    Ok(positive(snapshot, key)?.map(|secs| Duration::from_secs(secs as u64)))
}
