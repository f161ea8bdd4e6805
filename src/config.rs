//! Client configuration from the environment (`.env` is loaded by the binary).

use std::time::Duration;

use thiserror::Error;

use crate::machine::driver::MachineOptions;
use crate::machine::locks::ContentionPolicy;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("{0} must be set")]
    Missing(&'static str),

    #[error("invalid value for {key}: {value}")]
    Invalid { key: &'static str, value: String },
}

#[derive(Debug, Clone)]
pub struct ClientConfig {
    pub api_url: String,
    pub api_token: Option<String>,
    pub request_timeout: Duration,
    pub contention: ContentionPolicy,
    pub event_capacity: usize,
}

impl ClientConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from any key lookup; `from_env` uses the process environment.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let api_url = lookup("PAPER_API_URL")
            .filter(|v| !v.trim().is_empty())
            .ok_or(ConfigError::Missing("PAPER_API_URL"))?;
        if !api_url.starts_with("http://") && !api_url.starts_with("https://") {
            return Err(ConfigError::Invalid {
                key: "PAPER_API_URL",
                value: api_url,
            });
        }

        let api_token = lookup("PAPER_API_TOKEN").filter(|v| !v.trim().is_empty());

        let request_timeout = match lookup("PAPER_REQUEST_TIMEOUT_SECS") {
            Some(raw) => match raw.trim().parse::<u64>() {
                Ok(secs) if secs > 0 => Duration::from_secs(secs),
                _ => {
                    return Err(ConfigError::Invalid {
                        key: "PAPER_REQUEST_TIMEOUT_SECS",
                        value: raw,
                    });
                }
            },
            None => Duration::from_secs(10),
        };

        let contention = match lookup("PAPER_CONTENTION") {
            Some(raw) => raw.parse().map_err(|_| ConfigError::Invalid {
                key: "PAPER_CONTENTION",
                value: raw.clone(),
            })?,
            None => ContentionPolicy::default(),
        };

        let event_capacity = match lookup("PAPER_EVENT_CAPACITY") {
            Some(raw) => match raw.trim().parse::<usize>() {
                Ok(n) if n > 0 => n,
                _ => {
                    return Err(ConfigError::Invalid {
                        key: "PAPER_EVENT_CAPACITY",
                        value: raw,
                    });
                }
            },
            None => 256,
        };

        Ok(Self {
            api_url,
            api_token,
            request_timeout,
            contention,
            event_capacity,
        })
    }

    pub fn machine_options(&self) -> MachineOptions {
        MachineOptions {
            contention: self.contention,
            event_capacity: self.event_capacity,
        }
    }
}
