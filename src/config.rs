use std::{env, time::Duration};

use thiserror::Error;

use crate::domain::{progress::DEFAULT_START_PROGRESS, schema::UnknownFieldPolicy};

pub const DEFAULT_RESPONDER_TIMEOUT_SECS: u64 = 300;

#[derive(Debug, Clone, PartialEq)]
pub struct ResponderCommand {
    pub program: String,
    pub args: Vec<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Config {
    pub unknown_arguments: UnknownFieldPolicy,
    pub start_progress: f64,
    pub responder_command: Option<ResponderCommand>,
    pub responder_timeout: Duration,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("ASK_HUMAN_UNKNOWN_ARGUMENTS must be one of: reject, ignore")]
    InvalidUnknownArguments,
    #[error("ASK_HUMAN_START_PROGRESS must be a number strictly between 0 and 1")]
    InvalidStartProgress,
    #[error("ASK_HUMAN_TIMEOUT_SECS must be a positive integer")]
    InvalidTimeout,
    #[error("ASK_HUMAN_COMMAND_ARGS is set but ASK_HUMAN_COMMAND is not")]
    ArgsWithoutCommand,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            unknown_arguments: UnknownFieldPolicy::Reject,
            start_progress: DEFAULT_START_PROGRESS,
            responder_command: None,
            responder_timeout: Duration::from_secs(DEFAULT_RESPONDER_TIMEOUT_SECS),
        }
    }
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let read = |key: &str| {
            lookup(key)
                .map(|value| value.trim().to_string())
                .filter(|value| !value.is_empty())
        };

        let unknown_arguments = read("ASK_HUMAN_UNKNOWN_ARGUMENTS")
            .map(|value| {
                value
                    .parse::<UnknownFieldPolicy>()
                    .map_err(|_| ConfigError::InvalidUnknownArguments)
            })
            .transpose()?
            .unwrap_or_default();

        let start_progress = read("ASK_HUMAN_START_PROGRESS")
            .map(|value| {
                value
                    .parse::<f64>()
                    .ok()
                    .filter(|progress| progress.is_finite() && *progress > 0.0 && *progress < 1.0)
                    .ok_or(ConfigError::InvalidStartProgress)
            })
            .transpose()?
            .unwrap_or(DEFAULT_START_PROGRESS);

        let responder_timeout = read("ASK_HUMAN_TIMEOUT_SECS")
            .map(|value| {
                value
                    .parse::<u64>()
                    .ok()
                    .filter(|secs| *secs > 0)
                    .ok_or(ConfigError::InvalidTimeout)
            })
            .transpose()?
            .map(Duration::from_secs)
            .unwrap_or(Duration::from_secs(DEFAULT_RESPONDER_TIMEOUT_SECS));

        let args = read("ASK_HUMAN_COMMAND_ARGS")
            .map(|value| value.split_whitespace().map(str::to_string).collect::<Vec<_>>())
            .unwrap_or_default();
        let responder_command = match read("ASK_HUMAN_COMMAND") {
            Some(program) => Some(ResponderCommand { program, args }),
            None if !args.is_empty() => return Err(ConfigError::ArgsWithoutCommand),
            None => None,
        };

        Ok(Self {
            unknown_arguments,
            start_progress,
            responder_command,
            responder_timeout,
        })
    }
}
