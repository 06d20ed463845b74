//! Runtime configuration, read from the process environment (`.env` is loaded
//! by `main` before this runs).

use std::path::PathBuf;
use std::time::Duration;

use poise::serenity_prelude as serenity;

use crate::error::ConfigError;
use crate::transport::RetryPolicy;

pub const DEFAULT_PREFIX: &str = ".fm";
pub const DEFAULT_USERS_FILE: &str = "data/users.json";

/// Source of environment variables.
pub trait ReadEnv {
    fn var(&self, key: &str) -> Option<String>;
}

pub struct SystemEnv;

impl ReadEnv for SystemEnv {
    fn var(&self, key: &str) -> Option<String> {
        std::env::var(key).ok()
    }
}

#[derive(Debug, Clone)]
pub struct Config {
    pub discord_token: String,
    pub lastfm_api_key: String,
    pub prefix: String,
    /// Register slash commands in this guild only instead of globally.
    pub guild_id: Option<serenity::GuildId>,
    pub users_file: PathBuf,
    pub retry: RetryPolicy,
    pub adapter: AdapterSettings,
}

/// Tunables of the prefix-message adapter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AdapterSettings {
    /// Options that fall back to the first positional token only, instead of
    /// every positional token joined together.
    pub first_token_options: Vec<String>,
}

impl Default for AdapterSettings {
    fn default() -> Self {
        Self {
            first_token_options: vec!["period".to_string()],
        }
    }
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_reader(&SystemEnv)
    }

    pub fn from_reader(env: &impl ReadEnv) -> Result<Self, ConfigError> {
        let discord_token = required(env, "DISCORD_TOKEN")?;
        let lastfm_api_key = required(env, "LASTFM_API_KEY")?;

        let prefix = env
            .var("COMMAND_PREFIX")
            .map(|p| p.trim().to_string())
            .filter(|p| !p.is_empty())
            .unwrap_or_else(|| DEFAULT_PREFIX.to_string());

        let guild_id = match env.var("GUILD_ID").filter(|v| !v.trim().is_empty()) {
            Some(raw) => Some(serenity::GuildId(parse_number("GUILD_ID", &raw)?)),
            None => None,
        };

        let users_file = env
            .var("USERS_FILE")
            .filter(|v| !v.trim().is_empty())
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from(DEFAULT_USERS_FILE));

        let mut retry = RetryPolicy::default();
        if let Some(raw) = env.var("SEND_ATTEMPTS") {
            let attempts = parse_number("SEND_ATTEMPTS", &raw)?;
            retry.attempts = u32::try_from(attempts)
                .ok()
                .filter(|a| *a > 0)
                .ok_or(ConfigError::Invalid {
                    key: "SEND_ATTEMPTS",
                    value: raw,
                })?;
        }
        if let Some(raw) = env.var("SEND_BACKOFF_BASE_MS") {
            retry.base_delay = Duration::from_millis(parse_number("SEND_BACKOFF_BASE_MS", &raw)?);
        }

        let adapter = match env.var("FIRST_TOKEN_OPTIONS") {
            Some(raw) => AdapterSettings {
                first_token_options: raw
                    .split(',')
                    .map(|x| x.trim())
                    .filter(|x| !x.is_empty())
                    .map(|x| x.to_string())
                    .collect(),
            },
            None => AdapterSettings::default(),
        };

        Ok(Config {
            discord_token,
            lastfm_api_key,
            prefix,
            guild_id,
            users_file,
            retry,
            adapter,
        })
    }
}

fn required(env: &impl ReadEnv, key: &'static str) -> Result<String, ConfigError> {
    env.var(key)
        .filter(|v| !v.trim().is_empty())
        .ok_or(ConfigError::Missing(key))
}

fn parse_number(key: &'static str, raw: &str) -> Result<u64, ConfigError> {
    raw.trim().parse::<u64>().map_err(|_| ConfigError::Invalid {
        key,
        value: raw.to_string(),
    })
}
