use poise::serenity_prelude as serenity;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("missing {0}")]
    Missing(&'static str),
    #[error("invalid value {value:?} for {key}")]
    Invalid { key: &'static str, value: String },
}

/// Failure to deliver something to Discord.
#[derive(Debug, Error)]
pub enum TransportError {
    #[error(transparent)]
    Discord(#[from] serenity::Error),
    #[error("{0}")]
    Rejected(String),
}

#[derive(Debug, Error)]
pub enum LastfmError {
    #[error("request to Last.fm failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("could not build Last.fm url: {0}")]
    Url(#[from] url::ParseError),
    #[error("Last.fm error {code}: {message}")]
    Api { code: u32, message: String },
    #[error("unexpected Last.fm response: {0}")]
    Decode(#[from] serde_json::Error),
}

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("could not access user store: {0}")]
    Io(#[from] std::io::Error),
    #[error("user store is corrupt: {0}")]
    Format(#[from] serde_json::Error),
}

/// Result type of every command entry point.
///
/// `Usage` carries a message meant for the invoking user. Everything else is
/// logged and replaced by a generic notice at the dispatch boundary.
#[derive(Debug, Error)]
pub enum CommandError {
    #[error("{0}")]
    Usage(String),
    #[error(transparent)]
    Lastfm(#[from] LastfmError),
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error(transparent)]
    Transport(#[from] TransportError),
}

pub const GENERIC_FAILURE: &str = "There was an error while executing this command.";

impl CommandError {
    pub fn usage(message: impl Into<String>) -> Self {
        CommandError::Usage(message.into())
    }

    pub fn user_message(&self) -> String {
        match self {
            CommandError::Usage(message) => message.clone(),
            CommandError::Lastfm(LastfmError::Api { code: 6, message }) => {
                format!("Last.fm couldn't find that: {}", message)
            }
            _ => GENERIC_FAILURE.to_string(),
        }
    }
}
