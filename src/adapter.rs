//! Runs slash-command implementations from plain prefix messages.
//!
//! [`SyntheticInteraction`] answers the same questions a native interaction
//! does (`options`, `user`, reply lifecycle) using the words that followed
//! the command name.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use once_cell::sync::Lazy;
use poise::async_trait;
use poise::serenity_prelude as serenity;
use regex::Regex;
use tokio::sync::Mutex;
use tracing::{error, warn};

use crate::args::{parse_tokens, ParsedArgs};
use crate::config::AdapterSettings;
use crate::context::{CommandContext, CommandOptions, IncomingMessage, SentMessage, UserView};
use crate::reply::Reply;
use crate::transport::{send_with_retry, ChatTransport, RetryPolicy};

static MENTION: Lazy<Regex> = Lazy::new(|| Regex::new(r"<@!?(\d+)>").expect("Invalid Regex"));

/// Option lookups over the arguments of one prefix message.
pub struct PrefixOptions {
    args: ParsedArgs,
    content: String,
    author: UserView,
    first_token_options: Vec<String>,
    transport: Arc<dyn ChatTransport>,
}

impl PrefixOptions {
    fn resolve(&self, id: u64) -> UserView {
        if id == self.author.id.0 {
            return self.author.clone();
        }
        self.transport
            .cached_user(serenity::UserId(id))
            .unwrap_or_else(|| self.author.clone())
    }
}

impl CommandOptions for PrefixOptions {
    fn get_string(&self, name: &str) -> Option<String> {
        if let Some(value) = self.args.get(name) {
            return Some(value.trim().to_string());
        }
        if self.first_token_options.iter().any(|o| o == name) {
            return self.args.unnamed.first().cloned();
        }
        if self.args.unnamed.is_empty() {
            return None;
        }
        Some(self.args.unnamed.join(" "))
    }

    fn get_boolean(&self, name: &str) -> Option<bool> {
        match self.args.get(name)?.trim().to_lowercase().as_str() {
            "true" | "1" | "yes" => Some(true),
            "false" | "0" | "no" => Some(false),
            _ => None,
        }
    }

    /// Mentions typed into the message win. A reply-to reference is not a
    /// mention here, so replying to someone with a command still targets the
    /// author.
    fn get_user(&self, name: &str) -> Option<UserView> {
        if let Some(id) = MENTION
            .captures(&self.content)
            .and_then(|caps| caps[1].parse::<u64>().ok())
        {
            return Some(self.resolve(id));
        }

        let raw = self
            .args
            .get(name)
            .or_else(|| self.args.unnamed.first().map(String::as_str));
        if let Some(raw) = raw {
            let digits: String = raw.chars().filter(char::is_ascii_digit).collect();
            if let Ok(id) = digits.parse::<u64>() {
                return Some(self.resolve(id));
            }
        }

        Some(self.author.clone())
    }
}

pub struct SyntheticInteraction {
    message: IncomingMessage,
    user: UserView,
    options: PrefixOptions,
    transport: Arc<dyn ChatTransport>,
    retry: RetryPolicy,
    deferred: AtomicBool,
    replied: AtomicBool,
    handle: Mutex<Option<SentMessage>>,
}

impl SyntheticInteraction {
    pub fn new<S: AsRef<str>>(
        message: IncomingMessage,
        args: &[S],
        transport: Arc<dyn ChatTransport>,
        retry: RetryPolicy,
        settings: &AdapterSettings,
    ) -> Self {
        let user = message
            .author
            .clone()
            .with_nickname(message.author_nick.as_deref());
        let options = PrefixOptions {
            args: parse_tokens(args),
            content: message.content.clone(),
            author: user.clone(),
            first_token_options: settings.first_token_options.clone(),
            transport: transport.clone(),
        };
        SyntheticInteraction {
            message,
            user,
            options,
            transport,
            retry,
            deferred: AtomicBool::new(false),
            replied: AtomicBool::new(false),
            handle: Mutex::new(None),
        }
    }

    /// Edits `previous` or sends a new message; on failure falls back to a
    /// single plain-text send.
    async fn deliver(&self, reply: &Reply, previous: Option<SentMessage>) -> Option<SentMessage> {
        let transport = self.transport.as_ref();
        let primary = match previous {
            Some(sent) => transport.edit(&sent, reply).await,
            None => send_with_retry(transport, self.message.channel_id, reply, &self.retry).await,
        };
        let err = match primary {
            Ok(sent) => return Some(sent),
            Err(e) => e,
        };

        warn!(
            "Reply in channel {} failed, falling back to plain text: {}",
            self.message.channel_id, err
        );
        match transport
            .send(self.message.channel_id, &reply.degraded())
            .await
        {
            Ok(sent) => Some(sent),
            Err(e) => {
                error!(
                    "Plain text reply in channel {} failed too: {}",
                    self.message.channel_id, e
                );
                None
            }
        }
    }
}

#[async_trait]
impl CommandContext for SyntheticInteraction {
    fn options(&self) -> &dyn CommandOptions {
        &self.options
    }

    fn user(&self) -> &UserView {
        &self.user
    }

    fn guild_id(&self) -> Option<serenity::GuildId> {
        self.message.guild_id
    }

    fn channel_id(&self) -> serenity::ChannelId {
        self.message.channel_id
    }

    fn is_prefix(&self) -> bool {
        true
    }

    fn deferred(&self) -> bool {
        self.deferred.load(Ordering::SeqCst)
    }

    fn replied(&self) -> bool {
        self.replied.load(Ordering::SeqCst)
    }

    /// Prefix commands get no "thinking…" placeholder; the first real reply
    /// is the only message sent.
    async fn defer_reply(&self) {
        self.deferred.store(true, Ordering::SeqCst);
    }

    async fn reply(&self, reply: Reply) -> Option<SentMessage> {
        self.replied.store(true, Ordering::SeqCst);
        let sent = self.deliver(&reply, None).await;
        let mut handle = self.handle.lock().await;
        if handle.is_none() {
            *handle = sent;
        }
        sent
    }

    async fn edit_reply(&self, reply: Reply) -> Option<SentMessage> {
        self.replied.store(true, Ordering::SeqCst);
        let mut handle = self.handle.lock().await;
        let sent = self.deliver(&reply, *handle).await;
        if sent.is_some() {
            *handle = sent;
        }
        sent
    }
}
