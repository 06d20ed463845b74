use std::sync::Arc;
use std::time::Duration;

use poise::async_trait;
use poise::serenity_prelude as serenity;
use tracing::warn;

use crate::context::{SentMessage, UserView};
use crate::error::TransportError;
use crate::reply::Reply;

/// Where prefix-command output goes.
#[async_trait]
pub trait ChatTransport: Send + Sync {
    async fn send(
        &self,
        channel_id: serenity::ChannelId,
        reply: &Reply,
    ) -> Result<SentMessage, TransportError>;

    async fn edit(&self, message: &SentMessage, reply: &Reply)
        -> Result<SentMessage, TransportError>;

    fn cached_user(&self, user_id: serenity::UserId) -> Option<UserView>;
}

/// Backoff for message sends: after failed attempt `n` wait `base_delay * 2^n`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub attempts: u32,
    pub base_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        RetryPolicy {
            attempts: 3,
            base_delay: Duration::from_secs(1),
        }
    }
}

impl RetryPolicy {
    pub fn delay_after(&self, attempt: u32) -> Duration {
        self.base_delay.saturating_mul(2u32.saturating_pow(attempt))
    }
}

/// Sends `reply`, retrying with exponential backoff. Returns the last error
/// once every attempt has failed.
pub async fn send_with_retry(
    transport: &dyn ChatTransport,
    channel_id: serenity::ChannelId,
    reply: &Reply,
    policy: &RetryPolicy,
) -> Result<SentMessage, TransportError> {
    let attempts = policy.attempts.max(1);
    let mut attempt = 1;
    loop {
        match transport.send(channel_id, reply).await {
            Ok(sent) => return Ok(sent),
            Err(e) if attempt >= attempts => return Err(e),
            Err(e) => {
                let delay = policy.delay_after(attempt);
                warn!(
                    "Send attempt {}/{} to channel {} failed: {}; retrying in {:?}",
                    attempt, attempts, channel_id, e, delay
                );
                tokio::time::sleep(delay).await;
                attempt += 1;
            }
        }
    }
}

pub struct DiscordTransport {
    http: Arc<serenity::Http>,
    cache: Arc<serenity::Cache>,
}

impl DiscordTransport {
    pub fn new(http: Arc<serenity::Http>, cache: Arc<serenity::Cache>) -> Self {
        DiscordTransport { http, cache }
    }
}

#[async_trait]
impl ChatTransport for DiscordTransport {
    async fn send(
        &self,
        channel_id: serenity::ChannelId,
        reply: &Reply,
    ) -> Result<SentMessage, TransportError> {
        let embeds = create_embeds(reply);
        let components = create_components(reply);
        let message = channel_id
            .send_message(&self.http, |m| {
                if let Some(content) = &reply.content {
                    m.content(content);
                }
                m.set_embeds(embeds).components(|c| {
                    *c = components;
                    c
                })
            })
            .await?;
        Ok(SentMessage::from(&message))
    }

    async fn edit(
        &self,
        message: &SentMessage,
        reply: &Reply,
    ) -> Result<SentMessage, TransportError> {
        let embeds = create_embeds(reply);
        let components = create_components(reply);
        let edited = message
            .channel_id
            .edit_message(&self.http, message.message_id, |m| {
                m.content(reply.content.clone().unwrap_or_default())
                    .set_embeds(embeds)
                    .components(|c| {
                        *c = components;
                        c
                    })
            })
            .await?;
        Ok(SentMessage::from(&edited))
    }

    fn cached_user(&self, user_id: serenity::UserId) -> Option<UserView> {
        self.cache
            .user(user_id)
            .map(|user| UserView::from_user(&user, None))
    }
}

pub(crate) fn create_embeds(reply: &Reply) -> Vec<serenity::CreateEmbed> {
    reply
        .embeds
        .iter()
        .map(|embed| {
            let mut e = serenity::CreateEmbed::default();
            if let Some(title) = &embed.title {
                e.title(title);
            }
            if let Some(url) = &embed.url {
                e.url(url);
            }
            if let Some(description) = &embed.description {
                e.description(description);
            }
            if let Some(color) = embed.color {
                e.color(color);
            }
            if let Some(thumbnail) = &embed.thumbnail {
                e.thumbnail(thumbnail);
            }
            for (name, value, inline) in &embed.fields {
                e.field(name, value, *inline);
            }
            if let Some(footer) = &embed.footer {
                e.footer(|f| f.text(footer));
            }
            e
        })
        .collect()
}

pub(crate) fn create_components(reply: &Reply) -> serenity::CreateComponents {
    let mut components = serenity::CreateComponents::default();
    if !reply.buttons.is_empty() {
        components.create_action_row(|row| {
            for button in &reply.buttons {
                row.create_button(|b| {
                    b.custom_id(&button.custom_id)
                        .label(&button.label)
                        .style(serenity::ButtonStyle::Secondary)
                        .disabled(button.disabled)
                });
            }
            row
        });
    }
    components
}

pub(crate) fn fill_response<'a, 'b>(
    data: &'b mut serenity::CreateInteractionResponseData<'a>,
    reply: &Reply,
) -> &'b mut serenity::CreateInteractionResponseData<'a> {
    if let Some(content) = &reply.content {
        data.content(content);
    }
    data.set_embeds(create_embeds(reply))
        .ephemeral(reply.ephemeral)
        .components(|c| {
            *c = create_components(reply);
            c
        })
}
