//! [`CommandContext`] over a real application-command interaction.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use poise::async_trait;
use poise::serenity_prelude as serenity;
use serde_json::Value;
use tracing::error;

use crate::context::{CommandContext, CommandOptions, SentMessage, UserView};
use crate::error::TransportError;
use crate::reply::Reply;
use crate::transport::{create_components, create_embeds, fill_response};

#[derive(Debug, Default)]
pub struct SlashOptions {
    values: HashMap<String, Value>,
    users: HashMap<String, UserView>,
}

impl SlashOptions {
    pub fn new(values: HashMap<String, Value>, users: HashMap<String, UserView>) -> Self {
        SlashOptions { values, users }
    }

    fn from_interaction(interaction: &serenity::ApplicationCommandInteraction) -> Self {
        let mut options = SlashOptions::default();
        for option in &interaction.data.options {
            if let Some(value) = &option.value {
                options.values.insert(option.name.clone(), value.clone());
            }
            if let Some(serenity::CommandDataOptionValue::User(user, member)) = &option.resolved {
                let nick = member.as_ref().and_then(|m| m.nick.as_deref());
                options
                    .users
                    .insert(option.name.clone(), UserView::from_user(user, nick));
            }
        }
        options
    }
}

impl CommandOptions for SlashOptions {
    fn get_string(&self, name: &str) -> Option<String> {
        match self.values.get(name)? {
            Value::String(s) => Some(s.clone()),
            Value::Number(n) => Some(n.to_string()),
            Value::Bool(b) => Some(b.to_string()),
            _ => None,
        }
    }

    fn get_boolean(&self, name: &str) -> Option<bool> {
        self.values.get(name)?.as_bool()
    }

    fn get_user(&self, name: &str) -> Option<UserView> {
        self.users.get(name).cloned()
    }
}

pub struct SlashInteraction {
    http: Arc<serenity::Http>,
    interaction: serenity::ApplicationCommandInteraction,
    user: UserView,
    options: SlashOptions,
    deferred: AtomicBool,
    replied: AtomicBool,
}

impl SlashInteraction {
    pub fn new(http: Arc<serenity::Http>, interaction: serenity::ApplicationCommandInteraction) -> Self {
        let nick = interaction.member.as_ref().and_then(|m| m.nick.as_deref());
        let user = UserView::from_user(&interaction.user, nick);
        let options = SlashOptions::from_interaction(&interaction);
        SlashInteraction {
            http,
            interaction,
            user,
            options,
            deferred: AtomicBool::new(false),
            replied: AtomicBool::new(false),
        }
    }

    async fn respond(&self, reply: &Reply) -> Result<SentMessage, TransportError> {
        self.interaction
            .create_interaction_response(&self.http, |r| {
                r.kind(serenity::InteractionResponseType::ChannelMessageWithSource)
                    .interaction_response_data(|d| fill_response(d, reply))
            })
            .await?;
        let message = self.interaction.get_interaction_response(&self.http).await?;
        Ok(SentMessage::from(&message))
    }

    async fn edit_original(&self, reply: &Reply) -> Result<SentMessage, TransportError> {
        let embeds = create_embeds(reply);
        let components = create_components(reply);
        let message = self
            .interaction
            .edit_original_interaction_response(&self.http, |r| {
                r.content(reply.content.clone().unwrap_or_default())
                    .set_embeds(embeds)
                    .components(|c| {
                        *c = components;
                        c
                    })
            })
            .await?;
        Ok(SentMessage::from(&message))
    }

    async fn follow_up(&self, reply: &Reply) -> Result<SentMessage, TransportError> {
        let embeds = create_embeds(reply);
        let components = create_components(reply);
        let message = self
            .interaction
            .create_followup_message(&self.http, |f| {
                if let Some(content) = &reply.content {
                    f.content(content);
                }
                f.add_embeds(embeds)
                    .ephemeral(reply.ephemeral)
                    .components(|c| {
                        *c = components;
                        c
                    })
            })
            .await?;
        Ok(SentMessage::from(&message))
    }

    fn log_failure(&self, result: Result<SentMessage, TransportError>) -> Option<SentMessage> {
        match result {
            Ok(sent) => Some(sent),
            Err(e) => {
                error!(
                    "Could not answer /{} interaction: {}",
                    self.interaction.data.name, e
                );
                None
            }
        }
    }
}

#[async_trait]
impl CommandContext for SlashInteraction {
    fn options(&self) -> &dyn CommandOptions {
        &self.options
    }

    fn user(&self) -> &UserView {
        &self.user
    }

    fn guild_id(&self) -> Option<serenity::GuildId> {
        self.interaction.guild_id
    }

    fn channel_id(&self) -> serenity::ChannelId {
        self.interaction.channel_id
    }

    fn is_prefix(&self) -> bool {
        false
    }

    fn deferred(&self) -> bool {
        self.deferred.load(Ordering::SeqCst)
    }

    fn replied(&self) -> bool {
        self.replied.load(Ordering::SeqCst)
    }

    async fn defer_reply(&self) {
        if self.deferred() || self.replied() {
            return;
        }
        match self.interaction.defer(&self.http).await {
            Ok(()) => self.deferred.store(true, Ordering::SeqCst),
            Err(e) => error!("Could not defer /{}: {}", self.interaction.data.name, e),
        }
    }

    async fn reply(&self, reply: Reply) -> Option<SentMessage> {
        let already_replied = self.replied.swap(true, Ordering::SeqCst);
        let result = if already_replied {
            self.follow_up(&reply).await
        } else if self.deferred() {
            self.edit_original(&reply).await
        } else {
            self.respond(&reply).await
        };
        self.log_failure(result)
    }

    async fn edit_reply(&self, reply: Reply) -> Option<SentMessage> {
        let already_replied = self.replied.swap(true, Ordering::SeqCst);
        let result = if already_replied || self.deferred() {
            self.edit_original(&reply).await
        } else {
            self.respond(&reply).await
        };
        self.log_failure(result)
    }
}
