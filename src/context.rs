//! The invocation surface every command is written against.
//!
//! A command never knows whether it was started by a slash interaction or by
//! a prefix message; both are a [`CommandContext`].

use poise::async_trait;
use poise::serenity_prelude as serenity;

use crate::reply::Reply;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UserView {
    pub id: serenity::UserId,
    pub name: String,
    /// Guild nickname when known, account name otherwise.
    pub display_name: String,
    pub avatar_url: Option<String>,
    pub bot: bool,
}

impl UserView {
    pub fn from_user(user: &serenity::User, nickname: Option<&str>) -> Self {
        UserView {
            id: user.id,
            name: user.name.clone(),
            display_name: nickname.unwrap_or(&user.name).to_string(),
            avatar_url: user.avatar_url(),
            bot: user.bot,
        }
    }

    pub fn with_nickname(mut self, nickname: Option<&str>) -> Self {
        if let Some(nick) = nickname.filter(|n| !n.trim().is_empty()) {
            self.display_name = nick.to_string();
        }
        self
    }
}

/// The parts of a chat message the prefix path needs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IncomingMessage {
    pub id: serenity::MessageId,
    pub channel_id: serenity::ChannelId,
    pub guild_id: Option<serenity::GuildId>,
    pub author: UserView,
    pub author_nick: Option<String>,
    pub content: String,
}

impl From<&serenity::Message> for IncomingMessage {
    fn from(message: &serenity::Message) -> Self {
        IncomingMessage {
            id: message.id,
            channel_id: message.channel_id,
            guild_id: message.guild_id,
            author: UserView::from_user(&message.author, None),
            author_nick: message.member.as_ref().and_then(|m| m.nick.clone()),
            content: message.content.clone(),
        }
    }
}

/// Handle to a message the bot sent, for later edits.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SentMessage {
    pub channel_id: serenity::ChannelId,
    pub message_id: serenity::MessageId,
}

impl From<&serenity::Message> for SentMessage {
    fn from(message: &serenity::Message) -> Self {
        SentMessage {
            channel_id: message.channel_id,
            message_id: message.id,
        }
    }
}

/// Named option lookup, mirroring slash-command options.
pub trait CommandOptions: Send + Sync {
    fn get_string(&self, name: &str) -> Option<String>;
    fn get_boolean(&self, name: &str) -> Option<bool>;
    /// `None` means the option was not given; prefix invocations always
    /// resolve to somebody.
    fn get_user(&self, name: &str) -> Option<UserView>;
}

#[async_trait]
pub trait CommandContext: Send + Sync {
    fn options(&self) -> &dyn CommandOptions;
    fn user(&self) -> &UserView;
    fn guild_id(&self) -> Option<serenity::GuildId>;
    fn channel_id(&self) -> serenity::ChannelId;
    fn is_prefix(&self) -> bool;
    fn deferred(&self) -> bool;
    fn replied(&self) -> bool;

    fn is_chat_input_command(&self) -> bool {
        true
    }

    async fn defer_reply(&self);
    /// Sends a reply. Delivery failures are logged, not returned.
    async fn reply(&self, reply: Reply) -> Option<SentMessage>;
    /// Replaces the deferred or previous reply.
    async fn edit_reply(&self, reply: Reply) -> Option<SentMessage>;
}
