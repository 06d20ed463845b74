use once_cell::sync::Lazy;
use poise::async_trait;
use poise::serenity_prelude as serenity;
use regex::Regex;
use tracing::info;

use crate::context::CommandContext;
use crate::error::{CommandError, LastfmError};
use crate::registry::{BotState, Command, CommandOption, CommandSchema, PrefixCommand, PrefixInvocation};
use crate::reply::Reply;
use crate::utils::bold;

/// Last.fm's signup rules.
static USERNAME: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[A-Za-z][A-Za-z0-9_-]{1,14}$").expect("Invalid Regex"));

pub struct Link;

/// Checks `raw` against Last.fm and stores it for `user_id`. Returns the
/// account name as Last.fm spells it.
async fn link_account(
    state: &BotState,
    user_id: serenity::UserId,
    guild_id: Option<serenity::GuildId>,
    raw: &str,
) -> Result<String, CommandError> {
    let username = raw.trim();
    if !USERNAME.is_match(username) {
        return Err(CommandError::usage(format!(
            "`{}` isn't a valid Last.fm username.",
            username
        )));
    }

    let account = match state.lastfm.recent_tracks(username, 1, 1).await {
        Ok(recent) if !recent.user.is_empty() => recent.user,
        Ok(_) => username.to_string(),
        Err(LastfmError::Api { code: 6, .. }) => {
            return Err(CommandError::usage(format!(
                "There's no Last.fm user called `{}`.",
                username
            )))
        }
        Err(e) => return Err(e.into()),
    };

    state.users.link(user_id, guild_id, &account).await?;
    info!("Linked {} to Last.fm account {}", user_id, account);
    Ok(account)
}

fn linked(account: &str) -> Reply {
    Reply::text(format!("Your Last.fm account is now {}.", bold(account)))
}

#[async_trait]
impl Command for Link {
    fn schema(&self) -> CommandSchema {
        CommandSchema::new("link", "Connect your Last.fm account")
            .alias("login")
            .option(CommandOption::string("username", "Your Last.fm username").required())
    }

    async fn execute(&self, ctx: &dyn CommandContext, state: &BotState) -> Result<(), CommandError> {
        let Some(username) = ctx.options().get_string("username") else {
            return Err(CommandError::usage("Tell me your Last.fm username."));
        };
        let account = link_account(state, ctx.user().id, ctx.guild_id(), &username).await?;
        ctx.reply(linked(&account).ephemeral()).await;
        Ok(())
    }
}

/// Prefix form takes exactly one word, so `.fm link my name` is refused
/// instead of linking `my name`.
#[async_trait]
impl PrefixCommand for Link {
    async fn prefix_execute(
        &self,
        invocation: &PrefixInvocation<'_>,
        state: &BotState,
    ) -> Result<(), CommandError> {
        let [username] = invocation.args else {
            return Err(CommandError::usage(format!(
                "Usage: `{} link <lastfm username>`",
                state.prefix
            )));
        };
        let message = invocation.message;
        let account = link_account(state, message.author.id, message.guild_id, username).await?;
        invocation.say(linked(&account)).await;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::time::Duration;

    use super::*;
    use crate::commands::testing::{prefix_ctx, GUILD};
    use crate::context::IncomingMessage;
    use crate::lastfm::testing::{track, FakeScrobbles};
    use crate::registry::testing::state_with;
    use crate::transport::testing::{user, RecordingTransport};
    use crate::transport::RetryPolicy;

    fn fake() -> FakeScrobbles {
        FakeScrobbles::default().with_recent("rj_fm", vec![track("Roses", "OutKast", false)])
    }

    fn message(content: &str) -> IncomingMessage {
        IncomingMessage {
            id: serenity::MessageId(1),
            channel_id: serenity::ChannelId(3),
            guild_id: Some(serenity::GuildId(GUILD)),
            author: user(1, "rj"),
            author_nick: None,
            content: content.to_string(),
        }
    }

    #[test]
    fn username_rules() {
        for ok in ["rj", "rj_fm", "Lily-2000", "a23456789012345"] {
            assert!(USERNAME.is_match(ok), "{}", ok);
        }
        for bad in ["r", "1rj", "rj fm", "a234567890123456", "rj!"] {
            assert!(!USERNAME.is_match(bad), "{}", bad);
        }
    }

    #[tokio::test]
    async fn slash_path_links_with_guild_and_replies_privately() {
        let (state, _dir) = state_with(fake()).await;
        let transport = Arc::new(RecordingTransport::new());
        let ctx = prefix_ctx(".fm link --username=rj_fm", user(1, "rj"), &transport);

        Link.execute(&ctx, &state).await.unwrap();

        assert_eq!(
            state.users.lastfm_name(serenity::UserId(1)).await.as_deref(),
            Some("rj_fm")
        );
        assert_eq!(
            state.users.guild_members(serenity::GuildId(GUILD)).await.len(),
            1
        );
        assert!(transport.sent()[0].1.ephemeral);
    }

    #[tokio::test]
    async fn prefix_path_takes_one_word() {
        let (state, _dir) = state_with(fake()).await;
        let transport = RecordingTransport::new();
        let retry = RetryPolicy {
            attempts: 1,
            base_delay: Duration::ZERO,
        };
        let msg = message(".fm link rj_fm");

        let args = vec!["rj_fm".to_string()];
        let invocation = PrefixInvocation::new(&msg, &args, &transport, retry);
        Link.prefix_execute(&invocation, &state).await.unwrap();
        assert_eq!(
            transport.sent()[0].1,
            Reply::text("Your Last.fm account is now **rj_fm**.")
        );

        let args = vec!["rj".to_string(), "fm".to_string()];
        let invocation = PrefixInvocation::new(&msg, &args, &transport, retry);
        let err = Link.prefix_execute(&invocation, &state).await.unwrap_err();
        assert_eq!(err.user_message(), "Usage: `.fm link <lastfm username>`");
    }

    #[tokio::test]
    async fn unknown_account_is_not_stored() {
        let (state, _dir) = state_with(fake()).await;

        let err = link_account(&state, serenity::UserId(1), None, "ghost")
            .await
            .unwrap_err();

        assert_eq!(err.user_message(), "There's no Last.fm user called `ghost`.");
        assert_eq!(state.users.lastfm_name(serenity::UserId(1)).await, None);
    }

    #[tokio::test]
    async fn invalid_name_is_rejected_before_lookup() {
        let (state, _dir) = state_with(fake()).await;
        let err = link_account(&state, serenity::UserId(1), None, "no way")
            .await
            .unwrap_err();
        assert!(matches!(err, CommandError::Usage(_)));
    }
}
