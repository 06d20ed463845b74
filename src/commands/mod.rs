pub mod artist;
pub mod help;
pub mod link;
pub mod np;
pub mod recent;
pub mod topartists;
pub mod wk;

use crate::context::{CommandContext, UserView};
use crate::error::CommandError;
use crate::registry::{BotState, CommandEntry};

/// Every command the bot ships, in registration order.
pub fn list() -> Vec<CommandEntry> {
    let mut entries = vec![
        CommandEntry::new(np::NowPlaying),
        CommandEntry::new(recent::Recent),
        CommandEntry::new(artist::Artist),
        CommandEntry::new(wk::WhoKnows),
        CommandEntry::new(topartists::TopArtists),
        CommandEntry::with_prefix(link::Link),
    ];
    let catalog = entries.iter().map(|e| e.schema.clone()).collect();
    entries.push(CommandEntry::new(help::Help::new(catalog)));
    entries
}

/// The `user` option, or whoever ran the command.
fn target_user(ctx: &dyn CommandContext) -> UserView {
    ctx.options()
        .get_user("user")
        .unwrap_or_else(|| ctx.user().clone())
}

async fn lastfm_account(state: &BotState, user: &UserView) -> Result<String, CommandError> {
    state.users.lastfm_name(user.id).await.ok_or_else(|| {
        CommandError::usage(format!(
            "{} hasn't linked a Last.fm account yet. Use `/link` or `{} link <username>`.",
            user.display_name, state.prefix
        ))
    })
}

/// The `artist` option, or the artist of the track `account` is playing.
async fn artist_or_now_playing(
    ctx: &dyn CommandContext,
    state: &BotState,
    account: Option<&str>,
) -> Result<String, CommandError> {
    if let Some(artist) = ctx.options().get_string("artist").filter(|a| !a.is_empty()) {
        return Ok(artist);
    }
    let Some(account) = account else {
        return Err(CommandError::usage("Tell me which artist you mean."));
    };
    let recent = state.lastfm.recent_tracks(account, 1, 1).await?;
    recent
        .tracks
        .into_iter()
        .next()
        .map(|track| track.artist)
        .ok_or_else(|| {
            CommandError::usage(format!(
                "{} hasn't scrobbled anything yet, so tell me which artist you mean.",
                account
            ))
        })
}

#[cfg(test)]
pub(crate) mod testing {
    use std::sync::Arc;
    use std::time::Duration;

    use poise::serenity_prelude as serenity;

    use crate::adapter::SyntheticInteraction;
    use crate::args::tokenize;
    use crate::config::AdapterSettings;
    use crate::context::{IncomingMessage, UserView};
    use crate::transport::testing::RecordingTransport;
    use crate::transport::RetryPolicy;

    pub const GUILD: u64 = 4;

    /// What dispatch would build for `content` (`.fm <name> args...`) typed
    /// by `author` in a guild channel.
    pub fn prefix_ctx(
        content: &str,
        author: UserView,
        transport: &Arc<RecordingTransport>,
    ) -> SyntheticInteraction {
        let words = tokenize(content);
        let message = IncomingMessage {
            id: serenity::MessageId(1),
            channel_id: serenity::ChannelId(3),
            guild_id: Some(serenity::GuildId(GUILD)),
            author,
            author_nick: None,
            content: content.to_string(),
        };
        SyntheticInteraction::new(
            message,
            &words[2..],
            transport.clone(),
            RetryPolicy {
                attempts: 1,
                base_delay: Duration::ZERO,
            },
            &AdapterSettings::default(),
        )
    }
}
