use poise::async_trait;

use super::artist_or_now_playing;
use crate::context::CommandContext;
use crate::error::CommandError;
use crate::registry::{BotState, Command, CommandOption, CommandSchema};
use crate::reply::Reply;
use crate::utils::ScrobbleEmbedBuilder;

pub struct Artist;

#[async_trait]
impl Command for Artist {
    fn schema(&self) -> CommandSchema {
        CommandSchema::new("artist", "Show info about an artist")
            .alias("a")
            .option(CommandOption::string(
                "artist",
                "Artist name, defaults to what you're listening to",
            ))
    }

    async fn execute(&self, ctx: &dyn CommandContext, state: &BotState) -> Result<(), CommandError> {
        ctx.defer_reply().await;

        // Unlinked users still get the public stats.
        let account = state.users.lastfm_name(ctx.user().id).await;
        let artist = artist_or_now_playing(ctx, state, account.as_deref()).await?;
        let info = state.lastfm.artist_info(&artist, account.as_deref()).await?;

        ctx.edit_reply(Reply::default().build_embed_artist(&info, account.as_deref()))
            .await;
        Ok(())
    }
}
