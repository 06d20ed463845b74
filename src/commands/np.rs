use poise::async_trait;

use super::{lastfm_account, target_user};
use crate::context::CommandContext;
use crate::error::CommandError;
use crate::registry::{BotState, Command, CommandOption, CommandSchema};
use crate::reply::Reply;
use crate::utils::ScrobbleEmbedBuilder;

pub struct NowPlaying;

#[async_trait]
impl Command for NowPlaying {
    fn schema(&self) -> CommandSchema {
        CommandSchema::new("np", "Show what you or someone else is listening to")
            .alias("nowplaying")
            .option(CommandOption::user("user", "Whose track to show"))
    }

    async fn execute(&self, ctx: &dyn CommandContext, state: &BotState) -> Result<(), CommandError> {
        ctx.defer_reply().await;

        let target = target_user(ctx);
        let account = lastfm_account(state, &target).await?;
        let recent = state.lastfm.recent_tracks(&account, 1, 1).await?;

        let reply = match recent.tracks.first() {
            Some(track) => {
                Reply::default().build_embed_now_playing(&target, &account, track, recent.total)
            }
            None => Reply::default().build_embed_empty_history(&account),
        };
        ctx.edit_reply(reply).await;
        Ok(())
    }
}
