use poise::async_trait;
use poise::futures_util::future::join_all;
use poise::serenity_prelude as serenity;
use tracing::warn;

use super::artist_or_now_playing;
use crate::context::CommandContext;
use crate::error::CommandError;
use crate::registry::{BotState, Command, CommandOption, CommandSchema};
use crate::reply::{Embed, Reply, ACCENT};
use crate::utils::{bold, escape_markdown, plural};

/// Rows shown in the ranking.
const SHOWN: usize = 15;

pub struct WhoKnows;

struct Listener {
    user_id: serenity::UserId,
    account: String,
    plays: u64,
}

#[async_trait]
impl Command for WhoKnows {
    fn schema(&self) -> CommandSchema {
        CommandSchema::new("wk", "See who in this server listens to an artist")
            .alias("whoknows")
            .option(CommandOption::string(
                "artist",
                "Artist name, defaults to what you're listening to",
            ))
    }

    async fn execute(&self, ctx: &dyn CommandContext, state: &BotState) -> Result<(), CommandError> {
        let Some(guild_id) = ctx.guild_id() else {
            return Err(CommandError::usage("This command only works in a server."));
        };
        ctx.defer_reply().await;

        let account = state.users.lastfm_name(ctx.user().id).await;
        let artist = artist_or_now_playing(ctx, state, account.as_deref()).await?;

        let members = state.users.guild_members(guild_id).await;
        if members.is_empty() {
            return Err(CommandError::usage(
                "Nobody in this server has linked a Last.fm account yet.",
            ));
        }

        let lookups = members
            .iter()
            .map(|(_, name)| state.lastfm.artist_info(&artist, Some(name.as_str())));
        let results = join_all(lookups).await;

        let mut display_name = None;
        let mut listeners = Vec::new();
        let mut first_error = None;
        for ((user_id, name), result) in members.into_iter().zip(results) {
            match result {
                Ok(info) => {
                    display_name.get_or_insert(info.name);
                    let plays = info.user_playcount.unwrap_or(0);
                    if plays > 0 {
                        listeners.push(Listener {
                            user_id,
                            account: name,
                            plays,
                        });
                    }
                }
                Err(e) => {
                    warn!("Artist lookup for {} failed: {}", name, e);
                    first_error.get_or_insert(e);
                }
            }
        }
        let Some(artist) = display_name else {
            return Err(first_error.map_or_else(
                || CommandError::usage("Nobody in this server has linked a Last.fm account yet."),
                CommandError::from,
            ));
        };

        listeners.sort_by(|a, b| b.plays.cmp(&a.plays).then_with(|| a.account.cmp(&b.account)));
        ctx.edit_reply(render(&artist, &listeners)).await;
        Ok(())
    }
}

fn render(artist: &str, listeners: &[Listener]) -> Reply {
    let title = format!("Who knows {}?", artist);
    if listeners.is_empty() {
        return Reply::embed(
            Embed::new()
                .color(ACCENT)
                .title(title)
                .description(format!("Nobody here has listened to {} yet.", escape_markdown(artist))),
        );
    }

    let lines: Vec<String> = listeners
        .iter()
        .take(SHOWN)
        .enumerate()
        .map(|(i, l)| {
            format!(
                "`{}.` <@{}> ({}) - {}",
                i + 1,
                l.user_id.0,
                escape_markdown(&l.account),
                bold(&plural(l.plays, "play"))
            )
        })
        .collect();
    let total: u64 = listeners.iter().map(|l| l.plays).sum();

    Reply::embed(
        Embed::new()
            .color(ACCENT)
            .title(title)
            .description(lines.join("\n"))
            .footer(format!(
                "{} · {}",
                plural(listeners.len() as u64, "listener"),
                plural(total, "play")
            )),
    )
}
