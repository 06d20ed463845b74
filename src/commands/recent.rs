use poise::async_trait;

use super::{lastfm_account, target_user};
use crate::context::CommandContext;
use crate::error::CommandError;
use crate::lastfm::RecentTracks;
use crate::registry::{BotState, Command, CommandOption, CommandSchema, ComponentEvent};
use crate::reply::{Button, Embed, Reply, ACCENT};
use crate::utils::{bold, escape_markdown, hyperlink, plural, profile_url, ScrobbleEmbedBuilder};

const PAGE_SIZE: u32 = 10;

pub struct Recent;

/// One page of `account`'s history with Previous/Next buttons carrying the
/// page they lead to.
fn render_page(account: &str, recent: &RecentTracks) -> Reply {
    if recent.tracks.is_empty() {
        return Reply::default().build_embed_empty_history(account);
    }

    let offset = (recent.page.max(1) - 1) * PAGE_SIZE;
    let lines: Vec<String> = recent
        .tracks
        .iter()
        .enumerate()
        .map(|(i, track)| {
            let marker = if track.now_playing { " (now playing)" } else { "" };
            format!(
                "`{}.` {} by {}{}",
                offset + i as u32 + 1,
                bold(&hyperlink(&escape_markdown(&track.name), &track.url)),
                escape_markdown(&track.artist),
                marker
            )
        })
        .collect();

    let embed = Embed::new()
        .color(ACCENT)
        .title(format!("Recent tracks - {}", account))
        .url(profile_url(account))
        .description(lines.join("\n"))
        .footer(format!(
            "Page {}/{} · {}",
            recent.page,
            recent.total_pages.max(1),
            plural(recent.total, "scrobble")
        ));

    let previous = format!("recent:{}:{}", account, recent.page.saturating_sub(1));
    let next = format!("recent:{}:{}", account, recent.page + 1);
    Reply::embed(embed)
        .with_button(Button::new(previous, "Previous").disabled(recent.page <= 1))
        .with_button(Button::new(next, "Next").disabled(recent.page >= recent.total_pages))
}

/// `<account>:<page>`
fn parse_state(state: &str) -> Option<(&str, u32)> {
    let (account, page) = state.rsplit_once(':')?;
    let page = page.parse::<u32>().ok().filter(|p| *p > 0)?;
    if account.is_empty() {
        return None;
    }
    Some((account, page))
}

#[async_trait]
impl Command for Recent {
    fn schema(&self) -> CommandSchema {
        CommandSchema::new("recent", "List recently scrobbled tracks")
            .alias("rt")
            .option(CommandOption::user("user", "Whose history to show"))
    }

    async fn execute(&self, ctx: &dyn CommandContext, state: &BotState) -> Result<(), CommandError> {
        ctx.defer_reply().await;

        let target = target_user(ctx);
        let account = lastfm_account(state, &target).await?;
        let recent = state.lastfm.recent_tracks(&account, 1, PAGE_SIZE).await?;

        ctx.edit_reply(render_page(&account, &recent)).await;
        Ok(())
    }

    async fn component(
        &self,
        event: &ComponentEvent,
        state: &BotState,
    ) -> Result<Option<Reply>, CommandError> {
        let Some((account, page)) = parse_state(event.state()) else {
            return Err(CommandError::usage("That page is no longer available."));
        };
        let recent = state.lastfm.recent_tracks(account, page, PAGE_SIZE).await?;
        Ok(Some(render_page(account, &recent)))
    }
}
