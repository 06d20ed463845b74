use poise::async_trait;

use super::{lastfm_account, target_user};
use crate::context::CommandContext;
use crate::error::CommandError;
use crate::lastfm::{Period, TopArtist};
use crate::registry::{BotState, Command, CommandOption, CommandSchema};
use crate::reply::{Embed, Reply, ACCENT};
use crate::utils::{bold, escape_markdown, hyperlink, plural, profile_url};

const LIMIT: u32 = 10;

pub struct TopArtists;

/// Missing periods and stray mentions (`.fm topartists @someone`) mean
/// all time.
fn period_option(raw: Option<String>) -> Result<Period, CommandError> {
    let Some(raw) = raw.filter(|r| !r.trim().is_empty() && !r.starts_with("<@")) else {
        return Ok(Period::Overall);
    };
    Period::parse(&raw).ok_or_else(|| {
        CommandError::usage(format!(
            "`{}` isn't a period I know. Try week, month, quarter, half, year or overall.",
            raw
        ))
    })
}

fn render(account: &str, period: Period, artists: &[TopArtist]) -> Reply {
    let title = format!("Top artists - {}", account);
    if artists.is_empty() {
        return Reply::embed(
            Embed::new()
                .color(ACCENT)
                .title(title)
                .description(format!("No scrobbles for {}.", period.label())),
        );
    }

    let lines: Vec<String> = artists
        .iter()
        .map(|a| {
            format!(
                "`{}.` {} - {}",
                a.rank,
                bold(&hyperlink(&escape_markdown(&a.name), &a.url)),
                plural(a.playcount, "play")
            )
        })
        .collect();
    Reply::embed(
        Embed::new()
            .color(ACCENT)
            .title(title)
            .url(profile_url(account))
            .description(lines.join("\n"))
            .footer(format!("Top artists of {}", period.label())),
    )
}

#[async_trait]
impl Command for TopArtists {
    fn schema(&self) -> CommandSchema {
        CommandSchema::new("topartists", "Show your most played artists")
            .alias("ta")
            .option(
                CommandOption::string("period", "Time period")
                    .choice("Week", "7day")
                    .choice("Month", "1month")
                    .choice("Quarter", "3month")
                    .choice("Half year", "6month")
                    .choice("Year", "12month")
                    .choice("All time", "overall"),
            )
            .option(CommandOption::user("user", "Whose artists to show"))
    }

    async fn execute(&self, ctx: &dyn CommandContext, state: &BotState) -> Result<(), CommandError> {
        let period = period_option(ctx.options().get_string("period"))?;
        ctx.defer_reply().await;

        let target = target_user(ctx);
        let account = lastfm_account(state, &target).await?;
        let artists = state.lastfm.top_artists(&account, period, LIMIT).await?;

        ctx.edit_reply(render(&account, period, &artists)).await;
        Ok(())
    }
}
