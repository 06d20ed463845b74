use tracing::error;

use crate::context::UserView;
use crate::error::TransportError;
use crate::lastfm::{ArtistInfo, ScrobbledTrack};
use crate::reply::{Embed, Reply, ACCENT, ERROR_RED};

pub fn check_msg<T>(result: Result<T, TransportError>) {
    if let Err(why) = result {
        error!("Error sending message: {:?}", why);
    }
}

pub fn bold(s: &str) -> String {
    format!("**{}**", s)
}

pub fn hyperlink(text: &str, url: &str) -> String {
    if url.is_empty() {
        return text.to_string();
    }
    format!("[{}]({})", text, url)
}

/// Escapes characters Discord would read as markdown.
pub fn escape_markdown(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        if matches!(c, '*' | '_' | '~' | '`' | '|' | '>' | '[' | ']') {
            out.push('\\');
        }
        out.push(c);
    }
    out
}

pub fn plural(count: u64, word: &str) -> String {
    if count == 1 {
        format!("{} {}", count, word)
    } else {
        format!("{} {}s", count, word)
    }
}

pub fn profile_url(account: &str) -> String {
    format!("https://www.last.fm/user/{}", account)
}

pub trait ScrobbleEmbedBuilder: Sized {
    fn build_embed_now_playing(
        self,
        user: &UserView,
        account: &str,
        track: &ScrobbledTrack,
        total_scrobbles: u64,
    ) -> Self;

    fn build_embed_artist(self, info: &ArtistInfo, account: Option<&str>) -> Self;

    fn build_embed_empty_history(self, account: &str) -> Self;
}

impl ScrobbleEmbedBuilder for Reply {
    fn build_embed_now_playing(
        mut self,
        user: &UserView,
        account: &str,
        track: &ScrobbledTrack,
        total_scrobbles: u64,
    ) -> Self {
        let heading = if track.now_playing {
            format!("Now playing - {}", user.display_name)
        } else {
            format!("Last played - {}", user.display_name)
        };
        let mut description = bold(&hyperlink(&escape_markdown(&track.name), &track.url));
        description.push_str(&format!("\nby {}", bold(&escape_markdown(&track.artist))));
        if let Some(album) = &track.album {
            description.push_str(&format!(" on *{}*", escape_markdown(album)));
        }

        let mut embed = Embed::new()
            .color(ACCENT)
            .title(heading)
            .url(profile_url(account))
            .description(description)
            .footer(format!("{} · {}", account, plural(total_scrobbles, "scrobble")));
        if let Some(image) = &track.image {
            embed = embed.thumbnail(image);
        }
        self.embeds.push(embed);
        self
    }

    fn build_embed_artist(mut self, info: &ArtistInfo, account: Option<&str>) -> Self {
        let mut embed = Embed::new()
            .color(ACCENT)
            .title(&info.name)
            .url(&info.url)
            .field("Listeners", info.listeners, true)
            .field("Scrobbles", info.playcount, true);
        if let (Some(account), Some(plays)) = (account, info.user_playcount) {
            embed = embed.field(format!("{}'s plays", account), plays, true);
        }
        if let Some(summary) = &info.summary {
            embed = embed.description(summary);
        }
        if !info.tags.is_empty() {
            embed = embed.footer(info.tags.join(" · "));
        }
        self.embeds.push(embed);
        self
    }

    fn build_embed_empty_history(mut self, account: &str) -> Self {
        self.embeds.push(
            Embed::new()
                .color(ERROR_RED)
                .title(format!("{} hasn't scrobbled anything yet", account)),
        );
        self
    }
}
