//! Message payloads commands hand back to whichever context invoked them.

/// Brand colour used by most embeds.
pub const ACCENT: u32 = 0xA877C8;
pub const ERROR_RED: u32 = 0xED4245;

const DEGRADED_FALLBACK: &str = "Something went wrong while sending the full response.";

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Reply {
    pub content: Option<String>,
    pub embeds: Vec<Embed>,
    pub buttons: Vec<Button>,
    /// Only honoured by native interactions.
    pub ephemeral: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Embed {
    pub title: Option<String>,
    pub url: Option<String>,
    pub description: Option<String>,
    pub color: Option<u32>,
    pub thumbnail: Option<String>,
    pub fields: Vec<(String, String, bool)>,
    pub footer: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Button {
    pub custom_id: String,
    pub label: String,
    pub disabled: bool,
}

impl Reply {
    pub fn text(content: impl Into<String>) -> Self {
        Reply {
            content: Some(content.into()),
            ..Default::default()
        }
    }

    pub fn embed(embed: Embed) -> Self {
        Reply {
            embeds: vec![embed],
            ..Default::default()
        }
    }

    pub fn ephemeral(mut self) -> Self {
        self.ephemeral = true;
        self
    }

    pub fn with_button(mut self, button: Button) -> Self {
        self.buttons.push(button);
        self
    }

    /// String-only rendition of this reply, used when the full payload could
    /// not be delivered.
    pub fn degraded(&self) -> Reply {
        let text = match &self.content {
            Some(content) if !content.trim().is_empty() => content.clone(),
            _ => self
                .embeds
                .first()
                .map(Embed::plain_text)
                .filter(|t| !t.is_empty())
                .unwrap_or_else(|| DEGRADED_FALLBACK.to_string()),
        };
        Reply {
            content: Some(truncate(&text, 2000)),
            ephemeral: self.ephemeral,
            ..Default::default()
        }
    }
}

impl Embed {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn title(mut self, title: impl Into<String>) -> Self {
        self.title = Some(title.into());
        self
    }

    pub fn url(mut self, url: impl Into<String>) -> Self {
        self.url = Some(url.into());
        self
    }

    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn color(mut self, color: u32) -> Self {
        self.color = Some(color);
        self
    }

    pub fn thumbnail(mut self, url: impl Into<String>) -> Self {
        self.thumbnail = Some(url.into());
        self
    }

    pub fn field(mut self, name: impl Into<String>, value: impl ToString, inline: bool) -> Self {
        self.fields.push((name.into(), value.to_string(), inline));
        self
    }

    pub fn footer(mut self, text: impl Into<String>) -> Self {
        self.footer = Some(text.into());
        self
    }

    fn plain_text(&self) -> String {
        let mut parts: Vec<String> = Vec::new();
        if let Some(title) = &self.title {
            parts.push(format!("**{}**", title));
        }
        if let Some(description) = &self.description {
            parts.push(description.clone());
        }
        for (name, value, _) in &self.fields {
            parts.push(format!("{}: {}", name, value));
        }
        parts.join("\n")
    }
}

impl Button {
    pub fn new(custom_id: impl Into<String>, label: impl Into<String>) -> Self {
        Button {
            custom_id: custom_id.into(),
            label: label.into(),
            disabled: false,
        }
    }

    pub fn disabled(mut self, disabled: bool) -> Self {
        self.disabled = disabled;
        self
    }
}

fn truncate(text: &str, max_chars: usize) -> String {
    if text.chars().count() <= max_chars {
        return text.to_string();
    }
    let mut out: String = text.chars().take(max_chars - 1).collect();
    out.push('…');
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn degraded_keeps_text_content() {
        let reply = Reply {
            content: Some("hello".into()),
            embeds: vec![Embed::new().title("ignored")],
            buttons: vec![Button::new("recent:x:2", "Next")],
            ephemeral: false,
        };
        assert_eq!(reply.degraded(), Reply::text("hello"));
    }

    #[test]
    fn degraded_flattens_embed() {
        let reply = Reply::embed(
            Embed::new()
                .title("Now playing")
                .description("Hey Ya! by OutKast")
                .field("Album", "Speakerboxxx/The Love Below", true),
        );
        let degraded = reply.degraded();
        assert!(degraded.embeds.is_empty());
        assert!(degraded.buttons.is_empty());
        assert_eq!(
            degraded.content.as_deref(),
            Some("**Now playing**\nHey Ya! by OutKast\nAlbum: Speakerboxxx/The Love Below")
        );
    }

    #[test]
    fn degraded_of_empty_reply_has_fallback_text() {
        assert_eq!(
            Reply::default().degraded().content.as_deref(),
            Some(DEGRADED_FALLBACK)
        );
    }

    #[test]
    fn degraded_respects_message_limit() {
        let reply = Reply::text("a".repeat(2500));
        assert_eq!(reply.degraded().content.unwrap().chars().count(), 2000);
    }
}
