//! Minimal Last.fm client covering what the commands display.

use poise::async_trait;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Deserializer};
use serde_json::Value;
use tracing::debug;
use url::Url;

use crate::error::LastfmError;

const API_ROOT: &str = "https://ws.audioscrobbler.com/2.0/";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Period {
    Overall,
    Week,
    Month,
    Quarter,
    HalfYear,
    Year,
}

impl Period {
    pub fn parse(raw: &str) -> Option<Self> {
        let period = match raw.trim().to_lowercase().as_str() {
            "overall" | "all" | "alltime" => Period::Overall,
            "7day" | "7days" | "week" | "w" => Period::Week,
            "1month" | "30day" | "month" | "m" => Period::Month,
            "3month" | "quarter" | "q" => Period::Quarter,
            "6month" | "half" | "h" => Period::HalfYear,
            "12month" | "year" | "y" => Period::Year,
            _ => return None,
        };
        Some(period)
    }

    pub fn as_api(&self) -> &'static str {
        match self {
            Period::Overall => "overall",
            Period::Week => "7day",
            Period::Month => "1month",
            Period::Quarter => "3month",
            Period::HalfYear => "6month",
            Period::Year => "12month",
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            Period::Overall => "all time",
            Period::Week => "the last week",
            Period::Month => "the last month",
            Period::Quarter => "the last 3 months",
            Period::HalfYear => "the last 6 months",
            Period::Year => "the last year",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScrobbledTrack {
    pub name: String,
    pub artist: String,
    pub album: Option<String>,
    pub url: String,
    pub image: Option<String>,
    pub now_playing: bool,
    /// Unix seconds; absent while the track is playing.
    pub played_at: Option<u64>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecentTracks {
    pub user: String,
    pub tracks: Vec<ScrobbledTrack>,
    pub page: u32,
    pub total_pages: u32,
    pub total: u64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArtistInfo {
    pub name: String,
    pub url: String,
    pub listeners: u64,
    pub playcount: u64,
    /// Only present when a username was passed.
    pub user_playcount: Option<u64>,
    pub summary: Option<String>,
    pub tags: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TopArtist {
    pub rank: u32,
    pub name: String,
    pub playcount: u64,
    pub url: String,
}

#[async_trait]
pub trait ScrobbleSource: Send + Sync {
    async fn recent_tracks(
        &self,
        user: &str,
        page: u32,
        limit: u32,
    ) -> Result<RecentTracks, LastfmError>;

    async fn artist_info(
        &self,
        artist: &str,
        username: Option<&str>,
    ) -> Result<ArtistInfo, LastfmError>;

    async fn top_artists(
        &self,
        user: &str,
        period: Period,
        limit: u32,
    ) -> Result<Vec<TopArtist>, LastfmError>;
}

pub struct LastfmClient {
    http: reqwest::Client,
    api_key: String,
    base_url: Url,
}

impl LastfmClient {
    pub fn new(api_key: impl Into<String>) -> Result<Self, LastfmError> {
        Self::with_base_url(api_key, API_ROOT)
    }

    pub fn with_base_url(api_key: impl Into<String>, base_url: &str) -> Result<Self, LastfmError> {
        Ok(LastfmClient {
            http: reqwest::Client::new(),
            api_key: api_key.into(),
            base_url: Url::parse(base_url)?,
        })
    }

    fn request_url(&self, method: &str, params: &[(&str, &str)]) -> Url {
        let mut url = self.base_url.clone();
        url.query_pairs_mut()
            .append_pair("method", method)
            .append_pair("api_key", &self.api_key)
            .append_pair("format", "json")
            .extend_pairs(params);
        url
    }

    async fn call<T: DeserializeOwned>(
        &self,
        method: &str,
        params: &[(&str, &str)],
    ) -> Result<T, LastfmError> {
        debug!("Calling Last.fm {} {:?}", method, params);
        let body = self
            .http
            .get(self.request_url(method, params))
            .send()
            .await?
            .text()
            .await?;
        decode(&body)
    }
}

#[async_trait]
impl ScrobbleSource for LastfmClient {
    async fn recent_tracks(
        &self,
        user: &str,
        page: u32,
        limit: u32,
    ) -> Result<RecentTracks, LastfmError> {
        let page = page.to_string();
        let limit = limit.to_string();
        let raw: RecentTracksResponse = self
            .call(
                "user.getrecenttracks",
                &[("user", user), ("page", &page), ("limit", &limit)],
            )
            .await?;
        Ok(raw.into())
    }

    async fn artist_info(
        &self,
        artist: &str,
        username: Option<&str>,
    ) -> Result<ArtistInfo, LastfmError> {
        let mut params = vec![("artist", artist), ("autocorrect", "1")];
        if let Some(username) = username {
            params.push(("username", username));
        }
        let raw: ArtistInfoResponse = self.call("artist.getinfo", &params).await?;
        Ok(raw.into())
    }

    async fn top_artists(
        &self,
        user: &str,
        period: Period,
        limit: u32,
    ) -> Result<Vec<TopArtist>, LastfmError> {
        let limit = limit.to_string();
        let raw: TopArtistsResponse = self
            .call(
                "user.gettopartists",
                &[("user", user), ("period", period.as_api()), ("limit", &limit)],
            )
            .await?;
        Ok(raw.into())
    }
}

/// Last.fm reports failures as `{"error": <code>, "message": "..."}`, often
/// with a 200 status.
fn decode<T: DeserializeOwned>(body: &str) -> Result<T, LastfmError> {
    let value: Value = serde_json::from_str(body)?;
    if let Some(code) = value.get("error").and_then(Value::as_u64) {
        let message = value
            .get("message")
            .and_then(Value::as_str)
            .unwrap_or("unknown error")
            .to_string();
        return Err(LastfmError::Api {
            code: code as u32,
            message,
        });
    }
    Ok(serde_json::from_value(value)?)
}

// Wire format. Numbers arrive as strings and single-element lists as bare
// objects.

#[derive(Deserialize)]
#[serde(untagged)]
enum OneOrMany<T> {
    Many(Vec<T>),
    One(T),
}

impl<T> Default for OneOrMany<T> {
    fn default() -> Self {
        OneOrMany::Many(Vec::new())
    }
}

impl<T> OneOrMany<T> {
    fn into_vec(self) -> Vec<T> {
        match self {
            OneOrMany::Many(items) => items,
            OneOrMany::One(item) => vec![item],
        }
    }
}

fn number<'de, D: Deserializer<'de>>(deserializer: D) -> Result<u64, D::Error> {
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Raw {
        Number(u64),
        Text(String),
    }
    match Raw::deserialize(deserializer)? {
        Raw::Number(n) => Ok(n),
        Raw::Text(text) if text.trim().is_empty() => Ok(0),
        Raw::Text(text) => text.trim().parse().map_err(serde::de::Error::custom),
    }
}

fn optional_number<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<u64>, D::Error> {
    number(deserializer).map(Some)
}

#[derive(Deserialize)]
struct Text {
    #[serde(rename = "#text", default)]
    text: String,
}

#[derive(Deserialize)]
struct Image {
    #[serde(default)]
    size: String,
    #[serde(rename = "#text", default)]
    url: String,
}

fn largest_image(images: &[Image]) -> Option<String> {
    images
        .iter()
        .find(|i| i.size == "extralarge" && !i.url.is_empty())
        .or_else(|| images.iter().rev().find(|i| !i.url.is_empty()))
        .map(|i| i.url.clone())
}

#[derive(Deserialize)]
struct RecentTracksResponse {
    recenttracks: RawRecentTracks,
}

#[derive(Deserialize)]
struct RawRecentTracks {
    #[serde(default)]
    track: OneOrMany<RawTrack>,
    #[serde(rename = "@attr")]
    attr: RawPage,
}

#[derive(Deserialize)]
struct RawPage {
    #[serde(default)]
    user: String,
    #[serde(deserialize_with = "number")]
    page: u64,
    #[serde(rename = "totalPages", deserialize_with = "number")]
    total_pages: u64,
    #[serde(deserialize_with = "number")]
    total: u64,
}

#[derive(Deserialize)]
struct RawTrack {
    name: String,
    #[serde(default)]
    url: String,
    artist: Text,
    album: Option<Text>,
    #[serde(default)]
    image: Vec<Image>,
    date: Option<RawDate>,
    #[serde(rename = "@attr")]
    attr: Option<RawTrackAttr>,
}

#[derive(Deserialize)]
struct RawDate {
    #[serde(deserialize_with = "number")]
    uts: u64,
}

#[derive(Deserialize)]
struct RawTrackAttr {
    #[serde(default)]
    nowplaying: String,
}

impl From<RecentTracksResponse> for RecentTracks {
    fn from(raw: RecentTracksResponse) -> Self {
        let raw = raw.recenttracks;
        let tracks = raw
            .track
            .into_vec()
            .into_iter()
            .map(|t| ScrobbledTrack {
                image: largest_image(&t.image),
                now_playing: t.attr.map_or(false, |a| a.nowplaying == "true"),
                played_at: t.date.map(|d| d.uts),
                album: t.album.map(|a| a.text).filter(|a| !a.is_empty()),
                artist: t.artist.text,
                name: t.name,
                url: t.url,
            })
            .collect();
        RecentTracks {
            user: raw.attr.user,
            tracks,
            page: raw.attr.page as u32,
            total_pages: raw.attr.total_pages as u32,
            total: raw.attr.total,
        }
    }
}

#[derive(Deserialize)]
struct ArtistInfoResponse {
    artist: RawArtist,
}

#[derive(Deserialize)]
struct RawArtist {
    name: String,
    #[serde(default)]
    url: String,
    stats: RawArtistStats,
    bio: Option<RawBio>,
    #[serde(default)]
    tags: Value,
}

#[derive(Deserialize)]
struct RawArtistStats {
    #[serde(deserialize_with = "number")]
    listeners: u64,
    #[serde(deserialize_with = "number")]
    playcount: u64,
    #[serde(default, deserialize_with = "optional_number")]
    userplaycount: Option<u64>,
}

#[derive(Deserialize)]
struct RawBio {
    #[serde(default)]
    summary: String,
}

/// `tags` is `{"tag": [...]}`, `{"tag": {...}}` or an empty string.
fn tag_names(tags: &Value) -> Vec<String> {
    let name = |t: &Value| t.get("name").and_then(Value::as_str).map(str::to_string);
    match tags.get("tag") {
        Some(Value::Array(items)) => items.iter().filter_map(name).collect(),
        Some(item @ Value::Object(_)) => name(item).into_iter().collect(),
        _ => Vec::new(),
    }
}

/// Last.fm appends a "Read more on Last.fm" anchor to every summary.
fn strip_read_more(summary: &str) -> String {
    match summary.find("<a href") {
        Some(idx) => summary[..idx].trim().to_string(),
        None => summary.trim().to_string(),
    }
}

impl From<ArtistInfoResponse> for ArtistInfo {
    fn from(raw: ArtistInfoResponse) -> Self {
        let artist = raw.artist;
        ArtistInfo {
            tags: tag_names(&artist.tags),
            summary: artist
                .bio
                .map(|b| strip_read_more(&b.summary))
                .filter(|s| !s.is_empty()),
            name: artist.name,
            url: artist.url,
            listeners: artist.stats.listeners,
            playcount: artist.stats.playcount,
            user_playcount: artist.stats.userplaycount,
        }
    }
}

#[derive(Deserialize)]
struct TopArtistsResponse {
    topartists: RawTopArtists,
}

#[derive(Deserialize)]
struct RawTopArtists {
    #[serde(default)]
    artist: OneOrMany<RawTopArtist>,
}

#[derive(Deserialize)]
struct RawTopArtist {
    name: String,
    #[serde(deserialize_with = "number")]
    playcount: u64,
    #[serde(default)]
    url: String,
    #[serde(rename = "@attr")]
    attr: Option<RawRank>,
}

#[derive(Deserialize)]
struct RawRank {
    #[serde(deserialize_with = "number")]
    rank: u64,
}

impl From<TopArtistsResponse> for Vec<TopArtist> {
    fn from(raw: TopArtistsResponse) -> Self {
        raw.topartists
            .artist
            .into_vec()
            .into_iter()
            .enumerate()
            .map(|(i, a)| TopArtist {
                rank: a.attr.map_or(i as u64 + 1, |r| r.rank) as u32,
                name: a.name,
                playcount: a.playcount,
                url: a.url,
            })
            .collect()
    }
}
