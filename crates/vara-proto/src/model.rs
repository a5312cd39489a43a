//! Catalog and account records as served by the two backends.
//!
//! Catalog payloads are loosely shaped (ids may arrive as `id` or `_id`,
//! tags as bare ids or embedded objects), so songs are first read into
//! [`RawSong`] and only promoted to [`Song`] once the required fields are
//! present. Everything downstream works with the validated types.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use tracing::warn;

// ── Catalog ───────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum CollectionType {
    #[default]
    Free,
    Premium,
    Paid,
}

impl CollectionType {
    fn parse(raw: Option<&str>) -> Self {
        match raw.map(|s| s.trim().to_ascii_lowercase()).as_deref() {
            Some("premium") => Self::Premium,
            Some("paid") => Self::Paid,
            _ => Self::Free,
        }
    }

    /// Premium and paid songs need an account to download.
    pub fn is_gated(&self) -> bool {
        !matches!(self, Self::Free)
    }
}

/// A genre / sub-genre / mood / instrument reference attached to a song.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Default)]
pub struct Tag {
    pub id: String,
    pub name: String,
}

impl<'de> Deserialize<'de> for Tag {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum TagRepr {
            Id(String),
            Object {
                #[serde(alias = "_id")]
                id: String,
                #[serde(default)]
                name: String,
            },
        }

        Ok(match TagRepr::deserialize(deserializer)? {
            TagRepr::Id(id) => Tag {
                id,
                name: String::new(),
            },
            TagRepr::Object { id, name } => Tag { id, name },
        })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Song {
    pub id: String,
    pub title: String,
    pub audio_url: String,
    #[serde(default)]
    pub image_url: String,
    /// Seconds.
    #[serde(default)]
    pub duration: f64,
    #[serde(default)]
    pub collection_type: CollectionType,
    #[serde(default)]
    pub genres: Vec<Tag>,
    #[serde(default)]
    pub sub_genres: Vec<Tag>,
    #[serde(default)]
    pub instruments: Vec<Tag>,
    #[serde(default)]
    pub moods: Vec<Tag>,
}

impl Song {
    pub fn has_sub_genre(&self, id: &str) -> bool {
        self.sub_genres.iter().any(|t| t.id == id)
    }

    pub fn has_instrument(&self, id: &str) -> bool {
        self.instruments.iter().any(|t| t.id == id)
    }

    pub fn has_mood(&self, id: &str) -> bool {
        self.moods.iter().any(|t| t.id == id)
    }

    /// Every tag name attached to this song (for search).
    pub fn tag_names(&self) -> impl Iterator<Item = &str> {
        self.genres
            .iter()
            .chain(&self.sub_genres)
            .chain(&self.moods)
            .chain(&self.instruments)
            .map(|t| t.name.as_str())
            .filter(|n| !n.is_empty())
    }
}

/// Song as it comes off the wire, before validation.
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct RawSong {
    #[serde(default, alias = "_id")]
    pub id: Option<String>,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default, alias = "audio_url", alias = "url")]
    pub audio_url: Option<String>,
    #[serde(default, alias = "image_url", alias = "coverUrl")]
    pub image_url: Option<String>,
    #[serde(default)]
    pub duration: Option<f64>,
    #[serde(default, alias = "collection_type")]
    pub collection_type: Option<String>,
    #[serde(default)]
    pub genres: Vec<Tag>,
    #[serde(default, alias = "subgenres", alias = "sub_genres")]
    pub sub_genres: Vec<Tag>,
    #[serde(default)]
    pub instruments: Vec<Tag>,
    #[serde(default)]
    pub moods: Vec<Tag>,
}

impl RawSong {
    /// Promote to a [`Song`]; `None` when the id or audio URL is missing.
    pub fn validate(self) -> Option<Song> {
        let id = self.id.filter(|s| !s.trim().is_empty())?;
        let audio_url = self.audio_url.filter(|s| !s.trim().is_empty())?;
        Some(Song {
            title: self.title.unwrap_or_else(|| "Untitled".to_string()),
            image_url: self.image_url.unwrap_or_default(),
            duration: self.duration.filter(|d| d.is_finite() && *d >= 0.0).unwrap_or(0.0),
            collection_type: CollectionType::parse(self.collection_type.as_deref()),
            genres: self.genres,
            sub_genres: self.sub_genres,
            instruments: self.instruments,
            moods: self.moods,
            id,
            audio_url,
        })
    }
}

/// Validate a batch of raw songs, dropping (and logging) incomplete ones.
pub fn validate_songs(raw: Vec<RawSong>) -> Vec<Song> {
    let total = raw.len();
    let songs: Vec<Song> = raw.into_iter().filter_map(RawSong::validate).collect();
    if songs.len() != total {
        warn!(
            dropped = total - songs.len(),
            total, "dropped songs without id or audio url"
        );
    }
    songs
}

fn deserialize_opt_id<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<String>, D::Error> {
    Ok(Option::<Tag>::deserialize(deserializer)?.map(|t| t.id))
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Genre {
    #[serde(alias = "_id")]
    pub id: String,
    pub name: String,
    #[serde(default, alias = "image_url")]
    pub image_url: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubGenre {
    #[serde(alias = "_id")]
    pub id: String,
    pub name: String,
    /// Parent genre id (the backend may embed the whole genre object).
    #[serde(default, alias = "genre", alias = "genre_id", deserialize_with = "deserialize_opt_id")]
    pub genre_id: Option<String>,
    #[serde(default, alias = "image_url")]
    pub image_url: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Instrument {
    #[serde(alias = "_id")]
    pub id: String,
    pub name: String,
    #[serde(default, alias = "image_url")]
    pub image_url: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Mood {
    #[serde(alias = "_id")]
    pub id: String,
    pub name: String,
    #[serde(default, alias = "image_url")]
    pub image_url: Option<String>,
}

/// Server-issued content stamp. Numbers compare numerically, anything else
/// is treated as an opaque token.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ContentVersion {
    Number(u64),
    Token(String),
}

impl std::fmt::Display for ContentVersion {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Number(n) => write!(f, "{}", n),
            Self::Token(t) => f.write_str(t),
        }
    }
}

// ── Account ───────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CurrentUser {
    pub email: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub picture: Option<String>,
    #[serde(default)]
    pub is_premium: bool,
    #[serde(default)]
    pub premium_expires_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub youtube_channel_link: Option<String>,
}

impl CurrentUser {
    /// Premium flag that also honours the expiry date.
    pub fn has_active_premium(&self, now: DateTime<Utc>) -> bool {
        self.is_premium && self.premium_expires_at.map_or(true, |exp| exp > now)
    }

    pub fn plan_label(&self) -> &'static str {
        if self.has_active_premium(Utc::now()) {
            "premium"
        } else {
            "free"
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DownloadLimits {
    pub remaining: u32,
    #[serde(default)]
    pub limit: Option<u32>,
    #[serde(default)]
    pub plan: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DownloadReceipt {
    #[serde(alias = "license_id", alias = "certificateId", alias = "certificate_id")]
    pub license_id: String,
    #[serde(default)]
    pub remaining: Option<u32>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct License {
    #[serde(alias = "license_id", alias = "certificateId")]
    pub license_id: String,
    #[serde(default, alias = "song_id")]
    pub song_id: Option<String>,
    #[serde(default, alias = "song_title")]
    pub song_title: Option<String>,
    #[serde(default, alias = "issued_at", alias = "createdAt")]
    pub issued_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LicenseVerification {
    pub valid: bool,
    #[serde(default)]
    pub license: Option<License>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Plan {
    #[serde(alias = "_id")]
    pub id: String,
    pub name: String,
    /// Smallest currency unit.
    pub amount: u64,
    #[serde(default = "default_currency")]
    pub currency: String,
    #[serde(default, alias = "duration_days")]
    pub duration_days: Option<u32>,
}

fn default_currency() -> String {
    "INR".to_string()
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Order {
    #[serde(alias = "order_id")]
    pub order_id: String,
    pub amount: u64,
    #[serde(default = "default_currency")]
    pub currency: String,
    #[serde(default, alias = "key_id")]
    pub key_id: Option<String>,
    /// Dev-mode order that needs no gateway round trip.
    #[serde(default)]
    pub simulated: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PaymentConfirmation {
    pub order_id: String,
    pub payment_id: String,
    pub signature: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct Recommendation {
    #[serde(default)]
    pub message: String,
    #[serde(default, alias = "song_ids", alias = "songs")]
    pub song_ids: Vec<Tag>,
}
