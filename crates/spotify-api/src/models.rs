//! Wire models for the Spotify Web API
//!
//! Fields the provider marks nullable or omits are `Option`/defaulted so a
//! sparse profile never fails deserialization.

use serde::{Deserialize, Serialize};

/// Top-items aggregation window.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimeRange {
    ShortTerm,
    MediumTerm,
    LongTerm,
}

impl TimeRange {
    /// Wire value for the `time_range` query parameter.
    pub fn as_str(&self) -> &'static str {
        match self {
            TimeRange::ShortTerm => "short_term",
            TimeRange::MediumTerm => "medium_term",
            TimeRange::LongTerm => "long_term",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Image {
    pub url: String,
}

/// The authenticated user's profile (`/me`).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    pub id: String,
    #[serde(default)]
    pub display_name: Option<String>,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub images: Vec<Image>,
}

impl User {
    /// First profile image, if the account has one.
    pub fn avatar_url(&self) -> Option<&str> {
        self.images.first().map(|i| i.url.as_str())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Artist {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub genres: Vec<String>,
    #[serde(default)]
    pub images: Vec<Image>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrackArtist {
    pub id: String,
    pub name: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Album {
    #[serde(default)]
    pub images: Vec<Image>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Track {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub artists: Vec<TrackArtist>,
    #[serde(default)]
    pub album: Option<Album>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AudioFeatures {
    pub danceability: f32,
    pub energy: f32,
    pub valence: f32,
    pub acousticness: f32,
    pub instrumentalness: f32,
    pub speechiness: f32,
    pub tempo: f32,
}

/// Envelope for `/me/top/*` responses.
#[derive(Debug, Deserialize)]
pub(crate) struct Paging<T> {
    pub items: Vec<T>,
}

/// Envelope for `/audio-features`; entries are null for unknown ids.
#[derive(Debug, Deserialize)]
pub(crate) struct AudioFeaturesPage {
    #[serde(default)]
    pub audio_features: Vec<Option<AudioFeatures>>,
}
