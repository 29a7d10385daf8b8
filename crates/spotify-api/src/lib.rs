//! Typed client for the Spotify Web API
//!
//! Authenticated GETs with a bearer token and a bounded retry: on a 401
//! the client refreshes through the token manager exactly once and retries;
//! a second 401 (or a refresh failure) surfaces as `SessionExpired`. This
//! is the only layer that surfaces errors to callers — the auth primitives
//! below it degrade to `None`.

pub mod client;
pub mod error;
pub mod models;

pub use client::SpotifyClient;
pub use error::{ApiError, Result};
pub use models::{Artist, AudioFeatures, Image, TimeRange, Track, User};
