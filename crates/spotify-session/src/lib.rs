//! Session orchestration for the Spotify OAuth PKCE flow
//!
//! The [`Orchestrator`] is the surface the UI layer talks to: it owns the
//! `Initializing -> {Authenticated, Unauthenticated}` state machine, races
//! the silent token check against a wall-clock timeout, schedules the
//! user-profile fetch with its own shorter timeout, and suppresses stale
//! asynchronous completions after logout or teardown.

pub mod config;
pub mod orchestrator;

pub use config::{ConfigError, SessionConfig};
pub use orchestrator::{AuthState, ListeningData, Orchestrator};
