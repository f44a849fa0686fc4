//! Core library for gamerlink.
//!
//! Authenticates against the gamerlink backend, keeps the resulting session
//! token on disk, and exposes friends, games and profile collections that
//! the backend computes and caches.
//!
//! # Example
//!
//! ```no_run
//! use gamerlink_core::{EventKind, SessionClient, listener};
//!
//! # async fn example() -> gamerlink_core::Result<()> {
//! let client = SessionClient::builder()
//!     .api_root("https://gamerlink.example.com/api")
//!     .build()?;
//!
//! client.on(EventKind::Logout, listener(|_| eprintln!("signed out")));
//!
//! if !client.is_logged_in() {
//!     client.login("a@b.com", "pw").await?;
//! }
//!
//! if let Some(friends) = client.get_friends().await {
//!     for friend in &friends.items {
//!         println!("{}: {}", friend.gamertag, friend.presence_display());
//!     }
//! }
//!
//! client.start_auto_verify(None);
//! # client.stop_auto_verify();
//! # Ok(())
//! # }
//! ```

pub mod api;
pub mod auth;
pub mod client;
pub mod config;
pub mod error;
pub mod events;
pub mod models;
mod scheduler;

pub use auth::{Session, SessionStore, UserRef};
pub use client::{ClientBuilder, LoginOutcome, SessionClient};
pub use config::{ClientConfig, Settings};
pub use error::{Error, Result};
pub use events::{listener, Event, EventKind, Listener, Notification};
pub use models::{Collection, CollectionSnapshot, Friend, Game};
