//! # Roost
//!
//! Multi-account timeline sync engine for Mastodon-compatible social clients.
//!
//! ## Overview
//!
//! Roost keeps a local `SQLite` mirror of the home timeline, mentions, direct
//! messages and trends of several signed-in accounts. Refreshes fan out over
//! the accounts concurrently, merge the pages into the local store and mark
//! gaps where contiguity with older rows is unknown. Mutations (favorites,
//! retweets, follows, blocks, ...) run one remote call each and update the
//! mirrored rows, reporting their outcome as typed events.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                      SyncCoordinator                        │
//! │   Single-flight fetches, merges, mutations, task pool       │
//! └─────────────────────────────────────────────────────────────┘
//!                              │
//!          ┌───────────────────┼───────────────────┐
//!          ▼                   ▼                   ▼
//! ┌─────────────────┐ ┌─────────────────┐ ┌─────────────────┐
//! │     Config      │ │       API       │ │     Events      │
//! │                 │ │                 │ │                 │
//! │ • Page size     │ │ • RemoteClient  │ │ • One channel   │
//! │ • Refresh flags │ │ • Mastodon      │ │   per kind      │
//! │ • Pool size     │ │ • OAuth flow    │ │ • Notices       │
//! └─────────────────┘ └─────────────────┘ └─────────────────┘
//!          │                   │                   │
//!          └───────────────────┴───────────────────┘
//!                              │
//!          ┌───────────────────┼───────────────────┐
//!          ▼                   ▼                   ▼
//! ┌─────────────────┐ ┌─────────────────┐ ┌─────────────────┐
//! │    Database     │ │      Auth       │ │     Models      │
//! │                 │ │                 │ │                 │
//! │ • Accounts      │ │ • Encrypted     │ │ • Status        │
//! │ • Timelines     │ │   tokens        │ │ • Message       │
//! │ • Predicates    │ │ • Resolver      │ │ • Trends        │
//! └─────────────────┘ └─────────────────┘ └─────────────────┘
//! ```
//!
//! ## Modules
//!
//! - [`api`] — Remote client boundary and the Mastodon client
//! - [`auth`] — Encrypted credential storage and client resolution
//! - [`config`] — Configuration management
//! - [`db`] — `SQLite` store addressed by collection and predicate
//! - [`events`] — Typed event channels
//! - [`models`] — Data models (Status, `DirectMessage`, Account, ...)
//! - [`sync`] — Fan-out fetches, merges, mutations and the task pool
//!
//! ## Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use roost::{Config, Database, SyncCoordinator, auth, events::EventBus};
//! use tokio::sync::Mutex;
//!
//! # async fn run() -> anyhow::Result<()> {
//! let bus = EventBus::new();
//! let db = Arc::new(Mutex::new(Database::open()?.with_notifier(bus.clone())));
//! let resolver = auth::CredentialResolver::new(Arc::clone(&db), auth::CredentialStore::open()?);
//! let sync = SyncCoordinator::new(Arc::new(resolver), db, bus, Config::load()?);
//!
//! sync.refresh_all().await?;
//! sync.wait_idle().await;
//! # Ok(())
//! # }
//! ```

#![doc(html_root_url = "https://docs.rs/roost/0.1.0")]
#![warn(missing_docs)]
#![warn(rustdoc::missing_crate_level_docs)]
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::missing_panics_doc)]
#![allow(clippy::must_use_candidate)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::items_after_statements)]
#![allow(clippy::option_if_let_else)]
#![allow(clippy::single_match_else)]
#![allow(clippy::too_many_lines)]
#![allow(clippy::match_same_arms)]
#![allow(clippy::cast_possible_truncation)]
#![allow(clippy::cast_sign_loss)]
#![allow(clippy::cast_possible_wrap)]
#![allow(clippy::needless_pass_by_value)]
#![allow(clippy::struct_excessive_bools)]
#![allow(clippy::similar_names)]
#![allow(clippy::return_self_not_must_use)]
#![allow(clippy::future_not_send)]

pub mod api;
pub mod auth;
pub mod config;
pub mod db;
pub mod events;
pub mod models;
pub mod paths;
pub mod sync;

#[cfg(test)]
mod testing;

// Re-export main types for convenience
pub use config::Config;
pub use db::{Collection, Database, Predicate};
pub use events::{DomainEvent, EventBus, EventKind, Notice};
pub use models::{Account, DirectMessage, Relationship, Status, Trend, Trends, User, UserList};
pub use sync::{FetchBoundaries, MutationError, MutationRequest, ResourceClass, SyncCoordinator};

/// ASCII logo for the application
pub const LOGO: &str = r"
    ____                   __
   / __ \____  ____  _____/ /_
  / /_/ / __ \/ __ \/ ___/ __/
 / _, _/ /_/ / /_/ (__  ) /_
/_/ |_|\____/\____/____/\__/
";

/// Application version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Repository URL
pub const REPO_URL: &str = "https://github.com/ricardodantas/roost";
