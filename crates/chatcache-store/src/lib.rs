//! # chatcache-store
//!
//! Best-effort local cache for the chat client, backed by SQLite.
//!
//! Three independent stores share one pattern: a lazily opened file per
//! store, a timestamp on every record, and operations that never fail
//! towards the UI.
//!
//! - [`ChatMessagesStore`]: message history per conversation, swept after
//!   360 days without a write.
//! - [`ChatListStore`]: conversation summaries, replaced wholesale on
//!   refresh and swept after 30 days.
//! - [`CurrentUserStore`]: the signed-in user's profile, treated as absent
//!   24 hours after it was written.
//!
//! Every best-effort operation has a `try_*` twin returning [`Result`] for
//! callers that need to know whether the cache actually took the write.

pub mod cache;
pub mod chat_list;
pub mod chat_messages;
pub mod clock;
pub mod config;
pub mod current_user;
pub mod database;
pub mod migrations;
pub mod models;

mod error;

pub use cache::{global, LocalCache, SweepReport};
pub use chat_list::ChatListStore;
pub use chat_messages::ChatMessagesStore;
pub use clock::{Clock, ManualClock, SystemClock};
pub use config::CacheConfig;
pub use current_user::CurrentUserStore;
pub use database::{Database, StoreHandle};
pub use error::{Result, StoreError};
pub use models::*;
