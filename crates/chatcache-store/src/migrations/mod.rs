//! Per-store schema migrations.
//!
//! Each store lives in its own SQLite file and carries its own ordered
//! migration list.  Every step is guarded by the file's `user_version`
//! pragma so it runs exactly once, no matter how many times the store is
//! opened.

pub mod v001_chat_list;
pub mod v001_chat_messages;
pub mod v001_current_user;

use rusqlite::Connection;

use crate::error::{Result, StoreError};

/// One versioned schema step.
pub struct Migration {
    pub version: u32,
    pub name: &'static str,
    pub up: fn(&Connection) -> std::result::Result<(), rusqlite::Error>,
}

/// A logical store: its file name and the migrations that build its schema.
pub struct Schema {
    pub name: &'static str,
    pub migrations: &'static [Migration],
}

impl Schema {
    /// Target `user_version` once every migration has run.
    pub fn current_version(&self) -> u32 {
        self.migrations.last().map(|m| m.version).unwrap_or(0)
    }

    /// Database file name for this store.
    pub fn file_name(&self) -> String {
        format!("{}.db", self.name)
    }
}

pub static CHAT_MESSAGES: Schema = Schema {
    name: "chat_messages",
    migrations: &[Migration {
        version: 1,
        name: "v001_chat_messages",
        up: v001_chat_messages::up,
    }],
};

pub static CHAT_LIST: Schema = Schema {
    name: "chat_list",
    migrations: &[Migration {
        version: 1,
        name: "v001_chat_list",
        up: v001_chat_list::up,
    }],
};

pub static CURRENT_USER: Schema = Schema {
    name: "current_user",
    migrations: &[Migration {
        version: 1,
        name: "v001_current_user",
        up: v001_current_user::up,
    }],
};

/// Run all pending migrations of `schema` against the open connection.
///
/// The function reads `PRAGMA user_version` to determine which migrations have
/// already been applied, then executes any outstanding ones in order.
pub fn run_migrations(conn: &Connection, schema: &Schema) -> Result<()> {
    let current: u32 = conn.pragma_query_value(None, "user_version", |row| row.get(0))?;

    tracing::info!(
        store = schema.name,
        current_version = current,
        target_version = schema.current_version(),
        "checking cache migrations"
    );

    for migration in schema.migrations.iter().filter(|m| m.version > current) {
        tracing::info!(store = schema.name, "applying migration {}", migration.name);
        (migration.up)(conn).map_err(|e| StoreError::Migration(e.to_string()))?;
        conn.pragma_update(None, "user_version", migration.version)?;
    }

    Ok(())
}
