//! Current-User store: a single cached snapshot of the signed-in user.
//!
//! Unlike the other stores the snapshot has a freshness window that is
//! checked on every read.  An expired snapshot is deleted the first time it
//! is seen and reported as absent.

use std::sync::Arc;
use std::time::Duration;

use rusqlite::{params, Connection, OptionalExtension};

use crate::clock::{duration_millis, Clock};
use crate::config::CacheConfig;
use crate::database::StoreHandle;
use crate::error::{best_effort, Result};
use crate::migrations::CURRENT_USER;
use crate::models::CurrentUserSnapshot;

const STORE: &str = "current_user";

/// The only row id ever written.
const SNAPSHOT_ID: &str = "current";

pub struct CurrentUserStore {
    handle: StoreHandle,
    clock: Arc<dyn Clock>,
    freshness: Duration,
}

impl CurrentUserStore {
    pub fn new(config: &CacheConfig, clock: Arc<dyn Clock>) -> Self {
        Self {
            handle: StoreHandle::new(&CURRENT_USER, &config.data_dir, config.busy_timeout),
            clock,
            freshness: config.user_freshness,
        }
    }

    pub fn handle(&self) -> &StoreHandle {
        &self.handle
    }

    pub async fn open(&self) {
        best_effort(STORE, "open", self.handle.open().await, ())
    }

    pub async fn write(&self, snapshot: CurrentUserSnapshot) {
        best_effort(STORE, "write", self.try_write(snapshot).await, ())
    }

    /// The cached snapshot, or `None` if absent or no longer fresh.
    ///
    /// The row id and write timestamp live in their own columns and are
    /// never part of the returned payload.
    pub async fn read(&self) -> Option<CurrentUserSnapshot> {
        best_effort(STORE, "read", self.try_read().await, None)
    }

    /// Shallow-merge `partial` over the cached snapshot.
    ///
    /// Does nothing when no fresh snapshot exists: a partial update never
    /// creates one.
    pub async fn update(&self, partial: CurrentUserSnapshot) {
        best_effort(STORE, "update", self.try_update(partial).await.map(|_| ()), ())
    }

    /// Drop the snapshot (logout).
    pub async fn clear(&self) {
        best_effort(STORE, "clear", self.try_clear().await, ())
    }

    pub async fn try_write(&self, snapshot: CurrentUserSnapshot) -> Result<()> {
        let payload = serde_json::to_string(&snapshot)?;
        let now = self.clock.now_millis();

        self.handle
            .with_db(move |db| store_snapshot(db.conn(), &payload, now))
            .await?;

        tracing::debug!(store = STORE, fields = snapshot.len(), "cached current user");
        Ok(())
    }

    pub async fn try_read(&self) -> Result<Option<CurrentUserSnapshot>> {
        let now = self.clock.now_millis();
        let freshness = duration_millis(self.freshness);
        self.handle
            .with_db(move |db| load_fresh(db.conn(), now, freshness))
            .await
    }

    /// Returns `true` if a snapshot was updated.
    pub async fn try_update(&self, partial: CurrentUserSnapshot) -> Result<bool> {
        let now = self.clock.now_millis();
        let freshness = duration_millis(self.freshness);

        let updated = self
            .handle
            .with_db(move |db| {
                let tx = db.conn_mut().transaction()?;
                let Some(mut snapshot) = load_fresh(&tx, now, freshness)? else {
                    // Keep the delete of an expired row.
                    tx.commit()?;
                    return Ok(false);
                };
                snapshot.extend(partial);
                store_snapshot(&tx, &serde_json::to_string(&snapshot)?, now)?;
                tx.commit()?;
                Ok(true)
            })
            .await?;

        if !updated {
            // Product behavior is undecided; make dropped updates visible.
            tracing::debug!(store = STORE, "no cached user, partial update dropped");
        }
        Ok(updated)
    }

    pub async fn try_clear(&self) -> Result<()> {
        self.handle
            .with_db(|db| {
                db.conn().execute(
                    "DELETE FROM current_user WHERE id = ?1",
                    params![SNAPSHOT_ID],
                )?;
                Ok(())
            })
            .await?;

        tracing::debug!(store = STORE, "cleared current user");
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn store_snapshot(conn: &Connection, payload: &str, now: i64) -> Result<()> {
    conn.execute(
        "INSERT INTO current_user (id, payload, last_write_ts) VALUES (?1, ?2, ?3)
         ON CONFLICT(id) DO UPDATE SET
             payload = excluded.payload,
             last_write_ts = excluded.last_write_ts",
        params![SNAPSHOT_ID, payload, now],
    )?;
    Ok(())
}

/// Load the snapshot, deleting it instead if `now - ts >= freshness`.
fn load_fresh(
    conn: &Connection,
    now: i64,
    freshness: i64,
) -> Result<Option<CurrentUserSnapshot>> {
    let row = conn
        .query_row(
            "SELECT payload, last_write_ts FROM current_user WHERE id = ?1",
            params![SNAPSHOT_ID],
            |row| Ok((row.get::<_, String>(0)?, row.get::<_, i64>(1)?)),
        )
        .optional()?;

    let Some((payload, ts)) = row else {
        return Ok(None);
    };

    if now.saturating_sub(ts) >= freshness {
        conn.execute("DELETE FROM current_user WHERE id = ?1", params![SNAPSHOT_ID])?;
        tracing::debug!(store = STORE, age_ms = now - ts, "expired current user snapshot");
        return Ok(None);
    }

    Ok(Some(serde_json::from_str(&payload)?))
}
