//! Chat-List store: the cached set of [`ConversationSummary`] entries.
//!
//! The whole list is replaced when the UI refreshes it from the network;
//! single entries may be upserted or removed in between.  Every operation is
//! best-effort: failures are logged and turned into an empty result or a
//! silent no-op.

use std::sync::Arc;
use std::time::Duration;

use rusqlite::{params, OptionalExtension};
use serde_json::{Map, Value};

use crate::clock::{duration_millis, Clock};
use crate::config::CacheConfig;
use crate::database::StoreHandle;
use crate::error::{best_effort, Result};
use crate::migrations::CHAT_LIST;
use crate::models::ConversationSummary;

const STORE: &str = "chat_list";

pub struct ChatListStore {
    handle: StoreHandle,
    clock: Arc<dyn Clock>,
    retention: Duration,
}

impl ChatListStore {
    pub fn new(config: &CacheConfig, clock: Arc<dyn Clock>) -> Self {
        Self {
            handle: StoreHandle::new(&CHAT_LIST, &config.data_dir, config.busy_timeout),
            clock,
            retention: config.chat_list_retention,
        }
    }

    pub fn handle(&self) -> &StoreHandle {
        &self.handle
    }

    pub async fn open(&self) {
        best_effort(STORE, "open", self.handle.open().await, ())
    }

    /// Atomically swap the cached list for `summaries`.
    ///
    /// A failure leaves the previous list in place.  Callers that need to
    /// know whether the swap happened should use [`Self::try_replace_all`].
    pub async fn replace_all(&self, summaries: Vec<ConversationSummary>) {
        best_effort(STORE, "replace_all", self.try_replace_all(summaries).await, ())
    }

    /// Every cached summary, most recently written first.
    pub async fn read_all(&self) -> Vec<ConversationSummary> {
        best_effort(STORE, "read_all", self.try_read_all().await, Vec::new())
    }

    pub async fn read(&self, id: &str) -> Option<ConversationSummary> {
        best_effort(STORE, "read", self.try_read(id).await, None)
    }

    pub async fn upsert(&self, summary: ConversationSummary) {
        best_effort(STORE, "upsert", self.try_upsert(summary).await, ())
    }

    pub async fn delete(&self, id: &str) {
        best_effort(STORE, "delete", self.try_delete(id).await.map(|_| ()), ())
    }

    pub async fn sweep_expired(&self) -> usize {
        best_effort(STORE, "sweep_expired", self.try_sweep_expired().await, 0)
    }

    pub async fn try_replace_all(&self, summaries: Vec<ConversationSummary>) -> Result<()> {
        let rows = summaries
            .iter()
            .map(|s| Ok((s.id.clone(), serde_json::to_string(&s.fields)?)))
            .collect::<Result<Vec<_>>>()?;
        let now = self.clock.now_millis();
        let count = rows.len();

        self.handle
            .with_db(move |db| {
                let tx = db.conn_mut().transaction()?;
                tx.execute("DELETE FROM chat_list", [])?;
                {
                    let mut stmt = tx.prepare(
                        "INSERT INTO chat_list (id, fields, last_write_ts) VALUES (?1, ?2, ?3)
                         ON CONFLICT(id) DO UPDATE SET
                             fields = excluded.fields,
                             last_write_ts = excluded.last_write_ts",
                    )?;
                    for (id, fields) in &rows {
                        stmt.execute(params![id, fields, now])?;
                    }
                }
                tx.commit()?;
                Ok(())
            })
            .await?;

        tracing::debug!(store = STORE, count, "replaced chat list");
        Ok(())
    }

    pub async fn try_read_all(&self) -> Result<Vec<ConversationSummary>> {
        self.handle
            .with_db(|db| {
                // Ties (one replace_all batch) keep insertion order.
                let mut stmt = db.conn().prepare(
                    "SELECT id, fields, last_write_ts FROM chat_list
                     ORDER BY last_write_ts DESC, rowid ASC",
                )?;
                let rows = stmt.query_map([], raw_summary)?;

                let mut summaries = Vec::new();
                for row in rows {
                    summaries.push(decode_summary(row?)?);
                }
                Ok(summaries)
            })
            .await
    }

    pub async fn try_read(&self, id: &str) -> Result<Option<ConversationSummary>> {
        let id = id.to_owned();
        self.handle
            .with_db(move |db| {
                db.conn()
                    .query_row(
                        "SELECT id, fields, last_write_ts FROM chat_list WHERE id = ?1",
                        params![id],
                        raw_summary,
                    )
                    .optional()?
                    .map(decode_summary)
                    .transpose()
            })
            .await
    }

    pub async fn try_upsert(&self, summary: ConversationSummary) -> Result<()> {
        let fields = serde_json::to_string(&summary.fields)?;
        let now = self.clock.now_millis();
        let id = summary.id;

        self.handle
            .with_db(move |db| {
                db.conn().execute(
                    "INSERT INTO chat_list (id, fields, last_write_ts) VALUES (?1, ?2, ?3)
                     ON CONFLICT(id) DO UPDATE SET
                         fields = excluded.fields,
                         last_write_ts = excluded.last_write_ts",
                    params![id, fields, now],
                )?;
                Ok(())
            })
            .await
    }

    /// Returns `true` if a row was deleted.
    pub async fn try_delete(&self, id: &str) -> Result<bool> {
        let id = id.to_owned();
        let affected = self
            .handle
            .with_db(move |db| {
                Ok(db
                    .conn()
                    .execute("DELETE FROM chat_list WHERE id = ?1", params![id])?)
            })
            .await?;
        Ok(affected > 0)
    }

    pub async fn try_sweep_expired(&self) -> Result<usize> {
        let cutoff = self
            .clock
            .now_millis()
            .saturating_sub(duration_millis(self.retention));
        let deleted = self
            .handle
            .with_db(move |db| {
                Ok(db.conn().execute(
                    "DELETE FROM chat_list WHERE last_write_ts < ?1",
                    params![cutoff],
                )?)
            })
            .await?;

        tracing::debug!(store = STORE, deleted, "swept expired summaries");
        Ok(deleted)
    }
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn raw_summary(row: &rusqlite::Row<'_>) -> rusqlite::Result<(String, String, i64)> {
    Ok((row.get(0)?, row.get(1)?, row.get(2)?))
}

fn decode_summary((id, fields, ts): (String, String, i64)) -> Result<ConversationSummary> {
    let fields: Map<String, Value> = serde_json::from_str(&fields)?;
    Ok(ConversationSummary {
        id,
        fields,
        last_write_timestamp: ts,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use serde_json::json;
    use std::sync::atomic::{AtomicBool, Ordering};
    use tempfile::TempDir;

    const DAY_MS: i64 = 24 * 60 * 60 * 1000;

    fn test_store() -> (Arc<ChatListStore>, ManualClock, TempDir) {
        let dir = TempDir::new().unwrap();
        let clock = ManualClock::new(1_700_000_000_000);
        let config = CacheConfig::in_dir(dir.path());
        let store = Arc::new(ChatListStore::new(&config, Arc::new(clock.clone())));
        (store, clock, dir)
    }

    fn summary(id: &str, unread: u32) -> ConversationSummary {
        let fields = json!({"unread": unread, "preview": format!("last from {id}")});
        let Value::Object(fields) = fields else {
            unreachable!()
        };
        ConversationSummary::new(id, fields)
    }

    fn ids(summaries: &[ConversationSummary]) -> Vec<&str> {
        summaries.iter().map(|s| s.id.as_str()).collect()
    }

    #[tokio::test]
    async fn test_replace_all_swaps_contents() {
        let (store, clock, _dir) = test_store();
        store.replace_all(vec![summary("a", 1), summary("b", 0)]).await;
        store.replace_all(vec![summary("c", 5), summary("d", 2)]).await;

        let all = store.read_all().await;
        assert_eq!(ids(&all), vec!["c", "d"]);
        assert!(all.iter().all(|s| s.last_write_timestamp == clock.now_millis()));
        assert_eq!(all[0].fields["unread"], json!(5));
    }

    #[tokio::test]
    async fn test_replace_all_with_empty_list_clears() {
        let (store, _clock, _dir) = test_store();
        store.replace_all(vec![summary("a", 1)]).await;
        store.replace_all(Vec::new()).await;
        assert!(store.read_all().await.is_empty());
    }

    #[tokio::test]
    async fn test_read_all_most_recent_first() {
        let (store, clock, _dir) = test_store();
        store
            .replace_all(vec![summary("a", 0), summary("b", 0), summary("c", 0)])
            .await;

        clock.advance(Duration::from_secs(1));
        store.upsert(summary("b", 9)).await;

        let all = store.read_all().await;
        assert_eq!(ids(&all), vec!["b", "a", "c"]);
        assert_eq!(all[0].fields["unread"], json!(9));
    }

    #[tokio::test]
    async fn test_upsert_read_and_delete() {
        let (store, _clock, _dir) = test_store();
        store.upsert(summary("x", 3)).await;
        assert_eq!(store.read("x").await.unwrap().fields["unread"], json!(3));

        store.delete("x").await;
        assert!(store.read("x").await.is_none());

        // Absent ids are a no-op.
        store.delete("x").await;
        assert!(!store.try_delete("x").await.unwrap());
    }

    #[tokio::test]
    async fn test_sweep_boundary() {
        let (store, clock, _dir) = test_store();
        let retention = 30 * DAY_MS;
        let now = clock.now_millis();

        for (id, age) in [("over", retention + 1), ("at", retention), ("under", 0)] {
            clock.set(now - age);
            store.upsert(summary(id, 0)).await;
        }
        clock.set(now);

        assert_eq!(store.sweep_expired().await, 1);
        let all = store.read_all().await;
        assert_eq!(ids(&all), vec!["under", "at"]);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_read_all_sees_whole_sets() {
        let (store, _clock, _dir) = test_store();
        let old: Vec<_> = (0..50).map(|i| summary(&format!("old-{i}"), i)).collect();
        let new: Vec<_> = (0..80).map(|i| summary(&format!("new-{i}"), i)).collect();
        store.replace_all(old.clone()).await;

        let old_ids: Vec<String> = old.iter().map(|s| s.id.clone()).collect();
        let new_ids: Vec<String> = new.iter().map(|s| s.id.clone()).collect();
        let writing = Arc::new(AtomicBool::new(true));

        // Readers keep polling until the writer is done flipping sets.
        let mut readers = tokio::task::JoinSet::new();
        for _ in 0..8 {
            let store = Arc::clone(&store);
            let writing = Arc::clone(&writing);
            let (old_ids, new_ids) = (old_ids.clone(), new_ids.clone());
            readers.spawn(async move {
                let mut reads = 0usize;
                loop {
                    let seen: Vec<String> =
                        store.read_all().await.into_iter().map(|s| s.id).collect();
                    assert!(
                        seen == old_ids || seen == new_ids,
                        "observed a partial list of {} entries",
                        seen.len()
                    );
                    reads += 1;
                    if !writing.load(Ordering::Acquire) {
                        break reads;
                    }
                }
            });
        }

        for round in 0..20 {
            let set = if round % 2 == 0 { new.clone() } else { old.clone() };
            store.try_replace_all(set).await.unwrap();
        }
        writing.store(false, Ordering::Release);

        let mut total_reads = 0;
        while let Some(reads) = readers.join_next().await {
            total_reads += reads.unwrap();
        }
        assert!(total_reads >= 8);
        // An even number of rounds ends on the old set.
        let last: Vec<String> = store.read_all().await.into_iter().map(|s| s.id).collect();
        assert_eq!(last, old_ids);
    }

    #[tokio::test]
    async fn test_broken_storage_reads_empty() {
        let dir = TempDir::new().unwrap();
        let blocker = dir.path().join("file");
        std::fs::write(&blocker, b"x").unwrap();
        let config = CacheConfig::in_dir(&blocker);
        let store = ChatListStore::new(&config, Arc::new(ManualClock::new(0)));

        store.replace_all(vec![summary("a", 1)]).await;
        assert!(store.try_replace_all(vec![summary("a", 1)]).await.is_err());
        assert!(store.read_all().await.is_empty());
        assert_eq!(store.sweep_expired().await, 0);
    }
}
