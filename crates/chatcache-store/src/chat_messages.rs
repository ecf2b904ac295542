//! Chat-Messages store: one cached [`ConversationRecord`] per conversation.
//!
//! Writes merge rather than replace: a field the caller omits keeps its
//! previously stored value.  Records are never expired on read; a sweep
//! drops the ones not written within the retention window.

use std::sync::Arc;
use std::time::Duration;

use rusqlite::{params, OptionalExtension};
use serde_json::Value;

use crate::clock::{duration_millis, Clock};
use crate::config::CacheConfig;
use crate::database::StoreHandle;
use crate::error::{best_effort, Result};
use crate::migrations::CHAT_MESSAGES;
use crate::models::{ConversationKey, ConversationRecord};

const STORE: &str = "chat_messages";

pub struct ChatMessagesStore {
    handle: StoreHandle,
    clock: Arc<dyn Clock>,
    retention: Duration,
}

impl ChatMessagesStore {
    pub fn new(config: &CacheConfig, clock: Arc<dyn Clock>) -> Self {
        Self {
            handle: StoreHandle::new(&CHAT_MESSAGES, &config.data_dir, config.busy_timeout),
            clock,
            retention: config.messages_retention,
        }
    }

    pub fn handle(&self) -> &StoreHandle {
        &self.handle
    }

    // ------------------------------------------------------------------
    // Best-effort API
    // ------------------------------------------------------------------

    /// Ensure the backing table and its timestamp index exist.
    pub async fn open(&self) {
        best_effort(STORE, "open", self.handle.open().await, ())
    }

    /// Upsert the record for `key`.  `None` fields keep their stored value.
    pub async fn write(
        &self,
        key: &ConversationKey,
        messages: Option<Vec<Value>>,
        conversation_info: Option<Value>,
    ) {
        let result = self.try_write(key, messages, conversation_info).await;
        best_effort(STORE, "write", result, ())
    }

    pub async fn read(&self, key: &ConversationKey) -> Option<ConversationRecord> {
        best_effort(STORE, "read", self.try_read(key).await, None)
    }

    pub async fn delete(&self, key: &ConversationKey) {
        best_effort(STORE, "delete", self.try_delete(key).await.map(|_| ()), ())
    }

    /// Id of the newest cached message for `key`, `0` if none is cached.
    pub async fn get_last_message_id(&self, key: &ConversationKey) -> i64 {
        let result = self
            .try_read(key)
            .await
            .map(|record| record.map(|r| r.last_message_id()).unwrap_or(0));
        best_effort(STORE, "get_last_message_id", result, 0)
    }

    /// Delete every record older than the retention window.
    pub async fn sweep_expired(&self) -> usize {
        best_effort(STORE, "sweep_expired", self.try_sweep_expired().await, 0)
    }

    /// Cached conversation keys, most recently written first.
    pub async fn list_keys(&self) -> Vec<ConversationKey> {
        best_effort(STORE, "list_keys", self.try_list_keys().await, Vec::new())
    }

    pub async fn len(&self) -> usize {
        best_effort(STORE, "len", self.try_len().await, 0)
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    // ------------------------------------------------------------------
    // Fallible API
    // ------------------------------------------------------------------

    pub async fn try_write(
        &self,
        key: &ConversationKey,
        messages: Option<Vec<Value>>,
        conversation_info: Option<Value>,
    ) -> Result<()> {
        let messages_json = messages.as_ref().map(serde_json::to_string).transpose()?;
        let info_json = conversation_info
            .as_ref()
            .map(serde_json::to_string)
            .transpose()?;
        let now = self.clock.now_millis();
        let key_str = key.as_str().to_owned();

        self.handle
            .with_db(move |db| {
                db.conn().execute(
                    "INSERT INTO chat_messages (conversation_key, messages, conversation_info, last_write_ts)
                     VALUES (?1, COALESCE(?2, '[]'), ?3, ?4)
                     ON CONFLICT(conversation_key) DO UPDATE SET
                         messages          = COALESCE(?2, messages),
                         conversation_info = COALESCE(?3, conversation_info),
                         last_write_ts     = ?4",
                    params![key_str, messages_json, info_json, now],
                )?;
                Ok(())
            })
            .await?;

        tracing::debug!(
            key = %key,
            messages = messages.as_ref().map(Vec::len),
            info = conversation_info.is_some(),
            "cached conversation"
        );
        Ok(())
    }

    pub async fn try_read(&self, key: &ConversationKey) -> Result<Option<ConversationRecord>> {
        let key = key.clone();
        self.handle
            .with_db(move |db| {
                let row = db
                    .conn()
                    .query_row(
                        "SELECT messages, conversation_info, last_write_ts
                         FROM chat_messages WHERE conversation_key = ?1",
                        params![key.as_str()],
                        |row| {
                            Ok((
                                row.get::<_, String>(0)?,
                                row.get::<_, Option<String>>(1)?,
                                row.get::<_, i64>(2)?,
                            ))
                        },
                    )
                    .optional()?;

                let Some((messages, info, last_write_timestamp)) = row else {
                    return Ok(None);
                };

                let conversation_info = info
                    .map(|s| serde_json::from_str::<Value>(&s))
                    .transpose()?
                    .filter(|v| !v.is_null());

                Ok(Some(ConversationRecord {
                    conversation_key: key,
                    messages: serde_json::from_str(&messages)?,
                    conversation_info,
                    last_write_timestamp,
                }))
            })
            .await
    }

    /// Remove the record for `key`.  Returns `true` if a row was deleted.
    pub async fn try_delete(&self, key: &ConversationKey) -> Result<bool> {
        let key_str = key.as_str().to_owned();
        let affected = self
            .handle
            .with_db(move |db| {
                Ok(db.conn().execute(
                    "DELETE FROM chat_messages WHERE conversation_key = ?1",
                    params![key_str],
                )?)
            })
            .await?;
        Ok(affected > 0)
    }

    /// Returns the number of deleted records.
    pub async fn try_sweep_expired(&self) -> Result<usize> {
        // Strictly older than the window: now - ts > retention.
        let cutoff = self
            .clock
            .now_millis()
            .saturating_sub(duration_millis(self.retention));
        let deleted = self
            .handle
            .with_db(move |db| {
                Ok(db.conn().execute(
                    "DELETE FROM chat_messages WHERE last_write_ts < ?1",
                    params![cutoff],
                )?)
            })
            .await?;

        tracing::debug!(store = STORE, deleted, "swept expired conversations");
        Ok(deleted)
    }

    pub async fn try_list_keys(&self) -> Result<Vec<ConversationKey>> {
        self.handle
            .with_db(|db| {
                let mut stmt = db.conn().prepare(
                    "SELECT conversation_key FROM chat_messages
                     ORDER BY last_write_ts DESC, conversation_key ASC",
                )?;
                let rows = stmt.query_map([], |row| row.get::<_, String>(0))?;

                let mut keys = Vec::new();
                for row in rows {
                    keys.push(ConversationKey::new(row?)?);
                }
                Ok(keys)
            })
            .await
    }

    pub async fn try_len(&self) -> Result<usize> {
        self.handle
            .with_db(|db| {
                let n: i64 = db
                    .conn()
                    .query_row("SELECT COUNT(*) FROM chat_messages", [], |row| row.get(0))?;
                Ok(n.max(0) as usize)
            })
            .await
    }
}
