//! Records persisted by the three cache stores.
//!
//! Message bodies, conversation metadata, summary fields and profile fields
//! are owned by the UI layer.  The cache keeps them as opaque JSON and only
//! ever looks at the fields it owns: the key and `last_write_timestamp`.

use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::{Result, StoreError};

// ---------------------------------------------------------------------------
// ConversationKey
// ---------------------------------------------------------------------------

/// Identifier of a conversation (typically the counterpart's login).
///
/// Always non-blank; constructing one from a blank string is a programmer
/// error reported as [`StoreError::InvalidKey`].
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ConversationKey(String);

impl ConversationKey {
    pub fn new(key: impl Into<String>) -> Result<Self> {
        let key = key.into();
        if key.trim().is_empty() {
            return Err(StoreError::InvalidKey(
                "conversation key must not be empty".to_string(),
            ));
        }
        Ok(Self(key))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl TryFrom<String> for ConversationKey {
    type Error = StoreError;

    fn try_from(value: String) -> Result<Self> {
        Self::new(value)
    }
}

impl From<ConversationKey> for String {
    fn from(key: ConversationKey) -> Self {
        key.0
    }
}

impl fmt::Display for ConversationKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

// ---------------------------------------------------------------------------
// ConversationRecord
// ---------------------------------------------------------------------------

/// Cached history of one conversation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConversationRecord {
    pub conversation_key: ConversationKey,
    /// Messages in chronological (insertion) order.
    pub messages: Vec<Value>,
    pub conversation_info: Option<Value>,
    /// Epoch milliseconds of the last write.
    pub last_write_timestamp: i64,
}

impl ConversationRecord {
    /// Identifier of the newest cached message, or `0` when there is none.
    ///
    /// The id is read from the last message's `id` field and accepted either
    /// as a JSON integer or as a string holding one.
    pub fn last_message_id(&self) -> i64 {
        self.messages
            .last()
            .and_then(|m| m.get("id"))
            .and_then(|id| match id {
                Value::Number(n) => n.as_i64(),
                Value::String(s) => s.parse().ok(),
                _ => None,
            })
            .unwrap_or(0)
    }
}

// ---------------------------------------------------------------------------
// ConversationSummary
// ---------------------------------------------------------------------------

/// One entry of the chat list (unread count, preview, pin/mute flags...).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConversationSummary {
    pub id: String,
    /// Every field other than `id`, opaque to the cache.
    #[serde(flatten)]
    pub fields: Map<String, Value>,
    /// Epoch milliseconds of the last write.  Overwritten on every write.
    #[serde(default)]
    pub last_write_timestamp: i64,
}

impl ConversationSummary {
    pub fn new(id: impl Into<String>, fields: Map<String, Value>) -> Self {
        Self {
            id: id.into(),
            fields,
            last_write_timestamp: 0,
        }
    }
}

// ---------------------------------------------------------------------------
// CurrentUserSnapshot
// ---------------------------------------------------------------------------

/// Profile fields of the authenticated user, opaque to the cache.
pub type CurrentUserSnapshot = Map<String, Value>;

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn record(messages: Vec<Value>) -> ConversationRecord {
        ConversationRecord {
            conversation_key: ConversationKey::new("alice").unwrap(),
            messages,
            conversation_info: None,
            last_write_timestamp: 0,
        }
    }

    #[test]
    fn blank_keys_are_rejected() {
        assert!(matches!(
            ConversationKey::new(""),
            Err(StoreError::InvalidKey(_))
        ));
        assert!(ConversationKey::new("   ").is_err());
        assert_eq!(ConversationKey::new("bob").unwrap().as_str(), "bob");
    }

    #[test]
    fn key_deserialization_validates() {
        assert!(serde_json::from_value::<ConversationKey>(json!("")).is_err());
        let key: ConversationKey = serde_json::from_value(json!("carol")).unwrap();
        assert_eq!(key.to_string(), "carol");
    }

    #[test]
    fn last_message_id_reads_numbers_and_numeric_strings() {
        assert_eq!(record(vec![json!({"id": 3}), json!({"id": 9})]).last_message_id(), 9);
        assert_eq!(record(vec![json!({"id": "41"})]).last_message_id(), 41);
    }

    #[test]
    fn last_message_id_defaults_to_zero() {
        assert_eq!(record(vec![]).last_message_id(), 0);
        assert_eq!(record(vec![json!({"text": "hi"})]).last_message_id(), 0);
        assert_eq!(record(vec![json!({"id": "abc"})]).last_message_id(), 0);
    }

    #[test]
    fn summary_flattens_opaque_fields() {
        let summary: ConversationSummary = serde_json::from_value(json!({
            "id": "c1",
            "unread": 2,
            "pinned": true,
        }))
        .unwrap();
        assert_eq!(summary.id, "c1");
        assert_eq!(summary.fields["unread"], json!(2));
        assert_eq!(summary.last_write_timestamp, 0);
    }
}
