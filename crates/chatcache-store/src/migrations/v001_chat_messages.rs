//! v001 -- Conversation records keyed by conversation key.

use rusqlite::Connection;

const UP_SQL: &str = r#"
CREATE TABLE IF NOT EXISTS chat_messages (
    conversation_key  TEXT PRIMARY KEY NOT NULL,
    messages          TEXT NOT NULL DEFAULT '[]',   -- JSON array, opaque
    conversation_info TEXT,                         -- JSON, opaque, nullable
    last_write_ts     INTEGER NOT NULL              -- epoch millis
);

CREATE INDEX IF NOT EXISTS idx_chat_messages_last_write
    ON chat_messages(last_write_ts ASC);
"#;

pub fn up(conn: &Connection) -> Result<(), rusqlite::Error> {
    conn.execute_batch(UP_SQL)
}
