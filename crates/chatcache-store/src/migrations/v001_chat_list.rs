use rusqlite::Connection;

const UP_SQL: &str = r#"
CREATE TABLE IF NOT EXISTS chat_list (
    id            TEXT PRIMARY KEY NOT NULL,
    fields        TEXT NOT NULL,              -- JSON object, opaque
    last_write_ts INTEGER NOT NULL            -- epoch millis
);

CREATE INDEX IF NOT EXISTS idx_chat_list_last_write
    ON chat_list(last_write_ts ASC);
"#;

pub fn up(conn: &Connection) -> Result<(), rusqlite::Error> {
    conn.execute_batch(UP_SQL)
}
