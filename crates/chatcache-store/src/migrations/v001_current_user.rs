use rusqlite::Connection;

// Single live row under a fixed id; no timestamp index needed.
const UP_SQL: &str = r#"
CREATE TABLE IF NOT EXISTS current_user (
    id            TEXT PRIMARY KEY NOT NULL,
    payload       TEXT NOT NULL,              -- JSON object, opaque
    last_write_ts INTEGER NOT NULL            -- epoch millis
);
"#;

pub fn up(conn: &Connection) -> Result<(), rusqlite::Error> {
    conn.execute_batch(UP_SQL)
}
