//! v001 -- Document table.
//!
//! One row per document; `fields` holds the JSON object. `seq` doubles as the
//! creation order used to break ties between equal sort keys.

use rusqlite::Connection;

const UP_SQL: &str = r#"
CREATE TABLE IF NOT EXISTS documents (
    seq         INTEGER PRIMARY KEY AUTOINCREMENT,
    collection  TEXT NOT NULL,
    id          TEXT NOT NULL,
    fields      TEXT NOT NULL,                -- JSON object
    updated_at  TEXT NOT NULL,                -- RFC-3339

    UNIQUE (collection, id)
);

CREATE INDEX IF NOT EXISTS idx_documents_collection ON documents(collection, seq);
"#;

/// Apply the initial migration.
pub fn up(conn: &Connection) -> Result<(), rusqlite::Error> {
    conn.execute_batch(UP_SQL)
}
