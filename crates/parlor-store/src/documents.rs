//! Row-level helpers for the `documents` table.

use rusqlite::{params, Connection, OptionalExtension};
use serde_json::Value;

use crate::document::Document;
use crate::error::Result;

pub(crate) fn select_document(
    conn: &Connection,
    collection: &str,
    id: &str,
) -> Result<Option<Document>> {
    let row = conn
        .query_row(
            "SELECT id, seq, fields FROM documents WHERE collection = ?1 AND id = ?2",
            params![collection, id],
            row_to_raw,
        )
        .optional()?;

    row.map(raw_to_document).transpose()
}

/// Every document in `collection`, in creation order.
pub(crate) fn select_collection(conn: &Connection, collection: &str) -> Result<Vec<Document>> {
    let mut stmt = conn.prepare(
        "SELECT id, seq, fields FROM documents
         WHERE collection = ?1
         ORDER BY seq ASC",
    )?;

    let rows = stmt.query_map(params![collection], row_to_raw)?;

    let mut docs = Vec::new();
    for row in rows {
        docs.push(raw_to_document(row?)?);
    }
    Ok(docs)
}

/// Insert a new row, or replace the fields of an existing one while keeping
/// its creation order.
pub(crate) fn upsert_document(
    conn: &Connection,
    collection: &str,
    id: &str,
    fields: &Value,
    now: &str,
) -> Result<()> {
    conn.execute(
        "INSERT INTO documents (collection, id, fields, updated_at)
         VALUES (?1, ?2, ?3, ?4)
         ON CONFLICT (collection, id)
         DO UPDATE SET fields = excluded.fields, updated_at = excluded.updated_at",
        params![collection, id, serde_json::to_string(fields)?, now],
    )?;
    Ok(())
}

pub(crate) fn update_document_fields(
    conn: &Connection,
    collection: &str,
    id: &str,
    fields: &Value,
    now: &str,
) -> Result<bool> {
    let affected = conn.execute(
        "UPDATE documents SET fields = ?1, updated_at = ?2
         WHERE collection = ?3 AND id = ?4",
        params![serde_json::to_string(fields)?, now, collection, id],
    )?;
    Ok(affected > 0)
}

type RawRow = (String, i64, String);

fn row_to_raw(row: &rusqlite::Row<'_>) -> rusqlite::Result<RawRow> {
    Ok((row.get(0)?, row.get(1)?, row.get(2)?))
}

fn raw_to_document((id, seq, json): RawRow) -> Result<Document> {
    let fields: Value = serde_json::from_str(&json)?;
    Ok(Document {
        id,
        seq: u64::try_from(seq).unwrap_or_default(),
        fields,
    })
}
