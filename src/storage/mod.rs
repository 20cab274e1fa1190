//! SQLite persistence for classified uploads.
//!
//! One table, `classified_images`, holding the canonical PNG bytes, the
//! winning category and the original filename. Records are append-only:
//! nothing in this service updates or deletes a row once committed. The
//! schema is created idempotently whenever a connection is opened, so
//! startup and per-request opens are both safe against a fresh file.

use std::path::Path;

use rusqlite::{params, Connection, Transaction};

/// A persisted classification record.
#[derive(Debug, Clone, PartialEq)]
pub struct ClassifiedImage {
    pub id: i64,
    pub data: Vec<u8>,
    pub category: String,
    pub filename: String,
}

fn init_schema(conn: &Connection) -> rusqlite::Result<()> {
    conn.execute(
        "CREATE TABLE IF NOT EXISTS classified_images (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            data BLOB NOT NULL,
            category TEXT NOT NULL,
            filename TEXT NOT NULL
        )",
        [],
    )?;
    Ok(())
}

/// Database handle. Opened fresh per request and dropped (closed) on every
/// exit path; never shared across requests.
pub struct Store {
    conn: Connection,
}

impl Store {
    pub fn open(db_path: &Path) -> rusqlite::Result<Self> {
        let conn = Connection::open(db_path)?;
        init_schema(&conn)?;
        Ok(Store { conn })
    }

    /// Begin a transaction spanning one upload batch. Rows inserted through
    /// it become durable only on `commit`; dropping the transaction rolls
    /// everything back.
    pub fn transaction(&mut self) -> rusqlite::Result<Transaction<'_>> {
        self.conn.transaction()
    }

    pub fn count(&self) -> rusqlite::Result<i64> {
        self.conn
            .query_row("SELECT COUNT(*) FROM classified_images", [], |row| {
                row.get(0)
            })
    }

    /// All records in insertion order.
    pub fn list(&self) -> rusqlite::Result<Vec<ClassifiedImage>> {
        let mut stmt = self
            .conn
            .prepare("SELECT id, data, category, filename FROM classified_images ORDER BY id")?;
        let rows = stmt.query_map([], |row| {
            Ok(ClassifiedImage {
                id: row.get(0)?,
                data: row.get(1)?,
                category: row.get(2)?,
                filename: row.get(3)?,
            })
        })?;
        rows.collect()
    }
}

/// Insert one record inside a batch transaction, returning its assigned id.
pub fn insert_image(
    tx: &Transaction<'_>,
    data: &[u8],
    category: &str,
    filename: &str,
) -> rusqlite::Result<i64> {
    tx.execute(
        "INSERT INTO classified_images (data, category, filename) VALUES (?1, ?2, ?3)",
        params![data, category, filename],
    )?;
    Ok(tx.last_insert_rowid())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn open_temp() -> (tempfile::TempDir, Store) {
        let dir = tempfile::tempdir().unwrap();
        let store = Store::open(&dir.path().join("test.db")).unwrap();
        (dir, store)
    }

    #[test]
    fn schema_init_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("test.db");
        drop(Store::open(&path).unwrap());
        let store = Store::open(&path).unwrap();
        assert_eq!(store.count().unwrap(), 0);
    }

    #[test]
    fn insert_and_list_round_trip() {
        let (_dir, mut store) = open_temp();
        let tx = store.transaction().unwrap();
        let id = insert_image(&tx, b"png-bytes", "Food", "pizza.jpg").unwrap();
        tx.commit().unwrap();

        let records = store.list().unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].id, id);
        assert_eq!(records[0].data, b"png-bytes");
        assert_eq!(records[0].category, "Food");
        assert_eq!(records[0].filename, "pizza.jpg");
    }

    #[test]
    fn duplicate_inserts_get_distinct_ids() {
        let (_dir, mut store) = open_temp();
        let tx = store.transaction().unwrap();
        let first = insert_image(&tx, b"same", "Animal", "cat.png").unwrap();
        let second = insert_image(&tx, b"same", "Animal", "cat.png").unwrap();
        tx.commit().unwrap();
        assert_ne!(first, second);
        assert_eq!(store.count().unwrap(), 2);
    }

    #[test]
    fn dropped_transaction_rolls_back() {
        let (_dir, mut store) = open_temp();
        {
            let tx = store.transaction().unwrap();
            insert_image(&tx, b"doomed", "Human", "a.png").unwrap();
            // dropped without commit
        }
        assert_eq!(store.count().unwrap(), 0);
    }
}
