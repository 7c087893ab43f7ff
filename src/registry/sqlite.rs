//! SQLite-backed store registry.
//!
//! Stores and their embedded chunks live in two tables. Embeddings are
//! little-endian `f32` blobs; search loads a store's chunks and scores
//! them in process.

use std::path::Path;
use std::sync::{Mutex, PoisonError};

use async_trait::async_trait;
use rusqlite::{Connection, OptionalExtension, params};
use tracing::{debug, info};

use super::{StoreRegistry, search_chunks};
use crate::core::{RetrievalCandidate, RetrievedDocument};
use crate::error::StoreError;
use crate::retrieval::search::SearchMode;

/// Database path used when none is given.
pub const DEFAULT_DB_PATH: &str = ".groundwire/stores.db";

const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS stores (
    name         TEXT PRIMARY KEY NOT NULL,
    embed_model  TEXT NOT NULL,
    distance     TEXT NOT NULL DEFAULT 'cosine',
    index_kind   TEXT NOT NULL DEFAULT 'hnsw',
    alias        TEXT,
    description  TEXT,
    client_id    TEXT,
    created_at   INTEGER NOT NULL DEFAULT (strftime('%s', 'now'))
);

CREATE TABLE IF NOT EXISTS documents (
    id         INTEGER PRIMARY KEY AUTOINCREMENT,
    store      TEXT NOT NULL REFERENCES stores(name) ON DELETE CASCADE,
    content    TEXT NOT NULL,
    embedding  BLOB NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_documents_store ON documents (store);
";

/// A registered store with its visibility.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoreRecord {
    /// The store as a retrieval candidate.
    pub candidate: RetrievalCandidate,
    /// Owning client; `None` means shared.
    pub client_id: Option<String>,
    /// Number of chunks stored.
    pub documents: usize,
}

/// Store registry in a single SQLite database.
///
/// The connection sits behind a `Mutex` because `rusqlite::Connection` is
/// not `Sync`.
pub struct SqliteStoreRegistry {
    conn: Mutex<Connection>,
}

impl std::fmt::Debug for SqliteStoreRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SqliteStoreRegistry").finish_non_exhaustive()
    }
}

impl SqliteStoreRegistry {
    /// Opens (or creates) a database file and applies the schema.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be opened or the schema fails.
    pub fn open(path: &Path) -> Result<Self, StoreError> {
        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
        {
            std::fs::create_dir_all(parent)?;
        }
        let conn = Connection::open(path)?;
        conn.execute_batch("PRAGMA journal_mode = WAL; PRAGMA foreign_keys = ON;")?;
        let registry = Self::with_connection(conn)?;
        info!(path = %path.display(), "opened store database");
        Ok(registry)
    }

    /// Opens an in-memory database.
    ///
    /// # Errors
    ///
    /// Returns an error if the schema cannot be applied.
    pub fn in_memory() -> Result<Self, StoreError> {
        let conn = Connection::open_in_memory()?;
        conn.execute_batch("PRAGMA foreign_keys = ON;")?;
        Self::with_connection(conn)
    }

    fn with_connection(conn: Connection) -> Result<Self, StoreError> {
        conn.execute_batch(SCHEMA)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn conn(&self) -> std::sync::MutexGuard<'_, Connection> {
        self.conn.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Registers a store. `client_id` of `None` shares it with every client.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::AlreadyExists`] if the name is taken.
    pub fn add_store(
        &self,
        candidate: &RetrievalCandidate,
        client_id: Option<&str>,
    ) -> Result<(), StoreError> {
        let conn = self.conn();
        let exists: Option<String> = conn
            .query_row(
                "SELECT name FROM stores WHERE name = ?1",
                params![candidate.name],
                |row| row.get(0),
            )
            .optional()?;
        if exists.is_some() {
            return Err(StoreError::AlreadyExists(candidate.name.clone()));
        }
        conn.execute(
            "INSERT INTO stores (name, embed_model, distance, index_kind, alias, description, client_id)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            params![
                candidate.name,
                candidate.embed_model,
                candidate.distance.as_str(),
                candidate.index_kind.as_str(),
                candidate.alias,
                candidate.description,
                client_id,
            ],
        )?;
        debug!(store = %candidate.name, "registered store");
        Ok(())
    }

    /// Removes a store and its chunks. Returns whether it existed.
    ///
    /// # Errors
    ///
    /// Returns an error on database failure.
    pub fn remove_store(&self, name: &str) -> Result<bool, StoreError> {
        let conn = self.conn();
        conn.execute("DELETE FROM documents WHERE store = ?1", params![name])?;
        let n = conn.execute("DELETE FROM stores WHERE name = ?1", params![name])?;
        Ok(n > 0)
    }

    /// Looks up one store.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::NotFound`] if there is no such store.
    pub fn get_store(&self, name: &str) -> Result<RetrievalCandidate, StoreError> {
        self.records()?
            .into_iter()
            .find(|r| r.candidate.name == name)
            .map(|r| r.candidate)
            .ok_or_else(|| StoreError::NotFound(name.to_string()))
    }

    /// Every registered store, by name.
    ///
    /// # Errors
    ///
    /// Returns an error on database failure or an unreadable row.
    pub fn records(&self) -> Result<Vec<StoreRecord>, StoreError> {
        let conn = self.conn();
        let mut stmt = conn.prepare(
            "SELECT s.name, s.embed_model, s.distance, s.index_kind, s.alias, s.description,
                    s.client_id, (SELECT COUNT(*) FROM documents d WHERE d.store = s.name)
             FROM stores s ORDER BY s.name",
        )?;
        let rows = stmt.query_map([], |row| {
            Ok((
                row.get::<_, String>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, String>(2)?,
                row.get::<_, String>(3)?,
                row.get::<_, Option<String>>(4)?,
                row.get::<_, Option<String>>(5)?,
                row.get::<_, Option<String>>(6)?,
                row.get::<_, i64>(7)?,
            ))
        })?;

        let mut out = Vec::new();
        for row in rows {
            let (name, embed_model, distance, index_kind, alias, description, client_id, count) =
                row?;
            out.push(StoreRecord {
                candidate: RetrievalCandidate {
                    name,
                    embed_model,
                    distance: distance.parse()?,
                    index_kind: index_kind.parse()?,
                    alias,
                    description,
                },
                client_id,
                documents: usize::try_from(count).unwrap_or(0),
            });
        }
        Ok(out)
    }

    /// Adds embedded chunks to a store in one transaction.
    ///
    /// All vectors must share the store's existing dimension.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::NotFound`] for an unknown store and
    /// [`StoreError::DimensionMismatch`] for a vector of the wrong size.
    pub fn add_documents(
        &self,
        store: &str,
        chunks: &[(String, Vec<f32>)],
    ) -> Result<usize, StoreError> {
        let mut conn = self.conn();
        let tx = conn.transaction()?;

        let known: Option<String> = tx
            .query_row("SELECT name FROM stores WHERE name = ?1", params![store], |row| row.get(0))
            .optional()?;
        if known.is_none() {
            return Err(StoreError::NotFound(store.to_string()));
        }

        let existing: Option<Vec<u8>> = tx
            .query_row(
                "SELECT embedding FROM documents WHERE store = ?1 LIMIT 1",
                params![store],
                |row| row.get(0),
            )
            .optional()?;
        let mut dim = existing.map(|b| b.len() / 4);

        {
            let mut insert =
                tx.prepare("INSERT INTO documents (store, content, embedding) VALUES (?1, ?2, ?3)")?;
            for (content, embedding) in chunks {
                let expected = *dim.get_or_insert(embedding.len());
                if embedding.len() != expected {
                    return Err(StoreError::DimensionMismatch {
                        store: store.to_string(),
                        expected,
                        actual: embedding.len(),
                    });
                }
                insert.execute(params![store, content, encode_embedding(embedding)])?;
            }
        }
        tx.commit()?;
        debug!(store, count = chunks.len(), "stored chunks");
        Ok(chunks.len())
    }

    fn load_chunks(&self, store: &str) -> Result<Vec<(String, Vec<f32>)>, StoreError> {
        let conn = self.conn();
        let mut stmt =
            conn.prepare("SELECT content, embedding FROM documents WHERE store = ?1 ORDER BY id")?;
        let rows = stmt.query_map(params![store], |row| {
            Ok((row.get::<_, String>(0)?, row.get::<_, Vec<u8>>(1)?))
        })?;
        let mut out = Vec::new();
        for row in rows {
            let (content, blob) = row?;
            out.push((content, decode_embedding(&blob)?));
        }
        Ok(out)
    }
}

fn encode_embedding(v: &[f32]) -> Vec<u8> {
    v.iter().flat_map(|x| x.to_le_bytes()).collect()
}

fn decode_embedding(blob: &[u8]) -> Result<Vec<f32>, StoreError> {
    if blob.len() % 4 != 0 {
        return Err(StoreError::InvalidValue {
            field: "embedding",
            value: format!("{} bytes", blob.len()),
        });
    }
    Ok(blob
        .chunks_exact(4)
        .map(|b| f32::from_le_bytes([b[0], b[1], b[2], b[3]]))
        .collect())
}

#[async_trait]
impl StoreRegistry for SqliteStoreRegistry {
    async fn list_stores(
        &self,
        client_id: Option<&str>,
    ) -> Result<Vec<RetrievalCandidate>, StoreError> {
        Ok(self
            .records()?
            .into_iter()
            .filter(|r| r.client_id.is_none() || r.client_id.as_deref() == client_id)
            .map(|r| r.candidate)
            .collect())
    }

    async fn similarity_search(
        &self,
        store: &RetrievalCandidate,
        query: &[f32],
        mode: &SearchMode,
    ) -> Result<Vec<RetrievedDocument>, StoreError> {
        let chunks = self.load_chunks(&store.name)?;
        if chunks.is_empty() && self.get_store(&store.name).is_err() {
            return Err(StoreError::NotFound(store.name.clone()));
        }
        search_chunks(store, query, chunks, mode)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::DistanceMetric;

    fn chunk(content: &str, v: &[f32]) -> (String, Vec<f32>) {
        (content.to_string(), v.to_vec())
    }

    #[test]
    fn test_embedding_blob_round_trip() {
        let v = vec![0.5, -1.25, 3.0];
        let decoded = decode_embedding(&encode_embedding(&v)).unwrap_or_default();
        assert_eq!(decoded, v);
        assert!(decode_embedding(&[1, 2, 3]).is_err());
    }

    #[test]
    fn test_add_and_list_stores() {
        let reg = SqliteStoreRegistry::in_memory().unwrap_or_else(|_| unreachable!());
        let mut c = RetrievalCandidate::new("DOCS", "text-embedding-3-small").with_description("Product docs");
        c.distance = DistanceMetric::Euclidean;
        reg.add_store(&c, None).unwrap_or_else(|_| unreachable!());
        assert!(matches!(reg.add_store(&c, None), Err(StoreError::AlreadyExists(_))));

        let records = reg.records().unwrap_or_default();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].candidate, c);
        assert_eq!(records[0].documents, 0);
    }

    #[test]
    fn test_add_documents_checks_store_and_dimension() {
        let reg = SqliteStoreRegistry::in_memory().unwrap_or_else(|_| unreachable!());
        assert!(matches!(
            reg.add_documents("NOPE", &[chunk("a", &[1.0])]),
            Err(StoreError::NotFound(_))
        ));
        reg.add_store(&RetrievalCandidate::new("S", "m"), None)
            .unwrap_or_else(|_| unreachable!());
        let n = reg
            .add_documents("S", &[chunk("a", &[1.0, 0.0]), chunk("b", &[0.0, 1.0])])
            .unwrap_or(0);
        assert_eq!(n, 2);
        assert!(matches!(
            reg.add_documents("S", &[chunk("c", &[1.0])]),
            Err(StoreError::DimensionMismatch { expected: 2, actual: 1, .. })
        ));
        assert_eq!(reg.records().unwrap_or_default()[0].documents, 2);
    }

    #[tokio::test]
    async fn test_file_backed_search_and_visibility() {
        let dir = tempfile::tempdir().unwrap_or_else(|_| unreachable!());
        let path = dir.path().join("nested").join("stores.db");
        {
            let reg = SqliteStoreRegistry::open(&path).unwrap_or_else(|_| unreachable!());
            reg.add_store(&RetrievalCandidate::new("SHARED", "m"), None)
                .unwrap_or_else(|_| unreachable!());
            reg.add_store(&RetrievalCandidate::new("MINE", "m"), Some("acme"))
                .unwrap_or_else(|_| unreachable!());
            reg.add_documents(
                "SHARED",
                &[chunk("refunds", &[1.0, 0.0]), chunk("shipping", &[0.0, 1.0])],
            )
            .unwrap_or_else(|_| unreachable!());
        }

        let reg = SqliteStoreRegistry::open(&path).unwrap_or_else(|_| unreachable!());
        assert_eq!(reg.list_stores(None).await.unwrap_or_default().len(), 1);
        assert_eq!(reg.list_stores(Some("acme")).await.unwrap_or_default().len(), 2);

        let store = reg.get_store("SHARED").unwrap_or_else(|_| unreachable!());
        let docs = reg
            .similarity_search(&store, &[0.9, 0.1], &SearchMode::Similarity { top_k: 5 })
            .await
            .unwrap_or_default();
        assert_eq!(docs.len(), 2);
        assert_eq!(docs[0].content, "refunds");
        assert!(docs[0].score > docs[1].score);

        assert!(reg.remove_store("SHARED").unwrap_or(false));
        assert!(matches!(
            reg.similarity_search(&store, &[1.0, 0.0], &SearchMode::default()).await,
            Err(StoreError::NotFound(_))
        ));
    }
}
