use std::str::FromStr;

use sqlx::SqlitePool;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};

use crate::error::{Result, StoreError};
use crate::types::{ChunkRecord, DocumentRecord};

/// `SQLite`-backed store for documents and their chunk text.
///
/// The vector index only keeps `(document, page, span)` stubs; the full
/// chunk text retrieved at answer time lives here.
#[derive(Debug, Clone)]
pub struct SqliteStore {
    pool: SqlitePool,
}

impl SqliteStore {
    /// Open (or create) the database and run migrations.
    ///
    /// Enables foreign key constraints at connection level so that
    /// `ON DELETE CASCADE` rules are enforced.
    ///
    /// # Errors
    ///
    /// Returns an error if the database cannot be opened or migrations fail.
    pub async fn new(path: &str) -> Result<Self> {
        let url = if path == ":memory:" {
            "sqlite::memory:".to_string()
        } else {
            format!("sqlite:{path}?mode=rwc")
        };

        let opts = SqliteConnectOptions::from_str(&url)
            .map_err(StoreError::Sqlite)?
            .create_if_missing(true)
            .foreign_keys(true);

        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect_with(opts)
            .await?;

        sqlx::migrate!("./migrations").run(&pool).await?;

        Ok(Self { pool })
    }

    /// Expose the underlying pool for shared access.
    #[must_use]
    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Register a source document.
    ///
    /// # Errors
    ///
    /// Returns an error if the insert fails.
    pub async fn insert_document(&self, document: &DocumentRecord) -> Result<()> {
        sqlx::query("INSERT INTO documents (id, filename, num_pages) VALUES (?, ?, ?)")
            .bind(&document.id)
            .bind(&document.filename)
            .bind(i64::from(document.num_pages))
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    /// Persist a batch of chunks in a single transaction.
    ///
    /// # Errors
    ///
    /// Returns an error if any insert fails; nothing is committed in
    /// that case.
    pub async fn insert_chunks(&self, chunks: &[ChunkRecord]) -> Result<()> {
        let mut tx = self.pool.begin().await?;
        for chunk in chunks {
            sqlx::query(
                "INSERT INTO chunks (id, document_id, page_no, char_start, char_end, text) \
                 VALUES (?, ?, ?, ?, ?, ?)",
            )
            .bind(&chunk.id)
            .bind(&chunk.document_id)
            .bind(i64::from(chunk.page_no))
            .bind(i64::try_from(chunk.char_start)?)
            .bind(i64::try_from(chunk.char_end)?)
            .bind(&chunk.text)
            .execute(&mut *tx)
            .await?;
        }
        tx.commit().await?;
        Ok(())
    }

    /// Text of the first chunk on the given page, by `char_start`.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails.
    pub async fn chunk_text(&self, document_id: &str, page_no: u32) -> Result<Option<String>> {
        let row: Option<(String,)> = sqlx::query_as(
            "SELECT text FROM chunks \
             WHERE document_id = ? AND page_no = ? \
             ORDER BY char_start ASC \
             LIMIT 1",
        )
        .bind(document_id)
        .bind(i64::from(page_no))
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.map(|r| r.0))
    }

    /// All registered documents, oldest first.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails.
    pub async fn list_documents(&self) -> Result<Vec<DocumentRecord>> {
        let rows: Vec<(String, String, i64)> =
            sqlx::query_as("SELECT id, filename, num_pages FROM documents ORDER BY created_at ASC")
                .fetch_all(&self.pool)
                .await?;

        rows.into_iter()
            .map(|(id, filename, num_pages)| {
                Ok(DocumentRecord {
                    id,
                    filename,
                    num_pages: u32::try_from(num_pages)?,
                })
            })
            .collect()
    }

    /// Total number of stored chunks.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails.
    pub async fn chunk_count(&self) -> Result<u64> {
        let row: (i64,) = sqlx::query_as("SELECT COUNT(*) FROM chunks")
            .fetch_one(&self.pool)
            .await?;
        Ok(u64::try_from(row.0)?)
    }
}
