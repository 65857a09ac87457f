use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::{Pool, Sqlite};
use std::fmt;
use std::path::Path;

use crate::hash::sha256_hex;

pub type DbPool = Pool<Sqlite>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FileKind {
    Sales,
    Budget,
    Outstanding,
    Processed,
    Merged,
}

impl FileKind {
    pub fn as_str(self) -> &'static str {
        match self {
            FileKind::Sales => "sales",
            FileKind::Budget => "budget",
            FileKind::Outstanding => "outstanding",
            FileKind::Processed => "processed",
            FileKind::Merged => "merged",
        }
    }

    /// Uploaded source reports, as opposed to workbooks produced by processing.
    pub fn is_source(self) -> bool {
        matches!(self, FileKind::Sales | FileKind::Budget | FileKind::Outstanding)
    }
}

impl fmt::Display for FileKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for FileKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "sales" => Ok(FileKind::Sales),
            "budget" => Ok(FileKind::Budget),
            "outstanding" | "os" => Ok(FileKind::Outstanding),
            "processed" => Ok(FileKind::Processed),
            "merged" => Ok(FileKind::Merged),
            other => Err(format!("Unknown file kind: '{other}'")),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FileMeta {
    pub id: i64,
    pub name: String,
    pub kind: FileKind,
    pub sha256: String,
    pub size: i64,
    pub source_id: Option<i64>,
    pub created_at: NaiveDateTime,
}

#[derive(Debug, Clone)]
pub struct StoredFile {
    pub meta: FileMeta,
    pub content: Vec<u8>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InsertOutcome {
    Inserted(i64),
    /// Same bytes were already stored under the same kind.
    Duplicate(i64),
}

impl InsertOutcome {
    pub fn id(self) -> i64 {
        match self {
            InsertOutcome::Inserted(id) | InsertOutcome::Duplicate(id) => id,
        }
    }

    pub fn is_duplicate(self) -> bool {
        matches!(self, InsertOutcome::Duplicate(_))
    }
}

pub async fn create_db(path: &Path) -> Result<DbPool, sqlx::Error> {
    let options = SqliteConnectOptions::new()
        .filename(path)
        .create_if_missing(true);
    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .connect_with(options)
        .await?;

    sqlx::query("PRAGMA journal_mode = WAL")
        .execute(&pool)
        .await?;
    sqlx::query("PRAGMA foreign_keys = ON")
        .execute(&pool)
        .await?;
    sqlx::query("PRAGMA synchronous = NORMAL")
        .execute(&pool)
        .await?;
    sqlx::query("PRAGMA busy_timeout = 5000")
        .execute(&pool)
        .await?;

    run_migrations(&pool).await?;
    tracing::info!(path = %path.display(), "database ready");

    Ok(pool)
}

async fn run_migrations(pool: &DbPool) -> Result<(), sqlx::Error> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS files (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            name TEXT NOT NULL,
            kind TEXT NOT NULL,
            sha256 TEXT NOT NULL,
            content BLOB NOT NULL,
            source_id INTEGER,
            created_at TEXT NOT NULL DEFAULT (datetime('now')),
            UNIQUE (sha256, kind),
            FOREIGN KEY (source_id) REFERENCES files(id) ON DELETE SET NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query("CREATE INDEX IF NOT EXISTS idx_files_kind ON files(kind)")
        .execute(pool)
        .await?;

    Ok(())
}

type MetaRow = (i64, String, String, String, i64, Option<i64>, NaiveDateTime);

const META_COLUMNS: &str =
    "id, name, kind, sha256, length(content), source_id, created_at";

fn meta_from_row(r: MetaRow) -> Result<FileMeta, sqlx::Error> {
    let kind = r.2.parse::<FileKind>().map_err(|e| sqlx::Error::Decode(e.into()))?;
    Ok(FileMeta {
        id: r.0,
        name: r.1,
        kind,
        sha256: r.3,
        size: r.4,
        source_id: r.5,
        created_at: r.6,
    })
}

/// Stores a file unless identical bytes already exist under the same kind.
pub async fn insert_file(
    pool: &DbPool,
    name: &str,
    kind: FileKind,
    content: &[u8],
    source_id: Option<i64>,
) -> Result<InsertOutcome, sqlx::Error> {
    let sha256 = sha256_hex(content);

    // The unique (sha256, kind) constraint decides races between concurrent uploads.
    let result = sqlx::query(
        "INSERT INTO files (name, kind, sha256, content, source_id) VALUES (?, ?, ?, ?, ?) \
         ON CONFLICT (sha256, kind) DO NOTHING",
    )
    .bind(name)
    .bind(kind.as_str())
    .bind(&sha256)
    .bind(content)
    .bind(source_id)
    .execute(pool)
    .await?;

    if result.rows_affected() == 0 {
        let (id,) = sqlx::query_as::<_, (i64,)>("SELECT id FROM files WHERE sha256 = ? AND kind = ?")
            .bind(&sha256)
            .bind(kind.as_str())
            .fetch_one(pool)
            .await?;
        tracing::info!(id, %kind, name, "duplicate upload");
        return Ok(InsertOutcome::Duplicate(id));
    }

    let id = result.last_insert_rowid();
    tracing::info!(id, %kind, name, bytes = content.len(), "stored file");
    Ok(InsertOutcome::Inserted(id))
}

pub async fn get_file(pool: &DbPool, id: i64) -> Result<Option<StoredFile>, sqlx::Error> {
    let row = sqlx::query_as::<_, (i64, String, String, String, i64, Option<i64>, NaiveDateTime, Vec<u8>)>(
        &format!("SELECT {META_COLUMNS}, content FROM files WHERE id = ?"),
    )
    .bind(id)
    .fetch_optional(pool)
    .await?;

    row.map(|r| {
        let meta = meta_from_row((r.0, r.1, r.2, r.3, r.4, r.5, r.6))?;
        Ok(StoredFile { meta, content: r.7 })
    })
    .transpose()
}

/// Newest first.
pub async fn list_files(pool: &DbPool, kind: Option<FileKind>) -> Result<Vec<FileMeta>, sqlx::Error> {
    let rows = match kind {
        Some(kind) => {
            sqlx::query_as::<_, MetaRow>(&format!(
                "SELECT {META_COLUMNS} FROM files WHERE kind = ? ORDER BY id DESC"
            ))
            .bind(kind.as_str())
            .fetch_all(pool)
            .await?
        }
        None => {
            sqlx::query_as::<_, MetaRow>(&format!(
                "SELECT {META_COLUMNS} FROM files ORDER BY id DESC"
            ))
            .fetch_all(pool)
            .await?
        }
    };

    rows.into_iter().map(meta_from_row).collect()
}

/// Returns false when no such file existed.
pub async fn delete_file(pool: &DbPool, id: i64) -> Result<bool, sqlx::Error> {
    let result = sqlx::query("DELETE FROM files WHERE id = ?")
        .bind(id)
        .execute(pool)
        .await?;
    Ok(result.rows_affected() > 0)
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn test_db() -> (tempfile::TempDir, DbPool) {
        let dir = tempfile::tempdir().unwrap();
        let pool = create_db(&dir.path().join("salesdesk.db")).await.unwrap();
        (dir, pool)
    }

    #[test]
    fn kind_parsing() {
        assert_eq!("Sales".parse::<FileKind>().unwrap(), FileKind::Sales);
        assert_eq!("os".parse::<FileKind>().unwrap(), FileKind::Outstanding);
        assert!("invoice".parse::<FileKind>().is_err());
        assert!(FileKind::Budget.is_source());
        assert!(!FileKind::Merged.is_source());
    }

    #[tokio::test]
    async fn insert_and_fetch() {
        let (_dir, pool) = test_db().await;
        let outcome = insert_file(&pool, "apr.xlsx", FileKind::Sales, b"apr-bytes", None)
            .await
            .unwrap();
        assert!(!outcome.is_duplicate());

        let file = get_file(&pool, outcome.id()).await.unwrap().unwrap();
        assert_eq!(file.meta.name, "apr.xlsx");
        assert_eq!(file.meta.kind, FileKind::Sales);
        assert_eq!(file.meta.size, 9);
        assert_eq!(file.meta.sha256, sha256_hex(b"apr-bytes"));
        assert_eq!(file.content, b"apr-bytes");
    }

    #[tokio::test]
    async fn same_bytes_same_kind_is_duplicate() {
        let (_dir, pool) = test_db().await;
        let first = insert_file(&pool, "apr.xlsx", FileKind::Sales, b"x", None).await.unwrap();
        let again = insert_file(&pool, "copy.xlsx", FileKind::Sales, b"x", None).await.unwrap();
        assert_eq!(again, InsertOutcome::Duplicate(first.id()));

        // A different kind is a different upload.
        let budget = insert_file(&pool, "apr.xlsx", FileKind::Budget, b"x", None).await.unwrap();
        assert!(!budget.is_duplicate());
        assert_ne!(budget.id(), first.id());
    }

    #[tokio::test]
    async fn concurrent_identical_uploads_store_one_row() {
        let (_dir, pool) = test_db().await;
        let (a, b) = tokio::join!(
            insert_file(&pool, "apr.xlsx", FileKind::Sales, b"same", None),
            insert_file(&pool, "apr-again.xlsx", FileKind::Sales, b"same", None),
        );
        let (a, b) = (a.unwrap(), b.unwrap());

        assert_eq!(a.id(), b.id());
        assert_ne!(a.is_duplicate(), b.is_duplicate());
        assert_eq!(list_files(&pool, Some(FileKind::Sales)).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn list_filters_by_kind() {
        let (_dir, pool) = test_db().await;
        let src = insert_file(&pool, "a.xlsx", FileKind::Sales, b"a", None).await.unwrap();
        insert_file(&pool, "b.xlsx", FileKind::Budget, b"b", None).await.unwrap();
        insert_file(&pool, "a-processed.xlsx", FileKind::Processed, b"c", Some(src.id()))
            .await
            .unwrap();

        assert_eq!(list_files(&pool, None).await.unwrap().len(), 3);
        let processed = list_files(&pool, Some(FileKind::Processed)).await.unwrap();
        assert_eq!(processed.len(), 1);
        assert_eq!(processed[0].source_id, Some(src.id()));
    }

    #[tokio::test]
    async fn delete_clears_source_link() {
        let (_dir, pool) = test_db().await;
        let src = insert_file(&pool, "a.xlsx", FileKind::Sales, b"a", None).await.unwrap();
        let out = insert_file(&pool, "a-processed.xlsx", FileKind::Processed, b"c", Some(src.id()))
            .await
            .unwrap();

        assert!(delete_file(&pool, src.id()).await.unwrap());
        assert!(!delete_file(&pool, src.id()).await.unwrap());
        assert!(get_file(&pool, src.id()).await.unwrap().is_none());

        let processed = get_file(&pool, out.id()).await.unwrap().unwrap();
        assert_eq!(processed.meta.source_id, None);
    }
}
