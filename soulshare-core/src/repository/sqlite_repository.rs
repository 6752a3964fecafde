use std::path::Path;
use std::str::FromStr;
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use soulshare_model::{DirectoryRecord, FileRecord, ScanRecord, SearchQuery, ShareError};
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions};
use sqlx::{Row, SqlitePool};
use tokio::sync::Mutex as AsyncMutex;
use tokio::task::JoinHandle;
use tracing::{debug, error, warn};

use soulshare_contracts::repository::{SchemaValidation, ShareRepository};

use super::schema::{self, EXPECTED_TABLES};

/// SQLite-backed [`ShareRepository`]. Disk mode opens a WAL journaled
/// file; memory mode opens a shared-cache in-memory database that a
/// keepalive probe must keep alive (the last connection closing destroys
/// the data).
pub struct SqliteShareRepository {
    pool: SqlitePool,
    keepalive: AsyncMutex<Option<JoinHandle<()>>>,
}

impl std::fmt::Debug for SqliteShareRepository {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SqliteShareRepository")
            .field("connections", &self.pool.size())
            .finish()
    }
}

impl SqliteShareRepository {
    pub async fn open_disk(path: &Path) -> soulshare_model::Result<Self> {
        let opts = SqliteConnectOptions::new()
            .filename(path)
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal);
        let pool = SqlitePoolOptions::new()
            .max_connections(8)
            .connect_with(opts)
            .await
            .map_err(|e| ShareError::Repository(e.to_string()))?;
        Ok(Self {
            pool,
            keepalive: AsyncMutex::new(None),
        })
    }

    /// `name` identifies the shared in-memory database so multiple pooled
    /// connections see the same data instead of each getting its own empty
    /// database; the repository is singly-owned by the service.
    pub async fn open_memory(name: &str) -> soulshare_model::Result<Self> {
        let uri = format!("file:{name}?mode=memory&cache=shared");
        let opts = SqliteConnectOptions::from_str(&uri)
            .map_err(|e| ShareError::Repository(e.to_string()))?
            .create_if_missing(true);
        let pool = SqlitePoolOptions::new()
            .min_connections(1)
            .max_connections(8)
            .connect_with(opts)
            .await
            .map_err(|e| ShareError::Repository(e.to_string()))?;
        Ok(Self {
            pool,
            keepalive: AsyncMutex::new(None),
        })
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }
}

#[async_trait]
impl ShareRepository for SqliteShareRepository {
    async fn create(&self, discard_existing: bool) -> soulshare_model::Result<()> {
        if discard_existing {
            for stmt in schema::DROP_STATEMENTS {
                sqlx::query(stmt)
                    .execute(&self.pool)
                    .await
                    .map_err(|e| ShareError::Repository(e.to_string()))?;
            }
        }
        for stmt in schema::CREATE_STATEMENTS {
            sqlx::query(stmt)
                .execute(&self.pool)
                .await
                .map_err(|e| ShareError::Repository(e.to_string()))?;
        }
        sqlx::query("INSERT OR IGNORE INTO version (a) VALUES (?)")
            .bind(schema::CURRENT_SCHEMA_VERSION)
            .execute(&self.pool)
            .await
            .map_err(|e| ShareError::Repository(e.to_string()))?;
        Ok(())
    }

    async fn try_validate(&self) -> SchemaValidation {
        let rows = match sqlx::query("SELECT name, sql FROM sqlite_master WHERE type = 'table'")
            .fetch_all(&self.pool)
            .await
        {
            Ok(rows) => rows,
            Err(e) => return SchemaValidation::Invalid(vec![format!("schema query failed: {e}")]),
        };

        let mut live = std::collections::HashMap::new();
        for row in &rows {
            let name: String = row.try_get("name").unwrap_or_default();
            let sql: String = row.try_get::<Option<String>, _>("sql").ok().flatten().unwrap_or_default();
            live.insert(name, schema::normalize_ddl(&sql));
        }

        let mut problems = Vec::new();
        for (table, expected_prefix) in EXPECTED_TABLES {
            match live.get(*table) {
                None => problems.push(format!("missing table `{table}`")),
                Some(sql) => {
                    if !sql
                        .to_uppercase()
                        .starts_with(&schema::normalize_ddl(expected_prefix).to_uppercase())
                    {
                        problems.push(format!("table `{table}` DDL does not match expected schema"));
                    }
                }
            }
        }

        if problems.is_empty() {
            SchemaValidation::Valid
        } else {
            SchemaValidation::Invalid(problems)
        }
    }

    async fn backup_to(&self, dst: &Path) -> soulshare_model::Result<()> {
        if dst.exists() {
            std::fs::remove_file(dst).map_err(ShareError::FilesystemTransient)?;
        }
        let dst_str = dst.to_string_lossy().replace('\'', "''");
        sqlx::query(&format!("VACUUM INTO '{dst_str}'"))
            .execute(&self.pool)
            .await
            .map_err(|e| ShareError::Repository(e.to_string()))?;
        Ok(())
    }

    async fn restore_from(&self, src: &Path) -> soulshare_model::Result<()> {
        let mut conn = self
            .pool
            .acquire()
            .await
            .map_err(|e| ShareError::Repository(e.to_string()))?;

        let src_str = src.to_string_lossy().replace('\'', "''");
        sqlx::query(&format!("ATTACH DATABASE '{src_str}' AS src_db"))
            .execute(&mut *conn)
            .await
            .map_err(|e| ShareError::Repository(e.to_string()))?;

        let copy_result: soulshare_model::Result<()> = async {
            for table in ["scans", "directories", "files"] {
                sqlx::query(&format!("DELETE FROM {table}"))
                    .execute(&mut *conn)
                    .await
                    .map_err(|e| ShareError::Repository(e.to_string()))?;
                sqlx::query(&format!(
                    "INSERT INTO {table} SELECT * FROM src_db.{table}"
                ))
                .execute(&mut *conn)
                .await
                .map_err(|e| ShareError::Repository(e.to_string()))?;
            }
            sqlx::query("DELETE FROM filenames")
                .execute(&mut *conn)
                .await
                .map_err(|e| ShareError::Repository(e.to_string()))?;
            sqlx::query(
                "INSERT INTO filenames (masked_filename) SELECT masked_filename FROM files",
            )
            .execute(&mut *conn)
            .await
            .map_err(|e| ShareError::Repository(e.to_string()))?;
            Ok(())
        }
        .await;

        let _ = sqlx::query("DETACH DATABASE src_db").execute(&mut *conn).await;
        copy_result
    }

    async fn insert_scan(&self, started_at: i64, options_json: &str) -> soulshare_model::Result<()> {
        sqlx::query(
            "INSERT INTO scans (started_at, options_json, ended_at, suspect)
             VALUES (?, ?, NULL, 0)
             ON CONFLICT(started_at) DO UPDATE SET options_json = excluded.options_json",
        )
        .bind(started_at)
        .bind(options_json)
        .execute(&self.pool)
        .await
        .map_err(|e| ShareError::Repository(e.to_string()))?;
        Ok(())
    }

    async fn update_scan(&self, started_at: i64, ended_at: i64) -> soulshare_model::Result<()> {
        sqlx::query("UPDATE scans SET ended_at = ? WHERE started_at = ?")
            .bind(ended_at)
            .bind(started_at)
            .execute(&self.pool)
            .await
            .map_err(|e| ShareError::Repository(e.to_string()))?;
        Ok(())
    }

    async fn find_latest_scan(&self) -> Option<ScanRecord> {
        let row = sqlx::query(
            "SELECT started_at, options_json, ended_at, suspect FROM scans
             ORDER BY started_at DESC LIMIT 1",
        )
        .fetch_optional(&self.pool)
        .await
        .unwrap_or_else(|e| {
            warn!(error = %e, "find_latest_scan query failed");
            None
        })?;

        Some(ScanRecord {
            started_at: row.try_get("started_at").ok()?,
            options_json: row.try_get("options_json").ok()?,
            ended_at: row.try_get::<Option<i64>, _>("ended_at").ok().flatten(),
            suspect: row.try_get::<i64, _>("suspect").unwrap_or(0) != 0,
        })
    }

    async fn list_scans(&self, since: Option<i64>) -> Vec<ScanRecord> {
        let rows = match since {
            Some(since) => {
                sqlx::query(
                    "SELECT started_at, options_json, ended_at, suspect FROM scans
                     WHERE started_at >= ? ORDER BY started_at DESC",
                )
                .bind(since)
                .fetch_all(&self.pool)
                .await
            }
            None => {
                sqlx::query(
                    "SELECT started_at, options_json, ended_at, suspect FROM scans
                     ORDER BY started_at DESC",
                )
                .fetch_all(&self.pool)
                .await
            }
        };

        match rows {
            Ok(rows) => rows
                .into_iter()
                .filter_map(|row| {
                    Some(ScanRecord {
                        started_at: row.try_get("started_at").ok()?,
                        options_json: row.try_get("options_json").ok()?,
                        ended_at: row.try_get::<Option<i64>, _>("ended_at").ok().flatten(),
                        suspect: row.try_get::<i64, _>("suspect").unwrap_or(0) != 0,
                    })
                })
                .collect(),
            Err(e) => {
                warn!(error = %e, "list_scans query failed");
                Vec::new()
            }
        }
    }

    async fn flag_latest_scan_as_suspect(&self) -> soulshare_model::Result<()> {
        sqlx::query(
            "UPDATE scans SET suspect = 1 WHERE started_at = (SELECT MAX(started_at) FROM scans)",
        )
        .execute(&self.pool)
        .await
        .map_err(|e| ShareError::Repository(e.to_string()))?;
        Ok(())
    }

    async fn insert_directory(&self, masked_name: &str, timestamp: i64) -> soulshare_model::Result<()> {
        sqlx::query(
            "INSERT INTO directories (name, timestamp) VALUES (?, ?)
             ON CONFLICT(name) DO UPDATE SET timestamp = excluded.timestamp",
        )
        .bind(masked_name)
        .bind(timestamp)
        .execute(&self.pool)
        .await
        .map_err(|e| ShareError::Repository(e.to_string()))?;
        Ok(())
    }

    async fn insert_file(&self, file: &FileRecord) -> soulshare_model::Result<()> {
        sqlx::query(
            "INSERT INTO files
                (masked_filename, original_filename, size, touched_at, code, extension, attribute_json, timestamp)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?)
             ON CONFLICT(masked_filename) DO UPDATE SET
                original_filename = excluded.original_filename,
                size = excluded.size,
                touched_at = excluded.touched_at,
                code = excluded.code,
                extension = excluded.extension,
                attribute_json = excluded.attribute_json,
                timestamp = excluded.timestamp",
        )
        .bind(&file.masked_filename)
        .bind(&file.original_filename)
        .bind(file.size as i64)
        .bind(&file.touched_at)
        .bind(file.code)
        .bind(&file.extension)
        .bind(file.attributes_json())
        .bind(file.timestamp)
        .execute(&self.pool)
        .await
        .map_err(|e| ShareError::Repository(e.to_string()))?;

        sqlx::query("DELETE FROM filenames WHERE masked_filename = ?")
            .bind(&file.masked_filename)
            .execute(&self.pool)
            .await
            .map_err(|e| ShareError::Repository(e.to_string()))?;
        sqlx::query("INSERT INTO filenames (masked_filename) VALUES (?)")
            .bind(&file.masked_filename)
            .execute(&self.pool)
            .await
            .map_err(|e| ShareError::Repository(e.to_string()))?;
        Ok(())
    }

    async fn prune_directories(&self, older_than_timestamp: i64) -> soulshare_model::Result<u64> {
        let result = sqlx::query("DELETE FROM directories WHERE timestamp < ?")
            .bind(older_than_timestamp)
            .execute(&self.pool)
            .await
            .map_err(|e| ShareError::Repository(e.to_string()))?;
        Ok(result.rows_affected())
    }

    async fn prune_files(&self, older_than_timestamp: i64) -> soulshare_model::Result<u64> {
        let stale: Vec<(String,)> = sqlx::query_as(
            "SELECT masked_filename FROM files WHERE timestamp < ?",
        )
        .bind(older_than_timestamp)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| ShareError::Repository(e.to_string()))?;

        for (masked_filename,) in &stale {
            sqlx::query("DELETE FROM filenames WHERE masked_filename = ?")
                .bind(masked_filename)
                .execute(&self.pool)
                .await
                .map_err(|e| ShareError::Repository(e.to_string()))?;
        }

        let result = sqlx::query("DELETE FROM files WHERE timestamp < ?")
            .bind(older_than_timestamp)
            .execute(&self.pool)
            .await
            .map_err(|e| ShareError::Repository(e.to_string()))?;
        Ok(result.rows_affected())
    }

    async fn rebuild_filename_index(&self) -> soulshare_model::Result<()> {
        sqlx::query("DELETE FROM filenames")
            .execute(&self.pool)
            .await
            .map_err(|e| ShareError::Repository(e.to_string()))?;
        sqlx::query("INSERT INTO filenames (masked_filename) SELECT masked_filename FROM files")
            .execute(&self.pool)
            .await
            .map_err(|e| ShareError::Repository(e.to_string()))?;
        Ok(())
    }

    async fn list_directories(&self, prefix: Option<&str>) -> Vec<DirectoryRecord> {
        let result = match prefix {
            Some(prefix) => {
                sqlx::query("SELECT name, timestamp FROM directories WHERE name LIKE ? ORDER BY name ASC")
                    .bind(format!("{prefix}%"))
                    .fetch_all(&self.pool)
                    .await
            }
            None => {
                sqlx::query("SELECT name, timestamp FROM directories ORDER BY name ASC")
                    .fetch_all(&self.pool)
                    .await
            }
        };

        match result {
            Ok(rows) => rows
                .into_iter()
                .map(|row| DirectoryRecord {
                    masked_name: row.try_get("name").unwrap_or_default(),
                    timestamp: row.try_get("timestamp").unwrap_or_default(),
                })
                .collect(),
            Err(e) => {
                warn!(error = %e, "list_directories query failed");
                Vec::new()
            }
        }
    }

    async fn list_files(&self, prefix: Option<&str>, _include_full_path: bool) -> Vec<FileRecord> {
        let result = match prefix {
            Some(prefix) => {
                sqlx::query(
                    "SELECT masked_filename, original_filename, size, touched_at, code, extension, attribute_json, timestamp
                     FROM files WHERE masked_filename LIKE ? ORDER BY masked_filename ASC",
                )
                .bind(format!("{prefix}%"))
                .fetch_all(&self.pool)
                .await
            }
            None => {
                sqlx::query(
                    "SELECT masked_filename, original_filename, size, touched_at, code, extension, attribute_json, timestamp
                     FROM files ORDER BY masked_filename ASC",
                )
                .fetch_all(&self.pool)
                .await
            }
        };

        match result {
            Ok(rows) => rows.into_iter().map(row_to_file_record).collect(),
            Err(e) => {
                warn!(error = %e, "list_files query failed");
                Vec::new()
            }
        }
    }

    async fn count_directories(&self, prefix: Option<&str>) -> u64 {
        let result = match prefix {
            Some(prefix) => {
                sqlx::query("SELECT COUNT(*) AS n FROM directories WHERE name LIKE ?")
                    .bind(format!("{prefix}%"))
                    .fetch_one(&self.pool)
                    .await
            }
            None => sqlx::query("SELECT COUNT(*) AS n FROM directories")
                .fetch_one(&self.pool)
                .await,
        };
        result
            .ok()
            .and_then(|row| row.try_get::<i64, _>("n").ok())
            .map(|n| n as u64)
            .unwrap_or(0)
    }

    async fn count_files(&self, prefix: Option<&str>) -> u64 {
        let result = match prefix {
            Some(prefix) => {
                sqlx::query("SELECT COUNT(*) AS n FROM files WHERE masked_filename LIKE ?")
                    .bind(format!("{prefix}%"))
                    .fetch_one(&self.pool)
                    .await
            }
            None => sqlx::query("SELECT COUNT(*) AS n FROM files")
                .fetch_one(&self.pool)
                .await,
        };
        result
            .ok()
            .and_then(|row| row.try_get::<i64, _>("n").ok())
            .map(|n| n as u64)
            .unwrap_or(0)
    }

    async fn find_file_info(&self, masked_filename: &str) -> Option<(String, u64)> {
        let row = sqlx::query("SELECT original_filename, size FROM files WHERE masked_filename = ?")
            .bind(masked_filename)
            .fetch_optional(&self.pool)
            .await
            .unwrap_or_else(|e| {
                warn!(error = %e, "find_file_info query failed");
                None
            })?;
        let original: String = row.try_get("original_filename").ok()?;
        let size: i64 = row.try_get("size").ok()?;
        Some((original, size as u64))
    }

    async fn search(&self, query: &SearchQuery) -> Vec<FileRecord> {
        if query.terms.is_empty() {
            return Vec::new();
        }

        let match_expr = build_fts_match_expression(query);
        let rows = sqlx::query(
            "SELECT f.masked_filename, f.original_filename, f.size, f.touched_at, f.code,
                    f.extension, f.attribute_json, f.timestamp
             FROM filenames
             JOIN files f ON f.masked_filename = filenames.masked_filename
             WHERE filenames MATCH ?",
        )
        .bind(&match_expr)
        .fetch_all(&self.pool)
        .await;

        let rows = match rows {
            Ok(rows) => rows,
            Err(e) => {
                warn!(error = %e, "search query failed, returning empty results");
                return Vec::new();
            }
        };

        rows.into_iter()
            .map(row_to_file_record)
            .filter(|record| {
                let lower = record.masked_filename.to_lowercase();
                !query
                    .exclusions
                    .iter()
                    .any(|excl| lower.contains(&excl.to_lowercase()))
            })
            .collect()
    }

    async fn vacuum(&self) -> soulshare_model::Result<()> {
        sqlx::query("VACUUM")
            .execute(&self.pool)
            .await
            .map_err(|e| ShareError::Repository(e.to_string()))?;
        Ok(())
    }

    async fn dump_to(&self, path: &Path) -> soulshare_model::Result<()> {
        self.backup_to(path).await
    }

    async fn enable_keepalive(&self, on: bool) {
        let mut guard = self.keepalive.lock().await;
        if !on {
            if let Some(handle) = guard.take() {
                handle.abort();
            }
            return;
        }
        if guard.is_some() {
            return;
        }

        let baseline = sqlx::query("SELECT COUNT(*) AS n FROM filenames")
            .fetch_one(&self.pool)
            .await
            .ok()
            .and_then(|row| row.try_get::<i64, _>("n").ok())
            .unwrap_or(0);
        let baseline = Arc::new(AtomicI64::new(baseline));

        let pool = self.pool.clone();
        let handle = tokio::spawn(async move {
            let mut interval = tokio::time::interval(Duration::from_secs(1));
            loop {
                interval.tick().await;
                let probe = sqlx::query("SELECT COUNT(*) AS n FROM filenames")
                    .fetch_one(&pool)
                    .await
                    .ok()
                    .and_then(|row| row.try_get::<i64, _>("n").ok());

                match probe {
                    Some(count) if count == baseline.load(Ordering::Relaxed) => {
                        debug!(count, "keepalive probe ok");
                    }
                    Some(count) => {
                        error!(
                            expected = baseline.load(Ordering::Relaxed),
                            got = count,
                            "keepalive probe detected data loss in memory-mode repository; exiting"
                        );
                        std::process::exit(1);
                    }
                    None => {
                        error!("keepalive probe query failed; exiting");
                        std::process::exit(1);
                    }
                }
            }
        });
        *guard = Some(handle);
    }
}

fn row_to_file_record(row: sqlx::sqlite::SqliteRow) -> FileRecord {
    let attribute_json: String = row.try_get("attribute_json").unwrap_or_default();
    FileRecord {
        masked_filename: row.try_get("masked_filename").unwrap_or_default(),
        original_filename: row.try_get("original_filename").unwrap_or_default(),
        size: row.try_get::<i64, _>("size").unwrap_or(0) as u64,
        touched_at: row.try_get("touched_at").unwrap_or_default(),
        code: row.try_get("code").unwrap_or(1),
        extension: row.try_get("extension").unwrap_or_default(),
        attributes: FileRecord::attributes_from_json(&attribute_json),
        timestamp: row.try_get("timestamp").unwrap_or(0),
    }
}

fn quote_fts_token(token: &str) -> String {
    format!("\"{}\"", token.replace('"', "\"\""))
}

fn build_fts_match_expression(query: &SearchQuery) -> String {
    let terms = query
        .terms
        .iter()
        .map(|t| quote_fts_token(t))
        .collect::<Vec<_>>()
        .join(" AND ");

    if query.exclusions.is_empty() {
        terms
    } else {
        let exclusions = query
            .exclusions
            .iter()
            .map(|t| quote_fts_token(t))
            .collect::<Vec<_>>()
            .join(" OR ");
        format!("({terms}) NOT ({exclusions})")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use soulshare_model::MediaAttribute;

    async fn fresh_repo() -> SqliteShareRepository {
        let repo = SqliteShareRepository::open_memory(&format!(
            "test-{}",
            uuid_like_suffix()
        ))
        .await
        .unwrap();
        repo.create(false).await.unwrap();
        repo
    }

    fn uuid_like_suffix() -> String {
        use std::sync::atomic::{AtomicU64, Ordering};
        static COUNTER: AtomicU64 = AtomicU64::new(0);
        COUNTER.fetch_add(1, Ordering::Relaxed).to_string()
    }

    fn sample_file(name: &str, timestamp: i64) -> FileRecord {
        FileRecord {
            masked_filename: name.to_string(),
            original_filename: format!("/music/{name}"),
            size: 1024,
            touched_at: "2024-01-01T00:00:00Z".to_string(),
            code: 1,
            extension: "mp3".to_string(),
            attributes: vec![MediaAttribute::Length { seconds: 180.0 }],
            timestamp,
        }
    }

    #[tokio::test]
    async fn create_then_validate_is_valid() {
        let repo = fresh_repo().await;
        assert_eq!(repo.try_validate().await, SchemaValidation::Valid);
    }

    #[tokio::test]
    async fn validate_before_create_reports_missing_tables() {
        let repo = SqliteShareRepository::open_memory(&format!("raw-{}", uuid_like_suffix()))
            .await
            .unwrap();
        let validation = repo.try_validate().await;
        assert!(!validation.is_valid());
    }

    #[tokio::test]
    async fn insert_and_find_file_round_trips() {
        let repo = fresh_repo().await;
        let record = sample_file("alias\\a\\song1.mp3", 1000);
        repo.insert_file(&record).await.unwrap();

        let found = repo.find_file_info("alias\\a\\song1.mp3").await.unwrap();
        assert_eq!(found, ("/music/alias\\a\\song1.mp3".to_string(), 1024));
    }

    #[tokio::test]
    async fn insert_file_upserts_on_conflict() {
        let repo = fresh_repo().await;
        let mut record = sample_file("alias\\a\\song1.mp3", 1000);
        repo.insert_file(&record).await.unwrap();
        record.size = 2048;
        record.timestamp = 2000;
        repo.insert_file(&record).await.unwrap();

        assert_eq!(repo.count_files(None).await, 1);
        let found = repo.find_file_info("alias\\a\\song1.mp3").await.unwrap();
        assert_eq!(found.1, 2048);
    }

    #[tokio::test]
    async fn prune_removes_rows_older_than_watermark() {
        let repo = fresh_repo().await;
        repo.insert_file(&sample_file("alias\\old.mp3", 500)).await.unwrap();
        repo.insert_file(&sample_file("alias\\new.mp3", 1500)).await.unwrap();

        let pruned = repo.prune_files(1000).await.unwrap();
        assert_eq!(pruned, 1);
        assert_eq!(repo.count_files(None).await, 1);
        assert!(repo.find_file_info("alias\\new.mp3").await.is_some());
    }

    #[tokio::test]
    async fn search_matches_terms_and_respects_exclusions() {
        let repo = fresh_repo().await;
        repo.insert_file(&sample_file("alias\\Alice - Foo (2001).mp3", 1))
            .await
            .unwrap();
        repo.insert_file(&sample_file("alias\\Bob - Bar.flac", 1))
            .await
            .unwrap();

        let found = repo
            .search(&SearchQuery {
                terms: vec!["foo".to_string()],
                exclusions: vec!["live".to_string()],
            })
            .await;
        assert_eq!(found.len(), 1);
        assert!(found[0].masked_filename.contains("Foo"));

        let excluded = repo
            .search(&SearchQuery {
                terms: vec!["foo".to_string()],
                exclusions: vec!["alice".to_string()],
            })
            .await;
        assert!(excluded.is_empty());

        let bar = repo
            .search(&SearchQuery {
                terms: vec!["bar".to_string()],
                exclusions: vec![],
            })
            .await;
        assert_eq!(bar.len(), 1);
        assert!(bar[0].masked_filename.contains("Bar"));
    }

    #[tokio::test]
    async fn backup_and_restore_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let primary_path = dir.path().join("primary.db");
        let backup_path = dir.path().join("backup.db");

        let primary = SqliteShareRepository::open_disk(&primary_path).await.unwrap();
        primary.create(false).await.unwrap();
        primary
            .insert_file(&sample_file("alias\\song.mp3", 1))
            .await
            .unwrap();
        primary.backup_to(&backup_path).await.unwrap();

        let restored = SqliteShareRepository::open_memory(&format!(
            "restore-target-{}",
            uuid_like_suffix()
        ))
        .await
        .unwrap();
        restored.create(false).await.unwrap();
        restored.restore_from(&backup_path).await.unwrap();

        assert_eq!(restored.count_files(None).await, 1);
    }

    #[tokio::test]
    async fn list_scans_orders_newest_first_and_respects_since() {
        let repo = fresh_repo().await;
        repo.insert_scan(1000, "{}").await.unwrap();
        repo.insert_scan(2000, "{}").await.unwrap();
        repo.insert_scan(3000, "{}").await.unwrap();

        let all = repo.list_scans(None).await;
        assert_eq!(
            all.iter().map(|s| s.started_at).collect::<Vec<_>>(),
            vec![3000, 2000, 1000]
        );

        let recent = repo.list_scans(Some(2000)).await;
        assert_eq!(recent.len(), 2);
    }

    #[tokio::test]
    async fn rebuild_filename_index_repopulates_from_files() {
        let repo = fresh_repo().await;
        repo.insert_file(&sample_file("alias\\song.mp3", 1)).await.unwrap();
        sqlx::query("DELETE FROM filenames")
            .execute(repo.pool())
            .await
            .unwrap();

        let before = repo
            .search(&SearchQuery {
                terms: vec!["song".to_string()],
                exclusions: vec![],
            })
            .await;
        assert!(before.is_empty());

        repo.rebuild_filename_index().await.unwrap();
        let after = repo
            .search(&SearchQuery {
                terms: vec!["song".to_string()],
                exclusions: vec![],
            })
            .await;
        assert_eq!(after.len(), 1);
    }
}
