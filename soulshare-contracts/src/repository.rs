use async_trait::async_trait;
use soulshare_model::{DirectoryRecord, FileRecord, Result, ScanRecord, SearchQuery};
use std::path::Path;

/// Outcome of [`ShareRepository::try_validate`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SchemaValidation {
    Valid,
    Invalid(Vec<String>),
}

impl SchemaValidation {
    pub fn is_valid(&self) -> bool {
        matches!(self, SchemaValidation::Valid)
    }
}

/// Durable, queryable storage for directories, files, the filename token
/// index, and scan records.
///
/// Read methods never return an `Err` on query failure — they log and
/// return an empty/default value, since reads sit on the hot serving path.
/// Write methods propagate errors.
#[async_trait]
pub trait ShareRepository: Send + Sync {
    /// Create the schema. Idempotent unless `discard_existing`, in which
    /// case existing tables are dropped first.
    async fn create(&self, discard_existing: bool) -> Result<()>;

    /// Compare the live schema against what this build expects.
    async fn try_validate(&self) -> SchemaValidation;

    /// Copy this repository's full contents to `dst`, vacuuming the
    /// destination afterward. `dst` must not be a path this repository (or
    /// any other open handle) keeps pooled.
    async fn backup_to(&self, dst: &Path) -> Result<()>;

    /// Replace this repository's contents with `src`'s.
    async fn restore_from(&self, src: &Path) -> Result<()>;

    async fn insert_scan(&self, started_at: i64, options_json: &str) -> Result<()>;
    async fn update_scan(&self, started_at: i64, ended_at: i64) -> Result<()>;
    async fn find_latest_scan(&self) -> Option<ScanRecord>;
    async fn flag_latest_scan_as_suspect(&self) -> Result<()>;
    /// Scan records, newest first, optionally restricted to `startedAt >= since`.
    async fn list_scans(&self, since: Option<i64>) -> Vec<ScanRecord>;

    /// Upsert by primary key; on conflict all non-key columns refresh.
    async fn insert_directory(&self, masked_name: &str, timestamp: i64) -> Result<()>;
    /// Upsert by primary key; on conflict all non-key columns refresh.
    async fn insert_file(&self, file: &FileRecord) -> Result<()>;

    async fn prune_directories(&self, older_than_timestamp: i64) -> Result<u64>;
    async fn prune_files(&self, older_than_timestamp: i64) -> Result<u64>;

    /// Empty then repopulate the token index from `files`.
    async fn rebuild_filename_index(&self) -> Result<()>;

    async fn list_directories(&self, prefix: Option<&str>) -> Vec<DirectoryRecord>;
    async fn list_files(&self, prefix: Option<&str>, include_full_path: bool) -> Vec<FileRecord>;
    async fn count_directories(&self, prefix: Option<&str>) -> u64;
    async fn count_files(&self, prefix: Option<&str>) -> u64;

    /// Resolve a masked filename to `(original_filename, size)`.
    async fn find_file_info(&self, masked_filename: &str) -> Option<(String, u64)>;

    /// Tokenized AND/NOT-OR search over the filename index, plus a
    /// case-insensitive substring safety net on exclusions. Never errors.
    async fn search(&self, query: &SearchQuery) -> Vec<FileRecord>;

    async fn vacuum(&self) -> Result<()>;
    async fn dump_to(&self, path: &Path) -> Result<()>;

    /// Enable or disable the in-memory-mode keepalive probe.
    async fn enable_keepalive(&self, on: bool);
}
