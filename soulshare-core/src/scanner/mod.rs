//! Concurrent filesystem crawler that rebuilds the index.

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::Mutex as SyncMutex;
use regex::Regex;
use soulshare_contracts::options::{ShareOptions, StorageMode};
use soulshare_contracts::repository::ShareRepository;
use soulshare_model::state::SharedFileCacheState;
use soulshare_model::{Host, Share, ShareError};
use soulshare_sync::{ChannelReader, ManagedState};
use tokio::sync::mpsc;
use tokio::sync::Mutex as AsyncMutex;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use walkdir::WalkDir;

use crate::factory::SoulseekFileFactory;

/// Directories the writer fans onto the worker channel.
const CHANNEL_CAPACITY: usize = 1000;

/// Outcome of one [`ShareScanner::scan`] run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScanOutcome {
    Completed,
    Cancelled,
}

/// Concurrent crawler owning the worker pool for one repository. Only
/// one scan may run at a time; a second caller fails fast with
/// [`ShareError::ScanInProgress`].
pub struct ShareScanner {
    repository: Arc<dyn ShareRepository>,
    factory: Arc<SoulseekFileFactory>,
    state: ManagedState<SharedFileCacheState>,
    scan_lock: Arc<AsyncMutex<()>>,
    active_cancel: SyncMutex<Option<CancellationToken>>,
    shutdown: CancellationToken,
}

impl std::fmt::Debug for ShareScanner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ShareScanner")
            .field("state", &self.state.current_value())
            .finish()
    }
}

impl ShareScanner {
    pub fn new(
        repository: Arc<dyn ShareRepository>,
        factory: Arc<SoulseekFileFactory>,
        shutdown: CancellationToken,
    ) -> Self {
        Self {
            repository,
            factory,
            state: ManagedState::new(SharedFileCacheState::default()),
            scan_lock: Arc::new(AsyncMutex::new(())),
            active_cancel: SyncMutex::new(None),
            shutdown,
        }
    }

    pub fn state(&self) -> &ManagedState<SharedFileCacheState> {
        &self.state
    }

    /// Cancels the in-flight scan, if any. Returns `false` when idle.
    pub fn try_cancel(&self) -> bool {
        match self.active_cancel.lock().as_ref() {
            Some(token) => {
                token.cancel();
                true
            }
            None => false,
        }
    }

    /// Runs the full crawl-and-index algorithm.
    pub async fn scan(
        &self,
        host: &Host,
        options: &ShareOptions,
    ) -> soulshare_model::Result<ScanOutcome> {
        let guard = self
            .scan_lock
            .clone()
            .try_lock_owned()
            .map_err(|_| ShareError::ScanInProgress)?;

        let cancel_token = self.shutdown.child_token();
        *self.active_cancel.lock() = Some(cancel_token.clone());
        let result = self.run_scan(host, options, &cancel_token).await;
        *self.active_cancel.lock() = None;
        drop(guard);
        result
    }

    async fn run_scan(
        &self,
        host: &Host,
        options: &ShareOptions,
        cancel_token: &CancellationToken,
    ) -> soulshare_model::Result<ScanOutcome> {
        self.state.set_value(Box::new(|_| SharedFileCacheState::filling_started()));

        if !self.repository.try_validate().await.is_valid() {
            warn!("repository schema invalid before scan; recreating");
            self.repository.create(true).await?;
        }

        let filters = compile_filters(&options.filters);

        let started_at = now_millis();
        self.repository
            .insert_scan(started_at, &options_json(options))
            .await?;

        let (directories, excluded_count) = match self.discover_directories(host) {
            Ok(result) => result,
            Err(err) => {
                self.state.set_value(Box::new(|_| SharedFileCacheState::faulted()));
                return Err(err);
            }
        };

        self.state.set_value(Box::new({
            let directory_count = directories.len() as u64;
            move |prev| SharedFileCacheState {
                directories: directory_count,
                excluded_directories: excluded_count,
                ..*prev
            }
        }));
        info!(
            directories = directories.len(),
            excluded = excluded_count,
            "scan discovery complete"
        );

        let (tx, rx) = mpsc::channel::<PathBuf>(CHANNEL_CAPACITY);
        let receiver = Arc::new(AsyncMutex::new(rx));

        let total_dirs = directories.len() as u64;
        let processed = Arc::new(AtomicU64::new(0));
        let files_inserted = Arc::new(AtomicU64::new(0));
        let worker_count = options.scanner_workers.max(1);
        let filters = Arc::new(filters);

        let mut readers = Vec::with_capacity(worker_count);
        for i in 0..worker_count {
            let repository = self.repository.clone();
            let factory = self.factory.clone();
            let host = host.clone();
            let filters = filters.clone();
            let state = self.state.clone();
            let processed = processed.clone();
            let files_inserted = files_inserted.clone();

            let reader = Arc::new(ChannelReader::new(
                format!("share-scan-worker-{i}"),
                receiver.clone(),
                move |dir: PathBuf| {
                    let repository = repository.clone();
                    let factory = factory.clone();
                    let host = host.clone();
                    let filters = filters.clone();
                    let state = state.clone();
                    let processed = processed.clone();
                    let files_inserted = files_inserted.clone();
                    async move {
                        let file_count = process_directory(
                            &repository,
                            &factory,
                            &host,
                            &filters,
                            &dir,
                            started_at,
                        )
                        .await;

                        let processed_now = processed.fetch_add(1, Ordering::Relaxed) + 1;
                        let files_now = files_inserted.fetch_add(file_count, Ordering::Relaxed) + file_count;
                        state.set_value(Box::new(move |prev| SharedFileCacheState {
                            fill_progress: processed_now as f32 / total_dirs.max(1) as f32,
                            files: files_now,
                            ..*prev
                        }));
                        Ok(())
                    }
                },
            ));
            reader.start().await;
            readers.push(reader);
        }

        let writer_tx = tx;
        let writer_cancel = cancel_token.clone();
        let writer = tokio::spawn(async move {
            for dir in directories {
                tokio::select! {
                    _ = writer_cancel.cancelled() => break,
                    res = writer_tx.send(dir) => {
                        if res.is_err() {
                            break;
                        }
                    }
                }
            }
        });

        let _ = writer.await;
        for reader in &readers {
            reader.completed().await;
        }

        let cancelled = cancel_token.is_cancelled();

        if !cancelled {
            self.repository.prune_files(started_at).await?;
            self.repository.prune_directories(started_at).await?;
        }

        let final_directories = self.repository.count_directories(None).await;
        let final_files = self.repository.count_files(None).await;
        self.repository
            .update_scan(started_at, now_millis())
            .await?;

        if cancelled {
            self.state.set_value(Box::new(move |_| {
                SharedFileCacheState::cancelled(final_directories, final_files, excluded_count)
            }));
            debug!(started_at, "scan cancelled");
            Ok(ScanOutcome::Cancelled)
        } else {
            self.state.set_value(Box::new(move |prev| SharedFileCacheState {
                filling: false,
                filled: true,
                fill_progress: 1.0,
                directories: final_directories,
                files: final_files,
                ..*prev
            }));
            info!(started_at, final_directories, final_files, "scan complete");
            Ok(ScanOutcome::Completed)
        }
    }

    /// Produces the deduplicated union `D` of reachable subdirectories under
    /// every included share, minus anything under an excluded share.
    fn discover_directories(
        &self,
        host: &Host,
    ) -> soulshare_model::Result<(Vec<PathBuf>, u64)> {
        let mut discovered: HashSet<PathBuf> = HashSet::new();
        for share in host.included_shares() {
            walk_directories(&share.local_path, &mut discovered);
        }

        let excluded_roots: Vec<&Share> = host.excluded_shares().collect();
        let mut excluded_count: u64 = 0;
        let directories: Vec<PathBuf> = discovered
            .into_iter()
            .filter(|dir| {
                let under_excluded = excluded_roots.iter().any(|s| dir.starts_with(&s.local_path));
                if under_excluded {
                    excluded_count += 1;
                }
                !under_excluded
            })
            .collect();

        let mut directories = directories;
        directories.sort();
        Ok((directories, excluded_count))
    }
}

fn walk_directories(root: &Path, into: &mut HashSet<PathBuf>) {
    let walker = WalkDir::new(root).follow_links(false).into_iter();
    for entry in walker.filter_entry(|e| e.depth() == 0 || !is_hidden(e)) {
        match entry {
            Ok(entry) => {
                if entry.file_type().is_dir() {
                    into.insert(entry.into_path());
                }
            }
            Err(err) => {
                warn!(root = %root.display(), error = %err, "directory discovery skipped an unreadable entry");
            }
        }
    }
}

fn is_hidden(entry: &walkdir::DirEntry) -> bool {
    entry
        .file_name()
        .to_str()
        .map(|name| name.starts_with('.'))
        .unwrap_or(false)
}

fn compile_filters(patterns: &[String]) -> Vec<Regex> {
    patterns
        .iter()
        .filter_map(|pattern| match Regex::new(pattern) {
            Ok(re) => Some(re),
            Err(err) => {
                warn!(pattern, error = %err, "skipping invalid filter regex");
                None
            }
        })
        .collect()
}

/// Processes one directory: upserts the directory row, enumerates its
/// files non-recursively, and upserts each accepted file. Returns the
/// number of files inserted. All errors are logged and swallowed -- a bad
/// directory is skipped, not fatal to the scan.
async fn process_directory(
    repository: &Arc<dyn ShareRepository>,
    factory: &SoulseekFileFactory,
    host: &Host,
    filters: &[Regex],
    dir: &Path,
    timestamp: i64,
) -> u64 {
    let Some(share) = host.owning_share(dir) else {
        warn!(dir = %dir.display(), "no owning share for directory, skipping");
        return 0;
    };

    let relative = dir.strip_prefix(&share.local_path).unwrap_or(dir);
    let masked_dir = soulshare_model::masking::join_masked(&share.remote_path, relative);
    if let Err(err) = repository.insert_directory(&masked_dir, timestamp).await {
        warn!(dir = %dir.display(), error = %err, "failed to upsert directory, skipping");
        return 0;
    }

    let entries = match std::fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(err) => {
            warn!(dir = %dir.display(), error = %err, "failed to enumerate directory, skipping");
            return 0;
        }
    };

    let mut inserted = 0u64;
    for entry in entries {
        let entry = match entry {
            Ok(entry) => entry,
            Err(err) => {
                warn!(dir = %dir.display(), error = %err, "failed to read directory entry, skipping");
                continue;
            }
        };

        let file_type = match entry.file_type() {
            Ok(ft) => ft,
            Err(_) => continue,
        };
        if !file_type.is_file() {
            continue;
        }

        let file_name = entry.file_name();
        let name = file_name.to_string_lossy();
        if name.starts_with('.') {
            continue;
        }
        if filters.iter().any(|re| re.is_match(&name)) {
            continue;
        }

        let path = entry.path();
        let record = match factory.build(&path, &share.local_path, &share.remote_path, timestamp) {
            Ok(record) => record,
            Err(err) => {
                warn!(file = %path.display(), error = %err, "failed to build file record, skipping");
                continue;
            }
        };

        if let Err(err) = repository.insert_file(&record).await {
            warn!(file = %path.display(), error = %err, "failed to upsert file, skipping");
            continue;
        }
        inserted += 1;
    }

    inserted
}

fn now_millis() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

fn options_json(options: &ShareOptions) -> String {
    serde_json::json!({
        "share_roots": options.share_roots,
        "filters": options.filters,
        "storage_mode": match options.storage_mode {
            StorageMode::Disk => "disk",
            StorageMode::Memory => "memory",
        },
        "scanner_workers": options.scanner_workers,
        "instance_name": options.instance_name,
    })
    .to_string()
}
