//! Facade/orchestrator: owns hosts, reacts to configuration, drives
//! initialization and scans, serves reads.

use std::collections::HashMap;
use std::hash::Hasher;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use parking_lot::Mutex as SyncMutex;
use soulshare_contracts::options::{OptionsSource, ShareOptions, StorageMode};
use soulshare_contracts::repository::ShareRepository;
use soulshare_model::masking::to_wire_separators;
use soulshare_model::state::ShareState;
use soulshare_model::{DirectoryRecord, FileRecord, Host, ScanRecord, SearchQuery, Share, ShareError};
use soulshare_sync::ManagedState;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use twox_hash::XxHash64;

use crate::factory::SoulseekFileFactory;
use crate::scanner::{ScanOutcome, ShareScanner};

const CONFIG_HASH_SEED: u64 = 0x5348_4152_4553_5652; // "SHARESVR" folded into 8 bytes

/// Files grouped under one directory, as returned by [`ShareService::browse`]
/// and [`ShareService::list_directory`].
#[derive(Debug, Clone, PartialEq)]
pub struct BrowseEntry {
    pub directory: DirectoryRecord,
    pub files: Vec<FileRecord>,
}

/// Public contract for callers of the shared-file index.
pub struct ShareService {
    primary: Arc<dyn ShareRepository>,
    backup: Arc<dyn ShareRepository>,
    backup_path: PathBuf,
    hosts: SyncMutex<HashMap<String, Host>>,
    local_host_name: String,
    scanner: ShareScanner,
    state: ManagedState<ShareState>,
    options_source: Arc<dyn OptionsSource>,
    config_hash: SyncMutex<Option<u64>>,
    config_lock: SyncMutex<()>,
}

impl std::fmt::Debug for ShareService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ShareService")
            .field("state", &self.state.current_value())
            .finish()
    }
}

impl ShareService {
    pub fn new(
        primary: Arc<dyn ShareRepository>,
        backup: Arc<dyn ShareRepository>,
        backup_path: PathBuf,
        factory: Arc<SoulseekFileFactory>,
        options_source: Arc<dyn OptionsSource>,
        shutdown: CancellationToken,
    ) -> Self {
        let local_host_name = options_source.current().instance_name;
        let mut hosts = HashMap::new();
        hosts.insert(local_host_name.clone(), Host::new(local_host_name.clone()));

        Self {
            scanner: ShareScanner::new(primary.clone(), factory, shutdown),
            primary,
            backup,
            backup_path,
            hosts: SyncMutex::new(hosts),
            local_host_name,
            state: ManagedState::new(ShareState::default()),
            options_source,
            config_hash: SyncMutex::new(None),
            config_lock: SyncMutex::new(()),
        }
    }

    pub fn state(&self) -> &ManagedState<ShareState> {
        &self.state
    }

    pub fn scanner_state(&self) -> &ManagedState<soulshare_model::state::SharedFileCacheState> {
        self.scanner.state()
    }

    /// Applies the current options to the local host, then runs the
    /// initialization decision tree.
    pub async fn initialize(&self, force_rescan: bool) -> soulshare_model::Result<()> {
        self.apply_configuration(&self.options_source.current());

        match self.try_initialize_once(force_rescan).await {
            Ok(()) => Ok(()),
            Err(_) if !force_rescan => {
                warn!("initialization failed, retrying with a forced rescan");
                self.try_initialize_once(true).await
            }
            Err(err) => Err(err),
        }
    }

    async fn try_initialize_once(&self, force_rescan: bool) -> soulshare_model::Result<()> {
        let options = self.options_source.current();

        if force_rescan {
            self.scan().await?;
        } else {
            match options.storage_mode {
                StorageMode::Memory => {
                    if self.backup.try_validate().await.is_valid() {
                        self.primary.restore_from(&self.backup_path).await?;
                    } else {
                        return Err(ShareError::ShareInitialization(
                            "memory-mode backup failed validation".to_string(),
                        ));
                    }
                }
                StorageMode::Disk => {
                    if self.primary.try_validate().await.is_valid() {
                        // already valid, nothing to restore
                    } else if self.backup.try_validate().await.is_valid() {
                        self.primary.restore_from(&self.backup_path).await?;
                    } else {
                        return Err(ShareError::ShareInitialization(
                            "neither primary nor backup repository validated".to_string(),
                        ));
                    }
                }
            }
        }

        if options.storage_mode == StorageMode::Memory {
            self.primary.enable_keepalive(true).await;
        }

        let directories = self.primary.count_directories(None).await;
        let files = self.primary.count_files(None).await;
        self.state.set_value(Box::new(move |_| ShareState {
            ready: true,
            scanning: false,
            faulted: false,
            cancelled: false,
            scan_pending: false,
            scan_progress: 1.0,
            directories,
            files,
        }));
        info!("share service initialized");
        Ok(())
    }

    /// Runs a scan against the local host's shares and, on success, backs
    /// the primary repository up to the backup path.
    pub async fn scan(&self) -> soulshare_model::Result<ScanOutcome> {
        let options = self.options_source.current();
        let host = self
            .hosts
            .lock()
            .get(&self.local_host_name)
            .cloned()
            .unwrap_or_else(|| Host::new(self.local_host_name.clone()));

        self.state.set_value(Box::new(|prev| ShareState {
            scanning: true,
            faulted: false,
            cancelled: false,
            ..*prev
        }));

        let outcome = self.scanner.scan(&host, &options).await;

        match &outcome {
            Ok(ScanOutcome::Completed) => {
                let directories = self.primary.count_directories(None).await;
                let files = self.primary.count_files(None).await;
                self.state.set_value(Box::new(move |_| ShareState {
                    ready: true,
                    scanning: false,
                    faulted: false,
                    cancelled: false,
                    scan_pending: false,
                    scan_progress: 1.0,
                    directories,
                    files,
                }));
                if let Err(err) = self.primary.backup_to(&self.backup_path).await {
                    warn!(error = %err, "post-scan backup failed");
                }
            }
            Ok(ScanOutcome::Cancelled) => {
                self.state.set_value(Box::new(|prev| ShareState {
                    scanning: false,
                    cancelled: true,
                    ..*prev
                }));
            }
            Err(ShareError::ScanInProgress) => {
                // a scan was already running; leave the existing state alone
            }
            Err(_) => {
                self.state.set_value(Box::new(|prev| ShareState {
                    scanning: false,
                    faulted: true,
                    ..*prev
                }));
            }
        }

        outcome
    }

    pub fn try_cancel_scan(&self) -> bool {
        self.scanner.try_cancel()
    }

    /// Lists every known directory (optionally restricted to one share's
    /// subtree) with its direct files. Directories with no files are still
    /// returned.
    pub async fn browse(&self, share: Option<&str>) -> Vec<BrowseEntry> {
        let prefix = share.map(|s| s.to_string());
        let directories = self.primary.list_directories(prefix.as_deref()).await;
        let mut entries = Vec::with_capacity(directories.len());
        for directory in directories {
            let files = self.direct_files(&directory.masked_name).await;
            entries.push(BrowseEntry { directory, files });
        }
        entries
    }

    /// Files within exactly one directory, not recursive.
    pub async fn list_directory(&self, masked_directory: &str) -> Vec<FileRecord> {
        self.direct_files(masked_directory).await
    }

    async fn direct_files(&self, masked_directory: &str) -> Vec<FileRecord> {
        let prefix = format!("{masked_directory}\\");
        self.primary
            .list_files(Some(&prefix), false)
            .await
            .into_iter()
            .filter(|f| !f.masked_filename[prefix.len()..].contains('\\'))
            .collect()
    }

    /// Delegates to the repository; masked filenames are normalized to
    /// backslash separators.
    pub async fn search(&self, query: &SearchQuery) -> Vec<FileRecord> {
        let mut results = self.primary.search(query).await;
        for file in &mut results {
            file.masked_filename = to_wire_separators(&file.masked_filename);
        }
        results
    }

    /// Resolves a masked filename to its local path and size. Flags the
    /// latest scan suspect and requests a rescan if the backing file is
    /// missing from disk.
    pub async fn resolve_file(&self, masked_filename: &str) -> soulshare_model::Result<(String, u64)> {
        let Some((local_filename, size)) = self.primary.find_file_info(masked_filename).await else {
            return Err(ShareError::NotFound(masked_filename.to_string()));
        };

        if !Path::new(&local_filename).exists() {
            self.state.set_value(Box::new(|prev| ShareState {
                scan_pending: true,
                ..*prev
            }));
            let _ = self.primary.flag_latest_scan_as_suspect().await;
            return Err(ShareError::NotFound(masked_filename.to_string()));
        }

        Ok((local_filename, size))
    }

    /// Prefix counts of directories and files for `share`.
    pub async fn summarize_share(&self, share: &str) -> (u64, u64) {
        let directories = self.primary.count_directories(Some(share)).await;
        let files = self.primary.count_files(Some(share)).await;
        (directories, files)
    }

    pub fn add_or_update_host(&self, host: Host) {
        self.hosts.lock().insert(host.name.clone(), host);
    }

    pub fn try_get_host(&self, name: &str) -> Option<Host> {
        self.hosts.lock().get(name).cloned()
    }

    pub fn try_remove_host(&self, name: &str) -> bool {
        self.hosts.lock().remove(name).is_some()
    }

    pub async fn list_scans(&self, since: Option<i64>) -> Vec<ScanRecord> {
        self.primary.list_scans(since).await
    }

    /// Spawns a background task that applies every configuration change
    /// published by the options source.
    pub fn spawn_configuration_watcher(self: &Arc<Self>) -> tokio::task::JoinHandle<()> {
        let service = self.clone();
        let mut receiver = self.options_source.subscribe();
        tokio::spawn(async move {
            while receiver.changed().await.is_ok() {
                let options = receiver.borrow().clone();
                service.apply_configuration(&options);
            }
        })
    }

    /// Configuration-change handling: recomputes the normalized share hash,
    /// and if it changed, rebuilds the local host's share list and marks a
    /// rescan pending. Serialized so the update is atomic from the service's
    /// perspective.
    fn apply_configuration(&self, options: &ShareOptions) {
        let _guard = self.config_lock.lock();

        let normalized = normalize_share_roots(&options.share_roots);
        let hash = hash_share_roots(&normalized);

        if *self.config_hash.lock() == Some(hash) {
            return;
        }

        let shares: Vec<Share> = normalized.iter().map(|s| Share::parse(s)).collect();
        {
            let mut hosts = self.hosts.lock();
            let host = hosts
                .entry(self.local_host_name.clone())
                .or_insert_with(|| Host::new(self.local_host_name.clone()));
            host.set_shares(shares);
        }
        *self.config_hash.lock() = Some(hash);

        self.state.set_value(Box::new(|prev| ShareState {
            scan_pending: true,
            ..*prev
        }));
        info!("share configuration changed, scan pending");
    }
}

fn normalize_share_roots(roots: &[String]) -> Vec<String> {
    let mut seen = std::collections::HashSet::new();
    let mut normalized = Vec::with_capacity(roots.len());
    for root in roots {
        let trimmed = root.trim().trim_end_matches(['/', '\\']).to_string();
        if seen.insert(trimmed.clone()) {
            normalized.push(trimmed);
        }
    }
    normalized
}

fn hash_share_roots(normalized: &[String]) -> u64 {
    let mut hasher = XxHash64::with_seed(CONFIG_HASH_SEED);
    for root in normalized {
        hasher.write(root.as_bytes());
        hasher.write_u8(0);
    }
    hasher.finish()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::repository::SqliteShareRepository;
    use std::fs;
    use std::sync::atomic::{AtomicU64, Ordering};
    use tempfile::tempdir;
    use tokio::sync::watch;

    static TEST_COUNTER: AtomicU64 = AtomicU64::new(0);

    struct FixedOptionsSource {
        sender: watch::Sender<ShareOptions>,
    }

    impl FixedOptionsSource {
        fn new(options: ShareOptions) -> Arc<Self> {
            let (sender, _) = watch::channel(options);
            Arc::new(Self { sender })
        }

        fn publish(&self, options: ShareOptions) {
            let _ = self.sender.send(options);
        }
    }

    impl OptionsSource for FixedOptionsSource {
        fn current(&self) -> ShareOptions {
            self.sender.borrow().clone()
        }

        fn subscribe(&self) -> watch::Receiver<ShareOptions> {
            self.sender.subscribe()
        }
    }

    async fn new_service(root: &Path) -> Arc<ShareService> {
        let n = TEST_COUNTER.fetch_add(1, Ordering::Relaxed);
        let primary = SqliteShareRepository::open_memory(&format!("svc-primary-{n}"))
            .await
            .unwrap();
        primary.create(false).await.unwrap();
        let backup = SqliteShareRepository::open_memory(&format!("svc-backup-{n}"))
            .await
            .unwrap();
        backup.create(false).await.unwrap();

        let options = ShareOptions {
            share_roots: vec![root.to_string_lossy().into_owned()],
            filters: vec![],
            storage_mode: StorageMode::Memory,
            scanner_workers: 2,
            instance_name: "local".to_string(),
        };

        Arc::new(ShareService::new(
            Arc::new(primary),
            Arc::new(backup),
            std::env::temp_dir().join(format!("svc-backup-{n}.db")),
            Arc::new(SoulseekFileFactory::default()),
            FixedOptionsSource::new(options),
            CancellationToken::new(),
        ))
    }

    #[tokio::test]
    async fn scan_then_browse_and_resolve() {
        let dir = tempdir().unwrap();
        fs::create_dir_all(dir.path().join("a")).unwrap();
        fs::write(dir.path().join("a/song1.mp3"), vec![0u8; 1024]).unwrap();

        let service = new_service(dir.path()).await;
        service.apply_configuration(&service.options_source.current());
        service.scan().await.unwrap();

        let alias = service.try_get_host("local").unwrap().shares[0].alias.clone();
        let entries = service.browse(None).await;
        assert!(entries.iter().any(|e| e.directory.masked_name == alias));
        let root_entry = entries
            .iter()
            .find(|e| e.directory.masked_name == format!("{alias}\\a"))
            .unwrap();
        assert_eq!(root_entry.files.len(), 1);

        let masked = format!("{alias}\\a\\song1.mp3");
        let (local, size) = service.resolve_file(&masked).await.unwrap();
        assert_eq!(size, 1024);
        assert!(Path::new(&local).exists());
    }

    #[tokio::test]
    async fn configuration_change_is_idempotent_on_repeat() {
        let dir = tempdir().unwrap();
        fs::create_dir_all(&dir).unwrap();
        let service = new_service(dir.path()).await;

        service.apply_configuration(&service.options_source.current());
        let shares_after_first = service.try_get_host("local").unwrap().shares.len();
        service.apply_configuration(&service.options_source.current());
        let shares_after_second = service.try_get_host("local").unwrap().shares.len();

        assert_eq!(shares_after_first, shares_after_second);
        assert_eq!(shares_after_first, 1);
    }

    #[tokio::test]
    async fn add_get_remove_host_round_trips() {
        let dir = tempdir().unwrap();
        let service = new_service(dir.path()).await;

        service.add_or_update_host(Host::new("remote-peer"));
        assert!(service.try_get_host("remote-peer").is_some());
        assert!(service.try_remove_host("remote-peer"));
        assert!(service.try_get_host("remote-peer").is_none());
    }
}
