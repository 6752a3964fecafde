//! End-to-end scenarios exercising [`ShareScanner`]/[`ShareService`] through
//! their public API only, against a real SQLite-backed repository.

use std::fs;
use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use soulshare_contracts::options::{OptionsSource, ShareOptions, StorageMode};
use soulshare_contracts::repository::ShareRepository;
use soulshare_core::factory::SoulseekFileFactory;
use soulshare_core::repository::SqliteShareRepository;
use soulshare_core::scanner::ScanOutcome;
use soulshare_core::service::ShareService;
use soulshare_core::ShareScanner;
use soulshare_model::{Host, SearchQuery, Share};
use tempfile::tempdir;
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;

static TEST_COUNTER: AtomicU64 = AtomicU64::new(0);

fn unique_name(label: &str) -> String {
    let n = TEST_COUNTER.fetch_add(1, Ordering::Relaxed);
    format!("{label}-{n}")
}

fn options_for(roots: Vec<&str>, filters: Vec<&str>) -> ShareOptions {
    ShareOptions {
        share_roots: roots.into_iter().map(String::from).collect(),
        filters: filters.into_iter().map(String::from).collect(),
        storage_mode: StorageMode::Memory,
        scanner_workers: 2,
        instance_name: "local".to_string(),
    }
}

async fn fresh_scanner() -> (ShareScanner, Arc<dyn ShareRepository>) {
    let repo = SqliteShareRepository::open_memory(&unique_name("scanner-test"))
        .await
        .unwrap();
    repo.create(false).await.unwrap();
    let repository: Arc<dyn ShareRepository> = Arc::new(repo);
    let factory = Arc::new(SoulseekFileFactory::default());
    let scanner = ShareScanner::new(repository.clone(), factory, CancellationToken::new());
    (scanner, repository)
}

struct FixedOptionsSource {
    sender: watch::Sender<ShareOptions>,
}

impl FixedOptionsSource {
    fn new(options: ShareOptions) -> Arc<Self> {
        let (sender, _) = watch::channel(options);
        Arc::new(Self { sender })
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
    let name = unique_name("svc");
    let primary = SqliteShareRepository::open_memory(&format!("{name}-primary"))
        .await
        .unwrap();
    primary.create(false).await.unwrap();
    let backup = SqliteShareRepository::open_memory(&format!("{name}-backup"))
        .await
        .unwrap();
    backup.create(false).await.unwrap();

    let options = options_for(vec![&root.to_string_lossy()], vec![]);

    Arc::new(ShareService::new(
        Arc::new(primary),
        Arc::new(backup),
        std::env::temp_dir().join(format!("{name}-backup.db")),
        Arc::new(SoulseekFileFactory::default()),
        FixedOptionsSource::new(options),
        CancellationToken::new(),
    ))
}

/// Scenario 1 — basic scan.
#[tokio::test]
async fn basic_scan_indexes_nested_files() {
    let dir = tempdir().unwrap();
    let music = dir.path().join("music");
    fs::create_dir_all(music.join("a")).unwrap();
    fs::write(music.join("a/song1.mp3"), vec![0u8; 1024]).unwrap();
    fs::write(music.join("a/song2.flac"), vec![0u8; 2048]).unwrap();

    let mut host = Host::new("local");
    host.set_shares(vec![Share::parse(&music.to_string_lossy())]);

    let (scanner, repository) = fresh_scanner().await;
    let options = options_for(vec![&music.to_string_lossy()], vec![]);
    let outcome = scanner.scan(&host, &options).await.unwrap();
    assert_eq!(outcome, ScanOutcome::Completed);

    assert_eq!(repository.count_files(None).await, 2);
    assert_eq!(repository.count_directories(None).await, 2);

    let alias = &host.shares[0].alias;
    let info = repository
        .find_file_info(&format!("{alias}\\a\\song1.mp3"))
        .await;
    assert_eq!(info.unwrap().1, 1024);
}

/// Scenario 2 — exclusion.
#[tokio::test]
async fn excluded_subdirectory_is_skipped_and_unresolvable() {
    let dir = tempdir().unwrap();
    let root = dir.path().join("m");
    fs::create_dir_all(root.join("x")).unwrap();
    fs::write(root.join("keep.mp3"), vec![0u8; 10]).unwrap();
    fs::write(root.join("x/skip.mp3"), vec![0u8; 10]).unwrap();

    let mut host = Host::new("local");
    host.set_shares(vec![
        Share::parse(&root.to_string_lossy()),
        Share::parse(&format!("-{}", root.join("x").to_string_lossy())),
    ]);

    let (scanner, repository) = fresh_scanner().await;
    let options = options_for(
        vec![
            &root.to_string_lossy(),
            &format!("-{}", root.join("x").to_string_lossy()),
        ],
        vec![],
    );
    scanner.scan(&host, &options).await.unwrap();

    assert_eq!(repository.count_files(None).await, 1);
    let alias = &host.shares.iter().find(|s| !s.is_excluded).unwrap().alias;
    assert!(repository
        .find_file_info(&format!("{alias}\\keep.mp3"))
        .await
        .is_some());
    assert!(repository
        .find_file_info(&format!("{alias}\\x\\skip.mp3"))
        .await
        .is_none());

    let state = scanner.state().current_value();
    assert!(state.excluded_directories >= 1);
}

/// Scenario 3 — filter regex.
#[tokio::test]
async fn filter_regex_excludes_matching_filenames() {
    let dir = tempdir().unwrap();
    let root = dir.path().join("m");
    fs::create_dir_all(&root).unwrap();
    fs::write(root.join("a.mp3"), vec![0u8; 5]).unwrap();
    fs::write(root.join("b.nfo"), vec![0u8; 5]).unwrap();

    let mut host = Host::new("local");
    host.set_shares(vec![Share::parse(&root.to_string_lossy())]);

    let (scanner, repository) = fresh_scanner().await;
    let options = options_for(vec![&root.to_string_lossy()], vec![r"\.nfo$"]);
    scanner.scan(&host, &options).await.unwrap();

    assert_eq!(repository.count_files(None).await, 1);
}

/// Scenario 4 — cancel mid-scan.
#[tokio::test]
async fn cancel_mid_scan_skips_prune_and_reports_cancelled() {
    let dir = tempdir().unwrap();
    let root = dir.path().join("m");
    for i in 0..50 {
        let sub = root.join(format!("d{i}"));
        fs::create_dir_all(&sub).unwrap();
        fs::write(sub.join("f.mp3"), vec![0u8; 4]).unwrap();
    }

    let mut host = Host::new("local");
    host.set_shares(vec![Share::parse(&root.to_string_lossy())]);

    let (scanner, _repository) = fresh_scanner().await;
    let options = options_for(vec![&root.to_string_lossy()], vec![]);

    let scanner = Arc::new(scanner);
    let cancel_soon = {
        let scanner = scanner.clone();
        tokio::spawn(async move {
            tokio::time::sleep(std::time::Duration::from_millis(1)).await;
            scanner.try_cancel();
        })
    };
    let outcome = scanner.scan(&host, &options).await.unwrap();
    let _ = cancel_soon.await;

    // Either outcome is acceptable depending on scheduling, but the
    // state must never report Filled when cancellation took.
    if outcome == ScanOutcome::Cancelled {
        assert!(scanner.state().current_value().cancelled);
    }
}

/// Scenario 5 — search tokens.
#[tokio::test]
async fn search_tokens_match_after_scan() {
    let dir = tempdir().unwrap();
    let root = dir.path().join("m");
    fs::create_dir_all(&root).unwrap();
    fs::write(root.join("Alice - Foo (2001).mp3"), vec![0u8; 4]).unwrap();
    fs::write(root.join("Bob - Bar.flac"), vec![0u8; 4]).unwrap();

    let mut host = Host::new("local");
    host.set_shares(vec![Share::parse(&root.to_string_lossy())]);

    let (scanner, repository) = fresh_scanner().await;
    let options = options_for(vec![&root.to_string_lossy()], vec![]);
    scanner.scan(&host, &options).await.unwrap();

    let foo = repository
        .search(&SearchQuery::new(vec!["foo".into()], vec!["live".into()]))
        .await;
    assert_eq!(foo.len(), 1);

    let foo_excluded = repository
        .search(&SearchQuery::new(vec!["foo".into()], vec!["alice".into()]))
        .await;
    assert!(foo_excluded.is_empty());

    let bar = repository.search(&SearchQuery::terms_only(["bar"])).await;
    assert_eq!(bar.len(), 1);
}

/// Scenario 6 — resolve with a file missing on disk.
#[tokio::test]
async fn resolve_missing_file_flags_suspect_and_sets_scan_pending() {
    let dir = tempdir().unwrap();
    fs::create_dir_all(&dir).unwrap();
    fs::write(dir.path().join("song.mp3"), vec![0u8; 4]).unwrap();

    let service = new_service(dir.path()).await;
    service.initialize(true).await.unwrap();

    let alias = service.try_get_host("local").unwrap().shares[0].alias.clone();
    let masked = format!("{alias}\\song.mp3");
    fs::remove_file(dir.path().join("song.mp3")).unwrap();

    let result = service.resolve_file(&masked).await;
    assert!(result.is_err());
    assert!(service.state().current_value().scan_pending);

    let latest = service.list_scans(None).await;
    assert!(latest[0].suspect);
}
