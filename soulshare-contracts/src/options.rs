/// Where the cache/repository should live.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum StorageMode {
    /// Durable on-disk database; survives restarts on its own.
    #[default]
    Disk,
    /// In-memory database; requires keepalive and a disk-backed backup to
    /// survive restarts.
    Memory,
}

/// Snapshot of the operator-declared configuration the share subsystem
/// reacts to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShareOptions {
    /// Raw share directory strings, as configured (e.g. `"[Music]/srv/music"`
    /// or `"-/srv/incoming"`); parsed by [`soulshare_model::Share::parse`].
    pub share_roots: Vec<String>,
    /// Regex source strings; any matching filename is excluded from a scan.
    pub filters: Vec<String>,
    pub storage_mode: StorageMode,
    /// Scanner worker pool size, typically 2-8.
    pub scanner_workers: usize,
    pub instance_name: String,
}

impl Default for ShareOptions {
    fn default() -> Self {
        Self {
            share_roots: Vec::new(),
            filters: Vec::new(),
            storage_mode: StorageMode::Disk,
            scanner_workers: 4,
            instance_name: "default".to_string(),
        }
    }
}

/// Contract for the options/configuration collaborator.
///
/// Out of scope for this workspace beyond this trait: `soulshare-cli`
/// provides one concrete, env/TOML-backed implementation for
/// demonstration; production configuration loading is an external
/// concern.
pub trait OptionsSource: Send + Sync {
    fn current(&self) -> ShareOptions;

    /// Subscribe to configuration changes; the receiver yields the new
    /// options whenever [`OptionsSource::current`] would return something
    /// different.
    fn subscribe(&self) -> tokio::sync::watch::Receiver<ShareOptions>;
}
