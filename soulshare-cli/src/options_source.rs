//! Static, file-loaded [`OptionsSource`].
//!
//! Reads a TOML document once at startup and never watches it again; the
//! returned `subscribe()` receiver only ever yields the value it was
//! constructed with. Live reload is an external concern.

use std::path::Path;

use serde::Deserialize;
use soulshare_contracts::options::{OptionsSource, ShareOptions, StorageMode};
use tokio::sync::watch;

#[derive(Debug, Deserialize)]
struct TomlConfig {
    #[serde(default)]
    share_roots: Vec<String>,
    #[serde(default)]
    filters: Vec<String>,
    #[serde(default)]
    storage_mode: TomlStorageMode,
    #[serde(default = "default_scanner_workers")]
    scanner_workers: usize,
    instance_name: String,
}

fn default_scanner_workers() -> usize {
    4
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
enum TomlStorageMode {
    #[default]
    Disk,
    Memory,
}

impl From<TomlStorageMode> for StorageMode {
    fn from(mode: TomlStorageMode) -> Self {
        match mode {
            TomlStorageMode::Disk => StorageMode::Disk,
            TomlStorageMode::Memory => StorageMode::Memory,
        }
    }
}

/// Loads [`ShareOptions`] from a TOML file once and hands out a
/// never-changing [`watch`] channel around it.
#[derive(Debug)]
pub struct TomlOptionsSource {
    sender: watch::Sender<ShareOptions>,
}

impl TomlOptionsSource {
    pub async fn load(path: &Path) -> anyhow::Result<Self> {
        let raw = tokio::fs::read_to_string(path)
            .await
            .map_err(|e| anyhow::anyhow!("reading config {}: {e}", path.display()))?;
        let config: TomlConfig = toml::from_str(&raw)
            .map_err(|e| anyhow::anyhow!("parsing config {}: {e}", path.display()))?;

        let options = ShareOptions {
            share_roots: config.share_roots,
            filters: config.filters,
            storage_mode: config.storage_mode.into(),
            scanner_workers: config.scanner_workers,
            instance_name: config.instance_name,
        };
        let (sender, _receiver) = watch::channel(options);
        Ok(Self { sender })
    }
}

impl OptionsSource for TomlOptionsSource {
    fn current(&self) -> ShareOptions {
        self.sender.borrow().clone()
    }

    fn subscribe(&self) -> watch::Receiver<ShareOptions> {
        self.sender.subscribe()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn loads_share_roots_and_defaults_scanner_workers() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("soulshare.toml");
        tokio::fs::write(
            &path,
            r#"
            instance_name = "peer-1"
            share_roots = ["[Music]/srv/music", "-/srv/incoming"]
            filters = ["(?i)\\.part$"]
            storage_mode = "memory"
            "#,
        )
        .await
        .unwrap();

        let source = TomlOptionsSource::load(&path).await.unwrap();
        let options = source.current();
        assert_eq!(options.instance_name, "peer-1");
        assert_eq!(options.share_roots.len(), 2);
        assert_eq!(options.scanner_workers, 4);
        assert_eq!(options.storage_mode, StorageMode::Memory);
    }

    #[tokio::test]
    async fn missing_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("missing.toml");
        assert!(TomlOptionsSource::load(&path).await.is_err());
    }
}
