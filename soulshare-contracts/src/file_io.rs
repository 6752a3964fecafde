use async_trait::async_trait;
use std::path::Path;

/// Contract for moving a completed download from the incomplete directory
/// to its final destination.
///
/// Out of scope for this workspace: downloader/uploader transfer managers
/// are external collaborators; this trait documents the boundary they are
/// expected to implement atomically within one filesystem.
#[async_trait]
pub trait IncompleteFileIo: Send + Sync {
    async fn finalize(&self, incomplete_path: &Path, final_path: &Path) -> anyhow::Result<()>;
}
