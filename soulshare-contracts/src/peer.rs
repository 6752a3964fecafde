use async_trait::async_trait;
use soulshare_model::SearchQuery;

/// Contract for the Soulseek wire-protocol client.
///
/// Out of scope for this workspace: no implementation ships here. This
/// trait exists so `soulshare-core`'s service layer can be exercised
/// against a test double without pulling in real network code.
#[async_trait]
pub trait PeerTransport: Send + Sync {
    /// Resolve a username to a connectable endpoint.
    async fn connect_to_user(&self, username: &str) -> anyhow::Result<PeerEndpoint>;

    /// Begin downloading `remote_filename` from `endpoint`, reporting
    /// progress through `on_progress`.
    async fn download(
        &self,
        endpoint: &PeerEndpoint,
        remote_filename: &str,
        on_progress: Box<dyn Fn(TransferProgress) + Send + Sync>,
    ) -> anyhow::Result<()>;

    /// Invoked by the transport when a remote peer's search request
    /// arrives; the implementation is expected to call back into
    /// `ShareService::search` and reply on the wire.
    async fn handle_incoming_search(&self, query: SearchQuery) -> anyhow::Result<()>;
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PeerEndpoint {
    pub username: String,
    pub address: String,
    pub port: u16,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TransferProgress {
    pub bytes_transferred: u64,
    pub total_bytes: u64,
}
