//! Trait contracts for the shared-file index's collaborators.
//!
//! [`repository`] and [`state_monitor`] are implemented in-tree
//! (`soulshare-core`, `soulshare-sync`). [`peer`], [`options`], and
//! [`file_io`] describe collaborators that stay external to this
//! workspace — no concrete peer transport, production options source, or
//! transfer-finalization code ships here.

pub mod file_io;
pub mod options;
pub mod peer;
pub mod repository;
pub mod state_monitor;

pub use file_io::IncompleteFileIo;
pub use options::{OptionsSource, ShareOptions, StorageMode};
pub use peer::{PeerEndpoint, PeerTransport, TransferProgress};
pub use repository::{SchemaValidation, ShareRepository};
pub use state_monitor::{StateMonitor, Subscription};
