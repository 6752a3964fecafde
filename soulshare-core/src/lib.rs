//! Shared-file index: repository, scanner, and service for a Soulseek
//! peer.
//!
//! [`soulshare_model`] holds the inert value types and error enum;
//! [`soulshare_contracts`] the trait seams; [`soulshare_sync`] the
//! reusable concurrency primitives this crate's scanner and service build
//! on. This crate wires them into the three stateful components: the
//! SQLite-backed repository, the concurrent scanner, and the service
//! facade.

pub mod factory;
pub mod repository;
pub mod scanner;
pub mod service;

pub use factory::{MediaAttributeReader, NullAttributeReader, SoulseekFileFactory};
pub use repository::SqliteShareRepository;
pub use scanner::{ScanOutcome, ShareScanner};
pub use service::{BrowseEntry, ShareService};
