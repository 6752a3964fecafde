//! SQLite-backed [`soulshare_contracts::repository::ShareRepository`]
//! implementation.

pub mod schema;
pub mod sqlite_repository;

pub use sqlite_repository::SqliteShareRepository;
