//! Storage substrates for Boundless.
//!
//! Two interchangeable `StorageBackend` implementations:
//! - [`SqliteStore`] — embedded key-value store, always available.
//! - [`DirectoryStore`] — user-granted folder, one file per record,
//!   capable of detecting a revoked grant.
//!
//! [`migrate`] copies every record from one backend to another; the engine
//! calls it when the user switches substrates.

pub mod directory;
pub mod sqlite;
pub mod swap;

mod migrate;

pub use directory::DirectoryStore;
pub use migrate::migrate;
pub use sqlite::SqliteStore;
pub use swap::SwappableStore;
