//! Row store adapters

pub mod archive;
pub mod memory;
pub mod sqlite;

pub use archive::StoreArchive;
pub use memory::MemoryStore;
pub use sqlite::SqliteStore;
