pub mod locks;
pub mod memory;
pub mod sqlite;
pub mod trait_def;


pub use locks::KeyLocks;
pub use memory::MemoryStore;
pub use sqlite::SqliteStore;
pub use trait_def::{row_id, MetadataStore, OptionStore, StorageError, StorageResult};
