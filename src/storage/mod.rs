pub mod cache_key;
pub mod cache_store;
pub mod traits;
pub mod sqlite;

pub use cache_key::derive_key;
pub use cache_store::{CacheStore, EntryFile};
pub use traits::IdIndex;
pub use sqlite::{SqliteIdIndex, SqliteStorage};
