mod connection;
mod id_index;

pub use connection::SqliteStorage;
pub use id_index::SqliteIdIndex;
