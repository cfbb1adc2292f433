pub mod feed;
pub mod entry;

pub use feed::{ConditionalHeaders, FeedInfo, FeedMetadata, ParsedFeed};
pub use entry::{normalize_timestamp, CachedEntry, ParsedEntry, SourceSnapshot};
