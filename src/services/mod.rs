pub mod fetch_service;
pub mod entry_writer;
pub mod refresh_service;
pub mod splice_service;
pub mod expunge_service;

pub use fetch_service::{FetchOutcome, FetchRequest, FetchResult, FetchService, FetchedFeed};
pub use entry_writer::{EntryWriter, FeedSettings, WriteReport};
pub use refresh_service::{RefreshReport, RefreshService};
pub use splice_service::{SpliceService, SplicedEntry};
pub use expunge_service::{ExpungeReport, ExpungeService};
