pub mod traits;
pub mod feed_rs_parser;
pub mod http;

pub use traits::{FeedParser, FetchError, HttpResponse, Transport, STATUS_TIMEOUT, STATUS_TRANSPORT_ERROR};
pub use feed_rs_parser::FeedRsParser;
pub use http::HttpTransport;
