use thiserror::Error;

use crate::domain::{ConditionalHeaders, ParsedFeed};
use crate::errors::PlanetResult;

/// Synthetic status recorded when a request times out.
pub const STATUS_TIMEOUT: u16 = 408;
/// Synthetic status recorded for any other transport failure.
pub const STATUS_TRANSPORT_ERROR: u16 = 500;

/// Errors raised below HTTP: the request never produced a usable response.
#[derive(Debug, Error)]
pub enum FetchError {
    #[error("Request timed out")]
    Timeout,

    #[error("Request failed: {0}")]
    Network(String),

    #[error("Too many redirects")]
    TooManyRedirects,

    #[error("Response too large")]
    ResponseTooLarge,

    #[error("Invalid URL: {0}")]
    InvalidUrl(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl FetchError {
    pub fn status(&self) -> u16 {
        match self {
            FetchError::Timeout => STATUS_TIMEOUT,
            _ => STATUS_TRANSPORT_ERROR,
        }
    }
}

impl From<reqwest::Error> for FetchError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            FetchError::Timeout
        } else {
            FetchError::Network(err.to_string())
        }
    }
}

/// A completed HTTP exchange, after redirects.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HttpResponse {
    pub status: u16,
    pub etag: Option<String>,
    pub last_modified: Option<String>,
    /// Final URL when every redirect hop was permanent (301/308).
    pub permanent_location: Option<String>,
    pub body: Vec<u8>,
}

impl HttpResponse {
    pub fn ok(body: impl Into<Vec<u8>>) -> Self {
        Self {
            status: 200,
            body: body.into(),
            ..Default::default()
        }
    }
}

#[cfg_attr(test, mockall::automock)]
pub trait Transport: Send + Sync {
    /// Perform a conditional GET of `uri`.
    fn get(&self, uri: &str, conditional: &ConditionalHeaders) -> Result<HttpResponse, FetchError>;
}

#[cfg_attr(test, mockall::automock)]
pub trait FeedParser: Send + Sync {
    fn parse(&self, bytes: &[u8]) -> PlanetResult<ParsedFeed>;
}
