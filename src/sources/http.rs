use std::io::Read;
use std::time::Duration;

use reqwest::blocking::Client;
use reqwest::header::{ETAG, IF_MODIFIED_SINCE, IF_NONE_MATCH, LAST_MODIFIED, LOCATION};
use reqwest::redirect::Policy;
use reqwest::StatusCode;
use url::Url;

use crate::domain::ConditionalHeaders;
use crate::errors::PlanetResult;
use crate::sources::traits::{FetchError, HttpResponse, Transport};

const MAX_REDIRECTS: usize = 5;
const MAX_FEED_SIZE: u64 = 10 * 1024 * 1024; // 10MB

/// Blocking HTTP transport. Redirects are followed by hand so permanent
/// moves can be recorded against the subscription.
pub struct HttpTransport {
    client: Client,
}

impl HttpTransport {
    pub fn new(timeout: Duration, user_agent: &str) -> PlanetResult<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .user_agent(user_agent)
            .redirect(Policy::none())
            .build()?;

        Ok(Self { client })
    }

    fn get_file(uri: &str) -> Result<HttpResponse, FetchError> {
        let path = Url::parse(uri)
            .ok()
            .and_then(|u| u.to_file_path().ok())
            .ok_or_else(|| FetchError::InvalidUrl(uri.to_string()))?;

        let meta = std::fs::metadata(&path)?;
        if meta.len() > MAX_FEED_SIZE {
            return Err(FetchError::ResponseTooLarge);
        }
        Ok(HttpResponse::ok(std::fs::read(&path)?))
    }
}

impl Transport for HttpTransport {
    fn get(&self, uri: &str, conditional: &ConditionalHeaders) -> Result<HttpResponse, FetchError> {
        if uri.starts_with("file://") {
            return Self::get_file(uri);
        }

        let mut current = Url::parse(uri).map_err(|e| FetchError::InvalidUrl(e.to_string()))?;
        let mut hops = 0;
        let mut all_permanent = true;

        loop {
            let mut request = self.client.get(current.clone());
            if let Some(etag) = &conditional.etag {
                request = request.header(IF_NONE_MATCH, etag);
            }
            if let Some(last_modified) = &conditional.last_modified {
                request = request.header(IF_MODIFIED_SINCE, last_modified);
            }

            let response = request.send()?;
            let status = response.status();

            if status.is_redirection() && status != StatusCode::NOT_MODIFIED {
                let location = response
                    .headers()
                    .get(LOCATION)
                    .and_then(|v| v.to_str().ok())
                    .ok_or_else(|| FetchError::Network(format!("{} without Location", status)))?;

                hops += 1;
                if hops > MAX_REDIRECTS {
                    return Err(FetchError::TooManyRedirects);
                }
                all_permanent &=
                    status == StatusCode::MOVED_PERMANENTLY || status == StatusCode::PERMANENT_REDIRECT;
                current = current
                    .join(location)
                    .map_err(|e| FetchError::InvalidUrl(e.to_string()))?;
                continue;
            }

            let header = |name: reqwest::header::HeaderName| {
                response
                    .headers()
                    .get(name)
                    .and_then(|v| v.to_str().ok())
                    .map(str::to_string)
            };
            let etag = header(ETAG);
            let last_modified = header(LAST_MODIFIED);

            if response.content_length().is_some_and(|len| len > MAX_FEED_SIZE) {
                return Err(FetchError::ResponseTooLarge);
            }

            let mut body = Vec::new();
            response
                .take(MAX_FEED_SIZE + 1)
                .read_to_end(&mut body)
                .map_err(|e| {
                    if e.kind() == std::io::ErrorKind::TimedOut {
                        FetchError::Timeout
                    } else {
                        FetchError::Network(e.to_string())
                    }
                })?;
            if body.len() as u64 > MAX_FEED_SIZE {
                return Err(FetchError::ResponseTooLarge);
            }

            return Ok(HttpResponse {
                status: status.as_u16(),
                etag,
                last_modified,
                permanent_location: (hops > 0 && all_permanent).then(|| current.to_string()),
                body,
            });
        }
    }
}
