use std::panic::{self, AssertUnwindSafe};

use reqwest::StatusCode;
use sha2::{Digest, Sha256};

use crate::domain::{FeedMetadata, ParsedFeed};
use crate::errors::PlanetResult;
use crate::sources::{FeedParser, HttpResponse, Transport, STATUS_TRANSPORT_ERROR};

const STATUS_NOT_MODIFIED: u16 = 304;

/// One feed to fetch, with whatever was stored about it last time.
#[derive(Debug, Clone)]
pub struct FetchRequest {
    pub uri: String,
    pub metadata: FeedMetadata,
}

impl FetchRequest {
    pub fn new(metadata: FeedMetadata) -> Self {
        Self {
            uri: metadata.uri.clone(),
            metadata,
        }
    }
}

/// A successful fetch: new caching headers plus the parsed document.
#[derive(Debug, Clone)]
pub struct FetchedFeed {
    pub status: u16,
    pub etag: Option<String>,
    pub last_modified: Option<String>,
    pub permanent_location: Option<String>,
    pub content_hash: String,
    pub feed: ParsedFeed,
}

#[derive(Debug, Clone)]
pub enum FetchOutcome {
    Fetched(FetchedFeed),
    /// HTTP 304, or a 200 whose body digest matches the stored one.
    NotModified { status: u16 },
    Failed { status: u16, message: String },
}

/// Outcome of one fetch, paired with the request that produced it.
#[derive(Debug, Clone)]
pub struct FetchResult {
    pub request: FetchRequest,
    pub outcome: FetchOutcome,
}

/// Fetches and parses feeds on a pool of `workers` threads.
pub struct FetchService<T: Transport, P: FeedParser> {
    transport: T,
    parser: P,
    workers: usize,
}

impl<T: Transport, P: FeedParser> FetchService<T, P> {
    pub fn new(transport: T, parser: P, workers: usize) -> Self {
        Self {
            transport,
            parser,
            workers,
        }
    }

    /// Fetch every request, handing each result to `on_result` on the calling
    /// thread as soon as it arrives. Arrival order is unspecified when
    /// `workers > 0`; with `workers == 0` requests run sequentially in order.
    pub fn fetch_all<F>(&self, requests: Vec<FetchRequest>, mut on_result: F) -> PlanetResult<()>
    where
        F: FnMut(FetchResult),
    {
        let workers = self.workers.min(requests.len());
        if workers == 0 {
            for request in requests {
                on_result(self.fetch_one(request));
            }
            return Ok(());
        }

        let (work_tx, work_rx) = crossbeam_channel::unbounded::<FetchRequest>();
        let (result_tx, result_rx) = crossbeam_channel::unbounded::<FetchResult>();

        for request in requests {
            // work_rx is alive in this scope, so the send cannot fail.
            let _ = work_tx.send(request);
        }
        // Closing the queue is what stops the workers once it drains.
        drop(work_tx);

        std::thread::scope(|scope| -> PlanetResult<()> {
            for worker in 0..workers {
                let work_rx = work_rx.clone();
                let result_tx = result_tx.clone();
                std::thread::Builder::new()
                    .name(format!("fetch-{}", worker))
                    .spawn_scoped(scope, move || {
                        for request in work_rx.iter() {
                            if result_tx.send(self.fetch_one(request)).is_err() {
                                break;
                            }
                        }
                        tracing::debug!(worker, "Fetch worker finished");
                    })?;
            }
            drop(result_tx);
            drop(work_rx);

            for result in result_rx.iter() {
                on_result(result);
            }
            Ok(())
        })
    }

    /// Fetch one feed. Never fails: every problem becomes `FetchOutcome::Failed`.
    pub fn fetch_one(&self, request: FetchRequest) -> FetchResult {
        let outcome = panic::catch_unwind(AssertUnwindSafe(|| self.fetch_outcome(&request)))
            .unwrap_or_else(|_| {
                tracing::error!(feed = %request.uri, "Fetch panicked");
                FetchOutcome::Failed {
                    status: STATUS_TRANSPORT_ERROR,
                    message: "internal error while fetching".to_string(),
                }
            });

        FetchResult { request, outcome }
    }

    fn fetch_outcome(&self, request: &FetchRequest) -> FetchOutcome {
        let conditional = request.metadata.conditional_headers();

        match self.transport.get(&request.uri, &conditional) {
            Ok(response) => self.interpret(request, response),
            Err(e) => {
                tracing::warn!(feed = %request.uri, error = %e, "Fetch failed");
                FetchOutcome::Failed {
                    status: e.status(),
                    message: e.to_string(),
                }
            }
        }
    }

    fn interpret(&self, request: &FetchRequest, response: HttpResponse) -> FetchOutcome {
        if response.status == STATUS_NOT_MODIFIED {
            tracing::debug!(feed = %request.uri, "Feed not modified");
            return FetchOutcome::NotModified {
                status: STATUS_NOT_MODIFIED,
            };
        }

        if response.status >= 400 {
            tracing::warn!(feed = %request.uri, status = response.status, "Feed returned an error status");
            return FetchOutcome::Failed {
                status: response.status,
                message: status_message(response.status),
            };
        }

        let content_hash = format!("{:x}", Sha256::digest(&response.body));
        if request.metadata.content_hash.as_deref() == Some(content_hash.as_str()) {
            tracing::debug!(feed = %request.uri, "Feed body unchanged");
            return FetchOutcome::NotModified {
                status: STATUS_NOT_MODIFIED,
            };
        }

        match self.parser.parse(&response.body) {
            Ok(feed) => FetchOutcome::Fetched(FetchedFeed {
                status: response.status,
                etag: response.etag,
                last_modified: response.last_modified,
                permanent_location: response.permanent_location,
                content_hash,
                feed,
            }),
            Err(e) => {
                tracing::warn!(feed = %request.uri, error = %e, "Feed could not be parsed");
                FetchOutcome::Failed {
                    status: STATUS_TRANSPORT_ERROR,
                    message: format!("unable to parse feed: {}", e),
                }
            }
        }
    }
}

fn status_message(status: u16) -> String {
    if status == 410 {
        return "feed gone".to_string();
    }

    StatusCode::from_u16(status)
        .ok()
        .and_then(|s| s.canonical_reason())
        .map(str::to_string)
        .unwrap_or_else(|| format!("HTTP status {}", status))
}
