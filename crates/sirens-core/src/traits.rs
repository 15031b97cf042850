use std::collections::VecDeque;
use std::future::Future;
use std::sync::Arc;

use scraper::Html;

use crate::error::AppError;
use crate::models::{FetchResponse, Params, Request, ResultRecord};

/// Fetches the raw response for a URL.
pub trait Fetcher: Send + Sync + Clone {
    fn fetch(&self, url: &str) -> impl Future<Output = Result<FetchResponse, AppError>> + Send;
}

/// Robots-exclusion predicate consulted before every fetch.
pub trait RobotsPolicy: Send + Sync {
    fn allowed(&self, url: &str) -> impl Future<Output = bool> + Send;
}

/// Predicate used when `disable_robots` is set.
#[derive(Debug, Default, Clone, Copy)]
pub struct AllowAll;

impl RobotsPolicy for AllowAll {
    async fn allowed(&self, _url: &str) -> bool {
        true
    }
}

/// Blocks until a request to `url` is permitted.
///
/// Implementations are shared by every worker and must be safe to call
/// concurrently.
pub trait RateLimiter: Send + Sync {
    fn throttle(&self, url: &str) -> impl Future<Output = ()> + Send;
}

/// Receives the follow-up requests discovered while processing a page.
pub trait Worker {
    fn append(&mut self, request: Request);
}

impl Worker for Vec<Request> {
    fn append(&mut self, request: Request) {
        self.push(request);
    }
}

impl Worker for VecDeque<Request> {
    fn append(&mut self, request: Request) {
        self.push_back(request);
    }
}

// ---------------------------------------------------------------------------
// Handler shapes
// ---------------------------------------------------------------------------

/// Handler over a decoded, parsed document.
pub type DocumentHandler =
    Arc<dyn Fn(&mut dyn Worker, &Request, &Html, &Params) -> Result<(), AppError> + Send + Sync>;

/// Handler over the raw fetch response.
pub type ResponseHandler = Arc<
    dyn Fn(&mut dyn Worker, &Request, &FetchResponse, &Params) -> Result<(), AppError>
        + Send
        + Sync,
>;

/// Raw function delegation: runs without a fetch.
pub type PipelineFn =
    Arc<dyn Fn(&mut dyn Worker, &Request, &Params) -> Result<(), AppError> + Send + Sync>;

/// Post-processes a result record before it reaches the sink.
pub type AfterHook = Arc<dyn Fn(ResultRecord) -> ResultRecord + Send + Sync>;

/// Final destination for result records.
pub type ResultSink = Arc<dyn Fn(&Request, &ResultRecord) -> Result<(), AppError> + Send + Sync>;
