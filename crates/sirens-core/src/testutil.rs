//! Test utilities: mock collaborators and fixture builders.
//!
//! Handwritten mocks for dependency injection in unit tests.
//! All mocks use `Arc<Mutex<_>>` for interior mutability, allowing
//! test assertions on recorded calls.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use crate::error::AppError;
use crate::models::{FetchResponse, Request, ResultRecord};
use crate::traits::{Fetcher, ResultSink, RobotsPolicy};

// ---------------------------------------------------------------------------
// MockFetcher
// ---------------------------------------------------------------------------

/// Mock fetcher serving canned bodies by URL and recording every fetch.
#[derive(Clone, Default)]
pub struct MockFetcher {
    pages: Arc<Mutex<HashMap<String, Result<Vec<u8>, String>>>>,
    redirects: Arc<Mutex<HashMap<String, String>>>,
    pub fetched: Arc<Mutex<Vec<String>>>,
}

impl MockFetcher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_page(self, url: &str, body: impl Into<Vec<u8>>) -> Self {
        self.pages
            .lock()
            .unwrap()
            .insert(url.to_string(), Ok(body.into()));
        self
    }

    /// Fetching `url` fails with an `HttpError` carrying `message`.
    pub fn with_error(self, url: &str, message: &str) -> Self {
        self.pages
            .lock()
            .unwrap()
            .insert(url.to_string(), Err(message.to_string()));
        self
    }

    /// Fetching `from` serves the page registered at `to`, reporting `to`
    /// as the final URL.
    pub fn with_redirect(self, from: &str, to: &str) -> Self {
        self.redirects
            .lock()
            .unwrap()
            .insert(from.to_string(), to.to_string());
        self
    }

    pub fn fetch_count(&self) -> usize {
        self.fetched.lock().unwrap().len()
    }
}

impl Fetcher for MockFetcher {
    async fn fetch(&self, url: &str) -> Result<FetchResponse, AppError> {
        self.fetched.lock().unwrap().push(url.to_string());
        let target = self
            .redirects
            .lock()
            .unwrap()
            .get(url)
            .cloned()
            .unwrap_or_else(|| url.to_string());
        match self.pages.lock().unwrap().get(&target) {
            Some(Ok(body)) => Ok(FetchResponse::new(target.as_str(), body.clone())),
            Some(Err(message)) => Err(AppError::HttpError(message.clone())),
            None => Err(AppError::HttpError(format!("HTTP 404 for {url}"))),
        }
    }
}

// ---------------------------------------------------------------------------
// MockRobots
// ---------------------------------------------------------------------------

/// Robots predicate that disallows URLs starting with any listed prefix.
#[derive(Clone, Default)]
pub struct MockRobots {
    disallowed: Vec<String>,
    pub checked: Arc<Mutex<Vec<String>>>,
}

impl MockRobots {
    pub fn allow_all() -> Self {
        Self::default()
    }

    pub fn disallow(prefixes: &[&str]) -> Self {
        Self {
            disallowed: prefixes.iter().map(|p| p.to_string()).collect(),
            checked: Arc::default(),
        }
    }
}

impl RobotsPolicy for MockRobots {
    async fn allowed(&self, url: &str) -> bool {
        self.checked.lock().unwrap().push(url.to_string());
        !self.disallowed.iter().any(|p| url.starts_with(p.as_str()))
    }
}

// ---------------------------------------------------------------------------
// RecordingSink
// ---------------------------------------------------------------------------

/// Result sink that records every emitted `(request, record)` pair.
#[derive(Clone, Default)]
pub struct RecordingSink {
    pub records: Arc<Mutex<Vec<(Request, ResultRecord)>>>,
}

impl RecordingSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn sink(&self) -> ResultSink {
        let records = Arc::clone(&self.records);
        Arc::new(move |req: &Request, record: &ResultRecord| -> Result<(), AppError> {
            records.lock().unwrap().push((req.clone(), record.clone()));
            Ok(())
        })
    }

    pub fn emitted(&self) -> Vec<(Request, ResultRecord)> {
        self.records.lock().unwrap().clone()
    }
}

// ---------------------------------------------------------------------------
// Fixtures
// ---------------------------------------------------------------------------

pub mod fixtures {
    use std::io::Write;

    use flate2::Compression;
    use flate2::write::GzEncoder;

    use crate::models::ConfigMap;

    /// Build a config record from a JSON literal. Panics on non-objects.
    pub fn record(value: serde_json::Value) -> ConfigMap {
        match value {
            serde_json::Value::Object(map) => map,
            other => panic!("expected a JSON object, got {other}"),
        }
    }

    pub fn gzip(data: &[u8]) -> Vec<u8> {
        let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
        encoder.write_all(data).unwrap();
        encoder.finish().unwrap()
    }

    /// Sitemap document listing `locs` in order.
    pub fn sitemap_xml(locs: &[&str]) -> String {
        let urls: String = locs
            .iter()
            .map(|loc| format!("  <url><loc>{loc}</loc></url>\n"))
            .collect();
        format!(
            "<?xml version=\"1.0\" encoding=\"UTF-8\"?>\n\
             <urlset xmlns=\"http://www.sitemaps.org/schemas/sitemap/0.9\">\n{urls}</urlset>\n"
        )
    }
}
