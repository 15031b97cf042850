//! Pattern compilation and request dispatch.
//!
//! [`Application::new`] compiles every pattern of a [`CrawlConfig`] into a
//! [`Pipeline`] once, at startup. [`Application::dispatch`] then routes each
//! [`Request`] to its pipeline: throttle, robots check, fetch, then either
//! decode and run the document handlers or run the response handlers on the
//! raw body.

use std::borrow::Cow;
use std::collections::HashMap;
use std::fmt;

use crate::config::{CrawlConfig, PatternConfig, get_str};
use crate::decode::decode_html;
use crate::error::AppError;
use crate::models::{FetchResponse, Request};
use crate::reference::{Callable, FunctionRegistry, print_sink};
use crate::registry::{CompileContext, ProcessorRegistry, Table};
use crate::throttle::SpeedLimit;
use crate::traits::{
    AfterHook, DocumentHandler, Fetcher, PipelineFn, RateLimiter, ResponseHandler, ResultSink,
    RobotsPolicy, Worker,
};

/// Keys a pattern may carry besides its processor keys.
const PATTERN_KEYS: &[&str] = &["name", "url"];

/// Key of the document escape hatch.
const DOCUMENT_HATCH: &str = "lxml";
/// Key of the response escape hatch.
const RESPONSE_HATCH: &str = "http";

/// The compiled, executable form of one pattern.
#[derive(Clone)]
pub enum Pipeline {
    /// Fetch, decode, parse, then run every handler on the document.
    Document(Vec<DocumentHandler>),
    /// Fetch, then run every handler on the raw response.
    Response(Vec<ResponseHandler>),
    /// Registered function run as-is, without a fetch.
    Direct(PipelineFn),
}

impl Pipeline {
    pub fn kind(&self) -> &'static str {
        match self {
            Pipeline::Document(_) => "document",
            Pipeline::Response(_) => "response",
            Pipeline::Direct(_) => "direct",
        }
    }

    /// Number of handlers the pipeline runs per request.
    pub fn len(&self) -> usize {
        match self {
            Pipeline::Document(handlers) => handlers.len(),
            Pipeline::Response(handlers) => handlers.len(),
            Pipeline::Direct(_) => 1,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl fmt::Debug for Pipeline {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Pipeline::{}({} handlers)", self.kind(), self.len())
    }
}

/// What happened to a dispatched request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DispatchOutcome {
    /// The pipeline ran to completion.
    Processed,
    /// robots.txt refused the URL; nothing was fetched.
    Disallowed,
}

/// Owns the compiled pipelines and the collaborators they run against.
pub struct Application<F: Fetcher, R: RobotsPolicy> {
    config: CrawlConfig,
    registry: ProcessorRegistry,
    functions: FunctionRegistry,
    after: Option<AfterHook>,
    sink: ResultSink,
    fetcher: F,
    robots: Option<R>,
    limit: Option<SpeedLimit>,
    processors: HashMap<String, Pipeline>,
    names: Vec<String>,
}

impl<F: Fetcher, R: RobotsPolicy> Application<F, R> {
    /// Resolve the crawl-wide hooks and compile every pattern.
    ///
    /// Fails on the first pattern that does not compile, so a running
    /// application never holds a partial pipeline map. When the config sets
    /// `disable_robots`, `robots` is never consulted.
    pub fn new(
        mut config: CrawlConfig,
        registry: ProcessorRegistry,
        mut functions: FunctionRegistry,
        fetcher: F,
        robots: R,
    ) -> Result<Self, AppError> {
        let patterns = std::mem::take(&mut config.patterns);
        functions.set_default_module(config.file.clone());

        let after = functions.resolve_after(config.after.as_deref())?;
        let sink = functions
            .resolve_sink(config.result.as_deref())?
            .unwrap_or_else(print_sink);
        let limit = match config.interval()? {
            Some(delay) => Some(SpeedLimit::new(delay).with_jitter(config.jitter()?)),
            None => None,
        };
        let robots = (!config.disable_robots).then_some(robots);

        let mut app = Self {
            config,
            registry,
            functions,
            after,
            sink,
            fetcher,
            robots,
            limit,
            processors: HashMap::new(),
            names: Vec::new(),
        };

        for pattern in &patterns {
            let name = get_str(pattern, "name")?
                .filter(|name| !name.is_empty())
                .ok_or_else(|| {
                    AppError::ContractViolation(format!("pattern without 'name': {pattern:?}"))
                })?;
            if app.processors.contains_key(name) {
                return Err(AppError::ContractViolation(format!(
                    "duplicate pattern name '{name}'"
                )));
            }
            let pipeline = app.compile(pattern).map_err(|e| match e {
                AppError::ConfigError(msg) => {
                    AppError::ConfigError(format!("pattern '{name}': {msg}"))
                }
                other => other,
            })?;
            tracing::debug!(
                pattern = %name,
                kind = pipeline.kind(),
                handlers = pipeline.len(),
                "Compiled pattern"
            );
            app.processors.insert(name.to_string(), pipeline);
            app.names.push(name.to_string());
        }

        tracing::info!(
            patterns = app.names.len(),
            robots = app.robots.is_some(),
            throttled = app.limit.is_some(),
            "Application ready"
        );
        Ok(app)
    }

    /// Compile one pattern into a pipeline.
    ///
    /// Document keys win over response keys, which win over a `url`
    /// reference. Mixing an escape hatch with other keys, or keys from both
    /// tables, is rejected rather than resolved by precedence.
    pub fn compile(&self, pattern: &PatternConfig) -> Result<Pipeline, AppError> {
        self.validate(pattern)?;
        let ctx = CompileContext {
            config: &self.config,
            functions: &self.functions,
            after: self.after.as_ref(),
            sink: &self.sink,
        };

        let document = self.registry.find_document(&ctx, pattern)?;
        if !document.is_empty() {
            return Ok(Pipeline::Document(document));
        }
        let response = self.registry.find_response(&ctx, pattern)?;
        if !response.is_empty() {
            return Ok(Pipeline::Response(response));
        }
        if let Some(reference) = get_str(pattern, "url")? {
            return self
                .functions
                .resolve_pipeline(Some(reference))?
                .map(Pipeline::Direct)
                .ok_or_else(|| {
                    AppError::ContractViolation(format!("reference '{reference}' resolved to nothing"))
                });
        }
        Err(AppError::ConfigError("no handler for pattern".into()))
    }

    fn validate(&self, pattern: &PatternConfig) -> Result<(), AppError> {
        let document = self.registry.matched_keys(Table::Document, pattern);
        let response = self.registry.matched_keys(Table::Response, pattern);

        if document.contains(&DOCUMENT_HATCH) && document.len() > 1 {
            return Err(AppError::ConfigError(format!(
                "'{DOCUMENT_HATCH}' cannot be combined with {document:?}"
            )));
        }
        if response.contains(&RESPONSE_HATCH) && response.len() > 1 {
            return Err(AppError::ConfigError(format!(
                "'{RESPONSE_HATCH}' cannot be combined with {response:?}"
            )));
        }
        if !document.is_empty() && !response.is_empty() {
            return Err(AppError::ConfigError(format!(
                "document keys {document:?} and response keys {response:?} cannot be combined"
            )));
        }
        if pattern.contains_key("url") && !(document.is_empty() && response.is_empty()) {
            return Err(AppError::ConfigError(
                "'url' cannot be combined with processor keys".into(),
            ));
        }

        for key in pattern.keys() {
            if !PATTERN_KEYS.contains(&key.as_str()) && !self.registry.is_claimed(key) {
                tracing::warn!(%key, "Ignoring unrecognised pattern key");
            }
        }
        Ok(())
    }

    /// Run the pipeline named by `request.processor`.
    ///
    /// Fetched pipelines see the request at its final URL, so relative
    /// links on a redirected page resolve against where it was served.
    /// Errors are returned to the caller; nothing is retried here.
    #[tracing::instrument(skip(self, worker, request), fields(url = %request.url, processor = %request.processor))]
    pub async fn dispatch<W: Worker + Send>(
        &self,
        worker: &mut W,
        request: &Request,
    ) -> Result<DispatchOutcome, AppError> {
        if let Some(limit) = &self.limit {
            limit.throttle(&request.url).await;
        }

        let pipeline = self.lookup(request)?;
        if let Pipeline::Direct(f) = pipeline.as_ref() {
            f(worker, request, &request.params)?;
            return Ok(DispatchOutcome::Processed);
        }

        if let Some(robots) = &self.robots
            && !robots.allowed(&request.url).await
        {
            tracing::info!("Disallowed by robots.txt");
            return Ok(DispatchOutcome::Disallowed);
        }

        let response = self.fetcher.fetch(&request.url).await?;
        let page = request.redirected(&response.url);
        if let Cow::Owned(page) = &page {
            tracing::debug!(final_url = %page.url, "Followed redirect");
        }
        match pipeline.as_ref() {
            Pipeline::Document(handlers) => run_document(handlers, worker, &page, &response)?,
            Pipeline::Response(handlers) => {
                for handler in handlers {
                    handler(worker, &page, &response, &page.params)?;
                }
            }
            Pipeline::Direct(_) => {}
        }
        Ok(DispatchOutcome::Processed)
    }

    fn lookup(&self, request: &Request) -> Result<Cow<'_, Pipeline>, AppError> {
        if !request.is_inline() {
            return self
                .processors
                .get(&request.processor)
                .map(Cow::Borrowed)
                .ok_or_else(|| {
                    AppError::ContractViolation(format!(
                        "unknown processor '{}'",
                        request.processor
                    ))
                });
        }

        let callable = self
            .functions
            .resolve(Some(&request.processor))?
            .ok_or_else(|| {
                AppError::ContractViolation(format!(
                    "reference '{}' resolved to nothing",
                    request.processor
                ))
            })?;
        let pipeline = match callable {
            Callable::Pipeline(f) => Pipeline::Direct(f),
            Callable::Document(f) => Pipeline::Document(vec![f]),
            Callable::Response(f) => Pipeline::Response(vec![f]),
            other => {
                return Err(AppError::ContractViolation(format!(
                    "reference '{}' is a {} function and cannot process requests",
                    request.processor,
                    other.kind()
                )));
            }
        };
        Ok(Cow::Owned(pipeline))
    }

    pub fn pipeline(&self, name: &str) -> Option<&Pipeline> {
        self.processors.get(name)
    }

    /// Compiled pattern names, in config order.
    pub fn pipeline_names(&self) -> impl Iterator<Item = &str> {
        self.names.iter().map(String::as_str)
    }

    /// The config the application was built from, without `patterns`.
    pub fn config(&self) -> &CrawlConfig {
        &self.config
    }

    pub fn rate_limit(&self) -> Option<&SpeedLimit> {
        self.limit.as_ref()
    }

    pub fn robots_enabled(&self) -> bool {
        self.robots.is_some()
    }
}

fn run_document(
    handlers: &[DocumentHandler],
    worker: &mut dyn Worker,
    request: &Request,
    response: &FetchResponse,
) -> Result<(), AppError> {
    let doc = decode_html(&response.content)?;
    for handler in handlers {
        handler(worker, request, &doc, &request.params)?;
    }
    Ok(())
}
