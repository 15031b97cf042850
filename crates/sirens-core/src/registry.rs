//! Capability tables mapping pattern keys to processor factories.
//!
//! A pattern never names its handler type. Instead each recognised key
//! (`links`, `result`, `sitemap`, ...) claims a factory, and compiling a
//! pattern instantiates every factory whose key it carries. Tables are
//! walked in registration order, so composition order is deterministic.

use std::collections::HashSet;
use std::fmt;

use crate::config::{CrawlConfig, PatternConfig};
use crate::error::AppError;
use crate::reference::FunctionRegistry;
use crate::traits::{AfterHook, DocumentHandler, ResponseHandler, ResultSink};

/// Everything a factory may consult while building its handler.
pub struct CompileContext<'a> {
    pub config: &'a CrawlConfig,
    pub functions: &'a FunctionRegistry,
    pub after: Option<&'a AfterHook>,
    pub sink: &'a ResultSink,
}

/// `factory(ctx, value_for_key, full_pattern) -> handler`
pub type Factory<H> =
    fn(&CompileContext<'_>, &serde_json::Value, &PatternConfig) -> Result<H, AppError>;

pub type DocumentFactory = Factory<DocumentHandler>;
pub type ResponseFactory = Factory<ResponseHandler>;

/// Which capability table a key lives in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Table {
    Document,
    Response,
}

impl fmt::Display for Table {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Table::Document => write!(f, "document"),
            Table::Response => write!(f, "response"),
        }
    }
}

/// The two processor tables plus the set of claimed keys.
#[derive(Default, Clone)]
pub struct ProcessorRegistry {
    document: Vec<(&'static str, DocumentFactory)>,
    response: Vec<(&'static str, ResponseFactory)>,
    claimed: HashSet<&'static str>,
}

impl ProcessorRegistry {
    /// An empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// A registry holding the built-in processor families.
    pub fn with_builtins() -> Self {
        let mut registry = Self::new();
        crate::processors::register_builtins(&mut registry);
        registry
    }

    #[tracing::instrument(skip(self, factory))]
    pub fn register_document(
        &mut self,
        key: &'static str,
        factory: DocumentFactory,
    ) -> Result<(), AppError> {
        self.claim(key, Table::Document)?;
        self.document.push((key, factory));
        Ok(())
    }

    #[tracing::instrument(skip(self, factory))]
    pub fn register_response(
        &mut self,
        key: &'static str,
        factory: ResponseFactory,
    ) -> Result<(), AppError> {
        self.claim(key, Table::Response)?;
        self.response.push((key, factory));
        Ok(())
    }

    /// Install a built-in family. Built-in keys are distinct by construction.
    pub(crate) fn push_document(&mut self, key: &'static str, factory: DocumentFactory) {
        self.claimed.insert(key);
        self.document.push((key, factory));
    }

    pub(crate) fn push_response(&mut self, key: &'static str, factory: ResponseFactory) {
        self.claimed.insert(key);
        self.response.push((key, factory));
    }

    fn claim(&mut self, key: &'static str, table: Table) -> Result<(), AppError> {
        if key == "name" || key == "url" {
            return Err(AppError::ContractViolation(format!(
                "processor key '{key}' is reserved"
            )));
        }
        if !self.claimed.insert(key) {
            return Err(AppError::ContractViolation(format!(
                "processor key '{key}' is already registered"
            )));
        }
        tracing::debug!(%key, %table, "Registered processor");
        Ok(())
    }

    /// True when some table claims `key`.
    pub fn is_claimed(&self, key: &str) -> bool {
        self.claimed.contains(key)
    }

    /// Keys of `table` present in `pattern`, in table order.
    pub fn matched_keys(&self, table: Table, pattern: &PatternConfig) -> Vec<&'static str> {
        let keys: Vec<&'static str> = match table {
            Table::Document => self.document.iter().map(|(k, _)| *k).collect(),
            Table::Response => self.response.iter().map(|(k, _)| *k).collect(),
        };
        keys.into_iter()
            .filter(|k| pattern.contains_key(*k))
            .collect()
    }

    /// Instantiate every document factory whose key is in `pattern`.
    pub fn find_document(
        &self,
        ctx: &CompileContext<'_>,
        pattern: &PatternConfig,
    ) -> Result<Vec<DocumentHandler>, AppError> {
        find_applicable(&self.document, ctx, pattern)
    }

    /// Instantiate every response factory whose key is in `pattern`.
    pub fn find_response(
        &self,
        ctx: &CompileContext<'_>,
        pattern: &PatternConfig,
    ) -> Result<Vec<ResponseHandler>, AppError> {
        find_applicable(&self.response, ctx, pattern)
    }
}

fn find_applicable<H>(
    table: &[(&'static str, Factory<H>)],
    ctx: &CompileContext<'_>,
    pattern: &PatternConfig,
) -> Result<Vec<H>, AppError> {
    table
        .iter()
        .filter_map(|(key, factory)| pattern.get(*key).map(|value| (key, factory, value)))
        .map(|(key, factory, value)| {
            factory(ctx, value, pattern).map_err(|e| match e {
                AppError::ConfigError(msg) => AppError::ConfigError(format!("{key}: {msg}")),
                other => other,
            })
        })
        .collect()
}
