//! Typed `module:name` function references.
//!
//! Config values such as `after: hooks:clean` or `lxml: :parse_listing` name
//! functions registered at startup. Modules and functions are registered
//! explicitly; lookups fail closed with a [`ReferenceError`].

use std::collections::HashMap;
use std::fmt;
use std::io::Write;
use std::sync::Arc;

use crate::error::{AppError, ReferenceError};
use crate::models::{FetchResponse, Params, Request, ResultRecord};
use crate::traits::{
    AfterHook, DocumentHandler, PipelineFn, ResponseHandler, ResultSink, Worker,
};

/// Name of the module registered by [`FunctionRegistry::new`].
pub const BUILTIN_MODULE: &str = "sirens";

/// A registered function, tagged with the shape it can be called with.
#[derive(Clone)]
pub enum Callable {
    Document(DocumentHandler),
    Response(ResponseHandler),
    Pipeline(PipelineFn),
    After(AfterHook),
    Sink(ResultSink),
}

impl Callable {
    pub fn kind(&self) -> &'static str {
        match self {
            Callable::Document(_) => "document",
            Callable::Response(_) => "response",
            Callable::Pipeline(_) => "pipeline",
            Callable::After(_) => "after",
            Callable::Sink(_) => "sink",
        }
    }
}

impl fmt::Debug for Callable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Callable::{}", self.kind())
    }
}

/// A named group of functions.
#[derive(Default, Clone)]
pub struct Module {
    functions: HashMap<String, Callable>,
}

impl Module {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, name: impl Into<String>, callable: Callable) -> &mut Self {
        self.functions.insert(name.into(), callable);
        self
    }

    pub fn document<F>(&mut self, name: impl Into<String>, f: F) -> &mut Self
    where
        F: Fn(&mut dyn Worker, &Request, &scraper::Html, &Params) -> Result<(), AppError>
            + Send
            + Sync
            + 'static,
    {
        self.insert(name, Callable::Document(Arc::new(f)))
    }

    pub fn response<F>(&mut self, name: impl Into<String>, f: F) -> &mut Self
    where
        F: Fn(&mut dyn Worker, &Request, &FetchResponse, &Params) -> Result<(), AppError>
            + Send
            + Sync
            + 'static,
    {
        self.insert(name, Callable::Response(Arc::new(f)))
    }

    pub fn pipeline<F>(&mut self, name: impl Into<String>, f: F) -> &mut Self
    where
        F: Fn(&mut dyn Worker, &Request, &Params) -> Result<(), AppError> + Send + Sync + 'static,
    {
        self.insert(name, Callable::Pipeline(Arc::new(f)))
    }

    pub fn after<F>(&mut self, name: impl Into<String>, f: F) -> &mut Self
    where
        F: Fn(ResultRecord) -> ResultRecord + Send + Sync + 'static,
    {
        self.insert(name, Callable::After(Arc::new(f)))
    }

    pub fn sink<F>(&mut self, name: impl Into<String>, f: F) -> &mut Self
    where
        F: Fn(&Request, &ResultRecord) -> Result<(), AppError> + Send + Sync + 'static,
    {
        self.insert(name, Callable::Sink(Arc::new(f)))
    }

    pub fn get(&self, name: &str) -> Option<&Callable> {
        self.functions.get(name)
    }
}

/// Process-wide table of modules, resolved by `module:name` strings.
#[derive(Clone)]
pub struct FunctionRegistry {
    modules: HashMap<String, Module>,
    default_module: Option<String>,
}

impl Default for FunctionRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl FunctionRegistry {
    /// Create a registry holding only the built-in `sirens` module.
    pub fn new() -> Self {
        let mut modules = HashMap::new();
        modules.insert(BUILTIN_MODULE.to_string(), builtin_module());
        Self {
            modules,
            default_module: None,
        }
    }

    /// Module substituted when a reference is written as `:name`.
    pub fn with_default_module(mut self, module: Option<String>) -> Self {
        self.default_module = module;
        self
    }

    pub fn set_default_module(&mut self, module: Option<String>) {
        self.default_module = module;
    }

    /// Get or create the module `name` for registration.
    pub fn module(&mut self, name: impl Into<String>) -> &mut Module {
        self.modules.entry(name.into()).or_default()
    }

    /// Resolve a reference. `None` resolves to `None` without error.
    pub fn resolve(&self, reference: Option<&str>) -> Result<Option<Callable>, AppError> {
        let Some(reference) = reference else {
            return Ok(None);
        };
        let (module, name) = reference
            .split_once(':')
            .ok_or_else(|| ReferenceError::Malformed(reference.to_string()))?;
        if name.is_empty() || name.contains(':') {
            return Err(ReferenceError::Malformed(reference.to_string()).into());
        }
        let module = if module.is_empty() {
            self.default_module
                .as_deref()
                .ok_or_else(|| ReferenceError::NoDefaultModule(reference.to_string()))?
        } else {
            module
        };

        let functions = self
            .modules
            .get(module)
            .ok_or_else(|| ReferenceError::UnknownModule(module.to_string()))?;
        let callable = functions
            .get(name)
            .ok_or_else(|| ReferenceError::UnknownName {
                module: module.to_string(),
                name: name.to_string(),
            })?;

        tracing::debug!(%reference, kind = callable.kind(), "Resolved reference");
        Ok(Some(callable.clone()))
    }

    pub fn resolve_document(&self, reference: Option<&str>) -> Result<Option<DocumentHandler>, AppError> {
        self.resolve_as(reference, "document", |c| match c {
            Callable::Document(f) => Some(f),
            _ => None,
        })
    }

    pub fn resolve_response(&self, reference: Option<&str>) -> Result<Option<ResponseHandler>, AppError> {
        self.resolve_as(reference, "response", |c| match c {
            Callable::Response(f) => Some(f),
            _ => None,
        })
    }

    pub fn resolve_pipeline(&self, reference: Option<&str>) -> Result<Option<PipelineFn>, AppError> {
        self.resolve_as(reference, "pipeline", |c| match c {
            Callable::Pipeline(f) => Some(f),
            _ => None,
        })
    }

    pub fn resolve_after(&self, reference: Option<&str>) -> Result<Option<AfterHook>, AppError> {
        self.resolve_as(reference, "after", |c| match c {
            Callable::After(f) => Some(f),
            _ => None,
        })
    }

    pub fn resolve_sink(&self, reference: Option<&str>) -> Result<Option<ResultSink>, AppError> {
        self.resolve_as(reference, "sink", |c| match c {
            Callable::Sink(f) => Some(f),
            _ => None,
        })
    }

    fn resolve_as<T>(
        &self,
        reference: Option<&str>,
        expected: &'static str,
        extract: impl FnOnce(Callable) -> Option<T>,
    ) -> Result<Option<T>, AppError> {
        let Some(callable) = self.resolve(reference)? else {
            return Ok(None);
        };
        let found = callable.kind();
        extract(callable).map(Some).ok_or_else(|| {
            ReferenceError::WrongKind {
                reference: reference.unwrap_or_default().to_string(),
                expected,
                found,
            }
            .into()
        })
    }
}

/// Debug sink: prints the request and record to stdout.
pub fn print_sink() -> ResultSink {
    Arc::new(|req: &Request, record: &ResultRecord| -> Result<(), AppError> {
        println!("{req} {record:?}");
        Ok(())
    })
}

fn builtin_module() -> Module {
    let mut module = Module::new();
    module.insert("print", Callable::Sink(print_sink()));
    module.sink("jsonl", |req, record| {
        let line = serde_json::json!({
            "url": req.url,
            "processor": req.processor,
            "params": req.params,
            "result": record,
        });
        let mut stdout = std::io::stdout().lock();
        writeln!(stdout, "{line}")?;
        Ok(())
    });
    module.after("drop_empty", |mut record| {
        record.retain(|_, values| !values.is_empty());
        record
    });
    module
}
