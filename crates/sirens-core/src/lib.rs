pub mod app;
pub mod config;
pub mod decode;
pub mod error;
pub mod filters;
pub mod models;
pub mod parser;
pub mod processors;
pub mod reference;
pub mod registry;
pub mod throttle;
pub mod traits;

#[cfg(test)]
pub(crate) mod testutil;

pub use app::{Application, DispatchOutcome, Pipeline};
pub use config::{CrawlConfig, PatternConfig};
pub use error::{AppError, ReferenceError};
pub use models::{ConfigMap, FetchResponse, Params, Request, ResultRecord};
pub use reference::{Callable, FunctionRegistry, Module};
pub use registry::ProcessorRegistry;
pub use traits::{AllowAll, Fetcher, RateLimiter, RobotsPolicy, Worker};
