//! Built-in processor families.
//!
//! | Key        | Table    | Handler                                         |
//! |------------|----------|-------------------------------------------------|
//! | `lxml`     | document | registered `module:name` document function      |
//! | `links`    | document | extract URLs, append follow-up requests         |
//! | `result`   | document | extract fields, hand the record to the sink     |
//! | `http`     | response | registered `module:name` response function      |
//! | `download` | response | registered function, or save body to `downdir`  |
//! | `sitemap`  | response | expand a (gzipped) XML sitemap into requests    |

mod adhoc;
mod download;
mod links;
mod result;
mod sitemap;

use std::sync::Arc;

use scraper::Html;

pub use sitemap::{SITEMAP_NS, SitemapLocs};

use crate::error::AppError;
use crate::models::{FetchResponse, Params, Request};
use crate::registry::ProcessorRegistry;
use crate::traits::{DocumentHandler, ResponseHandler, Worker};

pub(crate) fn register_builtins(registry: &mut ProcessorRegistry) {
    registry.push_document("lxml", adhoc::lxml);
    registry.push_document("links", links::links);
    registry.push_document("result", result::result);
    registry.push_response("http", adhoc::http);
    registry.push_response("download", download::download);
    registry.push_response("sitemap", sitemap::sitemap);
}

fn document_handler<F>(f: F) -> DocumentHandler
where
    F: Fn(&mut dyn Worker, &Request, &Html, &Params) -> Result<(), AppError> + Send + Sync + 'static,
{
    Arc::new(f)
}

fn response_handler<F>(f: F) -> ResponseHandler
where
    F: Fn(&mut dyn Worker, &Request, &FetchResponse, &Params) -> Result<(), AppError>
        + Send
        + Sync
        + 'static,
{
    Arc::new(f)
}
