use std::sync::Arc;

use crate::config::{PatternConfig, as_record};
use crate::error::AppError;
use crate::models::ResultRecord;
use crate::parser::{Extraction, parser_map};
use crate::registry::CompileContext;
use crate::traits::DocumentHandler;

use super::document_handler;

/// `result: {field: {css, attr, trim, regex}, ...}`
///
/// Each field runs its own extraction and collects every value it yields.
/// The record passes through the crawl-wide `after` hook, if any, and is
/// handed to the sink only when it still has fields.
pub(super) fn result(
    ctx: &CompileContext<'_>,
    value: &serde_json::Value,
    _pattern: &PatternConfig,
) -> Result<DocumentHandler, AppError> {
    let fields = as_record("result", value)?
        .iter()
        .map(|(name, cfg)| {
            let extraction = parser_map(as_record(name, cfg)?).map_err(|e| match e {
                AppError::ConfigError(msg) => AppError::ConfigError(format!("field '{name}': {msg}")),
                other => other,
            })?;
            Ok((name.clone(), extraction))
        })
        .collect::<Result<Vec<(String, Extraction)>, AppError>>()?;

    let after = ctx.after.cloned();
    let sink = Arc::clone(ctx.sink);

    Ok(document_handler(move |_worker, req, doc, _params| {
        let mut record: ResultRecord = fields
            .iter()
            .map(|(name, extraction)| (name.clone(), extraction.extract(doc).collect()))
            .collect();
        if let Some(after) = &after {
            record = after(record);
        }
        if record.is_empty() {
            tracing::debug!(url = %req.url, "Empty result dropped");
            return Ok(());
        }
        sink(req, &record)
    }))
}
