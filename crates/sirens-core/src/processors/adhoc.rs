//! Escape hatches: `lxml` and `http` hand the page to a registered function.

use crate::config::PatternConfig;
use crate::error::AppError;
use crate::registry::CompileContext;
use crate::traits::{DocumentHandler, ResponseHandler};

fn reference<'v>(key: &str, value: &'v serde_json::Value) -> Result<&'v str, AppError> {
    value.as_str().filter(|s| !s.is_empty()).ok_or_else(|| {
        AppError::ConfigError(format!("'{key}' must be a 'module:name' reference, got {value}"))
    })
}

fn unresolved(reference: &str) -> AppError {
    AppError::ContractViolation(format!("reference '{reference}' resolved to nothing"))
}

pub(super) fn lxml(
    ctx: &CompileContext<'_>,
    value: &serde_json::Value,
    _pattern: &PatternConfig,
) -> Result<DocumentHandler, AppError> {
    let reference = reference("lxml", value)?;
    ctx.functions
        .resolve_document(Some(reference))?
        .ok_or_else(|| unresolved(reference))
}

pub(super) fn http(
    ctx: &CompileContext<'_>,
    value: &serde_json::Value,
    _pattern: &PatternConfig,
) -> Result<ResponseHandler, AppError> {
    let reference = reference("http", value)?;
    ctx.functions
        .resolve_response(Some(reference))?
        .ok_or_else(|| unresolved(reference))
}
