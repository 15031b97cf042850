//! Filters over lazy value sequences.
//!
//! Every filter consumes its upstream iterator exactly once, in order, and
//! yields a new single-pass iterator. Nothing is buffered.

use regex::Regex;
use url::Url;

use crate::config::{as_record, get_bool, get_str};
use crate::error::AppError;
use crate::models::{ConfigMap, Params, Request};

/// Lazy, finite, non-restartable sequence of extracted strings.
pub type Values<'a> = Box<dyn Iterator<Item = String> + 'a>;

/// Cleans and validates extracted strings.
///
/// - `trim: true` trims whitespace and drops items that end up empty.
/// - `regex: <pattern>` keeps matching items only. With a capture group the
///   item becomes group 1, otherwise the whole match.
#[derive(Debug, Clone)]
pub struct TextFilter {
    trim: bool,
    regex: Option<Regex>,
}

impl TextFilter {
    pub const KEYS: &'static [&'static str] = &["trim", "regex"];

    pub fn from_config(cfg: &ConfigMap) -> Result<Self, AppError> {
        let regex = get_str(cfg, "regex")?
            .map(|pattern| {
                Regex::new(pattern)
                    .map_err(|e| AppError::ConfigError(format!("Invalid regex '{pattern}': {e}")))
            })
            .transpose()?;
        Ok(Self {
            trim: get_bool(cfg, "trim")?,
            regex,
        })
    }

    /// True when `cfg` carries any key this filter understands.
    pub fn applies_to(cfg: &ConfigMap) -> bool {
        Self::KEYS.iter().any(|k| cfg.contains_key(*k))
    }

    pub fn apply<'a>(&'a self, upstream: Values<'a>) -> Values<'a> {
        Box::new(upstream.filter_map(move |value| self.clean(value)))
    }

    fn clean(&self, value: String) -> Option<String> {
        let value = if self.trim {
            let trimmed = value.trim();
            if trimmed.is_empty() {
                return None;
            }
            trimmed.to_string()
        } else {
            value
        };

        match &self.regex {
            None => Some(value),
            Some(re) => {
                let caps = re.captures(&value)?;
                let m = caps.get(1).or_else(|| caps.get(0))?;
                Some(m.as_str().to_string())
            }
        }
    }
}

/// Turns extracted URLs into follow-up [`Request`]s.
///
/// - `call` (required): processor name for the new requests.
/// - `params`: mapping merged over the parent request's params.
/// - `same_host: true`: drop links leaving the parent's host.
///
/// Relative URLs are resolved against the parent request. Anything that is
/// not `http`/`https` after resolution is dropped; fragments are stripped.
#[derive(Debug, Clone)]
pub struct LinkFilter {
    call: String,
    params: Params,
    same_host: bool,
}

impl LinkFilter {
    pub fn from_config(cfg: &ConfigMap) -> Result<Self, AppError> {
        let call = get_str(cfg, "call")?
            .ok_or_else(|| AppError::ConfigError("link filter requires 'call'".into()))?;
        let params = match cfg.get("params") {
            None | Some(serde_json::Value::Null) => Params::new(),
            Some(value) => as_record("params", value)?.clone(),
        };
        Ok(Self {
            call: call.to_string(),
            params,
            same_host: get_bool(cfg, "same_host")?,
        })
    }

    pub fn apply<'a>(
        &'a self,
        parent: &'a Request,
        params: &'a Params,
        upstream: Values<'a>,
    ) -> impl Iterator<Item = Request> + 'a {
        let base = Url::parse(&parent.url).ok();
        let mut merged = params.clone();
        merged.extend(self.params.iter().map(|(k, v)| (k.clone(), v.clone())));

        upstream.filter_map(move |raw| {
            let url = self.resolve(base.as_ref(), raw.trim())?;
            Some(Request {
                url: url.into(),
                processor: self.call.clone(),
                params: merged.clone(),
            })
        })
    }

    fn resolve(&self, base: Option<&Url>, raw: &str) -> Option<Url> {
        if raw.is_empty() {
            return None;
        }
        let mut url = match base {
            Some(base) => base.join(raw).ok()?,
            None => Url::parse(raw).ok()?,
        };
        if !matches!(url.scheme(), "http" | "https") {
            return None;
        }
        if self.same_host && base.and_then(Url::host_str) != url.host_str() {
            return None;
        }
        url.set_fragment(None);
        Some(url)
    }
}
