use std::borrow::Cow;
use std::fmt;

use serde::{Deserialize, Serialize};

/// Ordered string-keyed config record (pattern definitions, sub-configs).
pub type ConfigMap = serde_json::Map<String, serde_json::Value>;

/// Parameters carried by a request and inherited by the requests it spawns.
pub type Params = serde_json::Map<String, serde_json::Value>;

/// Extracted fields for one fetched page: field name → values in document order.
///
/// Fields keep the order they were declared in the pattern.
pub type ResultRecord = indexmap::IndexMap<String, Vec<String>>;

/// A unit of crawl work: fetch `url` and hand the result to `processor`.
///
/// `processor` is either the name of a compiled pattern or an inline
/// `module:name` reference to a registered pipeline function.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Request {
    pub url: String,
    pub processor: String,
    #[serde(default)]
    pub params: Params,
}

impl Request {
    pub fn new(url: impl Into<String>, processor: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            processor: processor.into(),
            params: Params::new(),
        }
    }

    pub fn with_params(mut self, params: Params) -> Self {
        self.params = params;
        self
    }

    /// The request as it stands after the transport followed redirects to
    /// `final_url`. Relative links on the page resolve against the result.
    pub fn redirected(&self, final_url: &str) -> Cow<'_, Request> {
        if final_url.is_empty() || final_url == self.url {
            return Cow::Borrowed(self);
        }
        Cow::Owned(Request {
            url: final_url.to_string(),
            processor: self.processor.clone(),
            params: self.params.clone(),
        })
    }

    /// True when `processor` is an inline `module:name` reference.
    pub fn is_inline(&self) -> bool {
        self.processor.contains(':')
    }
}

impl fmt::Display for Request {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "<Request {} -> {}>", self.url, self.processor)
    }
}

/// Raw transport result for one request.
#[derive(Debug, Clone, PartialEq)]
pub struct FetchResponse {
    /// Final URL after redirects.
    pub url: String,
    pub status: u16,
    pub content_type: Option<String>,
    pub content: Vec<u8>,
}

impl FetchResponse {
    pub fn new(url: impl Into<String>, content: impl Into<Vec<u8>>) -> Self {
        Self {
            url: url.into(),
            status: 200,
            content_type: None,
            content: content.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_inline_processor_detection() {
        assert!(Request::new("http://a.example", "hooks:fetch").is_inline());
        assert!(Request::new("http://a.example", ":fetch").is_inline());
        assert!(!Request::new("http://a.example", "index").is_inline());
    }

    #[test]
    fn test_request_display() {
        let req = Request::new("http://a.example/x", "page");
        assert_eq!(req.to_string(), "<Request http://a.example/x -> page>");
    }

    #[test]
    fn test_redirected_request_keeps_processor_and_params() {
        let mut params = Params::new();
        params.insert("depth".into(), 1.into());
        let req = Request::new("https://a.example/posts", "post").with_params(params.clone());

        let moved = req.redirected("https://a.example/posts/");
        assert_eq!(moved.url, "https://a.example/posts/");
        assert_eq!(moved.processor, "post");
        assert_eq!(moved.params, params);

        assert!(matches!(req.redirected("https://a.example/posts"), Cow::Borrowed(_)));
        assert!(matches!(req.redirected(""), Cow::Borrowed(_)));
    }

    #[test]
    fn test_request_deserializes_without_params() {
        let req: Request =
            serde_json::from_str(r#"{"url": "http://a.example", "processor": "index"}"#).unwrap();
        assert!(req.params.is_empty());
    }
}
