//! Extraction parsers and the parser selector.
//!
//! [`parser_map`] turns a sub-config such as `{css: "h1", trim: true}` into
//! one [`Extraction`]: the first candidate parser whose keys appear in the
//! sub-config, wrapped by every applicable filter in declaration order.

use scraper::{Html, Selector};

use crate::config::get_str;
use crate::error::AppError;
use crate::filters::{TextFilter, Values};
use crate::models::ConfigMap;

/// Selects nodes with a CSS selector and yields their text or an attribute.
///
/// Keys: `css` (selector), `attr` (optional attribute name). Elements that
/// lack the attribute are skipped.
#[derive(Debug, Clone)]
pub struct HtmlParser {
    selector: Selector,
    attr: Option<String>,
}

impl HtmlParser {
    pub const KEYS: &'static [&'static str] = &["css"];

    pub fn from_config(cfg: &ConfigMap) -> Result<Self, AppError> {
        let css = get_str(cfg, "css")?
            .ok_or_else(|| AppError::ConfigError("'css' must not be empty".into()))?;
        let selector = Selector::parse(css)
            .map_err(|e| AppError::ConfigError(format!("Invalid selector '{css}': {e}")))?;
        Ok(Self {
            selector,
            attr: get_str(cfg, "attr")?.map(str::to_string),
        })
    }

    pub fn parse<'a>(&'a self, doc: &'a Html) -> Values<'a> {
        let nodes = doc.select(&self.selector);
        match &self.attr {
            Some(attr) => Box::new(
                nodes.filter_map(move |el| el.value().attr(attr).map(str::to_string)),
            ),
            None => Box::new(nodes.map(|el| el.text().collect::<String>())),
        }
    }
}

/// A concrete extraction parser chosen by [`parser_map`].
#[derive(Debug, Clone)]
pub enum Parser {
    Html(HtmlParser),
}

impl Parser {
    pub fn parse<'a>(&'a self, doc: &'a Html) -> Values<'a> {
        match self {
            Parser::Html(p) => p.parse(doc),
        }
    }
}

type ParserCtor = fn(&ConfigMap) -> Result<Parser, AppError>;
type FilterCtor = fn(&ConfigMap) -> Result<TextFilter, AppError>;

/// Candidate parsers, tried in order; first key match wins.
const PARSERS: &[(&[&str], ParserCtor)] = &[(HtmlParser::KEYS, html_parser)];

/// Filters applied on top of the parser, in declaration order.
const FILTERS: &[(&[&str], FilterCtor)] = &[(TextFilter::KEYS, TextFilter::from_config)];

fn html_parser(cfg: &ConfigMap) -> Result<Parser, AppError> {
    HtmlParser::from_config(cfg).map(Parser::Html)
}

fn has_any(cfg: &ConfigMap, keys: &[&str]) -> bool {
    keys.iter().any(|k| cfg.contains_key(*k))
}

/// A parser composed with its filters: one extraction function.
#[derive(Debug, Clone)]
pub struct Extraction {
    parser: Parser,
    filters: Vec<TextFilter>,
}

impl Extraction {
    /// Run the parser over `doc` and thread the values through each filter.
    ///
    /// The returned sequence is lazy and can be consumed once.
    pub fn extract<'a>(&'a self, doc: &'a Html) -> Values<'a> {
        self.filters
            .iter()
            .fold(self.parser.parse(doc), |values, filter| filter.apply(values))
    }
}

/// Build the extraction function described by `cfg`.
pub fn parser_map(cfg: &ConfigMap) -> Result<Extraction, AppError> {
    let (_, ctor) = PARSERS
        .iter()
        .find(|(keys, _)| has_any(cfg, keys))
        .ok_or_else(|| {
            AppError::ConfigError(format!(
                "no parser match for config: {}",
                serde_json::Value::Object(cfg.clone())
            ))
        })?;
    let parser = ctor(cfg)?;

    let filters = FILTERS
        .iter()
        .filter(|(keys, _)| has_any(cfg, keys))
        .map(|(_, ctor)| ctor(cfg))
        .collect::<Result<Vec<_>, _>>()?;

    Ok(Extraction { parser, filters })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil::fixtures::record;

    const PAGE: &str = r#"
        <html><body>
          <h1>  Hello  </h1>
          <ul>
            <li><a href="/a">A</a></li>
            <li><a name="anchor">no href</a></li>
            <li><a href="/b?id=7">B</a></li>
          </ul>
        </body></html>"#;

    fn extract(cfg: serde_json::Value) -> Vec<String> {
        let doc = Html::parse_document(PAGE);
        let extraction = parser_map(&record(cfg)).unwrap();
        extraction.extract(&doc).collect()
    }

    #[test]
    fn selects_text_by_default() {
        assert_eq!(extract(serde_json::json!({"css": "h1"})), vec!["  Hello  "]);
    }

    #[test]
    fn selects_attribute_and_skips_missing() {
        assert_eq!(
            extract(serde_json::json!({"css": "a", "attr": "href"})),
            vec!["/a", "/b?id=7"]
        );
    }

    #[test]
    fn wraps_with_text_filter() {
        assert_eq!(
            extract(serde_json::json!({"css": "h1", "trim": true})),
            vec!["Hello"]
        );
        assert_eq!(
            extract(serde_json::json!({"css": "a", "attr": "href", "regex": r"id=(\d+)"})),
            vec!["7"]
        );
    }

    #[test]
    fn no_matching_parser_is_config_error() {
        let err = parser_map(&record(serde_json::json!({"trim": true}))).unwrap_err();
        assert!(matches!(err, AppError::ConfigError(ref m) if m.contains("no parser match")));
    }

    #[test]
    fn invalid_selector_is_config_error() {
        let err = parser_map(&record(serde_json::json!({"css": "a[["}))).unwrap_err();
        assert!(matches!(err, AppError::ConfigError(_)));
    }

    #[test]
    fn no_nodes_yields_empty_sequence() {
        assert!(extract(serde_json::json!({"css": "table td"})).is_empty());
    }
}
