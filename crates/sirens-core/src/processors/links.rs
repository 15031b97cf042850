use crate::config::{PatternConfig, as_record};
use crate::error::AppError;
use crate::filters::LinkFilter;
use crate::models::ConfigMap;
use crate::parser::{Extraction, parser_map};
use crate::registry::CompileContext;
use crate::traits::DocumentHandler;

use super::document_handler;

/// One `links` entry: extraction function plus the link filter around it.
struct LinkRule {
    extraction: Extraction,
    links: LinkFilter,
}

impl LinkRule {
    fn from_config(cfg: &ConfigMap) -> Result<Self, AppError> {
        Ok(Self {
            extraction: parser_map(cfg)?,
            links: LinkFilter::from_config(cfg)?,
        })
    }
}

/// `links: [ {css, attr, call, ...}, ... ]` (a single mapping is accepted too).
pub(super) fn links(
    _ctx: &CompileContext<'_>,
    value: &serde_json::Value,
    _pattern: &PatternConfig,
) -> Result<DocumentHandler, AppError> {
    let configs: Vec<&ConfigMap> = match value {
        serde_json::Value::Array(items) => items
            .iter()
            .map(|item| as_record("links", item))
            .collect::<Result<_, _>>()?,
        serde_json::Value::Object(map) => vec![map],
        other => {
            return Err(AppError::ConfigError(format!(
                "'links' must be a list of mappings, got {other}"
            )));
        }
    };
    if configs.is_empty() {
        return Err(AppError::ConfigError("'links' must not be empty".into()));
    }

    let rules = configs
        .into_iter()
        .map(LinkRule::from_config)
        .collect::<Result<Vec<_>, _>>()?;

    Ok(document_handler(move |worker, req, doc, params| {
        let mut discovered = 0usize;
        for rule in &rules {
            for next in rule.links.apply(req, params, rule.extraction.extract(doc)) {
                worker.append(next);
                discovered += 1;
            }
        }
        tracing::debug!(url = %req.url, %discovered, "Extracted links");
        Ok(())
    }))
}

#[cfg(test)]
mod tests {
    use scraper::Html;

    use super::*;
    use crate::config::CrawlConfig;
    use crate::models::{Params, Request};
    use crate::reference::{FunctionRegistry, print_sink};
    use crate::testutil::fixtures::record;

    const PAGE: &str = r#"<html><body>
        <nav><a class="next" href="?page=2">next</a></nav>
        <article><a href="/post/1">one</a><a href="/post/2">two</a></article>
    </body></html>"#;

    fn compile(value: serde_json::Value) -> Result<DocumentHandler, AppError> {
        let config = CrawlConfig::default();
        let functions = FunctionRegistry::new();
        let sink = print_sink();
        let ctx = CompileContext {
            config: &config,
            functions: &functions,
            after: None,
            sink: &sink,
        };
        links(&ctx, &value, &PatternConfig::new())
    }

    #[test]
    fn every_rule_runs_against_the_same_document() {
        let handler = compile(serde_json::json!([
            {"css": "article a", "attr": "href", "call": "post"},
            {"css": "a.next", "attr": "href", "call": "index", "params": {"paged": true}}
        ]))
        .unwrap();

        let doc = Html::parse_document(PAGE);
        let req = Request::new("https://blog.example/list", "index");
        let params = record(serde_json::json!({"depth": 0}));
        let mut queue: Vec<Request> = Vec::new();
        handler(&mut queue, &req, &doc, &params).unwrap();

        let got: Vec<(&str, &str)> = queue
            .iter()
            .map(|r| (r.url.as_str(), r.processor.as_str()))
            .collect();
        assert_eq!(
            got,
            vec![
                ("https://blog.example/post/1", "post"),
                ("https://blog.example/post/2", "post"),
                ("https://blog.example/list?page=2", "index"),
            ]
        );
        assert_eq!(queue[0].params, params);
        assert_eq!(queue[2].params.get("paged"), Some(&serde_json::json!(true)));
    }

    #[test]
    fn single_mapping_is_accepted() {
        let handler =
            compile(serde_json::json!({"css": "a.next", "attr": "href", "call": "index"})).unwrap();
        let doc = Html::parse_document(PAGE);
        let mut queue: Vec<Request> = Vec::new();
        handler(
            &mut queue,
            &Request::new("https://blog.example/list", "index"),
            &doc,
            &Params::new(),
        )
        .unwrap();
        assert_eq!(queue.len(), 1);
    }

    #[test]
    fn invalid_shapes_fail_compilation() {
        assert!(compile(serde_json::json!("a")).is_err());
        assert!(compile(serde_json::json!([])).is_err());
        // parser without link target
        assert!(compile(serde_json::json!([{"css": "a"}])).is_err());
        // link target without parser
        assert!(compile(serde_json::json!([{"call": "post"}])).is_err());
    }
}
