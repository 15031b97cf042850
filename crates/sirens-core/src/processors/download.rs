use std::path::{Path, PathBuf};

use url::Url;

use crate::config::PatternConfig;
use crate::error::AppError;
use crate::registry::CompileContext;
use crate::traits::ResponseHandler;

use super::response_handler;

const INDEX_FILE: &str = "index.html";

/// `download: module:name` hands the raw response to a registered function.
/// Any other value saves the body under the crawl's `downdir`.
pub(super) fn download(
    ctx: &CompileContext<'_>,
    value: &serde_json::Value,
    _pattern: &PatternConfig,
) -> Result<ResponseHandler, AppError> {
    if let Some(reference) = value.as_str().filter(|s| !s.is_empty()) {
        return ctx
            .functions
            .resolve_response(Some(reference))?
            .ok_or_else(|| {
                AppError::ContractViolation(format!("reference '{reference}' resolved to nothing"))
            });
    }

    let downdir = ctx.config.downdir.clone().ok_or_else(|| {
        AppError::ContractViolation(
            "download needs either a 'module:name' value or a crawl-level 'downdir'".into(),
        )
    })?;

    Ok(response_handler(move |_worker, req, resp, _params| {
        std::fs::create_dir_all(&downdir)?;
        let path = target_path(&downdir, &req.url);
        std::fs::write(&path, &resp.content)?;
        tracing::info!(
            url = %req.url,
            path = %path.display(),
            bytes = resp.content.len(),
            "Saved download"
        );
        Ok(())
    }))
}

/// `downdir` joined with the last path segment of `url`.
fn target_path(downdir: &Path, url: &str) -> PathBuf {
    downdir.join(file_name(url))
}

fn file_name(url: &str) -> String {
    let segment = match Url::parse(url) {
        Ok(parsed) => parsed
            .path_segments()
            .and_then(|mut segments| segments.next_back())
            .map(str::to_string),
        Err(_) => url.rsplit('/').next().map(str::to_string),
    };
    segment
        .filter(|s| !s.is_empty() && s != "." && s != "..")
        .unwrap_or_else(|| INDEX_FILE.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::CrawlConfig;
    use crate::models::{FetchResponse, Params, Request};
    use crate::reference::{FunctionRegistry, print_sink};

    #[test]
    fn file_name_is_last_segment() {
        assert_eq!(file_name("https://a.example/files/report.pdf"), "report.pdf");
        assert_eq!(file_name("https://a.example/files/report.pdf?v=2"), "report.pdf");
        assert_eq!(file_name("https://a.example/files/"), "index.html");
        assert_eq!(file_name("https://a.example"), "index.html");
    }

    #[test]
    fn saves_body_under_downdir() {
        let dir = tempfile::tempdir().unwrap();
        let config = CrawlConfig {
            downdir: Some(dir.path().join("out")),
            ..Default::default()
        };
        let functions = FunctionRegistry::new();
        let sink = print_sink();
        let ctx = CompileContext {
            config: &config,
            functions: &functions,
            after: None,
            sink: &sink,
        };
        let handler = download(&ctx, &serde_json::json!(true), &PatternConfig::new()).unwrap();

        let req = Request::new("https://a.example/data/set.csv", "files");
        let resp = FetchResponse::new(req.url.clone(), b"a,b\n1,2\n".to_vec());
        let mut queue: Vec<Request> = Vec::new();
        handler(&mut queue, &req, &resp, &Params::new()).unwrap();

        let saved = std::fs::read(dir.path().join("out").join("set.csv")).unwrap();
        assert_eq!(saved, b"a,b\n1,2\n");
        assert!(queue.is_empty());
    }

    #[test]
    fn missing_downdir_is_contract_violation() {
        let config = CrawlConfig::default();
        let functions = FunctionRegistry::new();
        let sink = print_sink();
        let ctx = CompileContext {
            config: &config,
            functions: &functions,
            after: None,
            sink: &sink,
        };
        let err = download(&ctx, &serde_json::json!(true), &PatternConfig::new())
            .map(|_| ())
            .unwrap_err();
        assert!(matches!(err, AppError::ContractViolation(_)));
    }

    #[test]
    fn reference_value_uses_registered_function() {
        let config = CrawlConfig::default();
        let mut functions = FunctionRegistry::new();
        functions.module("store").response("keep", |worker, req, _, _| {
            worker.append(Request::new(req.url.clone(), "kept"));
            Ok(())
        });
        let sink = print_sink();
        let ctx = CompileContext {
            config: &config,
            functions: &functions,
            after: None,
            sink: &sink,
        };
        let handler =
            download(&ctx, &serde_json::json!("store:keep"), &PatternConfig::new()).unwrap();
        let req = Request::new("https://a.example/x.bin", "files");
        let resp = FetchResponse::new(req.url.clone(), vec![0u8, 1, 2]);
        let mut queue: Vec<Request> = Vec::new();
        handler(&mut queue, &req, &resp, &Params::new()).unwrap();
        assert_eq!(queue[0].processor, "kept");
    }
}
