//! XML sitemap expansion.
//!
//! Handles both `<urlset>` documents and `<sitemapindex>` documents in the
//! sitemaps.org namespace; every `<loc>` of a direct `<url>` or `<sitemap>`
//! child becomes a follow-up request. Gzipped bodies are inflated first.

use quick_xml::events::Event;
use quick_xml::name::{Namespace, ResolveResult};
use quick_xml::reader::NsReader;

use crate::config::{PatternConfig, as_record};
use crate::decode::gunzip;
use crate::error::AppError;
use crate::filters::{LinkFilter, TextFilter, Values};
use crate::models::Request;
use crate::registry::CompileContext;
use crate::traits::ResponseHandler;

use super::response_handler;

pub const SITEMAP_NS: &str = "http://www.sitemaps.org/schemas/sitemap/0.9";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Tag {
    UrlSet,
    Index,
    Entry,
    Loc,
    Other,
}

impl Tag {
    fn classify(parent: Option<Tag>, in_ns: bool, local: &[u8]) -> Tag {
        if !in_ns {
            return Tag::Other;
        }
        match (parent, local) {
            (None, b"urlset") => Tag::UrlSet,
            (None, b"sitemapindex") => Tag::Index,
            (Some(Tag::UrlSet), b"url") | (Some(Tag::Index), b"sitemap") => Tag::Entry,
            (Some(Tag::Entry), b"loc") => Tag::Loc,
            _ => Tag::Other,
        }
    }
}

/// Lazy iterator over the `<loc>` values of a sitemap document.
///
/// Yields `Err` once on malformed XML and then stops.
pub struct SitemapLocs<'a> {
    reader: NsReader<&'a [u8]>,
    buf: Vec<u8>,
    stack: Vec<Tag>,
    text: String,
    seen_root: bool,
    done: bool,
}

impl<'a> SitemapLocs<'a> {
    pub fn new(xml: &'a [u8]) -> Self {
        Self {
            reader: NsReader::from_reader(xml),
            buf: Vec::new(),
            stack: Vec::new(),
            text: String::new(),
            seen_root: false,
            done: false,
        }
    }
}

impl Iterator for SitemapLocs<'_> {
    type Item = Result<String, AppError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }
        loop {
            self.buf.clear();
            match self.reader.read_resolved_event_into(&mut self.buf) {
                Ok((ns, Event::Start(e))) => {
                    let in_ns = matches!(
                        ns,
                        ResolveResult::Bound(Namespace(uri)) if uri == SITEMAP_NS.as_bytes()
                    );
                    let parent = self.stack.last().copied();
                    let tag = Tag::classify(parent, in_ns, e.local_name().as_ref());
                    if tag == Tag::Loc {
                        self.text.clear();
                    }
                    self.stack.push(tag);
                    self.seen_root = true;
                }
                Ok((_, Event::Empty(_))) => self.seen_root = true,
                Ok((_, Event::Text(e))) if self.stack.last() == Some(&Tag::Loc) => {
                    match e.unescape() {
                        Ok(text) => self.text.push_str(&text),
                        Err(err) => {
                            self.done = true;
                            return Some(Err(malformed(err)));
                        }
                    }
                }
                Ok((_, Event::CData(e))) if self.stack.last() == Some(&Tag::Loc) => {
                    self.text.push_str(&String::from_utf8_lossy(&e));
                }
                Ok((_, Event::End(_))) => {
                    if self.stack.pop() == Some(Tag::Loc) {
                        let loc = self.text.trim();
                        if !loc.is_empty() {
                            return Some(Ok(loc.to_string()));
                        }
                    }
                }
                Ok((_, Event::Eof)) => {
                    self.done = true;
                    if !self.seen_root {
                        return Some(Err(AppError::DecodeError("sitemap document is empty".into())));
                    }
                    if !self.stack.is_empty() {
                        return Some(Err(AppError::DecodeError(
                            "sitemap document ends inside an element".into(),
                        )));
                    }
                    return None;
                }
                Ok(_) => {}
                Err(err) => {
                    self.done = true;
                    return Some(Err(malformed(err)));
                }
            }
        }
    }
}

fn malformed(err: quick_xml::Error) -> AppError {
    AppError::DecodeError(format!("malformed sitemap XML: {err}"))
}

/// `sitemap: {call, params, same_host, trim, regex}`
pub(super) fn sitemap(
    _ctx: &CompileContext<'_>,
    value: &serde_json::Value,
    _pattern: &PatternConfig,
) -> Result<ResponseHandler, AppError> {
    let cfg = as_record("sitemap", value)?;
    let text = if TextFilter::applies_to(cfg) {
        Some(TextFilter::from_config(cfg)?)
    } else {
        None
    };
    let links = LinkFilter::from_config(cfg)?;

    Ok(response_handler(move |worker, req, resp, params| {
        let xml = gunzip(&resp.content)?;
        let mut failure = None;
        let locs: Values<'_> = Box::new(SitemapLocs::new(&xml).map_while(|loc| match loc {
            Ok(loc) => Some(loc),
            Err(e) => {
                failure = Some(e);
                None
            }
        }));
        let locs = match &text {
            Some(filter) => filter.apply(locs),
            None => locs,
        };
        let found: Vec<Request> = links.apply(req, params, locs).collect();
        if let Some(e) = failure {
            return Err(e);
        }

        tracing::debug!(url = %req.url, discovered = found.len(), "Expanded sitemap");
        for next in found {
            worker.append(next);
        }
        Ok(())
    }))
}
