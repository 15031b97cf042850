//! robots.txt predicate with a per-origin cache.

use std::sync::Arc;
use std::time::Duration;

use moka::future::Cache;
use robotstxt::DefaultMatcher;
use sirens_core::traits::{Fetcher, RobotsPolicy};
use url::Url;

const ROBOTS_TTL: Duration = Duration::from_secs(24 * 3600);
const MAX_ORIGINS: u64 = 10_000;

/// Checks URLs against the origin's robots.txt, fetched once per origin.
///
/// A robots.txt that cannot be fetched (404, 5xx, network error) allows
/// everything on that origin.
#[derive(Clone)]
pub struct RobotsTxtPolicy<F: Fetcher> {
    fetcher: F,
    agent: String,
    cache: Cache<String, Arc<str>>,
}

impl<F: Fetcher> RobotsTxtPolicy<F> {
    /// `user_agent` may be a full header value; only the product token
    /// (`sirens` in `sirens/0.3.0`) is matched against robots groups.
    pub fn new(fetcher: F, user_agent: &str) -> Self {
        Self {
            fetcher,
            agent: product_token(user_agent).to_string(),
            cache: Cache::builder()
                .max_capacity(MAX_ORIGINS)
                .time_to_live(ROBOTS_TTL)
                .build(),
        }
    }

    async fn load(&self, origin: &str) -> Arc<str> {
        let robots_url = format!("{origin}/robots.txt");
        match self.fetcher.fetch(&robots_url).await {
            Ok(resp) => String::from_utf8_lossy(&resp.content).into(),
            Err(e) => {
                tracing::debug!(%origin, error = %e, "No usable robots.txt, allowing all");
                Arc::from("")
            }
        }
    }
}

impl<F: Fetcher> RobotsPolicy for RobotsTxtPolicy<F> {
    async fn allowed(&self, url: &str) -> bool {
        let Some(origin) = origin_of(url) else {
            return true;
        };
        let body = self.cache.get_with(origin.clone(), self.load(&origin)).await;
        let allowed =
            DefaultMatcher::default().one_agent_allowed_by_robots(&body, &self.agent, url);
        if !allowed {
            tracing::debug!(%url, agent = %self.agent, "robots.txt disallows URL");
        }
        allowed
    }
}

fn product_token(user_agent: &str) -> &str {
    user_agent
        .split(['/', ' '])
        .next()
        .filter(|s| !s.is_empty())
        .unwrap_or(user_agent)
}

/// `scheme://host[:port]` of an http(s) URL.
fn origin_of(url: &str) -> Option<String> {
    let parsed = Url::parse(url).ok()?;
    if !matches!(parsed.scheme(), "http" | "https") {
        return None;
    }
    let host = parsed.host_str()?;
    Some(match parsed.port() {
        Some(port) => format!("{}://{host}:{port}", parsed.scheme()),
        None => format!("{}://{host}", parsed.scheme()),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn product_token_strips_version() {
        assert_eq!(product_token("sirens/0.3.0"), "sirens");
        assert_eq!(product_token("MyBot (+https://x.example)"), "MyBot");
        assert_eq!(product_token("plain"), "plain");
    }

    #[test]
    fn origin_keeps_explicit_port() {
        assert_eq!(
            origin_of("http://127.0.0.1:8080/a/b?c").as_deref(),
            Some("http://127.0.0.1:8080")
        );
        assert_eq!(
            origin_of("https://a.example/x").as_deref(),
            Some("https://a.example")
        );
        assert_eq!(origin_of("mailto:x@y.z"), None);
    }
}
