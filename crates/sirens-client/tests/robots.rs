//! robots.txt policy tests against a local mock HTTP server.

use sirens_client::{ReqwestFetcher, RobotsTxtPolicy};
use sirens_core::traits::RobotsPolicy;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

const ROBOTS: &str = "\
User-agent: *
Disallow: /private/

User-agent: sirens
Disallow: /no-sirens/
";

async fn server_with_robots(status: u16, body: &str) -> MockServer {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/robots.txt"))
        .respond_with(ResponseTemplate::new(status).set_body_string(body))
        .expect(1)
        .mount(&server)
        .await;
    server
}

#[tokio::test]
async fn applies_rules_and_fetches_once_per_origin() -> anyhow::Result<()> {
    let server = server_with_robots(200, ROBOTS).await;
    let policy = RobotsTxtPolicy::new(ReqwestFetcher::new()?, "sirens/0.3.0");
    let base = server.uri();

    assert!(policy.allowed(&format!("{base}/public/page")).await);
    assert!(!policy.allowed(&format!("{base}/no-sirens/page")).await);
    // The specific group replaces the `*` group for this agent.
    assert!(policy.allowed(&format!("{base}/private/page")).await);
    Ok(())
}

#[tokio::test]
async fn other_agents_fall_back_to_wildcard_group() -> anyhow::Result<()> {
    let server = server_with_robots(200, ROBOTS).await;
    let policy = RobotsTxtPolicy::new(ReqwestFetcher::new()?, "otherbot");
    let base = server.uri();

    assert!(!policy.allowed(&format!("{base}/private/page")).await);
    assert!(policy.allowed(&format!("{base}/no-sirens/page")).await);
    Ok(())
}

#[tokio::test]
async fn missing_robots_allows_everything() -> anyhow::Result<()> {
    let server = server_with_robots(404, "").await;
    let policy = RobotsTxtPolicy::new(ReqwestFetcher::new()?, "sirens");

    assert!(policy.allowed(&format!("{}/private/page", server.uri())).await);
    assert!(policy.allowed(&format!("{}/anything", server.uri())).await);
    Ok(())
}
