//! Runs against a live Redis server when `TURNSTILE_TEST_REDIS_URL` is set.

use indoc::formatdoc;
use integration_tests::TestServer;

fn redis_url() -> Option<String> {
    std::env::var("TURNSTILE_TEST_REDIS_URL").ok()
}

fn unique_prefix(test: &str) -> String {
    let timestamp = std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap()
        .as_millis();

    format!("{test}_{timestamp}")
}

#[tokio::test]
async fn basic_redis_rate_limiting() {
    let Some(url) = redis_url() else {
        return;
    };

    let prefix = unique_prefix("basic_redis");

    let config = formatdoc! {r#"
        [rate_limit]
        points = 3
        duration = "60s"
        key_prefix = "{prefix}"

        [rate_limit.storage]
        type = "redis"
        url = "{url}"
    "#};

    let server = TestServer::start(&config).await;

    for expected_remaining in ["2", "1", "0"] {
        let response = server.client.get("/").await;

        assert_eq!(response.status(), 200);
        assert_eq!(response.headers()["x-ratelimit-remaining"], expected_remaining);
    }

    assert_eq!(server.client.get("/").await.status(), 429);
}

#[tokio::test]
async fn instances_share_counters() {
    let Some(url) = redis_url() else {
        return;
    };

    let prefix = unique_prefix("shared_redis");

    let config = formatdoc! {r#"
        [rate_limit]
        points = 2
        duration = "60s"
        key_prefix = "{prefix}"

        [rate_limit.storage]
        type = "redis"
        url = "{url}"
    "#};

    let first = TestServer::start(&config).await;
    let second = TestServer::start(&config).await;

    assert_eq!(first.client.get("/").await.status(), 200);
    assert_eq!(second.client.get("/").await.status(), 200);
    assert_eq!(first.client.get("/").await.status(), 429);
    assert_eq!(second.client.get("/").await.status(), 429);
}
