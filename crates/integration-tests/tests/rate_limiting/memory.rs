use indoc::indoc;
use integration_tests::TestServer;
use serde_json::json;

#[tokio::test]
async fn five_requests_per_minute() {
    let config = indoc! {r#"
        [rate_limit]
        points = 5
        duration = "60s"
    "#};

    let server = TestServer::start(config).await;

    let mut results = Vec::new();

    for i in 1..=6 {
        let response = server.client.get("/").await;
        let headers = response.headers();

        results.push(json!({
            "request": i,
            "status": response.status().as_u16(),
            "limit": headers.get("x-ratelimit-limit").map(|h| h.to_str().unwrap()),
            "remaining": headers.get("x-ratelimit-remaining").map(|h| h.to_str().unwrap()),
            "has_reset": headers.contains_key("x-ratelimit-reset"),
            "has_retry_after": headers.contains_key("retry-after"),
        }));
    }

    insta::assert_json_snapshot!(results, @r#"
    [
      {
        "has_reset": true,
        "has_retry_after": false,
        "limit": "5",
        "remaining": "4",
        "request": 1,
        "status": 200
      },
      {
        "has_reset": true,
        "has_retry_after": false,
        "limit": "5",
        "remaining": "3",
        "request": 2,
        "status": 200
      },
      {
        "has_reset": true,
        "has_retry_after": false,
        "limit": "5",
        "remaining": "2",
        "request": 3,
        "status": 200
      },
      {
        "has_reset": true,
        "has_retry_after": false,
        "limit": "5",
        "remaining": "1",
        "request": 4,
        "status": 200
      },
      {
        "has_reset": true,
        "has_retry_after": false,
        "limit": "5",
        "remaining": "0",
        "request": 5,
        "status": 200
      },
      {
        "has_reset": true,
        "has_retry_after": true,
        "limit": "5",
        "remaining": "0",
        "request": 6,
        "status": 429
      }
    ]
    "#);
}

#[tokio::test]
async fn rejection_body_and_retry_after() {
    let config = indoc! {r#"
        [rate_limit]
        points = 1
        duration = "60s"
    "#};

    let server = TestServer::start(config).await;

    let first = server.client.get("/").await;
    assert_eq!(first.status(), 200);
    insta::assert_json_snapshot!(first.json::<serde_json::Value>().await.unwrap(), @r#"
    {
      "status": "ok"
    }
    "#);

    let response = server.client.get("/").await;
    assert_eq!(response.status(), 429);

    let retry_after: u64 = response.headers()["retry-after"].to_str().unwrap().parse().unwrap();
    assert!((1..=60).contains(&retry_after), "{retry_after}");

    let body: serde_json::Value = response.json().await.unwrap();

    insta::assert_json_snapshot!(body, {
        ".rateLimit.reset" => "[reset]",
    }, @r#"
    {
      "error": "Too Many Requests",
      "message": "You have exceeded the rate limit.",
      "rateLimit": {
        "remaining": 0,
        "reset": "[reset]"
      }
    }
    "#);

    let reset = body["rateLimit"]["reset"].as_f64().unwrap();
    assert!(reset > 0.0 && reset <= 60.0, "{reset}");
}

#[tokio::test]
async fn window_resets() {
    let config = indoc! {r#"
        [rate_limit]
        points = 1
        duration = "300ms"
    "#};

    let server = TestServer::start(config).await;

    assert_eq!(server.client.get("/").await.status(), 200);
    assert_eq!(server.client.get("/").await.status(), 429);

    tokio::time::sleep(std::time::Duration::from_millis(400)).await;

    let response = server.client.get("/").await;

    assert_eq!(response.status(), 200);
    assert_eq!(response.headers()["x-ratelimit-remaining"], "0");
}

#[tokio::test]
async fn health_is_never_limited() {
    let config = indoc! {r#"
        [rate_limit]
        points = 1
        duration = "60s"
    "#};

    let server = TestServer::start(config).await;

    for _ in 0..5 {
        let response = server.client.get("/health").await;

        assert_eq!(response.status(), 200);
        assert!(!response.headers().contains_key("x-ratelimit-limit"));
    }

    assert_eq!(server.client.get("/").await.status(), 200);
    assert_eq!(server.client.get("/").await.status(), 429);
}

#[tokio::test]
async fn proxy_headers_identify_clients_when_trusted() {
    let config = indoc! {r#"
        [rate_limit]
        points = 1
        duration = "60s"
        trust_proxy_headers = true
    "#};

    let server = TestServer::start(config).await;

    let first = [("x-forwarded-for", "203.0.113.1, 10.0.0.1")];
    let second = [("x-forwarded-for", "203.0.113.2")];
    let real_ip = [("x-real-ip", "198.51.100.7")];

    assert_eq!(server.client.get_with_headers("/", &first).await.status(), 200);
    assert_eq!(server.client.get_with_headers("/", &second).await.status(), 200);
    assert_eq!(server.client.get_with_headers("/", &real_ip).await.status(), 200);
    assert_eq!(server.client.get_with_headers("/", &first).await.status(), 429);

    // No proxy header, the peer address is the key.
    assert_eq!(server.client.get("/").await.status(), 200);
}

#[tokio::test]
async fn proxy_headers_are_ignored_by_default() {
    let config = indoc! {r#"
        [rate_limit]
        points = 1
        duration = "60s"
    "#};

    let server = TestServer::start(config).await;

    let first = [("x-forwarded-for", "203.0.113.1")];
    let second = [("x-forwarded-for", "203.0.113.2")];

    assert_eq!(server.client.get_with_headers("/", &first).await.status(), 200);
    assert_eq!(server.client.get_with_headers("/", &second).await.status(), 429);
}

#[tokio::test]
async fn headers_disabled() {
    let config = indoc! {r#"
        [rate_limit]
        points = 1
        duration = "60s"
        headers = false
    "#};

    let server = TestServer::start(config).await;

    let allowed = server.client.get("/").await;
    assert_eq!(allowed.status(), 200);
    assert!(!allowed.headers().contains_key("x-ratelimit-remaining"));

    let denied = server.client.get("/").await;
    assert_eq!(denied.status(), 429);
    assert!(!denied.headers().contains_key("retry-after"));
}

#[tokio::test]
async fn selected_headers_only() {
    let config = indoc! {r#"
        [rate_limit]
        points = 1
        duration = "60s"

        [rate_limit.add_headers]
        limit = false
        reset = false
    "#};

    let server = TestServer::start(config).await;

    server.client.get("/").await;
    let denied = server.client.get("/").await;

    let mut names: Vec<_> = denied
        .headers()
        .keys()
        .map(|name| name.as_str())
        .filter(|name| name.starts_with("x-ratelimit") || *name == "retry-after")
        .collect();

    names.sort_unstable();

    insta::assert_json_snapshot!(names, @r#"
    [
      "retry-after",
      "x-ratelimit-remaining"
    ]
    "#);
}

#[tokio::test]
async fn pre_handler_hook_ignores_unknown_routes() {
    let config = indoc! {r#"
        [rate_limit]
        points = 1
        duration = "60s"
        hook = "pre_handler"
    "#};

    let server = TestServer::start(config).await;

    for _ in 0..3 {
        let response = server.client.get("/missing").await;

        assert_eq!(response.status(), 404);
        assert!(!response.headers().contains_key("x-ratelimit-limit"));
    }

    assert_eq!(server.client.get("/").await.status(), 200);
    assert_eq!(server.client.get("/").await.status(), 429);
}

#[tokio::test]
async fn key_prefix_does_not_change_limits() {
    let config = indoc! {r#"
        [rate_limit]
        points = 2
        duration = "60s"
        key_prefix = ""
    "#};

    let server = TestServer::start(config).await;

    assert_eq!(server.client.get("/").await.status(), 200);
    assert_eq!(server.client.get("/").await.status(), 200);
    assert_eq!(server.client.get("/").await.status(), 429);
}
