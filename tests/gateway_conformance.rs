//! End-to-end protocol tests against a running gateway.

use futures_util::stream;
use reqwest::StatusCode;

mod common;

use common::{client, TestGateway};

const ECHO_SH: &str = "printf 'Content-Type: application/octet-stream\\n\\n'\ncat\n";

const ENV_SH: &str = r#"printf 'Content-Type: text/plain\n\n'
printf '%s|%s|%s|%s|%s|%s' "$REQUEST_METHOD" "${CONTENT_LENGTH-unset}" "$QUERY_STRING" "$SCRIPT_NAME" "$GATEWAY_INTERFACE" "$HTTP_X_CUSTOM"
"#;

#[tokio::test]
async fn test_status_header_and_body() {
    let gw = TestGateway::start(&[(
        "created.sh",
        "printf 'Status: 201 Created\\nContent-Type: text/plain\\n\\nmade it'\n",
    )])
    .await;

    let res = client().get(gw.url("/created.sh")).send().await.unwrap();
    assert_eq!(res.status(), StatusCode::CREATED);
    assert_eq!(res.headers()["content-type"], "text/plain");
    assert!(res.headers().get("status").is_none());
    assert_eq!(res.text().await.unwrap(), "made it");

    gw.stop().await;
}

#[tokio::test]
async fn test_environment_variables() {
    let gw = TestGateway::start(&[("env.sh", ENV_SH)]).await;
    let client = client();

    let res = client
        .get(gw.url("/env.sh?a=1&b=2"))
        .header("X-Custom", "hello")
        .send()
        .await
        .unwrap();
    assert_eq!(
        res.text().await.unwrap(),
        "GET|unset|a=1&b=2|/env.sh|CGI/1.1|hello"
    );

    let res = client
        .post(gw.url("/env.sh"))
        .body("12345")
        .send()
        .await
        .unwrap();
    assert_eq!(res.text().await.unwrap(), "POST|5||/env.sh|CGI/1.1|");

    gw.stop().await;
}

#[tokio::test]
async fn test_body_echoed_exactly() {
    let gw = TestGateway::start(&[("echo.sh", ECHO_SH)]).await;

    let body: Vec<u8> = (0..300 * 1024).map(|i| (i % 251) as u8).collect();
    let res = client()
        .post(gw.url("/echo.sh"))
        .body(body.clone())
        .send()
        .await
        .unwrap();

    assert_eq!(res.status(), StatusCode::OK);
    assert_eq!(
        res.headers()["content-length"].to_str().unwrap(),
        body.len().to_string()
    );
    assert_eq!(res.bytes().await.unwrap().to_vec(), body);

    gw.stop().await;
}

#[tokio::test]
async fn test_chunked_body_within_limit() {
    let gw = TestGateway::start(&[("echo.sh", ECHO_SH)]).await;

    let chunks: Vec<Result<Vec<u8>, std::io::Error>> =
        vec![Ok(b"first,".to_vec()), Ok(b"second".to_vec())];
    let res = client()
        .post(gw.url("/echo.sh"))
        .body(reqwest::Body::wrap_stream(stream::iter(chunks)))
        .send()
        .await
        .unwrap();

    assert_eq!(res.status(), StatusCode::OK);
    assert_eq!(res.text().await.unwrap(), "first,second");

    gw.stop().await;
}

#[tokio::test]
async fn test_zero_length_post_does_not_block() {
    let gw = TestGateway::start(&[(
        "drain.sh",
        "cat > /dev/null\nprintf 'Content-Type: text/plain\\n\\ndone %s' \"$CONTENT_LENGTH\"\n",
    )])
    .await;

    let started = std::time::Instant::now();
    let res = client().post(gw.url("/drain.sh")).body("").send().await.unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    assert_eq!(res.text().await.unwrap(), "done 0");
    assert!(started.elapsed() < std::time::Duration::from_secs(2));

    gw.stop().await;
}

#[tokio::test]
async fn test_oversize_declared_body_never_spawns() {
    let gw = TestGateway::start(&[("echo.sh", ECHO_SH)]).await;

    let payload = vec![b'x'; 2 * 1024 * 1024];
    let res = client()
        .post(gw.url("/echo.sh"))
        .body(payload)
        .send()
        .await
        .unwrap();

    assert_eq!(res.status(), StatusCode::PAYLOAD_TOO_LARGE);
    assert!(res.headers().contains_key("x-request-id"));
    assert_eq!(gw.registry.spawned_total(), 0);
    assert_eq!(gw.stats.snapshot().rejected_oversize, 1);

    gw.stop().await;
}

#[tokio::test]
async fn test_oversize_chunked_body_never_spawns() {
    let gw = TestGateway::start(&[("echo.sh", ECHO_SH)]).await;

    let chunks: Vec<Result<Vec<u8>, std::io::Error>> =
        (0..32).map(|_| Ok(vec![b'y'; 64 * 1024])).collect();
    let res = client()
        .post(gw.url("/echo.sh"))
        .body(reqwest::Body::wrap_stream(stream::iter(chunks)))
        .send()
        .await
        .unwrap();

    assert_eq!(res.status(), StatusCode::PAYLOAD_TOO_LARGE);
    assert_eq!(gw.registry.spawned_total(), 0);

    gw.stop().await;
}

#[tokio::test]
async fn test_admission_errors() {
    let gw = TestGateway::start(&[]).await;
    let client = client();

    let res = client
        .request(reqwest::Method::PATCH, gw.url("/"))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::METHOD_NOT_ALLOWED);
    assert_eq!(res.headers()["allow"], "GET, POST, DELETE, HEAD");

    let res = client.get(gw.url("/missing.sh")).send().await.unwrap();
    assert_eq!(res.status(), StatusCode::NOT_FOUND);
    assert!(res.headers().contains_key("x-request-id"));
    assert_eq!(res.headers()["content-type"], "text/plain; charset=utf-8");

    let res = client.get(gw.url("/../etc/passwd")).send().await.unwrap();
    assert_eq!(res.status(), StatusCode::NOT_FOUND);

    assert_eq!(gw.registry.spawned_total(), 0);
    gw.stop().await;
}

#[tokio::test]
async fn test_index_head_and_request_id() {
    let gw = TestGateway::start(&[]).await;
    let client = client();

    let res = client.get(gw.url("/")).send().await.unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    let first_id = res.headers()["x-request-id"].to_str().unwrap().to_string();
    let full_len = res.bytes().await.unwrap().len();
    assert!(full_len > 0);

    let res = client.head(gw.url("/")).send().await.unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    assert_eq!(res.headers()["content-type"], "text/html");
    assert_eq!(
        res.headers()["content-length"].to_str().unwrap(),
        full_len.to_string()
    );
    assert_ne!(res.headers()["x-request-id"].to_str().unwrap(), first_id);
    assert!(res.bytes().await.unwrap().is_empty());

    gw.stop().await;
}

#[tokio::test]
async fn test_location_redirects() {
    let gw = TestGateway::start(&[("move.sh", "printf 'Location: /index.sh\\n\\n'\n")]).await;

    let res = client().get(gw.url("/move.sh")).send().await.unwrap();
    assert_eq!(res.status(), StatusCode::FOUND);
    assert_eq!(res.headers()["location"], "/index.sh");

    gw.stop().await;
}

#[tokio::test]
async fn test_diagnostics_not_echoed() {
    let gw = TestGateway::start(&[(
        "noisy.sh",
        "echo 'secret diagnostic' >&2\nprintf 'Content-Type: text/plain\\n\\nvisible'\n",
    )])
    .await;

    let res = client().get(gw.url("/noisy.sh")).send().await.unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    assert_eq!(res.text().await.unwrap(), "visible");

    gw.stop().await;
}

#[tokio::test]
async fn test_each_listener_reports_its_port() {
    let gw = TestGateway::start(&[(
        "port.sh",
        "printf 'Content-Type: text/plain\\n\\n%s' \"$SERVER_PORT\"\n",
    )])
    .await;
    let client = client();

    let first = client.get(gw.url("/port.sh")).send().await.unwrap();
    assert_eq!(first.text().await.unwrap(), gw.addrs[0].port().to_string());

    let second = client.get(gw.url2("/port.sh")).send().await.unwrap();
    assert_eq!(second.text().await.unwrap(), gw.addrs[1].port().to_string());

    gw.stop().await;
}

#[tokio::test]
async fn test_upload_endpoint() {
    let gw = TestGateway::start(&[]).await;
    let client = client();

    let res = client
        .post(gw.url("/upload?filename=notes.txt"))
        .body("first")
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::CREATED);
    let json: serde_json::Value = res.json().await.unwrap();
    assert_eq!(json["status"], "success");
    assert_eq!(json["filename"], "notes.txt");
    assert_eq!(json["size"], 5);

    let res = client
        .post(gw.url("/upload?filename=../notes.txt"))
        .body("second")
        .send()
        .await
        .unwrap();
    let json: serde_json::Value = res.json().await.unwrap();
    assert_eq!(json["filename"], "notes_1.txt");

    assert_eq!(std::fs::read(gw.uploads().join("notes.txt")).unwrap(), b"first");
    assert_eq!(std::fs::read(gw.uploads().join("notes_1.txt")).unwrap(), b"second");
    assert_eq!(gw.registry.spawned_total(), 0);
    assert_eq!(gw.stats.snapshot().uploads, 2);

    let res = client
        .post(gw.url("/upload"))
        .body(vec![b'z'; 2 * 1024 * 1024])
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::PAYLOAD_TOO_LARGE);
    assert!(!gw.uploads().join("uploaded_file").exists());

    gw.stop().await;
}

#[tokio::test]
async fn test_repeated_requests_are_identical() {
    let gw = TestGateway::start(&[(
        "pure.sh",
        "printf 'Status: 202 Accepted\\nContent-Type: text/plain\\nX-Echo: %s\\nSet-Cookie: a=1\\nSet-Cookie: b=2\\n\\n%s' \"$HTTP_X_TOKEN\" \"$QUERY_STRING\"\n",
    )])
    .await;
    let client = client();

    let mut seen = Vec::new();
    for _ in 0..5 {
        let res = client
            .get(gw.url("/pure.sh?q=1&r=two"))
            .header("X-Token", "abc")
            .send()
            .await
            .unwrap();
        let status = res.status();
        let mut headers: Vec<(String, String)> = res
            .headers()
            .iter()
            .filter(|(name, _)| *name != "x-request-id" && *name != "date")
            .map(|(name, value)| (name.to_string(), value.to_str().unwrap().to_string()))
            .collect();
        headers.sort();
        let body = res.text().await.unwrap();
        seen.push((status, headers, body));
    }

    let first = &seen[0];
    assert_eq!(first.0, StatusCode::ACCEPTED);
    assert!(first.1.contains(&("x-echo".to_string(), "abc".to_string())));
    assert_eq!(first.2, "q=1&r=two");
    for other in &seen[1..] {
        assert_eq!(other, first);
    }

    gw.stop().await;
}

#[tokio::test]
async fn test_handler_reported_504_is_not_a_timeout() {
    let gw = TestGateway::start(&[(
        "upstream.sh",
        "printf 'Status: 504 Gateway Timeout\\nContent-Type: text/plain\\n\\nslow upstream'\n",
    )])
    .await;

    let res = client().get(gw.url("/upstream.sh")).send().await.unwrap();
    assert_eq!(res.status(), StatusCode::GATEWAY_TIMEOUT);
    assert_eq!(res.text().await.unwrap(), "slow upstream");

    let snap = gw.stats.snapshot();
    assert_eq!(snap.timeouts, 0);
    assert_eq!(snap.server_errors, 1);

    gw.stop().await;
}
