//! Integration tests for the API client against a stubbed HTTP server.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::{Duration, Instant};

use serde_json::json;
use wiremock::matchers::{body_json, header, method, path, query_param};
use wiremock::{Mock, MockServer, Request, ResponseTemplate};

use mmost_core::models::{NewChannel, PostListOptions};
use mmost_core::{ClientConfig, ClientError, HttpClient, MattermostClient, RetryPolicy};

fn test_config(uri: &str, team_id: Option<&str>) -> ClientConfig {
    let mut config = ClientConfig::new(uri, "test-token");
    if let Some(team_id) = team_id {
        config = config.with_team_id(team_id);
    }
    config
}

/// Client with millisecond-scale pacing and backoff so tests stay fast.
fn fast_client(uri: &str, team_id: Option<&str>) -> MattermostClient {
    let config = test_config(uri, team_id);
    let retry = RetryPolicy {
        backoff_base: Duration::from_millis(10),
        ..RetryPolicy::with_max_retries(3)
    };
    let http = HttpClient::with_policy(&config, retry, Duration::from_millis(1))
        .expect("engine construction");
    MattermostClient::from_parts(config, http)
}

#[tokio::test]
async fn team_scoped_call_fails_before_any_network_call() {
    let server = MockServer::start().await;
    let client = fast_client(&server.uri(), None);

    let err = client
        .get_team_members(None)
        .await
        .expect_err("must fail without a team ID");

    assert!(matches!(err, ClientError::Config(_)));
    let requests = server.received_requests().await.expect("request log");
    assert!(requests.is_empty());
}

#[tokio::test]
async fn consecutive_requests_honor_the_pacing_interval() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/v4/ping"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({})))
        .mount(&server)
        .await;

    let config = test_config(&server.uri(), None);
    let engine = HttpClient::with_policy(
        &config,
        RetryPolicy::default(),
        Duration::from_millis(50),
    )
    .expect("engine construction");

    let start = Instant::now();
    for _ in 0..3 {
        engine.get_json("ping", &[]).await.expect("response");
    }

    // Three requests, two enforced gaps.
    assert!(start.elapsed() >= Duration::from_millis(100));
}

#[tokio::test]
async fn get_retries_transient_statuses_until_success() {
    let server = MockServer::start().await;
    let attempts = Arc::new(AtomicUsize::new(0));
    let attempts_clone = attempts.clone();
    Mock::given(method("GET"))
        .and(path("/api/v4/system/ping"))
        .respond_with(move |_req: &Request| -> ResponseTemplate {
            let current = attempts_clone.fetch_add(1, Ordering::SeqCst);
            if current < 2 {
                ResponseTemplate::new(503)
            } else {
                ResponseTemplate::new(200).set_body_json(json!({"status": "OK"}))
            }
        })
        .expect(3)
        .mount(&server)
        .await;

    let config = test_config(&server.uri(), None);
    let retry = RetryPolicy {
        backoff_base: Duration::from_millis(10),
        ..RetryPolicy::with_max_retries(3)
    };
    let engine = HttpClient::with_policy(&config, retry, Duration::from_millis(1))
        .expect("engine construction");

    let body = engine.get_json("system/ping", &[]).await.expect("response");
    assert_eq!(body, json!({"status": "OK"}));
    assert_eq!(attempts.load(Ordering::SeqCst), 3);
}

#[tokio::test]
async fn post_is_never_retried_on_transient_status() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/v4/posts"))
        .respond_with(ResponseTemplate::new(503))
        .expect(1)
        .mount(&server)
        .await;

    let client = fast_client(&server.uri(), None);
    let err = client
        .send_message("chan-1", "hello", None, None)
        .await
        .expect_err("must fail");

    assert_eq!(err.status(), Some(503));
    let requests = server.received_requests().await.expect("request log");
    assert_eq!(requests.len(), 1);
}

#[tokio::test]
async fn transport_failure_surfaces_as_transport_error() {
    // Bind then drop to get a port that refuses connections.
    let listener = std::net::TcpListener::bind("127.0.0.1:0").expect("bind");
    let addr = listener.local_addr().expect("addr");
    drop(listener);

    let config = test_config(&format!("http://{addr}"), None);
    let retry = RetryPolicy {
        backoff_base: Duration::from_millis(5),
        ..RetryPolicy::with_max_retries(1)
    };
    let engine = HttpClient::with_policy(&config, retry, Duration::from_millis(1))
        .expect("engine construction");

    let err = engine.get_json("ping", &[]).await.expect_err("must fail");
    assert!(matches!(err, ClientError::Transport(_)));
}

#[tokio::test]
async fn team_list_is_fetched_once_and_served_from_cache() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/v4/users/me/teams"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            {"id": "t1", "display_name": "Team One"}
        ])))
        .expect(1)
        .mount(&server)
        .await;

    let client = fast_client(&server.uri(), None);

    let first = client.get_teams().await.expect("first read");
    let second = client.get_teams().await.expect("second read");

    let expected = vec![json!({"id": "t1", "display_name": "Team One"})];
    assert_eq!(first, expected);
    assert_eq!(second, expected);

    let requests = server.received_requests().await.expect("request log");
    assert_eq!(requests.len(), 1);
}

#[tokio::test]
async fn channel_creation_invalidates_only_its_teams_list() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/v4/users/me/teams/team-a/channels"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([{"id": "c-a"}])))
        .expect(2)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/api/v4/users/me/teams/team-b/channels"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([{"id": "c-b"}])))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/api/v4/channels"))
        .respond_with(ResponseTemplate::new(201).set_body_json(json!({"id": "c-new"})))
        .expect(1)
        .mount(&server)
        .await;

    let client = fast_client(&server.uri(), None);

    // Warm both team caches.
    client.get_channels(Some("team-a")).await.expect("team a");
    client.get_channels(Some("team-a")).await.expect("team a cached");
    client.get_channels(Some("team-b")).await.expect("team b");

    client
        .create_channel(NewChannel::new("new-chan", "New Channel"), Some("team-a"))
        .await
        .expect("create");

    // Team A refetches; team B is still served from cache.
    client.get_channels(Some("team-a")).await.expect("team a refetch");
    client.get_channels(Some("team-b")).await.expect("team b cached");
}

#[tokio::test]
async fn channel_patch_invalidates_the_detail_entry() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/v4/channels/c1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"id": "c1"})))
        .expect(2)
        .mount(&server)
        .await;
    Mock::given(method("PUT"))
        .and(path("/api/v4/channels/c1/patch"))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(json!({"id": "c1", "header": "new"})),
        )
        .expect(1)
        .mount(&server)
        .await;

    let client = fast_client(&server.uri(), None);

    client.get_channel_info("c1").await.expect("first read");
    client.get_channel_info("c1").await.expect("cached read");
    client
        .update_channel_header("c1", "new")
        .await
        .expect("patch");
    client.get_channel_info("c1").await.expect("refetch");
}

#[tokio::test]
async fn bulk_user_lookup_fetches_only_missing_ids() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/v4/users/u-a"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"id": "u-a"})))
        .expect(1)
        .mount(&server)
        .await;
    // Matcher requires the batched body to contain only the uncached ID.
    Mock::given(method("POST"))
        .and(path("/api/v4/users/ids"))
        .and(body_json(json!(["u-b"])))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([{"id": "u-b"}])))
        .expect(1)
        .mount(&server)
        .await;

    let client = fast_client(&server.uri(), None);

    client.get_user_profile("u-a").await.expect("seed cache");

    let users = client
        .get_users_by_ids(&["u-a".to_string(), "u-b".to_string()])
        .await
        .expect("bulk lookup");

    assert_eq!(users.len(), 2);
    let ids: Vec<&str> = users
        .iter()
        .filter_map(|u| u.get("id").and_then(serde_json::Value::as_str))
        .collect();
    assert!(ids.contains(&"u-a"));
    assert!(ids.contains(&"u-b"));
}

#[tokio::test]
async fn post_listing_clamps_per_page_to_platform_cap() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/v4/channels/c1/posts"))
        .and(query_param("per_page", "200"))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(json!({"posts": {}, "order": []})),
        )
        .expect(1)
        .mount(&server)
        .await;

    let client = fast_client(&server.uri(), None);
    let options = PostListOptions {
        per_page: 500,
        ..PostListOptions::default()
    };

    client.get_posts("c1", &options).await.expect("response");
}

#[tokio::test]
async fn api_errors_carry_status_and_server_message() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/v4/channels/missing"))
        .respond_with(
            ResponseTemplate::new(404).set_body_json(json!({"message": "Channel not found"})),
        )
        .mount(&server)
        .await;

    let client = fast_client(&server.uri(), None);
    let err = client
        .get_channel_info("missing")
        .await
        .expect_err("must fail");

    assert_eq!(err.status(), Some(404));
    let text = err.to_string();
    assert!(text.contains("404"));
    assert!(text.contains("Channel not found"));
}

#[tokio::test]
async fn requests_carry_bearer_token_and_user_agent() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/v4/users/me"))
        .and(header("Authorization", "Bearer test-token"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"id": "me"})))
        .expect(1)
        .mount(&server)
        .await;

    let client = fast_client(&server.uri(), None);
    assert!(client.test_connection().await);
}

#[tokio::test]
async fn connection_test_absorbs_failures() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/v4/users/me"))
        .respond_with(ResponseTemplate::new(401).set_body_json(json!({"message": "Unauthorized"})))
        .mount(&server)
        .await;

    let client = fast_client(&server.uri(), None);
    assert!(!client.test_connection().await);
}

#[tokio::test]
async fn file_download_streams_to_disk() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/v4/files/f1"))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(b"file contents".to_vec()))
        .mount(&server)
        .await;

    let client = fast_client(&server.uri(), None);
    let dest = std::env::temp_dir().join(format!("mmost-download-{}.bin", std::process::id()));

    let ok = client.download_file("f1", &dest).await.expect("download");
    assert!(ok);

    let written = std::fs::read(&dest).expect("read back");
    assert_eq!(written, b"file contents");
    let _ = std::fs::remove_file(&dest);
}

#[tokio::test]
async fn file_upload_goes_direct_with_manual_bearer_header() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/v4/files"))
        .and(header("Authorization", "Bearer test-token"))
        .respond_with(
            ResponseTemplate::new(201).set_body_json(json!({"file_infos": [{"id": "f1"}]})),
        )
        .expect(1)
        .mount(&server)
        .await;

    let source = std::env::temp_dir().join(format!("mmost-upload-{}.txt", std::process::id()));
    std::fs::write(&source, b"upload me").expect("write source");

    let client = fast_client(&server.uri(), None);
    let result = client
        .upload_file("chan-1", &source, None)
        .await
        .expect("upload");

    assert_eq!(result["file_infos"][0]["id"], json!("f1"));
    let _ = std::fs::remove_file(&source);
}
