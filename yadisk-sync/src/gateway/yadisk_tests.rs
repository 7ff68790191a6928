use super::*;
use serde_json::json;
use tempfile::tempdir;
use wiremock::matchers::{body_bytes, method, path, query_param, query_param_is_missing};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn gateway(server: &MockServer) -> YadiskGateway {
    let client = YadiskClient::with_base_url(&server.uri(), "token").unwrap();
    let fast = Backoff::new(Duration::from_millis(1), Duration::from_millis(2), false);
    YadiskGateway::new(client, TransferClient::new())
        .with_retry(RetryPolicy::new(3, fast))
        .with_poll_backoff(fast)
}

#[tokio::test]
async fn lists_children_with_normalized_paths() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/v1/disk/resources"))
        .and(query_param("path", "/Docs"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "_embedded": {
                "items": [
                    {
                        "path": "disk:/Docs/A.txt",
                        "name": "A.txt",
                        "type": "file",
                        "size": 5,
                        "modified": "2024-05-01T10:00:00+00:00",
                        "md5": "5d41402abc4b2a76b9719d911017c592"
                    },
                    { "path": "disk:/Docs/Sub", "name": "Sub", "type": "dir" }
                ],
                "limit": 100,
                "offset": 0,
                "total": 2
            }
        })))
        .mount(&server)
        .await;

    let items = gateway(&server).list("disk:/Docs/").await.unwrap();

    assert_eq!(items.len(), 2);
    assert_eq!(items[0].path, "/Docs/A.txt");
    assert_eq!(items[0].kind, EntryKind::File);
    assert_eq!(items[0].size, Some(5));
    assert_eq!(items[1].kind, EntryKind::Dir);
    assert_eq!(items[1].md5, None);
}

#[tokio::test]
async fn retries_listing_after_transient_failure() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/v1/disk/resources"))
        .respond_with(ResponseTemplate::new(503))
        .up_to_n_times(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/v1/disk/resources"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "_embedded": { "items": [], "limit": 100, "offset": 0, "total": 0 }
        })))
        .mount(&server)
        .await;

    let items = gateway(&server).list("/").await.unwrap();
    assert!(items.is_empty());
}

#[tokio::test]
async fn permanent_listing_failure_is_not_retried() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/v1/disk/resources"))
        .respond_with(ResponseTemplate::new(403))
        .expect(1)
        .mount(&server)
        .await;

    let err = gateway(&server).list("/").await.unwrap_err();
    assert_eq!(err.failure_kind(), crate::sync::result::FailureKind::Remote);
}

#[tokio::test]
async fn uploads_through_the_issued_link() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/v1/disk/resources/upload"))
        .and(query_param("path", "/Docs/A.txt"))
        .and(query_param("overwrite", "true"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "href": format!("{}/put/A.txt", server.uri()),
            "method": "PUT"
        })))
        .mount(&server)
        .await;
    Mock::given(method("PUT"))
        .and(path("/put/A.txt"))
        .and(body_bytes(b"hello"))
        .respond_with(ResponseTemplate::new(201))
        .expect(1)
        .mount(&server)
        .await;

    let dir = tempdir().unwrap();
    let source = dir.path().join("A.txt");
    std::fs::write(&source, b"hello").unwrap();

    gateway(&server)
        .upload(&source, "/Docs/A.txt", true)
        .await
        .unwrap();
}

#[tokio::test]
async fn downloads_and_verifies_digest() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/v1/disk/resources/download"))
        .and(query_param("path", "/Docs/B.txt"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "href": format!("{}/get/B.txt", server.uri()),
            "method": "GET"
        })))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/get/B.txt"))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(b"hello"))
        .mount(&server)
        .await;

    let dir = tempdir().unwrap();
    let target = dir.path().join("B.txt");
    gateway(&server)
        .download(
            "disk:/Docs/B.txt",
            &target,
            Some("5D41402ABC4B2A76B9719D911017C592"),
        )
        .await
        .unwrap();

    assert_eq!(std::fs::read(&target).unwrap(), b"hello");
}

#[tokio::test]
async fn trash_waits_for_async_operation() {
    let server = MockServer::start().await;
    Mock::given(method("DELETE"))
        .and(path("/v1/disk/resources"))
        .and(query_param("path", "/Old"))
        .and(query_param_is_missing("permanently"))
        .respond_with(ResponseTemplate::new(202).set_body_json(json!({
            "href": format!("{}/v1/disk/operations/42", server.uri()),
            "method": "GET"
        })))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/v1/disk/operations/42"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "status": "in-progress" })))
        .up_to_n_times(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/v1/disk/operations/42"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "status": "success" })))
        .mount(&server)
        .await;

    gateway(&server).trash("/Old").await.unwrap();
}

#[tokio::test]
async fn failed_operation_is_reported() {
    let server = MockServer::start().await;
    Mock::given(method("DELETE"))
        .and(path("/v1/disk/resources"))
        .and(query_param("permanently", "true"))
        .respond_with(ResponseTemplate::new(202).set_body_json(json!({
            "href": format!("{}/v1/disk/operations/7", server.uri()),
            "method": "GET"
        })))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/v1/disk/operations/7"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "status": "failure" })))
        .mount(&server)
        .await;

    let err = gateway(&server).remove_permanently("/Empty").await.unwrap_err();
    assert!(matches!(err, GatewayError::OperationFailed(ref p) if p == "/Empty"));
}

#[tokio::test]
async fn create_directory_accepts_existing_directory() {
    let server = MockServer::start().await;
    Mock::given(method("PUT"))
        .and(path("/v1/disk/resources"))
        .respond_with(ResponseTemplate::new(409).set_body_string("exists"))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/v1/disk/resources"))
        .and(query_param("path", "/Docs"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "path": "disk:/Docs",
            "name": "Docs",
            "type": "dir"
        })))
        .mount(&server)
        .await;

    gateway(&server).create_directory("/Docs").await.unwrap();
}

#[tokio::test]
async fn exists_reports_missing_paths() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/v1/disk/resources"))
        .respond_with(ResponseTemplate::new(404).set_body_string("not found"))
        .mount(&server)
        .await;

    assert!(!gateway(&server).exists("/Nope").await.unwrap());
}
