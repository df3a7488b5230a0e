//! End-to-end tests: requests go through the full router to a wiremock document backend.

use axum::http::{HeaderValue, StatusCode, header};
use axum_test::multipart::{MultipartForm, Part};
use serde_json::{Value, json};
use std::future::IntoFuture;
use wiremock::matchers::{body_string_contains, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use crate::config::CorsOrigin;
use crate::test_utils::{backend_endpoint, create_disk_staged_config, create_test_config, create_test_server};

const CID_V0: &str = "QmdfTbBqBPQ7VNxZEYEj14VmRuZBkqFbiwReogJgS1zR1n";
const CID_V1: &str = "bafybeihdwdcefgh4dqkjv67uzcmw7ojee6xedzdetojuzjevtenxquvyku";
const INDEX_CID_V0: &str = "QmY7Yh4UquoXHLPFo2XbhXkhBvFoPwmQUSa92pxnxjQuPU";
const INDEX_CID_V1: &str = "bafybeierhgbz4zp2x2u67urqrgfnrnlukciupzenpqpipiz5nwtq7uxpx4";

fn file_part(name: &str, content: &[u8]) -> Part {
    Part::bytes(content.to_vec()).file_name(name.to_string()).mime_type("text/plain")
}

fn upload_form(name: &str, content: &[u8]) -> MultipartForm {
    MultipartForm::new()
        .add_part("file", file_part(name, content))
        .add_text("chunk_size", "1500")
        .add_text("chunk_overlap", "100")
}

async fn mount_backend(server: &MockServer, response: ResponseTemplate) {
    Mock::given(method("POST"))
        .and(path("/process_rag"))
        .respond_with(response)
        .mount(server)
        .await;
}

#[test_log::test(tokio::test)]
async fn test_successful_upload_adds_v1_identifiers() {
    let backend = MockServer::start().await;
    mount_backend(
        &backend,
        ResponseTemplate::new(200).set_body_json(json!({
            "cid": CID_V0,
            "index_cid": INDEX_CID_V0,
            "number of documents": 2
        })),
    )
    .await;

    let server = create_test_server(create_test_config(Some(backend_endpoint(&backend.uri()))));
    let response = server
        .post("/api/process-rag")
        .multipart(upload_form("notes.md", b"# Notes\nhello"))
        .await;

    response.assert_status_ok();
    assert_eq!(
        response.json::<Value>(),
        json!({
            "cid": CID_V0,
            "index_cid": INDEX_CID_V0,
            "cid_v1": CID_V1,
            "index_cid_v1": INDEX_CID_V1,
            "number of documents": 2
        })
    );
}

#[tokio::test]
async fn test_legacy_route_alias() {
    let backend = MockServer::start().await;
    mount_backend(&backend, ResponseTemplate::new(200).set_body_json(json!({ "cid": CID_V1 }))).await;

    let server = create_test_server(create_test_config(Some(backend_endpoint(&backend.uri()))));
    let response = server.post("/process-rag").multipart(upload_form("a.txt", b"a")).await;

    response.assert_status_ok();
    let body = response.json::<Value>();
    assert_eq!(body["cid_v1"], CID_V1);
    assert_eq!(body["index_cid_v1"], Value::Null);
}

#[test_log::test(tokio::test)]
async fn test_forwards_files_and_parameters_unchanged() {
    let backend = MockServer::start().await;
    mount_backend(&backend, ResponseTemplate::new(200).set_body_json(json!({ "cid": CID_V0 }))).await;

    let server = create_test_server(create_test_config(Some(backend_endpoint(&backend.uri()))));
    let form = MultipartForm::new()
        .add_part("file", file_part("first.txt", b"first file body"))
        .add_part("file", file_part("second.txt", b"second file body"))
        .add_text("chunk_size", "800")
        .add_text("chunk_overlap", "40");

    server.post("/api/process-rag").multipart(form).await.assert_status_ok();

    let requests = backend.received_requests().await.expect("request recording is enabled");
    assert_eq!(requests.len(), 1, "exactly one backend call per upload");

    let body = String::from_utf8_lossy(&requests[0].body);
    assert!(body.contains(r#"name="file"; filename="first.txt""#));
    assert!(body.contains(r#"name="file"; filename="second.txt""#));
    assert!(body.contains("first file body"));
    assert!(body.contains("second file body"));
    assert!(body.contains("name=\"chunk_size\"\r\n\r\n800\r\n"));
    assert!(body.contains("name=\"chunk_overlap\"\r\n\r\n40\r\n"));
}

#[tokio::test]
async fn test_no_file_uploaded() {
    let backend = MockServer::start().await;
    let server = create_test_server(create_test_config(Some(backend_endpoint(&backend.uri()))));

    let form = MultipartForm::new().add_text("chunk_size", "1500").add_text("chunk_overlap", "100");
    let response = server.post("/api/process-rag").multipart(form).await;

    response.assert_status(StatusCode::BAD_REQUEST);
    assert_eq!(response.json::<Value>(), json!({ "error": "No file uploaded" }));
    assert!(backend.received_requests().await.unwrap_or_default().is_empty());
}

#[tokio::test]
async fn test_empty_unnamed_file_part_counts_as_no_file() {
    let backend = MockServer::start().await;
    let server = create_test_server(create_test_config(Some(backend_endpoint(&backend.uri()))));

    let form = MultipartForm::new()
        .add_part(
            "file",
            Part::bytes(Vec::new()).file_name("").mime_type("application/octet-stream"),
        )
        .add_text("chunk_size", "1500")
        .add_text("chunk_overlap", "100");
    let response = server.post("/api/process-rag").multipart(form).await;

    response.assert_status(StatusCode::BAD_REQUEST);
    assert_eq!(response.json::<Value>(), json!({ "error": "No file uploaded" }));
    assert!(backend.received_requests().await.unwrap_or_default().is_empty());
}

#[tokio::test]
async fn test_non_multipart_body_is_rejected() {
    let backend = MockServer::start().await;
    let server = create_test_server(create_test_config(Some(backend_endpoint(&backend.uri()))));

    let response = server.post("/api/process-rag").json(&json!({ "file": "notes.md" })).await;

    response.assert_status(StatusCode::BAD_REQUEST);
    assert_eq!(response.json::<Value>(), json!({ "error": "No file uploaded" }));
    assert!(backend.received_requests().await.unwrap_or_default().is_empty());
}

#[tokio::test]
async fn test_missing_backend_endpoint() {
    let server = create_test_server(create_test_config(None));

    let response = server.post("/api/process-rag").multipart(upload_form("notes.md", b"hello")).await;
    response.assert_status(StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(
        response.json::<Value>(),
        json!({ "error": "Document backend endpoint is not configured" })
    );

    // Checked before the body is looked at
    let empty = server
        .post("/api/process-rag")
        .multipart(MultipartForm::new().add_text("chunk_size", "1"))
        .await;
    empty.assert_status(StatusCode::INTERNAL_SERVER_ERROR);
}

#[tokio::test]
async fn test_backend_error_is_passed_through() {
    let backend = MockServer::start().await;
    mount_backend(&backend, ResponseTemplate::new(502).set_body_json(json!({ "detail": "bad" }))).await;

    let server = create_test_server(create_test_config(Some(backend_endpoint(&backend.uri()))));
    let response = server.post("/api/process-rag").multipart(upload_form("notes.md", b"hello")).await;

    response.assert_status(StatusCode::BAD_GATEWAY);
    assert_eq!(response.json::<Value>(), json!({ "detail": "bad" }));
}

#[tokio::test]
async fn test_backend_unprocessable_is_passed_through() {
    let backend = MockServer::start().await;
    mount_backend(
        &backend,
        ResponseTemplate::new(422).set_body_json(json!({ "detail": [{ "msg": "chunk_size must be an integer" }] })),
    )
    .await;

    let server = create_test_server(create_test_config(Some(backend_endpoint(&backend.uri()))));
    let form = MultipartForm::new()
        .add_part("file", file_part("notes.md", b"hello"))
        .add_text("chunk_size", "lots");
    let response = server.post("/api/process-rag").multipart(form).await;

    response.assert_status(StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(response.json::<Value>()["detail"][0]["msg"], "chunk_size must be an integer");
}

#[tokio::test]
async fn test_invalid_backend_cid() {
    let backend = MockServer::start().await;
    mount_backend(
        &backend,
        ResponseTemplate::new(200).set_body_json(json!({ "cid": CID_V0, "index_cid": "not-a-cid" })),
    )
    .await;

    let server = create_test_server(create_test_config(Some(backend_endpoint(&backend.uri()))));
    let response = server.post("/api/process-rag").multipart(upload_form("notes.md", b"hello")).await;

    response.assert_status(StatusCode::INTERNAL_SERVER_ERROR);
    let body = response.json::<Value>();
    assert!(body["error"].as_str().unwrap().contains("index_cid"));
    assert!(body.get("cid_v1").is_none());
}

#[tokio::test]
async fn test_backend_non_json_success() {
    let backend = MockServer::start().await;
    mount_backend(&backend, ResponseTemplate::new(200).set_body_string("<html>ok</html>")).await;

    let server = create_test_server(create_test_config(Some(backend_endpoint(&backend.uri()))));
    let response = server.post("/api/process-rag").multipart(upload_form("notes.md", b"hello")).await;

    response.assert_status(StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(
        response.json::<Value>(),
        json!({ "error": "Error processing the file with the document backend" })
    );
}

#[tokio::test]
async fn test_unreachable_backend() {
    let port = {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        listener.local_addr().unwrap().port()
    };
    let endpoint = format!("http://127.0.0.1:{port}/process_rag").parse().unwrap();

    let server = create_test_server(create_test_config(Some(endpoint)));
    let response = server.post("/api/process-rag").multipart(upload_form("notes.md", b"hello")).await;

    response.assert_status(StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(
        response.json::<Value>(),
        json!({ "error": "Error processing the file with the document backend" })
    );
}

#[tokio::test]
async fn test_upload_over_body_limit() {
    let backend = MockServer::start().await;
    mount_backend(&backend, ResponseTemplate::new(200).set_body_json(json!({ "cid": CID_V0 }))).await;

    let mut config = create_test_config(Some(backend_endpoint(&backend.uri())));
    config.max_upload_size = 1024;
    let server = create_test_server(config);

    let response = server
        .post("/api/process-rag")
        .multipart(upload_form("big.bin", &vec![b'x'; 16 * 1024]))
        .await;

    response.assert_status(StatusCode::PAYLOAD_TOO_LARGE);
    assert_eq!(
        response.json::<Value>(),
        json!({ "error": "Uploaded files exceed the maximum request size" })
    );
    assert!(backend.received_requests().await.unwrap_or_default().is_empty());
}

/// Mount a backend that answers with `cid` only for uploads containing `marker`.
async fn mount_marked_backend(server: &MockServer, marker: &str, cid: &str) {
    Mock::given(method("POST"))
        .and(path("/process_rag"))
        .and(body_string_contains(marker))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "cid": cid })))
        .mount(server)
        .await;
}

async fn assert_concurrent_uploads_are_isolated(server: &axum_test::TestServer, backend: &MockServer) {
    let alpha = server
        .post("/api/process-rag")
        .multipart(upload_form("same-name.txt", b"ALPHA-CONTENT"));
    let beta = server
        .post("/api/process-rag")
        .multipart(upload_form("same-name.txt", b"BETA-CONTENT"));

    let (alpha, beta) = tokio::join!(alpha.into_future(), beta.into_future());

    alpha.assert_status_ok();
    beta.assert_status_ok();
    assert_eq!(alpha.json::<Value>()["cid_v1"], CID_V1);
    assert_eq!(beta.json::<Value>()["cid_v1"], INDEX_CID_V1);

    let requests = backend.received_requests().await.expect("request recording is enabled");
    assert_eq!(requests.len(), 2);
    for request in &requests {
        let body = String::from_utf8_lossy(&request.body);
        assert!(
            body.contains("ALPHA-CONTENT") ^ body.contains("BETA-CONTENT"),
            "each backend call carries exactly one upload's bytes"
        );
    }
}

#[test_log::test(tokio::test)]
async fn test_concurrent_same_name_uploads_in_memory() {
    let backend = MockServer::start().await;
    mount_marked_backend(&backend, "ALPHA-CONTENT", CID_V0).await;
    mount_marked_backend(&backend, "BETA-CONTENT", INDEX_CID_V0).await;

    let server = create_test_server(create_test_config(Some(backend_endpoint(&backend.uri()))));
    assert_concurrent_uploads_are_isolated(&server, &backend).await;
}

#[test_log::test(tokio::test)]
async fn test_concurrent_same_name_uploads_on_disk() {
    let backend = MockServer::start().await;
    mount_marked_backend(&backend, "ALPHA-CONTENT", CID_V0).await;
    mount_marked_backend(&backend, "BETA-CONTENT", INDEX_CID_V0).await;

    let staging_dir = tempfile::tempdir().unwrap();
    let server = create_test_server(create_disk_staged_config(
        Some(backend_endpoint(&backend.uri())),
        staging_dir.path(),
    ));
    assert_concurrent_uploads_are_isolated(&server, &backend).await;

    let leftovers = std::fs::read_dir(staging_dir.path()).unwrap().count();
    assert_eq!(leftovers, 0, "staged files are removed once the request completes");
}

#[tokio::test]
async fn test_disk_staging_cleans_up_after_backend_failure() {
    let backend = MockServer::start().await;
    mount_backend(&backend, ResponseTemplate::new(500).set_body_json(json!({ "detail": "boom" }))).await;

    let staging_dir = tempfile::tempdir().unwrap();
    let server = create_test_server(create_disk_staged_config(
        Some(backend_endpoint(&backend.uri())),
        staging_dir.path(),
    ));

    let response = server.post("/api/process-rag").multipart(upload_form("notes.md", b"hello")).await;
    response.assert_status(StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(response.json::<Value>(), json!({ "detail": "boom" }));

    assert_eq!(std::fs::read_dir(staging_dir.path()).unwrap().count(), 0);
}

#[tokio::test]
async fn test_healthz() {
    let server = create_test_server(create_test_config(None));

    let response = server.get("/healthz").await;
    response.assert_status_ok();
    response.assert_text("OK");
}

#[tokio::test]
async fn test_wildcard_cors_origin() {
    let mut config = create_test_config(None);
    config.cors.allowed_origins = vec![CorsOrigin::Wildcard];
    let server = create_test_server(config);

    let response = server
        .get("/healthz")
        .add_header(header::ORIGIN, HeaderValue::from_static("https://ui.example.com"))
        .await;

    response.assert_status_ok();
    assert_eq!(response.header(header::ACCESS_CONTROL_ALLOW_ORIGIN), "*");
}

#[tokio::test]
async fn test_listed_cors_origins() {
    let mut config = create_test_config(None);
    config.cors.allowed_origins = vec![CorsOrigin::Url("https://ui.example.com".parse().unwrap())];
    let server = create_test_server(config);

    let allowed = server
        .get("/healthz")
        .add_header(header::ORIGIN, HeaderValue::from_static("https://ui.example.com"))
        .await;
    assert_eq!(
        allowed.header(header::ACCESS_CONTROL_ALLOW_ORIGIN),
        "https://ui.example.com"
    );

    let other = server
        .get("/healthz")
        .add_header(header::ORIGIN, HeaderValue::from_static("https://elsewhere.example.com"))
        .await;
    assert!(other.headers().get(header::ACCESS_CONTROL_ALLOW_ORIGIN).is_none());
}

#[tokio::test]
async fn test_openapi_document_is_served() {
    let server = create_test_server(create_test_config(None));

    let response = server.get("/api-docs/openapi.json").await;
    response.assert_status_ok();
    let doc = response.json::<Value>();
    assert!(doc["paths"]["/api/process-rag"]["post"].is_object());
    assert!(doc["components"]["schemas"]["ProcessRagResponse"].is_object());
}
