//! End-to-end request flow against in-process servers.

#![allow(clippy::arithmetic_side_effects)]

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use axum::extract::Multipart;
use axum::http::{HeaderMap, StatusCode};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde_json::{Value, json};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;

use basalt_harness::{
    Attachment, Expectations, HarnessError, HeaderExpectation, RequestOpts, SessionAuth,
    TestClient,
};

async fn spawn_app() -> String {
    let app = Router::new()
        .route(
            "/created",
            get(|| async { (StatusCode::CREATED, Json(json!({ "id": "row_1" }))) }),
        )
        .route(
            "/boom",
            get(|| async {
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    Json(json!({
                        "error": "boom",
                        "stack": "Error: boom\n  at handler"
                    })),
                )
            }),
        )
        .route(
            "/tagged",
            get(|| async { ([("x-request-id", "req-42")], Json(json!({ "ok": true }))) }),
        )
        .route(
            "/rows",
            get(|| async {
                Json(json!({
                    "rows": [
                        { "id": 1, "name": "alpha", "archived": false },
                        { "id": 2, "name": "beta", "archived": false }
                    ],
                    "total": 2
                }))
            }),
        )
        .route("/plain", get(|| async { "just text" }))
        .route("/empty", get(|| async { StatusCode::NO_CONTENT }))
        .route("/echo", post(|Json(body): Json<Value>| async move { Json(body) }))
        .route(
            "/req-headers",
            get(|headers: HeaderMap| async move {
                let mut out = serde_json::Map::new();
                for (name, value) in &headers {
                    out.insert(
                        name.to_string(),
                        Value::String(String::from_utf8_lossy(value.as_bytes()).into_owned()),
                    );
                }
                Json(Value::Object(out))
            }),
        )
        .route(
            "/query",
            get(|axum::extract::RawQuery(query): axum::extract::RawQuery| async move {
                Json(json!({ "query": query }))
            }),
        )
        .route("/upload", post(upload));

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    format!("http://{addr}")
}

async fn upload(mut multipart: Multipart) -> Json<Value> {
    let mut fields = serde_json::Map::new();
    let mut files = Vec::new();
    while let Some(field) = multipart.next_field().await.unwrap() {
        let name = field.name().unwrap_or_default().to_string();
        if let Some(filename) = field.file_name() {
            let filename = filename.to_string();
            let bytes = field.bytes().await.unwrap();
            files.push(json!({ "name": name, "filename": filename, "size": bytes.len() }));
        } else {
            let text = field.text().await.unwrap();
            fields.insert(name, Value::String(text));
        }
    }
    Json(json!({ "fields": fields, "files": files }))
}

fn client(base_url: String) -> TestClient {
    TestClient::new(base_url, Arc::new(SessionAuth::default()))
}

/// A server that resets the first `resets` connections at the TCP level
/// (SO_LINGER zero produces an RST) and answers afterwards.
async fn spawn_flaky_server(resets: usize) -> (String, Arc<AtomicUsize>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let accepts = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&accepts);
    tokio::spawn(async move {
        loop {
            let Ok((mut stream, _)) = listener.accept().await else {
                return;
            };
            let n = counter.fetch_add(1, Ordering::SeqCst);
            tokio::spawn(async move {
                // Read the request head so the reset lands on the response.
                let mut buf = [0u8; 1024];
                let _ = stream.read(&mut buf).await;
                if n < resets {
                    let _ = stream.set_linger(Some(Duration::ZERO));
                    drop(stream);
                } else {
                    let body = r#"{"ok":true}"#;
                    let response = format!(
                        "HTTP/1.1 200 OK\r\ncontent-type: application/json\r\ncontent-length: {}\r\nconnection: close\r\n\r\n{body}",
                        body.len()
                    );
                    let _ = stream.write_all(response.as_bytes()).await;
                    let _ = stream.shutdown().await;
                }
            });
        }
    });
    (format!("http://{addr}"), accepts)
}

/// A server that closes every connection cleanly (FIN) without responding.
async fn spawn_closing_server() -> (String, Arc<AtomicUsize>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let accepts = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&accepts);
    tokio::spawn(async move {
        loop {
            let Ok((mut stream, _)) = listener.accept().await else {
                return;
            };
            counter.fetch_add(1, Ordering::SeqCst);
            let mut buf = [0u8; 1024];
            let _ = stream.read(&mut buf).await;
            drop(stream);
        }
    });
    (format!("http://{addr}"), accepts)
}

#[tokio::test]
async fn post_returns_parsed_body_and_checks_subset() {
    let client = client(spawn_app().await);
    let body = client
        .post(
            "/echo",
            RequestOpts::new()
                .body(json!({ "name": "Inventory", "fields": [1, 2] }))
                .expect_body(json!({ "name": "Inventory" })),
        )
        .await
        .unwrap();
    assert_eq!(body["fields"], json!([1, 2]));
}

#[tokio::test]
async fn status_mismatch_reports_both_codes() {
    let client = client(spawn_app().await);

    let err = client.get("/created", RequestOpts::new()).await.unwrap_err();
    let message = err.to_string();
    assert!(message.contains("200"), "got: {message}");
    assert!(message.contains("201"), "got: {message}");

    client
        .get("/created", RequestOpts::new().expect_status(201))
        .await
        .unwrap();
}

#[tokio::test]
async fn status_mismatch_detail_extracts_stack() {
    let client = client(spawn_app().await);
    let err = client.get("/boom", RequestOpts::new()).await.unwrap_err();
    let HarnessError::StatusMismatch { detail, .. } = err else {
        panic!("expected status mismatch, got {err}");
    };
    assert!(detail.contains("\"error\": \"boom\""), "got: {detail}");
    assert!(detail.contains("stack:\nError: boom"), "got: {detail}");
    assert!(!detail.contains("\"stack\""), "got: {detail}");
}

#[tokio::test]
async fn header_expectations_match_exact_and_pattern() {
    let client = client(spawn_app().await);

    client
        .get(
            "/tagged",
            RequestOpts::new().expect_header("x-request-id", "req-42"),
        )
        .await
        .unwrap();

    client
        .get(
            "/tagged",
            RequestOpts::new().expect_header(
                "x-request-id",
                HeaderExpectation::Pattern(regex::Regex::new(r"^req-\d+$").unwrap()),
            ),
        )
        .await
        .unwrap();

    let err = client
        .get(
            "/tagged",
            RequestOpts::new().expect_header("x-request-id", "req-99"),
        )
        .await
        .unwrap_err();
    assert!(matches!(err, HarnessError::HeaderMismatch { .. }), "got {err}");

    let err = client
        .get(
            "/tagged",
            RequestOpts::new().expect_header("x-never-set", "anything"),
        )
        .await
        .unwrap_err();
    assert!(
        matches!(&err, HarnessError::HeaderMismatch { actual, .. } if actual == "<missing>"),
        "got {err}"
    );
}

#[tokio::test]
async fn declared_absent_header_present_fails() {
    let client = client(spawn_app().await);
    let err = client
        .get(
            "/tagged",
            RequestOpts::new().expect_header_absent("x-request-id"),
        )
        .await
        .unwrap_err();
    assert!(
        matches!(&err, HarnessError::UnexpectedHeader { name, value }
            if name == "x-request-id" && value == "req-42"),
        "got {err}"
    );
}

#[tokio::test]
async fn undefined_header_expectation_fails_before_any_io() {
    // Bound and released so nothing is listening on the port.
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let base_url = format!("http://{}", listener.local_addr().unwrap());
    drop(listener);

    let client = client(base_url);
    let opts = RequestOpts {
        expectations: Expectations {
            headers: vec![("x-request-id".to_string(), None)],
            ..Expectations::default()
        },
        ..RequestOpts::default()
    };
    let err = client.get("/anything", opts).await.unwrap_err();
    assert!(
        matches!(err, HarnessError::UndefinedHeaderExpectation { name } if name == "x-request-id"),
    );
}

#[tokio::test]
async fn implicit_json_content_type_enforced() {
    let client = client(spawn_app().await);

    let err = client.get("/plain", RequestOpts::new()).await.unwrap_err();
    assert!(
        matches!(&err, HarnessError::HeaderMismatch { name, .. } if name == "content-type"),
        "got {err}"
    );

    // Declaring a content-type expectation replaces the implicit one.
    let body = client
        .get(
            "/plain",
            RequestOpts::new().expect_header(
                "content-type",
                HeaderExpectation::Pattern(regex::Regex::new("^text/plain").unwrap()),
            ),
        )
        .await
        .unwrap();
    assert_eq!(body, Value::String("just text".to_string()));
}

#[tokio::test]
async fn no_content_response_skips_content_type_check() {
    let client = client(spawn_app().await);
    let body = client
        .get("/empty", RequestOpts::new().expect_status(204))
        .await
        .unwrap();
    assert_eq!(body, Value::Null);
}

#[tokio::test]
async fn subset_mismatch_reports_both_bodies() {
    let client = client(spawn_app().await);

    client
        .get(
            "/rows",
            RequestOpts::new().expect_body(json!({
                "rows": [{ "name": "alpha" }, { "name": "beta" }],
                "total": 2
            })),
        )
        .await
        .unwrap();

    let err = client
        .get(
            "/rows",
            RequestOpts::new().expect_body(json!({ "total": 3 })),
        )
        .await
        .unwrap_err();
    let HarnessError::BodyMismatch { expected, actual } = err else {
        panic!("expected body mismatch, got {err}");
    };
    assert!(expected.contains("\"total\": 3"));
    assert!(actual.contains("\"total\": 2"));
}

#[tokio::test]
async fn query_pairs_without_values_are_dropped() {
    let client = client(spawn_app().await);
    let opts = RequestOpts {
        query: vec![
            ("limit".to_string(), Some("10".to_string())),
            ("cursor".to_string(), None),
            ("filter".to_string(), Some(String::new())),
        ],
        ..RequestOpts::default()
    };
    let body = client.get("/query", opts).await.unwrap();
    assert_eq!(body, json!({ "query": "limit=10" }));

    let body = client.get("/query", RequestOpts::new()).await.unwrap();
    assert_eq!(body, json!({ "query": null }));
}

#[tokio::test]
async fn auth_headers_applied_then_overridden_per_call() {
    let base_url = spawn_app().await;
    let auth = SessionAuth::new(vec![
        ("cookie".to_string(), "session=abc".to_string()),
        ("x-tenant".to_string(), "from-auth".to_string()),
    ]);
    let client = TestClient::new(base_url, Arc::new(auth));

    let body = client
        .get(
            "/req-headers",
            RequestOpts::new().header("x-tenant", "from-call"),
        )
        .await
        .unwrap();

    assert_eq!(body["cookie"], "session=abc");
    assert_eq!(body["x-tenant"], "from-call");
    assert_eq!(body["x-basalt-include-stacktrace"], "true");
}

#[tokio::test]
async fn multipart_fields_and_attachments_are_sent() {
    let dir = tempfile::tempdir().unwrap();
    let on_disk = dir.path().join("report.csv");
    tokio::fs::write(&on_disk, b"a,b\n1,2\n").await.unwrap();

    let client = client(spawn_app().await);
    let body = client
        .post(
            "/upload",
            RequestOpts::new()
                .field("kind", "import")
                .file("raw", Attachment::Bytes(b"raw bytes".to_vec()))
                .file(
                    "named",
                    Attachment::Named {
                        filename: "data.bin".to_string(),
                        content: vec![0, 1, 2],
                    },
                )
                .file("report", Attachment::File(on_disk)),
        )
        .await
        .unwrap();

    assert_eq!(body["fields"], json!({ "kind": "import" }));
    assert_eq!(
        body["files"],
        json!([
            { "name": "raw", "filename": "raw", "size": 9 },
            { "name": "named", "filename": "data.bin", "size": 3 },
            { "name": "report", "filename": "report.csv", "size": 8 }
        ])
    );
}

#[tokio::test]
async fn missing_attachment_file_is_reported() {
    let client = client(spawn_app().await);
    let err = client
        .post(
            "/upload",
            RequestOpts::new().file("report", Attachment::File("/no/such/file.csv".into())),
        )
        .await
        .unwrap_err();
    assert!(
        matches!(&err, HarnessError::AttachmentError { name, .. } if name == "report"),
        "got {err}"
    );
}

#[tokio::test]
async fn connection_resets_are_retried_twice() {
    let (base_url, accepts) = spawn_flaky_server(2).await;
    let client = client(base_url);
    let body = client.get("/flaky", RequestOpts::new()).await.unwrap();
    assert_eq!(body, json!({ "ok": true }));
    assert_eq!(accepts.load(Ordering::SeqCst), 3);
}

#[tokio::test]
async fn third_reset_propagates_as_transport_error() {
    let (base_url, accepts) = spawn_flaky_server(usize::MAX).await;
    let client = client(base_url);
    let err = client.get("/flaky", RequestOpts::new()).await.unwrap_err();
    assert!(matches!(err, HarnessError::Transport(_)), "got {err}");
    assert_eq!(accepts.load(Ordering::SeqCst), 3);
}

#[tokio::test]
async fn clean_close_is_not_retried() {
    let (base_url, accepts) = spawn_closing_server().await;
    let client = client(base_url);
    let err = client.get("/gone", RequestOpts::new()).await.unwrap_err();
    assert!(matches!(err, HarnessError::Transport(_)), "got {err}");
    assert_eq!(accepts.load(Ordering::SeqCst), 1);
}
