//! Common test utilities and fixtures.

pub mod server;

#[allow(unused_imports)]
pub use server::*;

use axum::body::Body;
use axum::http::{Request, StatusCode};
use serde_json::Value;
use tower::ServiceExt;

/// Multipart boundary used by the chunk upload helper.
pub const BOUNDARY: &str = "stash-test-boundary";

/// Make a JSON request against the router.
#[allow(dead_code)]
pub async fn json_request(
    router: &axum::Router,
    method: &str,
    uri: &str,
    body: Option<Value>,
    auth_token: Option<&str>,
) -> (StatusCode, Value) {
    let mut builder = Request::builder().method(method).uri(uri);

    if let Some(token) = auth_token {
        builder = builder.header("Authorization", format!("Bearer {token}"));
    }

    let body = match body {
        Some(v) => {
            builder = builder.header("Content-Type", "application/json");
            Body::from(serde_json::to_vec(&v).unwrap())
        }
        None => Body::empty(),
    };

    let request = builder.body(body).unwrap();
    let response = router.clone().oneshot(request).await.unwrap();

    let status = response.status();
    let body_bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();

    let json: Value = if body_bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&body_bytes).unwrap_or(Value::Null)
    };

    (status, json)
}

/// Build a multipart chunk-upload body in the shape the API expects.
#[allow(dead_code)]
pub fn chunk_form_body(
    content_id: i64,
    file_hash: &str,
    chunk_index: u32,
    total_chunks: u32,
    data: &[u8],
) -> Vec<u8> {
    let mut body = Vec::new();
    let mut text_field = |name: &str, value: String| {
        body.extend_from_slice(
            format!(
                "--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"{name}\"\r\n\r\n{value}\r\n"
            )
            .as_bytes(),
        );
    };
    text_field("content_id", content_id.to_string());
    text_field("file_hash", file_hash.to_string());
    text_field("chunk_index", chunk_index.to_string());
    text_field("total_chunks", total_chunks.to_string());

    body.extend_from_slice(
        format!(
            "--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"chunk\"; filename=\"chunk\"\r\n\
             Content-Type: application/octet-stream\r\n\r\n"
        )
        .as_bytes(),
    );
    body.extend_from_slice(data);
    body.extend_from_slice(format!("\r\n--{BOUNDARY}--\r\n").as_bytes());
    body
}

/// Upload one chunk through the HTTP surface.
#[allow(dead_code)]
pub async fn upload_chunk_request(
    router: &axum::Router,
    token: &str,
    content_id: i64,
    file_hash: &str,
    chunk_index: u32,
    total_chunks: u32,
    data: &[u8],
) -> (StatusCode, Value) {
    let body = chunk_form_body(content_id, file_hash, chunk_index, total_chunks, data);
    let request = Request::builder()
        .method("POST")
        .uri("/api/v1/upload/chunk")
        .header("Authorization", format!("Bearer {token}"))
        .header(
            "Content-Type",
            format!("multipart/form-data; boundary={BOUNDARY}"),
        )
        .body(Body::from(body))
        .unwrap();

    let response = router.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let body_bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let json: Value = serde_json::from_slice(&body_bytes).unwrap_or(Value::Null);
    (status, json)
}

/// Download a file, optionally with a Range header. Returns status, headers,
/// and raw body bytes.
#[allow(dead_code)]
pub async fn download_request(
    router: &axum::Router,
    token: &str,
    file_hash: &str,
    range: Option<&str>,
) -> (StatusCode, axum::http::HeaderMap, Vec<u8>) {
    let mut builder = Request::builder()
        .method("GET")
        .uri(format!("/api/v1/files/{file_hash}/download"))
        .header("Authorization", format!("Bearer {token}"));
    if let Some(range) = range {
        builder = builder.header("Range", range);
    }

    let response = router
        .clone()
        .oneshot(builder.body(Body::empty()).unwrap())
        .await
        .unwrap();
    let status = response.status();
    let headers = response.headers().clone();
    let body = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap()
        .to_vec();
    (status, headers, body)
}
