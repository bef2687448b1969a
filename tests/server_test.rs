mod common;

use axum::body::{to_bytes, Body};
use axum::http::{header, Request, StatusCode};
use axum::Router;
use common::*;
use shrink_pdf::server::{router, ServerConfig};
use tower::ServiceExt;

const BOUNDARY: &str = "shrink-pdf-test-boundary";

enum Part<'a> {
    File(&'a [u8]),
    Text(&'a str, &'a str),
}

fn multipart_body(parts: &[Part<'_>]) -> Vec<u8> {
    let mut body = Vec::new();
    for part in parts {
        body.extend_from_slice(format!("--{BOUNDARY}\r\n").as_bytes());
        match part {
            Part::File(bytes) => {
                body.extend_from_slice(
                    b"Content-Disposition: form-data; name=\"file\"; filename=\"input.pdf\"\r\n\
                      Content-Type: application/pdf\r\n\r\n",
                );
                body.extend_from_slice(bytes);
            }
            Part::Text(name, value) => {
                body.extend_from_slice(
                    format!("Content-Disposition: form-data; name=\"{name}\"\r\n\r\n{value}").as_bytes(),
                );
            }
        }
        body.extend_from_slice(b"\r\n");
    }
    body.extend_from_slice(format!("--{BOUNDARY}--\r\n").as_bytes());
    body
}

fn app() -> Router {
    router(&ServerConfig::default())
}

async fn post(app: Router, parts: &[Part<'_>]) -> (StatusCode, Option<String>, Vec<u8>) {
    let request = Request::builder()
        .method("POST")
        .uri("/api/compress-pdf")
        .header(
            header::CONTENT_TYPE,
            format!("multipart/form-data; boundary={BOUNDARY}"),
        )
        .body(Body::from(multipart_body(parts)))
        .unwrap();

    let response = app.oneshot(request).await.unwrap();
    let status = response.status();
    let content_type = response
        .headers()
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .map(str::to_owned);
    let body = to_bytes(response.into_body(), usize::MAX).await.unwrap().to_vec();
    (status, content_type, body)
}

fn sample_pdf() -> Vec<u8> {
    let mut pdf = PdfBuilder::new();
    let image = pdf.add_image(flate_rgb_image(1000, 500));
    pdf.add_page(&[image]);
    pdf.build()
}

#[tokio::test]
async fn test_compresses_uploaded_pdf() {
    let input = sample_pdf();
    let (status, content_type, body) =
        post(app(), &[Part::File(&input), Part::Text("quality", "0.2")]).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(content_type.as_deref(), Some("application/pdf"));
    assert!(body.starts_with(b"%PDF"));

    let doc = load(&body);
    let image = shrink_pdf::locate_images(&doc)[0];
    assert_eq!(dimensions(&doc, image), (400, 200));
}

#[tokio::test]
async fn test_quality_defaults_when_missing() {
    let input = sample_pdf();
    let (status, _, body) = post(app(), &[Part::File(&input)]).await;

    assert_eq!(status, StatusCode::OK);
    let doc = load(&body);
    let image = shrink_pdf::locate_images(&doc)[0];
    assert_eq!(dimensions(&doc, image), (1000, 500));
    assert_eq!(filter(&doc, image), b"DCTDecode");
}

#[tokio::test]
async fn test_missing_file_is_rejected() {
    let (status, _, body) = post(app(), &[Part::Text("quality", "0.5")]).await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body, b"No file provided");
}

#[tokio::test]
async fn test_empty_file_is_rejected() {
    let (status, _, _) = post(app(), &[Part::File(b""), Part::Text("quality", "0.5")]).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_out_of_range_quality_is_rejected() {
    let input = sample_pdf();
    for quality in ["0.05", "1.5", "abc", ""] {
        let (status, _, body) =
            post(app(), &[Part::File(&input), Part::Text("quality", quality)]).await;
        assert_eq!(status, StatusCode::BAD_REQUEST, "quality {quality:?}");
        assert_eq!(body, b"Quality must be between 0.1 and 1.0");
    }
}

#[tokio::test]
async fn test_boundary_qualities_are_accepted() {
    let input = sample_pdf();
    for quality in ["0.1", "1.0"] {
        let (status, _, _) = post(app(), &[Part::File(&input), Part::Text("quality", quality)]).await;
        assert_eq!(status, StatusCode::OK, "quality {quality:?}");
    }
}

#[tokio::test]
async fn test_malformed_pdf_is_an_internal_error() {
    let (status, content_type, body) = post(
        app(),
        &[Part::File(b"this is not a pdf"), Part::Text("quality", "0.5")],
    )
    .await;

    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert!(content_type.unwrap().starts_with("text/plain"));
    assert_eq!(body, b"Failed to compress PDF");
}

#[tokio::test]
async fn test_oversized_upload_is_rejected() {
    let config = ServerConfig {
        max_upload_bytes: 1024,
        ..ServerConfig::default()
    };
    let input = sample_pdf();
    assert!(input.len() > 1024);

    let (status, _, body) = post(router(&config), &[Part::File(&input)]).await;
    assert_eq!(status, StatusCode::PAYLOAD_TOO_LARGE);
    assert_eq!(body, b"File too large");
}
