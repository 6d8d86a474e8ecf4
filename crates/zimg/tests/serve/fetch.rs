//! Fetch path: the three-tier read, special URIs, and failure shapes.

use crate::harness::{TestServer, dims_of, md5_hex, test_png};
use std::time::Duration;
use zimg_store::Rendition;

#[tokio::test]
async fn welcome_page_with_server_header() {
    let server = TestServer::start().await;

    let response = server.get("/").await;
    assert_eq!(response.status(), 200);
    assert_eq!(
        response.headers()["server"].to_str().unwrap(),
        "zimg/1.0.0 (Unix)"
    );
    assert_eq!(
        response.headers()["content-type"].to_str().unwrap(),
        "text/html"
    );
    let body = response.text().await.unwrap();
    assert!(body.contains("Welcome To zimg World!"));
}

#[tokio::test]
async fn favicon_is_an_empty_ok() {
    let server = TestServer::start().await;

    let response = server.get("/favicon.ico").await;
    assert_eq!(response.status(), 200);
    assert!(response.text().await.unwrap().is_empty());
}

#[tokio::test]
async fn origin_fetch_returns_uploaded_bytes() {
    let server = TestServer::start().await;
    let png = test_png(8, 4);
    let fp = server.upload("t.png", &png).await["picture"]
        .as_str()
        .unwrap()
        .to_owned();

    let response = server.get(&format!("/{fp}")).await;
    assert_eq!(response.status(), 200);
    assert_eq!(
        response.headers()["content-type"].to_str().unwrap(),
        "image/jpeg"
    );
    // The origin rendition is the stored bytes, verbatim.
    assert_eq!(response.bytes().await.unwrap().as_ref(), png.as_slice());
}

#[tokio::test]
async fn rendition_is_resized_grayscaled_and_materialized() {
    let server = TestServer::start().await;
    let fp = md5_hex(&test_png(200, 100));
    server.upload("t.png", &test_png(200, 100)).await;

    let response = server.get(&format!("/{fp}?w=100&h=50&p=0&g=1")).await;
    assert_eq!(response.status(), 200);
    let first = response.bytes().await.unwrap();
    assert_eq!(dims_of(&first), (100, 50));
    let decoded = image::load_from_memory(&first).unwrap();
    assert_eq!(decoded.color(), image::ColorType::L8);

    let rendition = Rendition {
        width: 100,
        height: 50,
        proportion: false,
        gray: true,
    };
    let path = server.rendition_path(&fp, rendition);
    assert!(path.as_str().ends_with("100*50g"));
    assert!(server.wait_for_file(&path).await, "rendition file at {path}");

    // Repeating the request returns byte-identical content.
    let second = server
        .get(&format!("/{fp}?w=100&h=50&p=0&g=1"))
        .await
        .bytes()
        .await
        .unwrap();
    assert_eq!(first, second);
}

#[tokio::test]
async fn proportional_width_derives_the_height() {
    let server = TestServer::start().await;
    let fp = md5_hex(&test_png(200, 100));
    server.upload("t.png", &test_png(200, 100)).await;

    let bytes = server
        .get(&format!("/{fp}?w=100"))
        .await
        .bytes()
        .await
        .unwrap();
    assert_eq!(dims_of(&bytes), (100, 50));
}

#[tokio::test]
async fn gray_of_origin_keeps_origin_dimensions() {
    let server = TestServer::start().await;
    let fp = md5_hex(&test_png(20, 10));
    server.upload("t.png", &test_png(20, 10)).await;

    let bytes = server.get(&format!("/{fp}?g=1")).await.bytes().await.unwrap();
    assert_eq!(dims_of(&bytes), (20, 10));
    let decoded = image::load_from_memory(&bytes).unwrap();
    assert_eq!(decoded.color(), image::ColorType::L8);
}

#[tokio::test]
async fn oversized_dimensions_serve_the_origin_size() {
    let server = TestServer::start().await;
    let fp = md5_hex(&test_png(20, 10));
    server.upload("t.png", &test_png(20, 10)).await;

    let bytes = server
        .get(&format!("/{fp}?w=400&h=400"))
        .await
        .bytes()
        .await
        .unwrap();
    assert_eq!(dims_of(&bytes), (20, 10));

    // No rendition file is materialized for an over-sized request.
    tokio::time::sleep(Duration::from_millis(300)).await;
    let rendition = Rendition {
        width: 400,
        height: 400,
        proportion: true,
        gray: false,
    };
    assert!(!server.rendition_path(&fp, rendition).exists());
}

#[tokio::test]
async fn invalid_fingerprint_is_404() {
    let server = TestServer::start().await;

    let response = server.get("/deadbeef").await;
    assert_eq!(response.status(), 404);
    assert!(response.text().await.unwrap().contains("404 Not Found!"));
}

#[tokio::test]
async fn unknown_fingerprint_is_404() {
    let server = TestServer::start().await;
    let response = server.get("/00000000000000000000000000000000").await;
    assert_eq!(response.status(), 404);
}

#[tokio::test]
async fn multi_segment_paths_are_404() {
    let server = TestServer::start().await;
    let response = server.get("/etc/passwd").await;
    assert_eq!(response.status(), 404);
}

#[tokio::test]
async fn dotdot_paths_are_404() {
    let server = TestServer::start().await;
    let (status, _) = server.raw_get("/../etc/passwd").await;
    assert_eq!(status, 404);

    // Also when the dots hide inside a single segment.
    let (status, _) = server.raw_get("/..deadbeef").await;
    assert_eq!(status, 404);
}

#[tokio::test]
async fn easter_egg() {
    let server = TestServer::start().await;

    let response = server
        .get("/0123456789abcdef0123456789abcdef?w=g&h=w")
        .await;
    assert_eq!(response.status(), 200);
    let body = response.text().await.unwrap();
    assert!(body.contains("Love is Eternal"));
    assert!(body.contains("Single1024"));
}

#[tokio::test]
async fn unsupported_methods_are_404() {
    let server = TestServer::start().await;

    let response = reqwest::Client::new()
        .put(format!("{}/anything", server.base_url))
        .body("data")
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 404);
}
