//! Test harness: a real zimg server over a temporary store, plus fixture
//! images and request helpers.

use camino::{Utf8Path, Utf8PathBuf};
use std::io::Cursor;
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;
use zimg::config::Settings;
use zimg::{App, serve};
use zimg_store::Rendition;

/// 1×1 red PNG (valid minimal PNG; contains NUL bytes, like any real image).
pub const MINIMAL_PNG: &[u8] = &[
    0x89, 0x50, 0x4e, 0x47, 0x0d, 0x0a, 0x1a, 0x0a, 0x00, 0x00, 0x00, 0x0d, 0x49, 0x48, 0x44,
    0x52, 0x00, 0x00, 0x00, 0x01, 0x00, 0x00, 0x00, 0x01, 0x08, 0x02, 0x00, 0x00, 0x00, 0x90,
    0x77, 0x53, 0xde, 0x00, 0x00, 0x00, 0x0c, 0x49, 0x44, 0x41, 0x54, 0x78, 0x9c, 0x63, 0xf8,
    0xcf, 0xc0, 0x00, 0x00, 0x03, 0x01, 0x01, 0x00, 0xc9, 0xfe, 0x92, 0xef, 0x00, 0x00, 0x00,
    0x00, 0x49, 0x45, 0x4e, 0x44, 0xae, 0x42, 0x60, 0x82,
];

/// 1×1 transparent GIF.
pub const MINIMAL_GIF: &[u8] = &[
    0x47, 0x49, 0x46, 0x38, 0x39, 0x61, // GIF89a
    0x01, 0x00, 0x01, 0x00, // 1×1
    0x80, 0x01, 0x00, // global color table, 2 entries
    0x00, 0x00, 0x00, 0xff, 0xff, 0xff, // palette
    0x21, 0xf9, 0x04, 0x01, 0x00, 0x00, 0x00, 0x00, // graphic control
    0x2c, 0x00, 0x00, 0x00, 0x00, 0x01, 0x00, 0x01, 0x00, 0x00, // image descriptor
    0x02, 0x02, 0x44, 0x01, 0x00, // image data
    0x3b, // trailer
];

pub const BOUNDARY: &str = "----zimgTestBoundary1234";

pub struct TestServer {
    pub base_url: String,
    pub img_path: Utf8PathBuf,
    pub shard_buckets: u32,
    _store: TempDir,
}

impl TestServer {
    pub async fn start() -> Self {
        let store = TempDir::new().unwrap();
        let img_path = Utf8PathBuf::from_path_buf(store.path().join("img")).unwrap();
        let settings = Settings {
            img_path: img_path.clone(),
            ..Settings::default()
        };
        let shard_buckets = settings.shard_buckets;

        let app = Arc::new(App::new(settings));
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let router = serve::router(app);
        tokio::spawn(async move {
            axum::serve(listener, router).await.unwrap();
        });

        TestServer {
            base_url: format!("http://{addr}"),
            img_path,
            shard_buckets,
            _store: store,
        }
    }

    pub fn origin_path(&self, fp: &str) -> Utf8PathBuf {
        zimg_store::image_paths(&self.img_path, fp, Rendition::ORIGIN, self.shard_buckets).origin
    }

    pub fn rendition_path(&self, fp: &str, rendition: Rendition) -> Utf8PathBuf {
        zimg_store::image_paths(&self.img_path, fp, rendition, self.shard_buckets).rendition
    }

    pub async fn get(&self, path_and_query: &str) -> reqwest::Response {
        reqwest::get(format!("{}{path_and_query}", self.base_url))
            .await
            .unwrap()
    }

    /// POST a multipart upload of `payload` named `file_name` and return the
    /// parsed JSON reply.
    pub async fn upload(&self, file_name: &str, payload: &[u8]) -> serde_json::Value {
        let response = reqwest::Client::new()
            .post(format!("{}/upload", self.base_url))
            .header(
                "Content-Type",
                format!("multipart/form-data; boundary={BOUNDARY}"),
            )
            .body(multipart_body(file_name, payload))
            .send()
            .await
            .unwrap();
        assert_eq!(response.status(), 200, "uploads always answer 200");
        response.json().await.unwrap()
    }

    /// Issue a request with a raw, unnormalized target (reqwest would clean
    /// up paths like `/../etc/passwd` before sending).
    pub async fn raw_get(&self, target: &str) -> (u16, String) {
        use tokio::io::{AsyncReadExt, AsyncWriteExt};

        let addr = self.base_url.strip_prefix("http://").unwrap();
        let mut stream = tokio::net::TcpStream::connect(addr).await.unwrap();
        stream
            .write_all(
                format!("GET {target} HTTP/1.1\r\nHost: zimg\r\nConnection: close\r\n\r\n")
                    .as_bytes(),
            )
            .await
            .unwrap();
        let mut response = String::new();
        stream.read_to_string(&mut response).await.unwrap();
        let status = response
            .split_whitespace()
            .nth(1)
            .and_then(|s| s.parse().ok())
            .unwrap_or(0);
        (status, response)
    }

    /// Wait for an asynchronously materialized file to appear.
    pub async fn wait_for_file(&self, path: &Utf8Path) -> bool {
        for _ in 0..100 {
            if path.exists() {
                return true;
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
        false
    }
}

/// Build a multipart/form-data body with a single `userfile` part.
pub fn multipart_body(file_name: &str, payload: &[u8]) -> Vec<u8> {
    let mut body = Vec::new();
    body.extend_from_slice(format!("--{BOUNDARY}\r\n").as_bytes());
    body.extend_from_slice(
        format!("Content-Disposition: form-data; name=\"userfile\"; filename=\"{file_name}\"\r\n")
            .as_bytes(),
    );
    body.extend_from_slice(b"Content-Type: application/octet-stream\r\n\r\n");
    body.extend_from_slice(payload);
    body.extend_from_slice(format!("\r\n--{BOUNDARY}--\r\n").as_bytes());
    body
}

/// Generate a PNG with a deterministic gradient.
pub fn test_png(width: u32, height: u32) -> Vec<u8> {
    let img = image::RgbImage::from_fn(width, height, |x, y| {
        image::Rgb([(x % 256) as u8, (y % 256) as u8, 128])
    });
    let mut out = Cursor::new(Vec::new());
    image::DynamicImage::ImageRgb8(img)
        .write_to(&mut out, image::ImageFormat::Png)
        .unwrap();
    out.into_inner()
}

pub fn dims_of(bytes: &[u8]) -> (u32, u32) {
    let img = image::load_from_memory(bytes).unwrap();
    (img.width(), img.height())
}

pub fn md5_hex(bytes: &[u8]) -> String {
    format!("{:x}", md5::compute(bytes))
}
