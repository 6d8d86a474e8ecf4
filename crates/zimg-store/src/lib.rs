//! Content-addressed storage primitives for zimg.
//!
//! Images are identified by the MD5 fingerprint of their uploaded bytes and
//! live in a two-level sharded directory tree. Derived renditions are files
//! next to the origin, named after their parameters. A process-wide hot
//! cache holds recently served blobs keyed by rendition key.

pub mod cache;
pub mod path;
pub mod storage;

pub use cache::HotCache;
pub use path::{ImagePaths, Rendition, fingerprint, image_paths, is_fingerprint, shard};
pub use storage::{StoreError, ensure_dir, exists, read_all, write_new};
