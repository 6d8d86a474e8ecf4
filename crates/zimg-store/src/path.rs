//! Fingerprints, shard fan-out, and rendition naming.
//!
//! Everything here is pure: callers combine these with [`crate::storage`]
//! for the actual I/O.

use camino::{Utf8Path, Utf8PathBuf};

/// Compute the content fingerprint: 32 chars of lowercase hex MD5.
pub fn fingerprint(bytes: &[u8]) -> String {
    format!("{:x}", md5::compute(bytes))
}

/// Whether `s` is exactly a fingerprint (32 lowercase hex digits).
pub fn is_fingerprint(s: &str) -> bool {
    s.len() == 32
        && s.bytes()
            .all(|b| b.is_ascii_digit() || (b'a'..=b'f').contains(&b))
}

/// Fold a string into a shard bucket.
///
/// Must stay byte-for-byte stable across releases: bucket indices are baked
/// into every on-disk path.
fn bucket(s: &str, buckets: u32) -> u32 {
    let mut h: u32 = 5381;
    for b in s.bytes() {
        h = h.wrapping_mul(33).wrapping_add(u32::from(b));
    }
    h % buckets.max(1)
}

/// Two-level shard indices for a fingerprint: the hash of the whole string
/// and the hash of everything past the third character.
pub fn shard(fp: &str, buckets: u32) -> (u32, u32) {
    let tail = fp.get(3..).unwrap_or("");
    (bucket(fp, buckets), bucket(tail, buckets))
}

/// One derived view of a stored image.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Rendition {
    /// Target width; 0 means unconstrained.
    pub width: u32,
    /// Target height; 0 means unconstrained.
    pub height: u32,
    /// Derive the open axis so aspect ratio is preserved.
    pub proportion: bool,
    /// Collapse to single-channel luminance.
    pub gray: bool,
}

impl Rendition {
    /// The unmodified stored bytes, named `0*0p` on disk.
    pub const ORIGIN: Rendition = Rendition {
        width: 0,
        height: 0,
        proportion: true,
        gray: false,
    };

    /// Whether this rendition resolves to the origin file. The `proportion`
    /// flag does not participate: `0*0` with either flag is the same bytes.
    pub fn targets_origin(&self) -> bool {
        self.width == 0 && self.height == 0 && !self.gray
    }

    /// The same rendition without the grayscale step.
    pub fn color(&self) -> Rendition {
        Rendition {
            gray: false,
            ..*self
        }
    }

    /// Canonical cache key: `img:<fp>:<w>:<h>:<p>:<g>`.
    pub fn cache_key(&self, fp: &str) -> String {
        format!(
            "img:{}:{}:{}:{}:{}",
            fp, self.width, self.height, self.proportion as u8, self.gray as u8
        )
    }

    /// On-disk file name: `<w>*<h>` followed by `p` and `g` flags.
    pub fn file_name(&self) -> String {
        let mut name = format!("{}*{}", self.width, self.height);
        if self.proportion {
            name.push('p');
        }
        if self.gray {
            name.push('g');
        }
        name
    }
}

/// Resolved locations for one image and one rendition of it.
#[derive(Debug, Clone)]
pub struct ImagePaths {
    /// Per-image directory `<root>/<l1>/<l2>/<fp>`.
    pub dir: Utf8PathBuf,
    /// The origin file inside `dir`.
    pub origin: Utf8PathBuf,
    /// The rendition file inside `dir`; equals `origin` for origin-targeting
    /// renditions.
    pub rendition: Utf8PathBuf,
}

pub fn image_paths(root: &Utf8Path, fp: &str, rendition: Rendition, buckets: u32) -> ImagePaths {
    let (l1, l2) = shard(fp, buckets);
    let dir = root.join(l1.to_string()).join(l2.to_string()).join(fp);
    let origin = dir.join(Rendition::ORIGIN.file_name());
    let rendition = if rendition.targets_origin() {
        origin.clone()
    } else {
        dir.join(rendition.file_name())
    };
    ImagePaths {
        dir,
        origin,
        rendition,
    }
}
