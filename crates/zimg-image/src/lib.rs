//! Codec facade for zimg.
//!
//! A thin semantic layer over the `image` crate: sniff uploads by magic
//! bytes, decode into a [`Raster`], apply the two supported transforms
//! (exact Lanczos resize, grayscale), and re-encode with a quality knob.
//!
//! Re-encoding always goes through raw pixels, so metadata carried by the
//! source bytes (EXIF, GPS) never reaches the output.

mod error;

pub use error::CodecError;
pub use image::ImageFormat;

use image::DynamicImage;
use image::codecs::jpeg::JpegEncoder;
use image::imageops::FilterType;
use std::borrow::Cow;
use std::io::Cursor;

/// Input formats accepted by the service, recognized by leading magic bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ImageKind {
    Png,
    Gif,
    Jpeg,
}

const MAGIC_TABLE: &[(ImageKind, &[u8])] = &[
    (ImageKind::Png, &[0x89, 0x50, 0x4e, 0x47, 0x0d, 0x0a, 0x1a, 0x0a]),
    (ImageKind::Gif, b"GIF8"),
    (ImageKind::Jpeg, &[0xff, 0xd8, 0xff]),
];

/// Identify an image by its magic bytes. The bytes decide, never the
/// filename.
pub fn sniff(bytes: &[u8]) -> Option<ImageKind> {
    MAGIC_TABLE
        .iter()
        .find(|(_, magic)| bytes.starts_with(magic))
        .map(|(kind, _)| *kind)
}

/// Whether a filename extension belongs to the supported upload set.
pub fn is_image_ext(ext: &str) -> bool {
    matches!(
        ext.to_ascii_lowercase().as_str(),
        "png" | "jpg" | "jpeg" | "gif"
    )
}

/// Encoder quality before any reduction is applied.
const INITIAL_QUALITY: u8 = 100;

/// A decoded image plus its pending output format and quality.
pub struct Raster {
    image: DynamicImage,
    format: ImageFormat,
    quality: u8,
}

impl Raster {
    /// Decode from encoded bytes; the source format is guessed from the
    /// bytes and becomes the initial output format.
    pub fn decode(bytes: &[u8]) -> Result<Self, CodecError> {
        let format = image::guess_format(bytes).map_err(|_| CodecError::UnsupportedFormat)?;
        let image = image::load_from_memory_with_format(bytes, format)
            .map_err(|e| CodecError::Decode(e.to_string()))?;
        Ok(Raster {
            image,
            format,
            quality: INITIAL_QUALITY,
        })
    }

    pub fn width(&self) -> u32 {
        self.image.width()
    }

    pub fn height(&self) -> u32 {
        self.image.height()
    }

    /// Exact Lanczos resize to the given dimensions; aspect ratio is the
    /// caller's business.
    pub fn resize(&mut self, width: u32, height: u32) {
        self.image = self.image.resize_exact(width, height, FilterType::Lanczos3);
    }

    /// Collapse to single-channel luminance.
    pub fn to_gray(&mut self) {
        self.image = DynamicImage::ImageLuma8(self.image.to_luma8());
    }

    pub fn set_format(&mut self, format: ImageFormat) {
        self.format = format;
    }

    pub fn set_quality(&mut self, quality: u8) {
        self.quality = quality;
    }

    pub fn quality(&self) -> u8 {
        self.quality
    }

    /// Encode with the pending format and quality.
    pub fn encode(&self) -> Result<Vec<u8>, CodecError> {
        let mut out = Cursor::new(Vec::new());
        match self.format {
            ImageFormat::Jpeg => {
                let encoder = JpegEncoder::new_with_quality(&mut out, self.quality);
                self.jpeg_ready()
                    .write_with_encoder(encoder)
                    .map_err(|e| CodecError::Encode(e.to_string()))?;
            }
            format => {
                self.image
                    .write_to(&mut out, format)
                    .map_err(|e| CodecError::Encode(e.to_string()))?;
            }
        }
        Ok(out.into_inner())
    }

    /// JPEG carries no alpha channel: flatten to RGB, keeping pure luma as
    /// luma so grayscale output stays single-channel.
    fn jpeg_ready(&self) -> Cow<'_, DynamicImage> {
        match &self.image {
            DynamicImage::ImageLuma8(_) | DynamicImage::ImageRgb8(_) => Cow::Borrowed(&self.image),
            DynamicImage::ImageLumaA8(_)
            | DynamicImage::ImageLuma16(_)
            | DynamicImage::ImageLumaA16(_) => {
                Cow::Owned(DynamicImage::ImageLuma8(self.image.to_luma8()))
            }
            _ => Cow::Owned(DynamicImage::ImageRgb8(self.image.to_rgb8())),
        }
    }
}
