//! The three-tier read pipeline.
//!
//! Within one request the order is strict: hot cache, then the materialized
//! rendition file, then a render from origin. Rendered bytes are cached and
//! handed back with the rendition path to materialize; the HTTP layer runs
//! that write-back after the response.

use crate::App;
use bytes::Bytes;
use camino::Utf8PathBuf;
use eyre::{Result, WrapErr};
use zimg_image::{ImageFormat, Raster};
use zimg_store::{self as store, ImagePaths, Rendition};

/// Quality floor and reduction factor for the re-encode step.
const MIN_QUALITY: u8 = 75;
const QUALITY_FACTOR: f32 = 0.75;

pub struct FetchOutcome {
    pub bytes: Bytes,
    /// Rendition path to materialize once the response is on its way;
    /// `None` when the bytes already live on disk (or must not, for
    /// over-sized requests served at origin size).
    pub write_back: Option<Utf8PathBuf>,
}

pub fn fetch_image(app: &App, fp: &str, rendition: Rendition) -> Result<FetchOutcome> {
    let key = rendition.cache_key(fp);
    if let Some(hit) = app.cache.get(&key) {
        tracing::debug!(%key, "hot cache hit");
        return Ok(FetchOutcome {
            bytes: hit,
            write_back: None,
        });
    }

    let paths = store::image_paths(
        &app.settings.img_path,
        fp,
        rendition,
        app.settings.shard_buckets,
    );

    if store::exists(&paths.rendition) {
        let bytes = Bytes::from(store::read_all(&paths.rendition)?);
        tracing::debug!(path = %paths.rendition, "materialized rendition hit");
        app.cache.put(&key, bytes.clone());
        return Ok(FetchOutcome {
            bytes,
            write_back: None,
        });
    }

    // Origin requests are served verbatim. The origin file is only ever
    // written by uploads; its bytes must keep hashing to the fingerprint.
    if rendition.targets_origin() {
        let bytes = origin_bytes(app, fp, &paths)?;
        app.cache.put(&key, bytes.clone());
        return Ok(FetchOutcome {
            bytes,
            write_back: None,
        });
    }

    render(app, fp, rendition, &paths, &key)
}

/// Produce a rendition that exists neither in cache nor on disk.
fn render(
    app: &App,
    fp: &str,
    rendition: Rendition,
    paths: &ImagePaths,
    key: &str,
) -> Result<FetchOutcome> {
    let mut got_color = false;
    let mut raster: Option<Raster> = None;

    // Grayscale requests can start from the already-sized color rendition
    // instead of rendering from origin again.
    if rendition.gray {
        let color = rendition.color();
        let color_key = color.cache_key(fp);
        if let Some(blob) = app.cache.get(&color_key) {
            match Raster::decode(&blob) {
                Ok(decoded) => {
                    tracing::debug!(%color_key, "color rendition cache hit");
                    raster = Some(decoded);
                    got_color = true;
                }
                Err(e) => {
                    tracing::warn!(%color_key, error = %e, "corrupt cache entry, evicting");
                    app.cache.delete(&color_key);
                }
            }
        }
        if raster.is_none() {
            let color_paths = store::image_paths(
                &app.settings.img_path,
                fp,
                color,
                app.settings.shard_buckets,
            );
            if store::exists(&color_paths.rendition) {
                let blob = Bytes::from(store::read_all(&color_paths.rendition)?);
                if let Ok(decoded) = Raster::decode(&blob) {
                    tracing::debug!(path = %color_paths.rendition, "color rendition file hit");
                    app.cache.put(&color_key, blob);
                    raster = Some(decoded);
                    got_color = true;
                }
            }
        }
    }

    let mut raster = match raster {
        Some(raster) => raster,
        None => decode_origin(app, fp, paths)?,
    };

    // A color rendition already has the requested size; only an image
    // decoded from origin goes through the resize policy.
    let mut already_materialized = false;
    if !got_color {
        let (ow, oh) = (raster.width(), raster.height());
        if rendition.width <= ow && rendition.height <= oh {
            let (w, h) = target_dimensions(
                rendition.width,
                rendition.height,
                ow,
                oh,
                rendition.proportion,
            );
            if (w != 0 || h != 0) && (w, h) != (ow, oh) {
                raster.resize(w, h);
            }
        } else {
            tracing::debug!(
                w = rendition.width,
                h = rendition.height,
                ow,
                oh,
                "requested dimensions exceed origin, serving full size"
            );
            already_materialized = true;
        }
    }

    if rendition.gray {
        raster.to_gray();
    }

    // Canonical re-encode rule: skip only when the color shortcut supplied
    // the pixels and a specific width was requested.
    if !(got_color && rendition.width != 0) {
        let quality = ((f32::from(raster.quality()) * QUALITY_FACTOR) as u8).max(MIN_QUALITY);
        raster.set_format(ImageFormat::Jpeg);
        raster.set_quality(quality);
    }

    let bytes = Bytes::from(raster.encode().wrap_err("rendition encode failed")?);
    app.cache.put(key, bytes.clone());

    let write_back = (!already_materialized).then(|| paths.rendition.clone());
    Ok(FetchOutcome { bytes, write_back })
}

/// Origin bytes for verbatim serving: cache first, disk on miss, priming
/// the cache from disk.
fn origin_bytes(app: &App, fp: &str, paths: &ImagePaths) -> Result<Bytes> {
    let origin_key = Rendition::ORIGIN.cache_key(fp);
    if let Some(blob) = app.cache.get(&origin_key) {
        tracing::debug!(%fp, "origin cache hit");
        return Ok(blob);
    }
    let blob = Bytes::from(
        store::read_all(&paths.origin)
            .wrap_err_with(|| format!("no origin at {}", paths.origin))?,
    );
    app.cache.put(&origin_key, blob.clone());
    Ok(blob)
}

/// Decode the origin for rendering. A cached entry that no longer decodes
/// is evicted and the file on disk takes over.
fn decode_origin(app: &App, fp: &str, paths: &ImagePaths) -> Result<Raster> {
    let origin_key = Rendition::ORIGIN.cache_key(fp);
    if let Some(blob) = app.cache.get(&origin_key) {
        match Raster::decode(&blob) {
            Ok(raster) => {
                tracing::debug!(%fp, "origin cache hit");
                return Ok(raster);
            }
            Err(e) => {
                tracing::warn!(%origin_key, error = %e, "corrupt origin cache entry, evicting");
                app.cache.delete(&origin_key);
            }
        }
    }
    let blob = Bytes::from(
        store::read_all(&paths.origin)
            .wrap_err_with(|| format!("no origin at {}", paths.origin))?,
    );
    let raster = Raster::decode(&blob).wrap_err("origin bytes failed to decode")?;
    app.cache.put(&origin_key, blob);
    Ok(raster)
}

/// Concrete target dimensions for the resize, given origin dimensions.
/// With `proportion`, the open axis is derived from the other; a request
/// with an explicit height wins over an explicit width. Without it, a zero
/// axis keeps the origin dimension.
fn target_dimensions(w: u32, h: u32, ow: u32, oh: u32, proportion: bool) -> (u32, u32) {
    if proportion {
        if w != 0 && h == 0 {
            (w, ratio(w, oh, ow))
        } else {
            (ratio(h, ow, oh), h)
        }
    } else {
        (if w == 0 { ow } else { w }, if h == 0 { oh } else { h })
    }
}

/// round(a · num / den) in wide arithmetic.
fn ratio(a: u32, num: u32, den: u32) -> u32 {
    (((u64::from(a) * u64::from(num)) as f64) / f64::from(den)).round() as u32
}
