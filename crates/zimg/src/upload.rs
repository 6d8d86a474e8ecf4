//! The save pipeline: validated multipart payloads to content-addressed
//! origin files.
//!
//! Identity is content-only, so an upload whose fingerprint is already
//! cached or on disk is acknowledged without writing anything.

use crate::App;
use bytes::Bytes;
use camino::Utf8Path;
use eyre::{Result, WrapErr, eyre};
use zimg_image::{ImageFormat, Raster};
use zimg_store::{self as store, Rendition, StoreError};

/// JPEG baseline written beside the origin at upload time.
const BASELINE_NAME: &str = "0.jpg";
const BASELINE_QUALITY: u8 = 75;

/// Store an upload payload and return its fingerprint.
pub fn save_image(app: &App, payload: &[u8]) -> Result<String> {
    if payload.is_empty() {
        return Err(eyre!("empty image payload"));
    }
    let kind = zimg_image::sniff(payload).ok_or_else(|| eyre!("unrecognized image magic"))?;

    let fp = store::fingerprint(payload);
    tracing::debug!(%fp, format = ?kind, len = payload.len(), "saving upload");

    let origin_key = Rendition::ORIGIN.cache_key(&fp);
    if app.cache.exists(&origin_key) {
        tracing::debug!(%fp, "origin already cached, nothing to write");
        return Ok(fp);
    }

    let paths = store::image_paths(
        &app.settings.img_path,
        &fp,
        Rendition::ORIGIN,
        app.settings.shard_buckets,
    );
    if store::exists(&paths.origin) {
        tracing::debug!(%fp, "origin already on disk, nothing to write");
        app.cache.put(&origin_key, Bytes::copy_from_slice(payload));
        return Ok(fp);
    }

    store::ensure_dir(&paths.dir).wrap_err_with(|| format!("failed to create {}", paths.dir))?;
    match store::write_new(&paths.origin, payload) {
        Ok(()) => tracing::info!(%fp, path = %paths.origin, "origin stored"),
        Err(StoreError::Busy) => {
            // The lock holder is writing the same content-addressed bytes.
            tracing::warn!(%fp, "origin is being written by a peer, dropping our copy");
            return Ok(fp);
        }
        Err(e) => {
            return Err(e).wrap_err_with(|| format!("failed to write {}", paths.origin));
        }
    }

    if let Err(e) = write_baseline(payload, &paths.dir) {
        tracing::warn!(%fp, error = %e, "baseline conversion failed");
    }

    Ok(fp)
}

/// Re-encode the upload as a JPEG-75 sibling of the origin. Best effort;
/// the upload succeeds without it.
fn write_baseline(payload: &[u8], dir: &Utf8Path) -> Result<()> {
    let mut raster = Raster::decode(payload)?;
    raster.set_format(ImageFormat::Jpeg);
    raster.set_quality(BASELINE_QUALITY);
    let jpeg = raster.encode()?;
    store::write_new(&dir.join(BASELINE_NAME), &jpeg)?;
    Ok(())
}

/// File extension of an upload filename, lowercased.
pub fn file_ext(name: &str) -> Option<String> {
    let dot = name.rfind('.')?;
    let ext = &name[dot + 1..];
    (!ext.is_empty()).then(|| ext.to_ascii_lowercase())
}
