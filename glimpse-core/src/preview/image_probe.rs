//! Image format and dimension probe. Pixels are decoded by the renderer.

use std::path::{Path, PathBuf};

use image::ImageReader;

use super::model::ImageHandle;
use crate::error::{CoreError, CoreResult};

pub const UNRENDERABLE_IMAGE: &str = "Cannot render image (is the encoding wrong?)";

fn probe_blocking(path: &Path) -> CoreResult<ImageHandle> {
    let reader = ImageReader::open(path)?
        .with_guessed_format()
        .map_err(|e| CoreError::decode(path, e))?;

    let format = reader
        .format()
        .ok_or_else(|| CoreError::decode(path, "unknown image format"))?;

    let (width, height) = reader
        .into_dimensions()
        .map_err(|e| CoreError::decode(path, e))?;

    Ok(ImageHandle {
        path: path.to_path_buf(),
        format,
        width,
        height,
    })
}

pub async fn probe(path: &Path) -> CoreResult<ImageHandle> {
    let owned: PathBuf = path.to_path_buf();
    tokio::task::spawn_blocking(move || probe_blocking(&owned)).await?
}
