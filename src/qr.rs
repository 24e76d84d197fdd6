/// QR rendering for shareable links
///
/// Encodes a link at error-correction level L, starting at version 1 and
/// growing until it fits, then renders black-on-white modules at a fixed
/// pixel scale and saves the result next to other generated codes.

use image::Luma;
use qrcode::{EcLevel, QrCode};
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Pixels per QR module.
const MODULE_PIXELS: u32 = 10;

#[derive(Debug, Error)]
pub enum QrError {
    #[error("could not encode the link as a QR code: {0}")]
    Encode(#[from] qrcode::types::QrError),
    #[error("could not create the output directory {path}: {source}")]
    OutputDir {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("could not save the QR image: {0}")]
    Save(#[from] image::ImageError),
}

/// Where a source file's QR artifact lands: `<out_dir>/<basename>_qr.png`.
/// Repeated shares of the same basename map to the same path.
pub fn artifact_path(out_dir: &Path, source: &Path) -> PathBuf {
    let basename = source
        .file_name()
        .map(|name| name.to_string_lossy().to_string())
        .unwrap_or_else(|| source.display().to_string());
    out_dir.join(format!("{}_qr.png", basename))
}

/// Encode `link` and save it as a PNG named after `source`, creating the
/// output directory if needed. An existing artifact for the same basename
/// is silently overwritten.
pub fn save_link_qr(link: &str, out_dir: &Path, source: &Path) -> Result<PathBuf, QrError> {
    let code = encode(link)?;

    std::fs::create_dir_all(out_dir).map_err(|err| QrError::OutputDir {
        path: out_dir.to_path_buf(),
        source: err,
    })?;

    let rendered = code
        .render::<Luma<u8>>()
        .module_dimensions(MODULE_PIXELS, MODULE_PIXELS)
        .quiet_zone(true)
        .build();

    let path = artifact_path(out_dir, source);
    rendered.save(&path)?;

    println!("🧾 Saved QR code: {}", path.display());
    Ok(path)
}

/// Level L, smallest version that fits. Version 1 holds roughly 25
/// alphanumeric characters, so real Drive links land on a larger symbol.
fn encode(link: &str) -> Result<QrCode, qrcode::types::QrError> {
    QrCode::with_error_correction_level(link.as_bytes(), EcLevel::L)
}
