/// The linear flow behind the "Generate QR Code" button:
/// validate the selection, upload, encode the returned link, save the PNG.
///
/// The upload step is injected as a closure so the failure paths can be
/// exercised without a network; the GUI passes `DriveSession::upload_file`.

use std::path::{Path, PathBuf};
use thiserror::Error;

use crate::drive::UploadError;
use crate::qr::{self, QrError};

/// What a completed share produces: the link that was encoded and the
/// saved artifact to preview.
#[derive(Debug, Clone)]
pub struct SharedQr {
    pub link: String,
    pub artifact: PathBuf,
}

#[derive(Debug, Error)]
pub enum ShareError {
    #[error("No file selected!")]
    NoFileSelected,
    #[error("Error uploading file: {0}")]
    Upload(#[from] UploadError),
    #[error("{0}")]
    Qr(#[from] QrError),
}

/// Run the share flow for one selected file.
///
/// An empty selection is rejected before any network or disk work, and an
/// upload failure produces no artifact. The file's existence is not
/// checked here; a missing file surfaces as the upload's read error.
pub fn share_file<F>(selected: &str, upload: F, out_dir: &Path) -> Result<SharedQr, ShareError>
where
    F: FnOnce(&Path) -> Result<String, UploadError>,
{
    if selected.trim().is_empty() {
        return Err(ShareError::NoFileSelected);
    }

    let source = Path::new(selected);
    let link = upload(source)?;
    let artifact = qr::save_link_qr(&link, out_dir, source)?;

    Ok(SharedQr { link, artifact })
}
