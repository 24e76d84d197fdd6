/// Google Drive integration
///
/// This module handles:
/// - The installed-app OAuth flow and the on-disk token cache (auth.rs)
/// - File upload, public-read permission and the shareable link (upload.rs)

pub mod auth;
pub mod upload;

pub use auth::{authenticate, ClientSecrets};
pub use upload::{DriveSession, UploadError};
