/// Drive v3 upload client
///
/// One multipart call creates the remote file (titled with the local
/// basename) and carries its bytes, a second call opens it to anyone with
/// the link, and the file's `webViewLink` comes back as the shareable URL.

use reqwest::blocking::multipart;
use serde::Deserialize;
use serde_json::json;
use std::path::Path;
use thiserror::Error;

const UPLOAD_URL: &str =
    "https://www.googleapis.com/upload/drive/v3/files?uploadType=multipart&fields=id,webViewLink";
const FILES_URL: &str = "https://www.googleapis.com/drive/v3/files";

#[derive(Debug, Error)]
pub enum UploadError {
    #[error("could not read {path}: {source}")]
    Read {
        path: String,
        source: std::io::Error,
    },
    #[error("request to Google Drive failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("Google Drive returned {status}: {body}")]
    Api {
        status: reqwest::StatusCode,
        body: String,
    },
    #[error("the Drive response did not include a shareable link")]
    MissingLink,
}

/// An authenticated Drive session, shared read-only for the process's
/// lifetime. Cloning is cheap; the underlying HTTP client is pooled.
#[derive(Clone)]
pub struct DriveSession {
    client: reqwest::blocking::Client,
    access_token: String,
}

#[derive(Debug, Deserialize)]
struct DriveFile {
    id: String,
    #[serde(rename = "webViewLink")]
    web_view_link: Option<String>,
}

impl DriveSession {
    pub fn new(access_token: String) -> Self {
        DriveSession {
            client: reqwest::blocking::Client::new(),
            access_token,
        }
    }

    /// Upload a local file, make it readable by anyone with the link and
    /// return that link.
    ///
    /// A failure after the file record is created leaves it in place
    /// unshared; there is no cleanup of partial uploads.
    pub fn upload_file(&self, path: &Path) -> Result<String, UploadError> {
        let title = file_title(path);
        let bytes = std::fs::read(path).map_err(|source| UploadError::Read {
            path: path.display().to_string(),
            source,
        })?;

        println!("☁️  Uploading {} ({} bytes)...", title, bytes.len());

        let metadata = multipart::Part::text(file_metadata(&title).to_string())
            .mime_str("application/json; charset=UTF-8")?;
        let content = multipart::Part::bytes(bytes)
            .file_name(title.clone())
            .mime_str("application/octet-stream")?;
        let form = multipart::Form::new()
            .part("metadata", metadata)
            .part("file", content);

        let response = self
            .client
            .post(UPLOAD_URL)
            .bearer_auth(&self.access_token)
            .multipart(form)
            .send()?;
        let file: DriveFile = parse_drive_file(response)?;

        self.share_with_anyone(&file.id)?;

        file.web_view_link.ok_or(UploadError::MissingLink)
    }

    /// Insert the `anyone`/`reader` permission so the link works without
    /// a Google account.
    fn share_with_anyone(&self, file_id: &str) -> Result<(), UploadError> {
        let url = format!("{}/{}/permissions", FILES_URL, file_id);
        let response = self
            .client
            .post(&url)
            .bearer_auth(&self.access_token)
            .json(&anyone_reader_permission())
            .send()?;

        if !response.status().is_success() {
            return Err(UploadError::Api {
                status: response.status(),
                body: response.text().unwrap_or_default(),
            });
        }
        Ok(())
    }
}

fn parse_drive_file(response: reqwest::blocking::Response) -> Result<DriveFile, UploadError> {
    if !response.status().is_success() {
        return Err(UploadError::Api {
            status: response.status(),
            body: response.text().unwrap_or_default(),
        });
    }
    Ok(response.json()?)
}

/// The title Drive shows for the upload: the local file's basename.
pub fn file_title(path: &Path) -> String {
    path.file_name()
        .map(|name| name.to_string_lossy().to_string())
        .unwrap_or_else(|| path.display().to_string())
}

fn file_metadata(title: &str) -> serde_json::Value {
    json!({ "name": title })
}

fn anyone_reader_permission() -> serde_json::Value {
    json!({ "type": "anyone", "role": "reader" })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn title_is_the_basename() {
        assert_eq!(file_title(Path::new("/home/user/report.pdf")), "report.pdf");
        assert_eq!(file_title(Path::new("notes.txt")), "notes.txt");
    }

    #[test]
    fn metadata_names_the_remote_file() {
        let metadata = file_metadata("report.pdf");
        assert_eq!(metadata["name"], "report.pdf");
    }

    #[test]
    fn permission_opens_the_file_to_anyone() {
        let permission = anyone_reader_permission();
        assert_eq!(permission["type"], "anyone");
        assert_eq!(permission["role"], "reader");
    }

    #[test]
    fn drive_response_parses_with_a_link() {
        let json = r#"{
            "id": "abc123",
            "webViewLink": "https://drive.google.com/file/d/abc123/view"
        }"#;
        let file: DriveFile = serde_json::from_str(json).unwrap();
        assert_eq!(file.id, "abc123");
        assert_eq!(
            file.web_view_link.as_deref(),
            Some("https://drive.google.com/file/d/abc123/view")
        );
    }

    #[test]
    fn missing_link_is_its_own_error() {
        let json = r#"{ "id": "abc123" }"#;
        let file: DriveFile = serde_json::from_str(json).unwrap();
        let result: Result<String, UploadError> = file.web_view_link.ok_or(UploadError::MissingLink);
        assert!(matches!(result, Err(UploadError::MissingLink)));
    }

    #[test]
    fn reading_a_missing_file_surfaces_the_io_error() {
        let session = DriveSession::new("token".into());
        let result = session.upload_file(Path::new("/nonexistent/path/report.pdf"));
        assert!(matches!(result, Err(UploadError::Read { .. })));
    }
}
