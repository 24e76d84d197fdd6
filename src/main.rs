use iced::widget::{button, column, container, image as preview_image, text, text_input, Column};
use iced::{Alignment, ContentFit, Element, Length, Size, Task, Theme};
use rfd::{FileDialog, MessageDialog, MessageLevel};
use std::path::Path;

mod drive;
mod qr;
mod share;

use drive::DriveSession;
use share::SharedQr;

/// Where QR artifacts land, relative to the working directory.
const OUTPUT_DIR: &str = "qr_codes";

/// Fixed display size of the on-screen QR preview.
const PREVIEW_SIZE: f32 = 200.0;

/// Main application state
struct CloudQr {
    /// The authenticated Drive session, created once at startup
    session: DriveSession,
    /// Contents of the path text input
    selected_path: String,
    /// The most recently generated QR code, decoded for display
    preview: Option<preview_image::Handle>,
    /// True while a share flow is running
    busy: bool,
    /// Status message to display to the user
    status: String,
}

/// Application messages (events)
#[derive(Debug, Clone)]
enum Message {
    /// User edited the path text input
    PathEdited(String),
    /// User clicked the "Browse" button
    BrowseFile,
    /// User clicked the "Generate QR Code" button
    GenerateQr,
    /// Background share flow finished
    ShareComplete(Result<SharedQr, String>),
}

impl CloudQr {
    /// Create a new instance of the application
    fn new(session: DriveSession) -> (Self, Task<Message>) {
        (
            CloudQr {
                session,
                selected_path: String::new(),
                preview: None,
                busy: false,
                status: String::from("Select a file to share."),
            },
            Task::none(),
        )
    }

    /// Handle application messages and update state
    fn update(&mut self, message: Message) -> Task<Message> {
        match message {
            Message::PathEdited(path) => {
                self.selected_path = path;
                Task::none()
            }
            Message::BrowseFile => {
                // Show the native file picker dialog
                let file = FileDialog::new().set_title("Select a file to share").pick_file();

                if let Some(path) = file {
                    self.selected_path = path.display().to_string();
                }

                Task::none()
            }
            Message::GenerateQr => {
                if self.busy {
                    return Task::none();
                }

                if self.selected_path.trim().is_empty() {
                    error_dialog("Error", "No file selected!");
                    return Task::none();
                }

                self.busy = true;
                self.status = format!("Uploading {}...", self.selected_path);

                let selected = self.selected_path.clone();
                let session = self.session.clone();

                Task::perform(share_file_async(selected, session), Message::ShareComplete)
            }
            Message::ShareComplete(result) => {
                self.busy = false;

                match result {
                    Ok(shared) => {
                        // Load fresh bytes rather than going by path, so a
                        // regenerated artifact at the same path replaces the
                        // cached preview texture.
                        match std::fs::read(&shared.artifact) {
                            Ok(bytes) => {
                                self.preview = Some(preview_image::Handle::from_bytes(bytes))
                            }
                            Err(e) => eprintln!("⚠️  Could not reload the QR preview: {}", e),
                        }

                        self.status = format!("QR code saved at {}", shared.artifact.display());
                        info_dialog(
                            "Success",
                            &format!(
                                "QR Code saved at:\n{}\nScanning will open the file!",
                                shared.artifact.display()
                            ),
                        );
                    }
                    Err(message) => {
                        self.status = String::from("Upload failed.");
                        error_dialog("Upload Failed", &message);
                    }
                }

                Task::none()
            }
        }
    }

    /// Build the user interface
    fn view(&self) -> Element<Message> {
        let mut generate = button("Generate QR Code").padding(10);
        if !self.busy {
            generate = generate.on_press(Message::GenerateQr);
        }

        let mut content: Column<Message> = column![
            text("Cloud File to QR Code Generator").size(24),
            text("Select a file:").size(16),
            text_input("Path to a local file", &self.selected_path)
                .on_input(Message::PathEdited)
                .width(Length::Fixed(340.0))
                .padding(8),
            button("Browse").on_press(Message::BrowseFile).padding(10),
            generate,
        ]
        .spacing(12)
        .padding(30)
        .align_x(Alignment::Center);

        if let Some(handle) = &self.preview {
            // Fixed 200x200 preview; aspect ratio is not preserved.
            content = content.push(
                preview_image(handle.clone())
                    .width(Length::Fixed(PREVIEW_SIZE))
                    .height(Length::Fixed(PREVIEW_SIZE))
                    .content_fit(ContentFit::Fill),
            );
        }

        content = content.push(text(&self.status).size(14));

        container(content)
            .width(Length::Fill)
            .height(Length::Fill)
            .center_x(Length::Fill)
            .center_y(Length::Fill)
            .into()
    }

    /// Set the application theme
    fn theme(&self) -> Theme {
        Theme::Dark
    }
}

fn main() -> iced::Result {
    // Authenticate before the window opens. The browser-based login blocks
    // startup, and a failure here is fatal because nothing downstream can
    // work without a Drive session.
    let secrets_path = drive::ClientSecrets::path_from_env();
    let secrets = drive::ClientSecrets::load(&secrets_path).unwrap_or_else(|e| {
        panic!(
            "Failed to load client secrets from {}: {}. \
             Set GOOGLE_CLIENT_SECRETS or place client_secrets.json in the working directory.",
            secrets_path.display(),
            e
        )
    });
    let session = drive::authenticate(&secrets).expect("Google Drive authentication failed");

    println!("☁️  Drive session ready");

    iced::application("Cloud File to QR Code Generator", CloudQr::update, CloudQr::view)
        .theme(CloudQr::theme)
        .window_size(Size::new(420.0, 520.0))
        .centered()
        .run_with(move || CloudQr::new(session))
}

/// Run the whole share flow off the UI thread.
///
/// reqwest's blocking client must not run on the async executor, so the
/// flow goes through spawn_blocking and collapses its error to a display
/// string for the completion message.
async fn share_file_async(selected: String, session: DriveSession) -> Result<SharedQr, String> {
    let result = tokio::task::spawn_blocking(move || {
        share::share_file(
            &selected,
            |path| session.upload_file(path),
            Path::new(OUTPUT_DIR),
        )
    })
    .await
    .map_err(|e| format!("Task join error: {}", e))?;

    result.map_err(|e| e.to_string())
}

/// One blocking modal error box.
fn error_dialog(title: &str, description: &str) {
    let _ = MessageDialog::new()
        .set_level(MessageLevel::Error)
        .set_title(title)
        .set_description(description)
        .show();
}

fn info_dialog(title: &str, description: &str) {
    let _ = MessageDialog::new()
        .set_level(MessageLevel::Info)
        .set_title(title)
        .set_description(description)
        .show();
}
