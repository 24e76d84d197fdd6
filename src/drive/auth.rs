/// Installed-app OAuth flow against Google
///
/// The flow mirrors what the desktop "local webserver" login does:
/// open the consent page in the system browser, catch the redirect on a
/// loopback listener, exchange the authorization code for a bearer token.
/// A cached, unexpired token skips the browser entirely.

use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::io::{BufRead, BufReader, Write};
use std::net::TcpListener;
use std::path::{Path, PathBuf};
use thiserror::Error;

use super::upload::DriveSession;

const AUTH_URL: &str = "https://accounts.google.com/o/oauth2/v2/auth";
const TOKEN_URL: &str = "https://oauth2.googleapis.com/token";
const DRIVE_SCOPE: &str = "https://www.googleapis.com/auth/drive";

/// Slack subtracted from the token lifetime so a share that starts just
/// before expiry does not fail halfway through.
const EXPIRY_SLACK_SECS: i64 = 60;

#[derive(Debug, Error)]
pub enum AuthError {
    #[error("could not read client secrets from {path}: {source}")]
    Secrets {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("client secrets are not valid JSON: {0}")]
    SecretsFormat(#[from] serde_json::Error),
    #[error("could not listen on 127.0.0.1:{port} for the login redirect: {source}")]
    Listener {
        port: u16,
        source: std::io::Error,
    },
    #[error("could not open the system browser: {0}")]
    Browser(std::io::Error),
    #[error("the login redirect did not include an authorization code")]
    MissingCode,
    #[error("token exchange failed: {0}")]
    Http(#[from] reqwest::Error),
}

/// Google's `client_secrets.json` for an installed application.
/// Unknown fields (redirect URIs, project id, ...) are ignored.
#[derive(Debug, Clone, Deserialize)]
pub struct ClientSecrets {
    pub installed: InstalledApp,
}

#[derive(Debug, Clone, Deserialize)]
pub struct InstalledApp {
    pub client_id: String,
    pub client_secret: String,
    /// Loopback port the consent redirect comes back on.
    #[serde(default = "default_redirect_port")]
    pub redirect_port: u16,
}

fn default_redirect_port() -> u16 {
    8080
}

impl ClientSecrets {
    /// Where to look for the secrets file: `GOOGLE_CLIENT_SECRETS` if set,
    /// otherwise `client_secrets.json` in the working directory.
    pub fn path_from_env() -> PathBuf {
        std::env::var("GOOGLE_CLIENT_SECRETS")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("client_secrets.json"))
    }

    pub fn load(path: &Path) -> Result<Self, AuthError> {
        let data = std::fs::read_to_string(path).map_err(|source| AuthError::Secrets {
            path: path.to_path_buf(),
            source,
        })?;
        Ok(serde_json::from_str(&data)?)
    }
}

/// A bearer token plus the unix timestamp it stops being valid at.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CachedToken {
    pub access_token: String,
    pub expires_at: i64,
}

impl CachedToken {
    pub fn is_expired(&self) -> bool {
        Utc::now().timestamp() + EXPIRY_SLACK_SECS >= self.expires_at
    }
}

/// Obtain an authenticated Drive session, reusing a cached token when one
/// is still valid and running the browser flow otherwise.
pub fn authenticate(secrets: &ClientSecrets) -> Result<DriveSession, AuthError> {
    if let Some(token) = load_cached_token() {
        if !token.is_expired() {
            println!("🔑 Reusing cached Drive token");
            return Ok(DriveSession::new(token.access_token));
        }
    }

    let app = &secrets.installed;
    let redirect_uri = format!("http://127.0.0.1:{}", app.redirect_port);

    // Bind before opening the browser so the redirect cannot race us.
    let listener =
        TcpListener::bind(("127.0.0.1", app.redirect_port)).map_err(|source| AuthError::Listener {
            port: app.redirect_port,
            source,
        })?;

    let url = consent_url(app, &redirect_uri);
    println!("🌐 Opening the browser for Google Drive consent...");
    webbrowser::open(url.as_str()).map_err(AuthError::Browser)?;

    let code = wait_for_redirect(&listener, app.redirect_port)?;
    let token = exchange_code(app, &redirect_uri, &code)?;
    save_cached_token(&token);

    println!("✅ Google Drive login complete");
    Ok(DriveSession::new(token.access_token))
}

/// Build the consent-page URL with properly encoded query parameters.
fn consent_url(app: &InstalledApp, redirect_uri: &str) -> reqwest::Url {
    reqwest::Url::parse_with_params(
        AUTH_URL,
        &[
            ("client_id", app.client_id.as_str()),
            ("redirect_uri", redirect_uri),
            ("response_type", "code"),
            ("scope", DRIVE_SCOPE),
        ],
    )
    .expect("the consent URL is statically valid")
}

/// Block until the consent redirect arrives on the loopback listener and
/// return the authorization code.
///
/// Browsers open speculative connections and fetch `/favicon.ico` against
/// the loopback origin, so every connection is answered and anything that
/// is not the redirect (no `code` and no `error` parameter) is skipped.
fn wait_for_redirect(listener: &TcpListener, port: u16) -> Result<String, AuthError> {
    for stream in listener.incoming() {
        let mut stream = stream.map_err(|source| AuthError::Listener { port, source })?;

        let mut request_line = String::new();
        {
            let mut reader = BufReader::new(&stream);
            if reader.read_line(&mut request_line).is_err() {
                continue;
            }
        }

        let outcome = classify_redirect(&request_line);

        let body = match outcome {
            RedirectOutcome::Code(_) => {
                "<html><body>Authentication complete. You can close this tab.</body></html>"
            }
            RedirectOutcome::Denied => {
                "<html><body>Authentication failed. You can close this tab.</body></html>"
            }
            RedirectOutcome::Unrelated => "<html><body></body></html>",
        };
        let response = format!(
            "HTTP/1.1 200 OK\r\nContent-Type: text/html\r\nContent-Length: {}\r\n\r\n{}",
            body.len(),
            body
        );
        // The page is cosmetic; a failed write does not invalidate the code.
        let _ = stream.write_all(response.as_bytes());

        match outcome {
            RedirectOutcome::Code(code) => return Ok(code),
            RedirectOutcome::Denied => return Err(AuthError::MissingCode),
            RedirectOutcome::Unrelated => continue,
        }
    }

    Err(AuthError::MissingCode)
}

/// What one request against the loopback listener turned out to be.
enum RedirectOutcome {
    /// The consent redirect, carrying the decoded authorization code.
    Code(String),
    /// The consent redirect, but the user denied access (`error=...`).
    Denied,
    /// A favicon fetch, speculative connection or other stray request.
    Unrelated,
}

/// Classify a request line such as `GET /?code=4%2Fabc&scope=... HTTP/1.1`.
/// Google's codes arrive percent-encoded, so the query is parsed and
/// decoded as a real URL.
fn classify_redirect(request_line: &str) -> RedirectOutcome {
    let Some(target) = request_line.split_whitespace().nth(1) else {
        return RedirectOutcome::Unrelated;
    };
    let Ok(url) = reqwest::Url::parse(&format!("http://localhost{}", target)) else {
        return RedirectOutcome::Unrelated;
    };

    let mut denied = false;
    for (key, value) in url.query_pairs() {
        if key == "code" && !value.is_empty() {
            return RedirectOutcome::Code(value.into_owned());
        }
        if key == "error" {
            denied = true;
        }
    }

    if denied {
        RedirectOutcome::Denied
    } else {
        RedirectOutcome::Unrelated
    }
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    #[serde(default)]
    expires_in: Option<i64>,
}

/// Trade the authorization code for a bearer token.
fn exchange_code(
    app: &InstalledApp,
    redirect_uri: &str,
    code: &str,
) -> Result<CachedToken, AuthError> {
    let client = reqwest::blocking::Client::new();
    let params = [
        ("code", code),
        ("client_id", app.client_id.as_str()),
        ("client_secret", app.client_secret.as_str()),
        ("redirect_uri", redirect_uri),
        ("grant_type", "authorization_code"),
    ];

    let response = client
        .post(TOKEN_URL)
        .form(&params)
        .send()?
        .error_for_status()?;
    let token: TokenResponse = response.json()?;

    // Google returns 3600 today; assume it if the field is ever missing.
    let expires_in = token.expires_in.unwrap_or(3600);
    Ok(CachedToken {
        access_token: token.access_token,
        expires_at: Utc::now().timestamp() + expires_in,
    })
}

/// Get the path where the token cache should be stored
fn token_cache_path() -> PathBuf {
    let mut path = dirs::data_dir()
        .or_else(dirs::home_dir)
        .expect("Could not determine user data directory");

    path.push("cloud-qr");
    path.push("token.json");
    path
}

fn load_cached_token() -> Option<CachedToken> {
    let data = std::fs::read_to_string(token_cache_path()).ok()?;
    serde_json::from_str(&data).ok()
}

/// Best effort: a share still works this run if the cache cannot be written.
fn save_cached_token(token: &CachedToken) {
    let path = token_cache_path();
    if let Some(parent) = path.parent() {
        if std::fs::create_dir_all(parent).is_err() {
            eprintln!("⚠️  Could not create the token cache directory");
            return;
        }
    }
    match serde_json::to_string(token) {
        Ok(json) => {
            if std::fs::write(&path, json).is_err() {
                eprintln!("⚠️  Could not write the token cache");
            }
        }
        Err(e) => eprintln!("⚠️  Could not serialize the token cache: {}", e),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extracts_the_code_from_a_redirect_request_line() {
        let line = "GET /?code=4%2Fabc123&scope=https://www.googleapis.com/auth/drive HTTP/1.1";
        // The code must come back percent-decoded, ready for the exchange.
        assert!(matches!(
            classify_redirect(line),
            RedirectOutcome::Code(code) if code == "4/abc123"
        ));
    }

    #[test]
    fn denied_consent_is_not_mistaken_for_a_stray_request() {
        let line = "GET /?error=access_denied HTTP/1.1";
        assert!(matches!(classify_redirect(line), RedirectOutcome::Denied));
    }

    #[test]
    fn favicon_and_bare_requests_are_unrelated() {
        assert!(matches!(
            classify_redirect("GET /favicon.ico HTTP/1.1"),
            RedirectOutcome::Unrelated
        ));
        assert!(matches!(
            classify_redirect("GET / HTTP/1.1"),
            RedirectOutcome::Unrelated
        ));
    }

    #[test]
    fn stray_connections_do_not_starve_the_redirect() {
        use std::io::{Read, Write};
        use std::net::TcpStream;

        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();

        let browser = std::thread::spawn(move || {
            // A favicon fetch lands on the listener first...
            let mut favicon = TcpStream::connect(addr).unwrap();
            favicon
                .write_all(b"GET /favicon.ico HTTP/1.1\r\n\r\n")
                .unwrap();
            let mut drained = String::new();
            let _ = favicon.read_to_string(&mut drained);

            // ...and only then the real consent redirect.
            let mut redirect = TcpStream::connect(addr).unwrap();
            redirect
                .write_all(b"GET /?code=4%2Fabc123&scope=drive HTTP/1.1\r\n\r\n")
                .unwrap();
            let mut response = String::new();
            let _ = redirect.read_to_string(&mut response);
            response
        });

        let code = wait_for_redirect(&listener, addr.port()).unwrap();
        assert_eq!(code, "4/abc123");

        let response = browser.join().unwrap();
        assert!(response.starts_with("HTTP/1.1 200 OK"));
        assert!(response.contains("Authentication complete"));
    }

    #[test]
    fn denied_consent_fails_the_wait() {
        use std::io::Write;
        use std::net::TcpStream;

        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();

        let browser = std::thread::spawn(move || {
            let mut redirect = TcpStream::connect(addr).unwrap();
            redirect
                .write_all(b"GET /?error=access_denied HTTP/1.1\r\n\r\n")
                .unwrap();
        });

        let result = wait_for_redirect(&listener, addr.port());
        assert!(matches!(result, Err(AuthError::MissingCode)));
        browser.join().unwrap();
    }

    #[test]
    fn parses_google_style_client_secrets() {
        // Extra fields like redirect_uris must not break parsing.
        let json = r#"{
            "installed": {
                "client_id": "abc.apps.googleusercontent.com",
                "client_secret": "shh",
                "project_id": "demo",
                "redirect_uris": ["http://localhost"]
            }
        }"#;
        let secrets: ClientSecrets = serde_json::from_str(json).unwrap();
        assert_eq!(secrets.installed.client_id, "abc.apps.googleusercontent.com");
        assert_eq!(secrets.installed.redirect_port, 8080);
    }

    #[test]
    fn token_cache_round_trips_through_json() {
        let token = CachedToken {
            access_token: "ya29.token".to_string(),
            expires_at: 1_900_000_000,
        };
        let json = serde_json::to_string(&token).unwrap();
        let restored: CachedToken = serde_json::from_str(&json).unwrap();
        assert_eq!(restored.access_token, token.access_token);
        assert_eq!(restored.expires_at, token.expires_at);
    }

    #[test]
    fn expiry_check_honors_the_slack_window() {
        let now = Utc::now().timestamp();
        let fresh = CachedToken {
            access_token: "t".into(),
            expires_at: now + 3600,
        };
        let stale = CachedToken {
            access_token: "t".into(),
            expires_at: now + EXPIRY_SLACK_SECS / 2,
        };
        assert!(!fresh.is_expired());
        assert!(stale.is_expired());
    }

    #[test]
    fn consent_url_carries_the_client_and_scope() {
        let app = InstalledApp {
            client_id: "abc".into(),
            client_secret: "shh".into(),
            redirect_port: 8080,
        };
        let url = consent_url(&app, "http://127.0.0.1:8080");
        assert_eq!(url.host_str(), Some("accounts.google.com"));
        let query = url.query().unwrap();
        assert!(query.contains("client_id=abc"));
        assert!(query.contains("response_type=code"));
        // The scope must be percent-encoded, not passed through raw.
        assert!(query.contains("scope=https%3A%2F%2Fwww.googleapis.com%2Fauth%2Fdrive"));
    }
}
