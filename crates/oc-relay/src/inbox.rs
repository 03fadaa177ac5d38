//! Destination drop box, the last hop of a route.
//!
//! Every accepted upload is written to its own file under one directory.
//! Uploads named `message.txt` come out of a relay and are saved under a
//! random `m<hex>` name. Client-supplied names are reduced to a bare file
//! name before use.

use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use axum::{
    extract::{
        multipart::{MultipartError, MultipartRejection}, DefaultBodyLimit, Multipart,
        State,
    },
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Router,
};
use oc_crypto::utils::passwords_match;
use serde::{Deserialize, Serialize};
use tokio::io::AsyncWriteExt;
use tokio::net::TcpListener;
use tokio::sync::watch;
use tower::ServiceBuilder;
use tower_http::trace::{DefaultMakeSpan, TraceLayer};
use tracing::{error, info, warn, Level};

use crate::config::{parse_size, ConfigError};
use crate::forwarder::{FORWARD_FILE_NAME, PASSWORD_HEADER, USERNAME_HEADER};
use crate::server::{shutdown_signal, MULTIPART_OVERHEAD};

pub const DEFAULT_MAX_UPLOAD_BYTES: usize = 16 * 1024 * 1024;

/// Fresh names tried when the chosen one is already taken.
const NAME_ATTEMPTS: usize = 8;

const MAX_NAME_CHARS: usize = 128;

#[derive(Debug, thiserror::Error)]
pub enum InboxError {
    #[error("not a directory: {0}")]
    NotADirectory(PathBuf),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("random name generation failed: {0}")]
    Rng(String),
    #[error("no free file name after {0} attempts")]
    NamesExhausted(usize),
}

/// Drop box configuration, layered like [`crate::RelayConfig`] under the
/// `OC_INBOX_*` prefix.
#[derive(Clone, Serialize, Deserialize)]
pub struct InboxConfig {
    pub listen_addr: SocketAddr,
    pub dir: PathBuf,
    pub password: String,
    pub max_upload_bytes: usize,
}

impl Default for InboxConfig {
    fn default() -> Self {
        Self {
            listen_addr: SocketAddr::from(([127, 0, 0, 1], 8080)),
            dir: PathBuf::new(),
            password: String::new(),
            max_upload_bytes: DEFAULT_MAX_UPLOAD_BYTES,
        }
    }
}

impl std::fmt::Debug for InboxConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InboxConfig")
            .field("listen_addr", &self.listen_addr)
            .field("dir", &self.dir)
            .field("password", &"[REDACTED]")
            .field("max_upload_bytes", &self.max_upload_bytes)
            .finish()
    }
}

impl InboxConfig {
    pub fn load() -> Result<Self, ConfigError> {
        let args: Vec<String> = std::env::args().collect();
        Self::load_from(&args, |key| std::env::var(key).ok())
    }

    pub fn load_from<F>(args: &[String], env: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();

        if let Some(addr) = env("OC_INBOX_LISTEN_ADDR") {
            config.listen_addr = addr
                .parse()
                .map_err(|e| ConfigError::Invalid(format!("Invalid listen_addr: {}", e)))?;
        }
        if let Some(dir) = env("OC_INBOX_DIR") {
            config.dir = PathBuf::from(dir);
        }
        if let Some(password) = env("OC_INBOX_PASSWORD") {
            config.password = password;
        }
        if let Some(max) = env("OC_INBOX_MAX_UPLOAD") {
            config.max_upload_bytes = parse_size(&max)?;
        }

        let mut config_path = env("OC_INBOX_CONFIG");
        if let Some(path) = config.load_from_args(args)? {
            config_path = Some(path);
        }

        if let Some(path) = config_path {
            let content = std::fs::read_to_string(path)?;
            config.apply_toml(&content)?;
        }

        config.validate()?;
        Ok(config)
    }

    /// Returns the `--config` path, if any.
    fn load_from_args(&mut self, args: &[String]) -> Result<Option<String>, ConfigError> {
        fn value<'a>(args: &'a [String], i: usize, flag: &str) -> Result<&'a str, ConfigError> {
            args.get(i + 1)
                .map(String::as_str)
                .ok_or_else(|| ConfigError::Invalid(format!("{} requires a value", flag)))
        }

        let mut config_path = None;
        let mut i = 1;
        while i < args.len() {
            match args[i].as_str() {
                "--listen-addr" | "-l" => {
                    self.listen_addr = value(args, i, "--listen-addr")?
                        .parse()
                        .map_err(|e| ConfigError::Invalid(format!("Invalid listen_addr: {}", e)))?;
                    i += 2;
                }
                "--dir" | "-d" => {
                    self.dir = PathBuf::from(value(args, i, "--dir")?);
                    i += 2;
                }
                "--password" | "-p" => {
                    self.password = value(args, i, "--password")?.to_string();
                    i += 2;
                }
                "--max-upload" => {
                    self.max_upload_bytes = parse_size(value(args, i, "--max-upload")?)?;
                    i += 2;
                }
                "--config" | "-f" => {
                    config_path = Some(value(args, i, "--config")?.to_string());
                    i += 2;
                }
                _ => {
                    i += 1;
                }
            }
        }
        Ok(config_path)
    }

    fn apply_toml(&mut self, content: &str) -> Result<(), ConfigError> {
        let toml_config: toml::Value = toml::from_str(content)?;

        if let Some(addr) = toml_config.get("listen_addr").and_then(|v| v.as_str()) {
            self.listen_addr = addr
                .parse()
                .map_err(|e| ConfigError::Invalid(format!("Invalid listen_addr in TOML: {}", e)))?;
        }
        if let Some(dir) = toml_config.get("dir").and_then(|v| v.as_str()) {
            self.dir = PathBuf::from(dir);
        }
        if let Some(password) = toml_config.get("password").and_then(|v| v.as_str()) {
            self.password = password.to_string();
        }
        if let Some(max) = toml_config.get("max_upload_bytes").and_then(|v| v.as_integer()) {
            self.max_upload_bytes = usize::try_from(max).map_err(|_| {
                ConfigError::Invalid(format!("Invalid max_upload_bytes in TOML: {}", max))
            })?;
        }
        Ok(())
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.password.is_empty() {
            return Err(ConfigError::Invalid("password must be set".to_string()));
        }
        if self.dir.as_os_str().is_empty() {
            return Err(ConfigError::Invalid("storage directory must be set".to_string()));
        }
        if self.max_upload_bytes == 0 {
            return Err(ConfigError::Invalid("max_upload_bytes must be > 0".to_string()));
        }
        Ok(())
    }
}

/// Where an upload ended up.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Receipt {
    pub stored_as: String,
    /// The stored name differs from the one the caller sent.
    pub renamed: bool,
}

impl Receipt {
    /// Reply text for the uploader.
    pub fn message(&self) -> String {
        if self.renamed {
            format!("File received and saved as {}!", self.stored_as)
        } else {
            format!("File {} received!", self.stored_as)
        }
    }
}

pub struct Inbox {
    dir: PathBuf,
    password: String,
}

impl Inbox {
    pub fn open(dir: impl Into<PathBuf>, password: impl Into<String>) -> Result<Self, InboxError> {
        let dir = dir.into();
        if !dir.is_dir() {
            return Err(InboxError::NotADirectory(dir));
        }
        Ok(Self {
            dir,
            password: password.into(),
        })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn authenticate(&self, supplied: Option<&str>) -> bool {
        passwords_match(supplied, &self.password)
    }

    /// Write `contents` to a new file. Existing files are never replaced.
    pub async fn store(
        &self,
        file_name: Option<&str>,
        username: Option<&str>,
        contents: &[u8],
    ) -> Result<Receipt, InboxError> {
        let mut name = match file_name.and_then(sanitize_file_name) {
            Some(name) if name != FORWARD_FILE_NAME => name,
            _ => random_name()?,
        };

        for _ in 0..NAME_ATTEMPTS {
            match write_new(&self.dir.join(&name), contents).await {
                Ok(()) => {
                    info!(
                        file = %name,
                        from = username.unwrap_or("Anonymous"),
                        bytes = contents.len(),
                        "File received"
                    );
                    return Ok(Receipt {
                        renamed: file_name != Some(name.as_str()),
                        stored_as: name,
                    });
                }
                Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => {
                    name = random_name()?;
                }
                Err(e) => return Err(e.into()),
            }
        }
        Err(InboxError::NamesExhausted(NAME_ATTEMPTS))
    }
}

async fn write_new(path: &Path, contents: &[u8]) -> std::io::Result<()> {
    let mut file = tokio::fs::OpenOptions::new()
        .write(true)
        .create_new(true)
        .open(path)
        .await?;
    file.write_all(contents).await?;
    file.flush().await
}

/// Reduce a client-supplied name to a plain file name inside the directory.
///
/// Directory parts (either separator), control characters and leading dots
/// are dropped. Returns `None` when nothing usable is left.
pub fn sanitize_file_name(name: &str) -> Option<String> {
    let base = name.rsplit(|c| c == '/' || c == '\\').next().unwrap_or("");
    let cleaned: String = base
        .chars()
        .filter(|c| !c.is_control())
        .take(MAX_NAME_CHARS)
        .collect();
    let cleaned = cleaned.trim().trim_start_matches('.');
    if cleaned.is_empty() {
        None
    } else {
        Some(cleaned.to_string())
    }
}

/// `m` followed by seven hex digits.
fn random_name() -> Result<String, InboxError> {
    let mut bytes = [0u8; 4];
    getrandom::getrandom(&mut bytes).map_err(|e| InboxError::Rng(e.to_string()))?;
    let hex: String = bytes.iter().map(|b| format!("{b:02x}")).collect();
    Ok(format!("m{}", &hex[..7]))
}

/// Routes for a drop box.
pub fn router(inbox: Arc<Inbox>, max_upload_bytes: usize) -> Router {
    Router::new()
        .route("/upload", post(upload_handler))
        .route("/health", get(|| async { StatusCode::OK }))
        .layer(DefaultBodyLimit::max(
            max_upload_bytes.saturating_add(MULTIPART_OVERHEAD),
        ))
        .with_state(inbox)
        .layer(
            ServiceBuilder::new().layer(
                TraceLayer::new_for_http().make_span_with(DefaultMakeSpan::new().level(Level::DEBUG)),
            ),
        )
}

async fn upload_handler(
    State(inbox): State<Arc<Inbox>>,
    headers: HeaderMap,
    multipart: Result<Multipart, MultipartRejection>,
) -> Response {
    let password = headers.get(PASSWORD_HEADER).and_then(|v| v.to_str().ok());
    if !inbox.authenticate(password) {
        warn!("Upload rejected: invalid password");
        return (StatusCode::UNAUTHORIZED, "Invalid password").into_response();
    }
    let username = headers
        .get(USERNAME_HEADER)
        .and_then(|v| v.to_str().ok())
        .filter(|v| !v.is_empty());

    let Ok(mut multipart) = multipart else {
        return (StatusCode::BAD_REQUEST, "Error retrieving the file").into_response();
    };
    let (file_name, contents) = match read_file_field(&mut multipart).await {
        Ok(Some(upload)) => upload,
        Ok(None) => return (StatusCode::BAD_REQUEST, "Error retrieving the file").into_response(),
        Err(e) if e.status() == StatusCode::PAYLOAD_TOO_LARGE => {
            return (StatusCode::PAYLOAD_TOO_LARGE, "Payload too large").into_response();
        }
        Err(_) => return (StatusCode::BAD_REQUEST, "Error retrieving the file").into_response(),
    };

    match inbox.store(file_name.as_deref(), username, &contents).await {
        Ok(receipt) => (StatusCode::OK, receipt.message()).into_response(),
        Err(e) => {
            error!("Failed to store upload: {}", e);
            (StatusCode::INTERNAL_SERVER_ERROR, "Error saving the file").into_response()
        }
    }
}

async fn read_file_field(
    multipart: &mut Multipart,
) -> Result<Option<(Option<String>, Vec<u8>)>, MultipartError> {
    while let Some(field) = multipart.next_field().await? {
        if field.name() == Some("file") {
            let file_name = field.file_name().map(String::from);
            return Ok(Some((file_name, field.bytes().await?.to_vec())));
        }
    }
    Ok(None)
}

/// Drop box HTTP server
pub struct InboxServer {
    config: InboxConfig,
    inbox: Arc<Inbox>,
    shutdown_tx: watch::Sender<bool>,
}

impl InboxServer {
    pub fn new(config: InboxConfig) -> Result<Self> {
        let inbox = Inbox::open(&config.dir, config.password.clone())
            .with_context(|| format!("Failed to open storage directory {:?}", config.dir))?;
        let (shutdown_tx, _) = watch::channel(false);
        Ok(Self {
            config,
            inbox: Arc::new(inbox),
            shutdown_tx,
        })
    }

    pub fn inbox(&self) -> &Arc<Inbox> {
        &self.inbox
    }

    pub fn router(&self) -> Router {
        router(self.inbox.clone(), self.config.max_upload_bytes)
    }

    pub fn shutdown(&self) {
        let _ = self.shutdown_tx.send(true);
    }

    pub async fn run(&self) -> Result<()> {
        let listener = TcpListener::bind(self.config.listen_addr)
            .await
            .with_context(|| format!("Failed to bind {}", self.config.listen_addr))?;
        self.serve(listener).await
    }

    pub async fn serve(&self, listener: TcpListener) -> Result<()> {
        info!(
            addr = %listener.local_addr()?,
            dir = %self.inbox.dir().display(),
            "Inbox listening"
        );

        axum::serve(listener, self.router())
            .with_graceful_shutdown(shutdown_signal(self.shutdown_tx.subscribe()))
            .await?;

        info!("Inbox stopped");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn args(list: &[&str]) -> Vec<String> {
        std::iter::once("oc-inbox")
            .chain(list.iter().copied())
            .map(String::from)
            .collect()
    }

    #[test]
    fn test_sanitize_file_name() {
        assert_eq!(sanitize_file_name("notes.txt").as_deref(), Some("notes.txt"));
        assert_eq!(sanitize_file_name("../../etc/passwd").as_deref(), Some("passwd"));
        assert_eq!(sanitize_file_name("..\\..\\boot.ini").as_deref(), Some("boot.ini"));
        assert_eq!(sanitize_file_name("/abs/path/x.bin").as_deref(), Some("x.bin"));
        assert_eq!(sanitize_file_name(".bashrc").as_deref(), Some("bashrc"));
        assert_eq!(sanitize_file_name("a\0b\nc").as_deref(), Some("abc"));
        assert_eq!(sanitize_file_name(".."), None);
        assert_eq!(sanitize_file_name("dir/"), None);
        assert_eq!(sanitize_file_name(""), None);
    }

    #[test]
    fn test_random_name_shape() {
        let name = random_name().unwrap();
        assert_eq!(name.len(), 8);
        assert!(name.starts_with('m'));
        assert!(name[1..].chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn test_receipt_message() {
        let renamed = Receipt {
            stored_as: "m0a1b2c3".into(),
            renamed: true,
        };
        assert_eq!(renamed.message(), "File received and saved as m0a1b2c3!");
        let kept = Receipt {
            stored_as: "notes.txt".into(),
            renamed: false,
        };
        assert_eq!(kept.message(), "File notes.txt received!");
    }

    #[tokio::test]
    async fn test_store_relayed_message_gets_random_name() {
        let dir = tempfile::tempdir().unwrap();
        let inbox = Inbox::open(dir.path(), "pw").unwrap();

        let receipt = inbox.store(Some("message.txt"), None, b"hello").await.unwrap();
        assert!(receipt.renamed);
        assert!(receipt.stored_as.starts_with('m'));
        assert_eq!(std::fs::read(dir.path().join(&receipt.stored_as)).unwrap(), b"hello");
        assert!(!dir.path().join("message.txt").exists());
    }

    #[tokio::test]
    async fn test_store_stays_inside_directory() {
        let root = tempfile::tempdir().unwrap();
        let dir = root.path().join("inbox");
        std::fs::create_dir(&dir).unwrap();
        let inbox = Inbox::open(&dir, "pw").unwrap();

        let receipt = inbox
            .store(Some("../escaped.txt"), Some("alice"), b"x")
            .await
            .unwrap();
        assert_eq!(receipt.stored_as, "escaped.txt");
        assert!(receipt.renamed);
        assert!(dir.join("escaped.txt").exists());
        assert!(!root.path().join("escaped.txt").exists());
    }

    #[tokio::test]
    async fn test_store_never_overwrites() {
        let dir = tempfile::tempdir().unwrap();
        let inbox = Inbox::open(dir.path(), "pw").unwrap();

        let first = inbox.store(Some("notes.txt"), None, b"one").await.unwrap();
        assert_eq!(first.stored_as, "notes.txt");
        assert!(!first.renamed);

        let second = inbox.store(Some("notes.txt"), None, b"two").await.unwrap();
        assert_ne!(second.stored_as, "notes.txt");
        assert!(second.renamed);
        assert_eq!(std::fs::read(dir.path().join("notes.txt")).unwrap(), b"one");
        assert_eq!(std::fs::read(dir.path().join(&second.stored_as)).unwrap(), b"two");
    }

    #[test]
    fn test_open_requires_directory() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("file");
        std::fs::write(&file, b"").unwrap();
        assert!(matches!(Inbox::open(&file, "pw"), Err(InboxError::NotADirectory(_))));
    }

    #[test]
    fn test_authenticate() {
        let dir = tempfile::tempdir().unwrap();
        let inbox = Inbox::open(dir.path(), "pw").unwrap();
        assert!(inbox.authenticate(Some("pw")));
        assert!(!inbox.authenticate(Some("nope")));
        assert!(!inbox.authenticate(None));
    }

    #[test]
    fn test_config_layering() {
        let env: HashMap<&str, &str> = [
            ("OC_INBOX_DIR", "/srv/env"),
            ("OC_INBOX_PASSWORD", "env-pw"),
        ]
        .into_iter()
        .collect();
        let config = InboxConfig::load_from(
            &args(&["-d", "/srv/args", "--max-upload", "1024"]),
            |k| env.get(k).map(|v| v.to_string()),
        )
        .unwrap();
        assert_eq!(config.dir, PathBuf::from("/srv/args"));
        assert_eq!(config.password, "env-pw");
        assert_eq!(config.max_upload_bytes, 1024);
        assert_eq!(config.listen_addr, SocketAddr::from(([127, 0, 0, 1], 8080)));
    }

    #[test]
    fn test_config_validation() {
        let no_env = |_: &str| None;
        assert!(InboxConfig::load_from(&args(&["-p", "pw"]), no_env).is_err());
        assert!(InboxConfig::load_from(&args(&["-d", "/srv"]), no_env).is_err());
        assert!(
            InboxConfig::load_from(&args(&["-d", "/srv", "-p", "pw", "--max-upload", "0"]), no_env)
                .is_err()
        );
        assert!(InboxConfig::load_from(&args(&["-d", "/srv", "-p"]), no_env).is_err());
    }

    #[test]
    fn test_debug_redacts_password() {
        let config = InboxConfig {
            password: "hunter2".into(),
            ..Default::default()
        };
        assert!(!format!("{config:?}").contains("hunter2"));
    }
}
