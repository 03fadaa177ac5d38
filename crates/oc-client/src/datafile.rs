//! Route files.
//!
//! One hop per line, first hop first:
//!
//! ```text
//! # entry relay, sealed to its key
//! abcdefghijklmnop.onion hunter2 relay1_public.pem
//! # final upload server
//! qrstuvwxyz234567.onion:8080 s3cret
//! ```
//!
//! Fields are separated by whitespace. The third field, when present, is the
//! hop's public key file. Blank lines and lines starting with `#` are
//! skipped, and so are lines with the wrong number of fields.

use std::path::{Path, PathBuf};

use tracing::debug;

#[derive(Debug, thiserror::Error)]
pub enum DataFileError {
    #[error("failed to read data file: {0}")]
    Io(#[from] std::io::Error),
    #[error("no valid entries found in data file")]
    Empty,
}

#[derive(Clone, PartialEq, Eq)]
pub struct RouteEntry {
    pub address: String,
    pub password: String,
    pub public_key_path: Option<PathBuf>,
}

impl std::fmt::Debug for RouteEntry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RouteEntry")
            .field("public_key_path", &self.public_key_path)
            .finish_non_exhaustive()
    }
}

pub fn parse_route(text: &str) -> Result<Vec<RouteEntry>, DataFileError> {
    let mut entries = Vec::new();
    for (number, line) in text.lines().enumerate() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }

        let fields: Vec<&str> = line.split_whitespace().collect();
        let entry = match fields.as_slice() {
            [address, password] => RouteEntry {
                address: address.to_string(),
                password: password.to_string(),
                public_key_path: None,
            },
            [address, password, key] => RouteEntry {
                address: address.to_string(),
                password: password.to_string(),
                public_key_path: Some(PathBuf::from(key)),
            },
            _ => {
                debug!(line = number + 1, "Skipping malformed data file line");
                continue;
            }
        };
        entries.push(entry);
    }

    if entries.is_empty() {
        return Err(DataFileError::Empty);
    }
    Ok(entries)
}

/// Read a route file. Relative key paths are resolved against the file's
/// directory.
pub fn read_route(path: impl AsRef<Path>) -> Result<Vec<RouteEntry>, DataFileError> {
    let path = path.as_ref();
    let text = std::fs::read_to_string(path)?;
    let mut entries = parse_route(&text)?;

    if let Some(dir) = path.parent() {
        for entry in &mut entries {
            if let Some(key) = &entry.public_key_path {
                if key.is_relative() {
                    entry.public_key_path = Some(dir.join(key));
                }
            }
        }
    }
    Ok(entries)
}
