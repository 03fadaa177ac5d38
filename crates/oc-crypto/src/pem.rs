//! PEM key files.
//!
//! Two block types are used:
//!
//! - `PUBLIC KEY`: the 32 raw Ed25519 public key bytes
//! - `PRIVATE KEY`: 64 bytes, `seed ‖ public`. A bare 32-byte seed is also
//!   accepted on load.
//!
//! The payload is the raw key, not a DER structure. Private key files are
//! created with mode 0600 on Unix.

use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::Path;

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use zeroize::Zeroizing;

use crate::keys::{KeyError, Keypair, SigningPublicKey};

pub const PUBLIC_KEY_LABEL: &str = "PUBLIC KEY";
pub const PRIVATE_KEY_LABEL: &str = "PRIVATE KEY";

#[derive(Debug, thiserror::Error)]
pub enum PemError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("no PEM block found")]
    NoBlock,
    #[error("expected PEM block {expected:?}, found {found:?}")]
    WrongLabel { expected: String, found: String },
    #[error("PEM body is not valid base64")]
    Encoding(#[from] base64::DecodeError),
    #[error("key error: {0}")]
    Key(#[from] KeyError),
}

/// Render a PEM block with 64-column body lines.
pub fn encode(label: &str, data: &[u8]) -> String {
    let body = STANDARD.encode(data);
    let mut out = format!("-----BEGIN {label}-----\n");
    let mut rest = body.as_str();
    while !rest.is_empty() {
        let (line, tail) = rest.split_at(rest.len().min(64));
        out.push_str(line);
        out.push('\n');
        rest = tail;
    }
    out.push_str(&format!("-----END {label}-----\n"));
    out
}

/// Decode the first PEM block in `text`, returning its label and payload.
///
/// Text before the BEGIN line is ignored.
pub fn decode(text: &str) -> Result<(String, Zeroizing<Vec<u8>>), PemError> {
    let mut lines = text.lines().map(str::trim);

    let label = lines
        .by_ref()
        .find_map(|line| {
            line.strip_prefix("-----BEGIN ")
                .and_then(|rest| rest.strip_suffix("-----"))
        })
        .ok_or(PemError::NoBlock)?
        .to_string();

    let end = format!("-----END {label}-----");
    let mut body = Zeroizing::new(String::new());
    let mut terminated = false;
    for line in lines {
        if line == end {
            terminated = true;
            break;
        }
        // Headers such as "Proc-Type:" are not part of the payload.
        if line.contains(':') {
            continue;
        }
        body.push_str(line);
    }
    if !terminated {
        return Err(PemError::NoBlock);
    }

    let bytes = Zeroizing::new(STANDARD.decode(body.as_bytes())?);
    Ok((label, bytes))
}

fn decode_expecting(text: &str, expected: &str) -> Result<Zeroizing<Vec<u8>>, PemError> {
    let (label, bytes) = decode(text)?;
    if label != expected {
        return Err(PemError::WrongLabel {
            expected: expected.to_string(),
            found: label,
        });
    }
    Ok(bytes)
}

pub fn public_key_from_pem(text: &str) -> Result<SigningPublicKey, PemError> {
    let bytes = decode_expecting(text, PUBLIC_KEY_LABEL)?;
    Ok(SigningPublicKey::from_slice(&bytes)?)
}

pub fn keypair_from_pem(text: &str) -> Result<Keypair, PemError> {
    let bytes = decode_expecting(text, PRIVATE_KEY_LABEL)?;
    Ok(Keypair::from_secret_bytes(&bytes)?)
}

pub fn public_key_to_pem(public: &SigningPublicKey) -> String {
    encode(PUBLIC_KEY_LABEL, public.as_bytes())
}

pub fn keypair_to_pem(keypair: &Keypair) -> Zeroizing<String> {
    Zeroizing::new(encode(PRIVATE_KEY_LABEL, keypair.to_keypair_bytes().expose()))
}

pub fn load_public_key(path: impl AsRef<Path>) -> Result<SigningPublicKey, PemError> {
    let text = fs::read_to_string(path)?;
    public_key_from_pem(&text)
}

pub fn load_keypair(path: impl AsRef<Path>) -> Result<Keypair, PemError> {
    let text = Zeroizing::new(fs::read_to_string(path)?);
    keypair_from_pem(&text)
}

pub fn save_public_key(path: impl AsRef<Path>, public: &SigningPublicKey) -> Result<(), PemError> {
    write_file(path.as_ref(), public_key_to_pem(public).as_bytes(), 0o644)
}

pub fn save_keypair(path: impl AsRef<Path>, keypair: &Keypair) -> Result<(), PemError> {
    write_file(path.as_ref(), keypair_to_pem(keypair).as_bytes(), 0o600)
}

fn write_file(path: &Path, contents: &[u8], mode: u32) -> Result<(), PemError> {
    let mut options = OpenOptions::new();
    options.write(true).create(true).truncate(true);
    #[cfg(unix)]
    {
        use std::os::unix::fs::OpenOptionsExt;
        options.mode(mode);
    }
    #[cfg(not(unix))]
    let _ = mode;

    let mut file = options.open(path)?;
    file.write_all(contents)?;
    file.flush()?;
    Ok(())
}
