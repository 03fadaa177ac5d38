//! Routing header carried at the top of every decrypted layer.
//!
//! ```text
//! X-OC-To: <next-hop address> <hop password>
//! ```

use std::fmt;

pub const HEADER_TAG: &str = "X-OC-To:";

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum HeaderError {
    #[error("message has no routing header")]
    NoHeader,
    #[error("invalid routing header")]
    InvalidHeader,
}

/// Where the current hop sends the rest of the message, and the password
/// the next hop expects.
#[derive(Clone, PartialEq, Eq)]
pub struct HopHeader {
    pub address: String,
    pub password: String,
}

impl HopHeader {
    pub fn new(address: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            address: address.into(),
            password: password.into(),
        }
    }

    /// Parse the first of `lines`.
    ///
    /// The line is split on single spaces into at most three tokens. The
    /// address is taken verbatim; the password is trimmed (so a trailing CR
    /// or space does not leak into it) and must not be empty.
    pub fn parse<S: AsRef<str>>(lines: &[S]) -> Result<Self, HeaderError> {
        let line = lines.first().ok_or(HeaderError::NoHeader)?.as_ref();

        let mut tokens = line.splitn(3, ' ');
        let tag = tokens.next().ok_or(HeaderError::InvalidHeader)?;
        let address = tokens.next().ok_or(HeaderError::InvalidHeader)?;
        let password = tokens.next().ok_or(HeaderError::InvalidHeader)?.trim();

        if tag != HEADER_TAG || address.is_empty() || password.is_empty() {
            return Err(HeaderError::InvalidHeader);
        }

        Ok(Self::new(address, password))
    }

    /// Single header line, without a line terminator.
    pub fn serialize(&self) -> String {
        format!("{} {} {}", HEADER_TAG, self.address, self.password)
    }
}

// Keeps hop addresses and passwords out of logs.
impl fmt::Debug for HopHeader {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("HopHeader { .. }")
    }
}
