//! Header/body split and removal of the consumed routing header.
//!
//! A decrypted layer looks like a mail message: header lines, one blank line,
//! then the body. The body is opaque to the relay; it is either the next
//! layer's ciphertext or the final plaintext.

use crate::header::{HeaderError, HopHeader};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LineEnding {
    Lf,
    CrLf,
}

impl LineEnding {
    /// Terminator of the first line of `text`. LF when the text has no
    /// line break at all.
    pub fn detect(text: &str) -> Self {
        match text.find('\n') {
            Some(i) if text[..i].ends_with('\r') => LineEnding::CrLf,
            _ => LineEnding::Lf,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            LineEnding::Lf => "\n",
            LineEnding::CrLf => "\r\n",
        }
    }
}

/// One decrypted layer, split into its parts.
#[derive(Clone, PartialEq, Eq)]
pub struct RelayMessage {
    /// Header lines without terminators, in order.
    pub header_lines: Vec<String>,
    /// Each header line's own terminator. `None` for a final line that ends
    /// the input without one.
    pub line_endings: Vec<Option<LineEnding>>,
    /// The blank separator line as received, terminator included. Empty when
    /// the input had no blank line.
    pub separator: String,
    /// Everything after the blank separator line, verbatim.
    pub body: String,
    /// Terminator of the first header line, used where the input had none.
    pub line_ending: LineEnding,
}

impl std::fmt::Debug for RelayMessage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RelayMessage")
            .field("header_lines", &self.header_lines.len())
            .field("body_len", &self.body.len())
            .field("line_ending", &self.line_ending)
            .finish()
    }
}

impl RelayMessage {
    /// Parse the routing header from the first header line.
    pub fn hop_header(&self) -> Result<HopHeader, HeaderError> {
        HopHeader::parse(&self.header_lines)
    }

    /// Drop the first header line and reassemble.
    ///
    /// Remaining header lines and the separator are written back exactly as
    /// received, followed by the body. When nothing remains the output is
    /// the body alone.
    pub fn strip(&self) -> String {
        if self.header_lines.len() <= 1 {
            return self.body.clone();
        }

        let fallback = self.line_ending.as_str();
        let mut out = String::with_capacity(self.body.len() + 256);
        for (line, ending) in self.header_lines.iter().zip(&self.line_endings).skip(1) {
            out.push_str(line);
            out.push_str(ending.map_or(fallback, |e| e.as_str()));
        }
        if self.separator.is_empty() {
            out.push_str(fallback);
        } else {
            out.push_str(&self.separator);
        }
        out.push_str(&self.body);
        out
    }
}

/// Split a decrypted layer into headers and body.
///
/// Leading blank lines are skipped. Header lines run up to the first blank
/// (whitespace-only) line. Without a blank line every line is a header and
/// the body is empty.
pub fn split(plaintext: &str) -> RelayMessage {
    let mut header_lines = Vec::new();
    let mut line_endings = Vec::new();
    let mut separator = String::new();
    let mut body = String::new();
    let mut offset = 0;

    for raw in plaintext.split_inclusive('\n') {
        offset += raw.len();
        let (line, ending) = match raw.strip_suffix('\n') {
            Some(l) => match l.strip_suffix('\r') {
                Some(l) => (l, Some(LineEnding::CrLf)),
                None => (l, Some(LineEnding::Lf)),
            },
            None => (raw, None),
        };

        if line.trim().is_empty() {
            if header_lines.is_empty() {
                continue;
            }
            separator = raw.to_string();
            body = plaintext[offset..].to_string();
            break;
        }
        header_lines.push(line.to_string());
        line_endings.push(ending);
    }

    let line_ending = line_endings
        .first()
        .copied()
        .flatten()
        .unwrap_or(LineEnding::Lf);

    RelayMessage {
        header_lines,
        line_endings,
        separator,
        body,
        line_ending,
    }
}

/// Split `plaintext`, read the routing header and strip it.
///
/// Returns the next hop and the bytes to forward to it.
pub fn peel(plaintext: &str) -> Result<(HopHeader, String), HeaderError> {
    let message = split(plaintext);
    let header = message.hop_header()?;
    Ok((header, message.strip()))
}
