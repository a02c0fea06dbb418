//! Flat-file credential store
//!
//! # Format
//!
//! One `username:password` record per line. Empty lines and lines starting
//! with `#` or `;` are comments; lines without `:` are skipped. Both halves
//! are trimmed of spaces and tabs. The file is scanned on every lookup and
//! the first matching record wins.
//!
//! ## Security Note
//!
//! Passwords are stored in plain text because the handshake needs the
//! secret itself to compute the expected digest.

use std::fmt;
use std::path::PathBuf;
use tokio::fs::File;
use tokio::io::{AsyncBufReadExt, BufReader};

/// Password of a credential record
#[derive(Clone, PartialEq, Eq)]
pub struct Secret(Vec<u8>);

impl Secret {
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }
}

impl fmt::Debug for Secret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Secret(..)")
    }
}

/// Lookup of secrets by username
pub struct CredentialStore {
    path: PathBuf,
}

impl CredentialStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Find the secret for `username` (exact byte match)
    ///
    /// An unreadable file is reported on the operator log and treated as
    /// "not found".
    pub async fn find_secret(&self, username: &[u8]) -> Option<Secret> {
        let file = match File::open(&self.path).await {
            Ok(file) => file,
            Err(e) => {
                tracing::error!("Cannot open credential file {}: {}", self.path.display(), e);
                return None;
            }
        };

        let mut lines = BufReader::new(file).split(b'\n');
        loop {
            match lines.next_segment().await {
                Ok(Some(line)) => {
                    if let Some((user, secret)) = parse_record(&line) {
                        if user == username {
                            return Some(Secret(secret.to_vec()));
                        }
                    }
                }
                Ok(None) => return None,
                Err(e) => {
                    tracing::error!("Failed to read credential file {}: {}", self.path.display(), e);
                    return None;
                }
            }
        }
    }
}

/// Split a line into trimmed `(username, secret)`, or `None` for comments,
/// blank lines and lines without a separator
fn parse_record(line: &[u8]) -> Option<(&[u8], &[u8])> {
    let line = line.strip_suffix(b"\r").unwrap_or(line);
    match line.first() {
        None | Some(b'#') | Some(b';') => return None,
        _ => {}
    }
    let sep = line.iter().position(|&b| b == b':')?;
    Some((trim_blanks(&line[..sep]), trim_blanks(&line[sep + 1..])))
}

fn trim_blanks(bytes: &[u8]) -> &[u8] {
    let is_blank = |b: &u8| *b == b' ' || *b == b'\t';
    let start = bytes.iter().position(|b| !is_blank(b)).unwrap_or(bytes.len());
    let end = bytes.iter().rposition(|b| !is_blank(b)).map_or(start, |i| i + 1);
    &bytes[start..end]
}
