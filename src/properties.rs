//! Ordered string properties and the `key=value` file format.
//!
//! The loader follows the classic properties grammar used by the system
//! crypto-policies back-ends: `#`/`!` comments, `=`, `:` or whitespace as
//! the key/value separator, backslash line continuation and the usual
//! escapes (`\t`, `\n`, `\r`, `\f`, `\uXXXX`). Files are decoded as
//! ISO-8859-1, one byte per character.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde::Serialize;
use thiserror::Error;

/// Errors raised while loading a properties file.
#[derive(Debug, Error)]
pub enum PropertiesError {
    /// The file could not be read.
    #[error("failed to read properties file {}: {source}", path.display())]
    Read {
        /// File path.
        path: PathBuf,
        /// Underlying I/O error.
        source: std::io::Error,
    },

    /// A `\u` escape was not followed by four hex digits.
    #[error("malformed \\uXXXX escape on line {line}")]
    MalformedUnicodeEscape {
        /// 1-based physical line where the logical line starts.
        line: usize,
    },
}

/// Ordered mapping of property names to values.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct Properties {
    entries: BTreeMap<String, String>,
}

impl Properties {
    /// Create an empty property set.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the value for `key`, if present.
    pub fn get(&self, key: &str) -> Option<&str> {
        self.entries.get(key).map(String::as_str)
    }

    /// Returns `true` when `key` is present.
    pub fn contains_key(&self, key: &str) -> bool {
        self.entries.contains_key(key)
    }

    /// Insert or replace a value, returning the previous one.
    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<String>) -> Option<String> {
        self.entries.insert(key.into(), value.into())
    }

    /// Remove a key, returning its value.
    pub fn remove(&mut self, key: &str) -> Option<String> {
        self.entries.remove(key)
    }

    /// Keep only the entries for which `keep` returns `true`.
    pub fn retain(&mut self, mut keep: impl FnMut(&str, &str) -> bool) {
        self.entries.retain(|k, v| keep(k, v));
    }

    /// Iterate over entries in key order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    /// Iterate over keys in order.
    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.entries.keys().map(String::as_str)
    }

    /// Number of entries.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns `true` when there are no entries.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Merge the entries of a properties file into this set.
    ///
    /// Later entries overwrite earlier ones, including entries already
    /// present in `self`. Returns the number of entries read.
    ///
    /// # Errors
    ///
    /// Returns an error when the file cannot be read or contains a malformed
    /// escape. On error `self` is left unchanged.
    pub fn load(&mut self, path: &Path) -> Result<usize, PropertiesError> {
        let bytes = std::fs::read(path).map_err(|source| PropertiesError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let text: String = bytes.iter().copied().map(char::from).collect();
        self.load_str(&text)
    }

    /// Merge entries parsed from `text` into this set.
    ///
    /// # Errors
    ///
    /// Returns an error on a malformed `\uXXXX` escape. On error `self` is
    /// left unchanged.
    pub fn load_str(&mut self, text: &str) -> Result<usize, PropertiesError> {
        let parsed = parse(text)?;
        let count = parsed.len();
        self.entries.extend(parsed);
        Ok(count)
    }
}

impl<K, V> FromIterator<(K, V)> for Properties
where
    K: Into<String>,
    V: Into<String>,
{
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self {
            entries: iter
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        }
    }
}

fn parse(text: &str) -> Result<Vec<(String, String)>, PropertiesError> {
    let mut out = Vec::new();
    for (line_no, logical) in logical_lines(text) {
        let (raw_key, raw_value) = split_key_value(&logical);
        let key = unescape(raw_key, line_no)?;
        let value = unescape(raw_value, line_no)?;
        out.push((key, value));
    }
    Ok(out)
}

/// Join continuation lines and drop blanks and comments.
fn logical_lines(text: &str) -> Vec<(usize, String)> {
    let mut lines = Vec::new();
    let mut current: Option<(usize, String)> = None;

    for (idx, physical) in physical_lines(text).enumerate() {
        let line_no = idx.saturating_add(1);
        let trimmed = physical.trim_start_matches([' ', '\t', '\x0c']);

        let (start, mut buf) = match current.take() {
            Some(pending) => pending,
            None => {
                if trimmed.is_empty() || trimmed.starts_with('#') || trimmed.starts_with('!') {
                    continue;
                }
                (line_no, String::new())
            }
        };

        if ends_with_continuation(trimmed) {
            buf.push_str(&trimmed[..trimmed.len().saturating_sub(1)]);
            current = Some((start, buf));
        } else {
            buf.push_str(trimmed);
            lines.push((start, buf));
        }
    }

    if let Some(pending) = current {
        lines.push(pending);
    }
    lines
}

/// Lines ended by `\n`, `\r` or `\r\n`; a trailing terminator adds no empty line.
fn physical_lines(text: &str) -> impl Iterator<Item = &str> {
    let mut rest = Some(text);
    std::iter::from_fn(move || {
        let remaining = rest.take().filter(|r| !r.is_empty())?;
        match remaining.find(['\n', '\r']) {
            Some(end) => {
                let after = &remaining[end..];
                let skip = if after.starts_with("\r\n") { 2 } else { 1 };
                rest = after.get(skip..);
                Some(&remaining[..end])
            }
            None => Some(remaining),
        }
    })
}

/// A line continues when it ends in an odd number of backslashes.
fn ends_with_continuation(line: &str) -> bool {
    line.bytes().rev().take_while(|b| *b == b'\\').count() % 2 == 1
}

fn split_key_value(line: &str) -> (&str, &str) {
    let mut escaped = false;
    let mut key_end = line.len();
    let mut has_separator = false;

    for (i, c) in line.char_indices() {
        if escaped {
            escaped = false;
            continue;
        }
        match c {
            '\\' => escaped = true,
            '=' | ':' => {
                key_end = i;
                has_separator = true;
                break;
            }
            ' ' | '\t' | '\x0c' => {
                key_end = i;
                break;
            }
            _ => {}
        }
    }

    let key = &line[..key_end];
    let mut rest = &line[key_end..];
    if has_separator {
        rest = &rest[1..];
    } else {
        rest = rest.trim_start_matches([' ', '\t', '\x0c']);
        if let Some(stripped) = rest.strip_prefix(['=', ':']) {
            rest = stripped;
        }
    }
    (key, rest.trim_start_matches([' ', '\t', '\x0c']))
}

fn unescape(raw: &str, line: usize) -> Result<String, PropertiesError> {
    let mut out = String::with_capacity(raw.len());
    let mut chars = raw.chars();

    while let Some(c) = chars.next() {
        if c != '\\' {
            out.push(c);
            continue;
        }
        match chars.next() {
            Some('t') => out.push('\t'),
            Some('n') => out.push('\n'),
            Some('r') => out.push('\r'),
            Some('f') => out.push('\x0c'),
            Some('u') => {
                let hex: String = chars.by_ref().take(4).collect();
                let decoded = (hex.len() == 4)
                    .then(|| u32::from_str_radix(&hex, 16).ok())
                    .flatten()
                    .and_then(char::from_u32)
                    .ok_or(PropertiesError::MalformedUnicodeEscape { line })?;
                out.push(decoded);
            }
            Some(other) => out.push(other),
            None => {}
        }
    }
    Ok(out)
}
