// src/config.rs

//! Flat key=value configuration and manifest files
//!
//! The same format backs the global configuration file, installed-package
//! manifests, and repository metadata records: one `key=value` pair per
//! line, no escaping, the first `=` splits key from value. Blank lines are
//! ignored; malformed lines are logged and skipped.

use std::collections::BTreeMap;
use std::fmt::Write as _;
use std::io::BufRead;
use std::path::Path;
use tracing::warn;

/// Parsed key=value file.
///
/// A read of a missing or unopenable file does not error; it yields a
/// `ConfigFile` with the `failed` flag set. Callers check [`ConfigFile::ok`]
/// before trusting the contents.
#[derive(Debug, Clone, Default)]
pub struct ConfigFile {
    values: BTreeMap<String, String>,
    failed: bool,
}

impl ConfigFile {
    /// Read a config file from disk. Never errors: an unopenable file
    /// produces the failed sentinel instead.
    pub fn read(path: &Path) -> Self {
        match std::fs::File::open(path) {
            Ok(file) => Self::from_reader(std::io::BufReader::new(file)),
            Err(_) => Self {
                values: BTreeMap::new(),
                failed: true,
            },
        }
    }

    /// Parse a config file from an in-memory buffer (e.g. an archive entry).
    pub fn from_bytes(data: &[u8]) -> Self {
        Self::from_reader(data)
    }

    fn from_reader(reader: impl BufRead) -> Self {
        let mut values = BTreeMap::new();
        for line in reader.lines() {
            let line = match line {
                Ok(line) => line,
                Err(e) => {
                    warn!("failed to read config line: {}", e);
                    continue;
                }
            };
            if line.is_empty() {
                continue;
            }
            match line.split_once('=') {
                Some((key, value)) => {
                    values.insert(key.to_string(), value.to_string());
                }
                None => {
                    warn!("found invalid config line \"{}\"; ignoring it", line);
                }
            }
        }
        Self {
            values,
            failed: false,
        }
    }

    /// Build a config file from key/value pairs (repository metadata writes).
    pub fn from_pairs(pairs: impl IntoIterator<Item = (String, String)>) -> Self {
        Self {
            values: pairs.into_iter().collect(),
            failed: false,
        }
    }

    /// Whether the backing file could be opened at all.
    pub fn ok(&self) -> bool {
        !self.failed
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.values.get(key).map(String::as_str)
    }

    pub fn contains(&self, key: &str) -> bool {
        self.values.contains_key(key)
    }

    /// Comma-joined list value, or empty when the key is absent or empty.
    pub fn get_list(&self, key: &str) -> Vec<String> {
        match self.get(key) {
            Some(value) => split_list(value),
            None => Vec::new(),
        }
    }

    /// All pairs in sorted key order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.values
            .iter()
            .map(|(key, value)| (key.as_str(), value.as_str()))
    }

    /// Serialize back to the flat text format, keys in insertion-independent
    /// sorted order.
    pub fn to_text(&self) -> String {
        let mut out = String::new();
        for (key, value) in &self.values {
            let _ = writeln!(out, "{}={}", key, value);
        }
        out
    }
}

/// Split a comma-joined list value, dropping empty segments.
pub fn split_list(value: &str) -> Vec<String> {
    value
        .split(',')
        .filter(|part| !part.is_empty())
        .map(str::to_string)
        .collect()
}
