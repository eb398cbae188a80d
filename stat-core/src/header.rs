//! `AsciiHeader`: an insertion-ordered key/value header, the PSRDADA-style
//! wire format used for both beam/scan configuration and the in-band
//! headers written by upstream data/weights producers.

use std::fs;
use std::path::Path;

use crate::errors::{Result, StatError};

/// Insertion-ordered string key/value map with typed accessors.
///
/// Order is preserved so that `raw()` round-trips in the order keys were
/// set, matching the line-oriented `KEY value` format real PSRDADA headers
/// use on the wire.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AsciiHeader {
    keys: Vec<String>,
    values: std::collections::HashMap<String, String>,
}

impl AsciiHeader {
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse a header from its on-disk `KEY value` line format.
    pub fn load_from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let contents = fs::read_to_string(path).map_err(|e| StatError::IoError {
            path: path.display().to_string(),
            cause: e.to_string(),
        })?;
        Ok(Self::parse(&contents))
    }

    /// Parse a header from its in-memory text representation.
    pub fn parse(text: &str) -> Self {
        let mut header = Self::new();
        for line in text.lines() {
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            if let Some((key, value)) = line.split_once(char::is_whitespace) {
                header.set(key.trim(), value.trim());
            }
        }
        header
    }

    /// Render back to the `KEY value` wire format, in insertion order.
    pub fn raw(&self) -> String {
        let mut out = String::new();
        for key in &self.keys {
            out.push_str(key);
            out.push(' ');
            out.push_str(&self.values[key]);
            out.push('\n');
        }
        out
    }

    pub fn has(&self, key: &str) -> bool {
        self.values.contains_key(key)
    }

    pub fn get_val(&self, key: &str) -> Result<String> {
        self.values
            .get(key)
            .cloned()
            .ok_or_else(|| StatError::MissingField(key.to_string()))
    }

    pub fn get_uint32(&self, key: &str) -> Result<u32> {
        self.get_val(key)?
            .parse()
            .map_err(|_| StatError::ParseError(key.to_string()))
    }

    pub fn get_uint64(&self, key: &str) -> Result<u64> {
        self.get_val(key)?
            .parse()
            .map_err(|_| StatError::ParseError(key.to_string()))
    }

    pub fn get_double(&self, key: &str) -> Result<f64> {
        self.get_val(key)?
            .parse()
            .map_err(|_| StatError::ParseError(key.to_string()))
    }

    pub fn set(&mut self, key: &str, value: &str) {
        if !self.values.contains_key(key) {
            self.keys.push(key.to_string());
        }
        self.values.insert(key.to_string(), value.to_string());
    }

    /// Overwrite only the keys present in `other`, leaving the rest untouched.
    pub fn clone_from(&mut self, other: &AsciiHeader) {
        for key in &other.keys {
            self.set(key, &other.values[key]);
        }
    }

    /// Add keys from `other` that are not already present; existing local
    /// values take precedence.
    pub fn append_header(&mut self, other: &AsciiHeader) {
        for key in &other.keys {
            if !self.has(key) {
                self.set(key, &other.values[key]);
            }
        }
    }

    pub fn reset(&mut self) {
        self.keys.clear();
        self.values.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_and_raw_round_trip_order() {
        let header = AsciiHeader::parse("NPOL 2\nNCHAN 256\nFREQ 1284.0\n");
        assert_eq!(header.get_uint32("NPOL").unwrap(), 2);
        assert_eq!(header.get_uint32("NCHAN").unwrap(), 256);
        assert_eq!(header.get_double("FREQ").unwrap(), 1284.0);
        assert_eq!(header.raw(), "NPOL 2\nNCHAN 256\nFREQ 1284.0\n");
    }

    #[test]
    fn missing_field_fails() {
        let header = AsciiHeader::new();
        assert!(matches!(
            header.get_val("NPOL"),
            Err(StatError::MissingField(_))
        ));
    }

    #[test]
    fn parse_error_on_bad_type() {
        let header = AsciiHeader::parse("NPOL abc\n");
        assert!(matches!(
            header.get_uint32("NPOL"),
            Err(StatError::ParseError(_))
        ));
    }

    #[test]
    fn append_header_prefers_local() {
        let mut local = AsciiHeader::parse("NPOL 2\n");
        let upstream = AsciiHeader::parse("NPOL 4\nNCHAN 256\n");
        local.append_header(&upstream);
        assert_eq!(local.get_uint32("NPOL").unwrap(), 2);
        assert_eq!(local.get_uint32("NCHAN").unwrap(), 256);
    }

    #[test]
    fn clone_from_overwrites_only_present_keys() {
        let mut local = AsciiHeader::parse("NPOL 2\nNCHAN 256\n");
        let patch = AsciiHeader::parse("NPOL 4\n");
        local.clone_from(&patch);
        assert_eq!(local.get_uint32("NPOL").unwrap(), 4);
        assert_eq!(local.get_uint32("NCHAN").unwrap(), 256);
    }
}
