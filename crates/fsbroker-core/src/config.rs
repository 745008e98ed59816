//! Buffered reader configuration that callers can serialize/deserialize.

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReaderConfig {
    /// Size of every read-ahead request except possibly the last one of a range.
    pub read_chunk_size: u32,

    /// Ceiling on requests that are in flight or completed but not yet consumed.
    pub max_outstanding: u32,

    /// Byte offset the handle is seeked to before the first request is issued.
    pub start_offset: u64,

    /// Exclusive upper bound of the range to read. `None` reads to end of file.
    pub end_offset: Option<u64>,
}

impl Default for ReaderConfig {
    fn default() -> Self {
        Self {
            read_chunk_size: 64 * 1024, // 64 KiB
            max_outstanding: 3,
            start_offset: 0,
            end_offset: None,
        }
    }
}

impl ReaderConfig {
    pub fn new(read_chunk_size: u32, max_outstanding: u32) -> Self {
        Self {
            read_chunk_size,
            max_outstanding,
            ..Self::default()
        }
    }

    /// Restrict the reader to `[start, end)`. An `end` of 0 means unbounded.
    pub fn with_range(mut self, start: u64, end: Option<u64>) -> Self {
        self.start_offset = start;
        self.end_offset = end.filter(|e| *e != 0);
        self
    }

    /// Create a config from environment variables, falling back to defaults.
    ///
    /// Environment variables:
    /// - `FSBROKER_READ_CHUNK_SIZE`: bytes per read-ahead request
    /// - `FSBROKER_MAX_OUTSTANDING`: read-ahead window size
    /// - `FSBROKER_START_OFFSET`: first byte to read
    /// - `FSBROKER_END_OFFSET`: exclusive end of the range (0 = unbounded)
    pub fn from_env() -> Self {
        let mut cfg = Self::default();
        cfg.apply_env(|key| std::env::var(key).ok());
        cfg
    }

    fn apply_env(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(v) = lookup("FSBROKER_READ_CHUNK_SIZE").and_then(|s| s.parse::<u32>().ok()) {
            self.read_chunk_size = v;
        }

        if let Some(v) = lookup("FSBROKER_MAX_OUTSTANDING").and_then(|s| s.parse::<u32>().ok()) {
            self.max_outstanding = v;
        }

        if let Some(v) = lookup("FSBROKER_START_OFFSET").and_then(|s| s.parse::<u64>().ok()) {
            self.start_offset = v;
        }

        if let Some(v) = lookup("FSBROKER_END_OFFSET").and_then(|s| s.parse::<u64>().ok()) {
            self.end_offset = if v == 0 { None } else { Some(v) };
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.read_chunk_size == 0 {
            return Err(Error::Config("read_chunk_size must be positive".into()));
        }
        if self.max_outstanding == 0 {
            return Err(Error::Config("max_outstanding must be positive".into()));
        }
        if let Some(end) = self.end_offset {
            if end < self.start_offset {
                return Err(Error::Config(format!(
                    "end_offset {} precedes start_offset {}",
                    end, self.start_offset
                )));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn env_overrides_defaults_and_ignores_garbage() {
        let vars: HashMap<&str, &str> = [
            ("FSBROKER_READ_CHUNK_SIZE", "1000"),
            ("FSBROKER_MAX_OUTSTANDING", "not-a-number"),
            ("FSBROKER_END_OFFSET", "0"),
        ]
        .into_iter()
        .collect();

        let mut cfg = ReaderConfig::default();
        cfg.apply_env(|k| vars.get(k).map(|v| v.to_string()));

        assert_eq!(cfg.read_chunk_size, 1000);
        assert_eq!(cfg.max_outstanding, 3);
        assert_eq!(cfg.end_offset, None);
    }

    #[test]
    fn validate_rejects_bad_windows_and_ranges() {
        assert!(ReaderConfig::new(0, 3).validate().is_err());
        assert!(ReaderConfig::new(10, 0).validate().is_err());
        assert!(ReaderConfig::new(10, 2)
            .with_range(100, Some(50))
            .validate()
            .is_err());
        assert!(ReaderConfig::new(10, 2)
            .with_range(100, Some(100))
            .validate()
            .is_ok());
    }

    #[test]
    fn zero_end_means_unbounded() {
        let cfg = ReaderConfig::new(10, 2).with_range(5, Some(0));
        assert_eq!(cfg.end_offset, None);
        assert_eq!(cfg.start_offset, 5);
    }

    #[test]
    fn config_serializes_as_json() {
        let cfg = ReaderConfig::new(4096, 4).with_range(0, Some(8192));
        let json = serde_json::to_string(&cfg).unwrap();
        let back: ReaderConfig = serde_json::from_str(&json).unwrap();
        assert_eq!(back, cfg);
    }
}
