//! Logger configuration
//!
//! Controls the rotating file logger. CLI and config-file parsing happen
//! in the host node; this struct is the boundary.

use std::path::PathBuf;

use serde::Deserialize;

/// Rotating file logger configuration
///
/// # Example
///
/// ```toml
/// [logger]
/// base_path = "/var/log/node"
/// interval = "1HOUR"
/// build_number = 1480
/// max_old_logs_bytes = 104857600
/// ```
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LoggerConfig {
    /// Base filename for rotating logs. Rotated files are named
    /// `<base_path>-<build>-YYYY-MM-DD-HH[-MM][-<n>].log.gz` next to it.
    pub base_path: PathBuf,

    /// Rotation interval, e.g. "5MINUTES", "HOUR", "3DAYS", "1WEEK".
    /// Default: "HOUR"
    pub interval: String,

    /// Build number embedded in rotated filenames
    pub build_number: u32,

    /// Maximum number of buffered records
    /// Default: 10 000
    pub max_list_size: usize,

    /// Maximum accounted bytes held in the buffer
    /// Default: 10 MiB
    pub max_list_bytes: u64,

    /// Disk quota over rotated (archived) log files
    /// Default: 100 MiB
    pub max_old_logs_bytes: u64,

    /// Flush window in milliseconds; everything hits disk within this
    /// period unless the writer is saturated
    /// Default: 1000
    pub flush_ms: u64,

    /// Maintain an uncompressed `<base>-latest.log` convenience mirror
    /// Default: true
    pub mirror: bool,

    /// Truncate log files on open instead of appending
    /// Default: false
    pub overwrite: bool,

    /// Host identity token consumed by line formatters (the `u`
    /// directive). Resolution of the actual host name is the caller's
    /// concern; the value is threaded through here once.
    /// Default: "unknown"
    pub host_ident: String,
}

impl Default for LoggerConfig {
    fn default() -> Self {
        Self {
            base_path: PathBuf::from("logs/node"),
            interval: "HOUR".into(),
            build_number: 0,
            max_list_size: 10_000,
            max_list_bytes: 10 * (1 << 20),
            max_old_logs_bytes: 100 * (1 << 20),
            flush_ms: 1000,
            mirror: true,
            overwrite: false,
            host_ident: "unknown".into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = LoggerConfig::default();
        assert_eq!(config.interval, "HOUR");
        assert_eq!(config.max_list_size, 10_000);
        assert_eq!(config.max_list_bytes, 10 * 1024 * 1024);
        assert_eq!(config.flush_ms, 1000);
        assert!(config.mirror);
        assert!(!config.overwrite);
    }

    #[test]
    fn test_deserialize_empty() {
        let config: LoggerConfig = toml::from_str("").unwrap();
        assert_eq!(config.interval, "HOUR");
        assert_eq!(config.host_ident, "unknown");
    }

    #[test]
    fn test_deserialize_full() {
        let toml = r#"
base_path = "/var/log/node"
interval = "5MINUTES"
build_number = 1480
max_list_size = 500
max_list_bytes = 65536
max_old_logs_bytes = 1048576
flush_ms = 250
mirror = false
overwrite = true
host_ident = "node7"
"#;
        let config: LoggerConfig = toml::from_str(toml).unwrap();
        assert_eq!(config.base_path, PathBuf::from("/var/log/node"));
        assert_eq!(config.interval, "5MINUTES");
        assert_eq!(config.build_number, 1480);
        assert_eq!(config.max_list_size, 500);
        assert_eq!(config.max_list_bytes, 65536);
        assert_eq!(config.max_old_logs_bytes, 1_048_576);
        assert_eq!(config.flush_ms, 250);
        assert!(!config.mirror);
        assert!(config.overwrite);
        assert_eq!(config.host_ident, "node7");
    }
}
