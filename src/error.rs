//! Errors raised while validating a scan configuration.
//!
//! Network conditions (refused, timed out, silent UDP) are outcomes, not errors,
//! and never appear here.
use thiserror::Error;

#[derive(Debug, Error, PartialEq)]
pub enum ConfigError {
    #[error("port out of range: {0} (expected 1..=65535)")]
    PortOutOfRange(u32),
    #[error("invalid port range {start}-{end} (start > end)")]
    InvalidRange { start: u16, end: u16 },
    #[error("worker count must be at least 1")]
    NoWorkers,
    #[error("invalid timeout: {0} seconds")]
    InvalidTimeout(f64),
    #[error("host must not be empty")]
    EmptyHost,
}

/// Errors decoding an SNTP packet.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum SntpError {
    #[error("packet too short: {0} bytes (need 48)")]
    TooShort(usize),
}
