use std::time::Duration;

use crate::error::ConfigError;
use crate::ports::PortRange;

/// Default per-operation socket timeout.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_millis(500);

/// Which transports to probe. At least one is always enabled: asking for neither
/// falls back to TCP.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TransportSelection {
    tcp: bool,
    udp: bool,
}

impl TransportSelection {
    pub fn new(tcp: bool, udp: bool) -> Self {
        Self {
            tcp: tcp || !udp,
            udp,
        }
    }

    pub fn tcp(&self) -> bool {
        self.tcp
    }

    pub fn udp(&self) -> bool {
        self.udp
    }

    pub fn count(&self) -> usize {
        usize::from(self.tcp) + usize::from(self.udp)
    }
}

impl Default for TransportSelection {
    fn default() -> Self {
        Self::new(true, false)
    }
}

/// Raw scan parameters as handed over by the command line.
#[derive(Debug, Clone)]
pub struct ScanConfig {
    pub host: String,
    pub start_port: u32,
    pub end_port: u32,
    pub transports: TransportSelection,
    pub timeout: Duration,
    pub workers: usize,
}

impl ScanConfig {
    /// Configuration for `host` with the defaults: all ports, TCP only, 500ms timeout,
    /// one worker per spare CPU.
    pub fn new(host: impl Into<String>) -> Self {
        Self {
            host: host.into(),
            start_port: 1,
            end_port: 65535,
            transports: TransportSelection::default(),
            timeout: DEFAULT_TIMEOUT,
            workers: default_workers(),
        }
    }

    /// Check every field before any socket is opened.
    pub fn validate(&self) -> Result<ScanTarget, ConfigError> {
        let host = self.host.trim();
        if host.is_empty() {
            return Err(ConfigError::EmptyHost);
        }
        let range = PortRange::new(self.start_port, self.end_port)?;
        if self.workers == 0 {
            return Err(ConfigError::NoWorkers);
        }
        if self.timeout.is_zero() {
            return Err(ConfigError::InvalidTimeout(0.0));
        }
        Ok(ScanTarget {
            host: host.to_string(),
            range,
            transports: self.transports,
        })
    }
}

/// Validated, immutable description of what to probe.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScanTarget {
    pub host: String,
    pub range: PortRange,
    pub transports: TransportSelection,
}

/// One less than the available parallelism, never below one.
pub fn default_workers() -> usize {
    std::thread::available_parallelism()
        .map(|n| n.get().saturating_sub(1))
        .unwrap_or(1)
        .max(1)
}

/// Convert a fractional number of seconds into a timeout.
pub fn timeout_from_secs(secs: f64) -> Result<Duration, ConfigError> {
    if !secs.is_finite() || secs <= 0.0 {
        return Err(ConfigError::InvalidTimeout(secs));
    }
    Duration::try_from_secs_f64(secs).map_err(|_| ConfigError::InvalidTimeout(secs))
}
