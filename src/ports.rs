use crate::config::TransportSelection;
use crate::error::ConfigError;
use crate::types::{ProbeTask, Transport};

/// Inclusive port range with `1 <= start <= end <= 65535`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PortRange {
    start: u16,
    end: u16,
}

impl PortRange {
    /// Validate raw bounds. Values are taken as `u32` so that out-of-range input such as
    /// `70000` is reported instead of silently wrapping.
    pub fn new(start: u32, end: u32) -> Result<Self, ConfigError> {
        let start = check_port(start)?;
        let end = check_port(end)?;
        if start > end {
            return Err(ConfigError::InvalidRange { start, end });
        }
        Ok(Self { start, end })
    }

    pub fn start(&self) -> u16 {
        self.start
    }

    pub fn end(&self) -> u16 {
        self.end
    }

    /// Number of ports in the range (never zero).
    pub fn port_count(&self) -> usize {
        usize::from(self.end - self.start) + 1
    }

    pub fn iter(&self) -> impl Iterator<Item = u16> {
        self.start..=self.end
    }
}

/// Expand a range and transport selection into one task per (port, enabled transport).
///
/// For each port the TCP task precedes the UDP task; workers are free to finish them in
/// any order.
pub fn enumerate_tasks(range: PortRange, transports: TransportSelection) -> Vec<ProbeTask> {
    let mut out = Vec::with_capacity(range.port_count() * transports.count());
    for port in range.iter() {
        if transports.tcp() {
            out.push(ProbeTask {
                transport: Transport::Tcp,
                port,
            });
        }
        if transports.udp() {
            out.push(ProbeTask {
                transport: Transport::Udp,
                port,
            });
        }
    }
    out
}

fn check_port(val: u32) -> Result<u16, ConfigError> {
    if val == 0 || val > 65535 {
        return Err(ConfigError::PortOutOfRange(val));
    }
    Ok(val as u16)
}
