use rand::Rng;
use std::fmt;

/// Transport used for a single probe.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Transport {
    Tcp,
    Udp,
}

impl fmt::Display for Transport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Transport::Tcp => f.write_str("TCP"),
            Transport::Udp => f.write_str("UDP"),
        }
    }
}

/// One pending unit of work: probe `port` over `transport`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ProbeTask {
    pub transport: Transport,
    pub port: u16,
}

/// Protocols the classifier can recognise from response bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Protocol {
    Http,
    Smtp,
    Pop3,
    Imap,
    Dns,
    Ntp,
}

impl Protocol {
    pub fn as_str(&self) -> &'static str {
        match self {
            Protocol::Http => "HTTP",
            Protocol::Smtp => "SMTP",
            Protocol::Pop3 => "POP3",
            Protocol::Imap => "IMAP",
            Protocol::Dns => "DNS",
            Protocol::Ntp => "NTP",
        }
    }
}

impl fmt::Display for Protocol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A port that answered. `label` is `None` when no fingerprint matched.
///
/// Formats as the output line, e.g. `TCP 80 HTTP` or `UDP 37`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProbeOutcome {
    pub transport: Transport,
    pub port: u16,
    pub label: Option<Protocol>,
}

impl ProbeOutcome {
    pub fn unidentified(transport: Transport, port: u16) -> Self {
        Self {
            transport,
            port,
            label: None,
        }
    }
}

impl fmt::Display for ProbeOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.transport, self.port)?;
        if let Some(label) = self.label {
            write!(f, " {label}")?;
        }
        Ok(())
    }
}

/// Per-run random value carried in every UDP probe and checked by the NTP fingerprint.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProbeNonce([u8; 8]);

impl ProbeNonce {
    pub const fn from_bytes(bytes: [u8; 8]) -> Self {
        Self(bytes)
    }

    /// Random big-endian value in `[2^16, 2^64 - 1]`.
    pub fn random() -> Self {
        let value: u64 = rand::thread_rng().gen_range((1u64 << 16)..=u64::MAX);
        Self(value.to_be_bytes())
    }

    pub fn as_bytes(&self) -> &[u8; 8] {
        &self.0
    }
}

/// Lifecycle of one scan run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScanState {
    Idle,
    Running,
    Cancelling,
    Draining,
    Done,
}

/// Counters reported once a run reaches `Done`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScanSummary {
    pub tasks_total: u64,
    pub tasks_done: u64,
    pub reported: u64,
    pub cancelled: bool,
    pub state: ScanState,
}
