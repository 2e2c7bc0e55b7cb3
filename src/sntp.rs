//! SNTP packet record and a time server that answers with a shifted clock.
//!
//! Handy as a known NTP target for the scanner: the reply copies the request's
//! transmit timestamp into its originate field, exactly what the NTP fingerprint
//! checks for.
use std::io;
use std::net::SocketAddr;

use time::OffsetDateTime;
use tokio::net::{ToSocketAddrs, UdpSocket};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::error::SntpError;

pub const PACKET_LEN: usize = 48;

/// Seconds between the NTP epoch (1900-01-01) and the Unix epoch.
pub const NTP_UNIX_OFFSET: i64 = 2_208_988_800;

pub const MODE_CLIENT: u8 = 3;
pub const MODE_SERVER: u8 = 4;

/// 64-bit NTP timestamp: seconds since 1900 in the high half, fraction in the low half.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord)]
pub struct NtpTimestamp(u64);

impl NtpTimestamp {
    pub const fn from_bits(bits: u64) -> Self {
        Self(bits)
    }

    pub const fn to_bits(self) -> u64 {
        self.0
    }

    pub fn from_datetime(t: OffsetDateTime) -> Self {
        let secs = (t.unix_timestamp() + NTP_UNIX_OFFSET) as u64;
        let frac = (u64::from(t.nanosecond()) << 32) / 1_000_000_000;
        Self((secs << 32) | frac)
    }

    pub fn now() -> Self {
        Self::from_datetime(OffsetDateTime::now_utc())
    }

    /// Whole seconds since 1900.
    pub fn seconds(self) -> u32 {
        (self.0 >> 32) as u32
    }

    /// Shift by whole seconds; negative moves back in time.
    pub fn offset_by(self, secs: i64) -> Self {
        Self(self.0.wrapping_add_signed(secs << 32))
    }
}

/// Fixed-field SNTP packet (RFC 4330). Root delay, root dispersion, reference id and
/// reference timestamp are always zero here.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SntpPacket {
    pub leap_indicator: u8,
    pub version: u8,
    pub mode: u8,
    pub stratum: u8,
    pub poll: u8,
    pub precision: i8,
    pub originate_timestamp: NtpTimestamp,
    pub receive_timestamp: NtpTimestamp,
    pub transmit_timestamp: NtpTimestamp,
}

impl SntpPacket {
    pub fn from_bytes(buf: &[u8]) -> Result<Self, SntpError> {
        if buf.len() < PACKET_LEN {
            return Err(SntpError::TooShort(buf.len()));
        }
        let ts = |at: usize| {
            let mut b = [0u8; 8];
            b.copy_from_slice(&buf[at..at + 8]);
            NtpTimestamp(u64::from_be_bytes(b))
        };
        Ok(Self {
            leap_indicator: buf[0] >> 6,
            version: (buf[0] >> 3) & 0b111,
            mode: buf[0] & 0b111,
            stratum: buf[1],
            poll: buf[2],
            precision: buf[3] as i8,
            originate_timestamp: ts(24),
            receive_timestamp: ts(32),
            transmit_timestamp: ts(40),
        })
    }

    pub fn to_bytes(&self) -> [u8; PACKET_LEN] {
        let mut buf = [0u8; PACKET_LEN];
        buf[0] = (self.leap_indicator << 6) | ((self.version & 0b111) << 3) | (self.mode & 0b111);
        buf[1] = self.stratum;
        buf[2] = self.poll;
        buf[3] = self.precision as u8;
        buf[24..32].copy_from_slice(&self.originate_timestamp.0.to_be_bytes());
        buf[32..40].copy_from_slice(&self.receive_timestamp.0.to_be_bytes());
        buf[40..48].copy_from_slice(&self.transmit_timestamp.0.to_be_bytes());
        buf
    }

    /// Server reply to a client request, with the clock shifted by `offset_secs`.
    /// Anything that is not a client request gets no reply.
    pub fn reply_to(request: &SntpPacket, now: NtpTimestamp, offset_secs: i64) -> Option<Self> {
        if request.mode != MODE_CLIENT {
            return None;
        }
        let shifted = now.offset_by(offset_secs);
        Some(Self {
            leap_indicator: 0,
            version: request.version,
            mode: MODE_SERVER,
            stratum: 0,
            poll: 0,
            precision: 0,
            originate_timestamp: request.transmit_timestamp,
            receive_timestamp: shifted,
            transmit_timestamp: shifted,
        })
    }
}

/// UDP time server answering every client request with a shifted clock.
#[derive(Debug)]
pub struct SntpServer {
    socket: UdpSocket,
    offset_secs: i64,
}

impl SntpServer {
    pub async fn bind(addr: impl ToSocketAddrs, offset_secs: i64) -> io::Result<Self> {
        let socket = UdpSocket::bind(addr).await?;
        Ok(Self {
            socket,
            offset_secs,
        })
    }

    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        self.socket.local_addr()
    }

    /// Answer requests until `cancel` fires.
    pub async fn serve(self, cancel: CancellationToken) -> io::Result<()> {
        let mut buf = [0u8; 1024];
        loop {
            let (n, peer) = tokio::select! {
                _ = cancel.cancelled() => {
                    info!("sntp server stopped");
                    return Ok(());
                }
                res = self.socket.recv_from(&mut buf) => match res {
                    Ok(v) => v,
                    Err(e) => {
                        debug!(error = %e, "sntp receive failed");
                        continue;
                    }
                },
            };
            info!(ip = %peer.ip(), port = peer.port(), "time request");

            let request = match SntpPacket::from_bytes(&buf[..n]) {
                Ok(p) => p,
                Err(e) => {
                    debug!(%peer, error = %e, "ignoring malformed request");
                    continue;
                }
            };
            let Some(reply) = SntpPacket::reply_to(&request, NtpTimestamp::now(), self.offset_secs)
            else {
                debug!(%peer, mode = request.mode, "ignoring non-client packet");
                continue;
            };
            if let Err(e) = self.socket.send_to(&reply.to_bytes(), peer).await {
                warn!(%peer, error = %e, "sntp reply failed");
            }
        }
    }
}
