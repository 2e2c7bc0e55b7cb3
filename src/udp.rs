use std::io;
use std::net::{Ipv4Addr, Ipv6Addr, SocketAddr};
use std::time::Duration;

use tokio::net::{lookup_host, UdpSocket};
use tokio::time;
use tracing::{debug, warn};

use crate::classify::classify;
use crate::tcp::RESPONSE_LIMIT;
use crate::types::{ProbeNonce, ProbeOutcome, Transport};

/// First two bytes of every UDP probe: LI=0, VN=2, mode=3 (client), then a zero stratum.
pub const UDP_PROBE_HEADER: [u8; 2] = [0x13, 0x00];

pub const UDP_PROBE_LEN: usize = 48;

/// Offset of the NTP transmit timestamp, where the probe carries the nonce.
pub const NONCE_OFFSET: usize = 40;

/// A minimal NTP client request with the nonce as its transmit timestamp.
pub fn udp_probe_payload(nonce: &ProbeNonce) -> [u8; UDP_PROBE_LEN] {
    let mut buf = [0u8; UDP_PROBE_LEN];
    buf[..2].copy_from_slice(&UDP_PROBE_HEADER);
    buf[NONCE_OFFSET..].copy_from_slice(nonce.as_bytes());
    buf
}

/// Send one NTP-shaped datagram to `host:port` and classify the reply, if any.
///
/// - Reply received: open, labelled by the classifier.
/// - No reply within `timeout`: reported as open with no label; silence is taken as
///   a weak positive for UDP.
/// - ICMP port unreachable (surfaced as connection refused): `None`, port closed.
/// - Name resolution, bind or send failures: `None`, nothing reached the port.
pub async fn probe_udp(
    host: &str,
    port: u16,
    timeout: Duration,
    nonce: &ProbeNonce,
) -> Option<ProbeOutcome> {
    let addr = match time::timeout(timeout, lookup_host((host, port))).await {
        Ok(Ok(mut addrs)) => addrs.next(),
        Ok(Err(e)) => {
            warn!(host, error = %e, "udp target did not resolve");
            None
        }
        Err(_) => {
            warn!(host, "udp target resolution timed out");
            None
        }
    }?;

    let socket = match connect(addr).await {
        Ok(socket) => socket,
        Err(e) => {
            warn!(port, error = %e, "udp socket setup failed");
            return None;
        }
    };

    let payload = udp_probe_payload(nonce);
    match time::timeout(timeout, socket.send(&payload)).await {
        Ok(Ok(_)) => {}
        Ok(Err(e)) if e.kind() == io::ErrorKind::ConnectionRefused => {
            debug!(port, "udp send refused");
            return None;
        }
        Ok(Err(e)) => {
            warn!(port, error = %e, "udp send failed");
            return None;
        }
        Err(_) => {
            debug!(port, "udp send timed out");
            return Some(ProbeOutcome::unidentified(Transport::Udp, port));
        }
    }

    let mut buf = vec![0u8; RESPONSE_LIMIT];
    let label = match time::timeout(timeout, socket.recv(&mut buf)).await {
        Ok(Ok(n)) => classify(&buf[..n], nonce),
        Ok(Err(e)) if e.kind() == io::ErrorKind::ConnectionRefused => {
            debug!(port, "udp port unreachable");
            return None;
        }
        Ok(Err(e)) => {
            warn!(port, error = %e, "udp receive failed");
            None
        }
        Err(_) => {
            debug!(port, "udp no reply");
            None
        }
    };
    Some(ProbeOutcome {
        transport: Transport::Udp,
        port,
        label,
    })
}

// A connected socket only accepts datagrams from the target and gets ICMP errors
// reported back as `ConnectionRefused`.
async fn connect(addr: SocketAddr) -> io::Result<UdpSocket> {
    let local: SocketAddr = if addr.is_ipv4() {
        (Ipv4Addr::UNSPECIFIED, 0).into()
    } else {
        (Ipv6Addr::UNSPECIFIED, 0).into()
    };
    let socket = UdpSocket::bind(local).await?;
    socket.connect(addr).await?;
    Ok(socket)
}
