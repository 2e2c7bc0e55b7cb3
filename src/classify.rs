//! Passive protocol fingerprinting of a single response buffer.
//!
//! Checks run in a fixed order and the first hit wins: the cheap text literals first,
//! then the binary header shapes (DNS, NTP), so a binary reply that happens to contain
//! one of the literals is still labelled by the literal.
use crate::types::{ProbeNonce, Protocol};
use crate::udp::UDP_PROBE_HEADER;

/// Offset of the originate timestamp in an NTP packet. A server copies the client's
/// transmit timestamp (where the probe carries the nonce, offset 40) into this field.
pub const NTP_ORIGINATE_OFFSET: usize = 24;

const NTP_MODE_SERVER: u8 = 4;
const NTP_VERSION: u8 = 2;

/// Label a response, or `None` when nothing matches.
pub fn classify(response: &[u8], nonce: &ProbeNonce) -> Option<Protocol> {
    if response.len() > 4 && response.starts_with(b"HTTP") {
        return Some(Protocol::Http);
    }
    if contains(response, b"SMTP") {
        return Some(Protocol::Smtp);
    }
    if contains(response, b"POP3") {
        return Some(Protocol::Pop3);
    }
    if contains(response, b"IMAP") {
        return Some(Protocol::Imap);
    }
    if looks_like_dns(response) {
        return Some(Protocol::Dns);
    }
    if looks_like_ntp(response, nonce) {
        return Some(Protocol::Ntp);
    }
    None
}

fn contains(haystack: &[u8], needle: &[u8]) -> bool {
    haystack.windows(needle.len()).any(|w| w == needle)
}

// The probe's first two bytes double as a DNS transaction id; bit 0 of byte 3 sits
// where a response flag would be in a header echoed back by a resolver.
fn looks_like_dns(response: &[u8]) -> bool {
    response.len() > 11 && response[..2] == UDP_PROBE_HEADER && response[3] & 1 == 1
}

fn looks_like_ntp(response: &[u8], nonce: &ProbeNonce) -> bool {
    if response.len() <= 39 {
        return false;
    }
    let mode = response[0] & 0b111;
    let version = (response[0] >> 3) & 0b111;
    let originate = &response[NTP_ORIGINATE_OFFSET..NTP_ORIGINATE_OFFSET + 8];
    mode == NTP_MODE_SERVER && version == NTP_VERSION && originate == nonce.as_bytes()
}
