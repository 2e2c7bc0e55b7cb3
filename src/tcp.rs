use std::io;
use std::time::Duration;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::time;
use tracing::{debug, warn};

use crate::classify::classify;
use crate::types::{ProbeNonce, ProbeOutcome, Transport};

/// Largest response read from a single probe.
pub const RESPONSE_LIMIT: usize = 1024;

/// 250 filler bytes and a blank line, enough to make line-based servers answer.
pub const TCP_PROBE: [u8; 254] = tcp_probe();

const fn tcp_probe() -> [u8; 254] {
    let mut buf = [b'a'; 254];
    buf[250] = b'\r';
    buf[251] = b'\n';
    buf[252] = b'\r';
    buf[253] = b'\n';
    buf
}

/// Connect to `host:port`, send the probe and classify the first chunk of the reply.
///
/// - Connect refused, timed out or otherwise failed: `None`, the port is not reported.
/// - Connected but the write/read failed or returned nothing: open, no label.
/// - Connected and got data: open, labelled by the classifier.
///
/// Each socket operation is bounded by `timeout`; nothing is retried. The stream is
/// closed when it goes out of scope on every path.
pub async fn probe_tcp(
    host: &str,
    port: u16,
    timeout: Duration,
    nonce: &ProbeNonce,
) -> Option<ProbeOutcome> {
    let mut stream = match time::timeout(timeout, TcpStream::connect((host, port))).await {
        Ok(Ok(stream)) => stream,
        Ok(Err(e)) => {
            debug!(port, error = %e, "tcp connect failed");
            return None;
        }
        Err(_) => {
            debug!(port, "tcp connect timed out");
            return None;
        }
    };

    let label = match exchange(&mut stream, timeout).await {
        Ok(buf) if buf.is_empty() => None,
        Ok(buf) => classify(&buf, nonce),
        Err(e) if e.kind() == io::ErrorKind::TimedOut => {
            debug!(port, "tcp read timed out");
            None
        }
        Err(e) => {
            warn!(port, error = %e, "tcp exchange failed after connect");
            None
        }
    };
    Some(ProbeOutcome {
        transport: Transport::Tcp,
        port,
        label,
    })
}

async fn exchange(stream: &mut TcpStream, timeout: Duration) -> io::Result<Vec<u8>> {
    time::timeout(timeout, stream.write_all(&TCP_PROBE)).await??;
    let mut buf = vec![0u8; RESPONSE_LIMIT];
    let n = time::timeout(timeout, stream.read(&mut buf)).await??;
    buf.truncate(n);
    Ok(buf)
}
