use std::time::Duration;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, UdpSocket};
use tokio_util::sync::CancellationToken;

use proto_scan_rs::config::{timeout_from_secs, ScanConfig, TransportSelection};
use proto_scan_rs::scanner::Scanner;
use proto_scan_rs::sntp::SntpServer;
use proto_scan_rs::types::{ScanState, ScanSummary};

fn config(port: u16, tcp: bool, udp: bool) -> ScanConfig {
    let mut cfg = ScanConfig::new("127.0.0.1");
    cfg.start_port = u32::from(port);
    cfg.end_port = u32::from(port);
    cfg.transports = TransportSelection::new(tcp, udp);
    cfg.timeout = Duration::from_millis(500);
    cfg.workers = 2;
    cfg
}

async fn scan(cfg: ScanConfig) -> (Vec<String>, ScanSummary) {
    let scanner = Scanner::new(cfg).expect("valid config");
    let mut out = Vec::new();
    let summary = scanner.run(&mut out).await.expect("scan ok");
    let text = String::from_utf8(out).expect("utf8 output");
    (text.lines().map(str::to_string).collect(), summary)
}

async fn free_tcp_port() -> u16 {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    listener.local_addr().unwrap().port()
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn closed_tcp_port_prints_nothing() {
    let port = free_tcp_port().await;
    let (lines, summary) = scan(config(port, true, false)).await;
    assert!(lines.is_empty(), "unexpected output: {lines:?}");
    assert_eq!(summary.tasks_total, 1);
    assert_eq!(summary.tasks_done, 1);
    assert_eq!(summary.state, ScanState::Done);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn huge_timeout_on_closed_port_completes() {
    let port = free_tcp_port().await;
    let mut cfg = config(port, true, false);
    cfg.timeout = timeout_from_secs(1e19).expect("finite positive timeout");
    let (lines, summary) = scan(cfg).await;
    assert!(lines.is_empty(), "unexpected output: {lines:?}");
    assert_eq!(summary.tasks_done, 1);
    assert_eq!(summary.state, ScanState::Done);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn http_server_is_identified() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();
    tokio::spawn(async move {
        let (mut sock, _) = listener.accept().await.unwrap();
        let mut buf = [0u8; 512];
        let _ = sock.read(&mut buf).await;
        sock.write_all(b"HTTP/1.1 200 OK\r\n\r\n").await.unwrap();
        // Keep the connection until the scanner hangs up.
        while let Ok(n) = sock.read(&mut buf).await {
            if n == 0 {
                break;
            }
        }
    });

    let (lines, summary) = scan(config(port, true, false)).await;
    assert_eq!(lines, vec![format!("TCP {port} HTTP")]);
    assert_eq!(summary.reported, 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn udp_echo_is_open_but_not_ntp() {
    let socket = UdpSocket::bind("127.0.0.1:0").await.unwrap();
    let port = socket.local_addr().unwrap().port();
    tokio::spawn(async move {
        let mut buf = [0u8; 1024];
        while let Ok((n, peer)) = socket.recv_from(&mut buf).await {
            let _ = socket.send_to(&buf[..n], peer).await;
        }
    });

    let (lines, _) = scan(config(port, false, true)).await;
    assert_eq!(lines, vec![format!("UDP {port}")]);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn sntp_server_is_identified_as_ntp() {
    let server = SntpServer::bind("127.0.0.1:0", -3600).await.unwrap();
    let port = server.local_addr().unwrap().port();
    let cancel = CancellationToken::new();
    let handle = tokio::spawn(server.serve(cancel.clone()));

    let (lines, _) = scan(config(port, false, true)).await;
    assert_eq!(lines, vec![format!("UDP {port} NTP")]);

    cancel.cancel();
    handle.await.unwrap().unwrap();
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn tcp_and_udp_on_one_port() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();
    let Ok(udp) = UdpSocket::bind(("127.0.0.1", port)).await else {
        // The UDP side of this port number is taken; nothing to compare against.
        return;
    };
    tokio::spawn(async move {
        let (mut sock, _) = listener.accept().await.unwrap();
        sock.write_all(b"220 mail.example ESMTP ready\r\n").await.unwrap();
        let mut buf = [0u8; 512];
        while let Ok(n) = sock.read(&mut buf).await {
            if n == 0 {
                break;
            }
        }
    });
    tokio::spawn(async move {
        let mut buf = [0u8; 1024];
        let (_, peer) = udp.recv_from(&mut buf).await.unwrap();
        let mut reply = vec![0x13, 0x00, 0x81, 0x81];
        reply.extend_from_slice(&[0u8; 12]);
        udp.send_to(&reply, peer).await.unwrap();
    });

    let (mut lines, summary) = scan(config(port, true, true)).await;
    lines.sort();
    assert_eq!(
        lines,
        vec![format!("TCP {port} SMTP"), format!("UDP {port} DNS")]
    );
    assert_eq!(summary.tasks_total, 2);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn cancellation_mid_scan_reaches_done() {
    let mut cfg = ScanConfig::new("127.0.0.1");
    cfg.start_port = 1;
    cfg.end_port = 65535;
    cfg.workers = 1;
    cfg.timeout = Duration::from_millis(200);
    let scanner = Scanner::new(cfg).unwrap();

    let cancel = CancellationToken::new();
    let trigger = cancel.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(50)).await;
        trigger.cancel();
    });

    let mut out = Vec::new();
    let summary = tokio::time::timeout(
        Duration::from_secs(10),
        scanner.run_with_cancel(&mut out, cancel),
    )
    .await
    .expect("scan stops after cancellation")
    .expect("scan ok");

    assert_eq!(summary.state, ScanState::Done);
    assert!(summary.cancelled);
    assert!(summary.tasks_done < summary.tasks_total);
    let printed = String::from_utf8(out).unwrap().lines().count() as u64;
    assert_eq!(printed, summary.reported);
}
