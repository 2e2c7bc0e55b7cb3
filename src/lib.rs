//! Library crate for proto-scan-rs: TCP/UDP port probing with passive protocol fingerprinting.
pub mod classify;
pub mod config;
pub mod error;
pub mod logging;
pub mod pool;
pub mod ports;
pub mod scanner;
pub mod sink;
pub mod sntp;
pub mod tcp;
pub mod types;
pub mod udp;
