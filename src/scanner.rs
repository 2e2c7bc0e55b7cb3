use std::io::Write;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use tokio::task::JoinSet;
use tokio::time;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::config::{ScanConfig, ScanTarget};
use crate::error::ConfigError;
use crate::pool::{spawn_workers, ScanProgress, TaskSource, WorkerContext};
use crate::ports::enumerate_tasks;
use crate::sink::{result_sink, SinkDrain};
use crate::types::{ProbeNonce, ScanState, ScanSummary};

/// How long the controller waits on an empty sink before re-checking the task source.
const DRAIN_POLL: Duration = Duration::from_millis(100);

/// Added to the worst-case probe duration when joining workers.
const JOIN_SLACK: Duration = Duration::from_secs(1);

/// Drives one scan run: Idle -> Running (-> Cancelling) -> Draining -> Done.
///
/// The nonce is generated here and shared by value with the UDP prober and the
/// classifier, so every probe of one run carries the same value.
#[derive(Debug)]
pub struct Scanner {
    target: ScanTarget,
    timeout: Duration,
    workers: usize,
    nonce: ProbeNonce,
    state: ScanState,
}

impl Scanner {
    /// Validate `config`. Fails before any socket is opened.
    pub fn new(config: ScanConfig) -> Result<Self, ConfigError> {
        let target = config.validate()?;
        Ok(Self {
            target,
            timeout: config.timeout,
            workers: config.workers,
            nonce: ProbeNonce::random(),
            state: ScanState::Idle,
        })
    }

    /// Replace the random nonce, e.g. to compare against a captured reply.
    pub fn with_nonce(mut self, nonce: ProbeNonce) -> Self {
        self.nonce = nonce;
        self
    }

    pub fn nonce(&self) -> ProbeNonce {
        self.nonce
    }

    pub fn state(&self) -> ScanState {
        self.state
    }

    pub fn target(&self) -> &ScanTarget {
        &self.target
    }

    /// Scan to completion, writing one line per responding port to `out`.
    pub async fn run<W: Write>(self, out: &mut W) -> Result<ScanSummary> {
        self.run_with_cancel(out, CancellationToken::new()).await
    }

    /// Like [`Scanner::run`], stopping early once `cancel` fires. Probes already in
    /// flight finish (bounded by the timeout) and their results are still written.
    pub async fn run_with_cancel<W: Write>(
        mut self,
        out: &mut W,
        cancel: CancellationToken,
    ) -> Result<ScanSummary> {
        let tasks = enumerate_tasks(self.target.range, self.target.transports);
        let tasks_total = tasks.len() as u64;
        let source = Arc::new(TaskSource::new(tasks));
        let (sink, mut drain) = result_sink();
        let progress = ScanProgress::new();
        let worker_cancel = cancel.child_token();

        info!(
            host = %self.target.host,
            start = self.target.range.start(),
            end = self.target.range.end(),
            tasks = tasks_total,
            workers = self.workers,
            "scan started"
        );
        let mut workers = spawn_workers(
            self.workers,
            WorkerContext {
                host: self.target.host.clone(),
                timeout: self.timeout,
                nonce: self.nonce,
                tasks: source.clone(),
                sink,
                cancel: worker_cancel.clone(),
                progress: progress.clone(),
            },
        );
        self.enter(ScanState::Running);

        let mut write_result = Ok(());
        while !source.is_empty() {
            tokio::select! {
                _ = cancel.cancelled() => break,
                line = time::timeout(DRAIN_POLL, drain.recv()) => match line {
                    Ok(Some(line)) => {
                        write_result = emit(out, &line);
                        if write_result.is_err() {
                            worker_cancel.cancel();
                            break;
                        }
                    }
                    Ok(None) => break,
                    Err(_) => {}
                },
            }
        }

        if cancel.is_cancelled() {
            self.enter(ScanState::Cancelling);
        }
        self.join_workers(&mut workers).await;
        let cancelled = cancel.is_cancelled();
        if cancelled && self.state == ScanState::Running {
            self.enter(ScanState::Cancelling);
        }

        self.enter(ScanState::Draining);
        if write_result.is_ok() {
            write_result = flush_remaining(out, &mut drain);
        }
        self.enter(ScanState::Done);
        write_result.context("failed to write scan results")?;

        let summary = ScanSummary {
            tasks_total,
            tasks_done: progress.tasks_done(),
            reported: progress.reported(),
            cancelled,
            state: self.state,
        };
        info!(
            done = summary.tasks_done,
            total = summary.tasks_total,
            reported = summary.reported,
            cancelled,
            "scan finished"
        );
        Ok(summary)
    }

    // Every probe operation is bounded by the timeout, so a worker is at most three
    // timeouts away from its next cancellation check.
    async fn join_workers(&self, workers: &mut JoinSet<()>) {
        let grace = self.timeout.saturating_mul(3).saturating_add(JOIN_SLACK);
        let joined = time::timeout(grace, async {
            while let Some(res) = workers.join_next().await {
                if let Err(e) = res {
                    warn!(error = %e, "worker ended abnormally");
                }
            }
        })
        .await;
        if joined.is_err() {
            warn!(
                remaining = workers.len(),
                "aborting workers still running after {:?}", grace
            );
            workers.abort_all();
            while workers.join_next().await.is_some() {}
        }
    }

    fn enter(&mut self, next: ScanState) {
        debug!(from = ?self.state, to = ?next, "scan state");
        self.state = next;
    }
}

fn emit<W: Write>(out: &mut W, line: &str) -> std::io::Result<()> {
    writeln!(out, "{line}")
}

fn flush_remaining<W: Write>(out: &mut W, drain: &mut SinkDrain) -> std::io::Result<()> {
    for line in drain.drain() {
        emit(out, &line)?;
    }
    out.flush()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::TransportSelection;

    fn config(start: u32, end: u32) -> ScanConfig {
        let mut cfg = ScanConfig::new("127.0.0.1");
        cfg.start_port = start;
        cfg.end_port = end;
        cfg.workers = 2;
        cfg.timeout = Duration::from_millis(200);
        cfg
    }

    #[test]
    fn new_scanner_is_idle() {
        let scanner = Scanner::new(config(1, 10)).unwrap();
        assert_eq!(scanner.state(), ScanState::Idle);
        assert_eq!(scanner.target().range.port_count(), 10);
    }

    #[test]
    fn invalid_range_fails_before_scanning() {
        let err = Scanner::new(config(10, 1)).unwrap_err();
        assert_eq!(err, ConfigError::InvalidRange { start: 10, end: 1 });
    }

    #[test]
    fn each_scanner_gets_its_own_nonce_unless_pinned() {
        let nonce = ProbeNonce::from_bytes([7; 8]);
        let scanner = Scanner::new(config(1, 1)).unwrap().with_nonce(nonce);
        assert_eq!(scanner.nonce(), nonce);
    }

    #[tokio::test]
    async fn precancelled_scan_reaches_done_without_probing() {
        let mut cfg = config(1, 500);
        cfg.transports = TransportSelection::new(true, true);
        let scanner = Scanner::new(cfg).unwrap();
        let cancel = CancellationToken::new();
        cancel.cancel();

        let mut out = Vec::new();
        let summary = scanner.run_with_cancel(&mut out, cancel).await.unwrap();
        assert_eq!(summary.state, ScanState::Done);
        assert!(summary.cancelled);
        assert_eq!(summary.tasks_total, 1000);
        assert_eq!(summary.tasks_done, 0);
        assert!(out.is_empty());
    }
}
