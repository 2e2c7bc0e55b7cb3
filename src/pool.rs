use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, instrument};

use crate::sink::ResultSink;
use crate::tcp::probe_tcp;
use crate::types::{ProbeNonce, ProbeTask, Transport};
use crate::udp::probe_udp;

/// Pending tasks shared by all workers. Taking never waits: an empty source means
/// there is nothing left to do.
#[derive(Debug, Default)]
pub struct TaskSource {
    queue: Mutex<VecDeque<ProbeTask>>,
}

impl TaskSource {
    pub fn new(tasks: Vec<ProbeTask>) -> Self {
        Self {
            queue: Mutex::new(tasks.into()),
        }
    }

    /// Hand out one task to exactly one caller.
    pub fn take(&self) -> Option<ProbeTask> {
        self.queue
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .pop_front()
    }

    pub fn remaining(&self) -> usize {
        self.queue.lock().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn is_empty(&self) -> bool {
        self.remaining() == 0
    }
}

/// Counters shared between workers and the controller.
#[derive(Clone, Debug, Default)]
pub struct ScanProgress {
    pub tasks_done: Arc<AtomicU64>,
    pub reported: Arc<AtomicU64>,
}

impl ScanProgress {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn tasks_done(&self) -> u64 {
        self.tasks_done.load(Ordering::Relaxed)
    }

    pub fn reported(&self) -> u64 {
        self.reported.load(Ordering::Relaxed)
    }
}

/// Everything a worker needs for one run.
#[derive(Debug)]
pub struct WorkerContext {
    pub host: String,
    pub timeout: Duration,
    pub nonce: ProbeNonce,
    pub tasks: Arc<TaskSource>,
    pub sink: ResultSink,
    pub cancel: CancellationToken,
    pub progress: ScanProgress,
}

/// Start `count` workers. The context (and with it the sink writer) is dropped once
/// the last worker exits, which closes the sink.
pub fn spawn_workers(count: usize, ctx: WorkerContext) -> JoinSet<()> {
    let ctx = Arc::new(ctx);
    let mut set = JoinSet::new();
    for id in 0..count.max(1) {
        set.spawn(run_worker(id, ctx.clone()));
    }
    set
}

#[instrument(level = "trace", skip(ctx))]
async fn run_worker(id: usize, ctx: Arc<WorkerContext>) {
    let mut handled = 0u64;
    while !ctx.cancel.is_cancelled() {
        let Some(task) = ctx.tasks.take() else {
            break;
        };
        let outcome = match task.transport {
            Transport::Tcp => probe_tcp(&ctx.host, task.port, ctx.timeout, &ctx.nonce).await,
            Transport::Udp => probe_udp(&ctx.host, task.port, ctx.timeout, &ctx.nonce).await,
        };
        handled += 1;
        ctx.progress.tasks_done.fetch_add(1, Ordering::Relaxed);

        if let Some(outcome) = outcome {
            ctx.progress.reported.fetch_add(1, Ordering::Relaxed);
            if !ctx.sink.push(outcome.to_string()) {
                debug!(worker = id, "result sink closed");
                break;
            }
        }
    }
    debug!(
        worker = id,
        handled,
        cancelled = ctx.cancel.is_cancelled(),
        "worker finished"
    );
}
