//! Unordered collection of formatted result lines: written by every worker, drained
//! by the scan controller alone. Each line is handed out exactly once.
use tokio::sync::mpsc;

/// Writer half, cloned into every worker.
#[derive(Debug, Clone)]
pub struct ResultSink {
    tx: mpsc::UnboundedSender<String>,
}

/// Reader half, owned by the controller.
#[derive(Debug)]
pub struct SinkDrain {
    rx: mpsc::UnboundedReceiver<String>,
}

pub fn result_sink() -> (ResultSink, SinkDrain) {
    let (tx, rx) = mpsc::unbounded_channel();
    (ResultSink { tx }, SinkDrain { rx })
}

impl ResultSink {
    /// Append a line. Returns `false` once the drain side is gone.
    pub fn push(&self, line: String) -> bool {
        self.tx.send(line).is_ok()
    }
}

impl SinkDrain {
    /// Wait for the next line. `None` once every writer is dropped and nothing is left.
    pub async fn recv(&mut self) -> Option<String> {
        self.rx.recv().await
    }

    /// Take a line if one is ready, without waiting.
    pub fn try_next(&mut self) -> Option<String> {
        self.rx.try_recv().ok()
    }

    /// Take every line that is ready right now.
    pub fn drain(&mut self) -> Vec<String> {
        std::iter::from_fn(|| self.try_next()).collect()
    }
}
