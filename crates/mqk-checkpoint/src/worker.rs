use std::path::PathBuf;
use std::sync::mpsc::{self, Receiver, RecvTimeoutError, SyncSender, TrySendError};
use std::sync::{Arc, Condvar, Mutex};
use std::thread::JoinHandle;
use std::time::Duration;

use mqk_portfolio::PortfolioState;
use mqk_risk::RiskState;

use crate::io::save_atomic;
use crate::types::{CheckpointSnapshot, PortfolioSnapshot, RiskSnapshot};

const QUEUE_CAPACITY: usize = 10;
const WORKER_JOIN_TIMEOUT: Duration = Duration::from_secs(3);

enum Request {
    Save(CheckpointSnapshot),
    Stop,
}

/// Background checkpoint writer. `save_async` enqueues a snapshot and
/// returns immediately; a single worker thread drains the queue and writes
/// atomically to disk. There is no `std::sync::mpsc` equivalent of
/// Python's `queue.Queue.task_done`/`join`, so in-flight work is tracked
/// separately with a `Condvar` so `shutdown` can wait for the queue to
/// drain before joining the thread.
pub struct Checkpointer {
    path: PathBuf,
    sender: SyncSender<Request>,
    in_flight: Arc<(Mutex<usize>, Condvar)>,
    stopped_rx: Receiver<()>,
    handle: Option<JoinHandle<()>>,
}

impl Checkpointer {
    pub fn new(path: PathBuf) -> Self {
        let (tx, rx) = mpsc::sync_channel::<Request>(QUEUE_CAPACITY);
        let (stopped_tx, stopped_rx) = mpsc::channel::<()>();
        let in_flight = Arc::new((Mutex::new(0usize), Condvar::new()));
        let worker_in_flight = Arc::clone(&in_flight);
        let worker_path = path.clone();

        let handle = std::thread::Builder::new()
            .name("mqk-checkpoint-worker".into())
            .spawn(move || {
                Self::run_worker(rx, worker_path, worker_in_flight, stopped_tx);
            })
            .expect("failed to spawn checkpoint worker thread");

        Self {
            path,
            sender: tx,
            in_flight,
            stopped_rx,
            handle: Some(handle),
        }
    }

    fn run_worker(
        rx: Receiver<Request>,
        path: PathBuf,
        in_flight: Arc<(Mutex<usize>, Condvar)>,
        stopped_tx: mpsc::Sender<()>,
    ) {
        while let Ok(request) = rx.recv() {
            match request {
                Request::Save(snapshot) => {
                    if let Err(err) = save_atomic(&path, &snapshot) {
                        tracing::warn!(error = %err, "checkpoint save failed");
                    }
                }
                Request::Stop => {
                    Self::mark_done(&in_flight);
                    break;
                }
            }
            Self::mark_done(&in_flight);
        }
        let _ = stopped_tx.send(());
    }

    fn mark_done(in_flight: &Arc<(Mutex<usize>, Condvar)>) {
        let (lock, cvar) = &**in_flight;
        let mut count = lock.lock().unwrap();
        *count = count.saturating_sub(1);
        if *count == 0 {
            cvar.notify_all();
        }
    }

    fn mark_enqueued(&self) {
        let (lock, _) = &*self.in_flight;
        let mut count = lock.lock().unwrap();
        *count += 1;
    }

    /// Enqueues a checkpoint write. Drops the request with a warning if the
    /// queue is full rather than blocking the caller.
    pub fn save_async(&self, portfolio: &PortfolioState, risk: &RiskState) {
        let snapshot = CheckpointSnapshot {
            portfolio: PortfolioSnapshot::from(portfolio),
            risk: RiskSnapshot::from(risk),
        };
        self.mark_enqueued();
        match self.sender.try_send(Request::Save(snapshot)) {
            Ok(()) => {}
            Err(TrySendError::Full(_)) => {
                Self::mark_done(&self.in_flight);
                tracing::warn!("checkpoint queue full, dropping save request");
            }
            Err(TrySendError::Disconnected(_)) => {
                Self::mark_done(&self.in_flight);
                tracing::warn!("checkpoint worker gone, dropping save request");
            }
        }
    }

    /// Waits for the queue to drain, joins the worker thread (bounded),
    /// then performs one final synchronous save so the very latest state
    /// is always persisted even if the last async save was dropped.
    pub fn shutdown(&mut self, portfolio: &PortfolioState, risk: &RiskState) {
        self.mark_enqueued();
        if self.sender.send(Request::Stop).is_ok() {
            let (lock, cvar) = &*self.in_flight;
            let guard = lock.lock().unwrap();
            let _ = cvar
                .wait_timeout_while(guard, WORKER_JOIN_TIMEOUT, |count| *count > 0)
                .unwrap();
        } else {
            Self::mark_done(&self.in_flight);
        }

        match self.stopped_rx.recv_timeout(WORKER_JOIN_TIMEOUT) {
            Ok(()) => {}
            Err(RecvTimeoutError::Timeout) => {
                tracing::warn!("checkpoint worker did not signal stop within timeout");
            }
            Err(RecvTimeoutError::Disconnected) => {}
        }

        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }

        let snapshot = CheckpointSnapshot {
            portfolio: PortfolioSnapshot::from(portfolio),
            risk: RiskSnapshot::from(risk),
        };
        if let Err(err) = save_atomic(&self.path, &snapshot) {
            tracing::warn!(error = %err, "final checkpoint save on shutdown failed");
        }
    }
}
