//! Background thread that drains queued insertions into the rope.
//!
//! The worker polls the insertion queue: while it is non-empty the worker drains it under the
//! buffer's apply lock; while it is empty the worker blocks on the shutdown channel for at most
//! [`crate::BufferConfig::idle_interval`]. Dropping the shutdown sender stops the loop.

use crate::buffer::BufferState;
use crate::config::BufferConfig;
use crossbeam_channel::{Receiver, RecvTimeoutError, Sender, TryRecvError};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;
use tracing::{debug, warn};

/// Handle to a running drain worker.
pub(crate) struct DrainWorker {
    shutdown_tx: Sender<()>,
    handle: JoinHandle<()>,
}

impl DrainWorker {
    /// Spawns the worker thread.
    ///
    /// Returns `None` if the thread could not be created. The buffer stays correct without a
    /// worker because every read drains the queue itself; inserts just land later.
    pub(crate) fn spawn(state: Arc<BufferState>, config: &BufferConfig) -> Option<Self> {
        let (shutdown_tx, shutdown_rx) = crossbeam_channel::bounded(1);
        let idle = config.idle_interval;

        let spawned = thread::Builder::new()
            .name(config.worker_name.clone())
            .spawn(move || run(&state, &shutdown_rx, idle));

        match spawned {
            Ok(handle) => Some(Self {
                shutdown_tx,
                handle,
            }),
            Err(err) => {
                warn!(
                    error = %err,
                    worker = config.worker_name.as_str(),
                    "failed to spawn drain worker; insertions will be applied on read"
                );
                None
            }
        }
    }

    /// Signals the worker to stop and waits for it to exit.
    pub(crate) fn stop(self) {
        let Self {
            shutdown_tx,
            handle,
        } = self;
        drop(shutdown_tx);
        if handle.join().is_err() {
            warn!("drain worker panicked before shutdown");
        }
    }
}

fn run(state: &BufferState, shutdown: &Receiver<()>, idle: Duration) {
    debug!(?idle, "drain worker started");

    loop {
        if !matches!(shutdown.try_recv(), Err(TryRecvError::Empty)) {
            break;
        }
        if state.has_pending() {
            state.drain();
            continue;
        }
        match shutdown.recv_timeout(idle) {
            Err(RecvTimeoutError::Timeout) => {}
            Ok(()) | Err(RecvTimeoutError::Disconnected) => break,
        }
    }

    debug!("drain worker stopped");
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Instant;

    fn wait_until(timeout: Duration, mut done: impl FnMut() -> bool) -> bool {
        let deadline = Instant::now() + timeout;
        while Instant::now() < deadline {
            if done() {
                return true;
            }
            thread::sleep(Duration::from_millis(1));
        }
        done()
    }

    #[test]
    fn test_worker_applies_queued_insertions() {
        let state = Arc::new(BufferState::new("ac"));
        let worker = DrainWorker::spawn(Arc::clone(&state), &BufferConfig::default())
            .expect("spawn worker");

        state.enqueue(1, "b");
        assert!(wait_until(Duration::from_secs(5), || state.pending_len() == 0));
        assert_eq!(state.applied_text(), "abc");

        worker.stop();
    }

    #[test]
    fn test_worker_stops_promptly_with_long_idle_interval() {
        let state = Arc::new(BufferState::new(""));
        let config = BufferConfig::default().with_idle_interval(Duration::from_secs(60));
        let worker = DrainWorker::spawn(Arc::clone(&state), &config).expect("spawn worker");

        let started = Instant::now();
        worker.stop();
        assert!(started.elapsed() < Duration::from_secs(30));
    }
}
