//! Memory Pressure Signal
//!
//! An explicit, cloneable "system is low on memory" signal. Caches subscribe
//! to it and purge their memory tier when it fires; the disk tier is untouched.

use tokio::runtime::Handle;
use tokio::sync::broadcast::{self, error::RecvError};
use tokio::task::JoinHandle;
use tracing::debug;

const SIGNAL_CAPACITY: usize = 16;

// == Memory Pressure ==
/// Broadcast point for low-memory notifications.
#[derive(Debug, Clone)]
pub struct MemoryPressure {
    tx: broadcast::Sender<()>,
}

impl MemoryPressure {
    pub fn new() -> Self {
        let (tx, _) = broadcast::channel(SIGNAL_CAPACITY);
        Self { tx }
    }

    /// Fires the signal. Returns the number of live subscribers notified.
    pub fn notify(&self) -> usize {
        self.tx.send(()).unwrap_or(0)
    }

    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }

    pub(crate) fn listen(&self) -> broadcast::Receiver<()> {
        self.tx.subscribe()
    }
}

impl Default for MemoryPressure {
    fn default() -> Self {
        Self::new()
    }
}

// == Subscription ==
/// A live subscription. Dropping it unsubscribes.
#[derive(Debug)]
pub struct PressureSubscription {
    handle: JoinHandle<()>,
}

impl PressureSubscription {
    /// Stops reacting to the signal.
    pub fn unsubscribe(self) {}

    /// False once the listener stopped (unsubscribed, signal dropped, or the
    /// cache it served was dropped).
    pub fn is_active(&self) -> bool {
        !self.handle.is_finished()
    }
}

impl Drop for PressureSubscription {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

/// Runs `on_pressure` for every notification until it returns false or the
/// signal is dropped.
pub(crate) fn spawn_pressure_listener<F>(
    runtime: &Handle,
    mut rx: broadcast::Receiver<()>,
    mut on_pressure: F,
) -> PressureSubscription
where
    F: FnMut() -> bool + Send + 'static,
{
    let handle = runtime.spawn(async move {
        loop {
            match rx.recv().await {
                // Missed notifications collapse into one purge
                Ok(()) | Err(RecvError::Lagged(_)) => {
                    if !on_pressure() {
                        debug!("Memory pressure listener target dropped");
                        break;
                    }
                }
                Err(RecvError::Closed) => break,
            }
        }
    });
    PressureSubscription { handle }
}
