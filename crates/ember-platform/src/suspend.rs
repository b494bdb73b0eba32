//! Suspend handshake between a platform thread and the render thread.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// How long the waiting sides sleep between polls. Resume latency at this
/// granularity is invisible next to the OS app-switch animation.
const POLL_INTERVAL: Duration = Duration::from_millis(100);

/// A request/acknowledge flag pair for stopping the render thread.
///
/// The platform thread (the activity's UI thread on Android) calls
/// [`request_suspend`](SuspendGate::request_suspend) when the app loses the
/// foreground and blocks until the render thread has flushed GL and parked.
/// The render thread polls [`suspend_requested`](SuspendGate::suspend_requested)
/// at its suspension points, acknowledges, then spins on
/// [`wait_while_suspended`](SuspendGate::wait_while_suspended) until resumed.
#[derive(Debug, Default)]
pub struct SuspendGate {
    suspend_requested: AtomicBool,
    acknowledged: AtomicBool,
}

impl SuspendGate {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Platform side: ask the render thread to park. Blocks until the render
    /// thread acknowledges. Re-entrant requests return immediately.
    pub fn request_suspend(&self) {
        if self.suspend_requested.swap(true, Ordering::SeqCst) {
            return;
        }
        while !self.acknowledged.load(Ordering::SeqCst) {
            std::thread::sleep(POLL_INTERVAL);
        }
    }

    /// Platform side: allow the render thread to run again.
    pub fn request_resume(&self) {
        self.acknowledged.store(false, Ordering::SeqCst);
        self.suspend_requested.store(false, Ordering::SeqCst);
    }

    /// Render side: poll at suspension points.
    pub fn suspend_requested(&self) -> bool {
        self.suspend_requested.load(Ordering::SeqCst)
    }

    /// Render side: signal that GL has been flushed and resources released.
    pub fn acknowledge(&self) {
        self.acknowledged.store(true, Ordering::SeqCst);
    }

    /// Render side: park until the platform clears the request.
    pub fn wait_while_suspended(&self) {
        while self.suspend_requested() {
            std::thread::sleep(POLL_INTERVAL);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn request_blocks_until_acknowledged() {
        let gate = SuspendGate::new();
        let render_side = Arc::clone(&gate);

        let renderer = std::thread::spawn(move || {
            while !render_side.suspend_requested() {
                std::thread::yield_now();
            }
            render_side.acknowledge();
            render_side.wait_while_suspended();
        });

        gate.request_suspend();
        assert!(gate.suspend_requested());
        gate.request_resume();
        renderer.join().unwrap();
        assert!(!gate.suspend_requested());
    }

    #[test]
    fn reentrant_request_is_a_no_op() {
        let gate = SuspendGate::new();
        gate.acknowledge();
        gate.request_suspend();
        // Second request must not deadlock waiting for a second ack.
        gate.request_suspend();
    }
}
