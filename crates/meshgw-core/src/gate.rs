//! Write-once readiness signal
//!
//! The gate starts unset and is flipped exactly once, after every task of
//! the daemon is running. Handlers read it on every message, so reads are a
//! single atomic load.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tokio::sync::Notify;

#[derive(Debug, Default)]
struct GateInner {
    set: AtomicBool,
    notify: Notify,
}

/// Process-wide readiness gate; clones share the same flag
#[derive(Debug, Clone, Default)]
pub struct ReadinessGate {
    inner: Arc<GateInner>,
}

impl ReadinessGate {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_set(&self) -> bool {
        self.inner.set.load(Ordering::Acquire)
    }

    /// Set the gate. Returns `true` only for the call that flipped it.
    pub fn set(&self) -> bool {
        let first = !self.inner.set.swap(true, Ordering::AcqRel);
        if first {
            self.inner.notify.notify_waiters();
        }
        first
    }

    /// Wait until the gate is set
    pub async fn wait(&self) {
        loop {
            let notified = self.inner.notify.notified();
            if self.is_set() {
                return;
            }
            notified.await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_gate_starts_unset() {
        let gate = ReadinessGate::new();
        assert!(!gate.is_set());
    }

    #[test]
    fn test_gate_is_write_once() {
        let gate = ReadinessGate::new();
        assert!(gate.set());
        assert!(!gate.set());
        assert!(gate.is_set());
    }

    #[test]
    fn test_gate_clones_share_state() {
        let gate = ReadinessGate::new();
        let other = gate.clone();
        gate.set();
        assert!(other.is_set());
    }

    #[tokio::test]
    async fn test_gate_wait_wakes_on_set() {
        let gate = ReadinessGate::new();
        let waiter = {
            let gate = gate.clone();
            tokio::spawn(async move { gate.wait().await })
        };

        tokio::time::sleep(Duration::from_millis(10)).await;
        gate.set();

        tokio::time::timeout(Duration::from_secs(1), waiter)
            .await
            .expect("waiter should wake")
            .unwrap();
    }

    #[test]
    fn test_gate_wait_pending_until_set() {
        let gate = ReadinessGate::new();
        let mut wait = tokio_test::task::spawn(gate.wait());

        tokio_test::assert_pending!(wait.poll());
        gate.set();
        assert!(wait.is_woken());
        tokio_test::assert_ready!(wait.poll());
    }

    #[tokio::test]
    async fn test_gate_wait_returns_when_already_set() {
        let gate = ReadinessGate::new();
        gate.set();
        tokio::time::timeout(Duration::from_millis(100), gate.wait())
            .await
            .expect("already set gate should not block");
    }
}
