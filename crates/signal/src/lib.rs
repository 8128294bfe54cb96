//! Observable connectivity flag.
//!
//! An explicitly constructed, injectable service — not a process-wide
//! global — so tests can flip connectivity without leaking state across
//! each other. The flag itself is dumb: whoever integrates with a
//! platform connectivity source feeds [`NetworkStatus::set_online`]
//! (directly, or through [`NetworkStatus::monitor`] and an async probe),
//! and the sync engine reacts to the transitions.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::debug;

/// Process connectivity state, observable and cheap to clone.
///
/// Clones share the same underlying flag; a transition published through
/// any clone reaches every subscriber.
#[derive(Debug, Clone)]
pub struct NetworkStatus {
    shared: Arc<watch::Sender<bool>>,
}

impl NetworkStatus {
    pub fn new(initially_online: bool) -> Self {
        let (tx, _) = watch::channel(initially_online);
        Self { shared: Arc::new(tx) }
    }

    /// Synchronous snapshot of the current state.
    pub fn is_online(&self) -> bool {
        *self.shared.borrow()
    }

    /// Publish a connectivity change. Subscribers are only notified on an
    /// actual transition; setting the current value again is a no-op.
    pub fn set_online(&self, online: bool) {
        let changed = self.shared.send_if_modified(|state| {
            let transition = *state != online;
            *state = online;
            transition
        });
        if changed {
            debug!(online, "connectivity transition");
        }
    }

    /// A receiver for select-style consumers. The orchestrator uses this
    /// rather than a callback so its replay task owns its own loop.
    pub fn changes(&self) -> watch::Receiver<bool> {
        self.shared.subscribe()
    }

    /// Register a callback, immediately invoked with the current state
    /// and then on every transition.
    ///
    /// Rapid flaps may coalesce: the callback always observes the latest
    /// state, but an offline→online→offline bounce faster than the
    /// subscriber task gets scheduled delivers a single notification.
    ///
    /// Must be called within a tokio runtime. The returned guard detaches
    /// the callback on [`unsubscribe`](Subscription::unsubscribe) or drop.
    pub fn subscribe<F>(&self, mut callback: F) -> Subscription
    where
        F: FnMut(bool) + Send + 'static,
    {
        let mut rx = self.shared.subscribe();
        callback(*rx.borrow_and_update());
        let handle = tokio::spawn(async move {
            while rx.changed().await.is_ok() {
                callback(*rx.borrow_and_update());
            }
        });
        Subscription { handle }
    }

    /// Drive the flag from a periodic async reachability probe.
    ///
    /// This is the seam where a platform connectivity source plugs in
    /// without this crate owning any platform code. The probe stops when
    /// the guard is dropped.
    pub fn monitor<F, Fut>(&self, period: Duration, probe: F) -> Subscription
    where
        F: Fn() -> Fut + Send + 'static,
        Fut: Future<Output = bool> + Send,
    {
        let status = self.clone();
        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
            loop {
                ticker.tick().await;
                status.set_online(probe().await);
            }
        });
        Subscription { handle }
    }
}

/// Detaches a subscription or monitor when dropped.
#[must_use = "dropping the subscription detaches the callback immediately"]
#[derive(Debug)]
pub struct Subscription {
    handle: JoinHandle<()>,
}

impl Subscription {
    /// Explicitly detach. Equivalent to dropping the guard.
    pub fn unsubscribe(self) {
        self.handle.abort();
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    fn record() -> (Arc<Mutex<Vec<bool>>>, impl FnMut(bool) + Send + 'static) {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        (seen, move |online| sink.lock().unwrap().push(online))
    }

    #[tokio::test]
    async fn test_subscribe_invokes_immediately() {
        let status = NetworkStatus::new(true);
        let (seen, callback) = record();
        let _guard = status.subscribe(callback);
        assert_eq!(*seen.lock().unwrap(), vec![true]);
    }

    #[tokio::test]
    async fn test_transitions_notify_subscribers() {
        let status = NetworkStatus::new(false);
        let (seen, callback) = record();
        let _guard = status.subscribe(callback);
        // Yield between transitions so the subscriber observes each one
        // rather than coalescing the flap into a single notification.
        status.set_online(true);
        tokio::time::sleep(Duration::from_millis(50)).await;
        status.set_online(false);
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(*seen.lock().unwrap(), vec![false, true, false]);
    }

    #[tokio::test]
    async fn test_setting_same_state_does_not_notify() {
        let status = NetworkStatus::new(true);
        let (seen, callback) = record();
        let _guard = status.subscribe(callback);
        status.set_online(true);
        status.set_online(true);
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(*seen.lock().unwrap(), vec![true]);
    }

    #[tokio::test]
    async fn test_unsubscribe_detaches() {
        let status = NetworkStatus::new(false);
        let (seen, callback) = record();
        let guard = status.subscribe(callback);
        guard.unsubscribe();
        status.set_online(true);
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(*seen.lock().unwrap(), vec![false]);
        assert!(status.is_online());
    }

    #[tokio::test]
    async fn test_clones_share_state() {
        let status = NetworkStatus::new(false);
        let clone = status.clone();
        clone.set_online(true);
        assert!(status.is_online());
    }

    #[tokio::test(start_paused = true)]
    async fn test_monitor_drives_flag_from_probe() {
        let status = NetworkStatus::new(false);
        let _guard = status.monitor(Duration::from_secs(5), || async { true });
        // First tick fires immediately; advancing virtual time lets it run.
        tokio::time::sleep(Duration::from_millis(10)).await;
        assert!(status.is_online());
    }
}
