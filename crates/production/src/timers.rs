//! Timer management for the production runner.
//!
//! Each armed timer is a tokio task that sleeps and then sends the timer's
//! event to the runner's dedicated timer channel. The state machine never
//! sees the task; it only asks for timers via `SetTimer`/`CancelTimer`.

use canopy_core::{Event, TimerId};
use std::collections::HashMap;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, trace};

/// Manages armed timers for one replica.
pub struct TimerManager {
    /// Active timers (id -> task handle).
    timers: HashMap<TimerId, JoinHandle<()>>,
    /// Sender for timer fires.
    event_tx: mpsc::Sender<Event>,
}

impl TimerManager {
    /// Create a new timer manager.
    pub fn new(event_tx: mpsc::Sender<Event>) -> Self {
        Self {
            timers: HashMap::new(),
            event_tx,
        }
    }

    /// Arm a timer that fires after `duration`.
    ///
    /// Re-arming an id replaces the previous timer.
    pub fn set_timer(&mut self, id: TimerId, duration: Duration) {
        self.cancel_timer(id);

        let event_tx = self.event_tx.clone();
        let handle = tokio::spawn(async move {
            tokio::time::sleep(duration).await;
            trace!(timer = ?id, "Timer fired");
            // Runner gone: nothing left to notify.
            let _ = event_tx.send(id.into_event()).await;
        });

        self.timers.insert(id, handle);
        debug!(timer = ?id, ?duration, "Timer set");
    }

    /// Disarm a timer. No-op if it is not armed or already fired.
    pub fn cancel_timer(&mut self, id: TimerId) {
        if let Some(handle) = self.timers.remove(&id) {
            handle.abort();
            trace!(timer = ?id, "Timer cancelled");
        }
    }

    /// Disarm every timer.
    pub fn cancel_all(&mut self) {
        for (id, handle) in self.timers.drain() {
            handle.abort();
            trace!(timer = ?id, "Timer cancelled (shutdown)");
        }
    }

    /// Number of armed timers, including ones that fired but were never cancelled.
    pub fn active_count(&self) -> usize {
        self.timers.len()
    }
}

impl Drop for TimerManager {
    fn drop(&mut self) {
        self.cancel_all();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use canopy_types::View;

    #[tokio::test]
    async fn test_timer_fires_view_event() {
        let (event_tx, mut event_rx) = mpsc::channel(10);
        let mut manager = TimerManager::new(event_tx);

        manager.set_timer(TimerId::View(View(3)), Duration::from_millis(10));

        let event = tokio::time::timeout(Duration::from_millis(200), event_rx.recv())
            .await
            .expect("timeout")
            .expect("channel closed");
        assert_eq!(event, Event::ViewTimer { view: View(3) });
    }

    #[tokio::test]
    async fn test_timer_cancel() {
        let (event_tx, mut event_rx) = mpsc::channel(10);
        let mut manager = TimerManager::new(event_tx);

        let id = TimerId::View(View(1));
        manager.set_timer(id, Duration::from_millis(30));
        manager.cancel_timer(id);
        assert_eq!(manager.active_count(), 0);

        let result = tokio::time::timeout(Duration::from_millis(100), event_rx.recv()).await;
        assert!(result.is_err(), "Timer should have been cancelled");
    }

    #[tokio::test]
    async fn test_rearm_replaces_timer() {
        let (event_tx, mut event_rx) = mpsc::channel(10);
        let mut manager = TimerManager::new(event_tx);

        let id = TimerId::View(View(2));
        manager.set_timer(id, Duration::from_secs(10));
        manager.set_timer(id, Duration::from_millis(10));
        assert_eq!(manager.active_count(), 1);

        let event = tokio::time::timeout(Duration::from_millis(200), event_rx.recv())
            .await
            .expect("timeout - replacement timer didn't fire")
            .expect("channel closed");
        assert_eq!(event, Event::ViewTimer { view: View(2) });
    }

    #[tokio::test]
    async fn test_views_are_independent_timers() {
        let (event_tx, mut event_rx) = mpsc::channel(10);
        let mut manager = TimerManager::new(event_tx);

        manager.set_timer(TimerId::View(View(1)), Duration::from_millis(50));
        manager.set_timer(TimerId::View(View(2)), Duration::from_millis(50));
        assert_eq!(manager.active_count(), 2);

        manager.cancel_all();
        assert_eq!(manager.active_count(), 0);

        let result = tokio::time::timeout(Duration::from_millis(120), event_rx.recv()).await;
        assert!(result.is_err(), "No timers should have fired");
    }
}
