//! Cancellable deadline timers and the call-duration ticker
//!
//! Every deadline is a first-class handle keyed to the operation that
//! created it; only that operation, or the global cleanup, cancels it. A
//! fired timer delivers its key back to the control loop, which checks the
//! pending-operation slot before acting, so a timer racing a terminal leg
//! notification resolves exactly once.

use crate::domain::shared::value_objects::LegId;
use std::collections::HashMap;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::AbortHandle;
use tracing::debug;

/// Identifies the pending operation a timer guards.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum TimerKey {
    /// Participant dial waiting for an answer.
    ParticipantAnswer(LegId),
    /// Transfer candidate waiting for an answer.
    TransferAnswer(LegId),
    /// Grace period between a remote hangup and forced cleanup.
    EndGrace,
    /// One-second duration tick.
    DurationTick,
}

pub struct TimerManager {
    tx: mpsc::UnboundedSender<TimerKey>,
    deadlines: HashMap<TimerKey, AbortHandle>,
    ticker: Option<AbortHandle>,
}

impl TimerManager {
    /// Create a manager plus the receiver the control loop selects on.
    pub fn new() -> (Self, mpsc::UnboundedReceiver<TimerKey>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (
            Self {
                tx,
                deadlines: HashMap::new(),
                ticker: None,
            },
            rx,
        )
    }

    /// Arm a deadline. Re-arming the same key replaces the old timer.
    pub fn arm(&mut self, key: TimerKey, after: Duration) {
        self.cancel(&key);
        let tx = self.tx.clone();
        let fired_key = key.clone();
        let handle = tokio::spawn(async move {
            tokio::time::sleep(after).await;
            let _ = tx.send(fired_key);
        });
        debug!("armed timer {:?} for {:?}", key, after);
        self.deadlines.insert(key, handle.abort_handle());
    }

    /// Cancel a deadline. Returns whether it was still armed.
    pub fn cancel(&mut self, key: &TimerKey) -> bool {
        if let Some(handle) = self.deadlines.remove(key) {
            handle.abort();
            debug!("cancelled timer {:?}", key);
            true
        } else {
            false
        }
    }

    /// Retire a delivered firing so the map only tracks live deadlines.
    pub fn acknowledge(&mut self, key: &TimerKey) {
        if self.deadlines.remove(key).is_some() {
            debug!("timer {:?} retired after firing", key);
        }
    }

    pub fn is_armed(&self, key: &TimerKey) -> bool {
        self.deadlines.contains_key(key)
    }

    /// Start the 1 s duration ticker if it is not already running.
    pub fn start_ticker(&mut self) {
        if self.ticker.is_some() {
            return;
        }
        let tx = self.tx.clone();
        let handle = tokio::spawn(async move {
            let mut interval = tokio::time::interval(Duration::from_secs(1));
            // The first tick completes immediately; skip it.
            interval.tick().await;
            loop {
                interval.tick().await;
                if tx.send(TimerKey::DurationTick).is_err() {
                    break;
                }
            }
        });
        self.ticker = Some(handle.abort_handle());
    }

    pub fn stop_ticker(&mut self) {
        if let Some(handle) = self.ticker.take() {
            handle.abort();
        }
    }

    pub fn ticker_running(&self) -> bool {
        self.ticker.is_some()
    }

    /// Cancel every deadline and the ticker. The unified cleanup path.
    pub fn cancel_all(&mut self) {
        for (key, handle) in self.deadlines.drain() {
            debug!("cancelled timer {:?} during cleanup", key);
            handle.abort();
        }
        self.stop_ticker();
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

    #[tokio::test(start_paused = true)]
    async fn test_armed_timer_fires() {
        let (mut timers, mut rx) = TimerManager::new();
        let key = TimerKey::ParticipantAnswer(LegId::new("leg-1"));
        timers.arm(key.clone(), Duration::from_secs(45));

        let fired = rx.recv().await.unwrap();
        assert_eq!(fired, key);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancelled_timer_does_not_fire() {
        let (mut timers, mut rx) = TimerManager::new();
        let key = TimerKey::TransferAnswer(LegId::new("leg-2"));
        timers.arm(key.clone(), Duration::from_secs(30));
        assert!(timers.cancel(&key));
        assert!(!timers.is_armed(&key));

        tokio::time::sleep(Duration::from_secs(31)).await;
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn test_acknowledge_retires_fired_deadline() {
        let (mut timers, mut rx) = TimerManager::new();
        let key = TimerKey::ParticipantAnswer(LegId::new("leg-7"));
        timers.arm(key.clone(), Duration::from_secs(45));

        let fired = rx.recv().await.unwrap();
        timers.acknowledge(&fired);
        assert!(!timers.is_armed(&fired));
        // A retired key has nothing left to cancel.
        assert!(!timers.cancel(&fired));
    }

    #[tokio::test(start_paused = true)]
    async fn test_rearm_replaces_deadline() {
        let (mut timers, mut rx) = TimerManager::new();
        let key = TimerKey::EndGrace;
        timers.arm(key.clone(), Duration::from_secs(2));
        timers.arm(key.clone(), Duration::from_secs(10));

        tokio::time::sleep(Duration::from_secs(3)).await;
        assert!(rx.try_recv().is_err());

        tokio::time::sleep(Duration::from_secs(8)).await;
        assert_eq!(rx.recv().await.unwrap(), key);
    }

    #[tokio::test(start_paused = true)]
    async fn test_ticker_ticks_every_second() {
        let (mut timers, mut rx) = TimerManager::new();
        timers.start_ticker();
        assert!(timers.ticker_running());

        tokio::time::sleep(Duration::from_millis(3500)).await;
        let mut ticks = 0;
        while rx.try_recv().is_ok() {
            ticks += 1;
        }
        assert_eq!(ticks, 3);

        timers.stop_ticker();
        assert!(!timers.ticker_running());
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_all_clears_everything() {
        let (mut timers, mut rx) = TimerManager::new();
        timers.arm(
            TimerKey::ParticipantAnswer(LegId::new("leg-1")),
            Duration::from_secs(45),
        );
        timers.arm(
            TimerKey::TransferAnswer(LegId::new("leg-2")),
            Duration::from_secs(30),
        );
        timers.start_ticker();

        timers.cancel_all();
        assert!(!timers.ticker_running());

        tokio::time::sleep(Duration::from_secs(60)).await;
        assert!(rx.try_recv().is_err());
    }
}
