//! Viewport event debouncing
//!
//! Camera events arrive in bursts while the user drags or zooms. [`Debouncer`] keeps one pending
//! timer task: every new value aborts it and starts a fresh one, so a value is only released
//! once the stream has been quiet for the whole settling window, and it is always the latest.

use std::sync::{Mutex, PoisonError};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

/// Coalesces rapid values into a single delayed delivery of the last one
///
/// Values come out of the receiver returned by [`Debouncer::new`]. Dropping the debouncer
/// cancels any pending delivery and closes the receiver.
pub struct Debouncer<T> {
    window: Duration,
    sink: mpsc::UnboundedSender<T>,
    pending: Mutex<Option<JoinHandle<()>>>,
}

impl<T: Send + 'static> Debouncer<T> {
    pub fn new(window: Duration) -> (Self, mpsc::UnboundedReceiver<T>) {
        let (sink, rx) = mpsc::unbounded_channel();
        (
            Self {
                window,
                sink,
                pending: Mutex::new(None),
            },
            rx,
        )
    }

    #[inline]
    pub fn window(&self) -> Duration {
        self.window
    }

    /// Schedule `value` for delivery after the settling window
    ///
    /// Replaces any value still waiting. Must be called from within a Tokio runtime.
    pub fn schedule(&self, value: T) {
        let sink = self.sink.clone();
        let window = self.window;

        let mut pending = self.pending.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(previous) = pending.take() {
            previous.abort();
        }
        *pending = Some(tokio::spawn(async move {
            tokio::time::sleep(window).await;
            // Receiver gone means the session shut down
            let _ = sink.send(value);
        }));
    }

    /// Drop the waiting value, if any. Returns whether one was waiting.
    pub fn cancel(&self) -> bool {
        let mut pending = self.pending.lock().unwrap_or_else(PoisonError::into_inner);
        match pending.take() {
            Some(handle) if !handle.is_finished() => {
                handle.abort();
                true
            }
            _ => false,
        }
    }

    /// Whether a value is waiting for its window to elapse
    pub fn is_pending(&self) -> bool {
        self.pending
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .as_ref()
            .is_some_and(|handle| !handle.is_finished())
    }
}

impl<T> Drop for Debouncer<T> {
    fn drop(&mut self) {
        let pending = self.pending.get_mut().unwrap_or_else(PoisonError::into_inner);
        if let Some(handle) = pending.take() {
            handle.abort();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::time::{Instant, sleep, timeout};

    #[tokio::test(start_paused = true)]
    async fn test_burst_delivers_last_value_once() {
        let (debouncer, mut rx) = Debouncer::new(Duration::from_millis(200));
        let start = Instant::now();

        for i in 1..=5 {
            debouncer.schedule(i);
            sleep(Duration::from_millis(50)).await;
        }

        assert_eq!(rx.recv().await, Some(5));
        // Last event at 200 ms, window 200 ms
        assert_eq!(start.elapsed(), Duration::from_millis(400));

        let nothing_more = timeout(Duration::from_secs(5), rx.recv()).await;
        assert!(nothing_more.is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn test_spaced_events_each_deliver() {
        let (debouncer, mut rx) = Debouncer::new(Duration::from_millis(200));

        debouncer.schedule("a");
        sleep(Duration::from_millis(300)).await;
        debouncer.schedule("b");

        assert_eq!(rx.recv().await, Some("a"));
        assert_eq!(rx.recv().await, Some("b"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_drops_pending_value() {
        let (debouncer, mut rx) = Debouncer::new(Duration::from_millis(200));

        debouncer.schedule(1);
        assert!(debouncer.is_pending());
        assert!(debouncer.cancel());
        assert!(!debouncer.is_pending());
        assert!(!debouncer.cancel());

        let result = timeout(Duration::from_secs(1), rx.recv()).await;
        assert!(result.is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn test_drop_closes_channel() {
        let (debouncer, mut rx) = Debouncer::new(Duration::from_millis(200));
        debouncer.schedule(1);
        drop(debouncer);

        assert_eq!(rx.recv().await, None);
    }
}
