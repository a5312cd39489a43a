use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::sync::{broadcast, watch};
use tracing::{debug, info, warn};

use vara_proto::protocol::{Notification, Severity};

const HISTORY_LEN: usize = 20;
/// A message identical to one of the last few is not repeated.
const DEDUP_WINDOW: usize = 3;

/// Publish/subscribe channel for user-facing notifications.
#[derive(Clone)]
pub struct Notifier {
    tx: broadcast::Sender<Notification>,
    history: Arc<Mutex<VecDeque<Notification>>>,
}

impl Default for Notifier {
    fn default() -> Self {
        Self::new()
    }
}

impl Notifier {
    pub fn new() -> Self {
        let (tx, _) = broadcast::channel(64);
        Self {
            tx,
            history: Arc::new(Mutex::new(VecDeque::with_capacity(HISTORY_LEN))),
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<Notification> {
        self.tx.subscribe()
    }

    /// Returns false when the message was collapsed into a recent duplicate.
    pub fn publish(&self, severity: Severity, message: impl Into<String>) -> bool {
        let note = Notification {
            severity,
            message: message.into(),
        };

        {
            let mut history = self.history.lock().unwrap_or_else(|e| e.into_inner());
            if history.iter().rev().take(DEDUP_WINDOW).any(|n| *n == note) {
                debug!("notify: duplicate collapsed: {}", note.message);
                return false;
            }
            if history.len() == HISTORY_LEN {
                history.pop_front();
            }
            history.push_back(note.clone());
        }

        info!(severity = ?note.severity, "notify: {}", note.message);
        // no subscribers is fine
        let _ = self.tx.send(note);
        true
    }

    pub fn publish_note(&self, note: Notification) -> bool {
        self.publish(note.severity, note.message)
    }

    pub fn info(&self, message: impl Into<String>) -> bool {
        self.publish(Severity::Info, message)
    }

    pub fn success(&self, message: impl Into<String>) -> bool {
        self.publish(Severity::Success, message)
    }

    pub fn warning(&self, message: impl Into<String>) -> bool {
        self.publish(Severity::Warning, message)
    }

    pub fn error(&self, message: impl Into<String>) -> bool {
        self.publish(Severity::Error, message)
    }

    pub fn history(&self) -> Vec<Notification> {
        self.history
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .iter()
            .cloned()
            .collect()
    }
}

/// Global loading overlay with a safety auto-hide.
///
/// Each `show` arms a timer that hides the overlay if no `hide` arrives in
/// time. Any later `show` or `hide` bumps the generation so older timers
/// do nothing.
#[derive(Clone)]
pub struct LoaderOverlay {
    visible: Arc<watch::Sender<bool>>,
    generation: Arc<AtomicU64>,
    safety: Duration,
}

impl LoaderOverlay {
    pub fn new(safety: Duration) -> Self {
        let (tx, _) = watch::channel(false);
        Self {
            visible: Arc::new(tx),
            generation: Arc::new(AtomicU64::new(0)),
            safety,
        }
    }

    pub fn subscribe(&self) -> watch::Receiver<bool> {
        self.visible.subscribe()
    }

    pub fn is_visible(&self) -> bool {
        *self.visible.borrow()
    }

    pub fn show(&self, reason: &str) {
        let gen = self.generation.fetch_add(1, Ordering::AcqRel) + 1;
        debug!(gen, "overlay: show ({})", reason);
        self.visible.send_replace(true);

        let visible = Arc::clone(&self.visible);
        let generation = Arc::clone(&self.generation);
        let safety = self.safety;
        let reason = reason.to_string();
        tokio::spawn(async move {
            tokio::time::sleep(safety).await;
            if generation.load(Ordering::Acquire) == gen && *visible.borrow() {
                warn!("overlay: safety timeout after {:?} ({})", safety, reason);
                visible.send_replace(false);
            }
        });
    }

    pub fn hide(&self) {
        self.generation.fetch_add(1, Ordering::AcqRel);
        self.visible.send_replace(false);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn duplicates_are_collapsed() {
        let notifier = Notifier::new();
        let mut rx = notifier.subscribe();
        assert!(notifier.warning("Please log in"));
        assert!(!notifier.warning("Please log in"));
        assert!(notifier.error("Please log in"));
        assert_eq!(notifier.history().len(), 2);

        assert_eq!(rx.try_recv().unwrap().severity, Severity::Warning);
        assert_eq!(rx.try_recv().unwrap().severity, Severity::Error);
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn history_is_bounded() {
        let notifier = Notifier::new();
        for i in 0..(HISTORY_LEN + 5) {
            notifier.info(format!("message {}", i));
        }
        let history = notifier.history();
        assert_eq!(history.len(), HISTORY_LEN);
        assert_eq!(history[0].message, "message 5");
    }

    #[tokio::test(start_paused = true)]
    async fn overlay_auto_hides_after_safety_timeout() {
        let overlay = LoaderOverlay::new(Duration::from_secs(15));
        overlay.show("download");
        assert!(overlay.is_visible());

        tokio::time::sleep(Duration::from_secs(14)).await;
        assert!(overlay.is_visible());
        tokio::time::sleep(Duration::from_secs(2)).await;
        assert!(!overlay.is_visible());
    }

    #[tokio::test(start_paused = true)]
    async fn later_show_supersedes_earlier_timer() {
        let overlay = LoaderOverlay::new(Duration::from_secs(15));
        overlay.show("first");
        tokio::time::sleep(Duration::from_secs(10)).await;
        overlay.show("second");
        tokio::time::sleep(Duration::from_secs(10)).await;
        assert!(overlay.is_visible());
        tokio::time::sleep(Duration::from_secs(6)).await;
        assert!(!overlay.is_visible());
    }

    #[tokio::test(start_paused = true)]
    async fn hide_cancels_timer() {
        let overlay = LoaderOverlay::new(Duration::from_secs(15));
        overlay.show("x");
        overlay.hide();
        assert!(!overlay.is_visible());
        overlay.show("y");
        tokio::time::sleep(Duration::from_secs(16)).await;
        assert!(!overlay.is_visible());
    }
}
