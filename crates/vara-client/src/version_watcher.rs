//! Content version watcher.
//!
//! Polls the version endpoint on an interval and on focus / visibility
//! triggers. Triggers closer together than the cooldown collapse into a
//! single request. The first stamp seeds the tracker silently; each later
//! change is reported exactly once. Network failures are ignored until the
//! next trigger.

use std::time::Duration;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use vara_proto::config::{MIN_COOLDOWN_MS, MIN_POLL_INTERVAL_MS};
use vara_proto::model::ContentVersion;

use crate::api::{ApiClient, VersionStamp};

/// Why a poll was requested.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Trigger {
    Initial,
    Interval,
    Focus,
    Visible,
}

/// Drops triggers that arrive within `cooldown` of the last accepted one.
#[derive(Debug)]
pub struct CooldownGate {
    cooldown: Duration,
    last: Option<Instant>,
}

impl CooldownGate {
    pub fn new(cooldown: Duration) -> Self {
        Self {
            cooldown,
            last: None,
        }
    }

    pub fn try_pass(&mut self, now: Instant) -> bool {
        match self.last {
            Some(last) if now.saturating_duration_since(last) < self.cooldown => false,
            _ => {
                self.last = Some(now);
                true
            }
        }
    }
}

/// Remembers the last seen version.
#[derive(Debug, Default)]
pub struct VersionTracker {
    last_seen: Option<ContentVersion>,
}

impl VersionTracker {
    /// `Some(version)` only when a previously seeded value changed.
    pub fn observe(&mut self, version: ContentVersion) -> Option<ContentVersion> {
        match &self.last_seen {
            None => {
                debug!(%version, "content version seeded");
                self.last_seen = Some(version);
                None
            }
            Some(prev) if *prev == version => None,
            Some(_) => {
                self.last_seen = Some(version.clone());
                Some(version)
            }
        }
    }

    pub fn last_seen(&self) -> Option<&ContentVersion> {
        self.last_seen.as_ref()
    }
}

pub struct ContentVersionWatcher {
    trigger_tx: mpsc::UnboundedSender<Trigger>,
    cancel: CancellationToken,
    handle: JoinHandle<()>,
}

impl ContentVersionWatcher {
    /// Starts polling `path` on the data backend. `interval` and `cooldown`
    /// are raised to their floors.
    pub fn spawn<F>(
        api: ApiClient,
        path: String,
        interval: Duration,
        cooldown: Duration,
        on_change: F,
    ) -> Self
    where
        F: Fn(VersionStamp) + Send + 'static,
    {
        let interval = interval.max(Duration::from_millis(MIN_POLL_INTERVAL_MS));
        let cooldown = cooldown.max(Duration::from_millis(MIN_COOLDOWN_MS));
        let (trigger_tx, trigger_rx) = mpsc::unbounded_channel();
        let cancel = CancellationToken::new();

        info!(
            "version watcher: polling {} every {:?} (cooldown {:?})",
            path, interval, cooldown
        );
        let handle = tokio::spawn(watch_loop(
            api,
            path,
            interval,
            cooldown,
            trigger_rx,
            cancel.clone(),
            on_change,
        ));

        Self {
            trigger_tx,
            cancel,
            handle,
        }
    }

    /// Requests an out-of-band poll (window focus, page visible).
    pub fn notify(&self, trigger: Trigger) {
        let _ = self.trigger_tx.send(trigger);
    }

    pub fn stop(&self) {
        self.cancel.cancel();
    }

    pub fn is_running(&self) -> bool {
        !self.handle.is_finished()
    }
}

impl Drop for ContentVersionWatcher {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

async fn watch_loop<F>(
    api: ApiClient,
    path: String,
    interval: Duration,
    cooldown: Duration,
    mut trigger_rx: mpsc::UnboundedReceiver<Trigger>,
    cancel: CancellationToken,
    on_change: F,
) where
    F: Fn(VersionStamp) + Send + 'static,
{
    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
    let mut gate = CooldownGate::new(cooldown);
    let mut tracker = VersionTracker::default();
    let mut first_tick = true;

    loop {
        let trigger = tokio::select! {
            _ = cancel.cancelled() => break,
            _ = ticker.tick() => {
                if std::mem::take(&mut first_tick) {
                    Trigger::Initial
                } else {
                    Trigger::Interval
                }
            }
            Some(t) = trigger_rx.recv() => t,
        };

        if !gate.try_pass(Instant::now()) {
            debug!(?trigger, "version watcher: coalesced");
            continue;
        }

        match api.content_version(&path).await {
            Ok(stamp) => {
                if let Some(version) = tracker.observe(stamp.version.clone()) {
                    info!(%version, ?trigger, "content version changed");
                    on_change(stamp);
                }
            }
            Err(e) => debug!(?trigger, "version watcher: poll failed: {}", e),
        }
    }

    debug!("version watcher: stopped");
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tracker_reports_each_change_once() {
        let mut tracker = VersionTracker::default();
        let seen: Vec<_> = [5u64, 5, 5, 7, 7]
            .into_iter()
            .filter_map(|v| tracker.observe(ContentVersion::Number(v)))
            .collect();
        assert_eq!(seen, vec![ContentVersion::Number(7)]);
        assert_eq!(tracker.last_seen(), Some(&ContentVersion::Number(7)));
    }

    #[test]
    fn tracker_handles_tokens() {
        let mut tracker = VersionTracker::default();
        assert_eq!(tracker.observe(ContentVersion::Token("a".into())), None);
        assert_eq!(
            tracker.observe(ContentVersion::Token("b".into())),
            Some(ContentVersion::Token("b".into()))
        );
        assert_eq!(tracker.observe(ContentVersion::Token("b".into())), None);
    }

    #[test]
    fn gate_coalesces_within_cooldown() {
        let mut gate = CooldownGate::new(Duration::from_millis(1000));
        let t0 = Instant::now();
        assert!(gate.try_pass(t0));
        assert!(!gate.try_pass(t0 + Duration::from_millis(10)));
        assert!(!gate.try_pass(t0 + Duration::from_millis(999)));
        assert!(gate.try_pass(t0 + Duration::from_millis(1000)));
        assert!(!gate.try_pass(t0 + Duration::from_millis(1500)));
    }
}
