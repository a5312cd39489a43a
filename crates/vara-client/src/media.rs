//! Media sink abstraction.
//!
//! Sink calls never block; their outcomes come back later as
//! [`MediaEvent`]s through the channel handed to the sink at construction.

use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

use crate::mpv::{MpvIpc, MpvNotice, MpvProcess, Observed};

#[derive(Debug, Clone, PartialEq)]
pub enum MediaEvent {
    /// The source is buffered enough to start.
    CanPlay,
    Playing,
    Paused,
    /// Current position in seconds.
    TimeUpdate(f64),
    /// Total length in seconds.
    DurationChange(f64),
    Ended,
    /// A play request was refused (no output, autoplay policy, IPC failure).
    PlayRejected(String),
    Error(String),
}

pub trait MediaSink: Send + Sync {
    fn load(&mut self, url: &str);
    fn play(&mut self);
    fn pause(&mut self);
    fn seek(&mut self, secs: f64);
    fn set_volume(&mut self, volume: f32);
    fn stop(&mut self);
}

/// Accepts every call and plays nothing. Used when mpv is disabled or missing.
#[derive(Debug, Default)]
pub struct NullSink;

impl MediaSink for NullSink {
    fn load(&mut self, url: &str) {
        debug!("null sink: load {}", url);
    }
    fn play(&mut self) {}
    fn pause(&mut self) {}
    fn seek(&mut self, _secs: f64) {}
    fn set_volume(&mut self, _volume: f32) {}
    fn stop(&mut self) {}
}

// ── mpv-backed sink ───────────────────────────────────────────────────────────

#[derive(Debug)]
enum SinkCommand {
    Load(String),
    Play,
    Pause,
    Seek(f64),
    Volume(f32),
    Stop,
}

/// Forwards sink calls to a task that owns the mpv process.
pub struct MpvSink {
    tx: mpsc::UnboundedSender<SinkCommand>,
}

impl MpvSink {
    pub fn spawn(initial_volume: f32, events: mpsc::UnboundedSender<MediaEvent>) -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        tokio::spawn(mpv_task(MpvProcess::new(initial_volume), rx, events));
        Self { tx }
    }

    fn send(&self, cmd: SinkCommand) {
        if self.tx.send(cmd).is_err() {
            warn!("mpv sink: task gone, command dropped");
        }
    }
}

impl MediaSink for MpvSink {
    fn load(&mut self, url: &str) {
        self.send(SinkCommand::Load(url.to_string()));
    }
    fn play(&mut self) {
        self.send(SinkCommand::Play);
    }
    fn pause(&mut self) {
        self.send(SinkCommand::Pause);
    }
    fn seek(&mut self, secs: f64) {
        self.send(SinkCommand::Seek(secs));
    }
    fn set_volume(&mut self, volume: f32) {
        self.send(SinkCommand::Volume(volume));
    }
    fn stop(&mut self) {
        self.send(SinkCommand::Stop);
    }
}

/// Turns mpv notices into media events. Play state comes only from the
/// observed `pause` property; `playback-restart` follows every load and
/// every seek, so it reports `Playing` only while mpv is unpaused.
#[derive(Debug, Default)]
pub struct NoticeTranslator {
    paused: bool,
}

impl NoticeTranslator {
    pub fn translate(&mut self, notice: &MpvNotice) -> Option<MediaEvent> {
        match notice {
            MpvNotice::PropertyChange { id, data } => match Observed::from_id(*id)? {
                Observed::Pause => data.as_bool().map(|paused| {
                    self.paused = paused;
                    if paused {
                        MediaEvent::Paused
                    } else {
                        MediaEvent::Playing
                    }
                }),
                Observed::TimePos => data.as_f64().map(MediaEvent::TimeUpdate),
                Observed::Duration => data
                    .as_f64()
                    .filter(|d| d.is_finite() && *d > 0.0)
                    .map(MediaEvent::DurationChange),
            },
            MpvNotice::FileLoaded => Some(MediaEvent::CanPlay),
            MpvNotice::PlaybackRestart if self.paused => Some(MediaEvent::CanPlay),
            MpvNotice::PlaybackRestart => Some(MediaEvent::Playing),
            MpvNotice::EndFile { reason, file_error } => match reason.as_deref() {
                Some("eof") => Some(MediaEvent::Ended),
                Some("error") => Some(MediaEvent::Error(
                    file_error.clone().unwrap_or_else(|| "playback failed".into()),
                )),
                _ => None,
            },
            MpvNotice::Other => None,
        }
    }
}

async fn mpv_task(
    mut process: MpvProcess,
    mut rx: mpsc::UnboundedReceiver<SinkCommand>,
    events: mpsc::UnboundedSender<MediaEvent>,
) {
    let (notice_tx, mut notice_rx) = mpsc::channel::<MpvNotice>(256);
    let mut ipc: Option<MpvIpc> = None;
    let mut translator = NoticeTranslator::default();

    loop {
        tokio::select! {
            cmd = rx.recv() => {
                let Some(cmd) = cmd else { break };

                if ipc.is_none() || !process.is_running() {
                    ipc = None;
                    // nothing to pause or stop while mpv is down
                    if matches!(cmd, SinkCommand::Pause | SinkCommand::Stop) {
                        continue;
                    }
                    match process.launch(notice_tx.clone()).await {
                        Ok(conn) => {
                            translator = NoticeTranslator::default();
                            conn.observe_all().await;
                            ipc = Some(conn);
                        }
                        Err(e) => {
                            error!("mpv sink: cannot start mpv: {}", e);
                            let reason = format!("mpv unavailable: {}", e);
                            let _ = events.send(match cmd {
                                SinkCommand::Play => MediaEvent::PlayRejected(reason),
                                _ => MediaEvent::Error(reason),
                            });
                            continue;
                        }
                    }
                }
                let Some(conn) = ipc.as_ref() else { continue };

                let result = match &cmd {
                    SinkCommand::Load(url) => {
                        info!("mpv sink: load {}", url);
                        conn.loadfile(url).await
                    }
                    SinkCommand::Play => conn.set_paused(false).await,
                    SinkCommand::Pause => conn.set_paused(true).await,
                    SinkCommand::Seek(secs) => conn.seek_absolute(*secs).await,
                    SinkCommand::Volume(v) => conn.set_volume(*v).await,
                    SinkCommand::Stop => conn.stop().await,
                };

                if let Err(e) = result {
                    warn!("mpv sink: {:?} failed: {}", cmd, e);
                    let evt = match cmd {
                        SinkCommand::Play => MediaEvent::PlayRejected(e.to_string()),
                        SinkCommand::Load(_) => MediaEvent::Error(e.to_string()),
                        _ => continue,
                    };
                    let _ = events.send(evt);
                }
            }

            Some(notice) = notice_rx.recv() => {
                debug!(?notice, "mpv sink: notice");
                if let Some(media) = translator.translate(&notice) {
                    if events.send(media).is_err() {
                        break;
                    }
                }
            }
        }
    }

    process.shutdown().await;
    debug!("mpv sink: task exiting");
}


#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn change(obs: Observed, data: serde_json::Value) -> MpvNotice {
        MpvNotice::PropertyChange {
            id: obs as u64,
            data,
        }
    }

    fn translate(notice: &MpvNotice) -> Option<MediaEvent> {
        NoticeTranslator::default().translate(notice)
    }

    #[test]
    fn pause_property_maps_to_play_state() {
        assert_eq!(translate(&change(Observed::Pause, json!(true))), Some(MediaEvent::Paused));
        assert_eq!(translate(&change(Observed::Pause, json!(false))), Some(MediaEvent::Playing));
        assert_eq!(
            translate(&MpvNotice::PropertyChange { id: 99, data: json!(1) }),
            None
        );
    }

    #[test]
    fn restart_while_paused_does_not_resume() {
        let mut tr = NoticeTranslator::default();
        assert_eq!(tr.translate(&MpvNotice::PlaybackRestart), Some(MediaEvent::Playing));

        tr.translate(&change(Observed::Pause, json!(true)));
        assert_eq!(tr.translate(&MpvNotice::PlaybackRestart), Some(MediaEvent::CanPlay));

        tr.translate(&change(Observed::Pause, json!(false)));
        assert_eq!(tr.translate(&MpvNotice::PlaybackRestart), Some(MediaEvent::Playing));
    }

    #[test]
    fn unknown_duration_is_ignored() {
        assert_eq!(translate(&change(Observed::Duration, json!(null))), None);
        assert_eq!(
            translate(&change(Observed::Duration, json!(180.0))),
            Some(MediaEvent::DurationChange(180.0))
        );
    }

    #[test]
    fn end_file_reasons() {
        let end = |reason: &str| MpvNotice::EndFile {
            reason: Some(reason.into()),
            file_error: None,
        };
        assert_eq!(translate(&end("eof")), Some(MediaEvent::Ended));
        assert_eq!(translate(&end("stop")), None);
        assert_eq!(
            translate(&end("error")),
            Some(MediaEvent::Error("playback failed".into()))
        );
        assert_eq!(translate(&MpvNotice::FileLoaded), Some(MediaEvent::CanPlay));
    }
}
