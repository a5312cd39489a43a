//! Audio playback controller.
//!
//! ```text
//!   Idle ──play_song──► Loading ──Playing──► Playing ◄──► Paused
//!    ▲                                                      │
//!    └───────────────────────── close ──────────────────────┘
//! ```
//!
//! Owns the media sink and the play queue. Every operation that starts a
//! new song returns it so the caller can sync the URL and report the play.

use tracing::{debug, info, warn};

use vara_proto::model::Song;
use vara_proto::protocol::{PlaybackSnapshot, PlaybackStatus};

use crate::media::{MediaEvent, MediaSink};

pub struct PlaybackController {
    sink: Box<dyn MediaSink>,
    current: Option<Song>,
    queue: Vec<Song>,
    status: PlaybackStatus,
    is_playing: bool,
    is_loading: bool,
    current_time: f64,
    duration: Option<f64>,
    volume: f32,
    previous_volume: f32,
    visible: bool,
}

impl PlaybackController {
    pub fn new(sink: Box<dyn MediaSink>, volume: f32) -> Self {
        let volume = volume.clamp(0.0, 1.0);
        Self {
            sink,
            current: None,
            queue: Vec::new(),
            status: PlaybackStatus::Idle,
            is_playing: false,
            is_loading: false,
            current_time: 0.0,
            duration: None,
            volume,
            previous_volume: if volume > 0.0 { volume } else { 1.0 },
            visible: false,
        }
    }

    pub fn current(&self) -> Option<&Song> {
        self.current.as_ref()
    }

    pub fn queue(&self) -> &[Song] {
        &self.queue
    }

    pub fn status(&self) -> PlaybackStatus {
        self.status
    }

    pub fn is_playing(&self) -> bool {
        self.is_playing
    }

    pub fn current_time(&self) -> f64 {
        self.current_time
    }

    pub fn volume(&self) -> f32 {
        self.volume
    }

    pub fn set_queue(&mut self, queue: Vec<Song>) {
        self.queue = queue;
    }

    /// Assigns the source and asks the sink to start. `is_playing` flips
    /// only when the sink reports `Playing`.
    pub fn play_song(&mut self, song: Song) -> Song {
        info!(song_id = %song.id, title = %song.title, "playback: play");
        self.sink.load(&song.audio_url);
        self.sink.play();

        self.status = PlaybackStatus::Loading;
        self.is_loading = true;
        self.is_playing = false;
        self.current_time = 0.0;
        self.duration = (song.duration > 0.0).then_some(song.duration);
        self.visible = true;
        self.current = Some(song.clone());
        song
    }

    /// Same song toggles; a different song replaces the queue (when one is
    /// given) and starts. Returns the newly started song.
    pub fn toggle_play_pause(&mut self, song: Option<Song>, queue: Option<Vec<Song>>) -> Option<Song> {
        let same = match (&song, &self.current) {
            (Some(s), Some(cur)) => s.id == cur.id,
            (None, Some(_)) => true,
            (_, None) => false,
        };

        if same {
            self.toggle();
            return None;
        }

        let song = song?;
        if let Some(queue) = queue {
            self.queue = queue;
        }
        Some(self.play_song(song))
    }

    fn toggle(&mut self) {
        if self.is_playing {
            self.sink.pause();
            self.is_playing = false;
            self.status = PlaybackStatus::Paused;
        } else {
            self.sink.play();
        }
    }

    /// `percent` in 0–100 of the known duration. No-op while the duration
    /// is unknown.
    pub fn seek(&mut self, percent: f64) {
        let Some(duration) = self.duration.filter(|d| d.is_finite() && *d > 0.0) else {
            debug!("playback: seek ignored, duration unknown");
            return;
        };
        if !percent.is_finite() {
            return;
        }
        let t = percent.clamp(0.0, 100.0) / 100.0 * duration;
        self.sink.seek(t);
        self.current_time = t;
    }

    pub fn set_volume(&mut self, volume: f32) {
        let v = if volume.is_finite() {
            volume.clamp(0.0, 1.0)
        } else {
            0.0
        };
        if v > 0.0 {
            self.previous_volume = v;
        }
        self.volume = v;
        self.sink.set_volume(v);
    }

    pub fn toggle_mute(&mut self) {
        if self.volume > 0.0 {
            let restore = self.volume;
            self.set_volume(0.0);
            self.previous_volume = restore;
        } else {
            self.set_volume(self.previous_volume);
        }
    }

    pub fn next(&mut self) -> Option<Song> {
        self.step(1)
    }

    pub fn previous(&mut self) -> Option<Song> {
        self.step(-1)
    }

    fn step(&mut self, delta: isize) -> Option<Song> {
        let idx = self.queue_index()?;
        let len = self.queue.len() as isize;
        let next = (idx as isize + delta).rem_euclid(len) as usize;
        let song = self.queue[next].clone();
        Some(self.play_song(song))
    }

    fn queue_index(&self) -> Option<usize> {
        let current = self.current.as_ref()?;
        self.queue.iter().position(|s| s.id == current.id)
    }

    /// Stops playback and hides the player. Returns false when nothing was
    /// loaded.
    pub fn close(&mut self) -> bool {
        if self.current.is_none() && !self.visible {
            return false;
        }
        if self.is_playing {
            self.sink.pause();
        }
        self.sink.stop();
        self.current = None;
        self.status = PlaybackStatus::Idle;
        self.is_playing = false;
        self.is_loading = false;
        self.current_time = 0.0;
        self.duration = None;
        self.visible = false;
        true
    }

    /// Applies a sink event. Returns the next song when `Ended` advanced
    /// the queue.
    pub fn on_media_event(&mut self, event: MediaEvent) -> Option<Song> {
        if self.current.is_none() {
            return None;
        }
        match event {
            MediaEvent::CanPlay => {
                self.is_loading = false;
            }
            MediaEvent::Playing => {
                self.is_loading = false;
                self.is_playing = true;
                self.status = PlaybackStatus::Playing;
            }
            MediaEvent::Paused => {
                self.is_playing = false;
                if self.status != PlaybackStatus::Loading {
                    self.status = PlaybackStatus::Paused;
                }
            }
            MediaEvent::TimeUpdate(t) if t.is_finite() => self.current_time = t,
            MediaEvent::TimeUpdate(_) => {}
            MediaEvent::DurationChange(d) => {
                if d.is_finite() && d > 0.0 {
                    self.duration = Some(d);
                }
            }
            // end of the track that was playing before the latest load
            MediaEvent::Ended if self.status == PlaybackStatus::Loading => {
                debug!("playback: stale end of file ignored");
            }
            MediaEvent::Ended => {
                self.is_playing = false;
                if self.queue_index().is_some() {
                    return self.next();
                }
                self.status = PlaybackStatus::Paused;
                self.current_time = self.duration.unwrap_or(self.current_time);
            }
            MediaEvent::PlayRejected(reason) => {
                warn!("playback: play rejected: {}", reason);
                self.is_playing = false;
                self.is_loading = false;
                self.status = PlaybackStatus::Paused;
            }
            MediaEvent::Error(reason) => {
                warn!("playback: media error: {}", reason);
                self.is_playing = false;
                self.is_loading = false;
                self.status = PlaybackStatus::Paused;
            }
        }
        None
    }

    pub fn snapshot(&self) -> PlaybackSnapshot {
        PlaybackSnapshot {
            status: self.status,
            song_id: self.current.as_ref().map(|s| s.id.clone()),
            title: self.current.as_ref().map(|s| s.title.clone()),
            is_playing: self.is_playing,
            is_loading: self.is_loading,
            current_time: self.current_time,
            duration: self.duration,
            volume: self.volume,
            queue_len: self.queue.len(),
            visible: self.visible,
        }
    }
}
