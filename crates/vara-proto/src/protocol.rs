use serde::{Deserialize, Serialize};

use crate::model::{CurrentUser, DownloadLimits};

// ── Views ─────────────────────────────────────────────────────────────────────

/// Which catalog slice the main content area shows.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ViewKind {
    ForYou,
    AllGenres,
    AllSubGenres,
    AllInstruments,
    AllMoods,
    SubGenresByGenre,
    SongsBySubGenre,
    SongsByInstrument,
    SongsByMood,
    FreeSongs,
    Favourites,
}

impl ViewKind {
    pub fn label(&self) -> &'static str {
        match self {
            Self::ForYou => "For You",
            Self::AllGenres => "Genres",
            Self::AllSubGenres => "Sub-genres",
            Self::AllInstruments => "Instruments",
            Self::AllMoods => "Moods",
            Self::SubGenresByGenre => "Sub-genres",
            Self::SongsBySubGenre => "Songs",
            Self::SongsByInstrument => "Songs",
            Self::SongsByMood => "Songs",
            Self::FreeSongs => "Free Songs",
            Self::Favourites => "Favourites",
        }
    }

    /// Views reachable from the tab bar (no id needed).
    pub fn is_top_level(&self) -> bool {
        matches!(
            self,
            Self::ForYou
                | Self::AllGenres
                | Self::AllSubGenres
                | Self::AllInstruments
                | Self::AllMoods
                | Self::FreeSongs
                | Self::Favourites
        )
    }

    pub fn parse(s: &str) -> Option<Self> {
        serde_json::from_value(serde_json::Value::String(s.to_string())).ok()
    }
}

/// One entry of the drill-down navigation stack.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ViewState {
    pub view: ViewKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub genre_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sub_genre_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub instrument_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mood_id: Option<String>,
    pub title: String,
}

impl ViewState {
    /// A top-level view titled with its label.
    pub fn top(view: ViewKind) -> Self {
        Self {
            view,
            genre_id: None,
            sub_genre_id: None,
            instrument_id: None,
            mood_id: None,
            title: view.label().to_string(),
        }
    }

    pub fn for_you() -> Self {
        Self::top(ViewKind::ForYou)
    }

    pub fn sub_genres_of(genre_id: impl Into<String>, title: impl Into<String>) -> Self {
        Self {
            genre_id: Some(genre_id.into()),
            title: title.into(),
            ..Self::top(ViewKind::SubGenresByGenre)
        }
    }

    pub fn songs_of_sub_genre(sub_genre_id: impl Into<String>, title: impl Into<String>) -> Self {
        Self {
            sub_genre_id: Some(sub_genre_id.into()),
            title: title.into(),
            ..Self::top(ViewKind::SongsBySubGenre)
        }
    }

    pub fn songs_of_instrument(instrument_id: impl Into<String>, title: impl Into<String>) -> Self {
        Self {
            instrument_id: Some(instrument_id.into()),
            title: title.into(),
            ..Self::top(ViewKind::SongsByInstrument)
        }
    }

    pub fn songs_of_mood(mood_id: impl Into<String>, title: impl Into<String>) -> Self {
        Self {
            mood_id: Some(mood_id.into()),
            title: title.into(),
            ..Self::top(ViewKind::SongsByMood)
        }
    }
}

/// Top-level page selected by the URL path.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "kebab-case", tag = "page", content = "slug")]
pub enum Page {
    #[default]
    Home,
    Search,
    Login,
    Premium,
    Ai,
    /// Static informational page (about, terms, privacy…).
    Info(String),
    NotFound,
}

// ── Commands ──────────────────────────────────────────────────────────────────

/// Everything a front end can ask the core to do.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "cmd", rename_all = "snake_case")]
pub enum Command {
    PlaySong { song_id: String },
    /// `song_id = None` toggles the current song. A `queue` replaces the
    /// play queue when a different song is started.
    TogglePlayPause {
        #[serde(default)]
        song_id: Option<String>,
        #[serde(default)]
        queue: Option<Vec<String>>,
    },
    /// 0–100 over the current duration.
    Seek { percent: f64 },
    Volume { value: f32 },
    ToggleMute,
    Next,
    Prev,
    ClosePlayer,
    OpenView { view: ViewState },
    /// Open a view picked from search results, then go home without
    /// losing it.
    OpenFromSearch { view: ViewState },
    /// Open a view picked from the assistant; the next back returns there.
    OpenFromAssistant { view: ViewState },
    Back,
    TabClick { tab: ViewKind },
    Navigate { path: String },
    WindowFocused,
    PageVisible,
    ToggleFavorite { song_id: String },
    Download { song_id: String },
    Login,
    Logout,
    Recommend { prompt: String },
    VerifyLicense { license_id: String },
    SetYoutubeChannel { link: String },
    /// Force a refresh of the core catalog lists.
    Refresh,
    GetState,
}

// ── Snapshot ──────────────────────────────────────────────────────────────────

/// Player lifecycle.
///
/// ```text
///   Idle -> Loading -> Playing <-> Paused -> Idle (closed)
/// ```
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum PlaybackStatus {
    #[default]
    Idle,
    Loading,
    Playing,
    Paused,
}

/// Progressive start-up stages, revealed in order.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Default)]
#[serde(rename_all = "snake_case")]
pub enum LoadStage {
    #[default]
    Pending,
    Header,
    Hero,
    MusicContent,
    Data,
    Ready,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    Info,
    Success,
    Warning,
    Error,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Notification {
    pub severity: Severity,
    pub message: String,
}

/// User action reported to analytics / personalisation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InteractionKind {
    Play,
    Favorite,
    Unfavorite,
    Download,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct PlaybackSnapshot {
    pub status: PlaybackStatus,
    pub song_id: Option<String>,
    pub title: Option<String>,
    pub is_playing: bool,
    pub is_loading: bool,
    pub current_time: f64,
    /// `None` until the media reports a duration.
    pub duration: Option<f64>,
    pub volume: f32,
    pub queue_len: usize,
    pub visible: bool,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct CatalogCounts {
    pub songs: usize,
    pub genres: usize,
    pub sub_genres: usize,
    pub trending: usize,
    pub instruments: usize,
    pub moods: usize,
}

/// Full observable state of the core. `rev` increases on every publish.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppSnapshot {
    pub rev: u64,
    pub page: Page,
    pub url: String,
    pub active_tab: ViewKind,
    pub view: ViewState,
    pub nav_depth: usize,
    /// Number of entries the current view resolves to.
    pub view_len: usize,
    /// Song ids of the current view, empty for non-song views.
    pub view_song_ids: Vec<String>,
    pub search_query: Option<String>,
    pub search_song_ids: Vec<String>,
    pub load_stage: LoadStage,
    pub overlay_visible: bool,
    pub playback: PlaybackSnapshot,
    pub catalog: CatalogCounts,
    pub user: Option<CurrentUser>,
    pub favourites: Vec<String>,
    pub download_limits: Option<DownloadLimits>,
    pub assistant_message: Option<String>,
    pub assistant_song_ids: Vec<String>,
}

impl Default for AppSnapshot {
    fn default() -> Self {
        Self {
            rev: 0,
            page: Page::Home,
            url: "/home".to_string(),
            active_tab: ViewKind::ForYou,
            view: ViewState::for_you(),
            nav_depth: 1,
            view_len: 0,
            view_song_ids: Vec::new(),
            search_query: None,
            search_song_ids: Vec::new(),
            load_stage: LoadStage::Pending,
            overlay_visible: false,
            playback: PlaybackSnapshot::default(),
            catalog: CatalogCounts::default(),
            user: None,
            favourites: Vec::new(),
            download_limits: None,
            assistant_message: None,
            assistant_song_ids: Vec::new(),
        }
    }
}
