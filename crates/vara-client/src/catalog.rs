use std::collections::HashSet;
use std::sync::Arc;

use futures_util::future::{BoxFuture, FutureExt};
use serde::de::DeserializeOwned;
use tracing::{info, warn};

use vara_proto::model::{validate_songs, Genre, Instrument, Mood, RawSong, Song, SubGenre};
use vara_proto::protocol::{CatalogCounts, ViewKind, ViewState};

use crate::api::{ApiClient, Backend};
use crate::error::Result;
use crate::fetch_cache::{FetchCache, ResourceKind};

/// Point-in-time copy of every catalog list.
#[derive(Debug, Clone, Default)]
pub struct CatalogData {
    pub songs: Arc<Vec<Song>>,
    pub genres: Arc<Vec<Genre>>,
    pub sub_genres: Arc<Vec<SubGenre>>,
    pub trending: Arc<Vec<Song>>,
    pub instruments: Arc<Vec<Instrument>>,
    pub moods: Arc<Vec<Mood>>,
    /// The song list has been fetched successfully at least once.
    pub songs_loaded: bool,
}

impl CatalogData {
    pub fn counts(&self) -> CatalogCounts {
        CatalogCounts {
            songs: self.songs.len(),
            genres: self.genres.len(),
            sub_genres: self.sub_genres.len(),
            trending: self.trending.len(),
            instruments: self.instruments.len(),
            moods: self.moods.len(),
        }
    }

    pub fn song(&self, id: &str) -> Option<&Song> {
        self.songs.iter().find(|s| s.id == id)
    }

    /// Resolves ids against the song list, skipping unknown ones.
    pub fn songs_by_ids<'a, I>(&self, ids: I) -> Vec<Song>
    where
        I: IntoIterator<Item = &'a str>,
    {
        ids.into_iter()
            .filter_map(|id| self.song(id).cloned())
            .collect()
    }
}

pub struct Catalog {
    songs: FetchCache<Song>,
    genres: FetchCache<Genre>,
    sub_genres: FetchCache<SubGenre>,
    trending: FetchCache<Song>,
    instruments: FetchCache<Instrument>,
    moods: FetchCache<Mood>,
}

type ListFuture<T> = BoxFuture<'static, Result<Vec<T>>>;

fn list<T>(api: &ApiClient, path: String) -> impl Fn() -> ListFuture<T> + Send + Sync + 'static
where
    T: DeserializeOwned + Send + 'static,
{
    let api = api.clone();
    move || {
        let api = api.clone();
        let path = path.clone();
        async move { api.get_json::<Vec<T>>(Backend::Data, &path).await }.boxed()
    }
}

fn song_list(api: &ApiClient, path: String) -> impl Fn() -> ListFuture<Song> + Send + Sync + 'static {
    let api = api.clone();
    move || {
        let api = api.clone();
        let path = path.clone();
        async move {
            let raw = api.get_json::<Vec<RawSong>>(Backend::Data, &path).await?;
            Ok(validate_songs(raw))
        }
        .boxed()
    }
}

impl Catalog {
    pub fn new(api: &ApiClient, trending_limit: usize) -> Self {
        Self {
            songs: FetchCache::new(ResourceKind::Songs, song_list(api, "/api/songs".into())),
            genres: FetchCache::new(ResourceKind::Genres, list(api, "/api/genres".into())),
            sub_genres: FetchCache::new(ResourceKind::SubGenres, list(api, "/api/subgenres".into())),
            trending: FetchCache::new(
                ResourceKind::Trending,
                song_list(api, format!("/api/songs/trending?limit={}", trending_limit)),
            ),
            instruments: FetchCache::new(
                ResourceKind::Instruments,
                list(api, "/api/instruments".into()),
            ),
            moods: FetchCache::new(ResourceKind::Moods, list(api, "/api/moods".into())),
        }
    }

    pub fn songs(&self) -> &FetchCache<Song> {
        &self.songs
    }

    /// Fans out all six fetches and waits for every one of them.
    /// A failing resource is logged and keeps its previous value.
    pub async fn load_all(&self) -> CatalogData {
        let (songs, genres, sub_genres, trending, instruments, moods) = tokio::join!(
            self.songs.fetch(),
            self.genres.fetch(),
            self.sub_genres.fetch(),
            self.trending.fetch(),
            self.instruments.fetch(),
            self.moods.fetch(),
        );
        log_failure(ResourceKind::Songs, &songs);
        log_failure(ResourceKind::Genres, &genres);
        log_failure(ResourceKind::SubGenres, &sub_genres);
        log_failure(ResourceKind::Trending, &trending);
        log_failure(ResourceKind::Instruments, &instruments);
        log_failure(ResourceKind::Moods, &moods);

        let data = self.snapshot().await;
        info!(songs = data.songs.len(), genres = data.genres.len(), "catalog: loaded");
        data
    }

    /// Forced reload of songs, genres, sub-genres and moods after a
    /// content version change.
    pub async fn refresh_core(&self) -> CatalogData {
        let (songs, genres, sub_genres, moods) = tokio::join!(
            self.songs.refresh(),
            self.genres.refresh(),
            self.sub_genres.refresh(),
            self.moods.refresh(),
        );
        log_failure(ResourceKind::Songs, &songs);
        log_failure(ResourceKind::Genres, &genres);
        log_failure(ResourceKind::SubGenres, &sub_genres);
        log_failure(ResourceKind::Moods, &moods);

        self.snapshot().await
    }

    pub async fn snapshot(&self) -> CatalogData {
        CatalogData {
            songs: self.songs.data().await,
            genres: self.genres.data().await,
            sub_genres: self.sub_genres.data().await,
            trending: self.trending.data().await,
            instruments: self.instruments.data().await,
            moods: self.moods.data().await,
            songs_loaded: self.songs.is_loaded().await,
        }
    }
}

fn log_failure<T>(kind: ResourceKind, result: &Result<T>) {
    if let Err(e) = result {
        warn!(resource = %kind, "catalog: load failed: {}", e);
    }
}

// ── View resolution ───────────────────────────────────────────────────────────

/// What the main content area shows for a view.
#[derive(Debug, Clone, PartialEq)]
pub enum ViewContent {
    Songs(Vec<Song>),
    Genres(Vec<Genre>),
    SubGenres(Vec<SubGenre>),
    Instruments(Vec<Instrument>),
    Moods(Vec<Mood>),
}

impl ViewContent {
    pub fn len(&self) -> usize {
        match self {
            Self::Songs(v) => v.len(),
            Self::Genres(v) => v.len(),
            Self::SubGenres(v) => v.len(),
            Self::Instruments(v) => v.len(),
            Self::Moods(v) => v.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Song ids in display order, used as the play queue for a list.
    pub fn song_ids(&self) -> Vec<String> {
        match self {
            Self::Songs(songs) => songs.iter().map(|s| s.id.clone()).collect(),
            _ => Vec::new(),
        }
    }
}

pub fn resolve_view(view: &ViewState, data: &CatalogData, favourites: &HashSet<String>) -> ViewContent {
    let songs_where = |pred: &dyn Fn(&Song) -> bool| {
        ViewContent::Songs(data.songs.iter().filter(|s| pred(s)).cloned().collect())
    };
    let id = |opt: &Option<String>| opt.clone().unwrap_or_default();

    match view.view {
        ViewKind::ForYou => {
            if data.trending.is_empty() {
                ViewContent::Songs(data.songs.to_vec())
            } else {
                ViewContent::Songs(data.trending.to_vec())
            }
        }
        ViewKind::AllGenres => ViewContent::Genres(data.genres.to_vec()),
        ViewKind::AllSubGenres => ViewContent::SubGenres(data.sub_genres.to_vec()),
        ViewKind::AllInstruments => ViewContent::Instruments(data.instruments.to_vec()),
        ViewKind::AllMoods => ViewContent::Moods(data.moods.to_vec()),
        ViewKind::SubGenresByGenre => {
            let genre_id = id(&view.genre_id);
            ViewContent::SubGenres(
                data.sub_genres
                    .iter()
                    .filter(|sg| sg.genre_id.as_deref() == Some(genre_id.as_str()))
                    .cloned()
                    .collect(),
            )
        }
        ViewKind::SongsBySubGenre => {
            let sub_genre_id = id(&view.sub_genre_id);
            songs_where(&|s: &Song| s.has_sub_genre(&sub_genre_id))
        }
        ViewKind::SongsByInstrument => {
            let instrument_id = id(&view.instrument_id);
            songs_where(&|s: &Song| s.has_instrument(&instrument_id))
        }
        ViewKind::SongsByMood => {
            let mood_id = id(&view.mood_id);
            songs_where(&|s: &Song| s.has_mood(&mood_id))
        }
        ViewKind::FreeSongs => songs_where(&|s: &Song| !s.collection_type.is_gated()),
        ViewKind::Favourites => songs_where(&|s: &Song| favourites.contains(&s.id)),
    }
}

// ── Search ────────────────────────────────────────────────────────────────────

/// Every whitespace-separated word must appear, case-insensitively, in the
/// title or in one of the song's tag names.
pub fn song_matches(song: &Song, query: &str) -> bool {
    let title = song.title.to_lowercase();
    let tags: Vec<String> = song.tag_names().map(str::to_lowercase).collect();
    query.split_whitespace().all(|word| {
        let word = word.to_lowercase();
        title.contains(&word) || tags.iter().any(|t| t.contains(&word))
    })
}

pub fn search_songs(songs: &[Song], query: &str) -> Vec<Song> {
    songs
        .iter()
        .filter(|s| song_matches(s, query))
        .cloned()
        .collect()
}
