//! AppCore: single-owner event loop for all coordinator state.
//!
//! Every input (front-end commands, media events, results of spawned network
//! tasks, loader stages, content-version changes) arrives as a [`CoreEvent`]
//! on one channel. AppCore owns the playback controller, navigation stack,
//! deep-link reconciler and user state exclusively; spawned tasks never touch
//! them and report back through the same channel.
//!
//! After each mutation a fresh [`AppSnapshot`] is stored in the
//! [`StateManager`] and broadcast as `StateUpdated`.

use std::collections::HashSet;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::sync::{broadcast, mpsc};
use tracing::{debug, info, warn};

use vara_proto::config::Config;
use vara_proto::model::{CurrentUser, DownloadLimits, LicenseVerification, Recommendation, Song};
use vara_proto::protocol::{
    AppSnapshot, Command, InteractionKind, LoadStage, Page, ViewKind, ViewState,
};
use vara_proto::state::StateManager;

use crate::api::{ApiClient, VersionStamp};
use crate::billing::Billing;
use crate::catalog::{resolve_view, search_songs, Catalog, CatalogData, ViewContent};
use crate::deep_link::{DeepLinkReconciler, RouteChange};
use crate::downloads::{self, DownloadOutcome, DownloadRunner, Downloads};
use crate::error::{ClientError, Result};
use crate::init::InitTokens;
use crate::loader;
use crate::media::{MediaEvent, MediaSink};
use crate::navigation::{NavigationStack, PopOutcome};
use crate::notify::{LoaderOverlay, Notifier};
use crate::playback::PlaybackController;
use crate::recommend::{self, Assistant, Recommended};
use crate::session::{self, Session};
use crate::tracker::InteractionTracker;
use crate::version_watcher::{ContentVersionWatcher, Trigger};
use crate::BroadcastMessage;

// ── CoreEvent ─────────────────────────────────────────────────────────────────

/// All inputs into the AppCore loop.
#[derive(Debug)]
pub enum CoreEvent {
    /// A command from a front end.
    Command(Command),
    Media(MediaEvent),
    LoadStage(LoadStage),
    /// Initial catalog load finished (every resource settled).
    CatalogLoaded(CatalogData),
    ContentChanged(VersionStamp),
    CatalogRefreshed(CatalogData),
    SessionResolved(Option<CurrentUser>),
    /// Events tagged with `session` are dropped once that session has ended.
    FavoritesLoaded {
        session: u64,
        result: Result<Vec<String>>,
    },
    FavoriteFailed {
        session: u64,
        song_id: String,
        was_favorite: bool,
        error: ClientError,
    },
    LimitsUpdated {
        session: u64,
        result: Result<DownloadLimits>,
    },
    Recommendation(Result<Recommendation>),
    DownloadFinished {
        song: Song,
        premium: bool,
        result: Result<DownloadOutcome>,
    },
    LicenseChecked {
        license_id: String,
        result: Result<LicenseVerification>,
    },
    YoutubeChannelUpdated {
        link: String,
        result: Result<()>,
    },
    /// A premium purchase went through; the session is re-probed.
    PurchaseCompleted,
    Shutdown,
}

// ── AppCore ───────────────────────────────────────────────────────────────────

pub struct AppCore {
    config: Config,
    state: Arc<StateManager>,
    api: ApiClient,
    catalog: Arc<Catalog>,
    data: CatalogData,
    session: Session,
    downloads: Downloads,
    assistant: Assistant,
    tracker: InteractionTracker,
    notifier: Notifier,
    overlay: LoaderOverlay,
    playback: PlaybackController,
    nav: NavigationStack,
    deep_link: DeepLinkReconciler,
    init: InitTokens,
    watcher: Option<ContentVersionWatcher>,
    media_rx: Option<mpsc::UnboundedReceiver<MediaEvent>>,
    event_tx: mpsc::Sender<CoreEvent>,
    broadcast_tx: broadcast::Sender<BroadcastMessage>,

    page: Page,
    active_tab: ViewKind,
    search_query: Option<String>,
    load_stage: LoadStage,
    user: Option<CurrentUser>,
    /// Bumped whenever a user is set or cleared.
    session_gen: u64,
    favourites: HashSet<String>,
    download_limits: Option<DownloadLimits>,
    recommended: Option<Recommended>,
    /// Set by a `from=premium` route; consumed once a login resolves.
    return_to_premium: bool,
}

impl AppCore {
    /// `media_rx` carries the events of the sink handed in as `sink`.
    pub fn new(
        config: Config,
        sink: Box<dyn MediaSink>,
        media_rx: Option<mpsc::UnboundedReceiver<MediaEvent>>,
        event_tx: mpsc::Sender<CoreEvent>,
        broadcast_tx: broadcast::Sender<BroadcastMessage>,
    ) -> anyhow::Result<Self> {
        let api = ApiClient::new(&config.backend)?;
        let state = Arc::new(StateManager::new(
            config.paths.state_file.clone(),
            config.player.default_volume,
        ));
        let volume = StateManager::load_persistent(&config.paths.state_file)
            .map(|p| p.volume)
            .unwrap_or(config.player.default_volume);

        Ok(Self {
            catalog: Arc::new(Catalog::new(&api, config.backend.trending_limit)),
            data: CatalogData::default(),
            session: Session::new(api.clone()),
            downloads: Downloads::new(
                api.clone(),
                config.paths.downloads_dir.clone(),
                config.backend.license_timeout(),
            ),
            assistant: Assistant::new(api.clone()),
            tracker: InteractionTracker::new(api.clone()),
            notifier: Notifier::new(),
            overlay: LoaderOverlay::new(Duration::from_secs(config.loader.overlay_safety_secs)),
            playback: PlaybackController::new(sink, volume),
            nav: NavigationStack::default(),
            deep_link: DeepLinkReconciler::default(),
            init: InitTokens::default(),
            watcher: None,
            media_rx,
            event_tx,
            broadcast_tx,
            page: Page::Home,
            active_tab: ViewKind::ForYou,
            search_query: None,
            load_stage: LoadStage::Pending,
            user: None,
            session_gen: 0,
            favourites: HashSet::new(),
            download_limits: None,
            recommended: None,
            return_to_premium: false,
            api,
            state,
            config,
        })
    }

    /// Location the app was opened with, e.g. `/home?track=abc123`.
    pub fn with_location(mut self, location: &str) -> Self {
        self.deep_link = DeepLinkReconciler::new(location);
        self
    }

    pub fn state_manager(&self) -> Arc<StateManager> {
        Arc::clone(&self.state)
    }

    pub fn notifier(&self) -> Notifier {
        self.notifier.clone()
    }

    pub fn billing(&self) -> Billing {
        Billing::new(self.api.clone())
    }

    pub fn downloads(&self) -> DownloadRunner {
        self.downloads.runner()
    }

    /// Kicks off session probe, progressive load and the content-version
    /// watcher. Each stage runs at most once however often this is called.
    pub fn start(&mut self) {
        if self.init.data.claim() {
            let route = self.deep_link.current_route();
            self.apply_route(route);

            let stage_delay = Duration::from_millis(self.config.loader.stage_delay_ms);
            tokio::spawn(loader::run_progressive_load(
                Arc::clone(&self.catalog),
                stage_delay,
                self.event_tx.clone(),
            ));
        }

        if self.init.auth.claim() {
            self.probe_session();
        }

        if self.init.watcher.claim() {
            let tx = self.event_tx.clone();
            self.watcher = Some(ContentVersionWatcher::spawn(
                self.api.clone(),
                self.config.content.version_path.clone(),
                self.config.content.poll_interval(),
                self.config.content.cooldown(),
                move |stamp| {
                    if let Err(e) = tx.try_send(CoreEvent::ContentChanged(stamp)) {
                        warn!("AppCore: content change dropped: {}", e);
                    }
                },
            ));
        }
    }

    /// Runs the loop until `Shutdown` or until every sender is gone.
    pub async fn run(mut self, mut event_rx: mpsc::Receiver<CoreEvent>) -> anyhow::Result<()> {
        info!("AppCore: starting event loop");
        self.start();
        self.publish().await;

        let mut notes = self.notifier.subscribe();
        let mut overlay_rx = self.overlay.subscribe();
        let mut media_rx = self.media_rx.take();
        let mut media_open = media_rx.is_some();

        loop {
            tokio::select! {
                evt = event_rx.recv() => match evt {
                    None => {
                        info!("AppCore: event channel closed, shutting down");
                        break;
                    }
                    Some(CoreEvent::Shutdown) => {
                        info!("AppCore: shutdown requested");
                        break;
                    }
                    Some(evt) => self.handle_event(evt).await,
                },
                media = recv_media(&mut media_rx), if media_open => match media {
                    Some(m) => self.handle_event(CoreEvent::Media(m)).await,
                    None => {
                        warn!("AppCore: media event channel closed");
                        media_open = false;
                    }
                },
                Ok(note) = notes.recv() => {
                    let _ = self.broadcast_tx.send(BroadcastMessage::Notification(note));
                }
                Ok(()) = overlay_rx.changed() => self.publish().await,
            }
        }

        self.cleanup().await;
        Ok(())
    }

    async fn cleanup(&mut self) {
        if let Some(watcher) = self.watcher.take() {
            watcher.stop();
        }
        self.persist().await;
        self.playback.close();
    }

    pub async fn handle_event(&mut self, evt: CoreEvent) {
        match evt {
            CoreEvent::Command(cmd) => {
                debug!("AppCore: command {:?}", cmd);
                self.handle_command(cmd).await;
            }

            CoreEvent::Media(m) => {
                if let Some(next) = self.playback.on_media_event(m) {
                    self.song_started(&next).await;
                }
                self.publish().await;
            }

            CoreEvent::LoadStage(stage) => {
                debug!(?stage, "AppCore: load stage");
                self.load_stage = stage;
                self.publish().await;
            }

            CoreEvent::CatalogLoaded(data) => {
                self.data = data;
                self.try_autoplay().await;
                self.publish().await;
            }

            CoreEvent::ContentChanged(stamp) => {
                info!(version = %stamp.version, "AppCore: content changed, refreshing catalog");
                self.refresh_catalog();
            }

            CoreEvent::CatalogRefreshed(data) => {
                self.data = data;
                self.try_autoplay().await;
                self.publish().await;
            }

            CoreEvent::SessionResolved(user) => {
                self.on_session(user);
                self.publish().await;
            }

            CoreEvent::FavoritesLoaded { session, result } => {
                if !self.is_current_session(session) {
                    debug!("AppCore: favourites for an ended session dropped");
                    return;
                }
                match result {
                    Ok(ids) => {
                        debug!(count = ids.len(), "AppCore: favourites loaded");
                        self.favourites = ids.into_iter().collect();
                    }
                    Err(e) if e.is_unauthorized() => self.clear_session(),
                    Err(e) => warn!("AppCore: favourites load failed: {}", e),
                }
                self.publish().await;
            }

            CoreEvent::FavoriteFailed {
                session,
                song_id,
                was_favorite,
                error,
            } => {
                if !self.is_current_session(session) {
                    debug!(%song_id, "AppCore: favourite failure for an ended session dropped");
                    return;
                }
                warn!(%song_id, "AppCore: favourite toggle failed: {}", error);
                if was_favorite {
                    self.favourites.insert(song_id);
                } else {
                    self.favourites.remove(&song_id);
                }
                if error.is_unauthorized() {
                    self.clear_session();
                } else {
                    self.notifier.error("Could not update favourites. Please try again");
                }
                self.publish().await;
            }

            CoreEvent::LimitsUpdated { session, result } => {
                if !self.is_current_session(session) {
                    return;
                }
                match result {
                    Ok(limits) => self.download_limits = Some(limits),
                    Err(e) if e.is_unauthorized() => self.clear_session(),
                    Err(e) => debug!("AppCore: limits refresh failed: {}", e),
                }
                self.publish().await;
            }

            CoreEvent::Recommendation(result) => {
                self.overlay.hide();
                self.on_recommendation(result);
                self.publish().await;
            }

            CoreEvent::DownloadFinished {
                song,
                premium,
                result,
            } => {
                self.overlay.hide();
                self.on_download_finished(song, premium, result);
                self.publish().await;
            }

            CoreEvent::LicenseChecked { license_id, result } => {
                self.overlay.hide();
                self.notifier
                    .publish_note(downloads::verification_notification(&license_id, &result));
            }

            CoreEvent::YoutubeChannelUpdated { link, result } => {
                match result {
                    Ok(()) => {
                        if let Some(user) = self.user.as_mut() {
                            user.youtube_channel_link = Some(link);
                        }
                        self.notifier.success("YouTube channel saved");
                    }
                    Err(e) if e.is_unauthorized() => {
                        self.clear_session();
                        self.notifier.warning("Please log in to link your channel");
                    }
                    Err(e) => {
                        self.notifier.error(format!("Could not save channel: {}", e));
                    }
                }
                self.publish().await;
            }

            CoreEvent::PurchaseCompleted => {
                self.notifier.success("Welcome to Premium");
                self.probe_session();
            }

            CoreEvent::Shutdown => {}
        }
    }

    // ── Commands ──────────────────────────────────────────────────────────────

    async fn handle_command(&mut self, cmd: Command) {
        match cmd {
            Command::GetState => {
                let snap = self.state.get_state().await;
                let _ = self
                    .broadcast_tx
                    .send(BroadcastMessage::StateUpdated(Box::new(snap)));
                return;
            }

            Command::PlaySong { song_id } => {
                let Some(song) = self.data.song(&song_id).cloned() else {
                    self.notifier.warning("That song is no longer available");
                    return;
                };
                let queue = self.queue_for(&song);
                self.playback.set_queue(queue);
                let started = self.playback.play_song(song);
                self.song_started(&started).await;
            }

            Command::TogglePlayPause { song_id, queue } => {
                let song = match song_id {
                    Some(id) => match self.data.song(&id) {
                        Some(s) => Some(s.clone()),
                        None => {
                            self.notifier.warning("That song is no longer available");
                            return;
                        }
                    },
                    None => None,
                };
                let queue = queue.map(|ids| self.data.songs_by_ids(ids.iter().map(String::as_str)));
                if let Some(started) = self.playback.toggle_play_pause(song, queue) {
                    self.song_started(&started).await;
                }
            }

            Command::Seek { percent } => self.playback.seek(percent),

            Command::Volume { value } => {
                self.playback.set_volume(value);
                self.publish().await;
                self.persist().await;
                return;
            }

            Command::ToggleMute => {
                self.playback.toggle_mute();
                self.publish().await;
                self.persist().await;
                return;
            }

            Command::Next => {
                if let Some(song) = self.playback.next() {
                    self.song_started(&song).await;
                }
            }

            Command::Prev => {
                if let Some(song) = self.playback.previous() {
                    self.song_started(&song).await;
                }
            }

            Command::ClosePlayer => {
                if self.playback.close() {
                    self.deep_link.clear_track();
                }
            }

            Command::OpenView { view } => self.nav.push(view),

            Command::OpenFromSearch { view } => {
                self.nav.push(view);
                self.deep_link.suppress_next_home_reset();
                let route = self.deep_link.navigate("/home");
                self.apply_route(route);
            }

            Command::OpenFromAssistant { view } => {
                self.nav.push(view);
                self.nav.arm_return_to_assistant();
                self.deep_link.suppress_next_home_reset();
                let route = self.deep_link.navigate("/home");
                self.apply_route(route);
            }

            Command::Back => {
                if let PopOutcome::ReturnToAssistant = self.nav.pop() {
                    let route = self.deep_link.navigate("/ai");
                    self.apply_route(route);
                }
            }

            Command::TabClick { tab } => {
                if !tab.is_top_level() {
                    warn!(?tab, "AppCore: tab click on a non-tab view ignored");
                    return;
                }
                if self.page != Page::Home {
                    self.deep_link.suppress_next_home_reset();
                    let route = self.deep_link.navigate("/home");
                    self.apply_route(route);
                }
                self.active_tab = tab;
                self.nav.reset(ViewState::top(tab));
            }

            Command::Navigate { path } => {
                let route = self.deep_link.navigate(&path);
                self.apply_route(route);
            }

            Command::WindowFocused => {
                if let Some(w) = &self.watcher {
                    w.notify(Trigger::Focus);
                }
                return;
            }

            Command::PageVisible => {
                if let Some(w) = &self.watcher {
                    w.notify(Trigger::Visible);
                }
                return;
            }

            Command::ToggleFavorite { song_id } => self.toggle_favorite(song_id),

            Command::Download { song_id } => self.start_download(&song_id),

            Command::Login => {
                if let Some(user) = &self.user {
                    self.notifier.info(format!("Already logged in as {}", user.email));
                    return;
                }
                let route = self.deep_link.navigate("/login");
                self.apply_route(route);
                self.notifier
                    .info(format!("Continue login at {}", self.session.login_url()));
            }

            Command::Logout => {
                let session = self.session.clone();
                tokio::spawn(async move { session.logout().await });
                self.clear_session();
                self.notifier.info("You have been logged out");
            }

            Command::Recommend { prompt } => {
                if prompt.trim().is_empty() {
                    self.notifier
                        .warning("Tell the assistant what you are looking for");
                    return;
                }
                self.overlay.show("assistant");
                let assistant = self.assistant.clone();
                self.spawn_event(async move {
                    CoreEvent::Recommendation(assistant.recommend(&prompt).await)
                });
            }

            Command::VerifyLicense { license_id } => {
                if license_id.trim().is_empty() {
                    self.notifier.warning("Please enter a licence ID");
                    return;
                }
                self.overlay.show("licence");
                let runner = self.downloads.runner();
                self.spawn_event(async move {
                    let result = runner.verify_license(&license_id).await;
                    CoreEvent::LicenseChecked { license_id, result }
                });
                return;
            }

            Command::SetYoutubeChannel { link } => {
                let link = match session::validate_youtube_link(&link) {
                    Ok(l) => l,
                    Err(e) => {
                        self.notifier.warning(e.to_string());
                        return;
                    }
                };
                if self.user.is_none() {
                    self.notifier.warning("Please log in to link your channel");
                    return;
                }
                let session = self.session.clone();
                self.spawn_event(async move {
                    let result = session.update_youtube_channel(&link).await;
                    CoreEvent::YoutubeChannelUpdated { link, result }
                });
                return;
            }

            Command::Refresh => {
                self.refresh_catalog();
                return;
            }
        }
        self.publish().await;
    }

    // ── Helpers ───────────────────────────────────────────────────────────────

    fn spawn_event<F>(&self, fut: F)
    where
        F: Future<Output = CoreEvent> + Send + 'static,
    {
        let tx = self.event_tx.clone();
        tokio::spawn(async move {
            let evt = fut.await;
            if tx.send(evt).await.is_err() {
                debug!("AppCore: gone before task result arrived");
            }
        });
    }

    fn probe_session(&self) {
        let session = self.session.clone();
        self.spawn_event(async move { CoreEvent::SessionResolved(session.probe().await) });
    }

    fn refresh_catalog(&self) {
        let catalog = Arc::clone(&self.catalog);
        self.spawn_event(async move { CoreEvent::CatalogRefreshed(catalog.refresh_core().await) });
    }

    fn refresh_limits(&mut self) {
        let tx = self.event_tx.clone();
        let session = self.session_gen;
        self.downloads.refresh_limits(move |result| {
            if tx.try_send(CoreEvent::LimitsUpdated { session, result }).is_err() {
                debug!("AppCore: limits update dropped");
            }
        });
    }

    fn apply_route(&mut self, route: RouteChange) {
        debug!(page = ?route.page, reset = route.reset_home, "AppCore: route");
        if route.reset_home {
            self.active_tab = ViewKind::ForYou;
            self.nav.reset(ViewState::for_you());
        }
        if route.from_premium {
            self.return_to_premium = true;
        }
        if route.login_success {
            self.notifier.success("Login successful");
            self.probe_session();
        }
        self.search_query = match route.page {
            Page::Search => route.search_query,
            _ => None,
        };
        self.page = route.page;
    }

    fn on_session(&mut self, user: Option<CurrentUser>) {
        let Some(user) = user else {
            self.clear_session();
            return;
        };
        info!(email = %user.email, plan = user.plan_label(), "AppCore: session resolved");
        self.user = Some(user);
        self.session_gen += 1;

        let session = self.session.clone();
        let generation = self.session_gen;
        self.spawn_event(async move {
            CoreEvent::FavoritesLoaded {
                session: generation,
                result: session.load_favorites().await,
            }
        });
        self.refresh_limits();

        if std::mem::take(&mut self.return_to_premium) {
            let route = self.deep_link.navigate("/premium");
            self.apply_route(route);
        }
    }

    /// Drops the user and everything scoped to them. Publishes no
    /// notification; callers add one where wanted.
    fn clear_session(&mut self) {
        if self.user.is_some() {
            info!("AppCore: session cleared");
        }
        self.user = None;
        self.session_gen += 1;
        self.favourites.clear();
        self.download_limits = None;
        self.downloads.cancel_badge_refresh();
    }

    fn is_current_session(&self, generation: u64) -> bool {
        self.user.is_some() && generation == self.session_gen
    }

    fn is_premium(&self) -> bool {
        self.user
            .as_ref()
            .is_some_and(|u| u.has_active_premium(Utc::now()))
    }

    /// The list a song was started from becomes the queue: the current view
    /// if it contains the song, otherwise search results, otherwise the song
    /// alone.
    fn queue_for(&self, song: &Song) -> Vec<Song> {
        if let ViewContent::Songs(list) = resolve_view(self.nav.current(), &self.data, &self.favourites) {
            if list.iter().any(|s| s.id == song.id) {
                return list;
            }
        }
        if let (Page::Search, Some(q)) = (&self.page, &self.search_query) {
            let results = search_songs(&self.data.songs, q);
            if results.iter().any(|s| s.id == song.id) {
                return results;
            }
        }
        if let Some(rec) = &self.recommended {
            if rec.songs.iter().any(|s| s.id == song.id) {
                return rec.songs.clone();
            }
        }
        vec![song.clone()]
    }

    /// URL sync, analytics and persistence for a song that just started.
    async fn song_started(&mut self, song: &Song) {
        self.deep_link.set_track(&song.id);
        self.tracker.track(&song.id, InteractionKind::Play, None);
        self.tracker
            .track_taste(song, InteractionKind::Play, None, self.user.is_some());
        self.publish().await;
        self.persist().await;
    }

    /// Waits for a successful song load before spending the one-shot.
    async fn try_autoplay(&mut self) {
        if !self.data.songs_loaded {
            return;
        }
        let songs = Arc::clone(&self.data.songs);
        let Some(song) = self.deep_link.take_autoplay(songs.as_slice()).cloned() else {
            return;
        };
        let queue = self.queue_for(&song);
        self.playback.set_queue(queue);
        let started = self.playback.play_song(song);
        self.song_started(&started).await;
    }

    fn toggle_favorite(&mut self, song_id: String) {
        if self.user.is_none() {
            self.notifier.warning("Please log in to save favourites");
            return;
        }
        let Some(song) = self.data.song(&song_id).cloned() else {
            self.notifier.warning("That song is no longer available");
            return;
        };

        let was_favorite = self.favourites.contains(&song_id);
        let kind = if was_favorite {
            self.favourites.remove(&song_id);
            InteractionKind::Unfavorite
        } else {
            self.favourites.insert(song_id.clone());
            InteractionKind::Favorite
        };
        self.tracker.track(&song_id, kind, None);
        self.tracker.track_taste(&song, kind, None, true);

        let session = self.session.clone();
        let generation = self.session_gen;
        let tx = self.event_tx.clone();
        tokio::spawn(async move {
            let result = if was_favorite {
                session.remove_favorite(&song_id).await
            } else {
                session.add_favorite(&song_id).await
            };
            if let Err(error) = result {
                let _ = tx
                    .send(CoreEvent::FavoriteFailed {
                        session: generation,
                        song_id,
                        was_favorite,
                        error,
                    })
                    .await;
            }
        });
    }

    fn start_download(&mut self, song_id: &str) {
        let Some(song) = self.data.song(song_id).cloned() else {
            self.notifier.warning("Song data is incomplete");
            return;
        };
        let premium = self.is_premium();
        let user = self.user.clone();
        let runner = self.downloads.runner();
        self.overlay.show("download");
        self.spawn_event(async move {
            let result = runner.download(&song, user.as_ref()).await;
            CoreEvent::DownloadFinished {
                song,
                premium,
                result,
            }
        });
    }

    fn on_download_finished(&mut self, song: Song, premium: bool, result: Result<DownloadOutcome>) {
        match result {
            Ok(outcome) => {
                self.notifier.publish_note(outcome.notification(&song.title));
                if let DownloadOutcome::Saved {
                    path,
                    remaining,
                    ..
                } = &outcome
                {
                    info!(song_id = %song.id, path = ?path, "AppCore: download saved");
                    self.tracker.track(&song.id, InteractionKind::Download, None);
                    self.tracker.track_taste(
                        &song,
                        InteractionKind::Download,
                        None,
                        self.user.is_some(),
                    );
                    if let (Some(remaining), Some(limits)) = (remaining, self.download_limits.as_mut()) {
                        limits.remaining = *remaining;
                    }
                }
                if outcome.issued_licence() {
                    self.refresh_limits();
                }
            }
            Err(e) => {
                if e.is_unauthorized() {
                    self.clear_session();
                }
                self.notifier
                    .publish_note(downloads::error_notification(&e, premium));
            }
        }
    }

    fn on_recommendation(&mut self, result: Result<Recommendation>) {
        match result {
            Ok(rec) => {
                let resolved = recommend::resolve(&rec, &self.data);
                if resolved.songs.is_empty() {
                    self.notifier
                        .info("No matching songs yet. Try describing the mood differently");
                }
                self.recommended = Some(resolved);
                if self.page != Page::Ai {
                    let route = self.deep_link.navigate("/ai");
                    self.apply_route(route);
                }
            }
            Err(e) if e.is_quota() => {
                self.notifier.warning(recommend::quota_message(self.is_premium()));
            }
            Err(e) if e.is_unauthorized() => {
                self.clear_session();
                self.notifier.warning("Please log in to use the assistant");
            }
            Err(ClientError::Validation(msg)) => {
                self.notifier.warning(msg);
            }
            Err(e) => {
                self.notifier.error(format!("Assistant unavailable: {}", e));
            }
        }
    }

    async fn persist(&self) {
        if let Err(e) = self.state.save().await {
            warn!("AppCore: failed to persist state: {}", e);
        }
    }

    /// Stores a fresh snapshot and announces it.
    async fn publish(&self) {
        let content = resolve_view(self.nav.current(), &self.data, &self.favourites);
        let search_song_ids = match (&self.page, &self.search_query) {
            (Page::Search, Some(q)) => search_songs(&self.data.songs, q)
                .into_iter()
                .map(|s| s.id)
                .collect(),
            _ => Vec::new(),
        };
        let mut favourites: Vec<String> = self.favourites.iter().cloned().collect();
        favourites.sort();

        let next = AppSnapshot {
            rev: 0,
            page: self.page.clone(),
            url: self.deep_link.location(),
            active_tab: self.active_tab,
            view: self.nav.current().clone(),
            nav_depth: self.nav.len(),
            view_len: content.len(),
            view_song_ids: content.song_ids(),
            search_query: self.search_query.clone(),
            search_song_ids,
            load_stage: self.load_stage,
            overlay_visible: self.overlay.is_visible(),
            playback: self.playback.snapshot(),
            catalog: self.data.counts(),
            user: self.user.clone(),
            favourites,
            download_limits: self.download_limits.clone(),
            assistant_message: self.recommended.as_ref().map(|r| r.message.clone()),
            assistant_song_ids: self
                .recommended
                .as_ref()
                .map(|r| r.songs.iter().map(|s| s.id.clone()).collect())
                .unwrap_or_default(),
        };

        let snap = self
            .state
            .update(move |s| {
                let rev = s.rev;
                *s = next;
                s.rev = rev;
            })
            .await;
        let _ = self
            .broadcast_tx
            .send(BroadcastMessage::StateUpdated(Box::new(snap)));
    }
}

async fn recv_media(rx: &mut Option<mpsc::UnboundedReceiver<MediaEvent>>) -> Option<MediaEvent> {
    match rx {
        Some(rx) => rx.recv().await,
        None => std::future::pending().await,
    }
}
