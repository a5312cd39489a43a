//! Two-way sync between the location (path + query) and in-memory state.
//!
//! Location → state happens on every navigation. State → location only
//! touches the `track` parameter and never counts as a navigation.

use reqwest::Url;
use tracing::{debug, info, warn};

use vara_proto::model::Song;
use vara_proto::protocol::Page;

const ORIGIN: &str = "http://vara.local";
const TRACK_PARAM: &str = "track";
const INFO_PAGES: &[&str] = &["about", "contact", "privacy", "terms", "refund", "licensing"];

/// What a navigation means for the rest of the app.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RouteChange {
    pub page: Page,
    /// The view stack and tab should go back to "for you".
    pub reset_home: bool,
    /// `q` of a `/search` route.
    pub search_query: Option<String>,
    /// `login=success` marker was present.
    pub login_success: bool,
    /// `from=premium` marker was present.
    pub from_premium: bool,
}

#[derive(Debug)]
pub struct DeepLinkReconciler {
    location: Url,
    suppress_home_reset: bool,
    autoplay_attempted: bool,
}

impl Default for DeepLinkReconciler {
    fn default() -> Self {
        Self::new("/home")
    }
}

impl DeepLinkReconciler {
    /// `initial` is the location the app was opened with, e.g.
    /// `/home?track=abc123`.
    pub fn new(initial: &str) -> Self {
        let location = parse_location(initial).unwrap_or_else(|| {
            warn!("deep link: unparsable start location {:?}", initial);
            home()
        });
        Self {
            location,
            suppress_home_reset: false,
            autoplay_attempted: false,
        }
    }

    /// Path plus query, as a front end would display it.
    pub fn location(&self) -> String {
        match self.location.query() {
            Some(q) if !q.is_empty() => format!("{}?{}", self.location.path(), q),
            _ => self.location.path().to_string(),
        }
    }

    pub fn path(&self) -> &str {
        self.location.path()
    }

    pub fn query_param(&self, key: &str) -> Option<String> {
        self.location
            .query_pairs()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.into_owned())
    }

    pub fn track_param(&self) -> Option<String> {
        self.query_param(TRACK_PARAM).filter(|v| !v.is_empty())
    }

    /// Keeps the next navigation to `/home` from resetting the view stack.
    pub fn suppress_next_home_reset(&mut self) {
        self.suppress_home_reset = true;
    }

    /// Moves to `target` and derives the page state for it.
    pub fn navigate(&mut self, target: &str) -> RouteChange {
        match parse_location(target) {
            Some(url) => self.location = url,
            None => {
                warn!("deep link: cannot parse {:?}, going home", target);
                self.location = home();
            }
        }
        debug!("deep link: navigate {}", self.location());
        self.current_route()
    }

    /// Derives page state from the current location. Consumes the
    /// home-reset suppression and the one-shot redirect markers.
    pub fn current_route(&mut self) -> RouteChange {
        let path = self.location.path().trim_end_matches('/').to_string();
        let login_success = self.query_param("login").as_deref() == Some("success");
        let from_premium = self.query_param("from").as_deref() == Some("premium");
        if login_success || from_premium {
            self.remove_params(&["login", "from"]);
        }

        let mut search_query = None;
        let page = match path.as_str() {
            "" | "/home" => Page::Home,
            "/login" => Page::Login,
            "/premium" => Page::Premium,
            "/ai" => Page::Ai,
            "/search" => {
                search_query = Some(self.query_param("q").unwrap_or_default());
                Page::Search
            }
            other => {
                let slug = other.trim_start_matches('/');
                if INFO_PAGES.contains(&slug) {
                    Page::Info(slug.to_string())
                } else {
                    Page::NotFound
                }
            }
        };

        let reset_home = if page == Page::Home {
            // consumed by the first home navigation after it was armed
            !std::mem::take(&mut self.suppress_home_reset)
        } else {
            false
        };

        RouteChange {
            page,
            reset_home,
            search_query,
            login_success,
            from_premium,
        }
    }

    /// Records the playing song in the location without navigating.
    pub fn set_track(&mut self, song_id: &str) {
        self.replace_param(TRACK_PARAM, Some(song_id));
    }

    pub fn clear_track(&mut self) {
        self.replace_param(TRACK_PARAM, None);
    }

    /// The song to autoplay from the start location. Runs at most once per
    /// reconciler; call it only after the song catalog has loaded.
    pub fn take_autoplay<'a>(&mut self, songs: &'a [Song]) -> Option<&'a Song> {
        if std::mem::replace(&mut self.autoplay_attempted, true) {
            return None;
        }
        let id = self.track_param()?;
        match songs.iter().find(|s| s.id == id) {
            Some(song) => {
                info!(song_id = %id, "deep link: autoplay");
                Some(song)
            }
            None => {
                warn!(song_id = %id, "deep link: track not in catalog");
                None
            }
        }
    }

    pub fn autoplay_attempted(&self) -> bool {
        self.autoplay_attempted
    }

    fn replace_param(&mut self, key: &str, value: Option<&str>) {
        let kept: Vec<(String, String)> = self
            .location
            .query_pairs()
            .filter(|(k, _)| k != key)
            .map(|(k, v)| (k.into_owned(), v.into_owned()))
            .collect();

        self.set_query(kept.iter().map(|(k, v)| (k.as_str(), v.as_str())).chain(
            value.map(|v| (key, v)),
        ));
    }

    fn remove_params(&mut self, keys: &[&str]) {
        let kept: Vec<(String, String)> = self
            .location
            .query_pairs()
            .filter(|(k, _)| !keys.contains(&k.as_ref()))
            .map(|(k, v)| (k.into_owned(), v.into_owned()))
            .collect();
        self.set_query(kept.iter().map(|(k, v)| (k.as_str(), v.as_str())));
    }

    fn set_query<'a, I>(&mut self, pairs: I)
    where
        I: Iterator<Item = (&'a str, &'a str)>,
    {
        let mut pairs = pairs.peekable();
        if pairs.peek().is_none() {
            self.location.set_query(None);
            return;
        }
        self.location.query_pairs_mut().clear().extend_pairs(pairs);
    }
}

fn home() -> Url {
    Url::parse(&format!("{}/home", ORIGIN)).expect("static origin is a valid url")
}

fn parse_location(target: &str) -> Option<Url> {
    let base = Url::parse(ORIGIN).ok()?;
    let target = target.trim();
    let url = if target.is_empty() {
        base.join("/home").ok()?
    } else {
        base.join(target).ok()?
    };
    // external links stay out of the app's location
    (url.origin() == base.origin()).then_some(url)
}

#[cfg(test)]
mod tests {
    use super::*;
    use vara_proto::model::CollectionType;

    fn song(id: &str) -> Song {
        Song {
            id: id.into(),
            title: id.into(),
            audio_url: format!("https://cdn.test/{}.mp3", id),
            image_url: String::new(),
            duration: 60.0,
            collection_type: CollectionType::Free,
            genres: Vec::new(),
            sub_genres: Vec::new(),
            instruments: Vec::new(),
            moods: Vec::new(),
        }
    }

    #[test]
    fn known_paths_map_to_pages() {
        let mut dl = DeepLinkReconciler::default();
        assert_eq!(dl.navigate("/login").page, Page::Login);
        assert_eq!(dl.navigate("/premium").page, Page::Premium);
        assert_eq!(dl.navigate("/ai").page, Page::Ai);
        assert_eq!(dl.navigate("/terms").page, Page::Info("terms".into()));
        assert_eq!(dl.navigate("/nope").page, Page::NotFound);

        let search = dl.navigate("/search?q=lofi%20beats");
        assert_eq!(search.page, Page::Search);
        assert_eq!(search.search_query.as_deref(), Some("lofi beats"));

        let home = dl.navigate("/home");
        assert_eq!(home.page, Page::Home);
        assert!(home.reset_home);
    }

    #[test]
    fn home_reset_suppressed_exactly_once() {
        let mut dl = DeepLinkReconciler::default();
        dl.suppress_next_home_reset();
        assert!(!dl.navigate("/search?q=x").reset_home);
        assert!(!dl.navigate("/home").reset_home);
        assert!(dl.navigate("/home").reset_home);
    }

    #[test]
    fn track_param_round_trip() {
        let mut dl = DeepLinkReconciler::new("/home?tab=x");
        dl.set_track("abc123");
        assert_eq!(dl.track_param().as_deref(), Some("abc123"));
        assert!(dl.location().contains("track=abc123"));
        assert!(dl.location().contains("tab=x"));

        dl.set_track("def");
        assert_eq!(dl.track_param().as_deref(), Some("def"));

        dl.clear_track();
        assert_eq!(dl.track_param(), None);
        assert_eq!(dl.location(), "/home?tab=x");

        let mut bare = DeepLinkReconciler::default();
        bare.set_track("abc123");
        bare.clear_track();
        assert_eq!(bare.location(), "/home");
    }

    #[test]
    fn autoplay_fires_once() {
        let songs = vec![song("zzz"), song("abc123")];
        let mut dl = DeepLinkReconciler::new("/home?track=abc123");
        assert_eq!(dl.take_autoplay(&songs).map(|s| s.id.as_str()), Some("abc123"));
        assert!(dl.take_autoplay(&songs).is_none());
    }

    #[test]
    fn autoplay_with_unknown_track_never_retries() {
        let mut dl = DeepLinkReconciler::new("/home?track=missing");
        assert!(dl.take_autoplay(&[]).is_none());
        assert!(dl.autoplay_attempted());
        assert!(dl.take_autoplay(&[song("missing")]).is_none());
    }

    #[test]
    fn redirect_markers_are_consumed() {
        let mut dl = DeepLinkReconciler::default();
        let route = dl.navigate("/home?login=success&track=a1");
        assert!(route.login_success);
        assert_eq!(dl.location(), "/home?track=a1");

        let route = dl.navigate("/login?from=premium");
        assert!(route.from_premium);
        assert_eq!(route.page, Page::Login);
        assert_eq!(dl.location(), "/login");
    }

    #[test]
    fn external_targets_fall_back_home() {
        let mut dl = DeepLinkReconciler::default();
        assert_eq!(dl.navigate("https://evil.example/home").page, Page::Home);
        assert_eq!(dl.location(), "/home");
    }
}
