//! In-process stand-in for the data and auth backends.
//!
//! Both backends are served from one axum router; every handler bumps a
//! per-route counter so tests can assert how many requests went out.

#![allow(dead_code)]

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{delete, get, post};
use axum::{Json, Router};
use serde_json::{json, Value};
use tokio::net::TcpListener;

use vara_proto::config::BackendConfig;

/// Knobs a test flips before (or while) the client talks to the mock.
#[derive(Debug)]
pub struct MockState {
    pub songs_delay: Duration,
    pub fail_songs: bool,
    /// Served in order; the last one repeats.
    pub versions: VecDeque<Value>,
    pub fail_version: bool,
    pub logged_in: bool,
    pub premium: bool,
    pub remaining: u32,
    pub quota_on_track_download: bool,
    pub fail_favorites: bool,
    pub license_delay: Duration,
    pub recommend_quota: bool,
}

impl Default for MockState {
    fn default() -> Self {
        Self {
            songs_delay: Duration::ZERO,
            fail_songs: false,
            versions: VecDeque::from([json!(1)]),
            fail_version: false,
            logged_in: false,
            premium: false,
            remaining: 5,
            quota_on_track_download: false,
            fail_favorites: false,
            license_delay: Duration::ZERO,
            recommend_quota: false,
        }
    }
}

pub struct Mock {
    base: String,
    pub state: Mutex<MockState>,
    hits: Mutex<HashMap<&'static str, usize>>,
    bodies: Mutex<Vec<(String, Value)>>,
}

impl Mock {
    fn hit(&self, route: &'static str) {
        *self.hits.lock().unwrap().entry(route).or_default() += 1;
    }

    fn record(&self, path: String, body: Value) {
        self.bodies.lock().unwrap().push((path, body));
    }

    pub fn hits(&self, route: &str) -> usize {
        self.hits.lock().unwrap().get(route).copied().unwrap_or(0)
    }

    /// Request bodies posted to `path`, oldest first.
    pub fn bodies(&self, path: &str) -> Vec<Value> {
        self.bodies
            .lock()
            .unwrap()
            .iter()
            .filter(|(p, _)| p == path)
            .map(|(_, b)| b.clone())
            .collect()
    }

    pub fn set(&self, f: impl FnOnce(&mut MockState)) {
        f(&mut self.state.lock().unwrap());
    }
}

pub struct MockServer {
    pub base: String,
    pub mock: Arc<Mock>,
}

impl MockServer {
    pub async fn start() -> Self {
        Self::start_with(MockState::default()).await
    }

    pub async fn start_with(state: MockState) -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let base = format!("http://{}", listener.local_addr().unwrap());
        let mock = Arc::new(Mock {
            base: base.clone(),
            state: Mutex::new(state),
            hits: Mutex::new(HashMap::new()),
            bodies: Mutex::new(Vec::new()),
        });

        let app = Router::new()
            .route("/api/songs", get(songs))
            .route("/api/songs/trending", get(trending))
            .route("/api/songs/track/:id", post(track))
            .route("/api/genres", get(genres))
            .route("/api/subgenres", get(sub_genres))
            .route("/api/instruments", get(instruments))
            .route("/api/moods", get(moods))
            .route("/api/content/version", get(version))
            .route("/audio/:file", get(audio))
            .route("/api/user", get(user))
            .route("/api/logout", post(logout))
            .route("/api/user/favorites", get(favorites).post(add_favorite))
            .route("/api/user/favorites/:id", delete(remove_favorite))
            .route("/api/user/taste-interaction", post(taste))
            .route("/api/user/limits", get(limits))
            .route("/api/user/track-download", post(track_download))
            .route("/api/user/youtube-channel", post(youtube_channel))
            .route("/api/files/song/:id", get(song_file))
            .route("/api/license/verify", get(verify_license))
            .route("/api/license/my", get(my_licenses))
            .route("/api/billing/plans", get(plans))
            .route("/api/billing/order", post(create_order))
            .route("/api/billing/verify", post(verify_payment))
            .route("/api/billing/simulate", post(simulate))
            .route("/api/ai/recommend", post(recommend))
            .with_state(mock.clone());

        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        Self { base, mock }
    }

    pub fn backend(&self) -> BackendConfig {
        BackendConfig {
            data_url: self.base.clone(),
            auth_url: self.base.clone(),
            request_timeout_secs: 5,
            license_timeout_secs: 1,
            ..Default::default()
        }
    }

    pub fn audio_url(&self, id: &str) -> String {
        format!("{}/audio/{}.mp3", self.base, id)
    }
}

type Shared = State<Arc<Mock>>;

fn tags(ids: &[&str]) -> Value {
    Value::Array(ids.iter().map(|id| json!({ "_id": id, "name": id })).collect())
}

/// Catalog fixture: s1 free, s2 premium, s3 paid, plus one broken entry
/// the client must drop.
pub fn catalog_songs(base: &str) -> Value {
    json!([
        {
            "_id": "s1", "title": "Morning Raga", "audioUrl": format!("{}/audio/s1.mp3", base),
            "duration": 200.0, "collectionType": "free",
            "genres": tags(&["g1"]), "subGenres": tags(&["sg1"]),
            "moods": tags(&["m1"]), "instruments": tags(&["i1"])
        },
        {
            "_id": "s2", "title": "Night Drive", "audioUrl": format!("{}/audio/s2.mp3", base),
            "duration": 180.0, "collectionType": "premium",
            "genres": tags(&["g1"]), "subGenres": tags(&["sg1"]),
            "moods": tags(&["m2"]), "instruments": tags(&["i1"])
        },
        {
            "_id": "s3", "title": "Paid/Track", "audioUrl": format!("{}/audio/s3.mp3", base),
            "collectionType": "paid", "genres": tags(&["g2"])
        },
        { "_id": "broken", "title": "No Audio" }
    ])
}

async fn songs(State(m): Shared) -> Response {
    m.hit("songs");
    let (delay, fail) = {
        let s = m.state.lock().unwrap();
        (s.songs_delay, s.fail_songs)
    };
    tokio::time::sleep(delay).await;
    if fail {
        return (StatusCode::INTERNAL_SERVER_ERROR, "songs unavailable").into_response();
    }
    Json(catalog_songs(&m.base)).into_response()
}

async fn trending(State(m): Shared) -> Json<Value> {
    m.hit("trending");
    Json(json!([{
        "_id": "s2", "title": "Night Drive",
        "audioUrl": format!("{}/audio/s2.mp3", m.base), "collectionType": "premium"
    }]))
}

async fn genres(State(m): Shared) -> Json<Value> {
    m.hit("genres");
    Json(json!([{ "_id": "g1", "name": "Classical" }, { "_id": "g2", "name": "Electronic" }]))
}

async fn sub_genres(State(m): Shared) -> Json<Value> {
    m.hit("subgenres");
    Json(json!([{ "_id": "sg1", "name": "Hindustani", "genre": { "_id": "g1", "name": "Classical" } }]))
}

async fn instruments(State(m): Shared) -> Json<Value> {
    m.hit("instruments");
    Json(json!([{ "_id": "i1", "name": "Sitar" }]))
}

async fn moods(State(m): Shared) -> Json<Value> {
    m.hit("moods");
    Json(json!([{ "_id": "m1", "name": "Calm" }, { "_id": "m2", "name": "Late Night" }]))
}

async fn version(State(m): Shared) -> Response {
    m.hit("version");
    let mut s = m.state.lock().unwrap();
    if s.fail_version {
        return StatusCode::SERVICE_UNAVAILABLE.into_response();
    }
    let v = if s.versions.len() > 1 {
        s.versions.pop_front().unwrap_or(Value::Null)
    } else {
        s.versions.front().cloned().unwrap_or(Value::Null)
    };
    Json(json!({ "v": v, "updatedAt": "2026-01-01T00:00:00Z" })).into_response()
}

async fn track(State(m): Shared, Path(id): Path<String>, Json(body): Json<Value>) -> StatusCode {
    m.hit("track");
    m.record(format!("/api/songs/track/{}", id), body);
    StatusCode::NO_CONTENT
}

async fn audio(State(m): Shared, Path(file): Path<String>) -> Vec<u8> {
    m.hit("audio");
    format!("free-audio:{}", file).into_bytes()
}

async fn user(State(m): Shared) -> Response {
    m.hit("user");
    let s = m.state.lock().unwrap();
    if !s.logged_in {
        return (StatusCode::UNAUTHORIZED, Json(json!({ "message": "not logged in" }))).into_response();
    }
    Json(json!({
        "user": {
            "email": "asha@example.com",
            "name": "Asha",
            "is_premium": s.premium,
            "premium_expires_at": if s.premium { json!("2099-01-01T00:00:00Z") } else { Value::Null }
        }
    }))
    .into_response()
}

async fn logout(State(m): Shared) -> StatusCode {
    m.hit("logout");
    m.set(|s| s.logged_in = false);
    StatusCode::OK
}

async fn favorites(State(m): Shared) -> Response {
    m.hit("favorites");
    if !m.state.lock().unwrap().logged_in {
        return StatusCode::UNAUTHORIZED.into_response();
    }
    Json(json!({ "favorites": [{ "_id": "s1", "title": "Morning Raga" }] })).into_response()
}

async fn add_favorite(State(m): Shared, Json(body): Json<Value>) -> StatusCode {
    m.hit("add_favorite");
    m.record("/api/user/favorites".into(), body);
    if m.state.lock().unwrap().fail_favorites {
        StatusCode::INTERNAL_SERVER_ERROR
    } else {
        StatusCode::OK
    }
}

async fn remove_favorite(State(m): Shared, Path(_id): Path<String>) -> StatusCode {
    m.hit("remove_favorite");
    if m.state.lock().unwrap().fail_favorites {
        StatusCode::INTERNAL_SERVER_ERROR
    } else {
        StatusCode::OK
    }
}

async fn taste(State(m): Shared, Json(body): Json<Value>) -> StatusCode {
    m.hit("taste");
    m.record("/api/user/taste-interaction".into(), body);
    StatusCode::OK
}

async fn limits(State(m): Shared) -> Response {
    m.hit("limits");
    let s = m.state.lock().unwrap();
    if !s.logged_in {
        return StatusCode::UNAUTHORIZED.into_response();
    }
    let (limit, plan) = if s.premium { (50, "premium") } else { (5, "free") };
    Json(json!({ "remaining": s.remaining, "limit": limit, "plan": plan })).into_response()
}

async fn track_download(State(m): Shared, Json(body): Json<Value>) -> Response {
    m.hit("track_download");
    m.record("/api/user/track-download".into(), body);
    let mut s = m.state.lock().unwrap();
    if s.quota_on_track_download || s.remaining == 0 {
        return (
            StatusCode::TOO_MANY_REQUESTS,
            Json(json!({ "message": "Download limit reached" })),
        )
            .into_response();
    }
    s.remaining -= 1;
    Json(json!({ "licenseId": "LIC-1", "remaining": s.remaining })).into_response()
}

async fn youtube_channel(State(m): Shared, Json(body): Json<Value>) -> StatusCode {
    m.hit("youtube");
    m.record("/api/user/youtube-channel".into(), body);
    StatusCode::OK
}

async fn song_file(State(m): Shared, Path(id): Path<String>) -> Vec<u8> {
    m.hit("song_file");
    format!("licensed-audio:{}", id).into_bytes()
}

async fn verify_license(State(m): Shared, Query(q): Query<HashMap<String, String>>) -> Json<Value> {
    m.hit("verify");
    let delay = m.state.lock().unwrap().license_delay;
    tokio::time::sleep(delay).await;
    match q.get("id").map(String::as_str) {
        Some("LIC-1") => Json(json!({
            "valid": true,
            "license": { "licenseId": "LIC-1", "songId": "s2", "songTitle": "Night Drive" }
        })),
        _ => Json(json!({ "valid": false })),
    }
}

async fn my_licenses(State(m): Shared) -> Json<Value> {
    m.hit("licenses");
    Json(json!({ "licenses": [{ "licenseId": "LIC-1", "songId": "s2" }] }))
}

async fn plans(State(m): Shared) -> Json<Value> {
    m.hit("plans");
    Json(json!({ "plans": [
        { "_id": "monthly", "name": "Monthly", "amount": 19900, "durationDays": 30 },
        { "_id": "yearly", "name": "Yearly", "amount": 199900, "currency": "INR", "durationDays": 365 }
    ] }))
}

async fn create_order(State(m): Shared, Json(body): Json<Value>) -> Json<Value> {
    m.hit("order");
    m.record("/api/billing/order".into(), body);
    Json(json!({ "orderId": "order_1", "amount": 19900, "keyId": "rzp_test" }))
}

async fn verify_payment(State(m): Shared, Json(body): Json<Value>) -> StatusCode {
    m.hit("payment_verify");
    m.record("/api/billing/verify".into(), body);
    m.set(|s| s.premium = true);
    StatusCode::OK
}

async fn simulate(State(m): Shared, Json(body): Json<Value>) -> StatusCode {
    m.hit("simulate");
    m.record("/api/billing/simulate".into(), body);
    m.set(|s| s.premium = true);
    StatusCode::OK
}

async fn recommend(State(m): Shared, Json(body): Json<Value>) -> Response {
    m.hit("recommend");
    m.record("/api/ai/recommend".into(), body);
    if m.state.lock().unwrap().recommend_quota {
        return (
            StatusCode::TOO_MANY_REQUESTS,
            Json(json!({ "message": "Daily limit reached" })),
        )
            .into_response();
    }
    Json(json!({ "message": "Try these", "songIds": ["s2", "gone", "s1"] })).into_response()
}
