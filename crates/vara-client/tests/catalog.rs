mod common;

use std::time::Duration;

use common::MockServer;
use vara_client::api::{ApiClient, Backend};
use vara_client::catalog::Catalog;
use vara_client::error::ClientError;

fn catalog(server: &MockServer) -> Catalog {
    let api = ApiClient::new(&server.backend()).unwrap();
    Catalog::new(&api, 10)
}

#[tokio::test]
async fn concurrent_fetches_share_one_request() {
    let server = MockServer::start().await;
    server.mock.set(|s| s.songs_delay = Duration::from_millis(200));
    let catalog = catalog(&server);

    let (a, b) = tokio::join!(catalog.songs().fetch(), catalog.songs().fetch());
    let (a, b) = (a.unwrap(), b.unwrap());

    assert_eq!(server.mock.hits("songs"), 1);
    assert_eq!(a.len(), 3, "entry without audio url is dropped");
    assert_eq!(a, b);
    assert!(catalog.songs().is_loaded().await);
}

#[tokio::test]
async fn loaded_resource_is_served_from_memory() {
    let server = MockServer::start().await;
    let catalog = catalog(&server);

    catalog.songs().fetch().await.unwrap();
    catalog.songs().fetch().await.unwrap();
    assert_eq!(server.mock.hits("songs"), 1);

    catalog.songs().refresh().await.unwrap();
    assert_eq!(server.mock.hits("songs"), 2);
}

#[tokio::test]
async fn failed_fetch_is_retried_next_time() {
    let server = MockServer::start().await;
    server.mock.set(|s| s.fail_songs = true);
    let catalog = catalog(&server);

    let err = catalog.songs().fetch().await.unwrap_err();
    assert!(matches!(err, ClientError::Status { status: 500, .. }), "{:?}", err);
    assert!(!catalog.songs().is_loaded().await);
    assert!(catalog.songs().data().await.is_empty());

    server.mock.set(|s| s.fail_songs = false);
    let songs = catalog.songs().fetch().await.unwrap();
    assert_eq!(songs.len(), 3);
    assert_eq!(server.mock.hits("songs"), 2);
}

#[tokio::test]
async fn load_all_hits_every_resource_once() {
    let server = MockServer::start().await;
    let catalog = catalog(&server);

    let data = catalog.load_all().await;
    let counts = data.counts();
    assert_eq!(counts.songs, 3);
    assert_eq!(counts.genres, 2);
    assert_eq!(counts.sub_genres, 1);
    assert_eq!(counts.trending, 1);
    assert_eq!(counts.instruments, 1);
    assert_eq!(counts.moods, 2);
    assert_eq!(data.sub_genres[0].genre_id.as_deref(), Some("g1"));

    catalog.load_all().await;
    for route in ["songs", "genres", "subgenres", "trending", "instruments", "moods"] {
        assert_eq!(server.mock.hits(route), 1, "{}", route);
    }
}

#[tokio::test]
async fn refresh_core_skips_trending_and_instruments() {
    let server = MockServer::start().await;
    let catalog = catalog(&server);
    catalog.load_all().await;

    catalog.refresh_core().await;
    for route in ["songs", "genres", "subgenres", "moods"] {
        assert_eq!(server.mock.hits(route), 2, "{}", route);
    }
    assert_eq!(server.mock.hits("trending"), 1);
    assert_eq!(server.mock.hits("instruments"), 1);
}

#[tokio::test]
async fn failing_resource_keeps_previous_value() {
    let server = MockServer::start().await;
    let catalog = catalog(&server);
    catalog.load_all().await;

    server.mock.set(|s| s.fail_songs = true);
    let data = catalog.refresh_core().await;
    assert_eq!(data.songs.len(), 3);
    assert_eq!(data.genres.len(), 2);
}

#[tokio::test]
async fn raw_bytes_and_status_mapping() {
    let server = MockServer::start().await;
    let api = ApiClient::new(&server.backend()).unwrap();

    let body = api.get_bytes(Backend::Data, "/audio/s1.mp3").await.unwrap();
    assert_eq!(body, b"free-audio:s1.mp3");

    let err = api.get_bytes(Backend::Auth, "/api/user").await.unwrap_err();
    assert_eq!(err, ClientError::Unauthorized);
}
