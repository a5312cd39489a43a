mod common;

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use serde_json::json;

use common::{MockServer, MockState};
use vara_client::api::{ApiClient, VersionStamp};
use vara_client::version_watcher::{ContentVersionWatcher, Trigger};
use vara_proto::model::ContentVersion;

const PATH: &str = "/api/content/version";

fn watch(server: &MockServer) -> (ContentVersionWatcher, Arc<Mutex<Vec<VersionStamp>>>) {
    let api = ApiClient::new(&server.backend()).unwrap();
    let seen = Arc::new(Mutex::new(Vec::new()));
    let sink = seen.clone();
    let watcher = ContentVersionWatcher::spawn(
        api,
        PATH.into(),
        Duration::from_secs(60),
        Duration::from_millis(1000),
        move |stamp| sink.lock().unwrap().push(stamp),
    );
    (watcher, seen)
}

#[tokio::test]
async fn triggers_inside_cooldown_collapse() {
    let server = MockServer::start().await;
    let (watcher, seen) = watch(&server);

    watcher.notify(Trigger::Focus);
    watcher.notify(Trigger::Visible);
    tokio::time::sleep(Duration::from_millis(300)).await;

    assert_eq!(server.mock.hits("version"), 1);
    assert!(seen.lock().unwrap().is_empty(), "first stamp only seeds");
}

#[tokio::test]
async fn change_is_reported_once() {
    let server = MockServer::start_with(MockState {
        versions: VecDeque::from([json!(5), json!(5), json!(7)]),
        ..Default::default()
    })
    .await;
    let (watcher, seen) = watch(&server);

    tokio::time::sleep(Duration::from_millis(1100)).await;
    watcher.notify(Trigger::Focus);
    tokio::time::sleep(Duration::from_millis(1100)).await;
    watcher.notify(Trigger::Visible);
    tokio::time::sleep(Duration::from_millis(1100)).await;
    watcher.notify(Trigger::Focus);
    tokio::time::sleep(Duration::from_millis(300)).await;

    assert_eq!(server.mock.hits("version"), 4);
    let seen = seen.lock().unwrap();
    assert_eq!(seen.len(), 1);
    assert_eq!(seen[0].version, ContentVersion::Number(7));
    assert_eq!(seen[0].payload["updatedAt"], "2026-01-01T00:00:00Z");
}

#[tokio::test]
async fn poll_failures_are_silent() {
    let server = MockServer::start_with(MockState {
        fail_version: true,
        ..Default::default()
    })
    .await;
    let (watcher, seen) = watch(&server);

    tokio::time::sleep(Duration::from_millis(1100)).await;
    watcher.notify(Trigger::Focus);
    tokio::time::sleep(Duration::from_millis(300)).await;

    assert_eq!(server.mock.hits("version"), 2);
    assert!(seen.lock().unwrap().is_empty());
    assert!(watcher.is_running());
}

#[tokio::test]
async fn stop_ends_the_task() {
    let server = MockServer::start().await;
    let (watcher, _seen) = watch(&server);
    tokio::time::sleep(Duration::from_millis(100)).await;

    watcher.stop();
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert!(!watcher.is_running());

    watcher.notify(Trigger::Focus);
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert_eq!(server.mock.hits("version"), 1);
}
