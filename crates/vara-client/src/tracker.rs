use serde_json::{json, Map, Value};
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use vara_proto::model::Song;
use vara_proto::protocol::InteractionKind;

use crate::api::{ApiClient, Backend};

/// Fire-and-forget reporting of plays, favourites and downloads.
///
/// Nothing here blocks, retries or reports failure to the caller.
#[derive(Clone)]
pub struct InteractionTracker {
    api: ApiClient,
}

impl InteractionTracker {
    pub fn new(api: ApiClient) -> Self {
        Self { api }
    }

    /// Analytics event on the data backend.
    pub fn track(&self, song_id: &str, kind: InteractionKind, extra: Option<Value>) -> JoinHandle<()> {
        let mut body = Map::new();
        body.insert("type".into(), json!(kind));
        merge(&mut body, extra);

        let path = format!("/api/songs/track/{}", song_id);
        let api = self.api.clone();
        tokio::spawn(async move {
            match api.post_empty(Backend::Data, &path, &body).await {
                Ok(()) => debug!("tracker: {} ok", path),
                Err(e) => warn!("tracker: {} failed: {}", path, e),
            }
        })
    }

    /// Personalisation signal on the auth backend. Skipped when nobody is
    /// logged in.
    pub fn track_taste(
        &self,
        song: &Song,
        kind: InteractionKind,
        extra: Option<Value>,
        logged_in: bool,
    ) -> Option<JoinHandle<()>> {
        if !logged_in {
            return None;
        }

        let ids = |tags: &[vara_proto::model::Tag]| -> Vec<String> {
            tags.iter().map(|t| t.id.clone()).collect()
        };
        let mut body = Map::new();
        body.insert("songId".into(), json!(song.id));
        body.insert("type".into(), json!(kind));
        body.insert("genres".into(), json!(ids(&song.genres)));
        body.insert("subGenres".into(), json!(ids(&song.sub_genres)));
        body.insert("moods".into(), json!(ids(&song.moods)));
        body.insert("instruments".into(), json!(ids(&song.instruments)));
        merge(&mut body, extra);

        let api = self.api.clone();
        Some(tokio::spawn(async move {
            if let Err(e) = api
                .post_empty(Backend::Auth, "/api/user/taste-interaction", &body)
                .await
            {
                warn!("tracker: taste interaction failed: {}", e);
            }
        }))
    }
}

fn merge(body: &mut Map<String, Value>, extra: Option<Value>) {
    if let Some(Value::Object(extra)) = extra {
        for (k, v) in extra {
            body.entry(k).or_insert(v);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extra_fields_do_not_override_type() {
        let mut body = Map::new();
        body.insert("type".into(), json!("play"));
        merge(&mut body, Some(json!({"type": "hack", "source": "search"})));
        assert_eq!(body["type"], "play");
        assert_eq!(body["source"], "search");
    }

    #[test]
    fn non_object_extra_is_ignored() {
        let mut body = Map::new();
        merge(&mut body, Some(json!([1, 2])));
        assert!(body.is_empty());
    }
}
