use serde_json::json;
use tracing::{debug, info};

use vara_proto::model::{Recommendation, Song};

use crate::api::{ApiClient, Backend};
use crate::catalog::CatalogData;
use crate::error::{ClientError, Result};

/// Assistant reply with its song ids resolved against the catalog.
#[derive(Debug, Clone, PartialEq)]
pub struct Recommended {
    pub message: String,
    pub songs: Vec<Song>,
}

#[derive(Clone)]
pub struct Assistant {
    api: ApiClient,
}

impl Assistant {
    pub fn new(api: ApiClient) -> Self {
        Self { api }
    }

    pub async fn recommend(&self, prompt: &str) -> Result<Recommendation> {
        let prompt = prompt.trim();
        if prompt.is_empty() {
            return Err(ClientError::Validation(
                "Tell the assistant what you are looking for".into(),
            ));
        }
        let rec: Recommendation = self
            .api
            .post_json(Backend::Auth, "/api/ai/recommend", &json!({ "prompt": prompt }))
            .await?;
        info!(songs = rec.song_ids.len(), "assistant: recommendation received");
        Ok(rec)
    }
}

/// Unknown ids are skipped; the assistant's order is kept.
pub fn resolve(rec: &Recommendation, data: &CatalogData) -> Recommended {
    let songs = data.songs_by_ids(rec.song_ids.iter().map(|t| t.id.as_str()));
    if songs.len() < rec.song_ids.len() {
        debug!(
            skipped = rec.song_ids.len() - songs.len(),
            "assistant: ids not in catalog"
        );
    }
    Recommended {
        message: rec.message.clone(),
        songs,
    }
}

pub fn quota_message(premium: bool) -> String {
    if premium {
        "You have reached today's assistant limit for your plan".to_string()
    } else {
        "You have used all free assistant requests. Upgrade to Premium for more".to_string()
    }
}
