use reqwest::Url;
use serde::Deserialize;
use serde_json::json;
use tracing::{debug, info, warn};

use vara_proto::model::{CurrentUser, Tag};

use crate::api::{ApiClient, Backend};
use crate::error::{ClientError, Result};

const YOUTUBE_HOSTS: &[&str] = &["youtube.com", "www.youtube.com", "m.youtube.com", "youtu.be"];

/// Session lifecycle and user-scoped state on the auth backend.
#[derive(Clone)]
pub struct Session {
    api: ApiClient,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum UserResponse {
    Bare(CurrentUser),
    Wrapped { user: Option<CurrentUser> },
}

#[derive(Deserialize)]
#[serde(untagged)]
enum FavoritesResponse {
    List(Vec<Tag>),
    Wrapped { favorites: Vec<Tag> },
}

impl Session {
    pub fn new(api: ApiClient) -> Self {
        Self { api }
    }

    /// `None` when nobody is logged in. Failures other than 401 are logged
    /// and also count as logged out.
    pub async fn probe(&self) -> Option<CurrentUser> {
        match self.api.get_json::<UserResponse>(Backend::Auth, "/api/user").await {
            Ok(UserResponse::Bare(user)) | Ok(UserResponse::Wrapped { user: Some(user) }) => {
                info!(email = %user.email, premium = user.is_premium, "session: logged in");
                Some(user)
            }
            Ok(UserResponse::Wrapped { user: None }) => None,
            Err(ClientError::Unauthorized) => {
                debug!("session: not logged in");
                None
            }
            Err(e) => {
                warn!("session: probe failed: {}", e);
                None
            }
        }
    }

    /// Where the user is sent to start the OAuth flow.
    pub fn login_url(&self) -> String {
        self.api.url(Backend::Auth, "/api/auth/google")
    }

    /// Best effort: local state is cleared by the caller whatever happens.
    pub async fn logout(&self) {
        if let Err(e) = self
            .api
            .post_empty(Backend::Auth, "/api/logout", &json!({}))
            .await
        {
            warn!("session: logout call failed: {}", e);
        }
    }

    /// Favourite song ids. The backend returns either ids or song objects.
    pub async fn load_favorites(&self) -> Result<Vec<String>> {
        let resp: FavoritesResponse = self
            .api
            .get_json(Backend::Auth, "/api/user/favorites")
            .await?;
        let tags = match resp {
            FavoritesResponse::Wrapped { favorites } => favorites,
            FavoritesResponse::List(list) => list,
        };
        Ok(tags.into_iter().map(|t| t.id).collect())
    }

    pub async fn add_favorite(&self, song_id: &str) -> Result<()> {
        self.api
            .post_empty(
                Backend::Auth,
                "/api/user/favorites",
                &json!({ "songId": song_id }),
            )
            .await
    }

    pub async fn remove_favorite(&self, song_id: &str) -> Result<()> {
        self.api
            .delete(Backend::Auth, &format!("/api/user/favorites/{}", song_id))
            .await
    }

    /// Validates before any request goes out.
    pub async fn update_youtube_channel(&self, link: &str) -> Result<()> {
        let link = validate_youtube_link(link)?;
        self.api
            .post_empty(
                Backend::Auth,
                "/api/user/youtube-channel",
                &json!({ "link": link }),
            )
            .await
    }
}

pub fn validate_youtube_link(link: &str) -> Result<String> {
    let trimmed = link.trim();
    if trimmed.is_empty() {
        return Err(ClientError::Validation("Please enter your YouTube channel link".into()));
    }
    let url = Url::parse(trimmed)
        .map_err(|_| ClientError::Validation("Please enter a valid YouTube link".into()))?;
    let scheme_ok = matches!(url.scheme(), "http" | "https");
    let host_ok = url
        .host_str()
        .map(|h| YOUTUBE_HOSTS.contains(&h.to_ascii_lowercase().as_str()))
        .unwrap_or(false);
    if !scheme_ok || !host_ok {
        return Err(ClientError::Validation("Please enter a valid YouTube link".into()));
    }
    Ok(trimmed.to_string())
}
