//! Download quota, licence issuance and file proxy.
//!
//! A download walks these checks in order and stops at the first one that
//! fails, so blocked downloads never reach `track-download`:
//!
//! 1. the song record has an id and an audio URL
//! 2. logged out: free songs are fetched directly, anything else is refused
//! 3. gated songs need an active premium plan
//! 4. quota pre-check (`remaining == 0` stops here)
//! 5. licence issuance, then the file itself

use std::path::{Path, PathBuf};
use std::time::Duration;

use chrono::Utc;
use reqwest::Url;
use serde::Deserialize;
use serde_json::json;
use tokio::task::AbortHandle;
use tracing::{debug, info, warn};

use vara_proto::model::{CurrentUser, DownloadLimits, DownloadReceipt, License, LicenseVerification, Song};
use vara_proto::protocol::{Notification, Severity};

use crate::api::{ApiClient, Backend};
use crate::error::{ClientError, Result};

#[derive(Debug, Clone, PartialEq)]
pub enum DownloadOutcome {
    Saved {
        path: PathBuf,
        /// `None` for direct free downloads without an account.
        license_id: Option<String>,
        remaining: Option<u32>,
    },
    LoginRequired,
    UpgradeRequired,
    LimitReached {
        premium: bool,
    },
}

impl DownloadOutcome {
    pub fn notification(&self, title: &str) -> Notification {
        let (severity, message) = match self {
            Self::Saved {
                license_id: Some(id),
                ..
            } => (
                Severity::Success,
                format!("Downloaded \"{}\". Licence ID: {}", title, id),
            ),
            Self::Saved { license_id: None, .. } => {
                (Severity::Success, format!("Downloaded \"{}\"", title))
            }
            Self::LoginRequired => (
                Severity::Warning,
                "Please log in to download premium songs".to_string(),
            ),
            Self::UpgradeRequired => (
                Severity::Warning,
                "This is a premium song. Upgrade to Premium to download it".to_string(),
            ),
            Self::LimitReached { premium } => (Severity::Warning, quota_message(*premium)),
        };
        Notification { severity, message }
    }

    pub fn issued_licence(&self) -> bool {
        matches!(
            self,
            Self::Saved {
                license_id: Some(_),
                ..
            }
        )
    }
}

pub fn quota_message(premium: bool) -> String {
    if premium {
        "You have reached your premium download limit for this period".to_string()
    } else {
        "You have used all free downloads. Upgrade to Premium for more".to_string()
    }
}

/// User-facing text for a failed download.
pub fn error_notification(err: &ClientError, premium: bool) -> Notification {
    let message = match err {
        ClientError::QuotaExceeded { .. } => quota_message(premium),
        ClientError::Unauthorized => {
            "Your session has expired. Please log in again".to_string()
        }
        ClientError::Validation(msg) => msg.clone(),
        ClientError::Timeout => "The download timed out. Please try again".to_string(),
        other => format!("Download failed: {}", other),
    };
    let severity = if err.is_quota() {
        Severity::Warning
    } else {
        Severity::Error
    };
    Notification { severity, message }
}

pub fn sanitize_file_name(title: &str, fallback: &str) -> String {
    let cleaned: String = title
        .chars()
        .map(|c| {
            if c.is_alphanumeric() || matches!(c, ' ' | '-' | '_' | '.') {
                c
            } else {
                '_'
            }
        })
        .collect();
    let cleaned = cleaned.trim().trim_matches('.').trim();
    if cleaned.is_empty() {
        fallback.to_string()
    } else {
        cleaned.to_string()
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum LicenseList {
    List(Vec<License>),
    Wrapped { licenses: Vec<License> },
}

/// Owns the badge refresh; everything else lives on the cloneable
/// [`DownloadRunner`] so it can move into spawned tasks.
pub struct Downloads {
    runner: DownloadRunner,
    badge: Option<AbortHandle>,
}

impl Downloads {
    pub fn new(api: ApiClient, downloads_dir: PathBuf, license_timeout: Duration) -> Self {
        Self {
            runner: DownloadRunner {
                api,
                downloads_dir,
                license_timeout,
            },
            badge: None,
        }
    }

    pub fn runner(&self) -> DownloadRunner {
        self.runner.clone()
    }

    /// Refreshes the remaining-downloads badge. A newer refresh aborts the
    /// one still in flight.
    pub fn refresh_limits<F>(&mut self, on_done: F)
    where
        F: FnOnce(Result<DownloadLimits>) + Send + 'static,
    {
        if let Some(prev) = self.badge.take() {
            if !prev.is_finished() {
                debug!("downloads: superseding stale badge refresh");
                prev.abort();
            }
        }
        let api = self.runner.api.clone();
        let handle = tokio::spawn(async move {
            on_done(fetch_limits(&api).await);
        });
        self.badge = Some(handle.abort_handle());
    }

    pub fn cancel_badge_refresh(&mut self) {
        if let Some(handle) = self.badge.take() {
            handle.abort();
        }
    }
}

async fn fetch_limits(api: &ApiClient) -> Result<DownloadLimits> {
    api.get_json(Backend::Auth, "/api/user/limits").await
}

#[derive(Clone)]
pub struct DownloadRunner {
    api: ApiClient,
    downloads_dir: PathBuf,
    license_timeout: Duration,
}

impl DownloadRunner {
    pub fn downloads_dir(&self) -> &Path {
        &self.downloads_dir
    }

    pub async fn download(&self, song: &Song, user: Option<&CurrentUser>) -> Result<DownloadOutcome> {
        if song.id.trim().is_empty() || song.audio_url.trim().is_empty() {
            return Err(ClientError::Validation("Song data is incomplete".into()));
        }
        let dest = self
            .downloads_dir
            .join(format!("{}.mp3", sanitize_file_name(&song.title, &song.id)));

        let Some(user) = user else {
            if song.collection_type.is_gated() {
                info!(song_id = %song.id, "download: login required");
                return Ok(DownloadOutcome::LoginRequired);
            }
            info!(song_id = %song.id, "download: direct free download");
            self.api.download_url_to(&song.audio_url, &dest).await?;
            return Ok(DownloadOutcome::Saved {
                path: dest,
                license_id: None,
                remaining: None,
            });
        };

        let premium = user.has_active_premium(Utc::now());
        if song.collection_type.is_gated() && !premium {
            info!(song_id = %song.id, "download: upgrade required");
            return Ok(DownloadOutcome::UpgradeRequired);
        }

        match fetch_limits(&self.api).await {
            Ok(limits) if limits.remaining == 0 => {
                info!(song_id = %song.id, plan = ?limits.plan, "download: no downloads left");
                return Ok(DownloadOutcome::LimitReached { premium });
            }
            Ok(limits) => debug!(remaining = limits.remaining, "download: quota ok"),
            Err(ClientError::Unauthorized) => return Err(ClientError::Unauthorized),
            // the backend enforces the quota again on track-download
            Err(e) => warn!("download: limits pre-check failed: {}", e),
        }

        let receipt: DownloadReceipt = self
            .api
            .post_json(
                Backend::Auth,
                "/api/user/track-download",
                &json!({ "songId": song.id }),
            )
            .await?;
        info!(song_id = %song.id, license_id = %receipt.license_id, "download: licence issued");

        self.api
            .download_to(Backend::Auth, &format!("/api/files/song/{}", song.id), &dest)
            .await?;

        Ok(DownloadOutcome::Saved {
            path: dest,
            license_id: Some(receipt.license_id),
            remaining: receipt.remaining,
        })
    }

    /// Looks a licence up by id, bounded by the licence timeout.
    pub async fn verify_license(&self, license_id: &str) -> Result<LicenseVerification> {
        let id = license_id.trim();
        if id.is_empty() {
            return Err(ClientError::Validation("Please enter a licence ID".into()));
        }
        let mut url = Url::parse("http://licence.local/api/license/verify")
            .map_err(|e| ClientError::Validation(e.to_string()))?;
        url.query_pairs_mut().append_pair("id", id);
        let path = format!("{}?{}", url.path(), url.query().unwrap_or_default());

        self.api
            .get_json_with_timeout(Backend::Auth, &path, self.license_timeout)
            .await
    }

    pub async fn license_history(&self) -> Result<Vec<License>> {
        let list: LicenseList = self.api.get_json(Backend::Auth, "/api/license/my").await?;
        Ok(match list {
            LicenseList::List(l) | LicenseList::Wrapped { licenses: l } => l,
        })
    }
}

pub fn verification_notification(license_id: &str, result: &Result<LicenseVerification>) -> Notification {
    let (severity, message) = match result {
        Ok(LicenseVerification {
            valid: true,
            license,
        }) => {
            let song = license
                .as_ref()
                .and_then(|l| l.song_title.clone())
                .map(|t| format!(" for \"{}\"", t))
                .unwrap_or_default();
            (Severity::Success, format!("Licence {} is valid{}", license_id.trim(), song))
        }
        Ok(_) => (
            Severity::Warning,
            format!("Licence {} was not found or is invalid", license_id.trim()),
        ),
        Err(ClientError::Validation(msg)) => (Severity::Warning, msg.clone()),
        Err(ClientError::Timeout) => (
            Severity::Error,
            "Licence check timed out. Please try again".to_string(),
        ),
        Err(e) => (Severity::Error, format!("Licence check failed: {}", e)),
    };
    Notification { severity, message }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn file_names_are_sanitised() {
        assert_eq!(sanitize_file_name("Night Drive", "x"), "Night Drive");
        assert_eq!(sanitize_file_name("a/b\\c:d", "x"), "a_b_c_d");
        assert_eq!(sanitize_file_name("  ..  ", "song-1"), "song-1");
    }

    #[test]
    fn quota_wording_depends_on_plan() {
        let free = DownloadOutcome::LimitReached { premium: false }.notification("t");
        let premium = DownloadOutcome::LimitReached { premium: true }.notification("t");
        assert_eq!(free.severity, Severity::Warning);
        assert!(free.message.contains("Upgrade"));
        assert!(premium.message.contains("premium download limit"));

        let err = ClientError::QuotaExceeded { message: None };
        assert_eq!(error_notification(&err, false).message, free.message);
    }

    #[test]
    fn expired_session_asks_for_login_again() {
        let note = error_notification(&ClientError::Unauthorized, true);
        assert_eq!(note.message, "Your session has expired. Please log in again");
    }

    #[test]
    fn verification_wording() {
        let ok: Result<LicenseVerification> = Ok(LicenseVerification {
            valid: true,
            license: Some(License {
                license_id: "LIC-1".into(),
                song_id: Some("s1".into()),
                song_title: Some("Monsoon".into()),
                issued_at: None,
            }),
        });
        let note = verification_notification(" LIC-1 ", &ok);
        assert_eq!(note.severity, Severity::Success);
        assert_eq!(note.message, "Licence LIC-1 is valid for \"Monsoon\"");

        let invalid: Result<LicenseVerification> = Ok(LicenseVerification {
            valid: false,
            license: None,
        });
        assert_eq!(verification_notification("x", &invalid).severity, Severity::Warning);
        assert_eq!(
            verification_notification("x", &Err(ClientError::Timeout)).severity,
            Severity::Error
        );
    }

    #[test]
    fn saved_notification_names_licence() {
        let outcome = DownloadOutcome::Saved {
            path: PathBuf::from("/tmp/a.mp3"),
            license_id: Some("LIC-42".into()),
            remaining: Some(3),
        };
        assert!(outcome.issued_licence());
        assert!(outcome.notification("Song").message.contains("LIC-42"));
    }
}
