//! Per-resource fetch guard.
//!
//! ```text
//!   get(force)
//!     ├── request in flight        → join it (same settled result)
//!     ├── loaded && !force         → cached data, no request
//!     └── otherwise                → start request, park it as in flight
//!                                      ├── Ok  → store, loaded = true
//!                                      └── Err → loaded unchanged, retry later
//! ```
//!
//! The in-flight slot holds a `Shared` future; the future itself clears the
//! slot and stores the result, so the bookkeeping runs once no matter how
//! many callers joined.

use std::fmt;
use std::sync::Arc;

use futures_util::future::{BoxFuture, FutureExt, Shared};
use tokio::sync::Mutex;
use tracing::{debug, warn};

use crate::error::{ClientError, Result};

type Fetched<T> = std::result::Result<Arc<Vec<T>>, ClientError>;
type InFlight<T> = Shared<BoxFuture<'static, Fetched<T>>>;
type Fetcher<T> = Arc<dyn Fn() -> BoxFuture<'static, Result<Vec<T>>> + Send + Sync>;

/// The six catalog resources the client keeps.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ResourceKind {
    Songs,
    Genres,
    SubGenres,
    Trending,
    Instruments,
    Moods,
}

impl fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Songs => "songs",
            Self::Genres => "genres",
            Self::SubGenres => "sub-genres",
            Self::Trending => "trending",
            Self::Instruments => "instruments",
            Self::Moods => "moods",
        })
    }
}

struct Guard<T> {
    in_flight: Option<InFlight<T>>,
    loaded: bool,
    data: Arc<Vec<T>>,
}

pub struct FetchCache<T> {
    kind: ResourceKind,
    fetcher: Fetcher<T>,
    guard: Arc<Mutex<Guard<T>>>,
}

impl<T> FetchCache<T>
where
    T: Send + Sync + 'static,
{
    pub fn new<F>(kind: ResourceKind, fetcher: F) -> Self
    where
        F: Fn() -> BoxFuture<'static, Result<Vec<T>>> + Send + Sync + 'static,
    {
        Self {
            kind,
            fetcher: Arc::new(fetcher),
            guard: Arc::new(Mutex::new(Guard {
                in_flight: None,
                loaded: false,
                data: Arc::new(Vec::new()),
            })),
        }
    }

    pub fn kind(&self) -> ResourceKind {
        self.kind
    }

    /// Loads once per session; later calls return the stored data.
    pub async fn fetch(&self) -> Fetched<T> {
        self.get(false).await
    }

    /// Skips the `loaded` short-circuit but still joins a pending request.
    pub async fn refresh(&self) -> Fetched<T> {
        self.get(true).await
    }

    pub async fn is_loaded(&self) -> bool {
        self.guard.lock().await.loaded
    }

    /// Last successfully fetched value (empty until the first success).
    pub async fn data(&self) -> Arc<Vec<T>> {
        Arc::clone(&self.guard.lock().await.data)
    }

    async fn get(&self, force: bool) -> Fetched<T> {
        let pending = {
            let mut guard = self.guard.lock().await;
            if let Some(in_flight) = &guard.in_flight {
                debug!(resource = %self.kind, "fetch: joining in-flight request");
                in_flight.clone()
            } else if guard.loaded && !force {
                return Ok(Arc::clone(&guard.data));
            } else {
                let shared = self.start();
                guard.in_flight = Some(shared.clone());
                shared
            }
        };
        pending.await
    }

    fn start(&self) -> InFlight<T> {
        let request = (self.fetcher)();
        let slot = Arc::clone(&self.guard);
        let kind = self.kind;
        debug!(resource = %kind, "fetch: starting request");

        async move {
            let result = request.await.map(Arc::new);
            let mut guard = slot.lock().await;
            guard.in_flight = None;
            match &result {
                Ok(data) => {
                    debug!(resource = %kind, count = data.len(), "fetch: stored");
                    guard.data = Arc::clone(data);
                    guard.loaded = true;
                }
                Err(e) => warn!(resource = %kind, "fetch failed: {}", e),
            }
            result
        }
        .boxed()
        .shared()
    }
}
