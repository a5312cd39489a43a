//! Progressive start-up.
//!
//! ```text
//!   Header ─delay─► Hero ─delay─► MusicContent ─delay─► Data ──load_all──► Ready
//! ```
//!
//! The first three stages are UI reveals; `Data` fans out every catalog
//! fetch and `Ready` follows once all of them settled.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tracing::{debug, info};

use vara_proto::protocol::LoadStage;

use crate::catalog::Catalog;
use crate::core::CoreEvent;

const REVEAL_STAGES: [LoadStage; 3] = [LoadStage::Header, LoadStage::Hero, LoadStage::MusicContent];

/// Runs the pipeline to completion. Stops early when the core is gone.
pub async fn run_progressive_load(
    catalog: Arc<Catalog>,
    stage_delay: Duration,
    tx: mpsc::Sender<CoreEvent>,
) {
    for stage in REVEAL_STAGES {
        debug!(?stage, "loader: reveal");
        if tx.send(CoreEvent::LoadStage(stage)).await.is_err() {
            return;
        }
        tokio::time::sleep(stage_delay).await;
    }

    if tx.send(CoreEvent::LoadStage(LoadStage::Data)).await.is_err() {
        return;
    }
    let data = catalog.load_all().await;
    info!(songs = data.songs.len(), "loader: catalog ready");

    if tx.send(CoreEvent::CatalogLoaded(data)).await.is_err() {
        return;
    }
    let _ = tx.send(CoreEvent::LoadStage(LoadStage::Ready)).await;
}
