//! mpv process and JSON IPC connection.
//!
//! ```text
//!   MpvProcess::launch ──► child mpv (--idle, IPC socket)
//!                              │
//!   MpvIpc::call ──► writer ───┤  one JSON object per line
//!                              │
//!          pending replies ◄── reader ──► MpvNotice channel
//! ```
//!
//! Replies are matched to calls by `request_id`; everything else is a
//! notice (event or observed property change).

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{anyhow, bail, Context};
use serde::Deserialize;
use serde_json::{json, Value};
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncWrite, AsyncWriteExt, BufReader};
use tokio::process::Child;
use tokio::sync::{mpsc, oneshot, Mutex};
use tracing::{debug, info, warn};

use vara_proto::platform;

const CALL_TIMEOUT: Duration = Duration::from_secs(5);
const SOCKET_WAIT: Duration = Duration::from_secs(5);

static REQUEST_IDS: AtomicU64 = AtomicU64::new(1);

/// Properties observed on every connection. The discriminant doubles as the
/// mpv observer id.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Observed {
    Pause = 1,
    TimePos = 2,
    Duration = 3,
}

impl Observed {
    const ALL: [Observed; 3] = [Observed::Pause, Observed::TimePos, Observed::Duration];

    fn property(self) -> &'static str {
        match self {
            Self::Pause => "pause",
            Self::TimePos => "time-pos",
            Self::Duration => "duration",
        }
    }

    pub fn from_id(id: u64) -> Option<Self> {
        Self::ALL.into_iter().find(|o| *o as u64 == id)
    }
}

/// Unsolicited message from mpv.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "event", rename_all = "kebab-case")]
pub enum MpvNotice {
    PropertyChange {
        id: u64,
        #[serde(default)]
        data: Value,
    },
    FileLoaded,
    PlaybackRestart,
    EndFile {
        #[serde(default)]
        reason: Option<String>,
        #[serde(default)]
        file_error: Option<String>,
    },
    #[serde(other)]
    Other,
}

#[derive(Debug, Deserialize)]
struct Reply {
    request_id: u64,
    error: String,
    #[serde(default)]
    data: Value,
}

type Waiters = Arc<Mutex<HashMap<u64, oneshot::Sender<anyhow::Result<Value>>>>>;

struct Outgoing {
    id: u64,
    line: String,
    reply: oneshot::Sender<anyhow::Result<Value>>,
}

/// Cloneable command side of an IPC connection.
#[derive(Clone)]
pub struct MpvIpc {
    outgoing: mpsc::Sender<Outgoing>,
}

impl MpvIpc {
    /// Wires reader and writer tasks onto an already connected stream.
    pub fn attach<R, W>(reader: R, writer: W, notices: mpsc::Sender<MpvNotice>) -> Self
    where
        R: AsyncRead + Unpin + Send + 'static,
        W: AsyncWrite + Unpin + Send + 'static,
    {
        let waiters: Waiters = Arc::default();
        let (outgoing, outgoing_rx) = mpsc::channel(64);
        tokio::spawn(write_loop(writer, outgoing_rx, Arc::clone(&waiters)));
        tokio::spawn(read_loop(BufReader::new(reader), waiters, notices));
        Self { outgoing }
    }

    /// Sends `args` as an mpv command and waits for its reply data.
    pub async fn call(&self, args: Value) -> anyhow::Result<Value> {
        let id = REQUEST_IDS.fetch_add(1, Ordering::Relaxed);
        let mut line = serde_json::to_string(&json!({ "command": args, "request_id": id }))?;
        line.push('\n');

        let (reply, reply_rx) = oneshot::channel();
        self.outgoing
            .send(Outgoing { id, line, reply })
            .await
            .map_err(|_| anyhow!("mpv connection closed"))?;

        match tokio::time::timeout(CALL_TIMEOUT, reply_rx).await {
            Ok(Ok(result)) => result,
            Ok(Err(_)) => Err(anyhow!("mpv dropped request {}", id)),
            Err(_) => Err(anyhow!("mpv did not answer request {}", id)),
        }
    }

    pub async fn loadfile(&self, url: &str) -> anyhow::Result<()> {
        self.call(json!(["loadfile", url, "replace"])).await.map(drop)
    }

    pub async fn set_paused(&self, paused: bool) -> anyhow::Result<()> {
        self.call(json!(["set_property", "pause", paused])).await.map(drop)
    }

    pub async fn seek_absolute(&self, secs: f64) -> anyhow::Result<()> {
        self.call(json!(["seek", secs, "absolute"])).await.map(drop)
    }

    /// `volume` is 0.0–1.0; mpv wants percent.
    pub async fn set_volume(&self, volume: f32) -> anyhow::Result<()> {
        let percent = (volume.clamp(0.0, 1.0) * 100.0).round();
        self.call(json!(["set_property", "volume", percent])).await.map(drop)
    }

    pub async fn stop(&self) -> anyhow::Result<()> {
        self.call(json!(["stop"])).await.map(drop)
    }

    pub async fn observe_all(&self) {
        for obs in Observed::ALL {
            let args = json!(["observe_property", obs as u64, obs.property()]);
            if let Err(e) = self.call(args).await {
                warn!("mpv: observing {} failed: {}", obs.property(), e);
            }
        }
    }
}

/// The mpv child process. Dropping it kills mpv.
pub struct MpvProcess {
    initial_volume: f32,
    child: Option<Child>,
}

impl MpvProcess {
    pub fn new(initial_volume: f32) -> Self {
        Self {
            initial_volume,
            child: None,
        }
    }

    pub fn is_running(&mut self) -> bool {
        let Some(child) = self.child.as_mut() else {
            return false;
        };
        match child.try_wait() {
            Ok(None) => true,
            Ok(Some(status)) => {
                warn!("mpv exited: {}", status);
                false
            }
            Err(e) => {
                warn!("mpv status check failed: {}", e);
                false
            }
        }
    }

    pub async fn shutdown(&mut self) {
        if let Some(mut child) = self.child.take() {
            let _ = child.kill().await;
        }
    }

    /// Restarts mpv and connects to its IPC socket.
    #[cfg(unix)]
    pub async fn launch(&mut self, notices: mpsc::Sender<MpvNotice>) -> anyhow::Result<MpvIpc> {
        self.shutdown().await;

        let socket = platform::mpv_socket_path();
        let _ = tokio::fs::remove_file(&socket).await;

        let binary = platform::find_mpv_binary().context("mpv binary not found")?;
        let stderr_log = platform::data_dir().join("mpv-stderr.log");
        if let Some(dir) = stderr_log.parent() {
            std::fs::create_dir_all(dir)?;
        }
        let stderr = std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&stderr_log)?;

        let volume = (self.initial_volume.clamp(0.0, 1.0) * 100.0).round() as i64;
        let child = tokio::process::Command::new(binary)
            .args(["--no-video", "--idle=yes", "--keep-open=no", "--quiet"])
            .arg(platform::mpv_socket_arg())
            .arg(format!("--volume={}", volume))
            .stdout(std::process::Stdio::null())
            .stderr(stderr)
            .kill_on_drop(true)
            .spawn()?;
        info!(pid = ?child.id(), "mpv: started, stderr in {:?}", stderr_log);
        self.child = Some(child);

        let deadline = tokio::time::Instant::now() + SOCKET_WAIT;
        let stream = loop {
            match tokio::net::UnixStream::connect(&socket).await {
                Ok(stream) => break stream,
                Err(_) if tokio::time::Instant::now() < deadline => {
                    tokio::time::sleep(Duration::from_millis(100)).await;
                }
                Err(e) => bail!("mpv IPC socket {:?} never accepted: {}", socket, e),
            }
        };
        debug!("mpv: IPC connected");

        let (reader, writer) = stream.into_split();
        Ok(MpvIpc::attach(reader, writer, notices))
    }

    #[cfg(not(unix))]
    pub async fn launch(&mut self, _notices: mpsc::Sender<MpvNotice>) -> anyhow::Result<MpvIpc> {
        bail!("mpv output needs a unix IPC socket on this platform")
    }
}

async fn reject_waiting(waiters: &Waiters, why: &str) {
    for (_, reply) in waiters.lock().await.drain() {
        let _ = reply.send(Err(anyhow!("{}", why)));
    }
}

async fn read_loop<R: AsyncRead + Unpin>(
    reader: BufReader<R>,
    waiters: Waiters,
    notices: mpsc::Sender<MpvNotice>,
) {
    let mut lines = reader.lines();
    loop {
        let line = match lines.next_line().await {
            Ok(Some(line)) => line,
            Ok(None) => {
                reject_waiting(&waiters, "mpv closed the connection").await;
                break;
            }
            Err(e) => {
                warn!("mpv: read failed: {}", e);
                reject_waiting(&waiters, "mpv connection broke").await;
                break;
            }
        };
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        let Ok(value) = serde_json::from_str::<Value>(line) else {
            debug!("mpv: unparsable line {:?}", line);
            continue;
        };

        if value.get("request_id").is_some_and(|id| !id.is_null()) {
            let Ok(reply) = serde_json::from_value::<Reply>(value) else {
                continue;
            };
            if let Some(waiter) = waiters.lock().await.remove(&reply.request_id) {
                let result = if reply.error == "success" {
                    Ok(reply.data)
                } else {
                    Err(anyhow!("mpv: {}", reply.error))
                };
                let _ = waiter.send(result);
            }
            continue;
        }

        match serde_json::from_value::<MpvNotice>(value) {
            Ok(MpvNotice::Other) => {}
            Ok(notice) => {
                if notices.send(notice).await.is_err() {
                    break;
                }
            }
            Err(e) => debug!("mpv: ignoring message: {}", e),
        }
    }
}

async fn write_loop<W: AsyncWrite + Unpin>(
    mut writer: W,
    mut outgoing: mpsc::Receiver<Outgoing>,
    waiters: Waiters,
) {
    while let Some(msg) = outgoing.recv().await {
        // registered first: the reply can arrive before write_all returns
        waiters.lock().await.insert(msg.id, msg.reply);
        if let Err(e) = writer.write_all(msg.line.as_bytes()).await {
            warn!("mpv: write failed: {}", e);
            if let Some(reply) = waiters.lock().await.remove(&msg.id) {
                let _ = reply.send(Err(anyhow!("mpv write failed: {}", e)));
            }
            break;
        }
    }
    debug!("mpv: writer done");
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn notices_parse_by_event_name() {
        let change: MpvNotice =
            serde_json::from_value(json!({"event": "property-change", "id": 2, "name": "time-pos", "data": 12.5}))
                .unwrap();
        assert_eq!(
            change,
            MpvNotice::PropertyChange {
                id: 2,
                data: json!(12.5)
            }
        );
        assert_eq!(Observed::from_id(2), Some(Observed::TimePos));

        let end: MpvNotice =
            serde_json::from_value(json!({"event": "end-file", "reason": "error", "file_error": "loading failed"}))
                .unwrap();
        assert_eq!(
            end,
            MpvNotice::EndFile {
                reason: Some("error".into()),
                file_error: Some("loading failed".into())
            }
        );

        let other: MpvNotice = serde_json::from_value(json!({"event": "audio-reconfig"})).unwrap();
        assert_eq!(other, MpvNotice::Other);
    }

    #[tokio::test]
    async fn replies_and_notices_are_split() {
        let (ours, theirs) = tokio::io::duplex(4096);
        let (read, write) = tokio::io::split(ours);
        let (notice_tx, mut notice_rx) = mpsc::channel(8);
        let ipc = MpvIpc::attach(read, write, notice_tx);

        let (their_read, mut their_write) = tokio::io::split(theirs);
        tokio::spawn(async move {
            let mut lines = BufReader::new(their_read).lines();
            while let Ok(Some(line)) = lines.next_line().await {
                let req: Value = serde_json::from_str(&line).unwrap();
                let id = req["request_id"].as_u64().unwrap();
                let out = format!(
                    "{}\n{}\n",
                    json!({"event": "playback-restart"}),
                    json!({"error": "success", "data": 0.5, "request_id": id})
                );
                their_write.write_all(out.as_bytes()).await.unwrap();
            }
        });

        assert_eq!(ipc.call(json!(["get_property", "volume"])).await.unwrap(), json!(0.5));
        assert_eq!(notice_rx.recv().await, Some(MpvNotice::PlaybackRestart));
    }

    #[tokio::test]
    async fn closed_connection_fails_pending_calls() {
        let (ours, theirs) = tokio::io::duplex(1024);
        let (read, write) = tokio::io::split(ours);
        let (notice_tx, _notice_rx) = mpsc::channel(8);
        let ipc = MpvIpc::attach(read, write, notice_tx);
        drop(theirs);

        assert!(ipc.set_paused(true).await.is_err());
    }
}
