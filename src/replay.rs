//! 录制轨迹回放
//!
//! 轨迹为 JSON Lines，每行一条带时间偏移的记录：
//! `{"atMs": 0, "frame": {...}}` 或 `{"atMs": 120, "channel": {"type": ..., "data": ...}}`。
//! 回放时帧与通道消息分别交给脚本化的相机与通道实现，按原始时间间隔推送。

use std::path::Path;
use std::time::Duration;

use async_trait::async_trait;
use futures::{Stream, StreamExt};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::task::JoinHandle;
use tokio::time::{sleep_until, Instant};

use crate::channel::{ChannelEvent, ConnectParams};
use crate::error::DeviceError;
use crate::frame::{FrameSample, TrackerFrame};
use crate::session::{FrameSource, SessionHandle, TransportChannel};

#[derive(Debug, Error)]
pub enum TraceError {
    #[error("failed to read trace: {0}")]
    Io(#[from] std::io::Error),
    #[error("invalid trace line {line}: {source}")]
    Parse {
        line: usize,
        #[source]
        source: serde_json::Error,
    },
    #[error("invalid trace line {line}: {reason}")]
    Invalid { line: usize, reason: &'static str },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawRecord {
    at_ms: u64,
    #[serde(default)]
    frame: Option<TrackerFrame>,
    #[serde(default)]
    channel: Option<ChannelEvent>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum TraceEntry {
    Frame(TrackerFrame),
    Channel(ChannelEvent),
}

#[derive(Debug, Clone, PartialEq)]
pub struct TraceRecord {
    pub at_ms: u64,
    pub entry: TraceEntry,
}

pub fn parse_trace(text: &str) -> Result<Vec<TraceRecord>, TraceError> {
    let mut records = Vec::new();
    for (idx, raw_line) in text.lines().enumerate() {
        let line = idx + 1;
        if raw_line.trim().is_empty() {
            continue;
        }
        let raw: RawRecord =
            serde_json::from_str(raw_line).map_err(|source| TraceError::Parse { line, source })?;
        let entry = match (raw.frame, raw.channel) {
            (Some(frame), None) => TraceEntry::Frame(frame),
            (None, Some(event)) => TraceEntry::Channel(event),
            (Some(_), Some(_)) => {
                return Err(TraceError::Invalid {
                    line,
                    reason: "record has both frame and channel",
                })
            }
            (None, None) => {
                return Err(TraceError::Invalid {
                    line,
                    reason: "record has neither frame nor channel",
                })
            }
        };
        records.push(TraceRecord {
            at_ms: raw.at_ms,
            entry,
        });
    }
    records.sort_by_key(|r| r.at_ms);
    Ok(records)
}

pub async fn load_trace(path: impl AsRef<Path>) -> Result<Vec<TraceRecord>, TraceError> {
    let text = tokio::fs::read_to_string(path.as_ref()).await?;
    let records = parse_trace(&text)?;
    tracing::info!(
        path = %path.as_ref().display(),
        records = records.len(),
        "Trace loaded"
    );
    Ok(records)
}

/// Yields each item at its offset from the moment the stream is first polled.
pub fn timed<T: Send + 'static>(items: Vec<(u64, T)>) -> impl Stream<Item = T> + Send {
    async_stream::stream! {
        let start = Instant::now();
        for (at_ms, item) in items {
            sleep_until(start + Duration::from_millis(at_ms)).await;
            yield item;
        }
    }
}

/// Splits a trace into camera and channel collaborators.
pub fn scripted(records: Vec<TraceRecord>) -> (ScriptedFrameSource, ScriptedChannel) {
    let mut frames = Vec::new();
    let mut events = Vec::new();
    for record in records {
        match record.entry {
            TraceEntry::Frame(frame) => frames.push((record.at_ms, frame)),
            TraceEntry::Channel(event) => events.push((record.at_ms, event)),
        }
    }
    // 轨迹未记录连接事件时，连接成功即视为已连接
    if !events.iter().any(|(_, e)| *e == ChannelEvent::Connected) {
        events.insert(0, (0, ChannelEvent::Connected));
    }
    (
        ScriptedFrameSource {
            frames: Some(frames),
            task: None,
            paused: false,
        },
        ScriptedChannel {
            events: Some(events),
            task: None,
        },
    )
}

pub struct ScriptedFrameSource {
    frames: Option<Vec<(u64, TrackerFrame)>>,
    task: Option<JoinHandle<()>>,
    paused: bool,
}

impl ScriptedFrameSource {
    pub fn is_paused(&self) -> bool {
        self.paused
    }
}

#[async_trait]
impl FrameSource for ScriptedFrameSource {
    async fn init_camera(&mut self, front: bool) -> Result<(), DeviceError> {
        tracing::debug!(front, "Replay camera ready");
        Ok(())
    }

    async fn init_tracker(&mut self) -> Result<(), DeviceError> {
        Ok(())
    }

    async fn start(&mut self, handle: SessionHandle) -> Result<(), DeviceError> {
        let frames = self
            .frames
            .take()
            .ok_or_else(|| DeviceError::Failed("replay already started".to_string()))?;
        self.task = Some(tokio::spawn(async move {
            let stream = timed(frames);
            futures::pin_mut!(stream);
            while let Some(frame) = stream.next().await {
                if handle.frame(FrameSample::from(frame)).is_err() {
                    break;
                }
            }
        }));
        Ok(())
    }

    fn set_paused(&mut self, paused: bool) {
        tracing::debug!(paused, "Replay signal forwarding toggled");
        self.paused = paused;
    }

    async fn switch_camera(&mut self, front: bool) -> Result<(), DeviceError> {
        tracing::debug!(front, "Replay ignores camera switch");
        Ok(())
    }

    async fn stop(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}

pub struct ScriptedChannel {
    events: Option<Vec<(u64, ChannelEvent)>>,
    task: Option<JoinHandle<()>>,
}

#[async_trait]
impl TransportChannel for ScriptedChannel {
    async fn connect(
        &mut self,
        params: &ConnectParams,
        handle: SessionHandle,
    ) -> Result<(), DeviceError> {
        let url = params
            .socket_url()
            .map_err(|e| DeviceError::Failed(format!("invalid socket url: {e}")))?;
        tracing::debug!(host = url.host_str().unwrap_or_default(), "Replay channel connected");

        let events = self
            .events
            .take()
            .ok_or_else(|| DeviceError::Failed("replay channel already connected".to_string()))?;
        self.task = Some(tokio::spawn(async move {
            let stream = timed(events);
            futures::pin_mut!(stream);
            while let Some(event) = stream.next().await {
                if handle.channel(event).is_err() {
                    break;
                }
            }
        }));
        Ok(())
    }

    async fn close(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}
