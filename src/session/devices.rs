use async_trait::async_trait;

use crate::channel::ConnectParams;
use crate::error::{DeviceError, SinkError};
use crate::metrics::ScanResult;

use super::SessionHandle;

/// Camera + on-device face tracker.
///
/// Frames are pushed through [`SessionHandle::frame`] once [`FrameSource::start`]
/// succeeded. Pausing only stops signal forwarding to the inference service;
/// face tracking keeps delivering frames so quality can recover.
#[async_trait]
pub trait FrameSource: Send {
    async fn init_camera(&mut self, front: bool) -> Result<(), DeviceError>;

    async fn init_tracker(&mut self) -> Result<(), DeviceError>;

    async fn start(&mut self, handle: SessionHandle) -> Result<(), DeviceError>;

    fn set_paused(&mut self, paused: bool);

    async fn switch_camera(&mut self, front: bool) -> Result<(), DeviceError>;

    /// Releases the camera and tracker. Also called after each failed init
    /// attempt, so repeated calls must be harmless.
    async fn stop(&mut self);
}

/// Websocket to the remote inference service.
///
/// Inbound messages, including `connected`, are delivered through
/// [`SessionHandle::channel`].
#[async_trait]
pub trait TransportChannel: Send {
    async fn connect(
        &mut self,
        params: &ConnectParams,
        handle: SessionHandle,
    ) -> Result<(), DeviceError>;

    async fn close(&mut self);
}

/// Receives the final result exactly once per session.
pub trait ResultSink: Send {
    fn submit(&mut self, result: &ScanResult) -> Result<(), SinkError>;
}

/// Sink that only logs the result.
#[derive(Debug, Default)]
pub struct LogSink;

impl ResultSink for LogSink {
    fn submit(&mut self, result: &ScanResult) -> Result<(), SinkError> {
        tracing::info!(
            session_id = %result.session_id,
            complete = result.is_complete(),
            timed_out = result.timed_out,
            "Scan result ready"
        );
        Ok(())
    }
}
