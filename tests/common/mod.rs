#![allow(dead_code)]

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use face_scan_session::channel::{ChannelEvent, ClosedPayload, ConnectParams, UserProfile};
use face_scan_session::config::ScanConfig;
use face_scan_session::error::{DeviceError, SinkError};
use face_scan_session::frame::FrameSample;
use face_scan_session::metrics::ScanResult;
use face_scan_session::session::{
    FrameSource, ResultSink, SessionController, SessionHandle, SessionUpdate, TransportChannel,
};
use tokio::sync::broadcast;

/// Shared counters observed by the tests.
#[derive(Default)]
pub struct Recorder {
    pub camera_inits: AtomicU32,
    pub tracker_inits: AtomicU32,
    pub connects: AtomicU32,
    pub source_stops: AtomicU32,
    pub channel_closes: AtomicU32,
    pub pauses: Mutex<Vec<bool>>,
    pub switches: Mutex<Vec<bool>>,
    pub submissions: Mutex<Vec<ScanResult>>,
    /// Collaborator calls in the order they happened.
    pub calls: Mutex<Vec<&'static str>>,
}

impl Recorder {
    pub fn count(counter: &AtomicU32) -> u32 {
        counter.load(Ordering::SeqCst)
    }

    pub fn pauses(&self) -> Vec<bool> {
        self.pauses.lock().unwrap().clone()
    }

    pub fn submissions(&self) -> Vec<ScanResult> {
        self.submissions.lock().unwrap().clone()
    }

    pub fn calls(&self) -> Vec<&'static str> {
        self.calls.lock().unwrap().clone()
    }

    fn log(&self, call: &'static str) {
        self.calls.lock().unwrap().push(call);
    }
}

/// How the fake socket behaves once `connect` succeeded.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectMode {
    /// Emits `connected` through the handle.
    Auto,
    /// Emits nothing; the test drives `connected` itself.
    Manual,
    /// Emits `closed` instead of `connected`.
    CloseImmediately,
}

pub struct FakeSource {
    recorder: Arc<Recorder>,
    camera_failures: u32,
    tracker_failures: u32,
    start_failures: u32,
    camera_error: DeviceError,
    camera_delay: Duration,
}

#[async_trait]
impl FrameSource for FakeSource {
    async fn init_camera(&mut self, _front: bool) -> Result<(), DeviceError> {
        self.recorder.camera_inits.fetch_add(1, Ordering::SeqCst);
        self.recorder.log("camera");
        if !self.camera_delay.is_zero() {
            tokio::time::sleep(self.camera_delay).await;
        }
        if self.camera_failures > 0 {
            self.camera_failures -= 1;
            return Err(self.camera_error.clone());
        }
        Ok(())
    }

    async fn init_tracker(&mut self) -> Result<(), DeviceError> {
        self.recorder.tracker_inits.fetch_add(1, Ordering::SeqCst);
        self.recorder.log("tracker");
        if self.tracker_failures > 0 {
            self.tracker_failures -= 1;
            return Err(DeviceError::Failed("tracker wasm not loaded".to_string()));
        }
        Ok(())
    }

    async fn start(&mut self, _handle: SessionHandle) -> Result<(), DeviceError> {
        self.recorder.log("start");
        if self.start_failures > 0 {
            self.start_failures -= 1;
            return Err(DeviceError::Failed("frame loop did not start".to_string()));
        }
        Ok(())
    }

    fn set_paused(&mut self, paused: bool) {
        self.recorder.pauses.lock().unwrap().push(paused);
    }

    async fn switch_camera(&mut self, front: bool) -> Result<(), DeviceError> {
        self.recorder.switches.lock().unwrap().push(front);
        Ok(())
    }

    async fn stop(&mut self) {
        self.recorder.source_stops.fetch_add(1, Ordering::SeqCst);
        self.recorder.log("stop");
    }
}

pub struct FakeChannel {
    recorder: Arc<Recorder>,
    mode: ConnectMode,
}

#[async_trait]
impl TransportChannel for FakeChannel {
    async fn connect(
        &mut self,
        params: &ConnectParams,
        handle: SessionHandle,
    ) -> Result<(), DeviceError> {
        self.recorder.connects.fetch_add(1, Ordering::SeqCst);
        self.recorder.log("connect");
        params
            .socket_url()
            .map_err(|e| DeviceError::Failed(e.to_string()))?;
        let event = match self.mode {
            ConnectMode::Auto => Some(ChannelEvent::Connected),
            ConnectMode::CloseImmediately => Some(ChannelEvent::Closed(ClosedPayload {
                reason: Some("auth rejected".to_string()),
            })),
            ConnectMode::Manual => None,
        };
        if let Some(event) = event {
            handle
                .channel(event)
                .map_err(|e| DeviceError::Failed(e.to_string()))?;
        }
        Ok(())
    }

    async fn close(&mut self) {
        self.recorder.channel_closes.fetch_add(1, Ordering::SeqCst);
        self.recorder.log("close");
    }
}

pub struct RecordingSink {
    recorder: Arc<Recorder>,
}

impl ResultSink for RecordingSink {
    fn submit(&mut self, result: &ScanResult) -> Result<(), SinkError> {
        self.recorder.submissions.lock().unwrap().push(result.clone());
        Ok(())
    }
}

pub fn recording_sink(recorder: &Arc<Recorder>) -> Box<dyn ResultSink> {
    Box::new(RecordingSink {
        recorder: Arc::clone(recorder),
    })
}

pub struct Fixture {
    pub config: ScanConfig,
    pub mode: ConnectMode,
    pub camera_failures: u32,
    pub tracker_failures: u32,
    pub start_failures: u32,
    pub camera_error: DeviceError,
    /// How long `init_camera` takes before answering.
    pub camera_delay: Duration,
}

impl Default for Fixture {
    fn default() -> Self {
        Self {
            config: ScanConfig {
                quality_window: 3,
                ..ScanConfig::default()
            },
            mode: ConnectMode::Auto,
            camera_failures: 0,
            tracker_failures: 0,
            start_failures: 0,
            camera_delay: Duration::ZERO,
            camera_error: DeviceError::NotFound("object can not be found here".to_string()),
        }
    }
}

impl Fixture {
    pub fn manual() -> Self {
        Self {
            mode: ConnectMode::Manual,
            ..Self::default()
        }
    }

    pub fn build(self) -> (SessionController, Arc<Recorder>) {
        let recorder = Arc::new(Recorder::default());
        let source = FakeSource {
            recorder: Arc::clone(&recorder),
            camera_failures: self.camera_failures,
            tracker_failures: self.tracker_failures,
            start_failures: self.start_failures,
            camera_error: self.camera_error,
            camera_delay: self.camera_delay,
        };
        let channel = FakeChannel {
            recorder: Arc::clone(&recorder),
            mode: self.mode,
        };
        let params = ConnectParams {
            base_url: "wss://scan.test/vp/bgr_signal_socket".to_string(),
            auth_token: "test-token".to_string(),
            profile: UserProfile {
                sex: "male".to_string(),
                age: 40,
                weight_kg: 80.0,
                height_cm: 180.0,
            },
        };
        let controller = SessionController::new(
            self.config,
            params,
            Box::new(source),
            Box::new(channel),
            recording_sink(&recorder),
        )
        .expect("valid test config");
        (controller, recorder)
    }
}

pub fn frame(fps: f64) -> FrameSample {
    FrameSample::good(0, fps)
}

pub fn blink_frame() -> FrameSample {
    FrameSample {
        blink_detected: true,
        ..FrameSample::good(0, 30.0)
    }
}

pub fn no_face_frame() -> FrameSample {
    FrameSample {
        face_tracking_status: face_scan_session::frame::FaceTrackingStatus::NotFound,
        ..FrameSample::good(0, 30.0)
    }
}

/// Receives updates until one matches, returning it.
pub async fn wait_for<F>(rx: &mut broadcast::Receiver<SessionUpdate>, mut pred: F) -> SessionUpdate
where
    F: FnMut(&SessionUpdate) -> bool,
{
    let fut = async {
        loop {
            match rx.recv().await {
                Ok(update) if pred(&update) => return update,
                Ok(_) => {}
                Err(broadcast::error::RecvError::Lagged(_)) => {}
                Err(broadcast::error::RecvError::Closed) => panic!("update channel closed"),
            }
        }
    };
    tokio::time::timeout(Duration::from_secs(600), fut)
        .await
        .expect("timed out waiting for session update")
}

/// Receives every update up to and including `Stopped`.
pub async fn collect_until_stopped(rx: &mut broadcast::Receiver<SessionUpdate>) -> Vec<SessionUpdate> {
    let mut seen = Vec::new();
    loop {
        let update = wait_for(rx, |_| true).await;
        let stopped = update == SessionUpdate::Stopped;
        seen.push(update);
        if stopped {
            return seen;
        }
    }
}

/// Updates already queued for `rx`, without waiting.
pub fn drain(rx: &mut broadcast::Receiver<SessionUpdate>) -> Vec<SessionUpdate> {
    let mut seen = Vec::new();
    while let Ok(update) = rx.try_recv() {
        seen.push(update);
    }
    seen
}
