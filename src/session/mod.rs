//! Scan session lifecycle.
//!
//! Every input (frames, channel messages, handle commands, timer firings)
//! is serialized through one queue and consumed by [`SessionController::run`].
//! The only awaits are the collaborator boundary calls.

mod devices;
mod handle;
mod timers;

pub use devices::{FrameSource, LogSink, ResultSink, TransportChannel};
pub use handle::{SessionEvent, SessionHandle};
pub use timers::{TimerKind, Timers};

use std::collections::VecDeque;
use std::future::Future;

use serde::Serialize;
use tokio::sync::{broadcast, mpsc};
use tokio::time::{sleep, sleep_until, Instant};
use uuid::Uuid;

use crate::channel::{ChannelEvent, ChannelWarning, ConnectParams, SignalQualityLevel};
use crate::config::ScanConfig;
use crate::constants::UPDATE_CHANNEL_CAPACITY;
use crate::error::{DeviceError, InitStep, SessionError};
use crate::frame::{FpsStats, FrameSample};
use crate::metrics::{MetricAggregator, MetricKind, ScanResult};
use crate::progress::{Effects, GuideView, ProgressStateMachine, SessionState, Transition};
use crate::quality::QualityGate;

/// Observable session output, fanned out to every subscriber.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", content = "data", rename_all = "camelCase")]
pub enum SessionUpdate {
    StateChanged(Transition),
    Guide(GuideView),
    #[serde(rename_all = "camelCase")]
    Progress {
        percent: f64,
        elapsed_secs: f64,
        signal_quality: Option<SignalQualityLevel>,
    },
    MetricUpdated {
        kind: MetricKind,
        value: f64,
    },
    Warning(ChannelWarning),
    Fps(FpsStats),
    DeviceUnsupported(FpsStats),
    #[serde(rename_all = "camelCase")]
    FpsCheckDone {
        average_fps: f64,
        supported: bool,
    },
    InitRetry {
        attempt: u32,
        step: InitStep,
        error: String,
    },
    TimedOut,
    Submitted(ScanResult),
    Failed {
        error: String,
    },
    Stopped,
}

#[derive(Debug, Clone)]
pub struct SessionOutcome {
    pub session_id: Uuid,
    pub state: SessionState,
    pub result: Option<ScanResult>,
    pub error: Option<SessionError>,
    pub fps: FpsStats,
}

enum Wake {
    Event(Option<SessionEvent>),
    Timer,
}

enum InitAbort {
    Stopped,
    Failed(InitStep, DeviceError),
}

pub struct SessionController {
    id: Uuid,
    config: ScanConfig,
    params: ConnectParams,
    source: Box<dyn FrameSource>,
    channel: Box<dyn TransportChannel>,
    sink: Box<dyn ResultSink>,
    machine: ProgressStateMachine,
    gate: QualityGate,
    metrics: MetricAggregator,
    fps: FpsStats,
    timers: Timers,
    events_rx: mpsc::UnboundedReceiver<SessionEvent>,
    /// Events received while `start` was waiting on a collaborator.
    pending: VecDeque<SessionEvent>,
    handle: SessionHandle,
    started_at: Option<Instant>,
    front_camera: bool,
    paused: bool,
    started: bool,
    stopped: bool,
    channel_open: bool,
    checking_fps: bool,
    last_fps_bucket: Option<i64>,
    signal_quality: Option<SignalQualityLevel>,
    result: Option<ScanResult>,
    error: Option<SessionError>,
}

impl SessionController {
    pub fn new(
        config: ScanConfig,
        params: ConnectParams,
        source: Box<dyn FrameSource>,
        channel: Box<dyn TransportChannel>,
        sink: Box<dyn ResultSink>,
    ) -> Result<Self, SessionError> {
        config.validate().map_err(SessionError::InvalidConfig)?;

        let id = Uuid::new_v4();
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let (updates_tx, _) = broadcast::channel(UPDATE_CHANNEL_CAPACITY);

        Ok(Self {
            id,
            machine: ProgressStateMachine::new(config.language.clone()),
            gate: QualityGate::new(config.quality_window),
            front_camera: config.use_front_camera,
            config,
            params,
            source,
            channel,
            sink,
            metrics: MetricAggregator::new(),
            fps: FpsStats::default(),
            timers: Timers::default(),
            events_rx,
            pending: VecDeque::new(),
            handle: SessionHandle::new(id, events_tx, updates_tx),
            started_at: None,
            paused: false,
            started: false,
            stopped: false,
            channel_open: false,
            checking_fps: false,
            last_fps_bucket: None,
            signal_quality: None,
            result: None,
            error: None,
        })
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn handle(&self) -> SessionHandle {
        self.handle.clone()
    }

    pub fn state(&self) -> SessionState {
        self.machine.state()
    }

    pub fn metrics(&self) -> &MetricAggregator {
        &self.metrics
    }

    pub fn fps(&self) -> FpsStats {
        self.fps
    }

    pub fn is_blocked(&self) -> bool {
        self.machine.is_blocked()
    }

    pub fn is_paused(&self) -> bool {
        self.paused
    }

    pub fn is_stopped(&self) -> bool {
        self.stopped
    }

    pub fn is_checking_fps(&self) -> bool {
        self.checking_fps
    }

    pub fn is_front_camera(&self) -> bool {
        self.front_camera
    }

    pub fn timers(&self) -> &Timers {
        &self.timers
    }

    /// Runs camera → tracker → socket, restarting the whole sequence on
    /// failure, then starts the pipeline and arms the session timers.
    ///
    /// A stop requested meanwhile aborts the current step or backoff and
    /// returns [`SessionError::Terminated`]. Other events are kept for [`run`](Self::run).
    pub async fn start(&mut self) -> Result<(), SessionError> {
        if self.started {
            return Err(SessionError::AlreadyStarted);
        }
        if self.stopped {
            return Err(SessionError::Terminated);
        }
        self.started = true;

        let attempts = self.config.init_attempts;
        for attempt in 1..=attempts {
            let (step, err) = match self.init_sequence().await {
                Ok(()) => {
                    self.begin_pipeline();
                    return Ok(());
                }
                Err(InitAbort::Stopped) => return Err(self.abort_init().await),
                Err(InitAbort::Failed(step, err)) => (step, err),
            };

            tracing::warn!(attempt, attempts, step = %step, error = %err, "Session init attempt failed");
            if step == InitStep::Camera && matches!(err, DeviceError::NotFound(_)) {
                tracing::warn!("Camera not found: check that it is connected and camera permission is granted");
            }

            if attempt == attempts {
                let error = SessionError::InitFailed {
                    step,
                    attempts,
                    source: err,
                };
                self.fail(Some(step), error.clone()).await;
                return Err(error);
            }

            if self.release_attempt().await {
                return Err(self.abort_init().await);
            }
            self.emit(SessionUpdate::InitRetry {
                attempt,
                step,
                error: err.to_string(),
            });
            let backoff = sleep(self.config.init_backoff);
            if until_stopped(&mut self.events_rx, &mut self.pending, backoff)
                .await
                .is_none()
            {
                return Err(self.abort_init().await);
            }
        }

        Err(SessionError::InvalidConfig(
            "scan.init_attempts must be >= 1".to_string(),
        ))
    }

    /// Drives the event queue until the session stops.
    pub async fn run(mut self) -> SessionOutcome {
        if !self.started && self.start().await.is_err() {
            return self.outcome();
        }

        while !self.stopped {
            if let Some(event) = self.pending.pop_front() {
                self.handle_event(event).await;
                continue;
            }
            let deadline = self.timers.next_deadline();
            let wake = tokio::select! {
                biased;
                event = self.events_rx.recv() => Wake::Event(event),
                _ = sleep_until_opt(deadline) => Wake::Timer,
            };
            match wake {
                Wake::Event(Some(event)) => self.handle_event(event).await,
                Wake::Event(None) => self.stop().await,
                Wake::Timer => self.fire_due_timers().await,
            }
        }

        self.outcome()
    }

    pub async fn handle_event(&mut self, event: SessionEvent) {
        if self.stopped {
            return;
        }
        match event {
            SessionEvent::Frame(sample) => self.on_frame(&sample).await,
            SessionEvent::Channel(event) => self.on_channel(event).await,
            SessionEvent::SwitchCamera => self.switch_camera().await,
            SessionEvent::Stop => self.stop().await,
        }
    }

    /// Idempotent: cancels timers and releases the collaborators once.
    pub async fn stop(&mut self) {
        if self.stopped {
            return;
        }
        self.stopped = true;
        self.timers.cancel_all();
        self.checking_fps = false;
        self.pending.clear();

        self.source.stop().await;
        self.channel.close().await;
        self.channel_open = false;

        tracing::info!(session_id = %self.id, state = %self.machine.state(), "Session stopped");
        self.emit(SessionUpdate::Stopped);
    }

    /// Pauses or resumes signal acquisition. Repeated calls with the same value are ignored.
    pub(crate) fn pause(&mut self, blocked: bool) {
        if self.paused == blocked || self.stopped {
            return;
        }
        self.paused = blocked;
        self.source.set_paused(blocked);
        tracing::debug!(paused = blocked, "Acquisition pause changed");
    }

    pub async fn switch_camera(&mut self) {
        if self.stopped {
            return;
        }
        let front = !self.front_camera;
        match self.source.switch_camera(front).await {
            Ok(()) => {
                self.front_camera = front;
                tracing::info!(front, "Camera switched");
            }
            Err(e) => tracing::warn!(error = %e, "Camera switch failed"),
        }
    }

    async fn init_sequence(&mut self) -> Result<(), InitAbort> {
        let front = self.front_camera;
        self.enter(InitStep::Camera);
        until_stopped(
            &mut self.events_rx,
            &mut self.pending,
            self.source.init_camera(front),
        )
        .await
        .ok_or(InitAbort::Stopped)?
        .map_err(|e| InitAbort::Failed(InitStep::Camera, e))?;

        self.enter(InitStep::Tracker);
        until_stopped(
            &mut self.events_rx,
            &mut self.pending,
            self.source.init_tracker(),
        )
        .await
        .ok_or(InitAbort::Stopped)?
        .map_err(|e| InitAbort::Failed(InitStep::Tracker, e))?;

        self.enter(InitStep::Socket);
        let handle = self.handle.clone();
        until_stopped(
            &mut self.events_rx,
            &mut self.pending,
            self.channel.connect(&self.params, handle.clone()),
        )
        .await
        .ok_or(InitAbort::Stopped)?
        .map_err(|e| InitAbort::Failed(InitStep::Socket, e))?;
        self.channel_open = true;

        until_stopped(
            &mut self.events_rx,
            &mut self.pending,
            self.source.start(handle),
        )
        .await
        .ok_or(InitAbort::Stopped)?
        .map_err(|e| InitAbort::Failed(InitStep::Tracker, e))
    }

    /// Releases what a failed attempt acquired and drops the events it
    /// produced. Returns whether a stop was requested in the meantime.
    async fn release_attempt(&mut self) -> bool {
        self.source.stop().await;
        if self.channel_open {
            self.channel.close().await;
            self.channel_open = false;
        }

        let mut stop_requested = false;
        while let Ok(event) = self.events_rx.try_recv() {
            match event {
                SessionEvent::Stop => stop_requested = true,
                other => self.pending.push_back(other),
            }
        }
        // 失败尝试遗留的帧与通道消息作废
        self.pending
            .retain(|event| matches!(event, SessionEvent::SwitchCamera));
        stop_requested
    }

    async fn abort_init(&mut self) -> SessionError {
        tracing::info!(session_id = %self.id, state = %self.machine.state(), "Init aborted by stop request");
        self.stop().await;
        SessionError::Terminated
    }

    fn enter(&mut self, step: InitStep) {
        if let Some(transition) = self.machine.begin_init(step) {
            self.emit(SessionUpdate::StateChanged(transition));
        }
    }

    fn begin_pipeline(&mut self) {
        let now = Instant::now();
        self.started_at = Some(now);
        self.checking_fps = true;
        self.timers
            .arm(TimerKind::FpsCheck, now + self.config.fps_check_delay);
        self.timers
            .arm(TimerKind::SessionTimeout, now + self.config.session_timeout);
        tracing::info!(
            session_id = %self.id,
            timeout_secs = self.config.session_timeout.as_secs(),
            "Scan pipeline started"
        );
    }

    async fn on_frame(&mut self, sample: &FrameSample) {
        self.fps.record(sample);
        let bucket = sample.average_fps.round() as i64;
        if self.last_fps_bucket != Some(bucket) {
            self.last_fps_bucket = Some(bucket);
            self.emit(SessionUpdate::Fps(self.fps));
        }

        if self.machine.state().is_terminal() {
            return;
        }
        let flags = self.gate.update(sample);
        let effects = self.machine.update_quality(flags, self.gate.blink_count());
        self.apply(effects).await;
    }

    async fn on_channel(&mut self, event: ChannelEvent) {
        if self.machine.state().is_terminal() {
            return;
        }

        if let Some(metric_event) = event.metric_event() {
            let now_ms = self.elapsed().as_millis() as i64;
            for kind in self.metrics.apply_event(&metric_event, now_ms) {
                if let Some(value) = self.metrics.value(kind) {
                    self.emit(SessionUpdate::MetricUpdated { kind, value });
                }
            }
            let effects = self.machine.update_metrics(self.metrics.is_complete());
            self.apply(effects).await;
            return;
        }

        match event {
            ChannelEvent::Connected => {
                let effects = self.machine.connected();
                self.apply(effects).await;
            }
            ChannelEvent::Progress(p) => {
                self.emit(SessionUpdate::Progress {
                    percent: p.progress_percent,
                    elapsed_secs: self.elapsed().as_secs_f64(),
                    signal_quality: self.signal_quality,
                });
                let effects = self.machine.update_progress(p.progress_percent);
                self.apply(effects).await;
            }
            ChannelEvent::Signal(p) => {
                let effects = self.machine.update_signal(p.signal.len());
                self.apply(effects).await;
            }
            ChannelEvent::SignalQuality(p) => {
                self.signal_quality = Some(SignalQualityLevel::from_snr(p.snr));
            }
            ChannelEvent::Status(p) => {
                tracing::debug!(code = p.status_code, message = %p.status_message, "Channel status");
            }
            ChannelEvent::Warning(p) => {
                tracing::warn!(warning = %p.kind, "Channel warning");
                self.emit(SessionUpdate::Warning(p.kind));
            }
            ChannelEvent::Closed(p) => {
                let reason = p.reason.unwrap_or_else(|| "closed".to_string());
                self.on_channel_lost(reason).await;
            }
            ChannelEvent::Error(p) => self.on_channel_lost(p.message).await,
            ChannelEvent::MeanData(_)
            | ChannelEvent::Hrv(_)
            | ChannelEvent::BloodPressure(_)
            | ChannelEvent::Stress(_) => {}
        }
    }

    async fn on_channel_lost(&mut self, reason: String) {
        if self.machine.state().is_initializing() {
            let error = SessionError::InitFailed {
                step: InitStep::Socket,
                attempts: 1,
                source: DeviceError::Failed(reason),
            };
            self.fail(Some(InitStep::Socket), error).await;
        } else {
            tracing::warn!(reason = %reason, state = %self.machine.state(), "Channel lost during scan");
            self.emit(SessionUpdate::Warning(ChannelWarning::Disconnected));
        }
    }

    async fn fire_due_timers(&mut self) {
        for kind in self.timers.take_due(Instant::now()) {
            match kind {
                TimerKind::FpsCheck => self.check_fps(),
                TimerKind::FpsConfirm => self.confirm_fps(),
                TimerKind::SessionTimeout => self.on_timeout().await,
            }
            if self.stopped {
                break;
            }
        }
    }

    fn check_fps(&mut self) {
        let average = self.fps.average;
        if average < self.config.fps_threshold {
            tracing::debug!(average, threshold = self.config.fps_threshold, "Low frame rate, confirming");
            self.timers
                .arm(TimerKind::FpsConfirm, Instant::now() + self.config.fps_confirm_delay);
        } else {
            self.finish_fps_check(true);
        }
    }

    fn confirm_fps(&mut self) {
        let supported = self.fps.average >= self.config.fps_threshold;
        if !supported && !self.fps.unsupported {
            self.fps.unsupported = true;
            tracing::warn!(
                average = self.fps.average,
                max = self.fps.max,
                threshold = self.config.fps_threshold,
                "Device frame rate unsupported"
            );
            self.emit(SessionUpdate::DeviceUnsupported(self.fps));
        }
        self.finish_fps_check(supported);
    }

    fn finish_fps_check(&mut self, supported: bool) {
        self.checking_fps = false;
        self.emit(SessionUpdate::FpsCheckDone {
            average_fps: self.fps.average,
            supported,
        });
    }

    async fn on_timeout(&mut self) {
        tracing::warn!(
            session_id = %self.id,
            state = %self.machine.state(),
            missing = ?self.metrics.missing(),
            "Session timed out, submitting available metrics"
        );
        self.emit(SessionUpdate::TimedOut);
        let effects = self.machine.force_timeout();
        self.apply(effects).await;
    }

    async fn apply(&mut self, effects: Effects) {
        for transition in &effects.transitions {
            self.emit(SessionUpdate::StateChanged(*transition));
        }
        if let Some(blocked) = effects.pause {
            self.pause(blocked);
        }
        if let Some(view) = effects.guide {
            self.emit(SessionUpdate::Guide(view));
        }
        if effects.submit {
            self.submit().await;
        }
    }

    async fn submit(&mut self) {
        let result = self.metrics.to_result(self.id, self.machine.timed_out());
        match self.sink.submit(&result) {
            Ok(()) => tracing::info!(
                session_id = %self.id,
                complete = result.is_complete(),
                timed_out = result.timed_out,
                "Scan result submitted"
            ),
            Err(e) => {
                tracing::error!(session_id = %self.id, error = %e, "Result submission failed");
                self.error = Some(SessionError::from(e));
            }
        }

        if let Some(transition) = self.machine.complete_submission() {
            self.emit(SessionUpdate::StateChanged(transition));
        }
        self.emit(SessionUpdate::Submitted(result.clone()));
        self.result = Some(result);
        self.stop().await;
    }

    async fn fail(&mut self, step: Option<InitStep>, error: SessionError) {
        tracing::error!(session_id = %self.id, error = %error, "Session failed");
        if let Some(transition) = self.machine.fail(step) {
            self.emit(SessionUpdate::StateChanged(transition));
        }
        self.emit(SessionUpdate::Failed {
            error: error.to_string(),
        });
        self.error = Some(error);
        self.stop().await;
    }

    fn elapsed(&self) -> std::time::Duration {
        self.started_at
            .map(|at| at.elapsed())
            .unwrap_or_default()
    }

    fn emit(&self, update: SessionUpdate) {
        self.handle.publish(update);
    }

    fn outcome(&self) -> SessionOutcome {
        SessionOutcome {
            session_id: self.id,
            state: self.machine.state(),
            result: self.result.clone(),
            error: self.error.clone(),
            fps: self.fps,
        }
    }
}

/// Runs `work` unless a stop arrives first. Other events are queued in `pending`.
async fn until_stopped<F: Future>(
    events: &mut mpsc::UnboundedReceiver<SessionEvent>,
    pending: &mut VecDeque<SessionEvent>,
    work: F,
) -> Option<F::Output> {
    let stop = async {
        loop {
            match events.recv().await {
                Some(SessionEvent::Stop) | None => return,
                Some(event) => pending.push_back(event),
            }
        }
    };
    tokio::select! {
        biased;
        _ = stop => None,
        out = work => Some(out),
    }
}

async fn sleep_until_opt(deadline: Option<Instant>) {
    match deadline {
        Some(at) => sleep_until(at).await,
        None => std::future::pending::<()>().await,
    }
}
