//! Session state machine.
//!
//! A pure reducer: every input (init step, connect, quality flags, progress,
//! signal length, metric completeness, timeout) returns the [`Effects`] the
//! controller has to carry out. No I/O and no clocks live here.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::constants::{
    BLINK_CHECK_LOWER_PCT, BLINK_CHECK_UPPER_PCT, PROGRESS_COMPLETE_PCT, SIGNAL_CHART_MIN_SAMPLES,
};
use crate::error::InitStep;
use crate::guide::{self, GuideKey, GuideMessage, HaloState};
use crate::quality::QualityFlags;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum SessionState {
    Idle,
    CameraInit,
    TrackerInit,
    SocketConnecting,
    Calibrating,
    SignalAcquisition,
    Analyzing,
    Finalizing,
    Submitted,
    Error,
}

impl SessionState {
    fn rank(self) -> u8 {
        match self {
            Self::Idle => 0,
            Self::CameraInit => 1,
            Self::TrackerInit => 2,
            Self::SocketConnecting => 3,
            Self::Calibrating => 4,
            Self::SignalAcquisition => 5,
            Self::Analyzing => 6,
            Self::Finalizing => 7,
            Self::Submitted => 8,
            Self::Error => 9,
        }
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Submitted | Self::Error)
    }

    /// States in which quality conditions may block acquisition.
    pub fn is_acquiring(self) -> bool {
        matches!(self, Self::Calibrating | Self::SignalAcquisition)
    }

    pub fn is_initializing(self) -> bool {
        matches!(
            self,
            Self::Idle | Self::CameraInit | Self::TrackerInit | Self::SocketConnecting
        )
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::CameraInit => "cameraInit",
            Self::TrackerInit => "trackerInit",
            Self::SocketConnecting => "socketConnecting",
            Self::Calibrating => "calibrating",
            Self::SignalAcquisition => "signalAcquisition",
            Self::Analyzing => "analyzing",
            Self::Finalizing => "finalizing",
            Self::Submitted => "submitted",
            Self::Error => "error",
        }
    }
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl From<InitStep> for SessionState {
    fn from(step: InitStep) -> Self {
        match step {
            InitStep::Camera => Self::CameraInit,
            InitStep::Tracker => Self::TrackerInit,
            InitStep::Socket => Self::SocketConnecting,
        }
    }
}

/// Why acquisition is paused. Variant order is display priority.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum BlockReason {
    FaceNotDetected,
    FaceTooFar,
    FaceNotOriented,
    BlinkCheck,
}

impl BlockReason {
    pub fn guide_key(self) -> GuideKey {
        match self {
            Self::FaceNotDetected => GuideKey::FaceNotDetected,
            Self::FaceTooFar => GuideKey::FaceSize,
            Self::FaceNotOriented => GuideKey::FaceOrient,
            Self::BlinkCheck => GuideKey::BlinkCheck,
        }
    }
}

/// UI-facing summary of the session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GuideView {
    pub halo: HaloState,
    pub message: GuideMessage,
    pub is_blocked: bool,
    pub block_reason: Option<BlockReason>,
    pub should_draw_chart: bool,
    pub is_calibrated: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Transition {
    pub from: SessionState,
    pub to: SessionState,
}

/// What the controller must do after feeding one input.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Effects {
    pub transitions: Vec<Transition>,
    /// `Some(blocked)` when the pause state of the pipeline changed.
    pub pause: Option<bool>,
    /// Hand the result to the sink. Set at most once per session.
    pub submit: bool,
    /// Set when the guide view differs from the last one reported.
    pub guide: Option<GuideView>,
}

impl Effects {
    pub fn is_empty(&self) -> bool {
        self.transitions.is_empty() && self.pause.is_none() && !self.submit && self.guide.is_none()
    }

    fn absorb(&mut self, other: Effects) {
        self.transitions.extend(other.transitions);
        if other.pause.is_some() {
            self.pause = other.pause;
        }
        self.submit |= other.submit;
        if other.guide.is_some() {
            self.guide = other.guide;
        }
    }
}

#[derive(Debug, Clone)]
pub struct ProgressStateMachine {
    state: SessionState,
    language: String,
    flags: QualityFlags,
    blink_count: u32,
    blink_pending: bool,
    block: Option<BlockReason>,
    progress: f64,
    signal_len: usize,
    metrics_complete: bool,
    submitted: bool,
    timed_out: bool,
    failed_step: Option<InitStep>,
    last_view: Option<GuideView>,
}

impl ProgressStateMachine {
    pub fn new(language: impl Into<String>) -> Self {
        Self {
            state: SessionState::Idle,
            language: language.into(),
            flags: QualityFlags::default(),
            blink_count: 0,
            blink_pending: false,
            block: None,
            progress: 0.0,
            signal_len: 0,
            metrics_complete: false,
            submitted: false,
            timed_out: false,
            failed_step: None,
            last_view: None,
        }
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn is_blocked(&self) -> bool {
        self.block.is_some()
    }

    pub fn block_reason(&self) -> Option<BlockReason> {
        self.block
    }

    pub fn progress(&self) -> f64 {
        self.progress
    }

    pub fn is_submitted(&self) -> bool {
        self.submitted
    }

    pub fn timed_out(&self) -> bool {
        self.timed_out
    }

    pub fn failed_step(&self) -> Option<InitStep> {
        self.failed_step
    }

    /// Moves into the state of `step`. Re-entering a step already reached is a no-op.
    pub fn begin_init(&mut self, step: InitStep) -> Option<Transition> {
        self.advance(SessionState::from(step))
    }

    /// Socket connected: `SocketConnecting → Calibrating`.
    pub fn connected(&mut self) -> Effects {
        if self.state != SessionState::SocketConnecting {
            return Effects::default();
        }
        let mut effects = Effects::default();
        effects.transitions.extend(self.advance(SessionState::Calibrating));
        effects.absorb(self.evaluate());
        effects
    }

    pub fn fail(&mut self, step: Option<InitStep>) -> Option<Transition> {
        if self.state.is_terminal() {
            return None;
        }
        self.failed_step = step;
        self.block = None;
        let from = self.state;
        self.state = SessionState::Error;
        tracing::info!(from = %from, to = %self.state, "Session state changed");
        Some(Transition {
            from,
            to: SessionState::Error,
        })
    }

    pub fn update_quality(&mut self, flags: QualityFlags, blink_count: u32) -> Effects {
        self.flags = flags;
        self.blink_count = blink_count;
        self.evaluate()
    }

    /// `percent` is taken as-is; the upstream service signals completion with a value past 100.
    pub fn update_progress(&mut self, percent: f64) -> Effects {
        if percent.is_finite() {
            self.progress = percent;
        }
        self.evaluate()
    }

    pub fn update_signal(&mut self, samples: usize) -> Effects {
        self.signal_len = samples;
        self.evaluate()
    }

    pub fn update_metrics(&mut self, complete: bool) -> Effects {
        self.metrics_complete = complete;
        self.evaluate()
    }

    /// Absolute timeout: jump to `Analyzing` and submit whatever is there.
    pub fn force_timeout(&mut self) -> Effects {
        let mut effects = Effects::default();
        if self.state.is_terminal() || self.submitted {
            return effects;
        }
        self.timed_out = true;
        if self.block.take().is_some() {
            effects.pause = Some(false);
        }
        effects.transitions.extend(self.advance(SessionState::Analyzing));
        effects.transitions.extend(self.advance(SessionState::Finalizing));
        self.submitted = true;
        effects.submit = true;
        effects.guide = self.refresh_view();
        effects
    }

    /// The sink has been handed the result: `Finalizing → Submitted`.
    pub fn complete_submission(&mut self) -> Option<Transition> {
        if self.state != SessionState::Finalizing {
            return None;
        }
        self.advance(SessionState::Submitted)
    }

    pub fn guide_view(&self) -> GuideView {
        let mut view = GuideView {
            halo: HaloState::Guide,
            message: guide::message(GuideKey::FaceGuide, &self.language),
            is_blocked: false,
            block_reason: None,
            should_draw_chart: false,
            is_calibrated: false,
        };

        match self.state {
            SessionState::Finalizing | SessionState::Submitted => {
                view.halo = HaloState::Finalizing;
                view.message = guide::message(GuideKey::FinalizingResults, &self.language);
                return view;
            }
            SessionState::Error => {
                view.halo = HaloState::Error;
                return view;
            }
            state if state.is_initializing() => return view,
            _ => {}
        }

        if let Some(reason) = self.block {
            view.halo = HaloState::Error;
            view.message = guide::message(reason.guide_key(), &self.language);
            view.is_blocked = true;
            view.block_reason = Some(reason);
            return view;
        }

        if self.progress > 0.0 && self.progress < PROGRESS_COMPLETE_PCT {
            view.halo = HaloState::Calibrating;
            view.message = guide::message(GuideKey::Calibration, &self.language);
        }
        if self.signal_len > SIGNAL_CHART_MIN_SAMPLES {
            view.message = guide::message(GuideKey::SignalInterpretation, &self.language);
            view.should_draw_chart = true;
        }
        if self.progress > PROGRESS_COMPLETE_PCT || self.state == SessionState::Analyzing {
            view.halo = HaloState::Analyzing;
            view.message = guide::message(GuideKey::AnalyzingBiometrics, &self.language);
            view.is_calibrated = true;
        }
        view
    }

    fn in_blink_band(&self) -> bool {
        self.progress > BLINK_CHECK_LOWER_PCT && self.progress < BLINK_CHECK_UPPER_PCT
    }

    fn compute_block(&mut self) -> Option<BlockReason> {
        if !self.state.is_acquiring() {
            self.blink_pending = false;
            return None;
        }
        // 进入检测区间后未眨眼则锁定，直到检测到眨眼
        if self.blink_count >= 1 {
            self.blink_pending = false;
        } else if self.in_blink_band() {
            self.blink_pending = true;
        }

        if !self.flags.face_present {
            Some(BlockReason::FaceNotDetected)
        } else if !self.flags.face_near {
            Some(BlockReason::FaceTooFar)
        } else if !self.flags.face_oriented {
            Some(BlockReason::FaceNotOriented)
        } else if self.blink_pending {
            Some(BlockReason::BlinkCheck)
        } else {
            None
        }
    }

    fn evaluate(&mut self) -> Effects {
        let mut effects = Effects::default();
        if self.state.is_terminal() {
            return effects;
        }

        let block = self.compute_block();
        if block != self.block {
            tracing::debug!(
                previous = ?self.block,
                current = ?block,
                progress = self.progress,
                blinks = self.blink_count,
                "Quality block changed"
            );
            if block.is_some() != self.block.is_some() {
                effects.pause = Some(block.is_some());
            }
            self.block = block;
        }

        if self.block.is_none() {
            if self.state == SessionState::Calibrating && self.progress > 0.0 {
                effects
                    .transitions
                    .extend(self.advance(SessionState::SignalAcquisition));
            }
            if self.state == SessionState::SignalAcquisition && self.progress > PROGRESS_COMPLETE_PCT
            {
                effects.transitions.extend(self.advance(SessionState::Analyzing));
            }
            let can_finalize = matches!(
                self.state,
                SessionState::Calibrating | SessionState::SignalAcquisition | SessionState::Analyzing
            );
            if can_finalize && self.metrics_complete && !self.submitted {
                effects.transitions.extend(self.advance(SessionState::Finalizing));
                self.submitted = true;
                effects.submit = true;
            }
        }

        effects.guide = self.refresh_view();
        effects
    }

    fn refresh_view(&mut self) -> Option<GuideView> {
        let view = self.guide_view();
        if self.last_view.as_ref() == Some(&view) {
            return None;
        }
        self.last_view = Some(view.clone());
        Some(view)
    }

    fn advance(&mut self, to: SessionState) -> Option<Transition> {
        if self.state.is_terminal() || to.rank() <= self.state.rank() {
            return None;
        }
        let from = self.state;
        self.state = to;
        tracing::info!(from = %from, to = %to, "Session state changed");
        Some(Transition { from, to })
    }
}
