//! Remote inference channel: inbound wire protocol and connection parameters.

use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use url::Url;

use crate::config::SocketConfig;
use crate::metrics::{MetricEvent, MetricStatus};

#[derive(Debug, Error)]
pub enum ChannelDecodeError {
    #[error("empty channel message")]
    Empty,
    #[error("invalid channel payload: {0}")]
    Json(#[from] serde_json::Error),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProgressPayload {
    pub progress_percent: f64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct MeanDataPayload {
    pub bpm: Option<f64>,
    pub oxygen: Option<f64>,
    pub rr: Option<f64>,
    pub blood_pressure_status: Option<MetricStatus>,
    pub stress_status: Option<MetricStatus>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HrvPayload {
    pub ibi: Option<f64>,
    pub rmssd: Option<f64>,
    pub sdnn: Option<f64>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BloodPressurePayload {
    pub systolic: Option<f64>,
    pub diastolic: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StressPayload {
    pub stress: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SignalQualityPayload {
    pub snr: f64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SignalPayload {
    #[serde(default)]
    pub signal: Vec<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusPayload {
    pub status_code: i32,
    #[serde(default)]
    pub status_message: String,
}

/// Advisory conditions reported by the inference service. They never end the session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ChannelWarning {
    Interference,
    UnstableConditions,
    FaceSize,
    FaceOrient,
    Moving,
    /// Local warning raised when the channel drops mid-scan.
    Disconnected,
}

impl ChannelWarning {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Interference => "interference",
            Self::UnstableConditions => "unstableConditions",
            Self::FaceSize => "faceSize",
            Self::FaceOrient => "faceOrient",
            Self::Moving => "moving",
            Self::Disconnected => "disconnected",
        }
    }
}

impl fmt::Display for ChannelWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WarningPayload {
    pub kind: ChannelWarning,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ClosedPayload {
    #[serde(default)]
    pub reason: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ErrorPayload {
    #[serde(default)]
    pub message: String,
}

/// One inbound message, `{"type": ..., "data": ...}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data", rename_all = "camelCase")]
pub enum ChannelEvent {
    Connected,
    Progress(ProgressPayload),
    MeanData(MeanDataPayload),
    Hrv(HrvPayload),
    BloodPressure(BloodPressurePayload),
    Stress(StressPayload),
    SignalQuality(SignalQualityPayload),
    Signal(SignalPayload),
    Status(StatusPayload),
    Warning(WarningPayload),
    Closed(ClosedPayload),
    Error(ErrorPayload),
}

impl ChannelEvent {
    pub fn parse(text: &str) -> Result<Self, ChannelDecodeError> {
        let text = text.trim();
        if text.is_empty() {
            return Err(ChannelDecodeError::Empty);
        }
        Ok(serde_json::from_str(text)?)
    }

    pub fn progress(percent: f64) -> Self {
        Self::Progress(ProgressPayload {
            progress_percent: percent,
        })
    }

    /// Metric payloads mapped for the aggregator; `None` for non-metric events.
    pub fn metric_event(&self) -> Option<MetricEvent> {
        match self {
            Self::MeanData(p) => Some(MetricEvent::MeanData {
                bpm: p.bpm,
                oxygen: p.oxygen,
                rr: p.rr,
                blood_pressure_status: p.blood_pressure_status,
                stress_status: p.stress_status,
            }),
            Self::Hrv(p) => Some(MetricEvent::Hrv {
                ibi: p.ibi,
                rmssd: p.rmssd,
                sdnn: p.sdnn,
            }),
            Self::BloodPressure(p) => Some(MetricEvent::BloodPressure {
                systolic: p.systolic,
                diastolic: p.diastolic,
            }),
            Self::Stress(p) => Some(MetricEvent::Stress { stress: p.stress }),
            _ => None,
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Self::Connected => "connected",
            Self::Progress(_) => "progress",
            Self::MeanData(_) => "meanData",
            Self::Hrv(_) => "hrv",
            Self::BloodPressure(_) => "bloodPressure",
            Self::Stress(_) => "stress",
            Self::SignalQuality(_) => "signalQuality",
            Self::Signal(_) => "signal",
            Self::Status(_) => "status",
            Self::Warning(_) => "warning",
            Self::Closed(_) => "closed",
            Self::Error(_) => "error",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum SignalQualityLevel {
    Poor,
    Fair,
    Good,
    Excellent,
}

impl SignalQualityLevel {
    pub fn from_snr(snr: f64) -> Self {
        if snr >= 0.8 {
            Self::Excellent
        } else if snr >= 0.6 {
            Self::Good
        } else if snr >= 0.4 {
            Self::Fair
        } else {
            Self::Poor
        }
    }
}

/// Subject data sent with the socket connection.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserProfile {
    pub sex: String,
    pub age: u32,
    pub weight_kg: f64,
    pub height_cm: f64,
}

#[derive(Clone)]
pub struct ConnectParams {
    pub base_url: String,
    pub auth_token: String,
    pub profile: UserProfile,
}

impl ConnectParams {
    pub fn from_config(socket: &SocketConfig, profile: UserProfile) -> Self {
        Self {
            base_url: socket.url.clone(),
            auth_token: socket.auth_token.clone(),
            profile,
        }
    }

    /// Base URL with `authToken, sex, age, weight, height` appended.
    pub fn socket_url(&self) -> Result<Url, url::ParseError> {
        let profile = &self.profile;
        Url::parse_with_params(
            &self.base_url,
            [
                ("authToken", self.auth_token.clone()),
                ("sex", profile.sex.clone()),
                ("age", profile.age.to_string()),
                ("weight", profile.weight_kg.to_string()),
                ("height", profile.height_cm.to_string()),
            ],
        )
    }
}

impl fmt::Debug for ConnectParams {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectParams")
            .field("base_url", &self.base_url)
            .field("auth_token", &"***REDACTED***")
            .field("profile", &self.profile)
            .finish()
    }
}
