//! Per-frame tracker output as delivered by the capture pipeline.

use serde::{Deserialize, Serialize};

/// Face tracker status code. `0` is the only code meaning a usable face.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum FaceTrackingStatus {
    Ok,
    NotFound,
    Occluded,
    Other(i32),
}

impl FaceTrackingStatus {
    pub fn from_code(code: i32) -> Self {
        match code {
            0 => Self::Ok,
            1 => Self::NotFound,
            2 => Self::Occluded,
            other => Self::Other(other),
        }
    }

    pub fn code(self) -> i32 {
        match self {
            Self::Ok => 0,
            Self::NotFound => 1,
            Self::Occluded => 2,
            Self::Other(code) => code,
        }
    }

    pub fn is_ok(self) -> bool {
        matches!(self, Self::Ok)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FaceBox {
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ImageQualityFlags {
    #[serde(default)]
    pub face_size_flag: bool,
    #[serde(default)]
    pub face_orient_flag: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TrackerData {
    pub status: i32,
    /// `[x, y, width, height]`; empty or absent when no face is tracked.
    #[serde(default, alias = "faceBox")]
    pub face: Option<Vec<f64>>,
    #[serde(default)]
    pub image_quality_flags: ImageQualityFlags,
    #[serde(default)]
    pub eye_blink_status: bool,
}

/// Raw tracker callback payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TrackerFrame {
    pub rppg_tracker_data: TrackerData,
    #[serde(default)]
    pub instant_fps: f64,
    #[serde(default)]
    pub average_fps: f64,
    #[serde(default)]
    pub timestamp: i64,
}

/// One captured frame, reduced to what the session needs.
#[derive(Debug, Clone, PartialEq)]
pub struct FrameSample {
    pub face_tracking_status: FaceTrackingStatus,
    pub face_box: Option<FaceBox>,
    pub face_size_ok: bool,
    pub face_oriented_ok: bool,
    pub blink_detected: bool,
    pub instant_fps: f64,
    pub average_fps: f64,
    pub timestamp_ms: i64,
}

impl FrameSample {
    /// A frame with a well-placed face and no blink.
    pub fn good(timestamp_ms: i64, average_fps: f64) -> Self {
        Self {
            face_tracking_status: FaceTrackingStatus::Ok,
            face_box: None,
            face_size_ok: true,
            face_oriented_ok: true,
            blink_detected: false,
            instant_fps: average_fps,
            average_fps,
            timestamp_ms,
        }
    }
}

impl From<&TrackerFrame> for FrameSample {
    fn from(frame: &TrackerFrame) -> Self {
        let data = &frame.rppg_tracker_data;
        let face_box = match data.face.as_deref() {
            Some(&[x, y, width, height]) => Some(FaceBox {
                x,
                y,
                width,
                height,
            }),
            _ => None,
        };
        Self {
            face_tracking_status: FaceTrackingStatus::from_code(data.status),
            face_box,
            face_size_ok: data.image_quality_flags.face_size_flag,
            face_oriented_ok: data.image_quality_flags.face_orient_flag,
            blink_detected: data.eye_blink_status,
            instant_fps: frame.instant_fps,
            average_fps: frame.average_fps,
            timestamp_ms: frame.timestamp,
        }
    }
}

impl From<TrackerFrame> for FrameSample {
    fn from(frame: TrackerFrame) -> Self {
        Self::from(&frame)
    }
}

/// Frame-rate readings tracked over the session.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FpsStats {
    pub instant: f64,
    pub average: f64,
    pub max: f64,
    pub unsupported: bool,
}

impl FpsStats {
    pub fn record(&mut self, sample: &FrameSample) {
        self.instant = sample.instant_fps;
        self.average = sample.average_fps;
        if sample.instant_fps.is_finite() {
            self.max = self.max.max(sample.instant_fps);
        }
    }
}
