//! Vital-sign metric aggregation.
//!
//! Metric events arrive sparsely from the remote channel with no ordering
//! across kinds. Each kind keeps only its latest valid value.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::constants::STRESS_NO_DATA_SENTINEL;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum MetricKind {
    HeartRate,
    Spo2,
    RespirationRate,
    HrvSdnn,
    HrvRmssd,
    HrvIbi,
    StressIndex,
    BloodPressureSystolic,
    BloodPressureDiastolic,
}

impl MetricKind {
    pub const ALL: [MetricKind; 9] = [
        MetricKind::HeartRate,
        MetricKind::Spo2,
        MetricKind::RespirationRate,
        MetricKind::HrvSdnn,
        MetricKind::HrvRmssd,
        MetricKind::HrvIbi,
        MetricKind::StressIndex,
        MetricKind::BloodPressureSystolic,
        MetricKind::BloodPressureDiastolic,
    ];

    fn index(self) -> usize {
        match self {
            Self::HeartRate => 0,
            Self::Spo2 => 1,
            Self::RespirationRate => 2,
            Self::HrvSdnn => 3,
            Self::HrvRmssd => 4,
            Self::HrvIbi => 5,
            Self::StressIndex => 6,
            Self::BloodPressureSystolic => 7,
            Self::BloodPressureDiastolic => 8,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::HeartRate => "heartRateBpm",
            Self::Spo2 => "spo2Pct",
            Self::RespirationRate => "respirationRate",
            Self::HrvSdnn => "hrvSdnnMs",
            Self::HrvRmssd => "hrvRmssdMs",
            Self::HrvIbi => "hrvIbi",
            Self::StressIndex => "stressIndex",
            Self::BloodPressureSystolic => "bloodPressureSystolic",
            Self::BloodPressureDiastolic => "bloodPressureDiastolic",
        }
    }

    /// Field name used by the downstream submission form.
    pub fn form_field(self) -> &'static str {
        match self {
            Self::HeartRate => "bpm_ent_restingHeartRate",
            Self::Spo2 => "int_raw_oxygen",
            Self::RespirationRate => "int_raw_rr",
            Self::HrvSdnn => "flt_raw_sdnn",
            Self::HrvRmssd => "flt_raw_rmssd",
            Self::HrvIbi => "flt_raw_ibi",
            Self::StressIndex => "flt_raw_stressIndex",
            Self::BloodPressureSystolic => "mmHg_ent_systolicBP",
            Self::BloodPressureDiastolic => "mmHg_ent_diastolicBP",
        }
    }

    /// Blood pressure and stress keep full precision.
    pub fn is_rounded(self) -> bool {
        !matches!(
            self,
            Self::StressIndex | Self::BloodPressureSystolic | Self::BloodPressureDiastolic
        )
    }

    pub fn is_valid(self, raw: f64) -> bool {
        if !raw.is_finite() {
            return false;
        }
        match self {
            Self::StressIndex => raw != STRESS_NO_DATA_SENTINEL,
            _ => raw > 0.0,
        }
    }
}

/// Categorical status reported inside `meanData`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum MetricStatus {
    NoData,
    Low,
    Normal,
    Elevated,
    VeryHigh,
    #[serde(other)]
    Unknown,
}

impl MetricStatus {
    /// 0–1 display level; `None` when the status carries no reading.
    pub fn level(self) -> Option<f64> {
        match self {
            Self::Low => Some(0.25),
            Self::Normal => Some(0.5),
            Self::Elevated => Some(0.7),
            Self::VeryHigh => Some(0.9),
            Self::NoData | Self::Unknown => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MetricSnapshot {
    pub value: Option<f64>,
    pub received_at_least_once: bool,
    pub last_updated_ms: i64,
}

impl Default for MetricSnapshot {
    fn default() -> Self {
        Self {
            value: None,
            received_at_least_once: false,
            last_updated_ms: 0,
        }
    }
}

/// One inbound metric payload. Fields the channel omitted are `None`.
#[derive(Debug, Clone, PartialEq)]
pub enum MetricEvent {
    MeanData {
        bpm: Option<f64>,
        oxygen: Option<f64>,
        rr: Option<f64>,
        blood_pressure_status: Option<MetricStatus>,
        stress_status: Option<MetricStatus>,
    },
    Hrv {
        ibi: Option<f64>,
        rmssd: Option<f64>,
        sdnn: Option<f64>,
    },
    BloodPressure {
        systolic: Option<f64>,
        diastolic: Option<f64>,
    },
    Stress {
        stress: f64,
    },
    Reading {
        kind: MetricKind,
        value: f64,
    },
}

impl MetricEvent {
    /// Flattens the payload into per-kind raw readings.
    pub fn readings(&self) -> Vec<(MetricKind, f64)> {
        let pairs: Vec<(MetricKind, Option<f64>)> = match *self {
            Self::MeanData { bpm, oxygen, rr, .. } => vec![
                (MetricKind::HeartRate, bpm),
                (MetricKind::Spo2, oxygen),
                (MetricKind::RespirationRate, rr),
            ],
            Self::Hrv { ibi, rmssd, sdnn } => vec![
                (MetricKind::HrvIbi, ibi),
                (MetricKind::HrvRmssd, rmssd),
                (MetricKind::HrvSdnn, sdnn),
            ],
            Self::BloodPressure {
                systolic,
                diastolic,
            } => vec![
                (MetricKind::BloodPressureSystolic, systolic),
                (MetricKind::BloodPressureDiastolic, diastolic),
            ],
            Self::Stress { stress } => vec![(MetricKind::StressIndex, Some(stress))],
            Self::Reading { kind, value } => vec![(kind, Some(value))],
        };
        pairs
            .into_iter()
            .filter_map(|(kind, raw)| raw.map(|v| (kind, v)))
            .collect()
    }
}

#[derive(Debug, Clone, Default)]
pub struct MetricAggregator {
    snapshots: [MetricSnapshot; 9],
    stress_status: Option<MetricStatus>,
    blood_pressure_status: Option<MetricStatus>,
}

impl MetricAggregator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Applies one event and returns the kinds whose snapshot changed.
    pub fn apply_event(&mut self, event: &MetricEvent, now_ms: i64) -> Vec<MetricKind> {
        if let MetricEvent::MeanData {
            blood_pressure_status,
            stress_status,
            ..
        } = event
        {
            if let Some(status) = stress_status.filter(|s| *s != MetricStatus::NoData) {
                self.stress_status = Some(status);
            }
            if let Some(status) = blood_pressure_status.filter(|s| *s != MetricStatus::NoData) {
                self.blood_pressure_status = Some(status);
            }
        }

        event
            .readings()
            .into_iter()
            .filter(|(kind, raw)| self.set(*kind, *raw, now_ms))
            .map(|(kind, _)| kind)
            .collect()
    }

    /// Stores `raw` if it is valid for `kind`. Returns whether it was stored.
    pub fn set(&mut self, kind: MetricKind, raw: f64, now_ms: i64) -> bool {
        if !kind.is_valid(raw) {
            tracing::trace!(metric = kind.as_str(), raw, "Ignoring invalid metric value");
            return false;
        }
        let value = if kind.is_rounded() { raw.round() } else { raw };
        let snapshot = &mut self.snapshots[kind.index()];
        snapshot.value = Some(value);
        snapshot.received_at_least_once = true;
        snapshot.last_updated_ms = now_ms;
        true
    }

    pub fn snapshot(&self, kind: MetricKind) -> &MetricSnapshot {
        &self.snapshots[kind.index()]
    }

    pub fn value(&self, kind: MetricKind) -> Option<f64> {
        self.snapshot(kind).value
    }

    pub fn has(&self, kind: MetricKind) -> bool {
        self.snapshot(kind).received_at_least_once
    }

    pub fn is_complete(&self) -> bool {
        self.snapshots.iter().all(|s| s.received_at_least_once)
    }

    pub fn missing(&self) -> Vec<MetricKind> {
        MetricKind::ALL
            .into_iter()
            .filter(|kind| !self.has(*kind))
            .collect()
    }

    pub fn stress_status(&self) -> Option<MetricStatus> {
        self.stress_status
    }

    pub fn blood_pressure_status(&self) -> Option<MetricStatus> {
        self.blood_pressure_status
    }

    pub fn to_result(&self, session_id: Uuid, timed_out: bool) -> ScanResult {
        let hrv_complete = self.has(MetricKind::HrvSdnn)
            && self.has(MetricKind::HrvRmssd)
            && self.has(MetricKind::HrvIbi);
        let bp_complete = self.has(MetricKind::BloodPressureSystolic)
            && self.has(MetricKind::BloodPressureDiastolic);

        ScanResult {
            session_id,
            completed_at: Utc::now(),
            timed_out,
            resting_heart_rate: self.value(MetricKind::HeartRate),
            respiration_rate: self.value(MetricKind::RespirationRate),
            oxygen: self.value(MetricKind::Spo2),
            ibi: self.value(MetricKind::HrvIbi),
            sdnn: self.value(MetricKind::HrvSdnn),
            rmssd: self.value(MetricKind::HrvRmssd),
            stress_index: self.value(MetricKind::StressIndex),
            systolic_bp: self.value(MetricKind::BloodPressureSystolic),
            diastolic_bp: self.value(MetricKind::BloodPressureDiastolic),
            bpm_complete: self.has(MetricKind::HeartRate),
            rr_complete: self.has(MetricKind::RespirationRate),
            spo2_complete: self.has(MetricKind::Spo2),
            hrv_complete,
            si_complete: self.has(MetricKind::StressIndex),
            bp_complete,
            stress_status: self.stress_status,
        }
    }
}

/// Final record handed to the result sink.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScanResult {
    #[serde(rename = "sessionId")]
    pub session_id: Uuid,
    #[serde(rename = "completedAt")]
    pub completed_at: DateTime<Utc>,
    #[serde(rename = "timedOut")]
    pub timed_out: bool,
    #[serde(rename = "bpm_ent_restingHeartRate")]
    pub resting_heart_rate: Option<f64>,
    #[serde(rename = "int_raw_rr")]
    pub respiration_rate: Option<f64>,
    #[serde(rename = "int_raw_oxygen")]
    pub oxygen: Option<f64>,
    #[serde(rename = "flt_raw_ibi")]
    pub ibi: Option<f64>,
    #[serde(rename = "flt_raw_sdnn")]
    pub sdnn: Option<f64>,
    #[serde(rename = "flt_raw_rmssd")]
    pub rmssd: Option<f64>,
    #[serde(rename = "flt_raw_stressIndex")]
    pub stress_index: Option<f64>,
    #[serde(rename = "mmHg_ent_systolicBP")]
    pub systolic_bp: Option<f64>,
    #[serde(rename = "mmHg_ent_diastolicBP")]
    pub diastolic_bp: Option<f64>,
    #[serde(rename = "bpm_isComplete")]
    pub bpm_complete: bool,
    #[serde(rename = "rr_isComplete")]
    pub rr_complete: bool,
    #[serde(rename = "spo2_isComplete")]
    pub spo2_complete: bool,
    #[serde(rename = "hrv_isComplete")]
    pub hrv_complete: bool,
    #[serde(rename = "si_isComplete")]
    pub si_complete: bool,
    #[serde(rename = "bp_isComplete")]
    pub bp_complete: bool,
    #[serde(rename = "stressStatus", default)]
    pub stress_status: Option<MetricStatus>,
}

impl ScanResult {
    pub fn value(&self, kind: MetricKind) -> Option<f64> {
        match kind {
            MetricKind::HeartRate => self.resting_heart_rate,
            MetricKind::Spo2 => self.oxygen,
            MetricKind::RespirationRate => self.respiration_rate,
            MetricKind::HrvSdnn => self.sdnn,
            MetricKind::HrvRmssd => self.rmssd,
            MetricKind::HrvIbi => self.ibi,
            MetricKind::StressIndex => self.stress_index,
            MetricKind::BloodPressureSystolic => self.systolic_bp,
            MetricKind::BloodPressureDiastolic => self.diastolic_bp,
        }
    }

    pub fn is_complete(&self) -> bool {
        self.bpm_complete
            && self.rr_complete
            && self.spo2_complete
            && self.hrv_complete
            && self.si_complete
            && self.bp_complete
    }

    /// `(name, value)` pairs for form submission. Values are JSON literals,
    /// a missing metric is `null`.
    pub fn form_fields(&self) -> Vec<(&'static str, String)> {
        let mut fields: Vec<(&'static str, String)> = MetricKind::ALL
            .into_iter()
            .map(|kind| (kind.form_field(), json_number(self.value(kind))))
            .collect();
        fields.extend([
            ("bpm_isComplete", self.bpm_complete.to_string()),
            ("rr_isComplete", self.rr_complete.to_string()),
            ("spo2_isComplete", self.spo2_complete.to_string()),
            ("hrv_isComplete", self.hrv_complete.to_string()),
            ("si_isComplete", self.si_complete.to_string()),
            ("bp_isComplete", self.bp_complete.to_string()),
        ]);
        fields
    }
}

fn json_number(value: Option<f64>) -> String {
    match value {
        Some(v) if v.is_finite() => v.to_string(),
        _ => "null".to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn full_aggregator() -> MetricAggregator {
        let mut agg = MetricAggregator::new();
        agg.apply_event(
            &MetricEvent::MeanData {
                bpm: Some(71.6),
                oxygen: Some(97.5),
                rr: Some(16.2),
                blood_pressure_status: Some(MetricStatus::Normal),
                stress_status: Some(MetricStatus::Low),
            },
            10,
        );
        agg.apply_event(
            &MetricEvent::Hrv {
                ibi: Some(800.4),
                rmssd: Some(30.2),
                sdnn: Some(44.8),
            },
            20,
        );
        agg.apply_event(
            &MetricEvent::BloodPressure {
                systolic: Some(118.4),
                diastolic: Some(76.2),
            },
            30,
        );
        agg.apply_event(&MetricEvent::Stress { stress: 0.3 }, 40);
        agg
    }

    #[test]
    fn rounds_vitals_but_not_pressure_or_stress() {
        let agg = full_aggregator();
        assert!(agg.is_complete());
        assert_eq!(agg.value(MetricKind::HeartRate), Some(72.0));
        assert_eq!(agg.value(MetricKind::Spo2), Some(98.0));
        assert_eq!(agg.value(MetricKind::RespirationRate), Some(16.0));
        assert_eq!(agg.value(MetricKind::HrvSdnn), Some(45.0));
        assert_eq!(agg.value(MetricKind::HrvRmssd), Some(30.0));
        assert_eq!(agg.value(MetricKind::HrvIbi), Some(800.0));
        assert_eq!(agg.value(MetricKind::BloodPressureSystolic), Some(118.4));
        assert_eq!(agg.value(MetricKind::BloodPressureDiastolic), Some(76.2));
        assert_eq!(agg.value(MetricKind::StressIndex), Some(0.3));
        assert_eq!(agg.snapshot(MetricKind::StressIndex).last_updated_ms, 40);
    }

    #[test]
    fn stress_sentinel_is_not_a_reading() {
        let mut agg = MetricAggregator::new();
        let changed = agg.apply_event(&MetricEvent::Stress { stress: -1.0 }, 5);
        assert!(changed.is_empty());
        assert!(!agg.has(MetricKind::StressIndex));

        // 0 is a real stress reading
        agg.apply_event(&MetricEvent::Stress { stress: 0.0 }, 6);
        assert!(agg.has(MetricKind::StressIndex));
        assert_eq!(agg.value(MetricKind::StressIndex), Some(0.0));
    }

    #[test]
    fn non_positive_vitals_are_ignored() {
        let mut agg = MetricAggregator::new();
        let changed = agg.apply_event(
            &MetricEvent::MeanData {
                bpm: Some(0.0),
                oxygen: Some(-3.0),
                rr: Some(f64::NAN),
                blood_pressure_status: None,
                stress_status: None,
            },
            1,
        );
        assert!(changed.is_empty());
        assert_eq!(agg.missing().len(), 9);
    }

    #[test]
    fn latest_valid_value_wins() {
        let mut agg = MetricAggregator::new();
        agg.set(MetricKind::HeartRate, 70.0, 1);
        agg.set(MetricKind::HeartRate, 0.0, 2);
        assert_eq!(agg.value(MetricKind::HeartRate), Some(70.0));
        agg.set(MetricKind::HeartRate, 64.4, 3);
        assert_eq!(agg.value(MetricKind::HeartRate), Some(64.0));
        assert_eq!(agg.snapshot(MetricKind::HeartRate).last_updated_ms, 3);
    }

    #[test]
    fn no_data_status_does_not_replace_known_status() {
        let mut agg = full_aggregator();
        agg.apply_event(
            &MetricEvent::MeanData {
                bpm: None,
                oxygen: None,
                rr: None,
                blood_pressure_status: Some(MetricStatus::NoData),
                stress_status: Some(MetricStatus::NoData),
            },
            50,
        );
        assert_eq!(agg.stress_status(), Some(MetricStatus::Low));
        assert_eq!(agg.stress_status().and_then(MetricStatus::level), Some(0.25));
        assert_eq!(agg.blood_pressure_status(), Some(MetricStatus::Normal));
    }

    #[test]
    fn unknown_status_strings_decode() {
        let status: MetricStatus = serde_json::from_str("\"SOMETHING_NEW\"").unwrap();
        assert_eq!(status, MetricStatus::Unknown);
        let status: MetricStatus = serde_json::from_str("\"VERY_HIGH\"").unwrap();
        assert_eq!(status.level(), Some(0.9));
    }

    #[test]
    fn result_carries_form_names_and_completion() {
        let mut agg = full_aggregator();
        let result = agg.to_result(Uuid::new_v4(), false);
        assert!(result.is_complete());

        let json = serde_json::to_value(&result).unwrap();
        assert_eq!(json["bpm_ent_restingHeartRate"], 72.0);
        assert_eq!(json["mmHg_ent_systolicBP"], 118.4);
        assert_eq!(json["hrv_isComplete"], true);
        assert_eq!(json["timedOut"], false);

        agg = MetricAggregator::new();
        agg.set(MetricKind::BloodPressureSystolic, 120.0, 1);
        agg.set(MetricKind::HrvSdnn, 40.0, 1);
        let partial = agg.to_result(Uuid::new_v4(), true);
        assert!(!partial.bp_complete);
        assert!(!partial.hrv_complete);
        assert!(!partial.is_complete());
    }

    #[test]
    fn form_fields_encode_missing_as_null() {
        let mut agg = MetricAggregator::new();
        agg.set(MetricKind::HeartRate, 72.0, 1);
        agg.set(MetricKind::StressIndex, 0.3, 1);
        let fields = agg.to_result(Uuid::new_v4(), true).form_fields();

        let get = |name: &str| {
            fields
                .iter()
                .find(|(n, _)| *n == name)
                .map(|(_, v)| v.clone())
                .unwrap()
        };
        assert_eq!(get("bpm_ent_restingHeartRate"), "72");
        assert_eq!(get("flt_raw_stressIndex"), "0.3");
        assert_eq!(get("int_raw_oxygen"), "null");
        assert_eq!(get("bpm_isComplete"), "true");
        assert_eq!(get("bp_isComplete"), "false");
        assert_eq!(fields.len(), 15);
    }
}
