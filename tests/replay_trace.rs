mod common;

use std::io::Write;
use std::sync::Arc;

use common::{recording_sink, Recorder};
use face_scan_session::channel::{ConnectParams, UserProfile};
use face_scan_session::config::{ScanConfig, SocketConfig};
use face_scan_session::metrics::MetricStatus;
use face_scan_session::progress::SessionState;
use face_scan_session::replay::{load_trace, scripted, TraceError};
use face_scan_session::session::SessionController;

const TRACE: &str = r#"{"atMs": 0, "frame": {"rppgTrackerData": {"status": 0, "imageQualityFlags": {"faceSizeFlag": true, "faceOrientFlag": true}}, "instantFps": 30, "averageFps": 30}}
{"atMs": 200, "channel": {"type": "progress", "data": {"progressPercent": 20}}}
{"atMs": 400, "frame": {"rppgTrackerData": {"status": 0, "imageQualityFlags": {"faceSizeFlag": true, "faceOrientFlag": true}, "eyeBlinkStatus": true}, "instantFps": 30, "averageFps": 30}}
{"atMs": 500, "channel": {"type": "progress", "data": {"progressPercent": 60}}}
{"atMs": 600, "channel": {"type": "meanData", "data": {"bpm": 71.6, "oxygen": 97.2, "rr": 15.4, "stressStatus": "LOW"}}}
{"atMs": 700, "channel": {"type": "hrv", "data": {"ibi": 812.3, "rmssd": 41.8, "sdnn": 52.1}}}
{"atMs": 800, "channel": {"type": "bloodPressure", "data": {"systolic": 121.5, "diastolic": 79.25}}}
{"atMs": 900, "channel": {"type": "stress", "data": {"stress": 0.42}}}
{"atMs": 5000, "channel": {"type": "progress", "data": {"progressPercent": 90}}}
"#;

#[tokio::test(start_paused = true)]
async fn recorded_trace_runs_to_submission() {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    file.write_all(TRACE.as_bytes()).unwrap();

    let records = load_trace(file.path()).await.unwrap();
    assert_eq!(records.len(), 9);
    let (source, channel) = scripted(records);

    let recorder = Arc::new(Recorder::default());
    let params = ConnectParams::from_config(&SocketConfig::default(), UserProfile::default());
    let controller = SessionController::new(
        ScanConfig::default(),
        params,
        Box::new(source),
        Box::new(channel),
        recording_sink(&recorder),
    )
    .unwrap();

    let outcome = controller.run().await;
    assert_eq!(outcome.state, SessionState::Submitted);
    assert!(outcome.error.is_none());

    let submissions = recorder.submissions();
    assert_eq!(submissions.len(), 1);
    let result = &submissions[0];
    assert!(result.is_complete());
    assert!(!result.timed_out);
    assert_eq!(result.resting_heart_rate, Some(72.0));
    assert_eq!(result.oxygen, Some(97.0));
    assert_eq!(result.respiration_rate, Some(15.0));
    assert_eq!(result.ibi, Some(812.0));
    assert_eq!(result.systolic_bp, Some(121.5));
    assert_eq!(result.diastolic_bp, Some(79.25));
    assert_eq!(result.stress_index, Some(0.42));
    assert_eq!(result.stress_status, Some(MetricStatus::Low));
    assert_eq!(outcome.fps.average, 30.0);
}

#[tokio::test]
async fn missing_trace_file_is_an_io_error() {
    let dir = tempfile::tempdir().unwrap();
    let err = load_trace(dir.path().join("absent.jsonl")).await.unwrap_err();
    assert!(matches!(err, TraceError::Io(_)));
}
