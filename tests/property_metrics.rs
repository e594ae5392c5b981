use proptest::prelude::*;

use face_scan_session::error::InitStep;
use face_scan_session::metrics::{MetricAggregator, MetricKind};
use face_scan_session::progress::{ProgressStateMachine, SessionState};
use face_scan_session::quality::QualityFlags;

fn kind() -> impl Strategy<Value = MetricKind> {
    prop::sample::select(MetricKind::ALL.to_vec())
}

#[derive(Debug, Clone)]
enum Input {
    Progress(f64),
    Quality(bool, bool, bool, u32),
    Signal(usize),
}

fn input() -> impl Strategy<Value = Input> {
    prop_oneof![
        (-10.0_f64..150.0).prop_map(Input::Progress),
        (any::<bool>(), any::<bool>(), any::<bool>(), 0_u32..3)
            .prop_map(|(p, n, o, b)| Input::Quality(p, n, o, b)),
        (0_usize..200).prop_map(Input::Signal),
    ]
}

proptest! {
    #[test]
    fn pt_complete_iff_every_kind_received(
        kinds in prop::collection::vec(kind(), 0..20),
        raw in 1.0_f64..200.0,
    ) {
        let mut metrics = MetricAggregator::new();
        for k in &kinds {
            prop_assert!(metrics.set(*k, raw, 0));
        }
        let all = MetricKind::ALL.iter().all(|k| kinds.contains(k));
        prop_assert_eq!(metrics.is_complete(), all);
        prop_assert_eq!(metrics.missing().is_empty(), all);
    }

    #[test]
    fn pt_repeated_value_is_idempotent(k in kind(), raw in 0.5_f64..500.0) {
        let mut metrics = MetricAggregator::new();
        metrics.set(k, raw, 10);
        let first = metrics.value(k);
        metrics.set(k, raw, 20);
        prop_assert_eq!(metrics.value(k), first);
        prop_assert_eq!(metrics.snapshot(k).last_updated_ms, 20);
    }

    #[test]
    fn pt_rounding_follows_metric_kind(k in kind(), raw in 0.5_f64..500.0) {
        let mut metrics = MetricAggregator::new();
        prop_assert!(metrics.set(k, raw, 0));
        let expected = if k.is_rounded() { raw.round() } else { raw };
        prop_assert_eq!(metrics.value(k), Some(expected));
    }

    #[test]
    fn pt_stress_sentinel_never_counts(repeats in 1_usize..10) {
        let mut metrics = MetricAggregator::new();
        for _ in 0..repeats {
            prop_assert!(!metrics.set(MetricKind::StressIndex, -1.0, 0));
        }
        prop_assert!(!metrics.has(MetricKind::StressIndex));
        prop_assert!(metrics.set(MetricKind::StressIndex, 0.0, 0));
        prop_assert!(metrics.has(MetricKind::StressIndex));
    }

    #[test]
    fn pt_machine_never_finalizes_without_metrics(
        inputs in prop::collection::vec(input(), 0..80),
    ) {
        let mut machine = ProgressStateMachine::new("en");
        machine.begin_init(InitStep::Camera);
        machine.begin_init(InitStep::Tracker);
        machine.begin_init(InitStep::Socket);
        machine.connected();

        for input in inputs {
            let effects = match input {
                Input::Progress(pct) => machine.update_progress(pct),
                Input::Quality(face_present, face_near, face_oriented, blinks) => machine
                    .update_quality(
                        QualityFlags {
                            face_present,
                            face_near,
                            face_oriented,
                        },
                        blinks,
                    ),
                Input::Signal(len) => machine.update_signal(len),
            };
            prop_assert!(!effects.submit);
            prop_assert!(!matches!(
                machine.state(),
                SessionState::Finalizing | SessionState::Submitted | SessionState::Error
            ));
            prop_assert_eq!(machine.is_blocked(), machine.guide_view().is_blocked);
        }
    }
}
