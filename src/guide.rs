//! 引导提示与光环（halo）状态
//!
//! 界面层只关心一个数字状态码和一对文案（主提示 + 补充说明）。
//! 文案按语言查表，缺失条目回退到英文。

use std::collections::HashMap;

use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};

use crate::constants::DEFAULT_LANGUAGE;

/// HUD 光环状态，数值与前端动画状态机输入一致
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum HaloState {
    Guide,
    Calibrating,
    Analyzing,
    Error,
    Finalizing,
}

impl HaloState {
    pub fn code(self) -> u8 {
        match self {
            Self::Guide => 0,
            Self::Calibrating => 1,
            Self::Analyzing => 2,
            Self::Error => 3,
            Self::Finalizing => 4,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum GuideKey {
    FaceGuide,
    Calibration,
    BlinkCheck,
    SignalInterpretation,
    AnalyzingBiometrics,
    FinalizingResults,
    FaceNotDetected,
    FaceSize,
    FaceOrient,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GuideMessage {
    pub key: GuideKey,
    pub text: String,
    pub context: String,
}

type Catalog = HashMap<&'static str, HashMap<GuideKey, (&'static str, &'static str)>>;

static CATALOG: Lazy<Catalog> = Lazy::new(|| {
    let en = HashMap::from([
        (
            GuideKey::FaceGuide,
            ("Place your face in the outline...", "Make sure your face is well lit"),
        ),
        (
            GuideKey::Calibration,
            ("Calibrating System...", "Please keep still"),
        ),
        (GuideKey::BlinkCheck, ("Checking...", "Please blink")),
        (
            GuideKey::SignalInterpretation,
            ("Interpreting Vital Signs...", "This won't take long"),
        ),
        (
            GuideKey::AnalyzingBiometrics,
            ("Analyzing Biometrics...", "Thank you for your patience..."),
        ),
        (
            GuideKey::FinalizingResults,
            ("Finalizing Results...", "Thank you for your patience"),
        ),
        (
            GuideKey::FaceNotDetected,
            ("No Face Detected", "Please face the camera"),
        ),
        (
            GuideKey::FaceSize,
            ("Too Far Away", "Please move closer to camera"),
        ),
        (
            GuideKey::FaceOrient,
            ("Face not straight", "Please face camera directly"),
        ),
    ]);
    let es = HashMap::from([(
        GuideKey::Calibration,
        ("Calibrando el sistema...", "Por favor, mantente quieto"),
    )]);
    HashMap::from([("en", en), ("es", es)])
});

/// 取文案；`language` 只看前两位（"es-MX" → "es"）
pub fn message(key: GuideKey, language: &str) -> GuideMessage {
    let lang = language.get(..2).unwrap_or(language).to_ascii_lowercase();
    let entry = CATALOG
        .get(lang.as_str())
        .and_then(|table| table.get(&key))
        .or_else(|| {
            CATALOG
                .get(DEFAULT_LANGUAGE)
                .and_then(|table| table.get(&key))
        });
    let (text, context) = entry.copied().unwrap_or(("", ""));
    GuideMessage {
        key,
        text: text.to_string(),
        context: context.to_string(),
    }
}

pub fn supported_languages() -> Vec<&'static str> {
    let mut langs: Vec<&'static str> = CATALOG.keys().copied().collect();
    langs.sort_unstable();
    langs
}
