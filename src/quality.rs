//! 人脸质量门控模块
//!
//! 将跟踪器逐帧给出的布尔标志（检测到人脸 / 距离合适 / 朝向正确）
//! 平滑为带滞回的布尔值，单帧异常不会改变界面状态。
//!
//! 平滑策略为 "粘滞为真"：窗口内只要存在一次 `true` 即保持断言，
//! 只有连续 `capacity` 帧均为 `false` 时才翻转为 `false`。这不是多数表决。
//!
//! 同时维护眨眼计数（活体信号），只在眨眼标志的上升沿计数，
//! 人脸丢失时清零。

use std::collections::VecDeque;

use serde::{Deserialize, Serialize};

use crate::frame::FrameSample;

/// 固定容量的布尔投票窗口（FIFO）
#[derive(Debug, Clone)]
pub struct QualityWindow {
    capacity: usize,
    votes: VecDeque<bool>,
}

impl QualityWindow {
    /// 新窗口以 `true` 填满，会话开始时各条件默认成立
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            capacity,
            votes: std::iter::repeat(true).take(capacity).collect(),
        }
    }

    /// 追加一帧投票并返回平滑后的结果
    pub fn push(&mut self, vote: bool) -> bool {
        self.votes.push_back(vote);
        while self.votes.len() > self.capacity {
            self.votes.pop_front();
        }
        self.is_asserted()
    }

    /// 窗口内是否仍有任一 `true`
    pub fn is_asserted(&self) -> bool {
        self.votes.iter().any(|v| *v)
    }

    pub fn len(&self) -> usize {
        self.votes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.votes.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

/// 眨眼计数器，仅在 false → true 时递增
#[derive(Debug, Clone, Default)]
pub struct BlinkCounter {
    count: u32,
    previous: bool,
}

impl BlinkCounter {
    /// 输入当前帧的眨眼标志，返回是否计入了一次眨眼
    pub fn observe(&mut self, blink_detected: bool) -> bool {
        let rising = blink_detected && !self.previous;
        self.previous = blink_detected;
        if rising {
            self.count = self.count.saturating_add(1);
        }
        rising
    }

    pub fn reset(&mut self) {
        self.count = 0;
    }

    pub fn count(&self) -> u32 {
        self.count
    }
}

/// 平滑后的质量标志
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QualityFlags {
    pub face_present: bool,
    pub face_near: bool,
    pub face_oriented: bool,
}

impl QualityFlags {
    pub fn all_ok(&self) -> bool {
        self.face_present && self.face_near && self.face_oriented
    }
}

impl Default for QualityFlags {
    fn default() -> Self {
        Self {
            face_present: true,
            face_near: true,
            face_oriented: true,
        }
    }
}

/// 人脸质量门控
#[derive(Debug, Clone)]
pub struct QualityGate {
    presence: QualityWindow,
    near: QualityWindow,
    oriented: QualityWindow,
    blinks: BlinkCounter,
    flags: QualityFlags,
}

impl QualityGate {
    pub fn new(window_size: usize) -> Self {
        Self {
            presence: QualityWindow::new(window_size),
            near: QualityWindow::new(window_size),
            oriented: QualityWindow::new(window_size),
            blinks: BlinkCounter::default(),
            flags: QualityFlags::default(),
        }
    }

    /// 处理一帧，按回调顺序调用
    pub fn update(&mut self, sample: &FrameSample) -> QualityFlags {
        self.blinks.observe(sample.blink_detected);

        let face_present = self.presence.push(sample.face_tracking_status.is_ok());
        let face_near = self.near.push(sample.face_size_ok);
        let face_oriented = self.oriented.push(sample.face_oriented_ok);

        if !face_present {
            if self.flags.face_present {
                tracing::debug!(blinks = self.blinks.count(), "Face lost, blink count reset");
            }
            self.blinks.reset();
        }

        self.flags = QualityFlags {
            face_present,
            face_near,
            face_oriented,
        };
        self.flags
    }

    pub fn flags(&self) -> QualityFlags {
        self.flags
    }

    pub fn blink_count(&self) -> u32 {
        self.blinks.count()
    }

    pub fn window_size(&self) -> usize {
        self.presence.capacity()
    }
}
