use tokio::time::Instant;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimerKind {
    FpsCheck,
    FpsConfirm,
    SessionTimeout,
}

/// Pending deadlines of one session. A timer is cancelled by clearing it.
#[derive(Debug, Default)]
pub struct Timers {
    fps_check: Option<Instant>,
    fps_confirm: Option<Instant>,
    session_timeout: Option<Instant>,
}

impl Timers {
    fn slot(&mut self, kind: TimerKind) -> &mut Option<Instant> {
        match kind {
            TimerKind::FpsCheck => &mut self.fps_check,
            TimerKind::FpsConfirm => &mut self.fps_confirm,
            TimerKind::SessionTimeout => &mut self.session_timeout,
        }
    }

    pub fn arm(&mut self, kind: TimerKind, at: Instant) {
        *self.slot(kind) = Some(at);
    }

    pub fn cancel(&mut self, kind: TimerKind) {
        *self.slot(kind) = None;
    }

    pub fn cancel_all(&mut self) {
        self.fps_check = None;
        self.fps_confirm = None;
        self.session_timeout = None;
    }

    pub fn is_armed(&self, kind: TimerKind) -> bool {
        match kind {
            TimerKind::FpsCheck => self.fps_check.is_some(),
            TimerKind::FpsConfirm => self.fps_confirm.is_some(),
            TimerKind::SessionTimeout => self.session_timeout.is_some(),
        }
    }

    pub fn next_deadline(&self) -> Option<Instant> {
        [self.fps_check, self.fps_confirm, self.session_timeout]
            .into_iter()
            .flatten()
            .min()
    }

    /// Disarms and returns every timer due at `now`, earliest first.
    pub fn take_due(&mut self, now: Instant) -> Vec<TimerKind> {
        let mut due: Vec<(Instant, TimerKind)> = [
            (self.fps_check, TimerKind::FpsCheck),
            (self.fps_confirm, TimerKind::FpsConfirm),
            (self.session_timeout, TimerKind::SessionTimeout),
        ]
        .into_iter()
        .filter_map(|(at, kind)| at.filter(|at| *at <= now).map(|at| (at, kind)))
        .collect();
        due.sort_by_key(|(at, _)| *at);
        for (_, kind) in &due {
            self.cancel(*kind);
        }
        due.into_iter().map(|(_, kind)| kind).collect()
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;

    #[test]
    fn due_timers_fire_in_deadline_order() {
        let base = Instant::now();
        let mut timers = Timers::default();
        timers.arm(TimerKind::SessionTimeout, base + Duration::from_secs(90));
        timers.arm(TimerKind::FpsConfirm, base + Duration::from_secs(8));
        timers.arm(TimerKind::FpsCheck, base + Duration::from_secs(5));

        assert_eq!(timers.next_deadline(), Some(base + Duration::from_secs(5)));
        assert!(timers.take_due(base).is_empty());

        let due = timers.take_due(base + Duration::from_secs(10));
        assert_eq!(due, vec![TimerKind::FpsCheck, TimerKind::FpsConfirm]);
        assert!(!timers.is_armed(TimerKind::FpsCheck));
        assert!(timers.is_armed(TimerKind::SessionTimeout));
    }

    #[test]
    fn cancel_all_clears_deadline() {
        let mut timers = Timers::default();
        timers.arm(TimerKind::FpsCheck, Instant::now());
        timers.cancel_all();
        assert_eq!(timers.next_deadline(), None);
    }
}
