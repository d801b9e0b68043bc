//! Simulated Pomodoro page: a countdown that alternates work and break.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

use protocol::{Command, Phase, StateSnapshot, Timer};

use super::Observer;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Stage {
    Work,
    Break,
}

struct Inner {
    task: String,
    logged_in: bool,
    stage: Stage,
    remaining: Duration,
    /// Set while counting down; elapsed time is folded into `remaining` on every read.
    running_since: Option<Instant>,
    work: Duration,
    rest: Duration,
}

impl Inner {
    fn length(&self, stage: Stage) -> Duration {
        match stage {
            Stage::Work => self.work,
            Stage::Break => self.rest,
        }
    }

    fn settle(&mut self, now: Instant) {
        let Some(since) = self.running_since else {
            return;
        };
        let mut elapsed = now.saturating_duration_since(since);
        while elapsed >= self.remaining {
            elapsed -= self.remaining;
            self.stage = match self.stage {
                Stage::Work => Stage::Break,
                Stage::Break => Stage::Work,
            };
            self.remaining = self.length(self.stage);
        }
        self.remaining -= elapsed;
        self.running_since = Some(now);
    }
}

/// Cheap to clone; clones share the same countdown.
#[derive(Clone)]
pub struct SimulatedTimer {
    inner: Arc<Mutex<Inner>>,
}

/// Longest phase a two-digit `MM:SS` countdown can show from its start.
pub const MAX_PHASE_MINUTES: u64 = 99;

impl SimulatedTimer {
    /// Phase lengths are clamped to between one second and [`MAX_PHASE_MINUTES`].
    pub fn new(task: impl Into<String>, work: Duration, rest: Duration) -> Self {
        let bounds = (Duration::from_secs(1), Duration::from_secs(MAX_PHASE_MINUTES * 60));
        let work = work.clamp(bounds.0, bounds.1);
        let rest = rest.clamp(bounds.0, bounds.1);
        Self {
            inner: Arc::new(Mutex::new(Inner {
                task: task.into(),
                logged_in: true,
                stage: Stage::Work,
                remaining: work,
                running_since: None,
                work,
                rest,
            })),
        }
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn set_task(&self, task: impl Into<String>) {
        self.lock().task = task.into();
    }

    pub fn set_logged_in(&self, logged_in: bool) {
        self.lock().logged_in = logged_in;
    }

    pub fn observe_at(&self, now: Instant) -> StateSnapshot {
        let mut inner = self.lock();
        inner.settle(now);
        let running = inner.running_since.is_some();
        let phase = match (running, inner.stage) {
            (false, _) => Phase::Paused,
            (true, Stage::Work) => Phase::Work,
            (true, Stage::Break) => Phase::Break,
        };
        // Round up so a fresh 25 minute session shows 25:00, not 24:59.
        let secs = inner.remaining.as_secs() + u64::from(inner.remaining.subsec_nanos() > 0);
        StateSnapshot {
            timer: Some(Timer::from_secs(secs)),
            task: Some(inner.task.clone()),
            phase: Some(phase),
            running: Some(running),
            logged_in: Some(inner.logged_in),
        }
    }

    pub fn apply_command_at(&self, cmd: Command, now: Instant) {
        let mut inner = self.lock();
        inner.settle(now);
        match cmd {
            Command::Start => {
                if inner.running_since.is_none() {
                    inner.running_since = Some(now);
                }
            }
            Command::Pause => {
                inner.running_since = None;
            }
        }
    }
}

impl Observer for SimulatedTimer {
    fn observe(&mut self) -> StateSnapshot {
        self.observe_at(Instant::now())
    }

    fn apply_command(&mut self, cmd: Command) {
        self.apply_command_at(cmd, Instant::now());
    }
}
