//! Folds partial snapshots into the current state a consumer renders.

use serde::{Deserialize, Serialize};

use crate::models::{Phase, StateSnapshot, Timer};

/// Fully populated Pomodoro state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PomodoroState {
    pub timer: Timer,
    pub task: String,
    pub phase: Phase,
    pub running: bool,
    /// `None` until a producer reports it.
    pub logged_in: Option<bool>,
}

impl Default for PomodoroState {
    fn default() -> Self {
        Self {
            timer: Timer::Unknown,
            task: String::new(),
            phase: Phase::Paused,
            running: false,
            logged_in: None,
        }
    }
}

impl PomodoroState {
    /// Field-wise last-write-wins: present fields overwrite, absent ones are kept.
    /// Cross-field consistency (paused vs running) is the producer's business.
    pub fn merge(&mut self, snapshot: &StateSnapshot) {
        if let Some(timer) = snapshot.timer {
            self.timer = timer;
        }
        if let Some(task) = &snapshot.task {
            self.task.clone_from(task);
        }
        if let Some(phase) = snapshot.phase {
            self.phase = phase;
        }
        if let Some(running) = snapshot.running {
            self.running = running;
        }
        if let Some(logged_in) = snapshot.logged_in {
            self.logged_in = Some(logged_in);
        }
    }

    /// The whole state as one snapshot, for late joiners.
    pub fn to_snapshot(&self) -> StateSnapshot {
        StateSnapshot {
            timer: Some(self.timer),
            task: Some(self.task.clone()),
            phase: Some(self.phase),
            running: Some(self.running),
            logged_in: self.logged_in,
        }
    }
}

/// Current state plus the number of merges applied to it.
#[derive(Debug, Clone, Default)]
pub struct Reducer {
    state: PomodoroState,
    merges: u64,
}

impl Reducer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn apply(&mut self, snapshot: &StateSnapshot) -> &PomodoroState {
        self.state.merge(snapshot);
        self.merges += 1;
        &self.state
    }

    pub fn state(&self) -> &PomodoroState {
        &self.state
    }

    pub fn merges(&self) -> u64 {
        self.merges
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn timer(s: &str) -> StateSnapshot {
        StateSnapshot {
            timer: Some(s.parse().unwrap()),
            ..Default::default()
        }
    }

    #[test]
    fn initial_state() {
        let r = Reducer::new();
        assert_eq!(r.state().timer, Timer::Unknown);
        assert_eq!(r.state().task, "");
        assert_eq!(r.state().phase, Phase::Paused);
        assert!(!r.state().running);
        assert_eq!(r.state().logged_in, None);
        assert_eq!(r.merges(), 0);
    }

    #[test]
    fn last_write_wins_per_field() {
        let mut r = Reducer::new();
        r.apply(&StateSnapshot {
            timer: Some("10:00".parse().unwrap()),
            task: Some("Draft report".to_string()),
            phase: Some(Phase::Work),
            running: Some(true),
            logged_in: Some(true),
        });
        let state = r.apply(&timer("09:59"));
        assert_eq!(state.timer.to_string(), "09:59");
        assert_eq!(state.task, "Draft report");
        assert_eq!(state.phase, Phase::Work);
        assert!(state.running);
        assert_eq!(state.logged_in, Some(true));
    }

    #[test]
    fn disjoint_updates_commute() {
        let parts = [
            timer("12:34"),
            StateSnapshot {
                task: Some("Review".to_string()),
                ..Default::default()
            },
            StateSnapshot {
                phase: Some(Phase::Break),
                running: Some(true),
                ..Default::default()
            },
            StateSnapshot {
                logged_in: Some(false),
                ..Default::default()
            },
        ];
        let orders: [[usize; 4]; 4] = [[0, 1, 2, 3], [3, 2, 1, 0], [1, 3, 0, 2], [2, 0, 3, 1]];
        let mut results = orders.iter().map(|order| {
            let mut r = Reducer::new();
            for &i in order {
                r.apply(&parts[i]);
            }
            r.state().clone()
        });
        let first = results.next().unwrap();
        assert_eq!(first.timer.to_string(), "12:34");
        assert_eq!(first.task, "Review");
        assert_eq!(first.phase, Phase::Break);
        assert!(first.running);
        assert_eq!(first.logged_in, Some(false));
        for other in results {
            assert_eq!(other, first);
        }
    }

    #[test]
    fn empty_snapshot_changes_nothing_but_counts() {
        let mut r = Reducer::new();
        r.apply(&timer("01:00"));
        let before = r.state().clone();
        r.apply(&StateSnapshot::default());
        assert_eq!(r.state(), &before);
        assert_eq!(r.merges(), 2);
    }

    #[test]
    fn incoherent_fields_are_not_corrected() {
        let mut r = Reducer::new();
        let state = r.apply(&StateSnapshot {
            phase: Some(Phase::Paused),
            running: Some(true),
            ..Default::default()
        });
        assert_eq!(state.phase, Phase::Paused);
        assert!(state.running);
    }

    #[test]
    fn to_snapshot_round_trips_through_merge() {
        let mut source = PomodoroState::default();
        source.merge(&timer("03:21"));
        source.task = "Inbox".to_string();
        let mut copy = PomodoroState::default();
        copy.merge(&source.to_snapshot());
        assert_eq!(copy, source);
    }
}
