//! Status-bar rendering of the reduced state.

use std::io::Write;

use protocol::{Phase, PomodoroState};
use tokio::sync::watch;

use super::Renderer;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PanelStyle {
    Work,
    Break,
    Paused,
    Login,
}

impl PanelStyle {
    pub fn css_class(&self) -> &'static str {
        match self {
            Self::Work => "pomodoro-work",
            Self::Break => "pomodoro-break",
            Self::Paused => "pomodoro-paused",
            Self::Login => "pomodoro-login",
        }
    }
}

/// What a status indicator shows for one state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PanelView {
    pub label: String,
    pub style: PanelStyle,
    /// Start/Pause are only offered once the page is usable.
    pub controls_enabled: bool,
}

impl PanelView {
    /// An unknown login status is shown as logged in; only an explicit `false` asks
    /// the user to log in.
    pub fn render(state: &PomodoroState) -> Self {
        if state.logged_in == Some(false) {
            return Self {
                label: "🍅 Login required".to_string(),
                style: PanelStyle::Login,
                controls_enabled: false,
            };
        }

        let task = match state.task.trim() {
            "" => "No task",
            t => t,
        };
        let glyph = if state.running { "⏱" } else { "⏸" };
        let style = match (state.running, state.phase) {
            (true, Phase::Work) => PanelStyle::Work,
            (true, Phase::Break) => PanelStyle::Break,
            _ => PanelStyle::Paused,
        };
        Self {
            label: format!("🍅 {} | {} | {}", task, state.timer, glyph),
            style,
            controls_enabled: true,
        }
    }
}

/// Writes one line per visible change and publishes whether controls are offered.
pub struct TerminalPanel<W> {
    out: W,
    last: Option<PanelView>,
    controls: watch::Sender<bool>,
}

impl<W: Write> TerminalPanel<W> {
    pub fn new(out: W) -> Self {
        Self {
            out,
            last: None,
            controls: watch::Sender::new(true),
        }
    }

    /// Tracks `controls_enabled` of the latest rendered view.
    pub fn controls(&self) -> watch::Receiver<bool> {
        self.controls.subscribe()
    }

    pub fn into_inner(self) -> W {
        self.out
    }
}

impl<W: Write + Send> Renderer for TerminalPanel<W> {
    fn on_state_changed(&mut self, state: &PomodoroState) {
        let view = PanelView::render(state);
        self.controls.send_replace(view.controls_enabled);
        if self.last.as_ref() == Some(&view) {
            return;
        }
        if let Err(e) = writeln!(self.out, "[{}] {}", view.style.css_class(), view.label) {
            tracing::warn!(error = %e, "panel write failed");
        }
        let _ = self.out.flush();
        self.last = Some(view);
    }
}
