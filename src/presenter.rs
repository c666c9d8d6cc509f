use crate::config::Hooks;
use crate::hooks;

/// User-facing side of the watcher. Every call is fire-and-forget.
pub trait Presenter: Send + Sync {
    fn update_title(&self, text: &str);

    fn update_status_icon(&self, playing: bool, capturing: bool);

    fn update_track_number(&self, number: u32);

    fn write_log(&self, message: &str);

    fn notify_capture_stopped(&self);

    fn notify_watcher_ready(&self);
}

/// Renders watcher output to the log and runs optional user hooks
pub struct ConsolePresenter {
    hooks: Hooks,
}

impl ConsolePresenter {
    pub fn new(hooks: Hooks) -> Self {
        Self { hooks }
    }
}

impl Presenter for ConsolePresenter {
    fn update_title(&self, text: &str) {
        tracing::info!(target: "tapedeck::ui", "Now: {}", text);
        if let Some(command) = &self.hooks.track_changed {
            hooks::run_hook("track_changed", command, &[("TAPEDECK_TITLE", text.to_string())]);
        }
    }

    fn update_status_icon(&self, playing: bool, capturing: bool) {
        let status = match (playing, capturing) {
            (_, true) => "recording",
            (true, false) => "playing",
            (false, false) => "paused",
        };
        tracing::debug!(target: "tapedeck::ui", "Status: {}", status);
    }

    fn update_track_number(&self, number: u32) {
        tracing::info!(target: "tapedeck::ui", "Track number: {}", number);
    }

    fn write_log(&self, message: &str) {
        tracing::info!(target: "tapedeck::ui", "{}", message);
    }

    fn notify_capture_stopped(&self) {
        tracing::info!(target: "tapedeck::ui", "Recording stopped");
        if let Some(command) = &self.hooks.capture_stopped {
            hooks::run_hook("capture_stopped", command, &[]);
        }
    }

    fn notify_watcher_ready(&self) {
        tracing::debug!(target: "tapedeck::ui", "Watcher ready");
        if let Some(command) = &self.hooks.watcher_ready {
            hooks::run_hook("watcher_ready", command, &[]);
        }
    }
}
