//! Follows the player and decides when a track gets recorded.
//!
//! Player notifications and the fixed-cadence tick are both consumed by one
//! actor loop, so the watcher state is only ever touched from one place.

use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use tokio::sync::{mpsc, oneshot, watch};
use tokio::time::MissedTickBehavior;

use crate::messages::{PlayerEvent, WatcherCommand, WatcherPhase};
use crate::mixer::Mixer;
use crate::player::PlayerSource;
use crate::presenter::Presenter;
use crate::sequencer::TrackSequencer;
use crate::services::CaptureSessions;
use crate::song::{PlayerTrack, Song};


pub const IDLE_TITLE: &str = "Idle";
pub const PAUSED_TITLE: &str = "Paused";

const EVENT_QUEUE: usize = 64;

#[derive(Debug, Clone)]
pub struct WatcherSettings {
    pub tick_interval: Duration,
    /// Seconds before a song's end in which a track change waits for the
    /// old song to finish
    pub song_end_guard_secs: u64,
    pub min_duration_secs: u64,
    /// First track number, `None` disables numbering
    pub start_track_number: Option<u32>,
}

#[derive(Debug, Default)]
struct WatcherState {
    running: bool,
    ready: bool,
    is_playing: bool,
    current_song: Song,
    /// `current_song` as of the previous tick
    last_observed_song: Song,
    /// Seconds recorded by the most recent capture
    count_secs: u64,
}

pub struct Watcher {
    settings: WatcherSettings,
    state: WatcherState,
    sequencer: TrackSequencer,
    source: Arc<dyn PlayerSource>,
    mixer: Arc<dyn Mixer>,
    presenter: Arc<dyn Presenter>,
    captures: Box<dyn CaptureSessions>,
    cmd_rx: mpsc::Receiver<WatcherCommand>,
    phase: watch::Sender<WatcherPhase>,
}

impl Watcher {
    pub fn new(
        settings: WatcherSettings,
        source: Arc<dyn PlayerSource>,
        mixer: Arc<dyn Mixer>,
        presenter: Arc<dyn Presenter>,
        captures: Box<dyn CaptureSessions>,
    ) -> (Self, WatcherHandle) {
        let (cmd_tx, cmd_rx) = mpsc::channel(10);
        let (phase_tx, phase_rx) = watch::channel(WatcherPhase::Idle);
        let sequencer = TrackSequencer::new(settings.start_track_number, settings.min_duration_secs);

        let watcher = Self {
            settings,
            state: WatcherState {
                ready: true,
                ..Default::default()
            },
            sequencer,
            source,
            mixer,
            presenter,
            captures,
            cmd_rx,
            phase: phase_tx,
        };
        let handle = WatcherHandle {
            tx: cmd_tx,
            phase: phase_rx,
        };

        (watcher, handle)
    }

    pub async fn run(mut self) {
        while let Some(cmd) = self.cmd_rx.recv().await {
            match cmd {
                WatcherCommand::Start(reply) => {
                    let accepted = self.begin_session();
                    let _ = reply.send(accepted);
                    if accepted {
                        self.run_session().await;
                    }
                }
                WatcherCommand::Stop => tracing::debug!("Watcher not running, ignoring stop"),
            }
        }
        tracing::debug!("Watcher handle dropped, exiting");
    }

    fn set_phase(&self, phase: WatcherPhase) {
        tracing::debug!("Watcher phase: {:?}", phase);
        self.phase.send_replace(phase);
    }

    fn begin_session(&mut self) -> bool {
        if self.state.running || !self.state.ready {
            return false;
        }
        self.state.running = true;
        self.state.ready = false;
        self.set_phase(WatcherPhase::Connecting);
        true
    }

    async fn run_session(&mut self) {
        let (event_tx, mut event_rx) = mpsc::channel(EVENT_QUEUE);
        self.state.current_song = Song::default();
        self.state.last_observed_song = Song::default();

        let installed = self.source.is_installed().await;
        if installed && !self.source.is_running().await {
            self.presenter.write_log("Connecting to player");
        }

        let connected = match self.source.connect(event_tx).await {
            Ok(()) => true,
            Err(e) => {
                tracing::warn!("Failed to connect to player: {:#}", e);
                false
            }
        };

        if connected && self.source.is_running().await {
            self.initialize().await;
            self.set_phase(WatcherPhase::Watching);
            self.watch(&mut event_rx).await;
            self.finish_watching();
        } else if installed {
            self.presenter.write_log("Player is not connected");
        } else {
            self.presenter.write_log("Player not found");
        }

        self.set_phase(WatcherPhase::Draining);
        // Lets the source's delivery task notice the session is over
        drop(event_rx);
        self.teardown().await;
        self.reject_queued_commands();
        self.set_phase(WatcherPhase::Idle);
    }

    /// Answers commands that arrived while connecting or draining. They were
    /// issued against a running session, so starts are refused.
    fn reject_queued_commands(&mut self) {
        while let Ok(cmd) = self.cmd_rx.try_recv() {
            match cmd {
                WatcherCommand::Start(reply) => {
                    tracing::debug!("Start arrived during a session, rejecting");
                    let _ = reply.send(false);
                }
                WatcherCommand::Stop => tracing::debug!("Session already over, ignoring stop"),
            }
        }
    }

    async fn initialize(&mut self) {
        self.presenter.write_log("Starting");
        tracing::debug!("Last track number: {:?}", self.sequencer.current());
        self.mixer.set_own_output_high(true).await;

        let status = match self.source.status().await {
            Ok(status) => status,
            Err(e) => {
                tracing::warn!("Failed to read player status: {:#}", e);
                return;
            }
        };

        self.state.is_playing = status.playing;
        self.presenter.update_status_icon(self.state.is_playing, false);

        let Some(track) = status.track else {
            return;
        };
        self.state.current_song = Song {
            current_secs: status.position_secs,
            ..Song::from(&track)
        };

        self.presenter.update_title(&self.state.current_song.to_string());
        self.mixer
            .set_player_output_muted(self.state.current_song.is_ad())
            .await;
    }

    async fn watch(&mut self, events: &mut mpsc::Receiver<PlayerEvent>) {
        let mut ticker = tokio::time::interval(self.settings.tick_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        while self.state.running {
            tokio::select! {
                biased;

                Some(cmd) = self.cmd_rx.recv() => {
                    self.handle_command(cmd);
                }

                Some(event) = events.recv() => {
                    self.handle_event(event).await;
                }

                _ = ticker.tick() => {
                    self.tick().await;
                }
            }
        }
    }

    fn handle_command(&mut self, cmd: WatcherCommand) {
        match cmd {
            WatcherCommand::Start(reply) => {
                tracing::debug!("Watcher already running, rejecting start");
                let _ = reply.send(false);
            }
            WatcherCommand::Stop => {
                tracing::info!("Stop requested");
                self.state.running = false;
            }
        }
    }

    async fn tick(&mut self) {
        if !self.source.is_running().await {
            self.presenter.write_log("Player closed");
            self.state.running = false;
        } else if self.state.current_song != self.state.last_observed_song {
            tracing::debug!(
                "Song moved from {:?} to {:?}",
                self.state.last_observed_song.to_string(),
                self.state.current_song.to_string()
            );
            self.stop_capture();
            self.start_capture();
        }

        self.state.last_observed_song = self.state.current_song.clone();
    }

    fn finish_watching(&mut self) {
        self.stop_capture();
        self.presenter.write_log("Stopping");
    }

    fn start_capture(&mut self) {
        if self.captures.is_live() || !self.state.is_playing || !self.state.current_song.is_normal()
        {
            return;
        }

        let number = self.sequencer.peek_next();
        if let Err(e) = self.captures.start(&self.state.current_song, number) {
            tracing::error!("Failed to start capture: {:#}", e);
            return;
        }

        self.state.count_secs = 0;
        if let Some(n) = self.sequencer.increment() {
            self.presenter.update_track_number(n);
        }
        self.presenter.update_status_icon(self.state.is_playing, true);
    }

    /// Stops the current capture, if any, and gives its track number back when
    /// it fell short of the minimum. A worker that already died on its own
    /// still counts as a session to end here.
    fn stop_capture(&mut self) {
        let elapsed = self.captures.elapsed_secs();
        if !self.captures.stop(elapsed) {
            return;
        }
        self.state.count_secs = elapsed;
        self.presenter.update_status_icon(self.state.is_playing, false);

        if let Some(n) = self.sequencer.decrement(elapsed) {
            self.presenter.update_track_number(n);
        }
    }

    async fn handle_event(&mut self, event: PlayerEvent) {
        match event {
            PlayerEvent::PlayStateChanged { playing, track } => {
                self.on_play_state_changed(playing, track.as_ref()).await
            }
            PlayerEvent::TrackChanged(track) => self.on_track_changed(track.as_ref()).await,
            PlayerEvent::TrackTimeChanged(secs) => {
                if !self.state.current_song.is_empty() {
                    self.state.current_song.current_secs = secs;
                }
            }
        }
    }

    async fn on_play_state_changed(
        &mut self,
        playing: bool,
        track: Option<&PlayerTrack>,
    ) {
        if playing == self.state.is_playing {
            return;
        }
        self.state.is_playing = playing;

        if let Some(track) = track {
            self.state.current_song = Song::from(track);
            self.state.last_observed_song = Song::default();
        }

        if playing {
            self.mixer
                .set_player_output_muted(self.state.current_song.is_ad())
                .await;
            self.presenter.update_title(&self.state.current_song.to_string());
        } else {
            self.presenter.update_title(PAUSED_TITLE);
        }

        self.presenter.update_status_icon(playing, false);
    }

    async fn on_track_changed(&mut self, track: Option<&PlayerTrack>) {
        // The change notification tends to arrive before the old song's last
        // seconds have played out
        if self.captures.is_live()
            && self
                .state
                .current_song
                .is_ending(self.settings.song_end_guard_secs)
        {
            self.mixer.wait_for_current_song_to_end().await;
        }

        let Some(track) = track else {
            return;
        };

        let song = Song::from(track);
        if song == self.state.current_song {
            self.presenter
                .update_status_icon(self.state.is_playing, self.captures.is_live());
            return;
        }

        self.state.current_song = song;
        self.state.last_observed_song = Song::default();

        self.presenter.update_title(&self.state.current_song.to_string());
        if self.state.current_song.is_ad() {
            self.presenter.write_log("Advertisement playing");
        }

        self.mixer
            .set_player_output_muted(self.state.current_song.is_ad())
            .await;
    }

    async fn teardown(&mut self) {
        self.state.running = false;
        self.presenter.update_title(IDLE_TITLE);
        self.state.ready = true;
        self.presenter.notify_watcher_ready();
        self.presenter.update_status_icon(false, false);

        self.mixer.set_player_output_muted(false).await;
        self.mixer.set_own_output_high(false).await;

        self.captures.drain().await;
        self.presenter.notify_capture_stopped();
    }
}

/// Handle for communicating with the Watcher
#[derive(Clone)]
pub struct WatcherHandle {
    tx: mpsc::Sender<WatcherCommand>,
    phase: watch::Receiver<WatcherPhase>,
}

impl WatcherHandle {
    /// Ask the watcher to start. Returns false if it was already running.
    pub async fn start(&self) -> Result<bool> {
        let (reply, rx) = oneshot::channel();
        self.tx
            .send(WatcherCommand::Start(reply))
            .await
            .map_err(|e| anyhow::anyhow!("Failed to send start command: {}", e))?;

        rx.await
            .map_err(|e| anyhow::anyhow!("Failed to receive start response: {}", e))
    }

    pub async fn stop(&self) -> Result<()> {
        self.tx
            .send(WatcherCommand::Stop)
            .await
            .map_err(|e| anyhow::anyhow!("Failed to send stop command: {}", e))
    }

    /// Resolves once the watcher is back to `Idle`
    pub async fn wait_until_idle(&self) -> Result<()> {
        let mut phase = self.phase.clone();
        phase
            .wait_for(|phase| *phase == WatcherPhase::Idle)
            .await
            .map_err(|e| anyhow::anyhow!("Watcher went away: {}", e))?;
        Ok(())
    }
}
