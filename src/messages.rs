use crate::song::PlayerTrack;
use tokio::sync::oneshot;

/// Notifications pushed by the player source
#[derive(Debug, Clone, PartialEq)]
pub enum PlayerEvent {
    PlayStateChanged {
        playing: bool,
        track: Option<PlayerTrack>,
    },
    TrackChanged(Option<PlayerTrack>),
    TrackTimeChanged(u64),
}

/// Point-in-time answer to a status query
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PlayerStatus {
    pub playing: bool,
    pub track: Option<PlayerTrack>,
    pub position_secs: u64,
}

/// Commands for the Watcher actor
pub enum WatcherCommand {
    /// Replies false if a watch session is already running
    Start(oneshot::Sender<bool>),
    Stop,
}

/// Watcher lifecycle (observable via watch channel)
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum WatcherPhase {
    Idle,
    Connecting,
    Watching,
    Draining,
}
