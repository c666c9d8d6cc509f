pub mod mpris;

use crate::messages::{PlayerEvent, PlayerStatus};
use anyhow::Result;
use async_trait::async_trait;
use tokio::sync::mpsc;

pub use mpris::MprisSource;

/// The external player whose playback is being followed
#[async_trait]
pub trait PlayerSource: Send + Sync {
    async fn is_installed(&self) -> bool;

    async fn is_running(&self) -> bool;

    /// Attach to the player and start delivering events on `events`.
    /// Delivery stops once the receiver is dropped.
    async fn connect(&self, events: mpsc::Sender<PlayerEvent>) -> Result<()>;

    async fn status(&self) -> Result<PlayerStatus>;
}
