use crate::audio::DeviceSource;
use crate::config::Config;
use crate::mixer::PactlMixer;
use crate::player::MprisSource;
use crate::presenter::ConsolePresenter;
use crate::services::CaptureController;
use crate::watcher::{Watcher, WatcherHandle};

use anyhow::Result;
use std::sync::Arc;
use std::time::Duration;

pub struct App {
    watcher: WatcherHandle,
}

impl App {
    pub fn new(config: &Config) -> Self {
        let source = Arc::new(MprisSource::new(
            &config.player,
            &config.player_binary,
            Duration::from_millis(config.poll_interval_ms),
        ));
        let mixer = Arc::new(PactlMixer::new(
            &config.player_app_name,
            Duration::from_millis(config.song_end_wait_ms),
        ));
        let presenter = Arc::new(ConsolePresenter::new(config.hooks.clone()));
        let captures = Box::new(CaptureController::new(
            config.output_policy(),
            Arc::new(DeviceSource::new(config.capture_device.clone())),
        ));

        let (watcher, handle) = Watcher::new(
            config.watcher_settings(),
            source,
            mixer,
            presenter,
            captures,
        );
        tokio::spawn(watcher.run());

        tracing::info!(
            "Recording {} into {:?}",
            config.player,
            config.output_dir
        );

        Self { watcher: handle }
    }

    /// Watch until the player goes away or Ctrl+C is pressed
    pub async fn run(self) -> Result<()> {
        if !self.watcher.start().await? {
            tracing::warn!("Watcher was already running");
        }

        tokio::select! {
            result = self.watcher.wait_until_idle() => result?,
            _ = tokio::signal::ctrl_c() => {
                tracing::info!("Received Ctrl+C, shutting down");
                self.watcher.stop().await?;
                self.watcher.wait_until_idle().await?;
            }
        }

        Ok(())
    }
}
