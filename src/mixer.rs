use anyhow::{Context, Result};
use async_trait::async_trait;
use regex::Regex;
use serde::Deserialize;
use std::collections::HashMap;
use std::sync::{LazyLock, Mutex};
use std::time::Duration;
use tokio::process::Command;

/// System mixer operations the watcher needs
#[async_trait]
pub trait Mixer: Send + Sync {
    /// Raise the default output to full volume. With `mute_self` our own
    /// streams are muted so nothing we play ends up in the capture.
    /// `false` restores the level saved by the previous call.
    async fn set_own_output_high(&self, mute_self: bool);

    async fn set_player_output_muted(&self, muted: bool);

    /// Block until the player has had time to finish the current song
    async fn wait_for_current_song_to_end(&self);
}

static VOLUME_PERCENT: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(\d+)%").expect("valid regex"));

#[derive(Debug, Deserialize)]
struct SinkInput {
    index: u32,
    #[serde(default)]
    properties: HashMap<String, String>,
}

/// PulseAudio / PipeWire mixer driven through `pactl`
pub struct PactlMixer {
    player_app_name: String,
    song_end_wait: Duration,
    saved_volume: Mutex<Option<u32>>,
}

impl PactlMixer {
    pub fn new(player_app_name: &str, song_end_wait: Duration) -> Self {
        Self {
            player_app_name: player_app_name.to_lowercase(),
            song_end_wait,
            saved_volume: Mutex::new(None),
        }
    }

    async fn sink_inputs(&self) -> Result<Vec<SinkInput>> {
        let stdout = pactl(&["-f", "json", "list", "sink-inputs"]).await?;
        serde_json::from_str(&stdout).context("Failed to parse pactl sink-inputs")
    }

    async fn mute_inputs(&self, matches: impl Fn(&SinkInput) -> bool, muted: bool) -> Result<()> {
        let flag = if muted { "1" } else { "0" };
        for input in self.sink_inputs().await? {
            if !matches(&input) {
                continue;
            }
            let index = input.index.to_string();
            pactl(&["set-sink-input-mute", &index, flag]).await?;
        }
        Ok(())
    }

    fn is_player(&self, input: &SinkInput) -> bool {
        ["application.name", "application.process.binary"]
            .iter()
            .filter_map(|key| input.properties.get(*key))
            .any(|value| value.to_lowercase() == self.player_app_name)
    }

    async fn raise(&self, mute_self: bool) -> Result<()> {
        let current = pactl(&["get-sink-volume", "@DEFAULT_SINK@"]).await?;
        if let Some(volume) = parse_volume(&current) {
            if let Ok(mut saved) = self.saved_volume.lock() {
                saved.get_or_insert(volume);
            }
        }
        pactl(&["set-sink-volume", "@DEFAULT_SINK@", "100%"]).await?;

        if mute_self {
            self.mute_inputs(is_own_process, true).await?;
        }
        Ok(())
    }

    async fn restore(&self) -> Result<()> {
        let saved = self.saved_volume.lock().ok().and_then(|mut saved| saved.take());
        if let Some(volume) = saved {
            pactl(&["set-sink-volume", "@DEFAULT_SINK@", &format!("{}%", volume)]).await?;
        }
        self.mute_inputs(is_own_process, false).await
    }
}

#[async_trait]
impl Mixer for PactlMixer {
    async fn set_own_output_high(&self, mute_self: bool) {
        let result = if mute_self {
            self.raise(true).await
        } else {
            self.restore().await
        };
        if let Err(e) = result {
            tracing::warn!("Failed to adjust output volume: {:#}", e);
        }
    }

    async fn set_player_output_muted(&self, muted: bool) {
        if let Err(e) = self.mute_inputs(|input| self.is_player(input), muted).await {
            tracing::warn!("Failed to set player mute to {}: {:#}", muted, e);
        }
    }

    async fn wait_for_current_song_to_end(&self) {
        tracing::debug!("Waiting {:?} for the song to end", self.song_end_wait);
        tokio::time::sleep(self.song_end_wait).await;
    }
}

fn is_own_process(input: &SinkInput) -> bool {
    input
        .properties
        .get("application.process.id")
        .is_some_and(|pid| pid == &std::process::id().to_string())
}

fn parse_volume(output: &str) -> Option<u32> {
    VOLUME_PERCENT
        .captures(output)
        .and_then(|caps| caps[1].parse().ok())
}

async fn pactl(args: &[&str]) -> Result<String> {
    let output = Command::new("pactl")
        .args(args)
        .stdin(std::process::Stdio::null())
        .output()
        .await
        .context("Failed to execute pactl")?;

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        return Err(anyhow::anyhow!(
            "pactl {} exited with {}: {}",
            args.join(" "),
            output.status,
            stderr.trim()
        ));
    }

    Ok(String::from_utf8_lossy(&output.stdout).into_owned())
}
