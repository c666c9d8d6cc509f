use std::collections::HashMap;
use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use tokio::sync::{OnceCell, mpsc};
use zbus::fdo::DBusProxy;
use zbus::names::BusName;
use zbus::proxy::CacheProperties;
use zbus::{Connection, proxy};
use zvariant::{OwnedValue, Value};

use super::PlayerSource;
use crate::messages::{PlayerEvent, PlayerStatus};
use crate::song::PlayerTrack;

#[proxy(
    interface = "org.mpris.MediaPlayer2.Player",
    default_path = "/org/mpris/MediaPlayer2"
)]
trait MediaPlayer {
    #[zbus(property)]
    fn playback_status(&self) -> zbus::Result<String>;

    #[zbus(property)]
    fn metadata(&self) -> zbus::Result<HashMap<String, OwnedValue>>;

    #[zbus(property)]
    fn position(&self) -> zbus::Result<i64>;
}

/// Follows an MPRIS player (e.g. `org.mpris.MediaPlayer2.spotify`) on the
/// session bus by polling its Player interface and diffing snapshots.
pub struct MprisSource {
    bus_name: String,
    binary: String,
    poll_interval: Duration,
    connection: OnceCell<Connection>,
    dbus: OnceCell<DBusProxy<'static>>,
}

impl MprisSource {
    pub fn new(player: &str, binary: &str, poll_interval: Duration) -> Self {
        Self {
            bus_name: format!("org.mpris.MediaPlayer2.{}", player),
            binary: binary.to_string(),
            poll_interval,
            connection: OnceCell::new(),
            dbus: OnceCell::new(),
        }
    }

    async fn connection(&self) -> Result<&Connection> {
        self.connection
            .get_or_try_init(|| async {
                Connection::session()
                    .await
                    .context("Failed to connect to session bus")
            })
            .await
    }

    /// Bus daemon proxy, built once and reused by every owner check
    async fn dbus(&self) -> Result<&DBusProxy<'static>> {
        self.dbus
            .get_or_try_init(|| async {
                let connection = self.connection().await?;
                DBusProxy::new(connection)
                    .await
                    .context("Failed to create bus daemon proxy")
            })
            .await
    }

    async fn player(&self) -> Result<MediaPlayerProxy<'static>> {
        let connection = self.connection().await?;
        MediaPlayerProxy::builder(connection)
            .destination(self.bus_name.clone())?
            .cache_properties(CacheProperties::No)
            .build()
            .await
            .with_context(|| format!("Failed to create proxy for {}", self.bus_name))
    }

    async fn is_activatable(&self) -> Result<bool> {
        let names = self.dbus().await?.list_activatable_names().await?;
        Ok(names.iter().any(|name| name.as_str() == self.bus_name))
    }
}

#[async_trait]
impl PlayerSource for MprisSource {
    async fn is_installed(&self) -> bool {
        if on_path(&self.binary) {
            return true;
        }
        self.is_activatable().await.unwrap_or(false)
    }

    async fn is_running(&self) -> bool {
        let check = async {
            let dbus = self.dbus().await?;
            let name = BusName::try_from(self.bus_name.as_str())?;
            Ok::<bool, anyhow::Error>(dbus.name_has_owner(name).await?)
        };

        match check.await {
            Ok(running) => running,
            Err(e) => {
                tracing::debug!("Owner check for {} failed: {:#}", self.bus_name, e);
                false
            }
        }
    }

    async fn connect(&self, events: mpsc::Sender<PlayerEvent>) -> Result<()> {
        if !self.is_running().await {
            return Err(anyhow::anyhow!("{} has no owner", self.bus_name));
        }

        let player = self.player().await?;
        let initial = read_status(&player)
            .await
            .context("Failed to read player status")?;

        tracing::info!("Connected to {}", self.bus_name);
        tokio::spawn(poll_player(player, events, self.poll_interval, initial));
        Ok(())
    }

    async fn status(&self) -> Result<PlayerStatus> {
        let player = self.player().await?;
        read_status(&player).await
    }
}

async fn poll_player(
    player: MediaPlayerProxy<'static>,
    events: mpsc::Sender<PlayerEvent>,
    interval: Duration,
    mut last: PlayerStatus,
) {
    let mut ticker = tokio::time::interval(interval);
    loop {
        tokio::select! {
            _ = events.closed() => break,
            _ = ticker.tick() => {}
        }

        let status = match read_status(&player).await {
            Ok(status) => status,
            Err(e) => {
                // The watcher notices a vanished player on its own
                tracing::debug!("Player poll failed: {:#}", e);
                continue;
            }
        };

        for event in diff_status(&last, &status) {
            if events.send(event).await.is_err() {
                return;
            }
        }
        last = status;
    }
    tracing::debug!("Player poll stopped");
}

async fn read_status(player: &MediaPlayerProxy<'_>) -> Result<PlayerStatus> {
    let playback = player.playback_status().await?;
    let metadata = player.metadata().await?;
    // Not every player implements Position
    let position = player.position().await.unwrap_or(0);

    Ok(PlayerStatus {
        playing: playback == "Playing",
        track: track_from_metadata(&metadata),
        position_secs: micros_to_secs(position),
    })
}

/// Events that turn `last` into `now`
fn diff_status(last: &PlayerStatus, now: &PlayerStatus) -> Vec<PlayerEvent> {
    let mut events = Vec::new();

    if !same_track(last.track.as_ref(), now.track.as_ref()) {
        events.push(PlayerEvent::TrackChanged(now.track.clone()));
    }
    if last.playing != now.playing {
        events.push(PlayerEvent::PlayStateChanged {
            playing: now.playing,
            track: now.track.clone(),
        });
    }
    if last.position_secs != now.position_secs {
        events.push(PlayerEvent::TrackTimeChanged(now.position_secs));
    }

    events
}

fn same_track(a: Option<&PlayerTrack>, b: Option<&PlayerTrack>) -> bool {
    match (a, b) {
        (None, None) => true,
        (Some(a), Some(b)) => a.id == b.id && a.title == b.title && a.artist == b.artist,
        _ => false,
    }
}

fn track_from_metadata(metadata: &HashMap<String, OwnedValue>) -> Option<PlayerTrack> {
    let text = |key: &str| metadata.get(key).and_then(|v| as_string(v)).unwrap_or_default();

    let id = text("mpris:trackid");
    let title = text("xesam:title");
    let album = text("xesam:album");
    let artist = metadata
        .get("xesam:artist")
        .map(|v| as_strings(v).join(", "))
        .unwrap_or_default();

    if id.is_empty() && title.is_empty() && artist.is_empty() {
        return None;
    }

    let length_secs = metadata
        .get("mpris:length")
        .and_then(|v| as_i64(v))
        .map(micros_to_secs)
        .unwrap_or(0);

    Some(PlayerTrack {
        is_ad: is_ad_id(&id),
        id,
        title,
        artist,
        album,
        length_secs,
    })
}

fn is_ad_id(id: &str) -> bool {
    id.contains(":ad:") || id.contains("/ad/")
}

fn micros_to_secs(micros: i64) -> u64 {
    u64::try_from(micros / 1_000_000).unwrap_or(0)
}

fn as_string(value: &Value<'_>) -> Option<String> {
    match value {
        Value::Str(s) => Some(s.to_string()),
        Value::ObjectPath(p) => Some(p.to_string()),
        Value::Value(inner) => as_string(inner),
        _ => None,
    }
}

fn as_strings(value: &Value<'_>) -> Vec<String> {
    match value {
        Value::Array(items) => items.iter().filter_map(as_string).collect(),
        Value::Value(inner) => as_strings(inner),
        other => as_string(other).into_iter().collect(),
    }
}

fn as_i64(value: &Value<'_>) -> Option<i64> {
    match value {
        Value::I64(n) => Some(*n),
        Value::U64(n) => i64::try_from(*n).ok(),
        Value::I32(n) => Some(i64::from(*n)),
        Value::U32(n) => Some(i64::from(*n)),
        Value::F64(n) => Some(*n as i64),
        Value::Value(inner) => as_i64(inner),
        _ => None,
    }
}

fn on_path(binary: &str) -> bool {
    std::env::var_os("PATH").is_some_and(|paths| {
        std::env::split_paths(&paths).any(|dir| dir.join(binary).is_file())
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use zvariant::{Array, ObjectPath};

    fn owned(value: Value<'_>) -> OwnedValue {
        OwnedValue::try_from(value).unwrap()
    }

    fn metadata(id: &str, title: &str, artists: &[&str]) -> HashMap<String, OwnedValue> {
        let mut map = HashMap::new();
        map.insert(
            "mpris:trackid".to_string(),
            owned(Value::from(ObjectPath::try_from(id).unwrap())),
        );
        map.insert("xesam:title".to_string(), owned(Value::from(title)));
        map.insert(
            "xesam:artist".to_string(),
            owned(Value::from(Array::from(artists.to_vec()))),
        );
        map.insert("mpris:length".to_string(), owned(Value::from(215_000_000u64)));
        map
    }

    fn track(id: &str, title: &str) -> PlayerTrack {
        PlayerTrack {
            id: id.to_string(),
            title: title.to_string(),
            artist: "Daft Punk".to_string(),
            length_secs: 215,
            ..Default::default()
        }
    }

    #[test]
    fn test_track_from_metadata() {
        let meta = metadata(
            "/com/spotify/track/abc",
            "Around the World",
            &["Daft Punk", "Romanthony"],
        );

        let track = track_from_metadata(&meta).unwrap();
        assert_eq!(track.title, "Around the World");
        assert_eq!(track.artist, "Daft Punk, Romanthony");
        assert_eq!(track.length_secs, 215);
        assert!(!track.is_ad);
    }

    #[test]
    fn test_ad_detection() {
        let meta = metadata("/com/spotify/ad/123", "Advertisement", &[]);
        assert!(track_from_metadata(&meta).unwrap().is_ad);
        assert!(is_ad_id("spotify:ad:0001"));
        assert!(!is_ad_id("spotify:track:ad"));
    }

    #[test]
    fn test_empty_metadata_is_no_track() {
        assert_eq!(track_from_metadata(&HashMap::new()), None);
    }

    #[test]
    fn test_diff_status() {
        let idle = PlayerStatus::default();
        let playing = PlayerStatus {
            playing: true,
            track: Some(track("/t/1", "One More Time")),
            position_secs: 0,
        };

        assert_eq!(
            diff_status(&idle, &playing),
            vec![
                PlayerEvent::TrackChanged(playing.track.clone()),
                PlayerEvent::PlayStateChanged {
                    playing: true,
                    track: playing.track.clone(),
                },
            ]
        );

        let later = PlayerStatus {
            position_secs: 12,
            ..playing.clone()
        };
        assert_eq!(
            diff_status(&playing, &later),
            vec![PlayerEvent::TrackTimeChanged(12)]
        );
        assert!(diff_status(&later, &later).is_empty());
    }

    #[tokio::test]
    async fn test_bus_proxy_is_built_once() {
        let source = MprisSource::new(
            "tapedeck-test-player",
            "tapedeck-test-player",
            Duration::from_millis(10),
        );
        assert!(!source.is_running().await);
        assert!(!source.is_running().await);

        // Without a session bus there is nothing to reuse
        let Ok(first) = source.dbus().await else {
            assert!(!source.dbus.initialized());
            return;
        };
        let second = source.dbus().await.unwrap();
        assert!(std::ptr::eq(first, second));
    }
}
