use std::fmt;

/// Track as reported by the player, before classification.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PlayerTrack {
    pub id: String,
    pub title: String,
    pub artist: String,
    pub album: String,
    pub length_secs: u64,
    pub is_ad: bool,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Classification {
    Normal,
    Advertisement,
    #[default]
    None,
}

/// Snapshot of the track believed to be playing.
///
/// Two songs are equal when title and artist match; the elapsed position is
/// deliberately ignored so that time updates never look like a track change.
#[derive(Debug, Clone, Default)]
pub struct Song {
    pub title: String,
    pub artist: String,
    pub album: String,
    pub length_secs: u64,
    pub current_secs: u64,
    pub classification: Classification,
}

impl Song {
    pub fn is_normal(&self) -> bool {
        self.classification == Classification::Normal
    }

    pub fn is_ad(&self) -> bool {
        self.classification == Classification::Advertisement
    }

    pub fn is_empty(&self) -> bool {
        self.classification == Classification::None
    }

    /// True once playback is within `guard_secs` of the reported length.
    pub fn is_ending(&self, guard_secs: u64) -> bool {
        self.current_secs + guard_secs > self.length_secs
    }
}

impl From<&PlayerTrack> for Song {
    fn from(track: &PlayerTrack) -> Self {
        let classification = if track.is_ad {
            Classification::Advertisement
        } else {
            Classification::Normal
        };

        Self {
            title: track.title.clone(),
            artist: track.artist.clone(),
            album: track.album.clone(),
            length_secs: track.length_secs,
            current_secs: 0,
            classification,
        }
    }
}

impl PartialEq for Song {
    fn eq(&self, other: &Self) -> bool {
        self.title == other.title && self.artist == other.artist
    }
}

impl fmt::Display for Song {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (self.artist.is_empty(), self.title.is_empty()) {
            (true, true) => Ok(()),
            (true, false) => write!(f, "{}", self.title),
            (false, true) => write!(f, "{}", self.artist),
            (false, false) => write!(f, "{} - {}", self.artist, self.title),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn track(title: &str, artist: &str) -> PlayerTrack {
        PlayerTrack {
            id: format!("spotify:track:{title}"),
            title: title.to_string(),
            artist: artist.to_string(),
            length_secs: 200,
            ..Default::default()
        }
    }

    #[test]
    fn test_equality_ignores_elapsed() {
        let mut first = Song::from(&track("Hurt", "Johnny Cash"));
        let mut second = Song::from(&track("Hurt", "Johnny Cash"));
        first.current_secs = 3;
        second.current_secs = 140;

        assert_eq!(first, second);
        assert_ne!(first, Song::from(&track("Hurt", "Nine Inch Nails")));
    }

    #[test]
    fn test_classification() {
        assert!(Song::default().is_empty());
        assert!(Song::from(&track("Hurt", "Johnny Cash")).is_normal());

        let ad = PlayerTrack {
            is_ad: true,
            ..track("Advertisement", "")
        };
        assert!(Song::from(&ad).is_ad());
    }

    #[test]
    fn test_is_ending() {
        let mut song = Song::from(&track("Hurt", "Johnny Cash"));
        song.current_secs = 195;
        assert!(!song.is_ending(5));
        song.current_secs = 196;
        assert!(song.is_ending(5));
    }

    #[test]
    fn test_display() {
        assert_eq!(
            Song::from(&track("Hurt", "Johnny Cash")).to_string(),
            "Johnny Cash - Hurt"
        );
        assert_eq!(Song::from(&track("Hurt", "")).to_string(), "Hurt");
        assert_eq!(Song::default().to_string(), "");
    }
}
