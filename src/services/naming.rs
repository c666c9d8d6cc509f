use regex::Regex;
use std::path::{Path, PathBuf};
use std::sync::LazyLock;

use crate::song::Song;

static INVALID_CHARS: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"[<>:"/\\|?*\x00-\x1f]"#).expect("valid regex"));

fn sanitize(part: &str) -> String {
    let cleaned = INVALID_CHARS.replace_all(part, "_");
    // Trailing dots and spaces are not portable in file names
    cleaned.trim().trim_end_matches('.').to_string()
}

/// Builds `<dir>/[<artist>/][NNN ]<artist><sep><title>.wav` for a song.
pub fn track_path(
    output_dir: &Path,
    song: &Song,
    track_number: Option<u32>,
    group_by_artist: bool,
    separator: &str,
) -> PathBuf {
    let artist = sanitize(&song.artist);
    let title = sanitize(&song.title);

    let mut dir = output_dir.to_path_buf();
    if group_by_artist && !artist.is_empty() {
        dir.push(&artist);
    }

    let mut stem = match track_number {
        Some(n) => format!("{:03} ", n),
        None => String::new(),
    };
    match (artist.is_empty(), title.is_empty()) {
        (false, false) => stem.push_str(&format!("{}{}{}", artist, separator, title)),
        (true, false) => stem.push_str(&title),
        (false, true) => stem.push_str(&artist),
        (true, true) => stem.push_str("Unknown"),
    }

    dir.join(format!("{}.wav", stem.trim()))
}

/// Appends ` (n)` to the file stem until the path does not exist yet.
pub fn unique_path(path: PathBuf) -> PathBuf {
    if !path.exists() {
        return path;
    }

    let stem = path
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();
    let parent = path.parent().map(Path::to_path_buf).unwrap_or_default();

    (2..)
        .map(|n| parent.join(format!("{} ({}).wav", stem, n)))
        .find(|candidate| !candidate.exists())
        .unwrap_or(path)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn song(artist: &str, title: &str) -> Song {
        Song {
            artist: artist.to_string(),
            title: title.to_string(),
            ..Default::default()
        }
    }

    #[test]
    fn test_plain_name() {
        let path = track_path(Path::new("/music"), &song("Muse", "Uprising"), None, false, " - ");
        assert_eq!(path, PathBuf::from("/music/Muse - Uprising.wav"));
    }

    #[test]
    fn test_numbered_and_grouped() {
        let path = track_path(Path::new("/music"), &song("Muse", "Uprising"), Some(4), true, "_");
        assert_eq!(path, PathBuf::from("/music/Muse/004 Muse_Uprising.wav"));
    }

    #[test]
    fn test_invalid_characters_replaced() {
        let path = track_path(
            Path::new("/music"),
            &song("AC/DC", "What? Me: Worry."),
            None,
            true,
            " - ",
        );
        assert_eq!(path, PathBuf::from("/music/AC_DC/AC_DC - What_ Me_ Worry.wav"));
    }

    #[test]
    fn test_unique_path_adds_suffix() {
        let dir = tempfile::tempdir().unwrap();
        let first = dir.path().join("Muse - Uprising.wav");
        assert_eq!(unique_path(first.clone()), first);

        std::fs::write(&first, b"").unwrap();
        std::fs::write(dir.path().join("Muse - Uprising (2).wav"), b"").unwrap();
        assert_eq!(
            unique_path(first),
            dir.path().join("Muse - Uprising (3).wav")
        );
    }
}
