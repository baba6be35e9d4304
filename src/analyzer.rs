//! Metadata analysis boundary.
//!
//! Downloaded files are the authoritative source of descriptive metadata; the
//! `TagReader` trait is the seam to whatever extracts it. The default
//! implementation reads ID3 tags and measures duration from the MPEG frames.

use anyhow::Result;
use id3::TagLike;
use std::fs::File;
use std::io::Read;
use std::path::Path;

/// Metadata extracted from a local audio file.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TrackTags {
    pub title: String,
    pub artist: String,
    pub genre: String,
    pub duration_seconds: i64,
    pub description: String,
    pub tags: Vec<String>,
}

impl TrackTags {
    /// The analyzer found nothing usable: no title and no artist.
    pub fn is_empty(&self) -> bool {
        self.title.is_empty() && self.artist.is_empty()
    }
}

/// Extracts metadata from a local file.
pub trait TagReader: Send + Sync {
    fn read_tags(&self, path: &Path) -> Result<TrackTags>;
}

/// Default analyzer: ID3 tags plus frame-level duration measurement.
#[derive(Debug, Default)]
pub struct Id3TagReader;

impl TagReader for Id3TagReader {
    fn read_tags(&self, path: &Path) -> Result<TrackTags> {
        let tag = id3::Tag::read_from_path(path).unwrap_or_else(|_| id3::Tag::new());

        let duration_seconds = mp3_duration::from_path(path)
            .map(|d| d.as_secs() as i64)
            .unwrap_or(0);

        let description = tag
            .comments()
            .next()
            .map(|c| c.text.clone())
            .unwrap_or_default();

        Ok(TrackTags {
            title: tag.title().unwrap_or_default().to_string(),
            artist: tag.artist().unwrap_or_default().to_string(),
            genre: tag.genre().unwrap_or_default().to_string(),
            duration_seconds,
            description,
            tags: Vec::new(),
        })
    }
}

/// Check that a file starts with a recognizable MP3 container header: an
/// ID3v2 tag or an MPEG frame sync word. Used to reject truncated or
/// garbage downloads before they reach the player.
pub fn has_valid_header(path: &Path) -> bool {
    let mut file = match File::open(path) {
        Ok(f) => f,
        Err(_) => return false,
    };

    let mut header = [0u8; 10];
    if file.read_exact(&mut header).is_err() {
        return false;
    }

    if header[0] == 0xFF && (header[1] & 0xE0) == 0xE0 {
        return true;
    }

    &header[..3] == b"ID3"
}
