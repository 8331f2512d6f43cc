use std::path::{Path, PathBuf};

use common::{file_extension, leaf_name, FileStamp};

pub const KEY_TITLE: &str = "title";
pub const KEY_ARTIST: &str = "artist";
pub const KEY_ALBUM: &str = "album";
pub const KEY_GENRE: &str = "genre";
pub const KEY_TRACK: &str = "track";
pub const KEY_DURATION: &str = "duration";
pub const KEY_YEAR: &str = "year";

/// Keys stored in dedicated columns or tables rather than the free-form meta bag.
pub const RESERVED_KEYS: &[&str] = &[
    KEY_TITLE,
    KEY_ARTIST,
    KEY_ALBUM,
    KEY_GENRE,
    KEY_TRACK,
    KEY_DURATION,
    KEY_YEAR,
];

/// In-memory track handed to tag readers before it is persisted.
///
/// Values form an ordered multimap: `artist` and `genre` may appear more than
/// once, everything else is normally set a single time.
#[derive(Debug, Clone)]
pub struct TrackDraft {
    path: PathBuf,
    filename: String,
    extension: String,
    stamp: FileStamp,
    values: Vec<(String, String)>,
    thumbnail: Option<Vec<u8>>,
}

impl TrackDraft {
    pub fn new(path: PathBuf, stamp: FileStamp) -> Self {
        let filename = leaf_name(&path);
        let extension = file_extension(&filename).unwrap_or_default();
        Self {
            path,
            filename,
            extension,
            stamp,
            values: Vec::new(),
            thumbnail: None,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn filename(&self) -> &str {
        &self.filename
    }

    /// Lower-cased extension, empty when the file has none.
    pub fn extension(&self) -> &str {
        &self.extension
    }

    pub fn stamp(&self) -> FileStamp {
        self.stamp
    }

    pub fn set_value(&mut self, key: &str, value: impl Into<String>) {
        let value = value.into();
        if key.is_empty() || value.trim().is_empty() {
            return;
        }
        self.values.push((key.to_string(), value));
    }

    pub fn replace_value(&mut self, key: &str, value: impl Into<String>) {
        self.clear_value(key);
        self.set_value(key, value);
    }

    pub fn clear_value(&mut self, key: &str) {
        self.values.retain(|(k, _)| k != key);
    }

    pub fn value(&self, key: &str) -> Option<&str> {
        self.values
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    pub fn values<'a>(&'a self, key: &'a str) -> impl Iterator<Item = &'a str> + 'a {
        self.values
            .iter()
            .filter(move |(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    pub fn entries(&self) -> &[(String, String)] {
        &self.values
    }

    /// Entries that belong in the meta bag, i.e. not stored in dedicated columns.
    pub fn extra_entries(&self) -> impl Iterator<Item = (&str, &str)> {
        self.values
            .iter()
            .filter(|(k, _)| !RESERVED_KEYS.contains(&k.as_str()))
            .map(|(k, v)| (k.as_str(), v.as_str()))
    }

    pub fn set_thumbnail(&mut self, data: Vec<u8>) {
        if data.is_empty() {
            return;
        }
        self.thumbnail = Some(data);
    }

    pub fn thumbnail(&self) -> Option<&[u8]> {
        self.thumbnail.as_deref()
    }
}

#[cfg(test)]
mod tests {
    use super::{TrackDraft, KEY_ARTIST, KEY_TITLE};
    use common::FileStamp;
    use std::path::PathBuf;

    fn draft() -> TrackDraft {
        TrackDraft::new(PathBuf::from("/music/Song.FLAC"), FileStamp { size: 10, mtime: 20 })
    }

    #[test]
    fn derives_filename_and_extension() {
        let track = draft();
        assert_eq!(track.filename(), "Song.FLAC");
        assert_eq!(track.extension(), "flac");
        assert_eq!(track.stamp().size, 10);
    }

    #[test]
    fn keeps_repeated_values_in_order() {
        let mut track = draft();
        track.set_value(KEY_ARTIST, "A");
        track.set_value(KEY_ARTIST, "B");
        track.set_value(KEY_ARTIST, "  ");
        let artists: Vec<&str> = track.values(KEY_ARTIST).collect();
        assert_eq!(artists, vec!["A", "B"]);
        assert_eq!(track.value(KEY_ARTIST), Some("A"));
    }

    #[test]
    fn replace_value_drops_previous_entries() {
        let mut track = draft();
        track.set_value(KEY_TITLE, "first");
        track.replace_value(KEY_TITLE, "second");
        assert_eq!(track.values(KEY_TITLE).count(), 1);
        assert_eq!(track.value(KEY_TITLE), Some("second"));
    }

    #[test]
    fn extra_entries_skip_reserved_keys() {
        let mut track = draft();
        track.set_value(KEY_TITLE, "t");
        track.set_value("composer", "c");
        let extras: Vec<(&str, &str)> = track.extra_entries().collect();
        assert_eq!(extras, vec![("composer", "c")]);
    }
}
