use std::fs;
use std::path::{Path, PathBuf};

use metadata::{TagReader, TrackDraft, KEY_ARTIST, KEY_TITLE};
use tempfile::TempDir;

use crate::queue::PathQueue;

/// Temporary directory removed on drop.
pub struct Scratch {
    dir: TempDir,
}

impl Scratch {
    pub fn new(label: &str) -> Self {
        let dir = tempfile::Builder::new()
            .prefix(&format!("library-{}-", label))
            .tempdir()
            .unwrap();
        Self { dir }
    }

    pub fn path(&self) -> &Path {
        self.dir.path()
    }

    pub fn write(&self, relative: &str, data: &[u8]) -> PathBuf {
        let target = self.dir.path().join(relative);
        if let Some(parent) = target.parent() {
            fs::create_dir_all(parent).unwrap();
        }
        fs::write(&target, data).unwrap();
        target
    }
}

pub enum Behavior {
    Title(&'static str),
    FailAfter(&'static str),
    Panic,
    Enqueue(PathQueue, String),
    Values(&'static [(&'static str, &'static str)]),
    /// Artist is the file name without its extension.
    ArtistFromStem,
}

/// Reader for `.mp3` files with scripted results.
pub struct StubReader {
    pub name: &'static str,
    pub behavior: Behavior,
}

impl StubReader {
    pub fn titled(name: &'static str, title: &'static str) -> Self {
        Self {
            name,
            behavior: Behavior::Title(title),
        }
    }
}

impl TagReader for StubReader {
    fn name(&self) -> &str {
        self.name
    }

    fn can_read_tag(&self, extension: &str) -> bool {
        extension == "mp3"
    }

    fn read_tag(&self, track: &mut TrackDraft) -> bool {
        match &self.behavior {
            Behavior::Title(title) => {
                track.replace_value(KEY_TITLE, *title);
                true
            }
            Behavior::FailAfter(title) => {
                track.replace_value(KEY_TITLE, *title);
                false
            }
            Behavior::Panic => panic!("reader exploded"),
            Behavior::Enqueue(queue, path) => {
                queue.add(path);
                true
            }
            Behavior::Values(values) => {
                for (key, value) in values.iter() {
                    track.replace_value(key, *value);
                }
                true
            }
            Behavior::ArtistFromStem => {
                let stem = track
                    .filename()
                    .rsplit_once('.')
                    .map(|(stem, _)| stem.to_string())
                    .unwrap_or_default();
                track.replace_value(KEY_ARTIST, stem);
                true
            }
        }
    }
}
