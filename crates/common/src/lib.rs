use serde::{Deserialize, Serialize};
use std::fs::Metadata;
use std::path::{Path, MAIN_SEPARATOR};
use std::time::UNIX_EPOCH;

/// Size and modification time of a file, as stored on track rows.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileStamp {
    pub size: i64,
    pub mtime: i64,
}

impl FileStamp {
    pub fn from_metadata(metadata: &Metadata) -> Self {
        Self {
            size: i64::try_from(metadata.len()).unwrap_or(i64::MAX),
            mtime: modified_secs(metadata),
        }
    }
}

pub fn modified_secs(metadata: &Metadata) -> i64 {
    metadata
        .modified()
        .ok()
        .and_then(|time| time.duration_since(UNIX_EPOCH).ok())
        .map(|value| i64::try_from(value.as_secs()).unwrap_or(i64::MAX))
        .unwrap_or(0)
}

/// Directory string with platform separators and exactly one trailing separator.
pub fn normalize_dir(path: &str) -> String {
    let trimmed = path.trim();
    if trimmed.is_empty() {
        return String::new();
    }
    let mut out = preferred_separators(trimmed);
    while out.len() > 1 && out.ends_with(MAIN_SEPARATOR) {
        out.pop();
    }
    if !out.ends_with(MAIN_SEPARATOR) {
        out.push(MAIN_SEPARATOR);
    }
    out
}

pub fn normalize_dir_path(path: &Path) -> String {
    normalize_dir(&path.to_string_lossy())
}

fn preferred_separators(path: &str) -> String {
    if MAIN_SEPARATOR == '/' {
        path.to_string()
    } else {
        path.replace('/', &MAIN_SEPARATOR.to_string())
    }
}

/// Lower-cased text after the last dot of a file name.
pub fn file_extension(filename: &str) -> Option<String> {
    let (stem, ext) = filename.rsplit_once('.')?;
    if stem.is_empty() || ext.is_empty() {
        return None;
    }
    Some(ext.to_ascii_lowercase())
}

pub fn leaf_name(path: &Path) -> String {
    path.file_name()
        .map(|name| name.to_string_lossy().to_string())
        .unwrap_or_default()
}

pub fn content_checksum(data: &[u8]) -> String {
    blake3::hash(data).to_hex().to_string()
}

/// Comparison key used for browse ordering of names.
pub fn sort_key(name: &str) -> String {
    name.trim().to_lowercase()
}
