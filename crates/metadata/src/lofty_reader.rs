use lofty::error::LoftyError;
use lofty::picture::{Picture, PictureType};
use lofty::prelude::{AudioFile, ItemKey, TaggedFileExt};
use tracing::debug;

use crate::draft::{
    TrackDraft, KEY_ALBUM, KEY_ARTIST, KEY_DURATION, KEY_GENRE, KEY_TITLE, KEY_TRACK, KEY_YEAR,
};
use crate::registry::TagReader;

const EXTENSIONS: &[&str] = &[
    "mp3", "flac", "ogg", "oga", "opus", "m4a", "mp4", "aac", "wav", "aif", "aiff", "ape", "wv",
    "mpc", "spx",
];

#[derive(Debug)]
pub enum MetadataError {
    Io(std::io::Error),
    Lofty(LoftyError),
}

impl std::fmt::Display for MetadataError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            MetadataError::Io(err) => write!(f, "io error: {}", err),
            MetadataError::Lofty(err) => write!(f, "tag error: {}", err),
        }
    }
}

impl std::error::Error for MetadataError {}

impl From<std::io::Error> for MetadataError {
    fn from(err: std::io::Error) -> Self {
        MetadataError::Io(err)
    }
}

impl From<LoftyError> for MetadataError {
    fn from(err: LoftyError) -> Self {
        MetadataError::Lofty(err)
    }
}

/// General purpose tag reader backed by `lofty`.
#[derive(Debug, Default)]
pub struct LoftyReader;

impl LoftyReader {
    pub fn new() -> Self {
        Self
    }

    fn read_into(&self, track: &mut TrackDraft) -> Result<(), MetadataError> {
        let tagged_file = lofty::read_from_path(track.path())?;
        let properties = tagged_file.properties();

        let duration = properties.duration().as_secs();
        if duration > 0 {
            track.replace_value(KEY_DURATION, duration.to_string());
        }
        if let Some(bitrate) = properties.audio_bitrate().or(properties.overall_bitrate()) {
            track.replace_value("bitrate", bitrate.to_string());
        }
        if let Some(sample_rate) = properties.sample_rate() {
            track.replace_value("sample_rate", sample_rate.to_string());
        }
        if let Some(channels) = properties.channels() {
            track.replace_value("channels", channels.to_string());
        }

        let tag = match tagged_file.primary_tag().or_else(|| tagged_file.first_tag()) {
            Some(tag) => tag,
            None => return Ok(()),
        };

        if let Some(title) = tag.get_string(&ItemKey::TrackTitle) {
            track.replace_value(KEY_TITLE, title);
        }
        if let Some(album) = tag.get_string(&ItemKey::AlbumTitle) {
            track.replace_value(KEY_ALBUM, album);
        }

        let mut artists: Vec<String> = tag
            .get_strings(&ItemKey::TrackArtist)
            .flat_map(split_multi)
            .collect();
        let album_artist = tag.get_string(&ItemKey::AlbumArtist).map(|v| v.to_string());
        if artists.is_empty() {
            artists.extend(album_artist.iter().flat_map(|v| split_multi(v)));
        }
        if !artists.is_empty() {
            track.clear_value(KEY_ARTIST);
            for artist in artists {
                track.set_value(KEY_ARTIST, artist);
            }
        }
        if let Some(album_artist) = album_artist {
            track.replace_value("album_artist", album_artist);
        }

        let genres: Vec<String> = tag
            .get_strings(&ItemKey::Genre)
            .flat_map(parse_genres)
            .collect();
        if !genres.is_empty() {
            track.clear_value(KEY_GENRE);
            for genre in genres {
                track.set_value(KEY_GENRE, genre);
            }
        }

        if let Some(number) = tag.get_string(&ItemKey::TrackNumber).and_then(parse_u16) {
            track.replace_value(KEY_TRACK, number.to_string());
        }
        if let Some(disc) = tag.get_string(&ItemKey::DiscNumber).and_then(parse_u16) {
            track.replace_value("disc", disc.to_string());
        }
        if let Some(year) = tag.get_string(&ItemKey::Year).and_then(parse_year) {
            track.replace_value(KEY_YEAR, year.to_string());
        }
        if let Some(comment) = tag.get_string(&ItemKey::Comment) {
            track.replace_value("comment", comment);
        }
        if let Some(composer) = tag.get_string(&ItemKey::Composer) {
            track.replace_value("composer", composer);
        }

        if let Some(picture) = pick_picture(tag.pictures()) {
            track.set_thumbnail(picture.data().to_vec());
        }

        Ok(())
    }
}

impl TagReader for LoftyReader {
    fn name(&self) -> &str {
        "lofty"
    }

    fn can_read_tag(&self, extension: &str) -> bool {
        EXTENSIONS.contains(&extension)
    }

    fn read_tag(&self, track: &mut TrackDraft) -> bool {
        match self.read_into(track) {
            Ok(()) => true,
            Err(err) => {
                debug!("failed to read tags for {:?}: {}", track.path(), err);
                false
            }
        }
    }
}

fn split_multi(text: &str) -> Vec<String> {
    text.split(&[';', '\0'][..])
        .map(str::trim)
        .filter(|part| !part.is_empty())
        .map(str::to_string)
        .collect()
}

fn parse_u16(text: &str) -> Option<u16> {
    let head = text.split('/').next().unwrap_or(text).trim();
    head.parse().ok()
}

fn parse_year(text: &str) -> Option<i32> {
    let mut digits = String::new();
    for ch in text.chars() {
        if ch.is_ascii_digit() {
            digits.push(ch);
            if digits.len() == 4 {
                break;
            }
        } else if !digits.is_empty() {
            break;
        }
    }
    if digits.is_empty() {
        None
    } else {
        digits.parse().ok()
    }
}

fn parse_genres(text: &str) -> Vec<String> {
    let mut out = Vec::new();
    for part in text.split(&[';', ',', '/', '|', '\0'][..]) {
        let trimmed = part.trim();
        if trimmed.is_empty() {
            continue;
        }
        if !out.iter().any(|existing: &String| existing == trimmed) {
            out.push(trimmed.to_string());
        }
    }
    out
}

fn pick_picture(pictures: &[Picture]) -> Option<&Picture> {
    for picture in pictures {
        if picture.pic_type() == PictureType::CoverFront {
            return Some(picture);
        }
    }
    pictures.first()
}
