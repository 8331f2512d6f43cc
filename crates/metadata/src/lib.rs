mod draft;
mod lofty_reader;
mod registry;

pub use draft::{
    TrackDraft, KEY_ALBUM, KEY_ARTIST, KEY_DURATION, KEY_GENRE, KEY_TITLE, KEY_TRACK, KEY_YEAR,
    RESERVED_KEYS,
};
pub use lofty_reader::{LoftyReader, MetadataError};
pub use registry::{ReaderRegistry, TagReader};
