pub const SCHEMA_VERSION: u32 = 1;

pub const META_SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS meta (
    key TEXT PRIMARY KEY,
    value);
";

pub const INDEX_SCHEMA: &str = "
CREATE TABLE paths (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    path TEXT NOT NULL);

CREATE INDEX paths_path_idx ON paths (path);

CREATE TABLE folders (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    name TEXT NOT NULL,
    path_id INTEGER NOT NULL,
    parent_id INTEGER REFERENCES folders (id) ON DELETE CASCADE,
    fullpath TEXT NOT NULL);

CREATE UNIQUE INDEX folders_name_idx ON folders (name, path_id, parent_id);
CREATE INDEX folders_path_idx ON folders (path_id);

CREATE TABLE albums (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    name TEXT NOT NULL UNIQUE,
    sort_order INTEGER NOT NULL DEFAULT 0);

CREATE TABLE artists (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    name TEXT NOT NULL UNIQUE,
    sort_order INTEGER NOT NULL DEFAULT 0,
    aggregated INTEGER NOT NULL DEFAULT 0);

CREATE TABLE genres (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    name TEXT NOT NULL UNIQUE,
    sort_order INTEGER NOT NULL DEFAULT 0,
    aggregated INTEGER NOT NULL DEFAULT 0);

CREATE TABLE thumbnails (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    filesize INTEGER NOT NULL,
    checksum TEXT NOT NULL);

CREATE UNIQUE INDEX thumbnails_content_idx ON thumbnails (filesize, checksum);

CREATE TABLE tracks (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    filename TEXT NOT NULL,
    filesize INTEGER NOT NULL DEFAULT 0,
    filetime INTEGER NOT NULL DEFAULT 0,
    folder_id INTEGER NOT NULL REFERENCES folders (id) ON DELETE CASCADE,
    title TEXT,
    track_number INTEGER,
    duration INTEGER,
    year INTEGER,
    album_id INTEGER,
    visual_genre_id INTEGER,
    visual_artist_id INTEGER,
    thumbnail_id INTEGER,
    sort_order INTEGER NOT NULL DEFAULT 0);

CREATE UNIQUE INDEX tracks_file_idx ON tracks (folder_id, filename);

CREATE TABLE track_artists (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    track_id INTEGER NOT NULL REFERENCES tracks (id) ON DELETE CASCADE,
    artist_id INTEGER NOT NULL);

CREATE INDEX track_artists_track_idx ON track_artists (track_id);
CREATE INDEX track_artists_artist_idx ON track_artists (artist_id);

CREATE TABLE track_genres (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    track_id INTEGER NOT NULL REFERENCES tracks (id) ON DELETE CASCADE,
    genre_id INTEGER NOT NULL);

CREATE INDEX track_genres_track_idx ON track_genres (track_id);
CREATE INDEX track_genres_genre_idx ON track_genres (genre_id);

CREATE TABLE meta_keys (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    name TEXT NOT NULL UNIQUE);

CREATE TABLE meta_values (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    meta_key_id INTEGER NOT NULL,
    content TEXT NOT NULL,
    sort_order INTEGER NOT NULL DEFAULT 0);

CREATE UNIQUE INDEX meta_values_content_idx ON meta_values (meta_key_id, content);

CREATE TABLE track_meta (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    track_id INTEGER NOT NULL REFERENCES tracks (id) ON DELETE CASCADE,
    meta_value_id INTEGER NOT NULL);

CREATE INDEX track_meta_track_idx ON track_meta (track_id);
CREATE INDEX track_meta_value_idx ON track_meta (meta_value_id);
";
