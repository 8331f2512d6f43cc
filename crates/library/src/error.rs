use std::path::PathBuf;

#[derive(Debug)]
pub enum LibraryError {
    Io(std::io::Error),
    Sqlite(rusqlite::Error),
    ThumbnailDir {
        path: PathBuf,
        source: std::io::Error,
    },
    SchemaVersion(u32),
    WorkerSpawn(std::io::Error),
}

impl std::fmt::Display for LibraryError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            LibraryError::Io(err) => write!(f, "io error: {}", err),
            LibraryError::Sqlite(err) => write!(f, "db error: {}", err),
            LibraryError::ThumbnailDir { path, source } => {
                write!(f, "can't create thumbnail directory {:?}: {}", path, source)
            }
            LibraryError::SchemaVersion(version) => {
                write!(f, "index schema version mismatch: {}", version)
            }
            LibraryError::WorkerSpawn(err) => write!(f, "can't spawn indexer thread: {}", err),
        }
    }
}

impl std::error::Error for LibraryError {}

impl From<std::io::Error> for LibraryError {
    fn from(err: std::io::Error) -> Self {
        LibraryError::Io(err)
    }
}

impl From<rusqlite::Error> for LibraryError {
    fn from(err: rusqlite::Error) -> Self {
        LibraryError::Sqlite(err)
    }
}

impl LibraryError {
    /// True when a statement was aborted by the exit flag's progress handler.
    pub fn is_interrupted(&self) -> bool {
        matches!(
            self,
            LibraryError::Sqlite(rusqlite::Error::SqliteFailure(err, _))
                if err.code == rusqlite::ErrorCode::OperationInterrupted
        )
    }
}
