use std::sync::Arc;

use parking_lot::RwLock;
use tracing::debug;

use crate::draft::TrackDraft;

/// Capability interface implemented by every metadata reader.
///
/// Readers must not keep state between calls and must release any file handle
/// before `read_tag` returns.
pub trait TagReader: Send + Sync {
    fn name(&self) -> &str;

    fn can_read_tag(&self, extension: &str) -> bool;

    /// Fills `track` with whatever the reader understands. Returns `false` when
    /// nothing could be read.
    fn read_tag(&self, track: &mut TrackDraft) -> bool;
}

/// Ordered, hot-swappable set of readers. Cloning shares the same set.
#[derive(Clone, Default)]
pub struct ReaderRegistry {
    readers: Arc<RwLock<Vec<Arc<dyn TagReader>>>>,
}

impl ReaderRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_defaults() -> Self {
        let registry = Self::new();
        registry.register(Arc::new(crate::LoftyReader::new()));
        registry
    }

    /// Appends a reader. A reader with the same name is replaced in place so
    /// registration order stays stable.
    pub fn register(&self, reader: Arc<dyn TagReader>) {
        let mut readers = self.readers.write();
        if let Some(slot) = readers.iter_mut().find(|r| r.name() == reader.name()) {
            debug!("replacing tag reader '{}'", reader.name());
            *slot = reader;
        } else {
            debug!("registering tag reader '{}'", reader.name());
            readers.push(reader);
        }
    }

    pub fn unregister(&self, name: &str) -> bool {
        let mut readers = self.readers.write();
        let before = readers.len();
        readers.retain(|reader| reader.name() != name);
        readers.len() != before
    }

    /// Snapshot of the current readers in registration order.
    pub fn list(&self) -> Vec<Arc<dyn TagReader>> {
        self.readers.read().clone()
    }

    pub fn len(&self) -> usize {
        self.readers.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.readers.read().is_empty()
    }
}
