//! In-memory storage backend.

use crate::backend::StorageBackend;
use crate::error::{StorageError, StorageResult};
use parking_lot::RwLock;
use std::sync::Arc;

/// An in-memory storage backend.
///
/// Cloning an `InMemoryBackend` yields a second handle onto the *same* bytes.
/// Dropping a journalled store and opening a new one over a clone is how tests
/// simulate a process restart without touching the file system.
///
/// # Example
///
/// ```rust
/// use entiwork_storage::{InMemoryBackend, StorageBackend};
///
/// let mut writer = InMemoryBackend::new();
/// let reader = writer.clone();
/// writer.append(b"shared").unwrap();
/// assert_eq!(reader.size().unwrap(), 6);
/// ```
#[derive(Debug, Default, Clone)]
pub struct InMemoryBackend {
    data: Arc<RwLock<Vec<u8>>>,
}

impl InMemoryBackend {
    /// Creates an empty backend.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a backend holding `data`.
    #[must_use]
    pub fn with_data(data: Vec<u8>) -> Self {
        Self {
            data: Arc::new(RwLock::new(data)),
        }
    }

    /// Returns a copy of the stored bytes.
    #[must_use]
    pub fn snapshot(&self) -> Vec<u8> {
        self.data.read().clone()
    }

    /// Overwrites the byte at `offset`, if present.
    ///
    /// Used by corruption tests.
    pub fn corrupt_byte(&self, offset: usize) {
        if let Some(byte) = self.data.write().get_mut(offset) {
            *byte ^= 0xFF;
        }
    }
}

impl StorageBackend for InMemoryBackend {
    fn read_at(&self, offset: u64, len: usize) -> StorageResult<Vec<u8>> {
        let data = self.data.read();
        let size = data.len() as u64;
        let start = usize::try_from(offset).map_err(|_| StorageError::ReadPastEnd {
            offset,
            len,
            size,
        })?;
        let end = start.saturating_add(len);

        if end > data.len() {
            return Err(StorageError::ReadPastEnd { offset, len, size });
        }

        Ok(data[start..end].to_vec())
    }

    fn append(&mut self, bytes: &[u8]) -> StorageResult<u64> {
        let mut data = self.data.write();
        let offset = data.len() as u64;
        data.extend_from_slice(bytes);
        Ok(offset)
    }

    fn flush(&mut self) -> StorageResult<()> {
        Ok(())
    }

    fn sync(&mut self) -> StorageResult<()> {
        Ok(())
    }

    fn size(&self) -> StorageResult<u64> {
        Ok(self.data.read().len() as u64)
    }

    fn truncate(&mut self, new_size: u64) -> StorageResult<()> {
        let mut data = self.data.write();
        let size = data.len() as u64;
        if new_size > size {
            return Err(StorageError::TruncateBeyondEnd {
                requested: new_size,
                size,
            });
        }
        // new_size <= len, so the cast cannot truncate
        data.truncate(new_size as usize);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn append_returns_previous_size() {
        let mut backend = InMemoryBackend::new();
        assert_eq!(backend.append(b"abc").unwrap(), 0);
        assert_eq!(backend.append(b"de").unwrap(), 3);
        assert_eq!(backend.size().unwrap(), 5);
    }

    #[test]
    fn read_at_returns_written_range() {
        let mut backend = InMemoryBackend::new();
        backend.append(b"hello world").unwrap();
        assert_eq!(backend.read_at(6, 5).unwrap(), b"world");
        assert!(backend.read_at(11, 0).unwrap().is_empty());
    }

    #[test]
    fn read_past_end_fails() {
        let mut backend = InMemoryBackend::new();
        backend.append(b"hello").unwrap();
        assert!(matches!(
            backend.read_at(3, 10),
            Err(StorageError::ReadPastEnd { .. })
        ));
    }

    #[test]
    fn clones_share_bytes() {
        let mut first = InMemoryBackend::new();
        let second = first.clone();
        first.append(b"journal").unwrap();
        assert_eq!(second.read_all().unwrap(), b"journal");
    }

    #[test]
    fn truncate_shrinks_but_never_grows() {
        let mut backend = InMemoryBackend::with_data(b"hello world".to_vec());
        backend.truncate(5).unwrap();
        assert_eq!(backend.snapshot(), b"hello");
        assert!(matches!(
            backend.truncate(50),
            Err(StorageError::TruncateBeyondEnd { requested: 50, size: 5 })
        ));
    }

    #[test]
    fn corrupt_byte_flips_bits() {
        let backend = InMemoryBackend::with_data(vec![0x00, 0x0F]);
        backend.corrupt_byte(1);
        assert_eq!(backend.snapshot(), vec![0x00, 0xF0]);
        backend.corrupt_byte(99);
        assert_eq!(backend.snapshot().len(), 2);
    }
}
