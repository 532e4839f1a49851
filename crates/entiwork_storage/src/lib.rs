//! # EntiWork Storage
//!
//! Byte-store backends for the EntiWork state journal.
//!
//! A backend is an append-only byte sequence with positional reads. It has no
//! knowledge of journal records, entity states or versions; the journalled
//! state store in `entiwork_core` owns all of that.
//!
//! ## Available Backends
//!
//! - [`InMemoryBackend`] - ephemeral bytes, shareable between handles so a
//!   test can "reopen" the same journal
//! - [`FileBackend`] - a single file on the local file system
//!
//! ## Example
//!
//! ```rust
//! use entiwork_storage::{InMemoryBackend, StorageBackend};
//!
//! let mut backend = InMemoryBackend::new();
//! let offset = backend.append(b"batch-1").unwrap();
//! assert_eq!(backend.read_at(offset, 7).unwrap(), b"batch-1");
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod backend;
mod error;
mod file;
mod memory;

pub use backend::StorageBackend;
pub use error::{StorageError, StorageResult};
pub use file::FileBackend;
pub use memory::InMemoryBackend;
