//! # EntiWork Core
//!
//! A unit-of-work engine over versioned entity state.
//!
//! This crate provides:
//! - [`StateStore`]: a versioned map from [`EntityReference`] to
//!   [`EntityState`], with an in-memory and a journalled implementation
//! - [`StoreUnitOfWork`]: a per-transaction session that tracks new, loaded,
//!   updated and removed states and prepares them as one batch
//! - [`StateCommitter`]: the one-shot capability that applies or discards a
//!   prepared batch
//! - [`ConcurrencyGuard`]: a unit-of-work decorator that rejects a batch if
//!   anything it read has changed version since
//! - [`with_retry`]: the bounded retry template for optimistic conflicts
//!
//! ## Example
//!
//! ```rust
//! use entiwork_core::{EntityDescriptor, EntityReference, EntityStore, UnitOfWork, Value};
//!
//! let store = EntityStore::in_memory();
//! let cargo = EntityDescriptor::new("Cargo").property("origin", Value::Null);
//! let reference = EntityReference::from("cargo:ABC");
//!
//! let mut uow = store.open_unit_of_work("book cargo");
//! uow.new_entity_state(reference.clone(), &cargo)
//!     .unwrap()
//!     .set_property("origin", "HONGKONG")
//!     .unwrap();
//! uow.complete().unwrap();
//!
//! let mut uow = store.open_unit_of_work("read cargo");
//! let state = uow.get_entity_state(&reference).unwrap();
//! assert_eq!(state.version().as_u64(), 1);
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod config;
mod entity;
mod entity_store;
mod error;
mod guard;
mod retry;
mod store;
mod types;
mod uow;

pub use config::Config;
pub use entity::{
    DescriptorLookup, DescriptorRegistry, EntityDescriptor, EntityReference, EntityState,
    EntityStatus,
};
pub use entity_store::{EntityStore, GuardedUnitOfWork};
pub use error::{CoreError, CoreResult, VersionConflict};
pub use guard::{ConcurrencyGuard, VersionLedger};
pub use retry::{with_retry, with_retry_policy, RetryPolicy};
pub use store::journal;
pub use store::{
    BatchReceipt, InMemoryStateStore, JournaledStateStore, RemovedEntity, StateBatch, StateStore,
    StoreStats,
};
pub use types::{Timestamp, UnitOfWorkId, Version};
pub use uow::{BatchCommitter, StateCommitter, StoreUnitOfWork, UnitOfWork, UnitOfWorkStatus};

pub use entiwork_codec::Value;
