//! Entity state.

use crate::entity::{EntityDescriptor, EntityReference};
use crate::error::{CoreError, CoreResult};
use crate::types::{Timestamp, Version};
use entiwork_codec::Value;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Relationship of an in-memory state to the unit of work holding it.
///
/// Not persisted: a state read back from a store is always `Loaded`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum EntityStatus {
    /// Created in this unit of work; not yet in the store.
    New,
    /// Read from the store and not modified.
    #[default]
    Loaded,
    /// Read from the store and modified.
    Updated,
    /// Marked for removal.
    Removed,
}

impl fmt::Display for EntityStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::New => "new",
            Self::Loaded => "loaded",
            Self::Updated => "updated",
            Self::Removed => "removed",
        })
    }
}

/// Snapshot of one entity's fields and associations, tagged with the version
/// and time of the commit that produced it.
///
/// Equality ignores the transient [`EntityStatus`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EntityState {
    reference: EntityReference,
    entity_type: String,
    version: Version,
    last_modified: Timestamp,
    #[serde(skip)]
    status: EntityStatus,
    /// Set when a `New` state is removed, so the batch can drop it.
    #[serde(skip)]
    created_locally: bool,
    properties: BTreeMap<String, Value>,
    associations: BTreeMap<String, Option<EntityReference>>,
    many_associations: BTreeMap<String, Vec<EntityReference>>,
}

impl EntityState {
    /// Creates an empty `New` state.
    #[must_use]
    pub fn new(reference: EntityReference, entity_type: impl Into<String>) -> Self {
        Self {
            reference,
            entity_type: entity_type.into(),
            version: Version::NONE,
            last_modified: Timestamp::ZERO,
            status: EntityStatus::New,
            created_locally: true,
            properties: BTreeMap::new(),
            associations: BTreeMap::new(),
            many_associations: BTreeMap::new(),
        }
    }

    /// Creates a `New` state populated with the descriptor's defaults.
    #[must_use]
    pub fn from_descriptor(reference: EntityReference, descriptor: &EntityDescriptor) -> Self {
        let mut state = Self::new(reference, descriptor.entity_type());
        state.properties = descriptor.properties().clone();
        state.associations = descriptor
            .associations()
            .map(|name| (name.to_string(), None))
            .collect();
        state.many_associations = descriptor
            .many_associations()
            .map(|name| (name.to_string(), Vec::new()))
            .collect();
        state
    }

    /// Returns the entity reference.
    #[must_use]
    pub fn reference(&self) -> &EntityReference {
        &self.reference
    }

    /// Returns the entity type name.
    #[must_use]
    pub fn entity_type(&self) -> &str {
        &self.entity_type
    }

    /// Returns the version of the commit this state was read at.
    #[must_use]
    pub fn version(&self) -> Version {
        self.version
    }

    /// Returns the time of the commit this state was read at.
    #[must_use]
    pub fn last_modified(&self) -> Timestamp {
        self.last_modified
    }

    /// Returns the status within the owning unit of work.
    #[must_use]
    pub fn status(&self) -> EntityStatus {
        self.status
    }

    /// Returns `true` if committing this state would write to the store.
    #[must_use]
    pub fn is_dirty(&self) -> bool {
        match self.status {
            EntityStatus::New | EntityStatus::Updated => true,
            EntityStatus::Removed => !self.created_locally,
            EntityStatus::Loaded => false,
        }
    }

    /// Returns `true` for a `New` state that was removed again before
    /// completion; such a state never reaches the store.
    #[must_use]
    pub fn is_discarded_creation(&self) -> bool {
        self.status == EntityStatus::Removed && self.created_locally
    }

    /// Returns a property value.
    #[must_use]
    pub fn property(&self, name: &str) -> Option<&Value> {
        self.properties.get(name)
    }

    /// Returns all properties.
    #[must_use]
    pub fn properties(&self) -> &BTreeMap<String, Value> {
        &self.properties
    }

    /// Returns the target of a single-valued association, if set.
    #[must_use]
    pub fn association(&self, name: &str) -> Option<&EntityReference> {
        self.associations.get(name).and_then(Option::as_ref)
    }

    /// Returns all single-valued associations.
    #[must_use]
    pub fn associations(&self) -> &BTreeMap<String, Option<EntityReference>> {
        &self.associations
    }

    /// Returns the targets of a many-association (empty if undeclared).
    #[must_use]
    pub fn many_association(&self, name: &str) -> &[EntityReference] {
        self.many_associations
            .get(name)
            .map_or(&[][..], Vec::as_slice)
    }

    /// Returns all many-associations.
    #[must_use]
    pub fn many_associations(&self) -> &BTreeMap<String, Vec<EntityReference>> {
        &self.many_associations
    }

    /// Sets a property.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::InvalidOperation`] if the state is removed.
    pub fn set_property(&mut self, name: impl Into<String>, value: impl Into<Value>) -> CoreResult<()> {
        self.ensure_mutable("set property")?;
        self.properties.insert(name.into(), value.into());
        self.mark_updated();
        Ok(())
    }

    /// Sets or clears a single-valued association.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::InvalidOperation`] if the state is removed.
    pub fn set_association(
        &mut self,
        name: impl Into<String>,
        target: Option<EntityReference>,
    ) -> CoreResult<()> {
        self.ensure_mutable("set association")?;
        self.associations.insert(name.into(), target);
        self.mark_updated();
        Ok(())
    }

    /// Appends `target` to a many-association.
    ///
    /// Returns `false`, leaving the state untouched, if `target` is already
    /// present.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::InvalidOperation`] if the state is removed.
    pub fn add_many_association(
        &mut self,
        name: impl Into<String>,
        target: EntityReference,
    ) -> CoreResult<bool> {
        self.ensure_mutable("add to many-association")?;
        let targets = self.many_associations.entry(name.into()).or_default();
        if targets.contains(&target) {
            return Ok(false);
        }
        targets.push(target);
        self.mark_updated();
        Ok(true)
    }

    /// Removes `target` from a many-association.
    ///
    /// Returns `false` if it was not present.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::InvalidOperation`] if the state is removed.
    pub fn remove_many_association(
        &mut self,
        name: &str,
        target: &EntityReference,
    ) -> CoreResult<bool> {
        self.ensure_mutable("remove from many-association")?;
        let Some(targets) = self.many_associations.get_mut(name) else {
            return Ok(false);
        };
        let Some(position) = targets.iter().position(|t| t == target) else {
            return Ok(false);
        };
        targets.remove(position);
        self.mark_updated();
        Ok(true)
    }

    /// Marks the state for removal. Removing twice is a no-op.
    pub fn remove(&mut self) {
        self.status = EntityStatus::Removed;
    }

    /// Compares the persisted data of two states, ignoring version, time and
    /// status.
    #[must_use]
    pub fn same_data(&self, other: &Self) -> bool {
        self.reference == other.reference
            && self.entity_type == other.entity_type
            && self.properties == other.properties
            && self.associations == other.associations
            && self.many_associations == other.many_associations
    }

    /// Returns the state as stored after a commit at `version`/`at`.
    pub(crate) fn committed(mut self, version: Version, at: Timestamp) -> Self {
        self.version = version;
        self.last_modified = at;
        self.status = EntityStatus::Loaded;
        self.created_locally = false;
        self
    }

    fn mark_updated(&mut self) {
        if self.status == EntityStatus::Loaded {
            self.status = EntityStatus::Updated;
        }
    }

    fn ensure_mutable(&self, operation: &str) -> CoreResult<()> {
        if self.status == EntityStatus::Removed {
            return Err(CoreError::invalid_operation(format!(
                "cannot {operation} on removed entity {}",
                self.reference
            )));
        }
        Ok(())
    }
}

impl PartialEq for EntityState {
    fn eq(&self, other: &Self) -> bool {
        self.version == other.version
            && self.last_modified == other.last_modified
            && self.same_data(other)
    }
}

impl Eq for EntityState {}
