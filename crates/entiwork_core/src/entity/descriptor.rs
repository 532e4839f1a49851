//! Entity descriptors and descriptor lookup.

use entiwork_codec::Value;
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::Arc;

/// Schema of one entity type: the properties (with defaults), associations
/// and many-associations a new state of that type starts with.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EntityDescriptor {
    entity_type: String,
    properties: BTreeMap<String, Value>,
    associations: BTreeSet<String>,
    many_associations: BTreeSet<String>,
}

impl EntityDescriptor {
    /// Creates an empty descriptor for `entity_type`.
    #[must_use]
    pub fn new(entity_type: impl Into<String>) -> Self {
        Self {
            entity_type: entity_type.into(),
            properties: BTreeMap::new(),
            associations: BTreeSet::new(),
            many_associations: BTreeSet::new(),
        }
    }

    /// Declares a property with its default value.
    #[must_use]
    pub fn property(mut self, name: impl Into<String>, default: impl Into<Value>) -> Self {
        self.properties.insert(name.into(), default.into());
        self
    }

    /// Declares a single-valued association (initially unset).
    #[must_use]
    pub fn association(mut self, name: impl Into<String>) -> Self {
        self.associations.insert(name.into());
        self
    }

    /// Declares a many-association (initially empty).
    #[must_use]
    pub fn many_association(mut self, name: impl Into<String>) -> Self {
        self.many_associations.insert(name.into());
        self
    }

    /// Returns the entity type name.
    #[must_use]
    pub fn entity_type(&self) -> &str {
        &self.entity_type
    }

    /// Returns the declared properties and their defaults.
    #[must_use]
    pub fn properties(&self) -> &BTreeMap<String, Value> {
        &self.properties
    }

    /// Returns the declared association names.
    pub fn associations(&self) -> impl Iterator<Item = &str> {
        self.associations.iter().map(String::as_str)
    }

    /// Returns the declared many-association names.
    pub fn many_associations(&self) -> impl Iterator<Item = &str> {
        self.many_associations.iter().map(String::as_str)
    }
}

/// Supplies the descriptor for an entity type name.
pub trait DescriptorLookup: Send + Sync {
    /// Returns the descriptor registered for `entity_type`, if any.
    fn descriptor(&self, entity_type: &str) -> Option<Arc<EntityDescriptor>>;
}

/// A [`DescriptorLookup`] backed by a map.
#[derive(Debug, Default, Clone)]
pub struct DescriptorRegistry {
    descriptors: HashMap<String, Arc<EntityDescriptor>>,
}

impl DescriptorRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a descriptor, replacing any previous one of the same type.
    pub fn register(&mut self, descriptor: EntityDescriptor) -> Arc<EntityDescriptor> {
        let descriptor = Arc::new(descriptor);
        self.descriptors.insert(
            descriptor.entity_type().to_string(),
            Arc::clone(&descriptor),
        );
        descriptor
    }

    /// Builder-style [`register`](Self::register).
    #[must_use]
    pub fn with(mut self, descriptor: EntityDescriptor) -> Self {
        self.register(descriptor);
        self
    }

    /// Number of registered types.
    #[must_use]
    pub fn len(&self) -> usize {
        self.descriptors.len()
    }

    /// Returns `true` if nothing is registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.descriptors.is_empty()
    }
}

impl DescriptorLookup for DescriptorRegistry {
    fn descriptor(&self, entity_type: &str) -> Option<Arc<EntityDescriptor>> {
        self.descriptors.get(entity_type).cloned()
    }
}
