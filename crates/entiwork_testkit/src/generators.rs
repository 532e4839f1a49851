//! Property-based test generators using proptest.
//!
//! Provides strategies for generating property values, references and
//! sequences of unit-of-work operations.

use entiwork_core::{EntityReference, Value};
use proptest::prelude::*;
use std::collections::BTreeMap;

/// Strategy for generating entity references from a small key space, so
/// generated operations collide often.
pub fn entity_reference_strategy() -> impl Strategy<Value = EntityReference> {
    (0u8..8).prop_map(|n| EntityReference::from(format!("entity:{n}")))
}

/// Strategy for generating property names.
pub fn property_name_strategy() -> impl Strategy<Value = String> {
    prop::string::string_regex("[a-z][a-z0-9_]{0,11}").expect("Invalid regex")
}

/// Strategy for generating scalar property values.
pub fn scalar_value_strategy() -> impl Strategy<Value = Value> {
    prop_oneof![
        Just(Value::Null),
        any::<bool>().prop_map(Value::Bool),
        any::<i64>().prop_map(Value::Integer),
        "[ -~]{0,24}".prop_map(Value::Text),
        prop::collection::vec(any::<u8>(), 0..32).prop_map(Value::Bytes),
    ]
}

/// Strategy for generating arbitrary (nested) property values.
pub fn value_strategy() -> impl Strategy<Value = Value> {
    scalar_value_strategy().prop_recursive(3, 32, 4, |inner| {
        prop_oneof![
            prop::collection::vec(inner.clone(), 0..4).prop_map(Value::List),
            prop::collection::btree_map("[a-z]{1,6}", inner, 0..4).prop_map(Value::Map),
        ]
    })
}

/// Strategy for generating a property map.
pub fn properties_strategy() -> impl Strategy<Value = BTreeMap<String, Value>> {
    prop::collection::btree_map(property_name_strategy(), value_strategy(), 0..6)
}

/// One step of a generated workload.
#[derive(Debug, Clone)]
pub enum Operation {
    /// Create the entity with the given properties.
    Create(EntityReference, BTreeMap<String, Value>),
    /// Set one property on an existing entity.
    Update(EntityReference, String, Value),
    /// Remove the entity.
    Remove(EntityReference),
}

impl Operation {
    /// The entity the operation touches.
    pub fn reference(&self) -> &EntityReference {
        match self {
            Self::Create(r, _) | Self::Update(r, _, _) | Self::Remove(r) => r,
        }
    }
}

/// Strategy for generating a single operation.
pub fn operation_strategy() -> impl Strategy<Value = Operation> {
    prop_oneof![
        (entity_reference_strategy(), properties_strategy())
            .prop_map(|(r, props)| Operation::Create(r, props)),
        (
            entity_reference_strategy(),
            property_name_strategy(),
            scalar_value_strategy()
        )
            .prop_map(|(r, name, value)| Operation::Update(r, name, value)),
        entity_reference_strategy().prop_map(Operation::Remove),
    ]
}

/// Strategy for generating a workload of operations.
pub fn operations_strategy(max_len: usize) -> impl Strategy<Value = Vec<Operation>> {
    prop::collection::vec(operation_strategy(), 1..max_len.max(2))
}
