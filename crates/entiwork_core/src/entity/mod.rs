//! Entity references, states and descriptors.

mod descriptor;
mod reference;
mod state;

pub use descriptor::{DescriptorLookup, DescriptorRegistry, EntityDescriptor};
pub use reference::EntityReference;
pub use state::{EntityState, EntityStatus};
