//! Hierarchical component registries.
//!
//! A [`Registry`] holds utilities, adapters and subscribers keyed by
//! capability [`Tag`]s and inherits from an ordered list of base registries.
//! Lookups walk the C3 [`resolution_order`] of that base DAG, so the most
//! specific registration always wins.
//!
//! # Modules
//!
//! - [`tag`]: capability tags and the well-known tags used across the workspace
//! - [`component`]: registered values and their identity
//! - [`adaptive`]: maps that switch to an ordered, page-friendly form at scale
//! - [`table`]: the per-registry lookup tables built from those maps
//! - [`order`]: base linearization and its generation-keyed memo
//! - [`record`]: persisted registry records and legacy migration
//! - [`event`]: registration notifications

pub mod adaptive;
pub mod component;
pub mod error;
pub mod event;
pub mod order;
pub mod record;
pub mod table;
pub mod tag;

mod registry;

pub use adaptive::{AdaptiveMap, FrozenLeaf, Leaf};
pub use component::{Callable, Component, ComponentValue};
pub use error::{RegistryError, Result};
pub use event::{RegistrationEvent, RegistrationInfo, RegistrationKind};
pub use order::{generation, resolution_order};
pub use record::{BaseRef, RegistryRecord, StorageFormat};
pub use registry::{
	DEFAULT_THRESHOLD, Registry, RegistryBuilder, RegistryId, RegistryKind, StorageConfig,
};
pub use table::{BucketKey, LookupTable, SubscriptionKey};
pub use tag::{COMPONENTS, REGISTERED, Tag, UNREGISTERED};
