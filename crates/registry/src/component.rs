//! Registered components.

use std::any::Any;
use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use uuid::Uuid;

use crate::registry::Registry;

/// Adapter factories, subscribers and event handlers.
///
/// Called with the objects being adapted (or the event being handled);
/// returning `None` means the factory declined.
pub type Callable = dyn Fn(&[Component]) -> Option<Component> + Send + Sync;

/// Data component that can be stored with a persistent registry.
///
/// The id is assigned once and persisted, so the same value keeps its
/// identity across a store/reload cycle.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ComponentValue {
	id: Uuid,
	kind: String,
	data: Vec<u8>,
}

impl ComponentValue {
	pub fn new(kind: impl Into<String>, data: Vec<u8>) -> Self {
		Self {
			id: Uuid::new_v4(),
			kind: kind.into(),
			data,
		}
	}

	pub fn id(&self) -> Uuid {
		self.id
	}

	pub fn kind(&self) -> &str {
		&self.kind
	}

	pub fn data(&self) -> &[u8] {
		&self.data
	}
}

/// A value registered with a [`Registry`].
///
/// Only [`Component::Value`] has a persistent form; the other variants live
/// in process memory and make their registry refuse to be persisted.
#[derive(Clone)]
pub enum Component {
	Value(Arc<ComponentValue>),
	/// Another registry, typically an overlay template.
	Registry(Registry),
	Callable(Arc<Callable>),
	Object(Arc<dyn Any + Send + Sync>),
}

impl Component {
	/// Creates a data component with no payload.
	pub fn value(kind: impl Into<String>) -> Self {
		Self::Value(Arc::new(ComponentValue::new(kind, Vec::new())))
	}

	pub fn value_with(kind: impl Into<String>, data: Vec<u8>) -> Self {
		Self::Value(Arc::new(ComponentValue::new(kind, data)))
	}

	pub fn callable<F>(f: F) -> Self
	where
		F: Fn(&[Component]) -> Option<Component> + Send + Sync + 'static,
	{
		Self::Callable(Arc::new(f))
	}

	pub fn object<T: Any + Send + Sync>(value: T) -> Self {
		Self::Object(Arc::new(value))
	}

	/// Identity comparison.
	///
	/// Values compare by their persisted id, everything else by pointer.
	pub fn same(&self, other: &Component) -> bool {
		match (self, other) {
			(Self::Value(a), Self::Value(b)) => a.id == b.id,
			(Self::Registry(a), Self::Registry(b)) => a == b,
			(Self::Callable(a), Self::Callable(b)) => Arc::ptr_eq(a, b),
			(Self::Object(a), Self::Object(b)) => Arc::ptr_eq(a, b),
			_ => false,
		}
	}

	pub fn is_persistable(&self) -> bool {
		matches!(self, Self::Value(_))
	}

	pub fn as_value(&self) -> Option<&ComponentValue> {
		match self {
			Self::Value(v) => Some(v),
			_ => None,
		}
	}

	pub fn as_registry(&self) -> Option<&Registry> {
		match self {
			Self::Registry(r) => Some(r),
			_ => None,
		}
	}

	pub fn downcast_ref<T: Any>(&self) -> Option<&T> {
		match self {
			Self::Object(o) => o.downcast_ref::<T>(),
			_ => None,
		}
	}

	/// Invokes a callable component; other variants return `None`.
	pub fn call(&self, objects: &[Component]) -> Option<Component> {
		match self {
			Self::Callable(f) => (**f)(objects),
			_ => None,
		}
	}

	/// Short description used in logs and errors.
	pub fn describe(&self) -> String {
		match self {
			Self::Value(v) => format!("value:{}", v.kind),
			Self::Registry(r) => format!("registry:{}", r.name()),
			Self::Callable(_) => "callable".to_string(),
			Self::Object(_) => "object".to_string(),
		}
	}
}

impl From<Registry> for Component {
	fn from(registry: Registry) -> Self {
		Self::Registry(registry)
	}
}

impl fmt::Debug for Component {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		match self {
			Self::Value(v) => f
				.debug_struct("Value")
				.field("kind", &v.kind)
				.field("id", &v.id)
				.finish(),
			Self::Registry(r) => f.debug_tuple("Registry").field(&r.name()).finish(),
			Self::Callable(_) => f.write_str("Callable"),
			Self::Object(_) => f.write_str("Object"),
		}
	}
}

impl Serialize for Component {
	fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
		match self {
			Self::Value(v) => v.serialize(serializer),
			other => Err(serde::ser::Error::custom(format!(
				"{} has no persistent form",
				other.describe()
			))),
		}
	}
}

impl<'de> Deserialize<'de> for Component {
	fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
		ComponentValue::deserialize(deserializer).map(|v| Self::Value(Arc::new(v)))
	}
}
