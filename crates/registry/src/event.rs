//! Registration notifications.
//!
//! Every successful registration change produces a [`RegistrationEvent`].
//! Events are delivered after the new registry state is published, to the
//! handlers registered for [`REGISTERED`](crate::tag::REGISTERED) or
//! [`UNREGISTERED`](crate::tag::UNREGISTERED) along the resolution order of
//! the registry that changed. Handlers receive the event wrapped in a
//! [`Component::Object`].

use crate::component::Component;
use crate::registry::Registry;
use crate::tag::{REGISTERED, Tag, UNREGISTERED};

/// What was registered.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum RegistrationKind {
	Utility {
		provided: Tag,
		name: String,
	},
	Adapter {
		required: Vec<Tag>,
		provided: Tag,
		name: String,
	},
	Subscriber {
		required: Vec<Tag>,
		provided: Tag,
	},
	Handler {
		required: Vec<Tag>,
	},
}

/// One registration as seen by event handlers.
#[derive(Clone, Debug)]
pub struct RegistrationInfo {
	pub registry: Registry,
	pub kind: RegistrationKind,
	pub component: Component,
	pub info: String,
}

#[derive(Clone, Debug)]
pub enum RegistrationEvent {
	Registered(RegistrationInfo),
	Unregistered(RegistrationInfo),
}

impl RegistrationEvent {
	pub fn info(&self) -> &RegistrationInfo {
		match self {
			Self::Registered(info) | Self::Unregistered(info) => info,
		}
	}

	/// The tag handlers subscribe to in order to receive this event.
	pub fn tag(&self) -> &'static Tag {
		match self {
			Self::Registered(_) => &REGISTERED,
			Self::Unregistered(_) => &UNREGISTERED,
		}
	}

	pub fn is_registered(&self) -> bool {
		matches!(self, Self::Registered(_))
	}
}
