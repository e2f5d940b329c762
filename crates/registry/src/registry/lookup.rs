//! Utility, adapter and subscriber registration and lookup.
//!
//! Registering the identical `(component, info)` pair again is a no-op.
//! Registering something else under an occupied key first unregisters the
//! previous component, so handlers see `Unregistered` before `Registered`.

use indexmap::IndexMap;

use super::maps::{AdapterKey, Registration, SubscriptionRegistration, UtilityKey};
use super::{Pending, Registry, RegistryState};
use crate::component::Component;
use crate::error::{RegistryError, Result};
use crate::event::{RegistrationEvent, RegistrationInfo, RegistrationKind};
use crate::table::{BucketKey, SubscriptionKey};
use crate::tag::Tag;

fn utility_subscription(provided: &Tag) -> SubscriptionKey {
	SubscriptionKey::new(Vec::new(), Some(provided.clone()))
}

fn info(registry: &Registry, kind: RegistrationKind, component: &Component, info: &str) -> RegistrationInfo {
	RegistrationInfo {
		registry: registry.clone(),
		kind,
		component: component.clone(),
		info: info.to_string(),
	}
}

fn remove_utility(
	registry: &Registry,
	state: &mut RegistryState,
	pending: &mut Pending,
	key: &UtilityKey,
) -> Result<()> {
	let Some(old) = state.maps.utility_registrations.remove(key) else {
		return Ok(());
	};
	state
		.maps
		.utilities
		.unregister(&BucketKey::utility(key.provided.clone()), &key.name);
	if !state.maps.utility_subscribed(&key.provided, &old.component) {
		state
			.maps
			.utilities
			.unsubscribe(&utility_subscription(&key.provided), Some(&old.component))?;
	}
	pending.fire(RegistrationEvent::Unregistered(info(
		registry,
		RegistrationKind::Utility {
			provided: key.provided.clone(),
			name: key.name.clone(),
		},
		&old.component,
		&old.info,
	)));
	Ok(())
}

fn remove_adapter(
	registry: &Registry,
	state: &mut RegistryState,
	pending: &mut Pending,
	key: &AdapterKey,
) {
	let Some(old) = state.maps.adapter_registrations.remove(key) else {
		return;
	};
	state.maps.adapters.unregister(
		&BucketKey::adapter(key.required.clone(), key.provided.clone()),
		&key.name,
	);
	pending.fire(RegistrationEvent::Unregistered(info(
		registry,
		RegistrationKind::Adapter {
			required: key.required.clone(),
			provided: key.provided.clone(),
			name: key.name.clone(),
		},
		&old.component,
		&old.info,
	)));
}

impl Registry {
	pub fn register_utility(&self, component: Component, provided: &Tag, name: &str) -> Result<()> {
		self.register_utility_info(component, provided, name, "")
	}

	/// Registers `component` as the utility providing `provided` under `name`.
	///
	/// # Errors
	///
	/// - [`RegistryError::UnsupportedTag`] for anonymous tags.
	/// - [`RegistryError::ImmutableLeaf`] if a legacy subscriber leaf would
	///   have to change.
	pub fn register_utility_info(
		&self,
		component: Component,
		provided: &Tag,
		name: &str,
		info_text: &str,
	) -> Result<()> {
		provided.check()?;
		self.mutate(|registry, state, pending| {
			let key = UtilityKey {
				provided: provided.clone(),
				name: name.to_string(),
			};
			if let Some(existing) = state.maps.utility_registrations.get(&key) {
				if existing.matches(&component, info_text) {
					return Ok(());
				}
				remove_utility(registry, state, pending, &key)?;
			}

			let subscribed = state.maps.utility_subscribed(provided, &component);
			state.maps.utility_registrations.insert(
				key,
				Registration {
					component: component.clone(),
					info: info_text.to_string(),
				},
			);
			state
				.maps
				.utilities
				.register(BucketKey::utility(provided.clone()), name, component.clone())?;
			if !subscribed {
				state
					.maps
					.utilities
					.subscribe(utility_subscription(provided), component.clone())?;
			}
			pending.fire(RegistrationEvent::Registered(info(
				registry,
				RegistrationKind::Utility {
					provided: provided.clone(),
					name: name.to_string(),
				},
				&component,
				info_text,
			)));
			Ok(())
		})
	}

	/// Removes the utility registered for `(provided, name)`.
	///
	/// With `component` given, only removes it if that is what is registered.
	/// Returns whether anything changed.
	pub fn unregister_utility(&self, component: Option<&Component>, provided: &Tag, name: &str) -> Result<bool> {
		self.mutate(|registry, state, pending| {
			let key = UtilityKey {
				provided: provided.clone(),
				name: name.to_string(),
			};
			match state.maps.utility_registrations.get(&key) {
				None => return Ok(false),
				Some(reg) if component.is_some_and(|c| !reg.component.same(c)) => return Ok(false),
				Some(_) => {}
			}
			remove_utility(registry, state, pending, &key)?;
			Ok(true)
		})
	}

	/// The most specific utility for `(provided, name)` along the resolution order.
	pub fn query_utility(&self, provided: &Tag, name: &str) -> Result<Option<Component>> {
		let key = BucketKey::utility(provided.clone());
		for registry in self.order()?.iter() {
			let state = registry.state();
			if let Some(found) = state.maps.utilities.lookup(&key, name) {
				return Ok(Some(found.clone()));
			}
		}
		Ok(None)
	}

	/// Like [`Registry::query_utility`], failing with [`RegistryError::NotFound`].
	pub fn get_utility(&self, provided: &Tag, name: &str) -> Result<Component> {
		self.query_utility(provided, name)?
			.ok_or_else(|| RegistryError::NotFound {
				tag: provided.clone(),
				name: name.to_string(),
			})
	}

	/// Every named utility providing `provided`, more specific registries
	/// shadowing less specific ones.
	///
	/// Names keep the position at which they were first seen, walking from
	/// the root.
	pub fn get_utilities_for(&self, provided: &Tag) -> Result<Vec<(String, Component)>> {
		let key = BucketKey::utility(provided.clone());
		let mut found: IndexMap<String, Component> = IndexMap::new();
		for registry in self.order()?.iter().rev() {
			let state = registry.state();
			for (name, component) in state.maps.utilities.names(&key) {
				found.insert(name.clone(), component.clone());
			}
		}
		Ok(found.into_iter().collect())
	}

	/// Every component registered as a utility for `provided` anywhere in the
	/// resolution order, root first, leaf last.
	pub fn get_all_utilities_registered_for(&self, provided: &Tag) -> Result<Vec<Component>> {
		let key = utility_subscription(provided);
		let mut all = Vec::new();
		for registry in self.order()?.iter().rev() {
			all.extend_from_slice(registry.state().maps.utilities.subscriptions(&key));
		}
		Ok(all)
	}

	pub fn register_adapter(
		&self,
		factory: Component,
		required: &[Tag],
		provided: &Tag,
		name: &str,
	) -> Result<()> {
		self.register_adapter_info(factory, required, provided, name, "")
	}

	/// Registers an adapter factory for objects providing `required`.
	pub fn register_adapter_info(
		&self,
		factory: Component,
		required: &[Tag],
		provided: &Tag,
		name: &str,
		info_text: &str,
	) -> Result<()> {
		required.iter().try_for_each(Tag::check)?;
		provided.check()?;
		self.mutate(|registry, state, pending| {
			let key = AdapterKey {
				required: required.to_vec(),
				provided: provided.clone(),
				name: name.to_string(),
			};
			if let Some(existing) = state.maps.adapter_registrations.get(&key) {
				if existing.matches(&factory, info_text) {
					return Ok(());
				}
				remove_adapter(registry, state, pending, &key);
			}
			state.maps.adapter_registrations.insert(
				key,
				Registration {
					component: factory.clone(),
					info: info_text.to_string(),
				},
			);
			state.maps.adapters.register(
				BucketKey::adapter(required.to_vec(), provided.clone()),
				name,
				factory.clone(),
			)?;
			pending.fire(RegistrationEvent::Registered(info(
				registry,
				RegistrationKind::Adapter {
					required: required.to_vec(),
					provided: provided.clone(),
					name: name.to_string(),
				},
				&factory,
				info_text,
			)));
			Ok(())
		})
	}

	pub fn unregister_adapter(
		&self,
		factory: Option<&Component>,
		required: &[Tag],
		provided: &Tag,
		name: &str,
	) -> Result<bool> {
		self.mutate(|registry, state, pending| {
			let key = AdapterKey {
				required: required.to_vec(),
				provided: provided.clone(),
				name: name.to_string(),
			};
			match state.maps.adapter_registrations.get(&key) {
				None => return Ok(false),
				Some(reg) if factory.is_some_and(|f| !reg.component.same(f)) => return Ok(false),
				Some(_) => {}
			}
			remove_adapter(registry, state, pending, &key);
			Ok(true)
		})
	}

	/// The most specific adapter factory for the key.
	pub fn lookup_adapter(&self, required: &[Tag], provided: &Tag, name: &str) -> Result<Option<Component>> {
		let key = BucketKey::adapter(required.to_vec(), provided.clone());
		for registry in self.order()?.iter() {
			let state = registry.state();
			if let Some(found) = state.maps.adapters.lookup(&key, name) {
				return Ok(Some(found.clone()));
			}
		}
		Ok(None)
	}

	/// Adapts `objects` (which provide `required`) to `provided`.
	///
	/// Returns `None` if no factory is registered or the factory declines.
	pub fn query_adapter(
		&self,
		objects: &[Component],
		required: &[Tag],
		provided: &Tag,
		name: &str,
	) -> Result<Option<Component>> {
		Ok(self
			.lookup_adapter(required, provided, name)?
			.and_then(|factory| factory.call(objects)))
	}

	pub fn get_adapter(
		&self,
		objects: &[Component],
		required: &[Tag],
		provided: &Tag,
		name: &str,
	) -> Result<Component> {
		self.query_adapter(objects, required, provided, name)?
			.ok_or_else(|| RegistryError::AdapterNotFound {
				required: required.to_vec(),
				provided: provided.clone(),
				name: name.to_string(),
			})
	}

	/// Adds a subscription adapter. Subscribers accumulate; nothing is replaced.
	pub fn register_subscriber(
		&self,
		factory: Component,
		required: &[Tag],
		provided: &Tag,
		info_text: &str,
	) -> Result<()> {
		self.subscribe(factory, required, Some(provided), info_text)
	}

	/// Removes subscribers for `(required, provided)`; all of them when
	/// `factory` is `None`.
	pub fn unregister_subscriber(
		&self,
		factory: Option<&Component>,
		required: &[Tag],
		provided: &Tag,
	) -> Result<bool> {
		self.unsubscribe(factory, required, Some(provided))
	}

	/// Adds an event handler for objects providing `required`.
	pub fn register_handler(&self, handler: Component, required: &[Tag], info_text: &str) -> Result<()> {
		self.subscribe(handler, required, None, info_text)
	}

	pub fn unregister_handler(&self, handler: Option<&Component>, required: &[Tag]) -> Result<bool> {
		self.unsubscribe(handler, required, None)
	}

	/// Subscribers (or handlers, when `provided` is `None`) along the
	/// resolution order, root first.
	pub fn subscriptions(&self, required: &[Tag], provided: Option<&Tag>) -> Result<Vec<Component>> {
		let key = SubscriptionKey::new(required.to_vec(), provided.cloned());
		let mut all = Vec::new();
		for registry in self.order()?.iter().rev() {
			all.extend_from_slice(registry.state().maps.adapters.subscriptions(&key));
		}
		Ok(all)
	}

	/// Calls every subscriber for `objects` and collects what they produce.
	pub fn subscribers(&self, objects: &[Component], required: &[Tag], provided: &Tag) -> Result<Vec<Component>> {
		Ok(self
			.subscriptions(required, Some(provided))?
			.iter()
			.filter_map(|factory| factory.call(objects))
			.collect())
	}

	/// Calls every handler registered for `required`.
	pub fn handle(&self, required: &[Tag], objects: &[Component]) -> Result<()> {
		for handler in self.subscriptions(required, None)? {
			handler.call(objects);
		}
		Ok(())
	}

	/// Delivers `event` to the handlers registered for `tag`.
	pub fn notify(&self, tag: &Tag, event: Component) -> Result<()> {
		self.handle(std::slice::from_ref(tag), &[event])
	}

	fn subscribe(&self, component: Component, required: &[Tag], provided: Option<&Tag>, info_text: &str) -> Result<()> {
		required.iter().try_for_each(Tag::check)?;
		if let Some(tag) = provided {
			tag.check()?;
		}
		self.mutate(|registry, state, pending| {
			state.maps.subscription_registrations.push(SubscriptionRegistration {
				required: required.to_vec(),
				provided: provided.cloned(),
				component: component.clone(),
				info: info_text.to_string(),
			});
			state.maps.adapters.subscribe(
				SubscriptionKey::new(required.to_vec(), provided.cloned()),
				component.clone(),
			)?;
			pending.fire(RegistrationEvent::Registered(info(
				registry,
				subscription_kind(required, provided),
				&component,
				info_text,
			)));
			Ok(())
		})
	}

	fn unsubscribe(&self, component: Option<&Component>, required: &[Tag], provided: Option<&Tag>) -> Result<bool> {
		self.mutate(|registry, state, pending| {
			let matches = |reg: &SubscriptionRegistration| {
				reg.required == required
					&& reg.provided.as_ref() == provided
					&& component.is_none_or(|c| reg.component.same(c))
			};
			let (removed, kept): (Vec<_>, Vec<_>) = state
				.maps
				.subscription_registrations
				.drain(..)
				.partition(|reg| matches(reg));
			state.maps.subscription_registrations = kept;
			if removed.is_empty() {
				return Ok(false);
			}
			let key = SubscriptionKey::new(required.to_vec(), provided.cloned());
			state.maps.adapters.unsubscribe(&key, component)?;
			for reg in removed {
				pending.fire(RegistrationEvent::Unregistered(info(
					registry,
					subscription_kind(required, provided),
					&reg.component,
					&reg.info,
				)));
			}
			Ok(true)
		})
	}
}

fn subscription_kind(required: &[Tag], provided: Option<&Tag>) -> RegistrationKind {
	match provided {
		Some(tag) => RegistrationKind::Subscriber {
			required: required.to_vec(),
			provided: tag.clone(),
		},
		None => RegistrationKind::Handler {
			required: required.to_vec(),
		},
	}
}
