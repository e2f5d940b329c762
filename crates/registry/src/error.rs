use crate::tag::Tag;

/// Result alias for registry operations.
pub type Result<T, E = RegistryError> = std::result::Result<T, E>;

/// Errors raised by registry lookups and mutations.
///
/// Mutations that fail leave the registry exactly as it was before the call.
#[derive(Debug, thiserror::Error)]
pub enum RegistryError {
	/// No utility is registered for the key anywhere in the resolution order.
	#[error("component not found: tag={tag} name={name:?}")]
	NotFound { tag: Tag, name: String },

	/// No adapter factory is registered for the key anywhere in the resolution order.
	#[error("adapter not found: required={required:?} provided={provided} name={name:?}")]
	AdapterNotFound {
		required: Vec<Tag>,
		provided: Tag,
		name: String,
	},

	/// The base lists cannot be merged into one order that respects all of them.
	#[error("cannot linearize the bases of {registry}: unmerged={unmerged:?}")]
	InconsistentHierarchy {
		registry: String,
		unmerged: Vec<Vec<String>>,
	},

	/// Installing the bases would make a registry inherit from itself.
	#[error("base cycle: {registry} would inherit from itself through {base}")]
	Cycle { registry: String, base: String },

	/// The tag cannot be used as a registration key.
	#[error("unsupported capability tag {0}: anonymous tags cannot key registrations")]
	UnsupportedTag(Tag),

	/// A leaf loaded from a legacy record was about to be mutated in place.
	#[error("forbidding mutation of legacy leaf {key}; rebuild() the registry first")]
	ImmutableLeaf { key: String },

	/// The registry, or something it holds, has no persistent form.
	#[error("{registry} cannot be persisted: {reason}")]
	NotPersistable { registry: String, reason: String },

	/// A record could not be encoded or decoded.
	#[error("registry record codec error: {0}")]
	Codec(#[from] postcard::Error),
}
