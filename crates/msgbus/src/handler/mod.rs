//! Per-owner facade over a [`RegistrationToken`] (`spec.md` §4.2).
//!
//! `MessageHandler` owns the activation lifecycle; the registration surface
//! itself is reached through `Deref<Target = RegistrationToken>` rather than
//! re-declared here, since every one of the token's 25 `register_*` methods
//! already attaches the right owner.

#[cfg(test)]
mod tests;

use std::cell::Cell;
use std::ops::Deref;

use msgbus_core::InstanceId;

use crate::bus::MessageBus;
use crate::token::{RebindMode, RegistrationToken};

/// Owned by a single [`InstanceId`]; aggregates its registrations and can be
/// (de)activated as a unit.
pub struct MessageHandler {
	token: RegistrationToken,
	active: Cell<bool>,
	dead: Cell<bool>,
}

impl MessageHandler {
	/// Creates an inactive handler bound to `bus`.
	pub fn new(owner: InstanceId, bus: MessageBus) -> Self {
		Self {
			token: RegistrationToken::new(owner, bus, RebindMode::Preserve),
			active: Cell::new(false),
			dead: Cell::new(false),
		}
	}

	/// Creates an inactive handler bound to the process-global bus
	/// (`spec.md` §4.2).
	pub fn new_on_global_bus(owner: InstanceId) -> Self {
		Self::new(owner, crate::state::global_bus())
	}

	pub fn owner(&self) -> InstanceId {
		self.token.owner()
	}

	pub fn is_active(&self) -> bool {
		self.active.get()
	}

	/// Idempotent: re-asserting the current state is a no-op. Activation
	/// re-arms every registration recorded on the token; deactivation
	/// retracts them without discarding the recorded intent.
	pub fn set_active(&self, active: bool) {
		if self.dead.get() || self.active.get() == active {
			return;
		}
		self.active.set(active);
		if active {
			self.token.enable();
		} else {
			self.token.disable();
		}
	}

	/// Direct access to the underlying token, e.g. for [`RegistrationToken::as_disposable`].
	pub fn token(&self) -> &RegistrationToken {
		&self.token
	}

	/// Per-(type, priority) count of post-processor prefreeze passes
	/// observed on the bound bus, for verifying invariant 16 from the
	/// owner's point of view.
	pub fn prefreeze_count(&self, bus: &MessageBus, type_id: msgbus_core::MessageTypeId, priority: i32) -> u64 {
		bus.prefreeze_count(type_id, priority)
	}

	/// Logs a one-time Warn the first time a reflexive-dispatch lookup
	/// would have been attempted. The reflexive-dispatch feature itself
	/// (invoking a named method on the owner) is out of scope for the core
	/// (`spec.md` §4.2); this only guarantees the single diagnostic log,
	/// deduplicated per bus rather than per handler.
	pub fn note_reflexive_dispatch_unresolved(&self, bus: &MessageBus, method_name: &str) {
		bus.log_reflexive_dispatch_unresolved(method_name);
	}
}

impl Deref for MessageHandler {
	type Target = RegistrationToken;

	fn deref(&self) -> &RegistrationToken {
		&self.token
	}
}

impl Drop for MessageHandler {
	fn drop(&mut self) {
		if !self.dead.get() {
			self.token.disable();
			self.dead.set(true);
		}
	}
}
