//! Type erasure for [`crate::bus::MessageBus::register_global_accept_all`].
//!
//! Every other registration kind is fully generic over a concrete `M` and
//! never needs erasure. `GlobalAcceptAll` is the one list in `spec.md` §3
//! that is *not* keyed by message type (`global_accept_all:
//! PrioritizedList<GlobalReg>`, singular) — an entry is invoked for every
//! message type emitted in a matching category, so its callbacks can only
//! be expressed over a type-erased payload.

use std::any::Any;

/// Blanket-implemented for every `'static` type; lets the bus downcast a
/// type-erased payload back to a concrete message inside a user callback.
pub trait Message: Any {
	fn as_any(&self) -> &dyn Any;
	fn as_any_mut(&mut self) -> &mut dyn Any;
}

impl<T: Any> Message for T {
	fn as_any(&self) -> &dyn Any {
		self
	}

	fn as_any_mut(&mut self) -> &mut dyn Any {
		self
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	struct Ping(u32);

	#[test]
	fn downcast_mut_recovers_concrete_type() {
		let mut ping = Ping(7);
		let erased: &mut dyn Message = &mut ping;
		let recovered = erased.as_any_mut().downcast_mut::<Ping>().unwrap();
		recovered.0 += 1;
		assert_eq!(ping.0, 8);
	}
}
