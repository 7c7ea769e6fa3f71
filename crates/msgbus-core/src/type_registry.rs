//! Dense, monotonic ids for concrete message types.
//!
//! Deliberately *not* part of [`StaticState`](crate) — a reset must not
//! renumber or forget a type that has already been registered (`spec.md`
//! §4.5, invariant 15), so this table lives in its own `thread_local!` with
//! no reset hook reachable from production code.

use std::any::TypeId;
use std::cell::RefCell;
use std::fmt;

use rustc_hash::FxHashMap;

/// Dense id assigned to a concrete message type on first use.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct MessageTypeId(u32);

impl MessageTypeId {
	pub const fn raw(self) -> u32 {
		self.0
	}
}

impl fmt::Display for MessageTypeId {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		write!(f, "MessageTypeId({})", self.0)
	}
}

#[derive(Default)]
struct Registry {
	ids: FxHashMap<TypeId, MessageTypeId>,
	next: u32,
}

impl Registry {
	fn id_of(&mut self, type_id: TypeId) -> MessageTypeId {
		if let Some(id) = self.ids.get(&type_id) {
			return *id;
		}
		let id = MessageTypeId(self.next);
		self.next = self
			.next
			.checked_add(1)
			.expect("message type id space exhausted");
		self.ids.insert(type_id, id);
		id
	}
}

thread_local! {
	static REGISTRY: RefCell<Registry> = RefCell::new(Registry::default());
}

/// Returns the dense id for `M`, assigning one on first use.
pub fn id_of<M: 'static>() -> MessageTypeId {
	REGISTRY.with(|registry| registry.borrow_mut().id_of(TypeId::of::<M>()))
}

/// Clears every assignment. **Test-only**: production code has no path to
/// this function, since forgetting an id would violate the reset invariant
/// the rest of the crate relies on.
#[cfg(any(test, feature = "test-util"))]
pub fn reset_for_tests() {
	REGISTRY.with(|registry| *registry.borrow_mut() = Registry::default());
}

#[cfg(test)]
mod tests {
	use super::*;

	struct Alpha;
	struct Beta;

	#[test]
	fn same_type_yields_same_id() {
		reset_for_tests();
		assert_eq!(id_of::<Alpha>(), id_of::<Alpha>());
	}

	#[test]
	fn distinct_types_yield_distinct_ids() {
		reset_for_tests();
		assert_ne!(id_of::<Alpha>(), id_of::<Beta>());
	}

	#[test]
	fn ids_are_dense_and_monotonic_from_first_use() {
		reset_for_tests();
		let a = id_of::<Alpha>();
		let b = id_of::<Beta>();
		assert_eq!(a.raw(), 0);
		assert_eq!(b.raw(), 1);
		assert_eq!(id_of::<Alpha>().raw(), 0);
	}
}
