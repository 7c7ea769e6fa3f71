//! Process-wide resettable state (`spec.md` §4.5): the global bus instance,
//! diagnostics flags, and the synthetic-owner counter used when a caller has
//! no natural [`InstanceId`] of its own.
//!
//! `msgbus_core::type_registry` is deliberately untouched by [`reset`] —
//! message-type ids must survive a reset (`spec.md` §8 invariant 15).

use std::cell::{Cell, RefCell};

use msgbus_core::InstanceId;

use crate::bus::MessageBus;

thread_local! {
	static GLOBAL_BUS: RefCell<MessageBus> = RefCell::new(MessageBus::new());
	static DIAGNOSTICS_ENABLED: Cell<bool> = const { Cell::new(false) };
	static DIAGNOSTIC_BUFFER_SIZE: Cell<usize> = const { Cell::new(0) };
	static DIAGNOSTIC_SEQUENCE: Cell<i64> = const { Cell::new(-1) };
	static SYNTHETIC_OWNER_COUNTER: Cell<u64> = const { Cell::new(0) };
}

/// A clone of the process-wide bus. Cloning is cheap (`Rc` bump); the global
/// and every clone of it share the same underlying tables.
pub fn global_bus() -> MessageBus {
	GLOBAL_BUS.with(|bus| bus.borrow().clone())
}

/// Enables or disables appending sink-routed log lines to the diagnostic
/// buffer (`spec.md` §6, `SPEC_FULL.md` §13).
pub fn set_diagnostics_enabled(enabled: bool) {
	DIAGNOSTICS_ENABLED.with(|flag| flag.set(enabled));
}

pub fn diagnostics_enabled() -> bool {
	DIAGNOSTICS_ENABLED.with(Cell::get)
}

/// Resizes the diagnostic buffer, truncating the oldest entries if shrinking.
pub fn set_diagnostic_buffer_size(size: usize) {
	DIAGNOSTIC_BUFFER_SIZE.with(|cell| cell.set(size));
	crate::diagnostics::resize(size);
}

pub fn diagnostic_buffer_size() -> usize {
	DIAGNOSTIC_BUFFER_SIZE.with(Cell::get)
}

/// Next monotonic sequence number for a diagnostic entry; starts at 0 after
/// a fresh process start or a [`reset`].
pub fn next_diagnostic_sequence() -> i64 {
	DIAGNOSTIC_SEQUENCE.with(|cell| {
		let next = cell.get() + 1;
		cell.set(next);
		next
	})
}

/// Mints an [`InstanceId`] for a caller with no natural identity of its own
/// (`spec.md` §4.5) — distinct from the bus-internal and token-internal
/// handle spaces, and from any id space a host maps in via `InstanceId::from_raw`.
pub fn next_synthetic_owner() -> InstanceId {
	SYNTHETIC_OWNER_COUNTER.with(|cell| {
		let raw = cell.get();
		cell.set(raw + 1);
		InstanceId::from_raw(raw)
	})
}

/// Rewinds every piece of process-wide state to its defaults: a fresh global
/// bus (no log sink, default gate, handle counter back at zero), diagnostics
/// disabled, a zeroed buffer size, and the synthetic-owner counter back at
/// zero. Message-type ids are untouched.
pub fn reset() {
	GLOBAL_BUS.with(|bus| *bus.borrow_mut() = MessageBus::new());
	DIAGNOSTICS_ENABLED.with(|flag| flag.set(false));
	DIAGNOSTIC_BUFFER_SIZE.with(|cell| cell.set(0));
	DIAGNOSTIC_SEQUENCE.with(|cell| cell.set(-1));
	SYNTHETIC_OWNER_COUNTER.with(|cell| cell.set(0));
	msgbus_core::handle_registry::reset();
	crate::diagnostics::clear();
	crate::diagnostics::resize(0);
}

#[cfg(test)]
mod tests {
	use super::*;
	use pretty_assertions::assert_eq;

	#[test]
	fn reset_replaces_the_global_bus_and_clears_counters() {
		set_diagnostics_enabled(true);
		set_diagnostic_buffer_size(64);
		next_diagnostic_sequence();
		next_synthetic_owner();
		global_bus().register_untargeted_fast::<u32>(InstanceId::from_raw(100), 0, |_| {});
		assert_eq!(global_bus().registered_counts(), (1, 0, 0));

		reset();

		assert!(!diagnostics_enabled());
		assert_eq!(diagnostic_buffer_size(), 0);
		assert_eq!(next_diagnostic_sequence(), 0);
		assert_eq!(next_synthetic_owner(), InstanceId::from_raw(0));
		assert_eq!(global_bus().registered_counts(), (0, 0, 0));
	}

	#[test]
	fn synthetic_owners_are_pairwise_distinct_until_reset() {
		reset();
		let a = next_synthetic_owner();
		let b = next_synthetic_owner();
		assert_ne!(a, b);
	}

	#[test]
	fn sink_routed_lines_reach_the_diagnostic_buffer_only_when_enabled() {
		use std::rc::Rc;

		reset();
		let bus = global_bus();
		bus.set_log_sink(Some(Rc::new(|_level, _msg: &str| {})), msgbus_core::LogLevel::Trace);
		let (_handle, mut retract) = bus.register_untargeted_fast::<u32>(InstanceId::from_raw(1), 0, |_| {});

		retract();
		retract();
		assert_eq!(crate::diagnostics::len(), 0, "diagnostics disabled: nothing buffered");

		set_diagnostics_enabled(true);
		set_diagnostic_buffer_size(8);
		retract();
		let entries = crate::diagnostics::entries();
		assert_eq!(entries.len(), 1);
		assert!(entries[0].message.contains("over-deregistration"));

		reset();
	}
}
