//! The diagnostic log buffer (`spec.md` §6, `SPEC_FULL.md` §13): a
//! fixed-capacity FIFO of recent sink-routed log lines, kept alongside the
//! pluggable sink itself so a host without its own log aggregation can still
//! inspect recent `OverDeregistration`/`InvalidRegistration`/reflexive-dispatch
//! events.
//!
//! Capacity is driven entirely by [`crate::state::set_diagnostic_buffer_size`];
//! this module only owns the buffer storage and the sequence numbering.

use std::cell::RefCell;

use msgbus_core::{CyclicBuffer, LogLevel};

thread_local! {
	static BUFFER: RefCell<CyclicBuffer<DiagnosticEntry>> = RefCell::new(CyclicBuffer::new(0));
}

/// One buffered log line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiagnosticEntry {
	pub sequence: i64,
	pub level: LogLevel,
	pub message: String,
}

/// Appends `message` at the next sequence number. Called from
/// `bus::BusInner::log` only when a sink is installed and diagnostics are
/// enabled (`SPEC_FULL.md` §13).
pub(crate) fn record(level: LogLevel, message: String) {
	let sequence = crate::state::next_diagnostic_sequence();
	BUFFER.with(|buffer| buffer.borrow_mut().add(DiagnosticEntry { sequence, level, message }));
}

/// Applies a new capacity from [`crate::state::set_diagnostic_buffer_size`].
pub(crate) fn resize(capacity: usize) {
	BUFFER.with(|buffer| buffer.borrow_mut().resize(capacity));
}

/// Drops every buffered entry without touching capacity, used by
/// [`crate::state::reset`].
pub(crate) fn clear() {
	BUFFER.with(|buffer| {
		let capacity = buffer.borrow().capacity();
		*buffer.borrow_mut() = CyclicBuffer::new(capacity);
	});
}

/// Current number of buffered entries.
pub fn len() -> usize {
	BUFFER.with(|buffer| buffer.borrow().len())
}

/// Snapshot of every buffered entry, oldest first.
pub fn entries() -> Vec<DiagnosticEntry> {
	BUFFER.with(|buffer| buffer.borrow().iter().cloned().collect())
}

#[cfg(test)]
mod tests {
	use super::*;
	use pretty_assertions::assert_eq;

	#[test]
	fn resize_to_zero_then_back_up_preserves_only_what_still_fits() {
		resize(2);
		record(LogLevel::Warn, "a".to_string());
		record(LogLevel::Warn, "b".to_string());
		record(LogLevel::Warn, "c".to_string());
		let snapshot = entries();
		assert_eq!(snapshot.len(), 2);
		assert_eq!(snapshot[0].message, "b");
		assert_eq!(snapshot[1].message, "c");

		clear();
		assert_eq!(len(), 0);
		resize(0);
	}

	#[test]
	fn sequence_numbers_are_monotonic_across_entries() {
		resize(8);
		record(LogLevel::Info, "first".to_string());
		record(LogLevel::Info, "second".to_string());
		let snapshot = entries();
		assert!(snapshot[1].sequence > snapshot[0].sequence);
		clear();
		resize(0);
	}
}
