//! Single process-wide source of [`RegistrationHandle`]s.
//!
//! `spec.md` §4.5 frames the "next handle counter" as one singular,
//! resettable counter. Every `MessageBus` and every `RegistrationToken`
//! draws from this one `thread_local!` instance regardless of which bus it
//! is bound to — two independent counters would let a token-issued handle
//! and a bus-issued handle collide on the same integer while identifying
//! different registrations (invariant 12).

use crate::handle::{HandleCounter, RegistrationHandle};

thread_local! {
	static COUNTER: HandleCounter = const { HandleCounter::new() };
}

/// Issues the next globally-unique handle.
pub fn next() -> RegistrationHandle {
	COUNTER.with(HandleCounter::next)
}

/// Rewinds the counter to zero. Reachable only through a process-wide reset.
pub fn reset() {
	COUNTER.with(HandleCounter::reset)
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn issues_pairwise_distinct_handles_until_reset() {
		reset();
		let a = next();
		let b = next();
		assert_ne!(a, b);
		reset();
		let after_reset = next();
		assert_eq!(a, after_reset);
	}
}
