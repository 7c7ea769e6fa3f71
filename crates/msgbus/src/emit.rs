//! Free emission functions (`spec.md` §4.4): the ergonomic entry points most
//! callers use instead of reaching for a [`MessageBus`] directly.
//!
//! Each category has a global variant, which emits on the process-wide bus
//! from [`crate::state`], and an `_on` variant that takes an explicit bus —
//! the one path a host with more than one bus (tests, sub-simulations) needs.

use msgbus_core::{BusError, InstanceId};

use crate::bus::MessageBus;
use crate::state;

/// Resolves a host-side reference to an [`InstanceId`].
///
/// Implemented for `InstanceId` itself so the typed emission functions also
/// accept a bare id. A host integration (a scene-graph node, an entity
/// handle, ...) implements this for its own reference type and returns
/// `None` for a null or dead reference — which aborts the emission with
/// [`BusError::InvalidTarget`] *before* the bus is ever touched.
pub trait AsInstanceId {
	fn as_instance_id(&self) -> Option<InstanceId>;
}

impl AsInstanceId for InstanceId {
	fn as_instance_id(&self) -> Option<InstanceId> {
		Some(*self)
	}
}

/// Emits `msg` as an untargeted message on the process-wide bus.
pub fn emit_untargeted<M: Clone + 'static>(msg: &mut M) {
	emit_untargeted_on(&state::global_bus(), msg);
}

/// Emits `msg` as an untargeted message on an explicit `bus`.
pub fn emit_untargeted_on<M: Clone + 'static>(bus: &MessageBus, msg: &mut M) {
	bus.emit_untargeted(msg);
}

/// Emits `msg` at `target` on the process-wide bus.
///
/// Returns `Err(BusError::InvalidTarget)` without touching the bus if
/// `target` does not resolve to an [`InstanceId`].
pub fn emit_targeted<M: Clone + 'static>(msg: &mut M, target: impl AsInstanceId) -> Result<(), BusError> {
	emit_targeted_on(&state::global_bus(), msg, target)
}

pub fn emit_targeted_on<M: Clone + 'static>(bus: &MessageBus, msg: &mut M, target: impl AsInstanceId) -> Result<(), BusError> {
	let target = target.as_instance_id().ok_or(BusError::InvalidTarget)?;
	bus.emit_targeted(msg, target);
	Ok(())
}

/// Emits `msg` from `source` as a broadcast on the process-wide bus.
///
/// Returns `Err(BusError::InvalidTarget)` without touching the bus if
/// `source` does not resolve to an [`InstanceId`].
pub fn emit_broadcast<M: Clone + 'static>(msg: &mut M, source: impl AsInstanceId) -> Result<(), BusError> {
	emit_broadcast_on(&state::global_bus(), msg, source)
}

pub fn emit_broadcast_on<M: Clone + 'static>(bus: &MessageBus, msg: &mut M, source: impl AsInstanceId) -> Result<(), BusError> {
	let source = source.as_instance_id().ok_or(BusError::InvalidTarget)?;
	bus.emit_broadcast(msg, source);
	Ok(())
}

#[cfg(test)]
mod tests {
	use super::*;
	use pretty_assertions::assert_eq;
	use std::cell::RefCell;
	use std::rc::Rc;

	#[derive(Debug, Clone)]
	struct Ping(u32);

	/// A host reference that is sometimes dead, standing in for e.g. a
	/// scene-graph handle that has outlived its node.
	struct HostRef(Option<u64>);

	impl AsInstanceId for HostRef {
		fn as_instance_id(&self) -> Option<InstanceId> {
			self.0.map(InstanceId::from_raw)
		}
	}

	#[test]
	fn emit_targeted_on_reaches_the_registered_handler() {
		let bus = MessageBus::new();
		let seen = Rc::new(RefCell::new(0u32));
		{
			let seen = seen.clone();
			bus.register_targeted_by_target_fast::<Ping>(InstanceId::from_raw(100), InstanceId::from_raw(1), 0, move |_target, msg| {
				*seen.borrow_mut() += msg.0;
			});
		}
		emit_targeted_on(&bus, &mut Ping(5), InstanceId::from_raw(1)).unwrap();
		assert_eq!(*seen.borrow(), 5);
	}

	#[test]
	fn emit_targeted_on_rejects_an_unresolvable_host_reference_without_touching_the_bus() {
		let bus = MessageBus::new();
		bus.register_targeted_by_target_fast::<Ping>(InstanceId::from_raw(100), InstanceId::from_raw(1), 0, |_target, _msg| {
			panic!("handler must not run when the target reference is dead");
		});
		let err = emit_targeted_on(&bus, &mut Ping(1), HostRef(None)).unwrap_err();
		assert_eq!(err, BusError::InvalidTarget);
	}

	#[test]
	fn emit_broadcast_on_resolves_a_live_host_reference() {
		let bus = MessageBus::new();
		let seen = Rc::new(RefCell::new(0u32));
		{
			let seen = seen.clone();
			bus.register_broadcast_by_source_fast::<Ping>(InstanceId::from_raw(100), InstanceId::from_raw(9), 0, move |_source, msg| {
				*seen.borrow_mut() += msg.0;
			});
		}
		emit_broadcast_on(&bus, &mut Ping(3), HostRef(Some(9))).unwrap();
		assert_eq!(*seen.borrow(), 3);
	}

	#[test]
	fn emit_untargeted_on_does_not_require_target_resolution() {
		let bus = MessageBus::new();
		let seen = Rc::new(RefCell::new(0u32));
		{
			let seen = seen.clone();
			bus.register_untargeted_fast::<Ping>(InstanceId::from_raw(100), 0, move |msg| *seen.borrow_mut() += msg.0);
		}
		emit_untargeted_on(&bus, &mut Ping(2));
		assert_eq!(*seen.borrow(), 2);
	}

	#[test]
	fn emit_untargeted_reaches_the_process_global_bus() {
		crate::state::reset();
		let seen = Rc::new(RefCell::new(0u32));
		{
			let seen = seen.clone();
			crate::state::global_bus().register_untargeted_fast::<Ping>(InstanceId::from_raw(100), 0, move |msg| *seen.borrow_mut() += msg.0);
		}
		emit_untargeted(&mut Ping(4));
		assert_eq!(*seen.borrow(), 4);
		crate::state::reset();
	}
}
