//! Per-owner builder API over [`crate::bus::MessageBus`] (`spec.md` §4.3).
//!
//! A token records *intent*: every `register_*` call is remembered as a
//! recipe closure, independent of whether the token is currently enabled.
//! `enable()`/`disable()` bulk-realize or bulk-retract those recipes against
//! the bound bus. Because a recipe may run again after a disable/enable
//! cycle, each user callback is wrapped in `Rc<RefCell<_>>` so the same
//! stateful closure is reused across rebinds rather than re-created.

#[cfg(test)]
mod tests;

use std::cell::{Cell, RefCell};
use std::rc::Rc;

use msgbus_core::{handle_registry, InstanceId, RegistrationHandle};
use rustc_hash::FxHashMap;

use crate::bus::{MessageBus, RetractFn};
use crate::message::Message;

/// How a token reacts to [`RegistrationToken::set_bus`] while enabled.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RebindMode {
	/// Caller is expected to `disable()`, call `set_bus`, then `enable()`
	/// themselves; `set_bus` alone does not retract or realize anything.
	Preserve,
	/// `set_bus` immediately retracts every active registration from the
	/// old bus and realizes it on the new one.
	RebindActive,
}

type Recipe = Box<dyn Fn(&MessageBus) -> RetractFn>;

/// A scoped-acquisition wrapper: retracts its registration on drop.
pub struct Disposable<'a> {
	token: &'a RegistrationToken,
	handle: RegistrationHandle,
}

impl Drop for Disposable<'_> {
	fn drop(&mut self) {
		self.token.remove_registration(self.handle);
	}
}

pub struct RegistrationToken {
	owner: InstanceId,
	bus: RefCell<MessageBus>,
	rebind_mode: Cell<RebindMode>,
	enabled: Cell<bool>,
	recipes: RefCell<FxHashMap<RegistrationHandle, Recipe>>,
	active: RefCell<FxHashMap<RegistrationHandle, RetractFn>>,
}

impl RegistrationToken {
	/// Creates a token bound to `bus`, starting disabled (`spec.md` §4.3).
	pub fn new(owner: InstanceId, bus: MessageBus, rebind_mode: RebindMode) -> Self {
		Self {
			owner,
			bus: RefCell::new(bus),
			rebind_mode: Cell::new(rebind_mode),
			enabled: Cell::new(false),
			recipes: RefCell::new(FxHashMap::default()),
			active: RefCell::new(FxHashMap::default()),
		}
	}

	pub fn owner(&self) -> InstanceId {
		self.owner
	}

	pub fn is_enabled(&self) -> bool {
		self.enabled.get()
	}

	/// Realizes every recorded-but-not-yet-active recipe against the bus.
	pub fn enable(&self) {
		if self.enabled.get() {
			return;
		}
		self.enabled.set(true);
		let bus = self.bus.borrow().clone();
		let recipes = self.recipes.borrow();
		let mut active = self.active.borrow_mut();
		for (&handle, recipe) in recipes.iter() {
			active.entry(handle).or_insert_with(|| recipe(&bus));
		}
	}

	/// Retracts every active registration without forgetting the recipes.
	pub fn disable(&self) {
		if !self.enabled.get() {
			return;
		}
		self.enabled.set(false);
		for (_, mut retract) in self.active.borrow_mut().drain() {
			retract();
		}
	}

	/// Changes how future [`Self::set_bus`] calls behave. Does not itself
	/// retract or realize anything (`SPEC_FULL.md` §10).
	pub fn set_rebind_mode(&self, mode: RebindMode) {
		self.rebind_mode.set(mode);
	}

	/// Rebinds the token to a different bus, per [`RebindMode`].
	pub fn set_bus(&self, new_bus: MessageBus) {
		match self.rebind_mode.get() {
			RebindMode::Preserve => {
				*self.bus.borrow_mut() = new_bus;
			}
			RebindMode::RebindActive => {
				let was_enabled = self.enabled.get();
				if was_enabled {
					self.disable();
				}
				*self.bus.borrow_mut() = new_bus;
				if was_enabled {
					self.enable();
				}
			}
		}
	}

	/// Removes a pending-or-active registration. Idempotent: a handle that
	/// is no longer tracked is simply a no-op (`spec.md` §4.3).
	pub fn remove_registration(&self, handle: RegistrationHandle) {
		self.recipes.borrow_mut().remove(&handle);
		if let Some(mut retract) = self.active.borrow_mut().remove(&handle) {
			retract();
		}
	}

	/// Returns a guard that calls [`Self::remove_registration`] on drop.
	pub fn as_disposable(&self, handle: RegistrationHandle) -> Disposable<'_> {
		Disposable { token: self, handle }
	}

	fn record(&self, recipe: impl Fn(&MessageBus) -> RetractFn + 'static) -> RegistrationHandle {
		let handle = handle_registry::next();
		let boxed: Recipe = Box::new(recipe);
		if self.enabled.get() {
			let retract = boxed(&self.bus.borrow());
			self.active.borrow_mut().insert(handle, retract);
		}
		self.recipes.borrow_mut().insert(handle, boxed);
		handle
	}

	// --- Untargeted ---------------------------------------------------------

	pub fn register_untargeted_fast<M: 'static>(
		&self,
		priority: i32,
		cb: impl FnMut(&mut M) + 'static,
	) -> RegistrationHandle {
		let owner = self.owner;
		let cb = Rc::new(RefCell::new(cb));
		self.record(move |bus| {
			let cb = cb.clone();
			bus.register_untargeted_fast::<M>(owner, priority, move |m| (cb.borrow_mut())(m)).1
		})
	}

	pub fn register_untargeted_action<M: 'static>(
		&self,
		priority: i32,
		cb: impl FnMut(M) + 'static,
	) -> RegistrationHandle {
		let owner = self.owner;
		let cb = Rc::new(RefCell::new(cb));
		self.record(move |bus| {
			let cb = cb.clone();
			bus.register_untargeted_action::<M>(owner, priority, move |m| (cb.borrow_mut())(m)).1
		})
	}

	pub fn register_untargeted_post_processor_fast<M: 'static>(
		&self,
		priority: i32,
		cb: impl FnMut(&mut M) + 'static,
	) -> RegistrationHandle {
		let owner = self.owner;
		let cb = Rc::new(RefCell::new(cb));
		self.record(move |bus| {
			let cb = cb.clone();
			bus.register_untargeted_post_processor_fast::<M>(owner, priority, move |m| (cb.borrow_mut())(m)).1
		})
	}

	pub fn register_untargeted_post_processor_action<M: 'static>(
		&self,
		priority: i32,
		cb: impl FnMut(M) + 'static,
	) -> RegistrationHandle {
		let owner = self.owner;
		let cb = Rc::new(RefCell::new(cb));
		self.record(move |bus| {
			let cb = cb.clone();
			bus.register_untargeted_post_processor_action::<M>(owner, priority, move |m| (cb.borrow_mut())(m)).1
		})
	}

	pub fn register_untargeted_interceptor<M: 'static>(
		&self,
		priority: i32,
		cb: impl FnMut(&mut M) -> bool + 'static,
	) -> RegistrationHandle {
		let owner = self.owner;
		let cb = Rc::new(RefCell::new(cb));
		self.record(move |bus| {
			let cb = cb.clone();
			bus.register_untargeted_interceptor::<M>(owner, priority, move |m| (cb.borrow_mut())(m)).1
		})
	}

	// --- Targeted -------------------------------------------------------

	pub fn register_targeted_by_target_fast<M: 'static>(
		&self,
		target: InstanceId,
		priority: i32,
		cb: impl FnMut(&mut InstanceId, &mut M) + 'static,
	) -> RegistrationHandle {
		let owner = self.owner;
		let cb = Rc::new(RefCell::new(cb));
		self.record(move |bus| {
			let cb = cb.clone();
			bus.register_targeted_by_target_fast::<M>(owner, target, priority, move |k, m| (cb.borrow_mut())(k, m))
				.1
		})
	}

	pub fn register_targeted_by_target_action<M: 'static>(
		&self,
		target: InstanceId,
		priority: i32,
		cb: impl FnMut(InstanceId, M) + 'static,
	) -> RegistrationHandle {
		let owner = self.owner;
		let cb = Rc::new(RefCell::new(cb));
		self.record(move |bus| {
			let cb = cb.clone();
			bus.register_targeted_by_target_action::<M>(owner, target, priority, move |k, m| (cb.borrow_mut())(k, m))
				.1
		})
	}

	pub fn register_targeted_without_targeting_fast<M: 'static>(
		&self,
		priority: i32,
		cb: impl FnMut(&mut InstanceId, &mut M) + 'static,
	) -> RegistrationHandle {
		let owner = self.owner;
		let cb = Rc::new(RefCell::new(cb));
		self.record(move |bus| {
			let cb = cb.clone();
			bus.register_targeted_without_targeting_fast::<M>(owner, priority, move |k, m| (cb.borrow_mut())(k, m)).1
		})
	}

	pub fn register_targeted_without_targeting_action<M: 'static>(
		&self,
		priority: i32,
		cb: impl FnMut(InstanceId, M) + 'static,
	) -> RegistrationHandle {
		let owner = self.owner;
		let cb = Rc::new(RefCell::new(cb));
		self.record(move |bus| {
			let cb = cb.clone();
			bus.register_targeted_without_targeting_action::<M>(owner, priority, move |k, m| (cb.borrow_mut())(k, m))
				.1
		})
	}

	pub fn register_targeted_post_processor_fast<M: 'static>(
		&self,
		target: InstanceId,
		priority: i32,
		cb: impl FnMut(&mut InstanceId, &mut M) + 'static,
	) -> RegistrationHandle {
		let owner = self.owner;
		let cb = Rc::new(RefCell::new(cb));
		self.record(move |bus| {
			let cb = cb.clone();
			bus.register_targeted_post_processor_fast::<M>(owner, target, priority, move |k, m| (cb.borrow_mut())(k, m))
				.1
		})
	}

	pub fn register_targeted_post_processor_action<M: 'static>(
		&self,
		target: InstanceId,
		priority: i32,
		cb: impl FnMut(InstanceId, M) + 'static,
	) -> RegistrationHandle {
		let owner = self.owner;
		let cb = Rc::new(RefCell::new(cb));
		self.record(move |bus| {
			let cb = cb.clone();
			bus.register_targeted_post_processor_action::<M>(owner, target, priority, move |k, m| {
				(cb.borrow_mut())(k, m)
			})
			.1
		})
	}

	pub fn register_targeted_without_targeting_post_processor_fast<M: 'static>(
		&self,
		priority: i32,
		cb: impl FnMut(&mut InstanceId, &mut M) + 'static,
	) -> RegistrationHandle {
		let owner = self.owner;
		let cb = Rc::new(RefCell::new(cb));
		self.record(move |bus| {
			let cb = cb.clone();
			bus.register_targeted_without_targeting_post_processor_fast::<M>(owner, priority, move |k, m| {
				(cb.borrow_mut())(k, m)
			})
			.1
		})
	}

	pub fn register_targeted_without_targeting_post_processor_action<M: 'static>(
		&self,
		priority: i32,
		cb: impl FnMut(InstanceId, M) + 'static,
	) -> RegistrationHandle {
		let owner = self.owner;
		let cb = Rc::new(RefCell::new(cb));
		self.record(move |bus| {
			let cb = cb.clone();
			bus.register_targeted_without_targeting_post_processor_action::<M>(owner, priority, move |k, m| {
				(cb.borrow_mut())(k, m)
			})
			.1
		})
	}

	pub fn register_targeted_interceptor<M: 'static>(
		&self,
		priority: i32,
		cb: impl FnMut(&mut InstanceId, &mut M) -> bool + 'static,
	) -> RegistrationHandle {
		let owner = self.owner;
		let cb = Rc::new(RefCell::new(cb));
		self.record(move |bus| {
			let cb = cb.clone();
			bus.register_targeted_interceptor::<M>(owner, priority, move |k, m| (cb.borrow_mut())(k, m)).1
		})
	}

	// --- Broadcast --------------------------------------------------------

	pub fn register_broadcast_by_source_fast<M: 'static>(
		&self,
		source: InstanceId,
		priority: i32,
		cb: impl FnMut(&mut InstanceId, &mut M) + 'static,
	) -> RegistrationHandle {
		let owner = self.owner;
		let cb = Rc::new(RefCell::new(cb));
		self.record(move |bus| {
			let cb = cb.clone();
			bus.register_broadcast_by_source_fast::<M>(owner, source, priority, move |k, m| (cb.borrow_mut())(k, m))
				.1
		})
	}

	pub fn register_broadcast_by_source_action<M: 'static>(
		&self,
		source: InstanceId,
		priority: i32,
		cb: impl FnMut(InstanceId, M) + 'static,
	) -> RegistrationHandle {
		let owner = self.owner;
		let cb = Rc::new(RefCell::new(cb));
		self.record(move |bus| {
			let cb = cb.clone();
			bus.register_broadcast_by_source_action::<M>(owner, source, priority, move |k, m| (cb.borrow_mut())(k, m))
				.1
		})
	}

	pub fn register_broadcast_without_source_fast<M: 'static>(
		&self,
		priority: i32,
		cb: impl FnMut(&mut InstanceId, &mut M) + 'static,
	) -> RegistrationHandle {
		let owner = self.owner;
		let cb = Rc::new(RefCell::new(cb));
		self.record(move |bus| {
			let cb = cb.clone();
			bus.register_broadcast_without_source_fast::<M>(owner, priority, move |k, m| (cb.borrow_mut())(k, m)).1
		})
	}

	pub fn register_broadcast_without_source_action<M: 'static>(
		&self,
		priority: i32,
		cb: impl FnMut(InstanceId, M) + 'static,
	) -> RegistrationHandle {
		let owner = self.owner;
		let cb = Rc::new(RefCell::new(cb));
		self.record(move |bus| {
			let cb = cb.clone();
			bus.register_broadcast_without_source_action::<M>(owner, priority, move |k, m| (cb.borrow_mut())(k, m)).1
		})
	}

	pub fn register_broadcast_post_processor_fast<M: 'static>(
		&self,
		source: InstanceId,
		priority: i32,
		cb: impl FnMut(&mut InstanceId, &mut M) + 'static,
	) -> RegistrationHandle {
		let owner = self.owner;
		let cb = Rc::new(RefCell::new(cb));
		self.record(move |bus| {
			let cb = cb.clone();
			bus.register_broadcast_post_processor_fast::<M>(owner, source, priority, move |k, m| {
				(cb.borrow_mut())(k, m)
			})
			.1
		})
	}

	pub fn register_broadcast_post_processor_action<M: 'static>(
		&self,
		source: InstanceId,
		priority: i32,
		cb: impl FnMut(InstanceId, M) + 'static,
	) -> RegistrationHandle {
		let owner = self.owner;
		let cb = Rc::new(RefCell::new(cb));
		self.record(move |bus| {
			let cb = cb.clone();
			bus.register_broadcast_post_processor_action::<M>(owner, source, priority, move |k, m| {
				(cb.borrow_mut())(k, m)
			})
			.1
		})
	}

	pub fn register_broadcast_without_source_post_processor_fast<M: 'static>(
		&self,
		priority: i32,
		cb: impl FnMut(&mut InstanceId, &mut M) + 'static,
	) -> RegistrationHandle {
		let owner = self.owner;
		let cb = Rc::new(RefCell::new(cb));
		self.record(move |bus| {
			let cb = cb.clone();
			bus.register_broadcast_without_source_post_processor_fast::<M>(owner, priority, move |k, m| {
				(cb.borrow_mut())(k, m)
			})
			.1
		})
	}

	pub fn register_broadcast_without_source_post_processor_action<M: 'static>(
		&self,
		priority: i32,
		cb: impl FnMut(InstanceId, M) + 'static,
	) -> RegistrationHandle {
		let owner = self.owner;
		let cb = Rc::new(RefCell::new(cb));
		self.record(move |bus| {
			let cb = cb.clone();
			bus.register_broadcast_without_source_post_processor_action::<M>(owner, priority, move |k, m| {
				(cb.borrow_mut())(k, m)
			})
			.1
		})
	}

	pub fn register_broadcast_interceptor<M: 'static>(
		&self,
		priority: i32,
		cb: impl FnMut(&mut InstanceId, &mut M) -> bool + 'static,
	) -> RegistrationHandle {
		let owner = self.owner;
		let cb = Rc::new(RefCell::new(cb));
		self.record(move |bus| {
			let cb = cb.clone();
			bus.register_broadcast_interceptor::<M>(owner, priority, move |k, m| (cb.borrow_mut())(k, m)).1
		})
	}

	// --- GlobalAcceptAll ----------------------------------------------------

	/// Any of the three callbacks may be omitted; an omitted slot stays
	/// `None` all the way down to the bus, so `MessageBus::global_routing_counts`
	/// only credits categories this registration actually handles.
	#[allow(clippy::type_complexity)]
	pub fn register_global_accept_all_fast(
		&self,
		priority: i32,
		untargeted: Option<Box<dyn FnMut(&mut dyn Message)>>,
		targeted: Option<Box<dyn FnMut(&mut InstanceId, &mut dyn Message)>>,
		broadcast: Option<Box<dyn FnMut(&mut InstanceId, &mut dyn Message)>>,
	) -> RegistrationHandle {
		let owner = self.owner;
		let untargeted = untargeted.map(|cb| Rc::new(RefCell::new(cb)));
		let targeted = targeted.map(|cb| Rc::new(RefCell::new(cb)));
		let broadcast = broadcast.map(|cb| Rc::new(RefCell::new(cb)));
		self.record(move |bus| {
			let untargeted = untargeted.clone();
			let targeted = targeted.clone();
			let broadcast = broadcast.clone();
			bus.register_global_accept_all_fast(
				owner,
				priority,
				untargeted.map(|cb| -> Box<dyn FnMut(&mut dyn Message)> { Box::new(move |m| (cb.borrow_mut())(m)) }),
				targeted.map(|cb| -> Box<dyn FnMut(&mut InstanceId, &mut dyn Message)> {
					Box::new(move |k, m| (cb.borrow_mut())(k, m))
				}),
				broadcast.map(|cb| -> Box<dyn FnMut(&mut InstanceId, &mut dyn Message)> {
					Box::new(move |k, m| (cb.borrow_mut())(k, m))
				}),
			)
			.1
		})
	}

	#[allow(clippy::type_complexity)]
	pub fn register_global_accept_all_action(
		&self,
		priority: i32,
		untargeted: Option<Box<dyn FnMut(Box<dyn Message>)>>,
		targeted: Option<Box<dyn FnMut(InstanceId, Box<dyn Message>)>>,
		broadcast: Option<Box<dyn FnMut(InstanceId, Box<dyn Message>)>>,
	) -> RegistrationHandle {
		let owner = self.owner;
		let untargeted = untargeted.map(|cb| Rc::new(RefCell::new(cb)));
		let targeted = targeted.map(|cb| Rc::new(RefCell::new(cb)));
		let broadcast = broadcast.map(|cb| Rc::new(RefCell::new(cb)));
		self.record(move |bus| {
			let untargeted = untargeted.clone();
			let targeted = targeted.clone();
			let broadcast = broadcast.clone();
			bus.register_global_accept_all_action(
				owner,
				priority,
				untargeted.map(|cb| -> Box<dyn FnMut(Box<dyn Message>)> { Box::new(move |m| (cb.borrow_mut())(m)) }),
				targeted.map(|cb| -> Box<dyn FnMut(InstanceId, Box<dyn Message>)> {
					Box::new(move |k, m| (cb.borrow_mut())(k, m))
				}),
				broadcast.map(|cb| -> Box<dyn FnMut(InstanceId, Box<dyn Message>)> {
					Box::new(move |k, m| (cb.borrow_mut())(k, m))
				}),
			)
			.1
		})
	}
}
