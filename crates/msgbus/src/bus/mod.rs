//! The dispatcher: owns every registration table and runs the five-stage
//! emission pipeline (`spec.md` §4.1).
//!
//! Every table is keyed by a dense [`MessageTypeId`] rather than by
//! `TypeId` directly — see `msgbus_core::type_registry`. `GlobalAcceptAll`
//! is the one exception: it lives directly on [`BusInner`], not inside a
//! per-type channel, since a single entry observes every type.


use std::any::Any;
use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;

use msgbus_core::{handle_registry, type_registry, InstanceId, LogLevel, LogSink, MessageTypeId, RegistrationHandle};
use rustc_hash::FxHashMap;

use crate::message::Message;
use crate::mode::Mode;
use crate::priority_list::{Entries, ListEntry, PrioritizedList};
use crate::registration::{
	GlobalActionCallbacks, GlobalEntry, GlobalFastCallbacks, InterceptorCallback, KeyedCallback,
	KeyedInterceptorCallback, UntargetedCallback,
};

/// Returned by every `register_*` call. First invocation retracts the
/// registration; every later invocation logs an over-deregistration and
/// otherwise does nothing.
pub type RetractFn = Box<dyn FnMut()>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum CounterKind {
	Untargeted,
	Targeted,
	Broadcast,
}

struct TypedChannel<M> {
	untargeted: PrioritizedList<UntargetedCallback<M>>,
	targeted_by_target: FxHashMap<InstanceId, PrioritizedList<KeyedCallback<M>>>,
	targeted_without_targeting: PrioritizedList<KeyedCallback<M>>,
	broadcast_by_source: FxHashMap<InstanceId, PrioritizedList<KeyedCallback<M>>>,
	broadcast_without_source: PrioritizedList<KeyedCallback<M>>,

	untargeted_pp: PrioritizedList<UntargetedCallback<M>>,
	targeted_pp_by_target: FxHashMap<InstanceId, PrioritizedList<KeyedCallback<M>>>,
	targeted_pp_without_targeting: PrioritizedList<KeyedCallback<M>>,
	broadcast_pp_by_source: FxHashMap<InstanceId, PrioritizedList<KeyedCallback<M>>>,
	broadcast_pp_without_source: PrioritizedList<KeyedCallback<M>>,

	interceptors_untargeted: PrioritizedList<InterceptorCallback<M>>,
	interceptors_targeted: PrioritizedList<KeyedInterceptorCallback<M>>,
	interceptors_broadcast: PrioritizedList<KeyedInterceptorCallback<M>>,
}

impl<M> Default for TypedChannel<M> {
	fn default() -> Self {
		Self {
			untargeted: PrioritizedList::new(),
			targeted_by_target: FxHashMap::default(),
			targeted_without_targeting: PrioritizedList::new(),
			broadcast_by_source: FxHashMap::default(),
			broadcast_without_source: PrioritizedList::new(),
			untargeted_pp: PrioritizedList::new(),
			targeted_pp_by_target: FxHashMap::default(),
			targeted_pp_without_targeting: PrioritizedList::new(),
			broadcast_pp_by_source: FxHashMap::default(),
			broadcast_pp_without_source: PrioritizedList::new(),
			interceptors_untargeted: PrioritizedList::new(),
			interceptors_targeted: PrioritizedList::new(),
			interceptors_broadcast: PrioritizedList::new(),
		}
	}
}

type ListAccessor<M, T> = fn(&mut TypedChannel<M>) -> &mut PrioritizedList<T>;
type MapAccessor<M, T> = fn(&mut TypedChannel<M>) -> &mut FxHashMap<InstanceId, PrioritizedList<T>>;

fn acc_untargeted<M>(c: &mut TypedChannel<M>) -> &mut PrioritizedList<UntargetedCallback<M>> {
	&mut c.untargeted
}
fn acc_untargeted_pp<M>(c: &mut TypedChannel<M>) -> &mut PrioritizedList<UntargetedCallback<M>> {
	&mut c.untargeted_pp
}
fn acc_targeted_by_target<M>(c: &mut TypedChannel<M>) -> &mut FxHashMap<InstanceId, PrioritizedList<KeyedCallback<M>>> {
	&mut c.targeted_by_target
}
fn acc_targeted_without_targeting<M>(c: &mut TypedChannel<M>) -> &mut PrioritizedList<KeyedCallback<M>> {
	&mut c.targeted_without_targeting
}
fn acc_targeted_pp_by_target<M>(c: &mut TypedChannel<M>) -> &mut FxHashMap<InstanceId, PrioritizedList<KeyedCallback<M>>> {
	&mut c.targeted_pp_by_target
}
fn acc_targeted_pp_without_targeting<M>(c: &mut TypedChannel<M>) -> &mut PrioritizedList<KeyedCallback<M>> {
	&mut c.targeted_pp_without_targeting
}
fn acc_broadcast_by_source<M>(c: &mut TypedChannel<M>) -> &mut FxHashMap<InstanceId, PrioritizedList<KeyedCallback<M>>> {
	&mut c.broadcast_by_source
}
fn acc_broadcast_without_source<M>(c: &mut TypedChannel<M>) -> &mut PrioritizedList<KeyedCallback<M>> {
	&mut c.broadcast_without_source
}
fn acc_broadcast_pp_by_source<M>(c: &mut TypedChannel<M>) -> &mut FxHashMap<InstanceId, PrioritizedList<KeyedCallback<M>>> {
	&mut c.broadcast_pp_by_source
}
fn acc_broadcast_pp_without_source<M>(c: &mut TypedChannel<M>) -> &mut PrioritizedList<KeyedCallback<M>> {
	&mut c.broadcast_pp_without_source
}
fn acc_interceptors_untargeted<M>(c: &mut TypedChannel<M>) -> &mut PrioritizedList<InterceptorCallback<M>> {
	&mut c.interceptors_untargeted
}
fn acc_interceptors_targeted<M>(c: &mut TypedChannel<M>) -> &mut PrioritizedList<KeyedInterceptorCallback<M>> {
	&mut c.interceptors_targeted
}
fn acc_interceptors_broadcast<M>(c: &mut TypedChannel<M>) -> &mut PrioritizedList<KeyedInterceptorCallback<M>> {
	&mut c.interceptors_broadcast
}

#[derive(Default)]
struct GlobalRoutingCounts {
	untargeted: u64,
	targeted: u64,
	broadcast: u64,
}

struct BusInner {
	channels: FxHashMap<MessageTypeId, Box<dyn Any>>,
	global_accept_all: PrioritizedList<GlobalEntry>,
	registered_untargeted: u64,
	registered_targeted: u64,
	registered_broadcast: u64,
	global_routing: GlobalRoutingCounts,
	prefreeze_counts: FxHashMap<(MessageTypeId, i32), u64>,
	log_sink: Option<LogSink>,
	log_gate: LogLevel,
	reflexive_warned: bool,
}

impl BusInner {
	fn new() -> Self {
		Self {
			channels: FxHashMap::default(),
			global_accept_all: PrioritizedList::new(),
			registered_untargeted: 0,
			registered_targeted: 0,
			registered_broadcast: 0,
			global_routing: GlobalRoutingCounts::default(),
			prefreeze_counts: FxHashMap::default(),
			log_sink: None,
			log_gate: LogLevel::Warn,
			reflexive_warned: false,
		}
	}

	fn bump_counter(&mut self, kind: CounterKind, delta: i64) {
		let counter = match kind {
			CounterKind::Untargeted => &mut self.registered_untargeted,
			CounterKind::Targeted => &mut self.registered_targeted,
			CounterKind::Broadcast => &mut self.registered_broadcast,
		};
		if delta >= 0 {
			*counter += delta as u64;
		} else {
			*counter = counter.saturating_sub((-delta) as u64);
		}
	}

	/// Routes to the pluggable sink if one is installed and `level` clears
	/// the gate; when it does, also appends to the diagnostic buffer if
	/// diagnostics are enabled (`SPEC_FULL.md` §13).
	fn log(&self, level: LogLevel, args: fmt::Arguments<'_>) {
		if level < self.log_gate {
			return;
		}
		let Some(sink) = self.log_sink.as_ref() else {
			return;
		};
		let message = args.to_string();
		sink(level, &message);
		if crate::state::diagnostics_enabled() {
			crate::diagnostics::record(level, message);
		}
	}
}

/// The dispatcher. Cheap to clone — every clone shares the same table via
/// `Rc<RefCell<_>>`, matching the single-threaded, re-entrancy-friendly
/// concurrency model in `spec.md` §5 (no `Arc`/`Mutex`, which would
/// deadlock a handler that emits from inside its own callback).
#[derive(Clone)]
pub struct MessageBus(Rc<RefCell<BusInner>>);

impl Default for MessageBus {
	fn default() -> Self {
		Self::new()
	}
}

impl MessageBus {
	pub fn new() -> Self {
		Self(Rc::new(RefCell::new(BusInner::new())))
	}

	/// Installs the host-observable log sink and the minimum level it receives.
	pub fn set_log_sink(&self, sink: Option<LogSink>, gate: LogLevel) {
		let mut inner = self.0.borrow_mut();
		inner.log_sink = sink;
		inner.log_gate = gate;
	}

	/// Number of currently live handler registrations per category
	/// (`spec.md` §8 invariant 14). Interceptors, post-processors, and
	/// `GlobalAcceptAll` are not counted.
	pub fn registered_counts(&self) -> (u64, u64, u64) {
		let inner = self.0.borrow();
		(inner.registered_untargeted, inner.registered_targeted, inner.registered_broadcast)
	}

	/// How many times a `GlobalAcceptAll` callback fired for each category,
	/// cumulative across every emission (`spec.md` §8 invariant 11 / S7).
	pub fn global_routing_counts(&self) -> (u64, u64, u64) {
		let routing = &self.0.borrow().global_routing;
		(routing.untargeted, routing.targeted, routing.broadcast)
	}

	/// Logs `ReflexiveDispatchUnresolved` at Warn, once per bus (`spec.md`
	/// §4.2, §7). The reflexive-dispatch feature itself is out of scope.
	pub fn log_reflexive_dispatch_unresolved(&self, method_name: &str) {
		let mut inner = self.0.borrow_mut();
		if inner.reflexive_warned {
			return;
		}
		inner.reflexive_warned = true;
		inner.log(
			LogLevel::Warn,
			format_args!("reflexive dispatch unresolved: method `{method_name}` not found on owner"),
		);
	}

	/// How many prefreeze passes have run for `(type, priority)`
	/// (`spec.md` §8 invariant 16).
	pub fn prefreeze_count(&self, type_id: MessageTypeId, priority: i32) -> u64 {
		self.0
			.borrow()
			.prefreeze_counts
			.get(&(type_id, priority))
			.copied()
			.unwrap_or(0)
	}

	fn with_channel_mut<M: 'static, R>(&self, f: impl FnOnce(&mut TypedChannel<M>) -> R) -> R {
		let type_id = type_registry::id_of::<M>();
		let mut inner = self.0.borrow_mut();
		let boxed = inner
			.channels
			.entry(type_id)
			.or_insert_with(|| Box::new(TypedChannel::<M>::default()));
		let channel = boxed
			.downcast_mut::<TypedChannel<M>>()
			.expect("channel type map invariant: id always maps to TypedChannel<M>");
		f(channel)
	}

	fn snapshot_list<M: 'static, T: 'static>(&self, accessor: ListAccessor<M, T>) -> Entries<T> {
		self.with_channel_mut::<M, _>(|channel| accessor(channel).snapshot())
	}

	fn snapshot_map<M: 'static, T: 'static>(
		&self,
		accessor: MapAccessor<M, T>,
		key: InstanceId,
	) -> Entries<T> {
		self.with_channel_mut::<M, _>(|channel| {
			accessor(channel).get(&key).map(PrioritizedList::snapshot).unwrap_or_default()
		})
	}

	/// Bumps the prefreeze counter once per distinct priority, not once per
	/// post-processor entry: two post-processors sharing a priority still
	/// count as a single prefreeze for that `(type, priority)` this emission.
	fn record_prefreeze(&self, type_id: MessageTypeId, priorities: impl Iterator<Item = i32>) {
		let distinct: std::collections::HashSet<i32> = priorities.collect();
		let mut inner = self.0.borrow_mut();
		for priority in distinct {
			*inner.prefreeze_counts.entry((type_id, priority)).or_insert(0) += 1;
		}
	}

	fn insert_list<M: 'static, T: 'static>(
		&self,
		accessor: ListAccessor<M, T>,
		counter: Option<CounterKind>,
		owner: InstanceId,
		priority: i32,
		mode: Mode,
		payload: T,
	) -> (RegistrationHandle, RetractFn) {
		let handle = handle_registry::next();
		self.with_channel_mut::<M, _>(|channel| {
			accessor(channel).insert(handle, owner, priority, mode, payload);
		});
		if let Some(kind) = counter {
			self.0.borrow_mut().bump_counter(kind, 1);
		}
		(handle, self.retract_list::<M, T>(accessor, counter, handle))
	}

	fn retract_list<M: 'static, T: 'static>(
		&self,
		accessor: ListAccessor<M, T>,
		counter: Option<CounterKind>,
		handle: RegistrationHandle,
	) -> RetractFn {
		let bus = self.clone();
		let mut done = false;
		Box::new(move || {
			if done {
				bus.0.borrow().log(LogLevel::Error, format_args!("over-deregistration of {handle}"));
				return;
			}
			done = true;
			let removed = bus.with_channel_mut::<M, _>(|channel| accessor(channel).remove(handle));
			if removed {
				if let Some(kind) = counter {
					bus.0.borrow_mut().bump_counter(kind, -1);
				}
			} else {
				bus.0.borrow().log(LogLevel::Warn, format_args!("invalid registration retract for {handle}"));
			}
		})
	}

	fn insert_map<M: 'static, T: 'static>(
		&self,
		accessor: MapAccessor<M, T>,
		counter: Option<CounterKind>,
		key: InstanceId,
		owner: InstanceId,
		priority: i32,
		mode: Mode,
		payload: T,
	) -> (RegistrationHandle, RetractFn) {
		let handle = handle_registry::next();
		self.with_channel_mut::<M, _>(|channel| {
			accessor(channel).entry(key).or_default().insert(handle, owner, priority, mode, payload);
		});
		if let Some(kind) = counter {
			self.0.borrow_mut().bump_counter(kind, 1);
		}
		(handle, self.retract_map::<M, T>(accessor, counter, key, handle))
	}

	fn retract_map<M: 'static, T: 'static>(
		&self,
		accessor: MapAccessor<M, T>,
		counter: Option<CounterKind>,
		key: InstanceId,
		handle: RegistrationHandle,
	) -> RetractFn {
		let bus = self.clone();
		let mut done = false;
		Box::new(move || {
			if done {
				bus.0.borrow().log(LogLevel::Error, format_args!("over-deregistration of {handle}"));
				return;
			}
			done = true;
			let removed = bus.with_channel_mut::<M, _>(|channel| {
				accessor(channel).get_mut(&key).map(|list| list.remove(handle)).unwrap_or(false)
			});
			if removed {
				if let Some(kind) = counter {
					bus.0.borrow_mut().bump_counter(kind, -1);
				}
			} else {
				bus.0.borrow().log(LogLevel::Warn, format_args!("invalid registration retract for {handle}"));
			}
		})
	}

	// --- Untargeted -------------------------------------------------------

	pub fn register_untargeted_fast<M: 'static>(
		&self,
		owner: InstanceId,
		priority: i32,
		cb: impl FnMut(&mut M) + 'static,
	) -> (RegistrationHandle, RetractFn) {
		self.insert_list::<M, _>(
			acc_untargeted::<M>,
			Some(CounterKind::Untargeted),
			owner,
			priority,
			Mode::Fast,
			UntargetedCallback::Fast(RefCell::new(Box::new(cb))),
		)
	}

	pub fn register_untargeted_action<M: 'static>(
		&self,
		owner: InstanceId,
		priority: i32,
		cb: impl FnMut(M) + 'static,
	) -> (RegistrationHandle, RetractFn) {
		self.insert_list::<M, _>(
			acc_untargeted::<M>,
			Some(CounterKind::Untargeted),
			owner,
			priority,
			Mode::Action,
			UntargetedCallback::Action(RefCell::new(Box::new(cb))),
		)
	}

	pub fn register_untargeted_post_processor_fast<M: 'static>(
		&self,
		owner: InstanceId,
		priority: i32,
		cb: impl FnMut(&mut M) + 'static,
	) -> (RegistrationHandle, RetractFn) {
		self.insert_list::<M, _>(
			acc_untargeted_pp::<M>,
			None,
			owner,
			priority,
			Mode::Fast,
			UntargetedCallback::Fast(RefCell::new(Box::new(cb))),
		)
	}

	pub fn register_untargeted_post_processor_action<M: 'static>(
		&self,
		owner: InstanceId,
		priority: i32,
		cb: impl FnMut(M) + 'static,
	) -> (RegistrationHandle, RetractFn) {
		self.insert_list::<M, _>(
			acc_untargeted_pp::<M>,
			None,
			owner,
			priority,
			Mode::Action,
			UntargetedCallback::Action(RefCell::new(Box::new(cb))),
		)
	}

	pub fn register_untargeted_interceptor<M: 'static>(
		&self,
		owner: InstanceId,
		priority: i32,
		cb: impl FnMut(&mut M) -> bool + 'static,
	) -> (RegistrationHandle, RetractFn) {
		self.insert_list::<M, _>(
			acc_interceptors_untargeted::<M>,
			None,
			owner,
			priority,
			Mode::Fast,
			InterceptorCallback(RefCell::new(Box::new(cb))),
		)
	}

	// --- Targeted -----------------------------------------------------------

	pub fn register_targeted_by_target_fast<M: 'static>(
		&self,
		owner: InstanceId,
		target: InstanceId,
		priority: i32,
		cb: impl FnMut(&mut InstanceId, &mut M) + 'static,
	) -> (RegistrationHandle, RetractFn) {
		self.insert_map::<M, _>(
			acc_targeted_by_target::<M>,
			Some(CounterKind::Targeted),
			target,
			owner,
			priority,
			Mode::Fast,
			KeyedCallback::Fast(RefCell::new(Box::new(cb))),
		)
	}

	pub fn register_targeted_by_target_action<M: 'static>(
		&self,
		owner: InstanceId,
		target: InstanceId,
		priority: i32,
		cb: impl FnMut(InstanceId, M) + 'static,
	) -> (RegistrationHandle, RetractFn) {
		self.insert_map::<M, _>(
			acc_targeted_by_target::<M>,
			Some(CounterKind::Targeted),
			target,
			owner,
			priority,
			Mode::Action,
			KeyedCallback::Action(RefCell::new(Box::new(cb))),
		)
	}

	pub fn register_targeted_without_targeting_fast<M: 'static>(
		&self,
		owner: InstanceId,
		priority: i32,
		cb: impl FnMut(&mut InstanceId, &mut M) + 'static,
	) -> (RegistrationHandle, RetractFn) {
		self.insert_list::<M, _>(
			acc_targeted_without_targeting::<M>,
			Some(CounterKind::Targeted),
			owner,
			priority,
			Mode::Fast,
			KeyedCallback::Fast(RefCell::new(Box::new(cb))),
		)
	}

	pub fn register_targeted_without_targeting_action<M: 'static>(
		&self,
		owner: InstanceId,
		priority: i32,
		cb: impl FnMut(InstanceId, M) + 'static,
	) -> (RegistrationHandle, RetractFn) {
		self.insert_list::<M, _>(
			acc_targeted_without_targeting::<M>,
			Some(CounterKind::Targeted),
			owner,
			priority,
			Mode::Action,
			KeyedCallback::Action(RefCell::new(Box::new(cb))),
		)
	}

	pub fn register_targeted_post_processor_fast<M: 'static>(
		&self,
		owner: InstanceId,
		target: InstanceId,
		priority: i32,
		cb: impl FnMut(&mut InstanceId, &mut M) + 'static,
	) -> (RegistrationHandle, RetractFn) {
		self.insert_map::<M, _>(
			acc_targeted_pp_by_target::<M>,
			None,
			target,
			owner,
			priority,
			Mode::Fast,
			KeyedCallback::Fast(RefCell::new(Box::new(cb))),
		)
	}

	pub fn register_targeted_post_processor_action<M: 'static>(
		&self,
		owner: InstanceId,
		target: InstanceId,
		priority: i32,
		cb: impl FnMut(InstanceId, M) + 'static,
	) -> (RegistrationHandle, RetractFn) {
		self.insert_map::<M, _>(
			acc_targeted_pp_by_target::<M>,
			None,
			target,
			owner,
			priority,
			Mode::Action,
			KeyedCallback::Action(RefCell::new(Box::new(cb))),
		)
	}

	pub fn register_targeted_without_targeting_post_processor_fast<M: 'static>(
		&self,
		owner: InstanceId,
		priority: i32,
		cb: impl FnMut(&mut InstanceId, &mut M) + 'static,
	) -> (RegistrationHandle, RetractFn) {
		self.insert_list::<M, _>(
			acc_targeted_pp_without_targeting::<M>,
			None,
			owner,
			priority,
			Mode::Fast,
			KeyedCallback::Fast(RefCell::new(Box::new(cb))),
		)
	}

	pub fn register_targeted_without_targeting_post_processor_action<M: 'static>(
		&self,
		owner: InstanceId,
		priority: i32,
		cb: impl FnMut(InstanceId, M) + 'static,
	) -> (RegistrationHandle, RetractFn) {
		self.insert_list::<M, _>(
			acc_targeted_pp_without_targeting::<M>,
			None,
			owner,
			priority,
			Mode::Action,
			KeyedCallback::Action(RefCell::new(Box::new(cb))),
		)
	}

	pub fn register_targeted_interceptor<M: 'static>(
		&self,
		owner: InstanceId,
		priority: i32,
		cb: impl FnMut(&mut InstanceId, &mut M) -> bool + 'static,
	) -> (RegistrationHandle, RetractFn) {
		self.insert_list::<M, _>(
			acc_interceptors_targeted::<M>,
			None,
			owner,
			priority,
			Mode::Fast,
			KeyedInterceptorCallback(RefCell::new(Box::new(cb))),
		)
	}

	// --- Broadcast ------------------------------------------------------

	pub fn register_broadcast_by_source_fast<M: 'static>(
		&self,
		owner: InstanceId,
		source: InstanceId,
		priority: i32,
		cb: impl FnMut(&mut InstanceId, &mut M) + 'static,
	) -> (RegistrationHandle, RetractFn) {
		self.insert_map::<M, _>(
			acc_broadcast_by_source::<M>,
			Some(CounterKind::Broadcast),
			source,
			owner,
			priority,
			Mode::Fast,
			KeyedCallback::Fast(RefCell::new(Box::new(cb))),
		)
	}

	pub fn register_broadcast_by_source_action<M: 'static>(
		&self,
		owner: InstanceId,
		source: InstanceId,
		priority: i32,
		cb: impl FnMut(InstanceId, M) + 'static,
	) -> (RegistrationHandle, RetractFn) {
		self.insert_map::<M, _>(
			acc_broadcast_by_source::<M>,
			Some(CounterKind::Broadcast),
			source,
			owner,
			priority,
			Mode::Action,
			KeyedCallback::Action(RefCell::new(Box::new(cb))),
		)
	}

	pub fn register_broadcast_without_source_fast<M: 'static>(
		&self,
		owner: InstanceId,
		priority: i32,
		cb: impl FnMut(&mut InstanceId, &mut M) + 'static,
	) -> (RegistrationHandle, RetractFn) {
		self.insert_list::<M, _>(
			acc_broadcast_without_source::<M>,
			Some(CounterKind::Broadcast),
			owner,
			priority,
			Mode::Fast,
			KeyedCallback::Fast(RefCell::new(Box::new(cb))),
		)
	}

	pub fn register_broadcast_without_source_action<M: 'static>(
		&self,
		owner: InstanceId,
		priority: i32,
		cb: impl FnMut(InstanceId, M) + 'static,
	) -> (RegistrationHandle, RetractFn) {
		self.insert_list::<M, _>(
			acc_broadcast_without_source::<M>,
			Some(CounterKind::Broadcast),
			owner,
			priority,
			Mode::Action,
			KeyedCallback::Action(RefCell::new(Box::new(cb))),
		)
	}

	pub fn register_broadcast_post_processor_fast<M: 'static>(
		&self,
		owner: InstanceId,
		source: InstanceId,
		priority: i32,
		cb: impl FnMut(&mut InstanceId, &mut M) + 'static,
	) -> (RegistrationHandle, RetractFn) {
		self.insert_map::<M, _>(
			acc_broadcast_pp_by_source::<M>,
			None,
			source,
			owner,
			priority,
			Mode::Fast,
			KeyedCallback::Fast(RefCell::new(Box::new(cb))),
		)
	}

	pub fn register_broadcast_post_processor_action<M: 'static>(
		&self,
		owner: InstanceId,
		source: InstanceId,
		priority: i32,
		cb: impl FnMut(InstanceId, M) + 'static,
	) -> (RegistrationHandle, RetractFn) {
		self.insert_map::<M, _>(
			acc_broadcast_pp_by_source::<M>,
			None,
			source,
			owner,
			priority,
			Mode::Action,
			KeyedCallback::Action(RefCell::new(Box::new(cb))),
		)
	}

	pub fn register_broadcast_without_source_post_processor_fast<M: 'static>(
		&self,
		owner: InstanceId,
		priority: i32,
		cb: impl FnMut(&mut InstanceId, &mut M) + 'static,
	) -> (RegistrationHandle, RetractFn) {
		self.insert_list::<M, _>(
			acc_broadcast_pp_without_source::<M>,
			None,
			owner,
			priority,
			Mode::Fast,
			KeyedCallback::Fast(RefCell::new(Box::new(cb))),
		)
	}

	pub fn register_broadcast_without_source_post_processor_action<M: 'static>(
		&self,
		owner: InstanceId,
		priority: i32,
		cb: impl FnMut(InstanceId, M) + 'static,
	) -> (RegistrationHandle, RetractFn) {
		self.insert_list::<M, _>(
			acc_broadcast_pp_without_source::<M>,
			None,
			owner,
			priority,
			Mode::Action,
			KeyedCallback::Action(RefCell::new(Box::new(cb))),
		)
	}

	pub fn register_broadcast_interceptor<M: 'static>(
		&self,
		owner: InstanceId,
		priority: i32,
		cb: impl FnMut(&mut InstanceId, &mut M) -> bool + 'static,
	) -> (RegistrationHandle, RetractFn) {
		self.insert_list::<M, _>(
			acc_interceptors_broadcast::<M>,
			None,
			owner,
			priority,
			Mode::Fast,
			KeyedInterceptorCallback(RefCell::new(Box::new(cb))),
		)
	}

	// --- GlobalAcceptAll ---------------------------------------------------

	#[allow(clippy::type_complexity)]
	pub fn register_global_accept_all_fast(
		&self,
		owner: InstanceId,
		priority: i32,
		untargeted: Option<Box<dyn FnMut(&mut dyn Message)>>,
		targeted: Option<Box<dyn FnMut(&mut InstanceId, &mut dyn Message)>>,
		broadcast: Option<Box<dyn FnMut(&mut InstanceId, &mut dyn Message)>>,
	) -> (RegistrationHandle, RetractFn) {
		let handle = {
			let handle = handle_registry::next();
			let mut inner = self.0.borrow_mut();
			inner.global_accept_all.insert(
				handle,
				owner,
				priority,
				Mode::Fast,
				GlobalEntry::Fast(GlobalFastCallbacks::new(untargeted, targeted, broadcast)),
			);
			handle
		};
		(handle, self.retract_global(handle))
	}

	#[allow(clippy::type_complexity)]
	pub fn register_global_accept_all_action(
		&self,
		owner: InstanceId,
		priority: i32,
		untargeted: Option<Box<dyn FnMut(Box<dyn Message>)>>,
		targeted: Option<Box<dyn FnMut(InstanceId, Box<dyn Message>)>>,
		broadcast: Option<Box<dyn FnMut(InstanceId, Box<dyn Message>)>>,
	) -> (RegistrationHandle, RetractFn) {
		let handle = {
			let handle = handle_registry::next();
			let mut inner = self.0.borrow_mut();
			inner.global_accept_all.insert(
				handle,
				owner,
				priority,
				Mode::Action,
				GlobalEntry::Action(GlobalActionCallbacks::new(untargeted, targeted, broadcast)),
			);
			handle
		};
		(handle, self.retract_global(handle))
	}

	fn retract_global(&self, handle: RegistrationHandle) -> RetractFn {
		let bus = self.clone();
		let mut done = false;
		Box::new(move || {
			if done {
				bus.0.borrow().log(LogLevel::Error, format_args!("over-deregistration of {handle}"));
				return;
			}
			done = true;
			let removed = bus.0.borrow_mut().global_accept_all.remove(handle);
			if !removed {
				bus.0.borrow().log(LogLevel::Warn, format_args!("invalid registration retract for {handle}"));
			}
		})
	}

	fn snapshot_global(&self) -> Entries<GlobalEntry> {
		self.0.borrow().global_accept_all.snapshot()
	}

	// --- Emission -----------------------------------------------------------

	/// Runs the untargeted pipeline (`spec.md` §4.1.1) for one message.
	pub fn emit_untargeted<M: Clone + 'static>(&self, msg: &mut M) {
		let type_id = type_registry::id_of::<M>();
		let _span = tracing::debug_span!("emit_untargeted", type_id = type_id.raw()).entered();

		for entry in self.snapshot_list::<M, _>(acc_interceptors_untargeted::<M>) {
			if entry.is_removed() {
				continue;
			}
			if !(entry.payload.0.borrow_mut())(msg) {
				tracing::trace!("untargeted interceptor short-circuited emission");
				return;
			}
		}

		let mut global_fired = 0u64;
		for entry in self.snapshot_global() {
			if entry.is_removed() {
				continue;
			}
			if invoke_global_untargeted(&entry.payload, msg) {
				global_fired += 1;
			}
		}
		if global_fired > 0 {
			self.0.borrow_mut().global_routing.untargeted += global_fired;
		}

		let mut handler_fired = false;
		for entry in self.snapshot_list::<M, _>(acc_untargeted::<M>) {
			if entry.is_removed() {
				continue;
			}
			invoke_untargeted(&entry.payload, msg);
			handler_fired = true;
		}

		let pp = self.snapshot_list::<M, _>(acc_untargeted_pp::<M>);
		if handler_fired {
			self.record_prefreeze(type_id, pp.iter().map(|e| e.priority));
		}
		for entry in &pp {
			if entry.is_removed() {
				continue;
			}
			invoke_untargeted(&entry.payload, msg);
		}
	}

	/// Runs the targeted pipeline for one message addressed to `target`.
	pub fn emit_targeted<M: Clone + 'static>(&self, msg: &mut M, target: InstanceId) {
		let type_id = type_registry::id_of::<M>();
		let _span = tracing::debug_span!("emit_targeted", type_id = type_id.raw(), target = %target).entered();
		let mut key = target;

		for entry in self.snapshot_list::<M, _>(acc_interceptors_targeted::<M>) {
			if entry.is_removed() {
				continue;
			}
			if !(entry.payload.0.borrow_mut())(&mut key, msg) {
				tracing::trace!("targeted interceptor short-circuited emission");
				return;
			}
		}

		let mut global_fired = 0u64;
		for entry in self.snapshot_global() {
			if entry.is_removed() {
				continue;
			}
			if invoke_global_targeted(&entry.payload, &mut key, msg) {
				global_fired += 1;
			}
		}
		if global_fired > 0 {
			self.0.borrow_mut().global_routing.targeted += global_fired;
		}

		let mut handler_fired = false;
		for entry in self.snapshot_map::<M, _>(acc_targeted_by_target::<M>, key) {
			if entry.is_removed() {
				continue;
			}
			invoke_keyed(&entry.payload, &mut key, msg);
			handler_fired = true;
		}
		for entry in self.snapshot_list::<M, _>(acc_targeted_without_targeting::<M>) {
			if entry.is_removed() {
				continue;
			}
			invoke_keyed(&entry.payload, &mut key, msg);
			handler_fired = true;
		}

		let pp_by_target = self.snapshot_map::<M, _>(acc_targeted_pp_by_target::<M>, key);
		let pp_without_targeting = self.snapshot_list::<M, _>(acc_targeted_pp_without_targeting::<M>);
		if handler_fired {
			let priorities = pp_by_target.iter().chain(pp_without_targeting.iter()).map(|e| e.priority);
			self.record_prefreeze(type_id, priorities);
		}
		for entry in &pp_by_target {
			if entry.is_removed() {
				continue;
			}
			invoke_keyed(&entry.payload, &mut key, msg);
		}
		for entry in &pp_without_targeting {
			if entry.is_removed() {
				continue;
			}
			invoke_keyed(&entry.payload, &mut key, msg);
		}
	}

	/// Runs the broadcast pipeline for one message originating from `source`.
	pub fn emit_broadcast<M: Clone + 'static>(&self, msg: &mut M, source: InstanceId) {
		let type_id = type_registry::id_of::<M>();
		let _span = tracing::debug_span!("emit_broadcast", type_id = type_id.raw(), source = %source).entered();
		let mut key = source;

		for entry in self.snapshot_list::<M, _>(acc_interceptors_broadcast::<M>) {
			if entry.is_removed() {
				continue;
			}
			if !(entry.payload.0.borrow_mut())(&mut key, msg) {
				tracing::trace!("broadcast interceptor short-circuited emission");
				return;
			}
		}

		let mut global_fired = 0u64;
		for entry in self.snapshot_global() {
			if entry.is_removed() {
				continue;
			}
			if invoke_global_broadcast(&entry.payload, &mut key, msg) {
				global_fired += 1;
			}
		}
		if global_fired > 0 {
			self.0.borrow_mut().global_routing.broadcast += global_fired;
		}

		let mut handler_fired = false;
		for entry in self.snapshot_map::<M, _>(acc_broadcast_by_source::<M>, key) {
			if entry.is_removed() {
				continue;
			}
			invoke_keyed(&entry.payload, &mut key, msg);
			handler_fired = true;
		}
		for entry in self.snapshot_list::<M, _>(acc_broadcast_without_source::<M>) {
			if entry.is_removed() {
				continue;
			}
			invoke_keyed(&entry.payload, &mut key, msg);
			handler_fired = true;
		}

		let pp_by_source = self.snapshot_map::<M, _>(acc_broadcast_pp_by_source::<M>, key);
		let pp_without_source = self.snapshot_list::<M, _>(acc_broadcast_pp_without_source::<M>);
		if handler_fired {
			let priorities = pp_by_source.iter().chain(pp_without_source.iter()).map(|e| e.priority);
			self.record_prefreeze(type_id, priorities);
		}
		for entry in &pp_by_source {
			if entry.is_removed() {
				continue;
			}
			invoke_keyed(&entry.payload, &mut key, msg);
		}
		for entry in &pp_without_source {
			if entry.is_removed() {
				continue;
			}
			invoke_keyed(&entry.payload, &mut key, msg);
		}
	}
}

fn invoke_untargeted<M: Clone>(cb: &UntargetedCallback<M>, msg: &mut M) {
	match cb {
		UntargetedCallback::Fast(f) => (f.borrow_mut())(msg),
		UntargetedCallback::Action(f) => (f.borrow_mut())(msg.clone()),
	}
}

fn invoke_keyed<M: Clone>(cb: &KeyedCallback<M>, key: &mut InstanceId, msg: &mut M) {
	match cb {
		KeyedCallback::Fast(f) => (f.borrow_mut())(key, msg),
		KeyedCallback::Action(f) => (f.borrow_mut())(*key, msg.clone()),
	}
}

fn invoke_global_untargeted<M: Clone + 'static>(entry: &GlobalEntry, msg: &mut M) -> bool {
	match entry {
		GlobalEntry::Fast(cbs) => match &cbs.untargeted {
			Some(cb) => {
				(cb.borrow_mut())(msg);
				true
			}
			None => false,
		},
		GlobalEntry::Action(cbs) => match &cbs.untargeted {
			Some(cb) => {
				(cb.borrow_mut())(Box::new(msg.clone()));
				true
			}
			None => false,
		},
	}
}

fn invoke_global_targeted<M: Clone + 'static>(entry: &GlobalEntry, key: &mut InstanceId, msg: &mut M) -> bool {
	match entry {
		GlobalEntry::Fast(cbs) => match &cbs.targeted {
			Some(cb) => {
				(cb.borrow_mut())(key, msg);
				true
			}
			None => false,
		},
		GlobalEntry::Action(cbs) => match &cbs.targeted {
			Some(cb) => {
				(cb.borrow_mut())(*key, Box::new(msg.clone()));
				true
			}
			None => false,
		},
	}
}

fn invoke_global_broadcast<M: Clone + 'static>(entry: &GlobalEntry, key: &mut InstanceId, msg: &mut M) -> bool {
	match entry {
		GlobalEntry::Fast(cbs) => match &cbs.broadcast {
			Some(cb) => {
				(cb.borrow_mut())(key, msg);
				true
			}
			None => false,
		},
		GlobalEntry::Action(cbs) => match &cbs.broadcast {
			Some(cb) => {
				(cb.borrow_mut())(*key, Box::new(msg.clone()));
				true
			}
			None => false,
		},
	}
}
