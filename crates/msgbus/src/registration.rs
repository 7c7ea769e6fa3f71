//! Callback storage shapes for every one of the 13 registration kinds in
//! `spec.md` §3.
//!
//! A `RefCell` wraps each boxed closure rather than the whole table: the bus
//! clones `Rc<ListEntry<_>>`s out of a [`crate::priority_list::PrioritizedList`]
//! *before* invoking anything (see `crate::bus`), so by the time a callback
//! runs, no other code is holding the table lock — the `RefCell` here exists
//! only to let `FnMut` be called through a shared `Rc`, not to arbitrate
//! concurrent access.

use std::cell::RefCell;

use msgbus_core::InstanceId;

use crate::message::Message;

/// `Untargeted` handlers and their post-processor mirror: `spec.md` §3 row 1.
pub enum UntargetedCallback<M> {
	Fast(RefCell<Box<dyn FnMut(&mut M)>>),
	Action(RefCell<Box<dyn FnMut(M)>>),
}

/// Shape shared by `ByTarget`/`WithoutTargeting` and `BySource`/`WithoutSource`
/// handlers (and their post-processor mirrors): both always carry the key
/// alongside the message (`spec.md` §4.1.1 stage 4).
pub enum KeyedCallback<M> {
	Fast(RefCell<Box<dyn FnMut(&mut InstanceId, &mut M)>>),
	Action(RefCell<Box<dyn FnMut(InstanceId, M)>>),
}

/// `UntargetedInterceptor`: a predicate with no mode distinction
/// (`spec.md` §4.1 — interceptors are declared with a single callback shape).
pub struct InterceptorCallback<M>(pub(crate) RefCell<Box<dyn FnMut(&mut M) -> bool>>);

/// `TargetedInterceptor` / `BroadcastInterceptor`.
pub struct KeyedInterceptorCallback<M>(pub(crate) RefCell<Box<dyn FnMut(&mut InstanceId, &mut M) -> bool>>);

/// One `GlobalAcceptAll` registration. The three callbacks share a single
/// priority slot and a single mode (`spec.md` §4.1: "one entry drives all
/// three categories"); any of the three may be omitted.
pub enum GlobalEntry {
	Fast(GlobalFastCallbacks),
	Action(GlobalActionCallbacks),
}

pub struct GlobalFastCallbacks {
	pub(crate) untargeted: Option<RefCell<Box<dyn FnMut(&mut dyn Message)>>>,
	pub(crate) targeted: Option<RefCell<Box<dyn FnMut(&mut InstanceId, &mut dyn Message)>>>,
	pub(crate) broadcast: Option<RefCell<Box<dyn FnMut(&mut InstanceId, &mut dyn Message)>>>,
}

impl GlobalFastCallbacks {
	/// Any of the three callbacks may be `None` — an owner that only cares
	/// about, say, broadcast messages leaves the other two unset.
	pub fn new(
		untargeted: Option<Box<dyn FnMut(&mut dyn Message)>>,
		targeted: Option<Box<dyn FnMut(&mut InstanceId, &mut dyn Message)>>,
		broadcast: Option<Box<dyn FnMut(&mut InstanceId, &mut dyn Message)>>,
	) -> Self {
		Self {
			untargeted: untargeted.map(RefCell::new),
			targeted: targeted.map(RefCell::new),
			broadcast: broadcast.map(RefCell::new),
		}
	}
}

pub struct GlobalActionCallbacks {
	pub(crate) untargeted: Option<RefCell<Box<dyn FnMut(Box<dyn Message>)>>>,
	pub(crate) targeted: Option<RefCell<Box<dyn FnMut(InstanceId, Box<dyn Message>)>>>,
	pub(crate) broadcast: Option<RefCell<Box<dyn FnMut(InstanceId, Box<dyn Message>)>>>,
}

impl GlobalActionCallbacks {
	pub fn new(
		untargeted: Option<Box<dyn FnMut(Box<dyn Message>)>>,
		targeted: Option<Box<dyn FnMut(InstanceId, Box<dyn Message>)>>,
		broadcast: Option<Box<dyn FnMut(InstanceId, Box<dyn Message>)>>,
	) -> Self {
		Self {
			untargeted: untargeted.map(RefCell::new),
			targeted: targeted.map(RefCell::new),
			broadcast: broadcast.map(RefCell::new),
		}
	}
}
