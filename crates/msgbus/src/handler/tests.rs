use super::*;
use crate::bus::MessageBus;
use pretty_assertions::assert_eq;
use std::cell::RefCell;

#[derive(Debug, Clone)]
struct Ping(u32);

#[test]
fn new_handler_starts_inactive() {
	let bus = MessageBus::new();
	let handler = MessageHandler::new(InstanceId::from_raw(1), bus.clone());
	assert!(!handler.is_active());

	let fired = Rc::new(RefCell::new(false));
	{
		let fired = fired.clone();
		handler.register_untargeted_fast::<Ping>(0, move |_| *fired.borrow_mut() = true);
	}
	bus.emit_untargeted(&mut Ping(1));
	assert!(!*fired.borrow());
}

#[test]
fn set_active_true_then_false_arms_and_retracts() {
	let bus = MessageBus::new();
	let handler = MessageHandler::new(InstanceId::from_raw(1), bus.clone());
	let count = Rc::new(RefCell::new(0u32));
	{
		let count = count.clone();
		handler.register_untargeted_fast::<Ping>(0, move |_| *count.borrow_mut() += 1);
	}

	handler.set_active(true);
	assert!(handler.is_active());
	bus.emit_untargeted(&mut Ping(1));
	assert_eq!(*count.borrow(), 1);

	handler.set_active(false);
	assert!(!handler.is_active());
	bus.emit_untargeted(&mut Ping(1));
	assert_eq!(*count.borrow(), 1);
}

#[test]
fn set_active_is_idempotent() {
	let bus = MessageBus::new();
	let handler = MessageHandler::new(InstanceId::from_raw(1), bus.clone());
	handler.set_active(true);
	handler.set_active(true);
	assert!(handler.is_active());
	handler.set_active(false);
	handler.set_active(false);
	assert!(!handler.is_active());
}

#[test]
fn drop_retracts_and_marks_dead() {
	let bus = MessageBus::new();
	{
		let handler = MessageHandler::new(InstanceId::from_raw(1), bus.clone());
		handler.register_untargeted_fast::<Ping>(0, |_| {});
		handler.set_active(true);
		assert_eq!(bus.registered_counts(), (1, 0, 0));
	}
	assert_eq!(bus.registered_counts(), (0, 0, 0));
}

#[test]
fn new_on_global_bus_registers_against_the_process_global_bus() {
	crate::state::reset();
	let handler = MessageHandler::new_on_global_bus(InstanceId::from_raw(1));
	let count = Rc::new(RefCell::new(0u32));
	{
		let count = count.clone();
		handler.register_untargeted_fast::<Ping>(0, move |_| *count.borrow_mut() += 1);
	}
	handler.set_active(true);

	crate::state::global_bus().emit_untargeted(&mut Ping(1));
	assert_eq!(*count.borrow(), 1);
	crate::state::reset();
}

#[test]
fn reflexive_dispatch_warns_once_per_bus() {
	use std::rc::Rc as StdRc;

	let bus = MessageBus::new();
	let seen = StdRc::new(RefCell::new(0u32));
	{
		let seen = seen.clone();
		bus.set_log_sink(
			Some(StdRc::new(move |_level, _msg: &str| *seen.borrow_mut() += 1)),
			msgbus_core::LogLevel::Trace,
		);
	}
	let handler = MessageHandler::new(InstanceId::from_raw(1), bus.clone());
	handler.note_reflexive_dispatch_unresolved(&bus, "on_damage");
	handler.note_reflexive_dispatch_unresolved(&bus, "on_damage");
	assert_eq!(*seen.borrow(), 1);
}
