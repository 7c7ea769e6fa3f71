use super::*;
use crate::bus::MessageBus;
use pretty_assertions::assert_eq;

#[derive(Debug, Clone)]
struct Ping(u32);

#[test]
fn disabled_token_does_not_realize_until_enabled() {
	let bus = MessageBus::new();
	let token = RegistrationToken::new(InstanceId::from_raw(1), bus.clone(), RebindMode::Preserve);
	let count = Rc::new(RefCell::new(0u32));

	{
		let count = count.clone();
		token.register_untargeted_fast::<Ping>(0, move |_| *count.borrow_mut() += 1);
	}
	bus.emit_untargeted(&mut Ping(1));
	assert_eq!(*count.borrow(), 0);

	token.enable();
	bus.emit_untargeted(&mut Ping(1));
	assert_eq!(*count.borrow(), 1);
}

#[test]
fn disable_retracts_and_enable_re_realizes_the_same_registration() {
	let bus = MessageBus::new();
	let token = RegistrationToken::new(InstanceId::from_raw(1), bus.clone(), RebindMode::Preserve);
	let count = Rc::new(RefCell::new(0u32));
	{
		let count = count.clone();
		token.register_untargeted_fast::<Ping>(0, move |_| *count.borrow_mut() += 1);
	}
	token.enable();
	bus.emit_untargeted(&mut Ping(1));
	assert_eq!(*count.borrow(), 1);

	token.disable();
	bus.emit_untargeted(&mut Ping(1));
	assert_eq!(*count.borrow(), 1, "disabled token must not fire");

	token.enable();
	bus.emit_untargeted(&mut Ping(1));
	assert_eq!(*count.borrow(), 2, "re-enabling realizes the recorded recipe again");
}

#[test]
fn remove_registration_is_idempotent() {
	let bus = MessageBus::new();
	let token = RegistrationToken::new(InstanceId::from_raw(1), bus.clone(), RebindMode::Preserve);
	let handle = token.register_untargeted_fast::<Ping>(0, |_| {});
	token.enable();
	assert_eq!(bus.registered_counts(), (1, 0, 0));

	token.remove_registration(handle);
	assert_eq!(bus.registered_counts(), (0, 0, 0));
	token.remove_registration(handle);
	assert_eq!(bus.registered_counts(), (0, 0, 0));
}

#[test]
fn as_disposable_retracts_on_drop() {
	let bus = MessageBus::new();
	let token = RegistrationToken::new(InstanceId::from_raw(1), bus.clone(), RebindMode::Preserve);
	let handle = token.register_untargeted_fast::<Ping>(0, |_| {});
	token.enable();
	assert_eq!(bus.registered_counts(), (1, 0, 0));

	{
		let _guard = token.as_disposable(handle);
		assert_eq!(bus.registered_counts(), (1, 0, 0));
	}
	assert_eq!(bus.registered_counts(), (0, 0, 0));
}

#[test]
fn rebind_active_moves_registrations_to_the_new_bus() {
	let old_bus = MessageBus::new();
	let new_bus = MessageBus::new();
	let token = RegistrationToken::new(InstanceId::from_raw(1), old_bus.clone(), RebindMode::RebindActive);
	let count = Rc::new(RefCell::new(0u32));
	{
		let count = count.clone();
		token.register_untargeted_fast::<Ping>(0, move |_| *count.borrow_mut() += 1);
	}
	token.enable();
	assert_eq!(old_bus.registered_counts(), (1, 0, 0));

	token.set_bus(new_bus.clone());
	assert_eq!(old_bus.registered_counts(), (0, 0, 0));
	assert_eq!(new_bus.registered_counts(), (1, 0, 0));

	new_bus.emit_untargeted(&mut Ping(1));
	assert_eq!(*count.borrow(), 1);
}

#[test]
fn token_and_bus_issued_handles_never_collide() {
	msgbus_core::handle_registry::reset();
	let bus = MessageBus::new();
	let token = RegistrationToken::new(InstanceId::from_raw(1), bus.clone(), RebindMode::Preserve);

	let token_handle = token.register_untargeted_fast::<Ping>(0, |_| {});
	let (bus_handle, _retract) = bus.register_untargeted_fast::<Ping>(InstanceId::from_raw(2), 0, |_| {});

	assert_ne!(token_handle, bus_handle, "a freshly-recorded token handle must not alias a bus-issued one");
}

#[test]
fn set_rebind_mode_changes_future_set_bus_behavior() {
	let old_bus = MessageBus::new();
	let new_bus = MessageBus::new();
	let token = RegistrationToken::new(InstanceId::from_raw(1), old_bus.clone(), RebindMode::Preserve);
	let count = Rc::new(RefCell::new(0u32));
	{
		let count = count.clone();
		token.register_untargeted_fast::<Ping>(0, move |_| *count.borrow_mut() += 1);
	}
	token.enable();
	assert_eq!(old_bus.registered_counts(), (1, 0, 0));

	token.set_rebind_mode(RebindMode::RebindActive);
	token.set_bus(new_bus.clone());

	assert_eq!(old_bus.registered_counts(), (0, 0, 0), "RebindActive now retracts from the old bus");
	assert_eq!(new_bus.registered_counts(), (1, 0, 0), "and realizes on the new one");
}

#[test]
fn global_accept_all_omitted_slots_do_not_count_as_routed() {
	let bus = MessageBus::new();
	let token = RegistrationToken::new(InstanceId::from_raw(1), bus.clone(), RebindMode::Preserve);
	let seen = Rc::new(RefCell::new(0u32));
	{
		let seen = seen.clone();
		token.register_global_accept_all_fast(
			0,
			Some(Box::new(move |_m| *seen.borrow_mut() += 1)),
			None,
			None,
		);
	}
	token.enable();

	bus.emit_untargeted(&mut Ping(1));
	bus.emit_targeted(&mut Ping(1), InstanceId::from_raw(9));
	bus.emit_broadcast(&mut Ping(1), InstanceId::from_raw(9));

	assert_eq!(*seen.borrow(), 1, "only the untargeted slot was supplied");
	assert_eq!(
		bus.global_routing_counts(),
		(1, 0, 0),
		"a None slot must not be credited to its category's routing count"
	);
}
