use super::*;
use msgbus_core::HandleCounter;
use pretty_assertions::assert_eq;
use proptest::prelude::*;

const OWNER: InstanceId = InstanceId::from_raw(0);

fn counter() -> HandleCounter {
	HandleCounter::new()
}

#[test]
fn orders_by_priority_then_mode_then_insertion() {
	let handles = counter();
	let mut list: PrioritizedList<&'static str> = PrioritizedList::new();
	list.insert(handles.next(), OWNER, 1, Mode::Action, "A1");
	list.insert(handles.next(), OWNER, 0, Mode::Fast, "F0");
	list.insert(handles.next(), OWNER, 0, Mode::Action, "A0_first");
	list.insert(handles.next(), OWNER, 0, Mode::Action, "A0_second");
	list.insert(handles.next(), OWNER, 1, Mode::Fast, "F1");

	let order: Vec<&str> = list
		.snapshot()
		.iter()
		.map(|entry| entry.payload)
		.collect();
	assert_eq!(order, vec!["F0", "A0_first", "A0_second", "F1", "A1"]);
}

#[test]
fn snapshot_does_not_observe_later_inserts() {
	let handles = counter();
	let mut list: PrioritizedList<i32> = PrioritizedList::new();
	list.insert(handles.next(), OWNER, 0, Mode::Fast, 1);
	let snapshot = list.snapshot();
	list.insert(handles.next(), OWNER, 0, Mode::Fast, 2);
	assert_eq!(snapshot.len(), 1);
	assert_eq!(list.len(), 2);
}

#[test]
fn snapshot_skips_removed_entries_without_failing() {
	let handles = counter();
	let mut list: PrioritizedList<i32> = PrioritizedList::new();
	let keep = handles.next();
	let drop_me = handles.next();
	list.insert(keep, OWNER, 0, Mode::Fast, 1);
	list.insert(drop_me, OWNER, 0, Mode::Fast, 2);
	let snapshot = list.snapshot();

	assert!(list.remove(drop_me));
	assert!(!list.remove(drop_me), "second remove is a no-op, not a panic");

	let live: Vec<i32> = snapshot
		.iter()
		.filter(|entry| !entry.is_removed())
		.map(|entry| entry.payload)
		.collect();
	assert_eq!(live, vec![1]);
}

#[test]
fn len_reflects_only_live_entries() {
	let handles = counter();
	let mut list: PrioritizedList<i32> = PrioritizedList::new();
	let h = handles.next();
	list.insert(h, OWNER, 0, Mode::Fast, 1);
	assert_eq!(list.len(), 1);
	list.remove(h);
	assert_eq!(list.len(), 0);
}

proptest! {
	#[test]
	fn ordering_law_holds_for_any_insertion_sequence(
		items in proptest::collection::vec((-8i32..8, proptest::bool::ANY), 0..64)
	) {
		let handles = counter();
		let mut list: PrioritizedList<usize> = PrioritizedList::new();
		let mut expected: Vec<(i32, u8, usize)> = Vec::new();
		for (idx, (priority, is_action)) in items.iter().enumerate() {
			let mode = if *is_action { Mode::Action } else { Mode::Fast };
			list.insert(handles.next(), OWNER, *priority, mode, idx);
			expected.push((*priority, mode.rank(), idx));
		}
		expected.sort_by_key(|&(priority, rank, idx)| (priority, rank, idx));

		let observed: Vec<usize> = list.snapshot().iter().map(|entry| entry.payload).collect();
		let expected_payloads: Vec<usize> = expected.iter().map(|&(_, _, idx)| idx).collect();
		prop_assert_eq!(observed, expected_payloads);
	}
}
