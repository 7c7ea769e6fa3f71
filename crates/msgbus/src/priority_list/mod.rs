//! The ordering and snapshot mechanism every registration table is built on.
//!
//! Implements `spec.md` §4.1.2 via generation-stamped tombstones, the
//! approach the spec's own design notes call out as acceptable (§9): each
//! entry is an `Rc<ListEntry<T>>` with an interior `removed` flag; a
//! snapshot clones the current set of `Rc`s (cheap — no deep copy of
//! payloads) and a tombstoned entry is simply skipped by the iterator even
//! though its `Rc` is still alive inside an in-flight snapshot.

#[cfg(test)]
mod tests;

use std::cell::Cell;
use std::rc::Rc;

use msgbus_core::{InstanceId, RegistrationHandle};
use smallvec::SmallVec;

use crate::mode::Mode;

/// Most priority lists in practice hold a handful of registrations; inline
/// storage avoids a heap allocation for the common case.
pub type Entries<T> = SmallVec<[Rc<ListEntry<T>>; 4]>;

/// One registration inside a [`PrioritizedList`].
pub struct ListEntry<T> {
	pub handle: RegistrationHandle,
	pub owner: InstanceId,
	pub priority: i32,
	pub mode: Mode,
	seq: u64,
	removed: Cell<bool>,
	pub payload: T,
}

impl<T> ListEntry<T> {
	pub fn is_removed(&self) -> bool {
		self.removed.get()
	}
}

fn sort_key<T>(entry: &ListEntry<T>) -> (i32, u8, u64) {
	(entry.priority, entry.mode.rank(), entry.seq)
}

/// A registration list with a stable `(priority, mode, insertion order)`
/// ordering and snapshot-at-emission-start semantics.
pub struct PrioritizedList<T> {
	entries: Entries<T>,
	next_seq: u64,
}

impl<T> Default for PrioritizedList<T> {
	fn default() -> Self {
		Self {
			entries: SmallVec::new(),
			next_seq: 0,
		}
	}
}

impl<T> PrioritizedList<T> {
	pub fn new() -> Self {
		Self::default()
	}

	/// Inserts a new entry, keeping the list sorted by
	/// `(priority, mode, insertion order)`.
	pub fn insert(
		&mut self,
		handle: RegistrationHandle,
		owner: InstanceId,
		priority: i32,
		mode: Mode,
		payload: T,
	) -> Rc<ListEntry<T>> {
		let seq = self.next_seq;
		self.next_seq += 1;
		let entry = Rc::new(ListEntry {
			handle,
			owner,
			priority,
			mode,
			seq,
			removed: Cell::new(false),
			payload,
		});
		let key = sort_key(&entry);
		let pos = self
			.entries
			.partition_point(|existing| sort_key(existing) <= key);
		self.entries.insert(pos, entry.clone());
		entry
	}

	/// Tombstones the entry for `handle` and drops it from the live table.
	///
	/// Returns `true` if a live entry was found. Safe to call while a
	/// snapshot taken earlier is still being iterated: the snapshot holds
	/// its own `Rc`, so the entry stays alive, but [`Self::snapshot`]'s
	/// caller checks [`ListEntry::is_removed`] before invoking it.
	pub fn remove(&mut self, handle: RegistrationHandle) -> bool {
		if let Some(pos) = self
			.entries
			.iter()
			.position(|entry| entry.handle == handle)
		{
			self.entries[pos].removed.set(true);
			self.entries.remove(pos);
			true
		} else {
			false
		}
	}

	/// Number of live (non-tombstoned) entries.
	pub fn len(&self) -> usize {
		self.entries.len()
	}

	pub fn is_empty(&self) -> bool {
		self.entries.is_empty()
	}

	/// Clones the current ordered set of live entries. Registrations added
	/// after this call do not appear in the returned vector; registrations
	/// removed after this call are tombstoned in place and must be
	/// re-checked by the caller via [`ListEntry::is_removed`] before
	/// invoking their payload.
	pub fn snapshot(&self) -> Entries<T> {
		self.entries.clone()
	}
}
