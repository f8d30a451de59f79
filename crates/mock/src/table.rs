//! Installed replacements, keyed by function identity.

use std::fmt;
use std::ops::Deref;
use std::sync::Arc;

use parking_lot::Mutex;
use rustc_hash::FxHashMap;

use crate::flag::Flag;
use crate::id::FnId;
use crate::registry::Erased;

/// Shared handle to a boxed callable of shape `D`.
///
/// Dereferences to `D`, so a handle is invoked as `(*handle)(args)`.
pub struct Callable<D: ?Sized>(Arc<Box<D>>);

impl<D: ?Sized> Callable<D> {
	pub(crate) fn from_arc(inner: Arc<Box<D>>) -> Self {
		Self(inner)
	}
}

impl<D: ?Sized> Clone for Callable<D> {
	fn clone(&self) -> Self {
		Self(Arc::clone(&self.0))
	}
}

impl<D: ?Sized> Deref for Callable<D> {
	type Target = D;

	fn deref(&self) -> &D {
		&self.0
	}
}

impl<D: ?Sized> fmt::Debug for Callable<D> {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.debug_tuple("Callable")
			.field(&std::any::type_name::<D>())
			.finish()
	}
}

struct Entry {
	flag: &'static Flag,
	replacement: Erased,
}

/// The Mock Table. Every mutation happens under one lock held for O(1) work.
#[derive(Default)]
pub(crate) struct MockTable {
	entries: Mutex<FxHashMap<FnId, Entry>>,
}

impl MockTable {
	/// Sets the flag, then publishes the entry. Returns whether a previous
	/// replacement was overwritten.
	pub(crate) fn install(&self, id: FnId, flag: &'static Flag, replacement: Erased) -> bool {
		let mut entries = self.entries.lock();
		flag.set();
		entries.insert(id, Entry { flag, replacement }).is_some()
	}

	pub(crate) fn lookup(&self, id: FnId) -> Option<Erased> {
		self.entries
			.lock()
			.get(&id)
			.map(|entry| Arc::clone(&entry.replacement))
	}

	/// Deletes the entry, then clears the flag. No-op when nothing is installed.
	pub(crate) fn remove(&self, id: FnId) -> bool {
		let mut entries = self.entries.lock();
		match entries.remove(&id) {
			Some(entry) => {
				entry.flag.clear();
				true
			}
			None => false,
		}
	}

	pub(crate) fn remove_all(&self) -> usize {
		let mut entries = self.entries.lock();
		let removed: Vec<_> = entries.drain().collect();
		for (_, entry) in &removed {
			entry.flag.clear();
		}
		drop(entries);
		removed.len()
	}

	pub(crate) fn contains(&self, id: FnId) -> bool {
		self.entries.lock().contains_key(&id)
	}

	pub(crate) fn len(&self) -> usize {
		self.entries.lock().len()
	}
}
