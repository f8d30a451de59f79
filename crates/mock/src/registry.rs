//! Self-registration records and the identity/name index.
//!
//! Instrumented code declares one [`FnDef`] per function through
//! [`register_fn!`](crate::register_fn) and submits it to [`inventory`]. The
//! [`Registry`] is filled from those definitions when an
//! [`Interceptor`](crate::Interceptor) is built and is append-only afterwards.

use std::any::{Any, type_name};
use std::sync::Arc;

use parking_lot::RwLock;
use rustc_hash::FxHashMap;

use crate::error::{Error, Result};
use crate::flag::Flag;
use crate::id::{FnId, Target};

/// Type-erased boxed callable (`Box<D>` behind an `Arc`).
pub(crate) type Erased = Arc<dyn Any + Send + Sync>;

type FromRaw = Box<dyn Fn(*const ()) -> Erased + Send + Sync>;

/// Static registration emitted next to every instrumented function.
#[derive(Debug)]
pub struct FnDef {
	/// Globally unique function name.
	pub name: &'static str,
	/// Normalized `dyn Fn` type text, compared at the module boundary.
	pub signature: &'static str,
	/// The function's gating flag.
	pub flag: &'static Flag,
	/// Builds the typed original on first registration.
	pub hook: fn() -> Hook,
}

/// Inventory wrapper for [`FnDef`].
pub struct FnReg(pub &'static FnDef);

inventory::collect!(FnReg);

/// Typed view of one registered function.
///
/// `D` is the `dyn Fn(..) -> R + Send + Sync` shape of the function and `P` is
/// its plain function pointer type.
pub struct Hook {
	id: FnId,
	original: Erased,
	type_name: &'static str,
	from_raw: FromRaw,
}

impl Hook {
	/// Captures `original` and a converter from raw function pointers of type `P`.
	pub fn new<D, P>(id: FnId, original: Box<D>, wrap: fn(P) -> Box<D>) -> Self
	where
		D: ?Sized + Send + Sync + 'static,
		P: Copy + 'static,
	{
		const { assert!(size_of::<P>() == size_of::<*const ()>()) };
		let from_raw = move |raw: *const ()| -> Erased {
			// SAFETY: callers of `Interceptor::install_raw` guarantee `raw` is a
			// function pointer whose signature text matched this registration.
			let func = unsafe { std::mem::transmute_copy::<*const (), P>(&raw) };
			Arc::new(wrap(func))
		};
		Self {
			id,
			original: Arc::new(original),
			type_name: type_name::<D>(),
			from_raw: Box::new(from_raw),
		}
	}
}

/// Immutable record of one self-registered function.
pub(crate) struct Record {
	pub(crate) id: FnId,
	pub(crate) name: &'static str,
	pub(crate) signature: &'static str,
	pub(crate) flag: &'static Flag,
	pub(crate) original: Erased,
	pub(crate) type_name: &'static str,
	from_raw: FromRaw,
	/// Serializes flag save/restore in `call_original`.
	pub(crate) call_guard: parking_lot::ReentrantMutex<()>,
}

impl Record {
	/// Wraps a raw function pointer into this record's boxed shape.
	pub(crate) fn erase_raw(&self, raw: *const ()) -> Erased {
		(self.from_raw)(raw)
	}

	/// Downcasts the original to `Box<D>`, or reports the shape mismatch.
	pub(crate) fn typed_original<D>(&self) -> Result<Arc<Box<D>>>
	where
		D: ?Sized + Send + Sync + 'static,
	{
		Arc::clone(&self.original)
			.downcast::<Box<D>>()
			.map_err(|_| self.mismatch(type_name::<D>()))
	}

	pub(crate) fn mismatch(&self, found: &str) -> Error {
		Error::SignatureMismatch {
			name: self.name.to_string(),
			expected: self.type_name.to_string(),
			found: found.to_string(),
		}
	}
}

#[derive(Default)]
struct Index {
	by_id: FxHashMap<FnId, Arc<Record>>,
	by_name: FxHashMap<&'static str, FnId>,
}

/// Original Implementation Record plus Name-to-Identity Index.
#[derive(Default)]
pub(crate) struct Registry {
	index: RwLock<Index>,
}

impl Registry {
	/// Records `def`. Registering an identity twice keeps the last write.
	pub(crate) fn register(&self, def: &'static FnDef) -> FnId {
		let hook = (def.hook)();
		let id = hook.id;
		let record = Arc::new(Record {
			id,
			name: def.name,
			signature: def.signature,
			flag: def.flag,
			original: hook.original,
			type_name: hook.type_name,
			from_raw: hook.from_raw,
			call_guard: parking_lot::ReentrantMutex::new(()),
		});

		let mut index = self.index.write();
		index.by_name.insert(def.name, id);
		index.by_id.insert(id, record);
		tracing::trace!("registered {} as {id}", def.name);
		id
	}

	pub(crate) fn resolve(&self, name: &str) -> Option<FnId> {
		self.index.read().by_name.get(name).copied()
	}

	pub(crate) fn get(&self, target: Target<'_>) -> Option<Arc<Record>> {
		let index = self.index.read();
		let id = match target {
			Target::Id(id) => id,
			Target::Name(name) => *index.by_name.get(name)?,
		};
		index.by_id.get(&id).cloned()
	}

	/// Like [`Registry::get`], failing with `NotRegistered`.
	pub(crate) fn lookup(&self, target: Target<'_>) -> Result<Arc<Record>> {
		self.get(target)
			.ok_or_else(|| Error::NotRegistered(target.to_string()))
	}

	pub(crate) fn names(&self) -> Vec<&'static str> {
		let mut names: Vec<_> = self.index.read().by_name.keys().copied().collect();
		names.sort_unstable();
		names
	}

	pub(crate) fn len(&self) -> usize {
		self.index.read().by_id.len()
	}
}
