//! The injectable interception service.
//!
//! An [`Interceptor`] owns the registry of originals and the mock table. The
//! process uses one global instance built from the inventory of instrumented
//! functions on first use; tests build their own with [`Interceptor::new`].

use std::any::type_name;
use std::sync::OnceLock;

use crate::error::{Error, Result};
use crate::flag::Flag;
use crate::id::{FnId, Target};
use crate::registry::{FnDef, FnReg, Registry};
use crate::table::{Callable, MockTable};

#[cfg(test)]
mod tests;

static GLOBAL: OnceLock<Interceptor> = OnceLock::new();

/// Registry of originals plus the table of installed replacements.
#[derive(Default)]
pub struct Interceptor {
	registry: Registry,
	mocks: MockTable,
}

impl Interceptor {
	/// Creates an empty interceptor with nothing registered.
	pub fn new() -> Self {
		Self::default()
	}

	/// Creates an interceptor holding every function submitted through
	/// [`register_fn!`](crate::register_fn) in the loaded program.
	pub fn from_inventory() -> Self {
		let this = Self::new();
		for reg in inventory::iter::<FnReg> {
			this.register(reg.0);
		}
		tracing::debug!("interceptor built with {} registered functions", this.registry.len());
		this
	}

	/// The process-wide instance, built from the inventory on first access.
	pub fn global() -> &'static Self {
		GLOBAL.get_or_init(Self::from_inventory)
	}

	/// Records identity, name and flag of `def`.
	pub fn register(&self, def: &'static FnDef) -> FnId {
		self.registry.register(def)
	}

	/// Maps a function name to its identity.
	pub fn resolve(&self, name: &str) -> Result<FnId> {
		self.registry
			.resolve(name)
			.ok_or_else(|| Error::NotRegistered(name.to_string()))
	}

	/// Returns the original implementation captured at registration.
	pub fn original_of<'a, D>(&self, target: impl Into<Target<'a>>) -> Result<Callable<D>>
	where
		D: ?Sized + Send + Sync + 'static,
	{
		let record = self.registry.lookup(target.into())?;
		record.typed_original::<D>().map(Callable::from_arc)
	}

	/// Installs `replacement` for `target`, overwriting any previous mock.
	///
	/// `D` must be the exact `dyn Fn` shape the function registered with.
	/// Nothing is mutated when the target is unknown or the shape differs.
	pub fn install<'a, D>(&self, target: impl Into<Target<'a>>, replacement: Box<D>) -> Result<()>
	where
		D: ?Sized + Send + Sync + 'static,
	{
		let record = self.registry.lookup(target.into())?;
		if !record.original.is::<Box<D>>() {
			return Err(record.mismatch(type_name::<D>()));
		}
		let replaced = self
			.mocks
			.install(record.id, record.flag, std::sync::Arc::new(replacement));
		tracing::debug!(replaced, "installed mock for {}", record.name);
		Ok(())
	}

	/// Installs a raw function pointer as the mock for the function `name`.
	///
	/// Used at the module boundary, where replacement shapes are compared by
	/// their signature text.
	///
	/// # Safety
	///
	/// `replacement` must point to a function whose Rust signature is the one
	/// described by `signature`, and must stay valid for the rest of the
	/// process.
	pub unsafe fn install_raw(&self, name: &str, signature: &str, replacement: *const ()) -> Result<()> {
		let record = self.registry.lookup(Target::Name(name))?;
		if record.signature != signature {
			return Err(Error::SignatureMismatch {
				name: name.to_string(),
				expected: record.signature.to_string(),
				found: signature.to_string(),
			});
		}
		let replaced = self
			.mocks
			.install(record.id, record.flag, record.erase_raw(replacement));
		tracing::debug!(replaced, "installed module replacement for {name}");
		Ok(())
	}

	/// Returns the replacement installed for `id`, if any.
	///
	/// A lookup observes either a whole replacement or none. A replacement of
	/// a different shape than `D` is reported as none.
	pub fn lookup<D>(&self, id: FnId) -> Option<Callable<D>>
	where
		D: ?Sized + Send + Sync + 'static,
	{
		let erased = self.mocks.lookup(id)?;
		erased.downcast::<Box<D>>().ok().map(Callable::from_arc)
	}

	/// Removes the mock for `target`. Unknown or unmocked targets are a no-op.
	pub fn remove<'a>(&self, target: impl Into<Target<'a>>) {
		let target = target.into();
		let id = match target {
			Target::Id(id) => id,
			Target::Name(name) => match self.registry.resolve(name) {
				Some(id) => id,
				None => return,
			},
		};
		if self.mocks.remove(id) {
			tracing::debug!("removed mock for {target}");
		}
	}

	/// Removes every installed mock, returning how many were removed.
	pub fn remove_all(&self) -> usize {
		let removed = self.mocks.remove_all();
		tracing::debug!("removed {removed} mocks");
		removed
	}

	/// Runs the original implementation of `target` through `call`.
	///
	/// The gating flag is cleared for the duration of the call so a
	/// replacement calling back into its original does not re-enter itself.
	/// Concurrent calls on the same function are serialized.
	pub fn call_original<'a, D, R>(&self, target: impl Into<Target<'a>>, call: impl FnOnce(&D) -> R) -> Result<R>
	where
		D: ?Sized + Send + Sync + 'static,
	{
		let record = self.registry.lookup(target.into())?;
		let original = record.typed_original::<D>()?;

		let _serial = record.call_guard.lock();
		let _restore = Restore::take(record.flag);
		Ok(call(&**original))
	}

	/// Whether a replacement is currently installed for `target`.
	pub fn is_mocked<'a>(&self, target: impl Into<Target<'a>>) -> bool {
		self.registry
			.get(target.into())
			.is_some_and(|record| self.mocks.contains(record.id))
	}

	/// Number of installed replacements.
	pub fn mock_count(&self) -> usize {
		self.mocks.len()
	}

	/// All registered function names, sorted.
	pub fn registered_names(&self) -> Vec<&'static str> {
		self.registry.names()
	}
}

/// Clears a flag and restores it on drop, including on unwind.
struct Restore {
	flag: &'static Flag,
	was_set: bool,
}

impl Restore {
	fn take(flag: &'static Flag) -> Self {
		Self {
			flag,
			was_set: flag.take(),
		}
	}
}

impl Drop for Restore {
	fn drop(&mut self) {
		if self.was_set {
			self.flag.set();
		}
	}
}
