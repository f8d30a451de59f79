//! Function interception runtime.
//!
//! Instrumented code registers every eligible function at load through
//! [`register_fn!`] and checks its [`Flag`] on entry. While the flag is set the
//! function consults the global [`Interceptor`] and, if a replacement is
//! installed, returns the replacement's result instead of running its body.
//!
//! ```ignore
//! hotmock::mock::<dyn Fn(&str) -> io::Result<File> + Send + Sync>(
//!     "app/fs/open",
//!     Box::new(|_: &str| Err(io::Error::other("denied"))),
//! )?;
//! assert!(fs::open("/dev/null").is_err());
//! hotmock::reset("app/fs/open");
//! ```

pub mod abi;
mod error;
mod flag;
mod id;
mod interceptor;
mod registry;
mod reload;
mod table;

pub use error::{Error, Result};
pub use flag::Flag;
pub use id::{FnId, Target};
pub use interceptor::Interceptor;
pub use registry::{FnDef, FnReg, Hook};
pub use reload::{RELOAD_THREAD_NAME, Reloader, spawn_stdin_reloader};
pub use table::Callable;

#[doc(hidden)]
pub use inventory;

/// Declares the gating flag of an instrumented function and registers it.
///
/// Arguments: flag identifier, function name, signature text, path to the
/// function, its `dyn Fn(..) -> R + Send + Sync` shape and its `fn(..) -> R`
/// pointer type.
#[macro_export]
macro_rules! register_fn {
	($flag:ident, $name:literal, $signature:literal, $func:expr, $dyn_ty:ty, $ptr_ty:ty $(,)?) => {
		#[doc(hidden)]
		#[allow(non_upper_case_globals)]
		static $flag: $crate::Flag = $crate::Flag::new();

		const _: () = {
			static DEF: $crate::FnDef = $crate::FnDef {
				name: $name,
				signature: $signature,
				flag: &$flag,
				hook: || {
					$crate::Hook::new::<$dyn_ty, $ptr_ty>(
						$crate::FnId::new($func as *const () as usize),
						::std::boxed::Box::new($func) as ::std::boxed::Box<$dyn_ty>,
						|func| ::std::boxed::Box::new(func) as ::std::boxed::Box<$dyn_ty>,
					)
				},
			};
			$crate::inventory::submit! { $crate::FnReg(&DEF) }
		};
	};
}

/// Installs `replacement` for `target` on the global interceptor.
pub fn mock<'a, D>(target: impl Into<Target<'a>>, replacement: Box<D>) -> Result<()>
where
	D: ?Sized + Send + Sync + 'static,
{
	Interceptor::global().install(target, replacement)
}

/// Removes the mock for `target` on the global interceptor. No-op if absent.
pub fn reset<'a>(target: impl Into<Target<'a>>) {
	Interceptor::global().remove(target)
}

/// Removes every mock on the global interceptor.
pub fn reset_all() {
	Interceptor::global().remove_all();
}

/// Calls the original implementation of `target`, bypassing its mock.
pub fn call_original<'a, D, R>(target: impl Into<Target<'a>>, call: impl FnOnce(&D) -> R) -> Result<R>
where
	D: ?Sized + Send + Sync + 'static,
{
	Interceptor::global().call_original(target, call)
}

/// Returns the replacement installed for `id` on the global interceptor.
///
/// This is the lookup the instrumentation gate performs.
pub fn mock_for<D>(id: FnId) -> Option<Callable<D>>
where
	D: ?Sized + Send + Sync + 'static,
{
	Interceptor::global().lookup(id)
}

/// Maps a function name to its identity on the global interceptor.
pub fn resolve(name: &str) -> Result<FnId> {
	Interceptor::global().resolve(name)
}
