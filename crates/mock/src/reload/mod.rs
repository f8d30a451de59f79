//! Reload loop: loads incremental modules and applies their patches.

use std::io::BufRead;
use std::path::{Path, PathBuf};
use std::thread::{self, JoinHandle};

use libloading::{Library, Symbol};

use crate::abi::{ABI_VERSION, BOOTSTRAP_SYMBOL, BootstrapFn, PatchKind, PatchSet};
use crate::error::{Error, Result};
use crate::interceptor::Interceptor;


/// Name of the thread started by [`spawn_stdin_reloader`].
pub const RELOAD_THREAD_NAME: &str = "hotmock-reload";

struct LoadedModule {
	path: PathBuf,
	library: Library,
}

/// Consumes module paths and applies each module's patch set to an
/// [`Interceptor`].
///
/// Loaded modules are never unloaded: replacements installed from a module
/// point into its code for the rest of the process.
pub struct Reloader<'a> {
	interceptor: &'a Interceptor,
	modules: Vec<LoadedModule>,
}

impl<'a> Reloader<'a> {
	pub fn new(interceptor: &'a Interceptor) -> Self {
		Self {
			interceptor,
			modules: Vec::new(),
		}
	}

	/// Loads the module at `path`, runs its bootstrap and applies the result.
	///
	/// Returns the number of operations applied.
	pub fn load(&mut self, path: &Path) -> Result<usize> {
		tracing::info!("loading module {}", path.display());

		// SAFETY: modules are produced by the incremental builder; their
		// initializers only submit registrations.
		let library = unsafe { Library::new(path) }.map_err(|error| Error::Load {
			path: path.to_path_buf(),
			error,
		})?;

		// SAFETY: the symbol is declared by the builder with `BootstrapFn`'s signature.
		let patch = unsafe {
			let bootstrap: Symbol<BootstrapFn> =
				library
					.get(BOOTSTRAP_SYMBOL.as_bytes())
					.map_err(|error| Error::MissingEntryPoint {
						path: path.to_path_buf(),
						symbol: BOOTSTRAP_SYMBOL,
						error,
					})?;
			bootstrap()
		};

		// Kept before applying: a failed patch may already have installed
		// pointers into the library.
		self.modules.push(LoadedModule {
			path: path.to_path_buf(),
			library,
		});
		// SAFETY: the patch points into the library, which is never unloaded.
		let applied = unsafe { self.apply(path, &patch) }?;
		tracing::info!("applied {applied} patch operations from {}", path.display());
		Ok(applied)
	}

	/// Applies `patch` in order.
	///
	/// # Safety
	///
	/// Every string and install target in `patch` must stay valid for the rest
	/// of the process.
	pub(crate) unsafe fn apply(&self, origin: &Path, patch: &PatchSet) -> Result<usize> {
		if patch.abi_version != ABI_VERSION {
			return Err(Error::AbiMismatch {
				path: origin.to_path_buf(),
				expected: ABI_VERSION,
				found: patch.abi_version,
			});
		}
		let invalid = |reason: String| Error::InvalidPatch {
			path: origin.to_path_buf(),
			reason,
		};

		// SAFETY: guaranteed by the caller.
		let ops = unsafe { patch.ops() };
		for (index, op) in ops.iter().enumerate() {
			// SAFETY: guaranteed by the caller.
			let name = unsafe { op.name.as_str() }
				.ok_or_else(|| invalid(format!("operation {index} has no valid name")))?;
			match op.kind() {
				Some(PatchKind::Reset) => self.interceptor.remove(name),
				Some(PatchKind::Install) => {
					if op.target.is_null() {
						return Err(invalid(format!("install of {name} has a null target")));
					}
					// SAFETY: guaranteed by the caller.
					let signature = unsafe { op.signature.as_str() }
						.ok_or_else(|| invalid(format!("install of {name} has no valid signature")))?;
					// SAFETY: the module compiled `target` with the signature it reports.
					unsafe { self.interceptor.install_raw(name, signature, op.target) }?;
				}
				None => return Err(invalid(format!("operation {index} has unknown kind {}", op.kind))),
			}
		}
		Ok(ops.len())
	}

	/// Reads newline-delimited module paths from `reader` until end of input.
	///
	/// The first failure stops the loop and is returned.
	pub fn run(&mut self, reader: impl BufRead) -> Result<()> {
		for line in reader.lines() {
			let line = line?;
			let path = line.trim();
			if path.is_empty() {
				continue;
			}
			self.load(Path::new(path))?;
		}
		tracing::info!("reload stream closed after {} modules", self.modules.len());
		Ok(())
	}

	/// Paths of the modules loaded so far, in load order.
	pub fn loaded(&self) -> impl Iterator<Item = &Path> {
		self.modules.iter().map(|module| module.path.as_path())
	}
}

impl Drop for Reloader<'_> {
	fn drop(&mut self) {
		for module in self.modules.drain(..) {
			std::mem::forget(module.library);
		}
	}
}

/// Runs a [`Reloader`] over standard input against the global interceptor.
///
/// Any load failure is fatal: it is logged and the process exits with status 1.
pub fn spawn_stdin_reloader() -> std::io::Result<JoinHandle<()>> {
	thread::Builder::new()
		.name(RELOAD_THREAD_NAME.to_string())
		.spawn(|| {
			let mut reloader = Reloader::new(Interceptor::global());
			if let Err(error) = reloader.run(std::io::stdin().lock()) {
				tracing::error!("hot reload failed: {error}");
				std::process::exit(1);
			}
		})
}
