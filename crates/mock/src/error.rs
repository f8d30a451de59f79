//! Error types for the interception runtime.

use std::path::PathBuf;

use thiserror::Error;

/// Errors raised by the registry, the mock table and the reload loop.
#[derive(Debug, Error)]
pub enum Error {
	/// A mock, reset or original call named a function that never self-registered.
	#[error("function is not registered: {0}")]
	NotRegistered(String),

	/// The replacement does not have the shape of the registered original.
	#[error("signature mismatch for {name}: registered as `{expected}`, got `{found}`")]
	SignatureMismatch {
		/// Function name (or identity) the install targeted.
		name: String,
		/// Shape recorded at registration.
		expected: String,
		/// Shape of the rejected replacement.
		found: String,
	},

	/// The dynamic library could not be opened.
	#[error("failed to load module {path}: {error}")]
	Load {
		/// Module path read from the reload stream.
		path: PathBuf,
		/// The underlying loader error.
		error: libloading::Error,
	},

	/// The module does not export the bootstrap symbol.
	#[error("module {path} has no `{symbol}` entry point: {error}")]
	MissingEntryPoint {
		/// Module path read from the reload stream.
		path: PathBuf,
		/// Symbol that was looked up.
		symbol: &'static str,
		/// The underlying loader error.
		error: libloading::Error,
	},

	/// The module was built against a different patch ABI.
	#[error("module {path} speaks patch ABI v{found}, host expects v{expected}")]
	AbiMismatch {
		/// Module path read from the reload stream.
		path: PathBuf,
		/// ABI version of this runtime.
		expected: u32,
		/// ABI version reported by the module.
		found: u32,
	},

	/// The bootstrap returned a malformed patch set.
	#[error("module {path} returned an invalid patch: {reason}")]
	InvalidPatch {
		/// Module path read from the reload stream.
		path: PathBuf,
		/// What was wrong with the patch.
		reason: String,
	},

	/// Reading the reload stream failed.
	#[error("failed to read reload stream: {0}")]
	Stream(#[from] std::io::Error),
}

/// Result type for runtime operations.
pub type Result<T> = std::result::Result<T, Error>;
