//! Error types for the source transformer.

use std::path::PathBuf;

use thiserror::Error;

/// Errors raised while instrumenting a file or a tree.
#[derive(Debug, Error)]
pub enum Error {
	/// The source is not valid Rust.
	#[error("failed to parse {path}: {error}")]
	Parse {
		/// File being instrumented (or a placeholder for in-memory sources).
		path: PathBuf,
		/// The underlying parse error.
		error: syn::Error,
	},

	/// A file could not be read or written.
	#[error("I/O error on {path}: {error}")]
	Io {
		path: PathBuf,
		error: std::io::Error,
	},

	/// A `Cargo.toml` could not be parsed.
	#[error("invalid manifest {path}: {error}")]
	Manifest {
		path: PathBuf,
		error: toml::de::Error,
	},

	/// Walking the source tree failed.
	#[error("failed to walk source tree: {0}")]
	Walk(#[from] walkdir::Error),

	/// The destination lies inside the source tree in a way that cannot be skipped.
	#[error("destination {dst} must not be the source tree {src}")]
	SameTree { src: PathBuf, dst: PathBuf },

	/// Instrumenting a single file panicked.
	#[error("transforming {path} failed: {message}")]
	TransformFailure { path: PathBuf, message: String },
}

impl Error {
	pub(crate) fn io(path: impl Into<PathBuf>, error: std::io::Error) -> Self {
		Self::Io {
			path: path.into(),
			error,
		}
	}
}

/// Result type for transformer operations.
pub type Result<T> = std::result::Result<T, Error>;
