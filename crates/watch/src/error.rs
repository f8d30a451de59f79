//! Error types for the watcher and incremental builder.

use std::path::PathBuf;

use thiserror::Error;

/// Errors ending a reload cycle. Every one of them ends the watch session.
#[derive(Debug, Error)]
pub enum Error {
	#[error("I/O error on {path}: {error}")]
	Io {
		path: PathBuf,
		error: std::io::Error,
	},

	/// The configuration file is not valid TOML for [`Config`](crate::Config).
	#[error("invalid config {path}: {error}")]
	Config {
		path: PathBuf,
		error: toml::de::Error,
	},

	/// The configuration is well-formed but unusable.
	#[error("invalid config: {0}")]
	InvalidConfig(String),

	/// A `Cargo.toml` could not be parsed.
	#[error("invalid manifest {path}: {error}")]
	Manifest {
		path: PathBuf,
		error: toml::de::Error,
	},

	#[error("failed to parse {path}: {error}")]
	Parse {
		path: PathBuf,
		error: syn::Error,
	},

	/// The edit touches something other than function bodies.
	#[error("unsupported edit in {path}: {reason}")]
	UnsupportedEdit { path: PathBuf, reason: String },

	/// The file does not belong to a library target.
	#[error("{path} is not part of a library crate")]
	NotALibrary { path: PathBuf },

	/// A tracked file saw a notification other than a write.
	#[error("unexpected {kind} notification for {path}")]
	ProtocolViolation { path: PathBuf, kind: String },

	#[error("file watcher failed: {0}")]
	Notify(#[from] notify::Error),

	/// The notification channel closed.
	#[error("file watcher stopped")]
	WatchClosed,

	#[error("failed to run {tool}: {error}")]
	Spawn {
		tool: String,
		error: std::io::Error,
	},

	/// A formatter or compiler run failed. Carries the tool's diagnostics.
	#[error("{tool} failed with status {status}:\n{stderr}")]
	Toolchain {
		tool: String,
		status: String,
		stderr: String,
	},

	/// Writing a module path to the reload stream failed.
	#[error("failed to write to reload stream: {0}")]
	Sink(#[source] std::io::Error),

	#[error(transparent)]
	Rewrite(#[from] hotmock_rewrite::Error),
}

impl Error {
	pub(crate) fn io(path: impl Into<PathBuf>, error: std::io::Error) -> Self {
		Self::Io {
			path: path.into(),
			error,
		}
	}

	pub(crate) fn unsupported(path: impl Into<PathBuf>, reason: impl Into<String>) -> Self {
		Self::UnsupportedEdit {
			path: path.into(),
			reason: reason.into(),
		}
	}
}

/// Result type for watcher operations.
pub type Result<T> = std::result::Result<T, Error>;
