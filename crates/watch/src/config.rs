//! Watcher configuration.
//!
//! Written in TOML:
//!
//! ```toml
//! tree = "app"
//! scratch = "/tmp/hotmock/app"
//! debounce_ms = 25
//! formatter = ["rustfmt", "--edition", "2024"]
//! compiler = ["cargo", "build", "--lib", "--quiet"]
//! edition = "2024"
//! runtime = { path = "/src/hotmock/crates/mock" }
//! ```
//!
//! `tree` is the watched source tree; `scratch` holds its instrumented mirror
//! (with `.orig` snapshots, as produced by `hotmock_rewrite::TreeRewriter`)
//! and the live build directory.

use std::path::{Path, PathBuf};
use std::time::Duration;

use hotmock_rewrite::RuntimeDependency;
use serde::Deserialize;

use crate::error::{Error, Result};

/// Directory under the scratch root holding the live crate and built modules.
pub const LIVE_DIR: &str = ".live";

fn default_debounce_ms() -> u64 {
	25
}

fn default_edition() -> String {
	"2024".to_string()
}

fn default_formatter() -> Vec<String> {
	["rustfmt", "--edition", "2024"].map(String::from).to_vec()
}

fn default_compiler() -> Vec<String> {
	["cargo", "build", "--lib", "--quiet"].map(String::from).to_vec()
}

fn default_runtime() -> RuntimeDependency {
	RuntimeDependency::Version(env!("CARGO_PKG_VERSION").to_string())
}

/// Parsed watcher configuration.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Config {
	/// Watched source tree.
	pub tree: PathBuf,
	/// Root of the instrumented mirror and the live build directory.
	pub scratch: PathBuf,
	/// Delay absorbing editor save bursts.
	#[serde(default = "default_debounce_ms")]
	pub debounce_ms: u64,
	/// Formatter command run on the synthesized source. Empty disables it.
	#[serde(default = "default_formatter")]
	pub formatter: Vec<String>,
	/// Compiler command building the live crate as a loadable module.
	#[serde(default = "default_compiler")]
	pub compiler: Vec<String>,
	/// Edition of the synthesized crate.
	#[serde(default = "default_edition")]
	pub edition: String,
	/// How the synthesized crate depends on the runtime.
	#[serde(default = "default_runtime")]
	pub runtime: RuntimeDependency,
	/// Cargo target directory for live builds. Defaults to `<scratch>/.live/target`.
	#[serde(default)]
	pub target_dir: Option<PathBuf>,
}

impl Config {
	/// Configuration with defaults for everything but the two roots.
	pub fn new(tree: impl Into<PathBuf>, scratch: impl Into<PathBuf>) -> Self {
		Self {
			tree: tree.into(),
			scratch: scratch.into(),
			debounce_ms: default_debounce_ms(),
			formatter: default_formatter(),
			compiler: default_compiler(),
			edition: default_edition(),
			runtime: default_runtime(),
			target_dir: None,
		}
	}

	/// Parses a TOML document.
	pub fn parse(input: &str) -> std::result::Result<Self, toml::de::Error> {
		toml::from_str(input)
	}

	/// Loads and validates a configuration file. Relative roots are resolved
	/// against the file's directory.
	pub fn load(path: impl AsRef<Path>) -> Result<Self> {
		let path = path.as_ref();
		let content = std::fs::read_to_string(path).map_err(|error| Error::io(path, error))?;
		let mut config = Self::parse(&content).map_err(|error| Error::Config {
			path: path.to_path_buf(),
			error,
		})?;

		if let Some(base) = path.parent() {
			config.tree = base.join(&config.tree);
			config.scratch = base.join(&config.scratch);
			config.target_dir = config.target_dir.map(|dir| base.join(dir));
		}
		config.validate()?;
		Ok(config)
	}

	/// Rejects configurations the watcher cannot run with.
	pub fn validate(&self) -> Result<()> {
		if self.compiler.is_empty() {
			return Err(Error::InvalidConfig("compiler command is empty".into()));
		}
		let tree = normalize(&self.tree);
		let scratch = normalize(&self.scratch);
		if scratch.starts_with(&tree) {
			return Err(Error::InvalidConfig(format!(
				"scratch root {} must not be inside the watched tree {}",
				self.scratch.display(),
				self.tree.display()
			)));
		}
		Ok(())
	}

	pub fn debounce(&self) -> Duration {
		Duration::from_millis(self.debounce_ms)
	}

	/// Path of `file` relative to the watched tree.
	pub fn relative<'a>(&self, file: &'a Path) -> Result<&'a Path> {
		file.strip_prefix(&self.tree)
			.map_err(|_| Error::InvalidConfig(format!("{} is outside the watched tree", file.display())))
	}

	/// Mirrored location of `file` under the scratch root.
	pub fn mirror_path(&self, file: &Path) -> Result<PathBuf> {
		Ok(self.scratch.join(self.relative(file)?))
	}

	/// Cached original of `file`: the diff baseline.
	pub fn snapshot_path(&self, file: &Path) -> Result<PathBuf> {
		Ok(hotmock_rewrite::snapshot_path(&self.mirror_path(file)?))
	}

	pub fn live_dir(&self) -> PathBuf {
		self.scratch.join(LIVE_DIR)
	}

	pub fn target_dir(&self) -> PathBuf {
		self.target_dir
			.clone()
			.unwrap_or_else(|| self.live_dir().join("target"))
	}

	/// Cargo profile directory the compiler command builds into.
	pub fn profile_dir(&self) -> &'static str {
		if self.compiler.iter().any(|arg| arg == "--release" || arg == "-r") {
			"release"
		} else {
			"debug"
		}
	}
}

/// Canonical form of `path` when it exists, otherwise the path as given.
fn normalize(path: &Path) -> PathBuf {
	std::fs::canonicalize(path).unwrap_or_else(|_| path.to_path_buf())
}
