//! Whole-tree rewriting with original snapshots.

use std::fs;
use std::panic::{self, AssertUnwindSafe};
use std::path::{Path, PathBuf};

use rustc_hash::FxHashMap as HashMap;
use serde::Deserialize;
use walkdir::{DirEntry, WalkDir};

use crate::error::{Error, Result};
use crate::instrument::instrument_source;
use crate::naming::unit_path;


/// Extension appended to mirrored files to form their snapshot path.
pub const SNAPSHOT_SUFFIX: &str = "orig";

/// Name of the runtime crate, whose files are never instrumented.
pub const RUNTIME_CRATE: &str = "hotmock";

/// Where instrumented crates find the runtime.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RuntimeDependency {
	/// Local checkout of the runtime crate.
	Path(PathBuf),
	/// Registry version requirement.
	Version(String),
}

impl RuntimeDependency {
	/// The dependency as a TOML inline table value.
	pub fn to_toml(&self) -> toml::Value {
		let mut table = toml::Table::new();
		match self {
			Self::Path(path) => table.insert("path".into(), path.to_string_lossy().into_owned().into()),
			Self::Version(version) => table.insert("version".into(), version.clone().into()),
		};
		toml::Value::Table(table)
	}
}

/// Snapshot path of a mirrored file: `<file>.orig`.
pub fn snapshot_path(mirrored: &Path) -> PathBuf {
	let mut name = mirrored.as_os_str().to_owned();
	name.push(".");
	name.push(SNAPSHOT_SUFFIX);
	PathBuf::from(name)
}

/// Outcome of rewriting a tree.
#[derive(Debug, Default)]
pub struct TreeReport {
	/// Files written with instrumentation, relative to the tree root.
	pub instrumented: Vec<PathBuf>,
	/// Source files copied verbatim (runtime files, files outside `src/`).
	pub passed_through: Vec<PathBuf>,
	/// Manifests that gained the runtime dependency.
	pub manifests: Vec<PathBuf>,
	/// Non-source files copied.
	pub copied: usize,
	/// Number of instrumented functions across the tree.
	pub functions: usize,
	/// Per-file failures; those files were copied unmodified.
	pub failures: Vec<Error>,
}

/// Mirrors a source tree, instrumenting every crate's `src/` files.
#[derive(Debug, Clone, Default)]
pub struct TreeRewriter {
	runtime: Option<RuntimeDependency>,
}

#[derive(Deserialize)]
struct Manifest {
	package: Option<Package>,
}

#[derive(Deserialize)]
struct Package {
	name: String,
}

/// Crate owning a file: its directory and package name.
#[derive(Debug, Clone)]
struct Owner {
	root: PathBuf,
	package: Option<String>,
}

impl TreeRewriter {
	pub fn new() -> Self {
		Self::default()
	}

	/// Adds `dependency` as `hotmock` to every mirrored manifest lacking it.
	pub fn with_runtime(mut self, dependency: RuntimeDependency) -> Self {
		self.runtime = Some(dependency);
		self
	}

	/// Rewrites `src` into `dst`.
	///
	/// Every instrumented file gets a snapshot of its original contents next
	/// to it. `target/` and hidden directories are skipped, as is `dst` when it
	/// lies inside `src`.
	pub fn rewrite(&self, src: &Path, dst: &Path) -> Result<TreeReport> {
		if src == dst {
			return Err(Error::SameTree {
				src: src.to_path_buf(),
				dst: dst.to_path_buf(),
			});
		}
		tracing::info!("rewriting {} into {}", src.display(), dst.display());

		let mut report = TreeReport::default();
		let mut owners: HashMap<PathBuf, Owner> = HashMap::default();
		let walker = WalkDir::new(src)
			.sort_by_file_name()
			.into_iter()
			.filter_entry(|entry| entry.depth() == 0 || !skip_dir(entry, dst));

		for entry in walker {
			let entry = entry?;
			let path = entry.path();
			let relative = path.strip_prefix(src).unwrap_or(path);
			let target = dst.join(relative);

			if entry.file_type().is_dir() {
				fs::create_dir_all(&target).map_err(|error| Error::io(&target, error))?;
				continue;
			}
			if !entry.file_type().is_file() {
				continue;
			}

			if entry.file_name() == "Cargo.toml" {
				self.mirror_manifest(path, &target, relative, &mut report)?;
			} else if path.extension().is_some_and(|ext| ext == "rs") {
				let owner = owner_of(src, path, &mut owners)?;
				self.mirror_source(path, &target, relative, &owner, &mut report)?;
			} else {
				fs::copy(path, &target).map_err(|error| Error::io(&target, error))?;
				report.copied += 1;
			}
		}

		tracing::info!(
			"instrumented {} functions in {} files ({} passed through, {} failures)",
			report.functions,
			report.instrumented.len(),
			report.passed_through.len(),
			report.failures.len()
		);
		Ok(report)
	}

	fn mirror_source(&self, path: &Path, target: &Path, relative: &Path, owner: &Owner, report: &mut TreeReport) -> Result<()> {
		let source = fs::read_to_string(path).map_err(|error| Error::io(path, error))?;
		let src_root = owner.root.join("src");

		let is_runtime = owner.package.as_deref() == Some(RUNTIME_CRATE);
		if is_runtime || !path.starts_with(&src_root) {
			write(target, &source)?;
			report.passed_through.push(relative.to_path_buf());
			return Ok(());
		}

		let unit = unit_path(&src_root, path);
		let outcome = panic::catch_unwind(AssertUnwindSafe(|| instrument_source(&source, &unit)));
		let instrumented = match outcome {
			Ok(Ok(instrumented)) => instrumented,
			Ok(Err(error)) => {
				tracing::warn!("passing {} through: {error}", relative.display());
				write(target, &source)?;
				report.failures.push(error);
				return Ok(());
			}
			Err(payload) => {
				let error = Error::TransformFailure {
					path: relative.to_path_buf(),
					message: panic_message(payload.as_ref()),
				};
				tracing::warn!("passing {} through: {error}", relative.display());
				write(target, &source)?;
				report.failures.push(error);
				return Ok(());
			}
		};

		write(target, &instrumented.source)?;
		write(&snapshot_path(target), &source)?;
		tracing::debug!("{}: {} functions", relative.display(), instrumented.functions.len());
		report.functions += instrumented.functions.len();
		report.instrumented.push(relative.to_path_buf());
		Ok(())
	}

	fn mirror_manifest(&self, path: &Path, target: &Path, relative: &Path, report: &mut TreeReport) -> Result<()> {
		let text = fs::read_to_string(path).map_err(|error| Error::io(path, error))?;
		let Some(runtime) = &self.runtime else {
			return write(target, &text);
		};

		let mut manifest: toml::Table = text.parse().map_err(|error| Error::Manifest {
			path: path.to_path_buf(),
			error,
		})?;
		let package = manifest
			.get("package")
			.and_then(|package| package.get("name"))
			.and_then(toml::Value::as_str);
		if package.is_none() || package == Some(RUNTIME_CRATE) {
			return write(target, &text);
		}

		let dependencies = manifest
			.entry("dependencies")
			.or_insert(toml::Value::Table(toml::Table::new()));
		let Some(dependencies) = dependencies.as_table_mut() else {
			return write(target, &text);
		};
		if dependencies.contains_key(RUNTIME_CRATE) {
			return write(target, &text);
		}
		dependencies.insert(RUNTIME_CRATE.to_string(), runtime.to_toml());

		write(target, &manifest.to_string())?;
		report.manifests.push(relative.to_path_buf());
		Ok(())
	}
}

fn skip_dir(entry: &DirEntry, dst: &Path) -> bool {
	if !entry.file_type().is_dir() {
		return false;
	}
	let name = entry.file_name().to_string_lossy();
	name.starts_with('.') || name == "target" || entry.path() == dst
}

/// Finds the crate owning `file`: the nearest ancestor with a `Cargo.toml`
/// inside the tree, or the tree root.
fn owner_of(tree: &Path, file: &Path, cache: &mut HashMap<PathBuf, Owner>) -> Result<Owner> {
	let mut dir = file.parent();
	while let Some(current) = dir {
		if let Some(owner) = cache.get(current) {
			return Ok(owner.clone());
		}
		let manifest_path = current.join("Cargo.toml");
		if manifest_path.is_file() {
			let text = fs::read_to_string(&manifest_path).map_err(|error| Error::io(&manifest_path, error))?;
			let manifest: Manifest = toml::from_str(&text).map_err(|error| Error::Manifest {
				path: manifest_path.clone(),
				error,
			})?;
			let owner = Owner {
				root: current.to_path_buf(),
				package: manifest.package.map(|package| package.name),
			};
			cache.insert(current.to_path_buf(), owner.clone());
			return Ok(owner);
		}
		if current == tree {
			break;
		}
		dir = current.parent();
	}
	Ok(Owner {
		root: tree.to_path_buf(),
		package: None,
	})
}

fn write(path: &Path, contents: &str) -> Result<()> {
	if let Some(parent) = path.parent() {
		fs::create_dir_all(parent).map_err(|error| Error::io(parent, error))?;
	}
	fs::write(path, contents).map_err(|error| Error::io(path, error))
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
	if let Some(message) = payload.downcast_ref::<&str>() {
		(*message).to_string()
	} else if let Some(message) = payload.downcast_ref::<String>() {
		message.clone()
	} else {
		"unknown panic".to_string()
	}
}
