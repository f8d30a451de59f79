//! Where a watched file lives: its crate, library name and module path.

use std::path::{Path, PathBuf};

use crate::error::{Error, Result};

/// A crate found by its `Cargo.toml`.
#[derive(Debug, Clone)]
pub struct CrateInfo {
	/// Directory holding the manifest.
	pub root: PathBuf,
	pub package: String,
	/// Library target name, as used in paths (`::lib_name::..`).
	pub lib_name: String,
	pub manifest: toml::Table,
}

impl CrateInfo {
	/// Reads the manifest at `root/Cargo.toml`.
	pub fn read(root: &Path) -> Result<Self> {
		let path = root.join("Cargo.toml");
		let manifest = read_manifest(&path)?;
		let package = manifest
			.get("package")
			.and_then(|package| package.get("name"))
			.and_then(toml::Value::as_str)
			.ok_or_else(|| Error::NotALibrary { path: path.clone() })?
			.to_string();
		let lib_name = manifest
			.get("lib")
			.and_then(|lib| lib.get("name"))
			.and_then(toml::Value::as_str)
			.map_or_else(|| package.replace('-', "_"), str::to_string);
		Ok(Self {
			root: root.to_path_buf(),
			package,
			lib_name,
			manifest,
		})
	}

	/// Runtime dependencies of the crate with workspace inheritance resolved
	/// and relative paths made absolute.
	///
	/// `relocate` maps a manifest directory to the directory its relative
	/// paths should be resolved from.
	pub fn dependencies(&self, relocate: impl Fn(&Path) -> PathBuf) -> Result<toml::Table> {
		let Some(declared) = self.manifest.get("dependencies").and_then(toml::Value::as_table) else {
			return Ok(toml::Table::new());
		};

		let mut workspace: Option<(PathBuf, toml::Table)> = None;
		let mut resolved = toml::Table::new();
		for (name, spec) in declared {
			let inherits = spec
				.get("workspace")
				.and_then(toml::Value::as_bool)
				.unwrap_or(false);
			let (base, mut spec) = if inherits {
				if workspace.is_none() {
					workspace = Some(find_workspace(&self.root)?);
				}
				let (ws_root, ws_deps) = workspace.as_ref().map(|(root, deps)| (root.clone(), deps)).ok_or_else(|| {
					Error::InvalidConfig(format!("{} inherits `{name}` outside a workspace", self.package))
				})?;
				let inherited = ws_deps.get(name).cloned().ok_or_else(|| {
					Error::InvalidConfig(format!("workspace does not declare dependency `{name}`"))
				})?;
				(ws_root, merge_inherited(inherited, spec))
			} else {
				(self.root.clone(), spec.clone())
			};

			if let Some(path) = spec.get("path").and_then(toml::Value::as_str) {
				let absolute = relocate(&base).join(path);
				if let Some(table) = spec.as_table_mut() {
					table.insert("path".into(), absolute.to_string_lossy().into_owned().into());
				}
			}
			resolved.insert(name.clone(), spec);
		}
		Ok(resolved)
	}
}

fn read_manifest(path: &Path) -> Result<toml::Table> {
	let text = std::fs::read_to_string(path).map_err(|error| Error::io(path, error))?;
	text.parse().map_err(|error| Error::Manifest {
		path: path.to_path_buf(),
		error,
	})
}

/// Nearest ancestor manifest with a `[workspace]` table, and its dependencies.
fn find_workspace(start: &Path) -> Result<(PathBuf, toml::Table)> {
	for dir in start.ancestors() {
		let path = dir.join("Cargo.toml");
		if !path.is_file() {
			continue;
		}
		let manifest = read_manifest(&path)?;
		if let Some(workspace) = manifest.get("workspace") {
			let deps = workspace
				.get("dependencies")
				.and_then(toml::Value::as_table)
				.cloned()
				.unwrap_or_default();
			return Ok((dir.to_path_buf(), deps));
		}
	}
	Err(Error::InvalidConfig(format!("no workspace above {}", start.display())))
}

/// Applies a member's `{ workspace = true, .. }` keys on top of the workspace spec.
fn merge_inherited(inherited: toml::Value, local: &toml::Value) -> toml::Value {
	let mut table = match inherited {
		toml::Value::Table(table) => table,
		version => {
			let mut table = toml::Table::new();
			table.insert("version".into(), version);
			table
		}
	};
	if let Some(local) = local.as_table() {
		for (key, value) in local {
			match key.as_str() {
				"workspace" => {}
				"features" => {
					let mut features = table
						.get("features")
						.and_then(toml::Value::as_array)
						.cloned()
						.unwrap_or_default();
					if let Some(extra) = value.as_array() {
						features.extend(extra.iter().cloned());
					}
					table.insert(key.clone(), toml::Value::Array(features));
				}
				_ => {
					table.insert(key.clone(), value.clone());
				}
			}
		}
	}
	toml::Value::Table(table)
}

/// Rust module of a watched file inside its library crate.
#[derive(Debug, Clone)]
pub struct ModuleLocation {
	pub krate: CrateInfo,
	/// Module path below the crate root, e.g. `["net", "http"]`.
	pub module_path: Vec<String>,
	/// Unit path used in function names.
	pub unit: String,
}

impl ModuleLocation {
	/// Locates `file`, searching for its manifest up to `tree`.
	///
	/// Only files under `src/` of a crate with a `src/lib.rs` are accepted;
	/// binary roots (`main.rs`, `src/bin/`) are rejected. Module paths follow
	/// the file layout.
	pub fn locate(tree: &Path, file: &Path) -> Result<Self> {
		let not_lib = || Error::NotALibrary { path: file.to_path_buf() };

		let root = file
			.ancestors()
			.skip(1)
			.take_while(|dir| dir.starts_with(tree))
			.find(|dir| dir.join("Cargo.toml").is_file())
			.ok_or_else(not_lib)?;
		let src = root.join("src");
		if !src.join("lib.rs").is_file() {
			return Err(not_lib());
		}
		let relative = file.strip_prefix(&src).map_err(|_| not_lib())?;
		if relative.starts_with("bin") || relative == Path::new("main.rs") {
			return Err(not_lib());
		}

		let unit = hotmock_rewrite::unit_path(&src, file);
		let module_path = if unit == "crate" {
			Vec::new()
		} else {
			unit.split('/').map(str::to_string).collect()
		};
		Ok(Self {
			krate: CrateInfo::read(root)?,
			module_path,
			unit,
		})
	}

	/// `::lib_name::a::b` tokens for this module.
	pub fn module_tokens(&self) -> proc_macro2::TokenStream {
		let segments = std::iter::once(&self.krate.lib_name)
			.chain(&self.module_path)
			.map(|segment| quote::format_ident!("{}", segment));
		quote::quote!(#(::#segments)*)
	}
}

#[cfg(test)]
mod tests {
	use std::fs;

	use super::*;

	fn write_file(root: &Path, relative: &str, contents: &str) {
		let path = root.join(relative);
		fs::create_dir_all(path.parent().unwrap()).unwrap();
		fs::write(path, contents).unwrap();
	}

	#[test]
	fn locates_modules_of_library_crates() {
		let tree = tempfile::tempdir().unwrap();
		let root = tree.path();
		write_file(root, "live/Cargo.toml", "[package]\nname = \"live-demo\"\nversion = \"0.1.0\"\n");
		write_file(root, "live/src/lib.rs", "pub mod subpkg;\n");
		write_file(root, "live/src/subpkg/mod.rs", "");
		write_file(root, "live/src/subpkg/deep.rs", "");
		write_file(root, "live/src/main.rs", "fn main() {}\n");

		let location = ModuleLocation::locate(root, &root.join("live/src/subpkg/deep.rs")).unwrap();
		assert_eq!(location.krate.package, "live-demo");
		assert_eq!(location.krate.lib_name, "live_demo");
		assert_eq!(location.module_path, vec!["subpkg", "deep"]);
		assert_eq!(location.unit, "subpkg/deep");
		assert_eq!(location.module_tokens().to_string().replace(' ', ""), "::live_demo::subpkg::deep");

		let location = ModuleLocation::locate(root, &root.join("live/src/subpkg/mod.rs")).unwrap();
		assert_eq!(location.module_path, vec!["subpkg"]);

		let location = ModuleLocation::locate(root, &root.join("live/src/lib.rs")).unwrap();
		assert!(location.module_path.is_empty());

		assert!(matches!(
			ModuleLocation::locate(root, &root.join("live/src/main.rs")),
			Err(Error::NotALibrary { .. })
		));
	}

	#[test]
	fn binary_only_crates_are_rejected() {
		let tree = tempfile::tempdir().unwrap();
		let root = tree.path();
		write_file(root, "tool/Cargo.toml", "[package]\nname = \"tool\"\nversion = \"0.1.0\"\n");
		write_file(root, "tool/src/main.rs", "fn main() {}\n");
		write_file(root, "tool/src/util.rs", "");
		assert!(matches!(
			ModuleLocation::locate(root, &root.join("tool/src/util.rs")),
			Err(Error::NotALibrary { .. })
		));
	}

	#[test]
	fn dependencies_resolve_workspace_inheritance() {
		let tree = tempfile::tempdir().unwrap();
		let root = tree.path();
		write_file(
			root,
			"Cargo.toml",
			"[workspace]\nmembers = [\"app\"]\n[workspace.dependencies]\nserde = { version = \"1\", features = [\"derive\"] }\nlog = \"0.4\"\nshared = { path = \"shared\" }\n",
		);
		write_file(
			root,
			"app/Cargo.toml",
			"[package]\nname = \"app\"\nversion = \"0.1.0\"\n[lib]\nname = \"app_core\"\n[dependencies]\nserde = { workspace = true, features = [\"rc\"] }\nlog.workspace = true\nshared.workspace = true\nlocal = { path = \"../local\" }\n",
		);

		let info = CrateInfo::read(&root.join("app")).unwrap();
		assert_eq!(info.lib_name, "app_core");
		let deps = info.dependencies(|dir| PathBuf::from("/mirror").join(dir.strip_prefix(root).unwrap())).unwrap();

		assert_eq!(deps["log"]["version"].as_str(), Some("0.4"));
		let features: Vec<_> = deps["serde"]["features"]
			.as_array()
			.unwrap()
			.iter()
			.filter_map(toml::Value::as_str)
			.collect();
		assert_eq!(features, ["derive", "rc"]);
		assert_eq!(deps["shared"]["path"].as_str(), Some("/mirror/shared"));
		assert_eq!(deps["local"]["path"].as_str(), Some("/mirror/app/../local"));
	}
}
