//! Building live crates into loadable modules.

use std::ffi::OsStr;
use std::fs;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use std::time::{SystemTime, UNIX_EPOCH};

use tracing::{debug, info};

use crate::config::Config;
use crate::error::{Error, Result};
use crate::synth::{LIVE_LIB, LiveUnit};

/// File name prefix of built modules in the live directory.
pub const ARTIFACT_PREFIX: &str = "plug";

/// Formats and compiles live crates under the configured scratch root.
pub struct Builder<'a> {
	config: &'a Config,
}

impl<'a> Builder<'a> {
	pub fn new(config: &'a Config) -> Self {
		Self { config }
	}

	/// Directory the live crate is written to. Recreated for every build.
	pub fn crate_dir(&self) -> PathBuf {
		self.config.live_dir().join("crate")
	}

	/// Writes `unit` to a fresh crate directory.
	pub fn write(&self, unit: &LiveUnit) -> Result<PathBuf> {
		let dir = self.crate_dir();
		if dir.exists() {
			fs::remove_dir_all(&dir).map_err(|e| Error::io(&dir, e))?;
		}
		fs::create_dir_all(&dir).map_err(|e| Error::io(&dir, e))?;

		let manifest = dir.join("Cargo.toml");
		fs::write(&manifest, &unit.manifest).map_err(|e| Error::io(&manifest, e))?;
		let source = dir.join("lib.rs");
		fs::write(&source, &unit.source).map_err(|e| Error::io(&source, e))?;
		Ok(dir)
	}

	/// Builds `unit` and copies the library to a uniquely named artifact.
	///
	/// The formatter is optional; an empty formatter command skips it. Any
	/// tool failure is returned with its stderr.
	pub fn build(&self, unit: &LiveUnit) -> Result<PathBuf> {
		let dir = self.write(unit)?;

		if let Some((tool, args)) = self.config.formatter.split_first() {
			run(tool, args.iter().map(OsStr::new).chain([OsStr::new("lib.rs")]), &dir, None)?;
		}

		let (tool, args) = self
			.config
			.compiler
			.split_first()
			.ok_or_else(|| Error::InvalidConfig("compiler command is empty".into()))?;
		let target_dir = self.config.target_dir();
		info!("compiling live crate in {}", dir.display());
		run(tool, args.iter().map(OsStr::new), &dir, Some(&target_dir))?;

		let built = target_dir
			.join(self.config.profile_dir())
			.join(libloading::library_filename(LIVE_LIB));
		let artifact = self.config.live_dir().join(artifact_name());
		fs::copy(&built, &artifact).map_err(|e| Error::io(&built, e))?;
		info!("built {}", artifact.display());
		Ok(artifact)
	}
}

fn run<'s>(tool: &str, args: impl IntoIterator<Item = &'s OsStr>, dir: &Path, target_dir: Option<&Path>) -> Result<()> {
	let mut command = Command::new(tool);
	command.args(args).current_dir(dir).stdin(Stdio::null());
	if let Some(target_dir) = target_dir {
		command.env("CARGO_TARGET_DIR", target_dir);
	}
	debug!("running {command:?}");

	let output = command.output().map_err(|error| Error::Spawn {
		tool: tool.to_string(),
		error,
	})?;
	if !output.status.success() {
		return Err(Error::Toolchain {
			tool: tool.to_string(),
			status: output.status.to_string(),
			stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
		});
	}
	Ok(())
}

/// Unique module file name: `plug<nanos><salt>.<dll extension>`.
///
/// Fresh names keep the loader from returning an already-loaded library.
pub fn artifact_name() -> String {
	let nanos = SystemTime::now()
		.duration_since(UNIX_EPOCH)
		.map(|elapsed| elapsed.as_nanos())
		.unwrap_or_default();
	let salt: u32 = rand::random();
	format!("{ARTIFACT_PREFIX}{nanos}{salt:08x}.{}", std::env::consts::DLL_EXTENSION)
}

#[cfg(test)]
mod tests {
	use std::collections::HashSet;

	use super::*;

	fn unit() -> LiveUnit {
		LiveUnit {
			source: "pub fn f() {}\n".into(),
			manifest: "[package]\nname = \"x\"\n".into(),
			installs: Vec::new(),
			resets: Vec::new(),
		}
	}

	#[test]
	fn artifact_names_are_unique() {
		let names: HashSet<String> = (0..64).map(|_| artifact_name()).collect();
		assert_eq!(names.len(), 64);
		for name in &names {
			assert!(name.starts_with(ARTIFACT_PREFIX));
			assert!(name.ends_with(std::env::consts::DLL_EXTENSION));
		}
	}

	#[test]
	fn write_recreates_the_crate_directory() {
		let scratch = tempfile::tempdir().unwrap();
		let config = Config::new(scratch.path().join("tree"), scratch.path());
		let builder = Builder::new(&config);

		let dir = builder.write(&unit()).unwrap();
		fs::write(dir.join("stale.rs"), "").unwrap();
		let dir = builder.write(&unit()).unwrap();

		assert!(!dir.join("stale.rs").exists());
		assert_eq!(fs::read_to_string(dir.join("lib.rs")).unwrap(), "pub fn f() {}\n");
		assert!(dir.join("Cargo.toml").is_file());
	}

	#[test]
	fn missing_tool_is_a_spawn_error() {
		let scratch = tempfile::tempdir().unwrap();
		let mut config = Config::new(scratch.path().join("tree"), scratch.path());
		config.formatter = Vec::new();
		config.compiler = vec!["hotmock-no-such-compiler".into()];

		let err = Builder::new(&config).build(&unit()).unwrap_err();
		assert!(matches!(err, Error::Spawn { ref tool, .. } if tool == "hotmock-no-such-compiler"));
	}

	#[cfg(unix)]
	#[test]
	fn failing_formatter_reports_diagnostics() {
		let scratch = tempfile::tempdir().unwrap();
		let mut config = Config::new(scratch.path().join("tree"), scratch.path());
		config.formatter = vec!["sh".into(), "-c".into(), "echo bad input >&2; exit 3".into()];

		let err = Builder::new(&config).build(&unit()).unwrap_err();
		match err {
			Error::Toolchain { tool, stderr, .. } => {
				assert_eq!(tool, "sh");
				assert_eq!(stderr.trim(), "bad input");
			}
			other => panic!("expected a toolchain error, got {other}"),
		}
	}
}
