//! The watch loop: notifications in, module paths out.

use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::mpsc::{self, TryRecvError};
use std::thread::{self, JoinHandle};

use notify::event::ModifyKind;
use notify::{Event, EventKind, RecursiveMode, Watcher as _};
use tracing::{debug, error, info};

use crate::compile::Builder;
use crate::config::Config;
use crate::crate_info::ModuleLocation;
use crate::decls::changed_declarations;
use crate::diff::changed_lines;
use crate::error::{Error, Result};
use crate::synth::{LiveUnit, synthesize};


/// Name of the thread started by [`spawn`].
pub const WATCH_THREAD_NAME: &str = "hotmock-watch";

/// Phase of the current reload cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CycleState {
	Idle,
	DebounceWindow,
	Diffing,
	Synthesizing,
	Compiling,
	Loaded,
}

/// Watches a source tree and turns saved edits into reload modules.
///
/// A file is tracked when it is a `.rs` file with a snapshot in the scratch
/// mirror. Writes to tracked files are debounced, diffed against the
/// snapshot, and built into a module whose path is written to the sink. Any
/// failure ends the session.
pub struct Watcher {
	config: Config,
	state: CycleState,
}

impl Watcher {
	pub fn new(mut config: Config) -> Result<Self> {
		config.validate()?;
		config.tree = config
			.tree
			.canonicalize()
			.map_err(|e| Error::io(&config.tree, e))?;
		Ok(Self {
			config,
			state: CycleState::Idle,
		})
	}

	pub fn config(&self) -> &Config {
		&self.config
	}

	pub fn state(&self) -> CycleState {
		self.state
	}

	fn transition(&mut self, next: CycleState) {
		if self.state != next {
			debug!("cycle {:?} -> {next:?}", self.state);
			self.state = next;
		}
	}

	/// Whether `path` takes part in reloading.
	pub fn is_tracked(&self, path: &Path) -> bool {
		path.extension().is_some_and(|ext| ext == "rs")
			&& self
				.config
				.snapshot_path(path)
				.is_ok_and(|snapshot| snapshot.is_file())
	}

	/// Tracked files written by `event`.
	///
	/// Access and metadata notifications are ignored, as is anything about
	/// untracked files. Any other notification about a tracked file is a
	/// protocol violation.
	pub fn classify(&self, event: &Event) -> Result<Vec<PathBuf>> {
		let mut written = Vec::new();
		for path in &event.paths {
			if !self.is_tracked(path) {
				continue;
			}
			match &event.kind {
				EventKind::Access(_) | EventKind::Modify(ModifyKind::Metadata(_)) => {}
				EventKind::Modify(ModifyKind::Data(_) | ModifyKind::Any) => written.push(path.clone()),
				kind => {
					return Err(Error::ProtocolViolation {
						path: path.clone(),
						kind: format!("{kind:?}"),
					});
				}
			}
		}
		Ok(written)
	}

	/// Diffs `path` against its snapshot and synthesizes the live crate.
	pub fn prepare(&mut self, path: &Path) -> Result<LiveUnit> {
		self.transition(CycleState::Diffing);
		let snapshot = self.config.snapshot_path(path)?;
		let original = fs::read_to_string(&snapshot).map_err(|e| Error::io(&snapshot, e))?;
		let current = fs::read_to_string(path).map_err(|e| Error::io(path, e))?;
		let location = ModuleLocation::locate(&self.config.tree, path)?;
		let changed = changed_lines(&original, &current);
		let changes = changed_declarations(path, &location.unit, &current, &original, &changed)?;

		self.transition(CycleState::Synthesizing);
		synthesize(&changes, &location, &self.config)
	}

	/// Builds a reload module for the current contents of `path`.
	pub fn reload(&mut self, path: &Path) -> Result<PathBuf> {
		let unit = self.prepare(path)?;
		self.transition(CycleState::Compiling);
		let artifact = Builder::new(&self.config).build(&unit)?;
		info!(
			"{}: {} installs, {} resets",
			path.display(),
			unit.installs.len(),
			unit.resets.len()
		);
		Ok(artifact)
	}

	/// Runs until a notification or cycle fails, writing one module path per
	/// line to `sink`.
	pub fn run(&mut self, mut sink: impl Write) -> Result<()> {
		let (tx, rx) = mpsc::channel::<notify::Result<Event>>();
		let mut watcher = notify::recommended_watcher(tx)?;
		watcher.watch(&self.config.tree, RecursiveMode::Recursive)?;
		info!("watching {}", self.config.tree.display());

		loop {
			self.transition(CycleState::Idle);
			let event = rx.recv().map_err(|_| Error::WatchClosed)??;
			let mut pending = self.classify(&event)?;
			if pending.is_empty() {
				continue;
			}

			self.transition(CycleState::DebounceWindow);
			thread::sleep(self.config.debounce());
			loop {
				match rx.try_recv() {
					Ok(event) => {
						for path in self.classify(&event?)? {
							if !pending.contains(&path) {
								pending.push(path);
							}
						}
					}
					Err(TryRecvError::Empty) => break,
					Err(TryRecvError::Disconnected) => return Err(Error::WatchClosed),
				}
			}

			for path in pending {
				let artifact = self.reload(&path)?;
				writeln!(sink, "{}", artifact.display())
					.and_then(|()| sink.flush())
					.map_err(Error::Sink)?;
				self.transition(CycleState::Loaded);
			}
		}
	}
}

/// Runs a watch session on its own thread.
pub fn spawn(config: Config, sink: impl Write + Send + 'static) -> io::Result<JoinHandle<Result<()>>> {
	thread::Builder::new()
		.name(WATCH_THREAD_NAME.into())
		.spawn(move || {
			let result = Watcher::new(config).and_then(|mut watcher| watcher.run(sink));
			if let Err(err) = &result {
				error!("watch session ended: {err}");
			}
			result
		})
}
