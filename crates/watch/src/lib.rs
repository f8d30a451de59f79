//! Change watcher and incremental builder for hotmock.
//!
//! A [`Watcher`] observes a source tree that was mirrored into a scratch root
//! by [`hotmock_rewrite::TreeRewriter`]. Each saved edit is diffed against the
//! file's snapshot; when only function bodies changed, the changed functions
//! are synthesized into a standalone live crate, compiled to a dynamic library
//! and the library path is written to the reload stream, one per line.
//!
//! ```ignore
//! let config = hotmock_watch::Config::load("hotmock.toml")?;
//! let handle = hotmock_watch::spawn(config, std::io::stdout())?;
//! ```
//!
//! Reloaded functions are compiled against the instrumented mirror of their
//! crate, so they see its public items through a glob import but not its
//! private ones, and statics in the live module are separate copies.

mod compile;
mod config;
mod crate_info;
mod decls;
mod diff;
mod error;
mod synth;
mod watcher;

pub use compile::{ARTIFACT_PREFIX, Builder, artifact_name};
pub use config::{Config, LIVE_DIR};
pub use crate_info::{CrateInfo, ModuleLocation};
pub use decls::{ChangedFn, Changes, FnItem, changed_declarations};
pub use diff::{LineOp, changed_lines, line_ops};
pub use error::{Error, Result};
pub use synth::{LIVE_LIB, LIVE_PACKAGE, LiveUnit, synthesize};
pub use watcher::{CycleState, WATCH_THREAD_NAME, Watcher, spawn};
