//! Source transformer for hotmock.
//!
//! Instruments every eligible function of a Rust source file with a gate that
//! consults the interception runtime, and registers each function with
//! [`hotmock::register_fn!`]. Instrumentation is a pure text splice over a
//! `syn` parse: all edits are computed first and applied to a copy, and no
//! original line changes its number.
//!
//! ```ignore
//! let out = hotmock_rewrite::instrument_source(&text, "net/http")?;
//! for function in &out.functions {
//!     println!("{} -> {}", function.name, function.flag);
//! }
//! ```
//!
//! [`hotmock::register_fn!`]: https://docs.rs/hotmock

mod error;
mod instrument;
pub mod naming;
pub mod plan;
mod sites;
mod tree;

pub use error::{Error, Result};
pub use instrument::{Instrumented, InstrumentedFn, SkippedFn, instrument_source};
pub use naming::{LocalName, function_name, unit_path};
pub use plan::{Plan, Receiver, Skip};
pub use sites::{FnSite, line_span, sites};
pub use tree::{RUNTIME_CRATE, RuntimeDependency, SNAPSHOT_SUFFIX, TreeReport, TreeRewriter, snapshot_path};
