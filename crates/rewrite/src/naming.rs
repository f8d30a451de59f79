//! Function names and flag identifiers.
//!
//! A function name is `<unit>/<Function>` or `<unit>/<Receiver>.<Method>`,
//! where `<unit>` is the file path relative to the crate source root without
//! its extension and `<Receiver>` carries a `*` prefix when the method takes
//! `self` by reference.

use std::fmt;
use std::path::{Component, Path};

use sha2::{Digest, Sha256};

/// Prefix of every generated flag identifier.
pub const FLAG_PREFIX: &str = "__HOTMOCK_FLAG_";

/// Identifier reserved for the replacement binding inside gates.
pub const RESERVED_IDENT: &str = "__hotmock";

/// Lifetime shared by a `&self` receiver and a borrowed output in call shapes.
pub const BOUND_LIFETIME: &str = "'__hotmock";

/// Name of a function relative to its unit.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum LocalName {
	/// Free function.
	Function(String),
	/// Method or associated function of an impl block.
	Method {
		receiver: String,
		by_ref: bool,
		method: String,
	},
}

impl LocalName {
	/// The function or method identifier.
	pub fn ident(&self) -> &str {
		match self {
			Self::Function(name) => name,
			Self::Method { method, .. } => method,
		}
	}
}

impl fmt::Display for LocalName {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		match self {
			Self::Function(name) => f.write_str(name),
			Self::Method {
				receiver,
				by_ref: true,
				method,
			} => write!(f, "*{receiver}.{method}"),
			Self::Method {
				receiver,
				by_ref: false,
				method,
			} => write!(f, "{receiver}.{method}"),
		}
	}
}

/// Unit path of `file` relative to `root`.
///
/// `lib.rs`, `main.rs` and `mod.rs` name their directory, so
/// `src/net/mod.rs` and `src/net.rs` both map to `net`. Crate roots map to
/// `crate`.
pub fn unit_path(root: &Path, file: &Path) -> String {
	let relative = file.strip_prefix(root).unwrap_or(file);
	let mut parts: Vec<String> = relative
		.components()
		.filter_map(|component| match component {
			Component::Normal(part) => Some(part.to_string_lossy().into_owned()),
			_ => None,
		})
		.collect();

	if let Some(last) = parts.pop() {
		let stem = last.strip_suffix(".rs").unwrap_or(&last);
		if !matches!(stem, "lib" | "main" | "mod") {
			parts.push(stem.to_string());
		}
	}

	if parts.is_empty() {
		"crate".to_string()
	} else {
		parts.join("/")
	}
}

/// Globally unique function name.
pub fn function_name(unit: &str, local: &LocalName) -> String {
	format!("{unit}/{local}")
}

/// Source position of a function body: its braces as `(line, column)` pairs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BodySpan {
	pub open: (usize, usize),
	pub close: (usize, usize),
}

/// Content-addressed flag identifier for the body at `span` in `unit`.
pub fn flag_name(unit: &str, span: BodySpan) -> String {
	let mut hasher = Sha256::new();
	hasher.update(unit.as_bytes());
	hasher.update(format!(
		":{}:{}-{}:{}",
		span.open.0, span.open.1, span.close.0, span.close.1
	));
	let digest = hasher.finalize();

	let mut name = String::with_capacity(FLAG_PREFIX.len() + 32);
	name.push_str(FLAG_PREFIX);
	for byte in &digest[..16] {
		name.push_str(&format!("{byte:02x}"));
	}
	name
}
