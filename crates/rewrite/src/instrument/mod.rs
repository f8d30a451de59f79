//! Instrumentation of a single source file.
//!
//! Edits are computed from a parse of the input and spliced into a copy of its
//! text. Gates go on the line of the body's opening brace and registrations are
//! appended after the last line, so every original line keeps its number.

use std::cmp::Reverse;
use std::path::PathBuf;

use quote::ToTokens;

use crate::error::{Error, Result};
use crate::naming::{RESERVED_IDENT, flag_name, function_name};
use crate::plan::{Plan, Skip};
use crate::sites::{FnSite, sites};


/// An instrumented function.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InstrumentedFn {
	pub name: String,
	pub flag: String,
	pub signature: String,
}

/// A function left untouched.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SkippedFn {
	pub name: String,
	pub reason: Skip,
}

/// Result of instrumenting one file.
#[derive(Debug, Clone)]
pub struct Instrumented {
	pub source: String,
	pub functions: Vec<InstrumentedFn>,
	pub skipped: Vec<SkippedFn>,
}

/// Instruments every eligible function of `source`, a file of unit `unit`.
pub fn instrument_source(source: &str, unit: &str) -> Result<Instrumented> {
	let file = syn::parse_file(source).map_err(|error| Error::Parse {
		path: PathBuf::from(unit),
		error,
	})?;
	let lines = LineIndex::new(source);

	let mut edits = Vec::new();
	let mut registrations = Vec::new();
	let mut functions = Vec::new();
	let mut skipped = Vec::new();

	for site in sites(&file) {
		let name = function_name(unit, &site.local);
		match &site.plan {
			Ok(plan) => {
				let flag = flag_name(unit, plan.body);
				let (line, column) = plan.insert_at;
				edits.push((lines.offset(line, column), gate(&flag, &site, plan)));
				registrations.push(registration(&flag, &name, &site, plan));
				functions.push(InstrumentedFn {
					name,
					flag,
					signature: plan.dyn_type(),
				});
			}
			Err(reason) => {
				tracing::trace!("skipping {name}: {reason}");
				skipped.push(SkippedFn { name, reason: *reason });
			}
		}
	}

	let mut output = source.to_string();
	edits.sort_by_key(|(offset, _)| Reverse(*offset));
	for (offset, text) in edits {
		output.insert_str(offset, &text);
	}
	if !registrations.is_empty() {
		if !output.ends_with('\n') {
			output.push('\n');
		}
		for line in registrations {
			output.push_str(&line);
			output.push('\n');
		}
	}

	Ok(Instrumented {
		source: output,
		functions,
		skipped,
	})
}

/// Path expression naming the function from inside its own module.
fn fn_path(site: &FnSite, plan: &Plan) -> String {
	match (&plan.self_ty, &plan.trait_path) {
		(Some(_), Some(trait_path)) => format!("<Self as {trait_path}>::{}", site.local.ident()),
		(Some(_), None) => format!("Self::{}", site.local.ident()),
		(None, _) => format!("self::{}", site.local.ident()),
	}
}

/// Path expression naming the function at module level.
fn item_path(site: &FnSite, plan: &Plan) -> String {
	match (&plan.self_ty, &plan.trait_path) {
		(Some(self_ty), Some(trait_path)) => format!("<{self_ty} as {trait_path}>::{}", site.local.ident()),
		(Some(self_ty), None) => format!("{self_ty}::{}", site.local.ident()),
		(None, _) => format!("self::{}", site.local.ident()),
	}
}

fn gate(flag: &str, site: &FnSite, plan: &Plan) -> String {
	format!(
		"if {flag}.is_set() {{ if let ::core::option::Option::Some({RESERVED_IDENT}) = ::hotmock::mock_for::<{dyn_ty}>(::hotmock::FnId::new({path} as *const () as usize)) {{ return (*{RESERVED_IDENT})({args}); }} }} ",
		dyn_ty = plan.dyn_type(),
		path = fn_path(site, plan),
		args = plan.forwarded_args().join(", "),
	)
}

fn registration(flag: &str, name: &str, site: &FnSite, plan: &Plan) -> String {
	let mut line = String::new();
	for attr in &site.cfg {
		line.push_str(&attr.to_token_stream().to_string());
		line.push(' ');
	}
	line.push_str(&format!(
		"::hotmock::register_fn!({flag}, {name:?}, {signature:?}, {path}, {dyn_ty}, {ptr_ty});",
		signature = plan.dyn_type(),
		path = item_path(site, plan),
		dyn_ty = plan.dyn_type(),
		ptr_ty = plan.ptr_type(),
	));
	line
}

/// Maps 1-based lines and 0-based character columns to byte offsets.
pub(crate) struct LineIndex<'a> {
	source: &'a str,
	starts: Vec<usize>,
}

impl<'a> LineIndex<'a> {
	pub(crate) fn new(source: &'a str) -> Self {
		let starts = std::iter::once(0)
			.chain(source.match_indices('\n').map(|(index, _)| index + 1))
			.collect();
		Self { source, starts }
	}

	pub(crate) fn offset(&self, line: usize, column: usize) -> usize {
		let Some(&start) = self.starts.get(line.saturating_sub(1)) else {
			return self.source.len();
		};
		self.source[start..]
			.char_indices()
			.nth(column)
			.map_or(self.source.len(), |(index, _)| start + index)
	}
}
