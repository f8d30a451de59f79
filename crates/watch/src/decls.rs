//! Maps changed lines to the declarations that contain them.

use std::collections::BTreeSet;
use std::path::Path;

use hotmock_rewrite::plan::ImplTarget;
use hotmock_rewrite::{FnSite, LocalName, Plan, function_name, line_span, sites};
use syn::spanned::Spanned;
use syn::{ImplItem, ImplItemFn, Item, ItemFn, ItemUse};

use crate::error::{Error, Result};

/// Syntax of a changed function.
#[derive(Debug, Clone)]
pub enum FnItem {
	Free(ItemFn),
	Method { target: ImplTarget, method: ImplItemFn },
}

/// A function whose body changed.
#[derive(Debug, Clone)]
pub struct ChangedFn {
	/// Registered function name.
	pub name: String,
	pub local: LocalName,
	pub plan: Plan,
	pub item: FnItem,
}

/// Declaration-level view of one edit.
#[derive(Debug, Clone, Default)]
pub struct Changes {
	pub functions: Vec<ChangedFn>,
	/// `use` items of the new file.
	pub uses: Vec<ItemUse>,
	/// Names of every instrumented function of the original file.
	pub resets: Vec<String>,
}

/// Finds the function declarations of `new` covering `changed` lines.
///
/// `use` items absorb their lines without producing a declaration. Changed
/// lines outside any function, changed functions that did not exist in
/// `original`, functions that cannot be instrumented and functions whose
/// shape changed are all `UnsupportedEdit`.
pub fn changed_declarations(
	path: &Path,
	unit: &str,
	new: &str,
	original: &str,
	changed: &BTreeSet<usize>,
) -> Result<Changes> {
	let parse = |source: &str| {
		syn::parse_file(source).map_err(|error| Error::Parse {
			path: path.to_path_buf(),
			error,
		})
	};
	let new_file = parse(new)?;
	let original_file = parse(original)?;

	let original_sites = sites(&original_file);
	let resets = original_sites
		.iter()
		.filter(|site| site.plan.is_ok())
		.map(|site| function_name(unit, &site.local))
		.collect();

	let mut remaining = changed.clone();
	let mut uses = Vec::new();
	for item in &new_file.items {
		if let Item::Use(item_use) = item {
			for line in line_span(item.span()) {
				remaining.remove(&line);
			}
			uses.push(item_use.clone());
		}
	}

	let new_sites = sites(&new_file);
	let items = fn_items(&new_file);
	debug_assert_eq!(new_sites.len(), items.len());

	let mut functions = Vec::new();
	for (site, item) in new_sites.into_iter().zip(items) {
		let touched = site.lines.clone().any(|line| remaining.contains(&line));
		for line in site.lines.clone() {
			remaining.remove(&line);
		}
		if !touched {
			continue;
		}
		functions.push(changed_fn(path, unit, site, item, &original_sites)?);
	}

	if !remaining.is_empty() {
		let lines: Vec<String> = remaining.iter().map(usize::to_string).collect();
		return Err(Error::unsupported(
			path,
			format!("lines {} changed outside of function bodies", lines.join(", ")),
		));
	}

	tracing::debug!("{}: {} changed functions", path.display(), functions.len());
	Ok(Changes {
		functions,
		uses,
		resets,
	})
}

fn changed_fn(path: &Path, unit: &str, site: FnSite, item: Option<FnItem>, original: &[FnSite]) -> Result<ChangedFn> {
	let name = function_name(unit, &site.local);
	let plan = site
		.plan
		.map_err(|skip| Error::unsupported(path, format!("{name} cannot be hot reloaded: {skip}")))?;
	let mut previous = original.iter().filter(|candidate| candidate.local == site.local).peekable();
	if previous.peek().is_none() {
		return Err(Error::unsupported(path, format!("{name} is a new declaration")));
	}
	let Some(before) = previous.find_map(|candidate| candidate.plan.as_ref().ok()) else {
		return Err(Error::unsupported(path, format!("{name} was not instrumented")));
	};
	if before.dyn_type() != plan.dyn_type() {
		return Err(Error::unsupported(
			path,
			format!("{name} changed shape from `{}` to `{}`", before.dyn_type(), plan.dyn_type()),
		));
	}
	let item = item.ok_or_else(|| Error::unsupported(path, format!("{name} cannot be hot reloaded")))?;
	Ok(ChangedFn {
		name,
		local: site.local,
		plan,
		item,
	})
}

/// Function syntax in the order `sites` reports it. Methods of impls that
/// cannot be instrumented are `None`.
fn fn_items(file: &syn::File) -> Vec<Option<FnItem>> {
	let mut items = Vec::new();
	for item in &file.items {
		match item {
			Item::Fn(func) => items.push(Some(FnItem::Free(func.clone()))),
			Item::Impl(imp) => {
				let (_, target) = ImplTarget::of(imp);
				for impl_item in &imp.items {
					if let ImplItem::Fn(method) = impl_item {
						items.push(target.as_ref().ok().map(|target| FnItem::Method {
							target: target.clone(),
							method: method.clone(),
						}));
					}
				}
			}
			_ => {}
		}
	}
	items
}
