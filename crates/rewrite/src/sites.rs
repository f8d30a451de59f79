//! Function declarations of a file, with their line spans and plans.

use std::ops::RangeInclusive;

use syn::spanned::Spanned;
use syn::{AttrStyle, Attribute, Block, File, ImplItem, Item, Signature, Type};

use crate::naming::{BodySpan, LocalName};
use crate::plan::{ImplTarget, Plan, Skip, end_of, plan, start_of};

/// One function or method declared at the top level of a file.
#[derive(Debug, Clone)]
pub struct FnSite {
	pub local: LocalName,
	/// 1-based lines from the first attribute to the closing brace.
	pub lines: RangeInclusive<usize>,
	/// `cfg` attributes of the function and its impl block.
	pub cfg: Vec<Attribute>,
	pub plan: Result<Plan, Skip>,
}

/// Lists every top-level function and every method of top-level impl blocks.
///
/// Inline `mod` blocks are not entered. A trait method sharing its type and
/// method name with another method of the file is skipped.
pub fn sites(file: &File) -> Vec<FnSite> {
	let mut sites = Vec::new();
	for item in &file.items {
		match item {
			Item::Fn(func) => {
				let (body, insert_at) = body_positions(&func.attrs, &func.block);
				sites.push(FnSite {
					local: LocalName::Function(func.sig.ident.to_string()),
					lines: line_span(item.span()),
					cfg: cfg_attrs(&func.attrs).collect(),
					plan: plan(&func.attrs, &func.sig, None, body, insert_at),
				});
			}
			Item::Impl(imp) => {
				let (receiver, target) = ImplTarget::of(imp);
				for impl_item in &imp.items {
					let ImplItem::Fn(method) = impl_item else {
						continue;
					};
					let (body, insert_at) = body_positions(&method.attrs, &method.block);
					let plan = match &target {
						Ok(target) => plan(&method.attrs, &method.sig, Some(target), body, insert_at),
						Err(skip) => Err(*skip),
					};
					sites.push(FnSite {
						local: LocalName::Method {
							receiver: receiver.clone(),
							by_ref: takes_self_by_ref(&method.sig),
							method: method.sig.ident.to_string(),
						},
						lines: line_span(method.span()),
						cfg: cfg_attrs(&imp.attrs).chain(cfg_attrs(&method.attrs)).collect(),
						plan,
					});
				}
			}
			_ => {}
		}
	}
	skip_collisions(&mut sites);
	sites
}

fn skip_collisions(sites: &mut [FnSite]) {
	let keys: Vec<Option<(&str, &str)>> = sites.iter().map(|site| method_key(&site.local)).collect();
	let colliding: Vec<usize> = (0..sites.len())
		.filter(|&index| matches!(&sites[index].plan, Ok(plan) if plan.trait_path.is_some()))
		.filter(|&index| {
			keys[index].is_some_and(|key| {
				keys.iter()
					.enumerate()
					.any(|(other, candidate)| other != index && *candidate == Some(key))
			})
		})
		.collect();
	for index in colliding {
		sites[index].plan = Err(Skip::NameCollision);
	}
}

fn method_key(local: &LocalName) -> Option<(&str, &str)> {
	match local {
		LocalName::Method { receiver, method, .. } => Some((receiver, method)),
		LocalName::Function(_) => None,
	}
}

/// 1-based line range covered by `span`.
pub fn line_span(span: proc_macro2::Span) -> RangeInclusive<usize> {
	span.start().line..=span.end().line
}

fn cfg_attrs(attrs: &[Attribute]) -> impl Iterator<Item = Attribute> + '_ {
	attrs
		.iter()
		.filter(|attr| attr.style == AttrStyle::Outer && attr.path().is_ident("cfg"))
		.cloned()
}

fn takes_self_by_ref(sig: &Signature) -> bool {
	sig.receiver()
		.is_some_and(|receiver| matches!(*receiver.ty, Type::Reference(_)))
}

fn body_positions(attrs: &[Attribute], block: &Block) -> (BodySpan, (usize, usize)) {
	let body = BodySpan {
		open: start_of(block.brace_token.span.open()),
		close: start_of(block.brace_token.span.close()),
	};
	let insert_at = attrs
		.iter()
		.filter(|attr| matches!(attr.style, AttrStyle::Inner(_)))
		.map(|attr| end_of(attr.span()))
		.max()
		.unwrap_or((body.open.0, body.open.1 + 1));
	(body, insert_at)
}
