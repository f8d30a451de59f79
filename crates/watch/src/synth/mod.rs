//! Synthesis of the live crate: changed functions plus a bootstrap.
//!
//! The live crate is a standalone `cdylib` depending on the instrumented
//! mirror of the edited crate. It glob-imports the edited module, carries the
//! file's `use` items over with crate-relative paths made absolute, and
//! defines every changed function. Methods become free functions taking the
//! receiver as their first parameter; `Self` paths of trait methods go through
//! the trait. The exported bootstrap returns a patch
//! set that resets every instrumented function of the original file and then
//! installs each changed function under its registered name.

use hotmock::abi::BOOTSTRAP_SYMBOL;
use hotmock_rewrite::naming::BOUND_LIFETIME;
use hotmock_rewrite::plan::{ImplTarget, name_elided_lifetimes, replace_self_in};
use hotmock_rewrite::{Plan, RUNTIME_CRATE, Receiver};
use proc_macro2::{Ident, Spacing, Span, TokenStream, TokenTree};
use quote::{ToTokens, format_ident, quote};
use syn::{Attribute, FnArg, ImplItemFn, ItemFn, ItemUse, Lifetime, ReturnType, UsePath, UseTree, Visibility};

use crate::config::Config;
use crate::crate_info::ModuleLocation;
use crate::decls::{Changes, FnItem};
use crate::error::Result;

#[cfg(test)]
mod tests;

/// Package name of the live crate.
pub const LIVE_PACKAGE: &str = "hotmock-live";

/// Library target name of the live crate; the built artifact is named after it.
pub const LIVE_LIB: &str = "hotmock_live";

/// Parameter name replacing `self` in methods turned into free functions.
const SELF_PARAM: &str = "__hotmock_self";

/// Sources of one live crate.
#[derive(Debug, Clone)]
pub struct LiveUnit {
	/// `lib.rs` contents.
	pub source: String,
	/// `Cargo.toml` contents.
	pub manifest: String,
	/// Names installed by the bootstrap, in order.
	pub installs: Vec<String>,
	/// Names reset by the bootstrap, in order.
	pub resets: Vec<String>,
}

/// Builds the live crate for `changes` to the module at `location`.
pub fn synthesize(changes: &Changes, location: &ModuleLocation, config: &Config) -> Result<LiveUnit> {
	let module = location.module_tokens();
	let externs = extern_names(location);

	let uses: Vec<ItemUse> = changes
		.uses
		.iter()
		.map(|item| qualify_use(item, location, &externs))
		.collect();

	let mut functions = Vec::new();
	let mut install_ops = Vec::new();
	let mut installs = Vec::new();
	for changed in &changes.functions {
		let (ident, tokens) = match &changed.item {
			FnItem::Free(func) => free_fn(func),
			FnItem::Method { target, method } => {
				let self_ty = qualify_path(target, location, &externs);
				let trait_path = target
					.trait_tokens()
					.map(|tokens| qualify_trait(tokens, location, &externs));
				method_fn(target, method, &self_ty, trait_path.as_ref(), &changed.plan)
			}
		};
		let name = &changed.name;
		let signature = changed.plan.dyn_type();
		functions.push(tokens);
		install_ops.push(quote!(::hotmock::abi::PatchOp::install(#name, #signature, #ident as *const ())));
		installs.push(changed.name.clone());
	}

	let resets = &changes.resets;
	let bootstrap = format_ident!("{}", BOOTSTRAP_SYMBOL);
	let file = quote! {
		#![allow(unused_imports, unused_variables, dead_code, non_snake_case)]

		use #module::*;
		#(#uses)*

		#(#functions)*

		#[unsafe(no_mangle)]
		pub extern "C" fn #bootstrap() -> ::hotmock::abi::PatchSet {
			::hotmock::abi::PatchSet::leak(::std::vec![
				#(::hotmock::abi::PatchOp::reset(#resets),)*
				#(#install_ops,)*
			])
		}
	};

	tracing::debug!(
		"synthesized live crate for {}: {} installs, {} resets",
		location.unit,
		installs.len(),
		resets.len()
	);
	Ok(LiveUnit {
		source: format!("// Generated by hotmock-watch for `{}`.\n{file}\n", location.unit),
		manifest: manifest(location, config)?,
		installs,
		resets: resets.clone(),
	})
}

fn manifest(location: &ModuleLocation, config: &Config) -> Result<String> {
	let krate = &location.krate;
	let mut dependencies = krate.dependencies(|dir| config.mirror_path(dir).unwrap_or_else(|_| dir.to_path_buf()))?;

	let mut original = toml::Table::new();
	let mirror = config
		.mirror_path(&krate.root)
		.unwrap_or_else(|_| krate.root.clone());
	original.insert("path".into(), mirror.to_string_lossy().into_owned().into());
	original.insert("package".into(), krate.package.clone().into());
	dependencies.insert(krate.lib_name.clone(), original.into());
	dependencies.insert(RUNTIME_CRATE.into(), config.runtime.to_toml());

	let mut package = toml::Table::new();
	package.insert("name".into(), LIVE_PACKAGE.into());
	package.insert("version".into(), "0.0.0".into());
	package.insert("edition".into(), config.edition.clone().into());
	package.insert("publish".into(), false.into());

	let mut lib = toml::Table::new();
	lib.insert("name".into(), LIVE_LIB.into());
	lib.insert("path".into(), "lib.rs".into());
	lib.insert("crate-type".into(), toml::Value::Array(vec!["cdylib".into()]));

	let mut manifest = toml::Table::new();
	manifest.insert("package".into(), package.into());
	manifest.insert("lib".into(), lib.into());
	manifest.insert("dependencies".into(), dependencies.into());
	manifest.insert("workspace".into(), toml::Table::new().into());
	Ok(manifest.to_string())
}

/// Crate names that resolve as extern crates rather than local modules.
fn extern_names(location: &ModuleLocation) -> Vec<String> {
	let mut names: Vec<String> = ["std", "core", "alloc"].map(String::from).to_vec();
	if let Some(dependencies) = location
		.krate
		.manifest
		.get("dependencies")
		.and_then(toml::Value::as_table)
	{
		names.extend(dependencies.keys().map(|key| key.replace('-', "_")));
	}
	names
}

/// Absolute segments for a path whose leading segments are `idents`, or
/// `None` when it already names an extern crate.
fn absolute(idents: &[String], location: &ModuleLocation, externs: &[String]) -> Option<Vec<String>> {
	let module = || {
		std::iter::once(location.krate.lib_name.clone())
			.chain(location.module_path.iter().cloned())
			.collect::<Vec<_>>()
	};
	let first = idents.first()?;
	match first.as_str() {
		"crate" => Some(
			std::iter::once(location.krate.lib_name.clone())
				.chain(idents[1..].iter().cloned())
				.collect(),
		),
		"self" => Some(module().into_iter().chain(idents[1..].iter().cloned()).collect()),
		"super" => {
			let depth = idents.iter().take_while(|ident| *ident == "super").count();
			let keep = location.module_path.len().checked_sub(depth)?;
			Some(
				std::iter::once(location.krate.lib_name.clone())
					.chain(location.module_path[..keep].iter().cloned())
					.chain(idents[depth..].iter().cloned())
					.collect(),
			)
		}
		name if externs.iter().any(|known| known == name) => None,
		_ => Some(module().into_iter().chain(idents.iter().cloned()).collect()),
	}
}

fn qualify_use(item: &ItemUse, location: &ModuleLocation, externs: &[String]) -> ItemUse {
	let mut item = item.clone();
	item.vis = Visibility::Inherited;
	item.attrs.retain(is_cfg);
	if item.leading_colon.is_some() {
		return item;
	}

	let mut idents = Vec::new();
	let mut tail = &item.tree;
	while let UseTree::Path(path) = tail {
		idents.push(path.ident.to_string());
		tail = &path.tree;
	}
	let single = match tail {
		UseTree::Name(name) => Some(&name.ident),
		UseTree::Rename(rename) => Some(&rename.ident),
		_ => None,
	};
	let resolved = if !idents.is_empty() {
		absolute(&idents, location, externs)
	} else {
		single
			.filter(|ident| !matches!(ident.to_string().as_str(), "crate" | "self" | "super"))
			.and_then(|ident| absolute(&[ident.to_string()], location, externs))
			.map(|mut segments| {
				segments.pop();
				segments
			})
	};
	let tail = tail.clone();

	if let Some(segments) = resolved {
		item.tree = prepend(&segments, tail);
		item.leading_colon = Some(Default::default());
	}
	item
}

fn prepend(segments: &[String], tree: UseTree) -> UseTree {
	segments.iter().rev().fold(tree, |tree, segment| {
		UseTree::Path(UsePath {
			ident: Ident::new(segment, Span::call_site()),
			colon2_token: Default::default(),
			tree: Box::new(tree),
		})
	})
}

/// `::lib::module::Type` tokens for an impl target.
fn qualify_path(target: &ImplTarget, location: &ModuleLocation, externs: &[String]) -> TokenStream {
	let Ok(path) = syn::parse2::<syn::Path>(target.tokens().clone()) else {
		return target.tokens().clone();
	};
	if path.leading_colon.is_some() {
		return path.to_token_stream();
	}
	let idents: Vec<String> = path
		.segments
		.iter()
		.map(|segment| segment.ident.to_string())
		.collect();
	let segments = absolute(&idents, location, externs).unwrap_or(idents);
	let segments = segments.iter().map(|segment| format_ident!("{}", segment));
	quote!(#(::#segments)*)
}

/// Trait paths stay as written unless they start at `crate`, `self` or `super`;
/// the carried `use` items and the module glob import resolve the rest.
fn qualify_trait(tokens: &TokenStream, location: &ModuleLocation, externs: &[String]) -> TokenStream {
	let Ok(mut path) = syn::parse2::<syn::Path>(tokens.clone()) else {
		return tokens.clone();
	};
	let idents: Vec<String> = path
		.segments
		.iter()
		.map(|segment| segment.ident.to_string())
		.collect();
	let relative = matches!(idents.first().map(String::as_str), Some("crate" | "self" | "super"));
	if path.leading_colon.is_some() || !relative {
		return path.to_token_stream();
	}
	let Some(segments) = absolute(&idents, location, externs) else {
		return path.to_token_stream();
	};
	// Generic arguments stay on the last segment.
	let arguments = path.segments.pop().map(|pair| pair.into_value().arguments);
	let count = segments.len();
	let segments = segments.iter().enumerate().map(|(index, segment)| {
		let ident = format_ident!("{}", segment);
		match &arguments {
			Some(arguments) if index + 1 == count => quote!(#ident #arguments),
			_ => quote!(#ident),
		}
	});
	quote!(#(::#segments)*)
}

fn is_cfg(attr: &Attribute) -> bool {
	attr.path().is_ident("cfg")
}

fn keeps(attr: &Attribute) -> bool {
	attr.path().is_ident("cfg") || attr.path().is_ident("allow")
}

fn free_fn(func: &ItemFn) -> (Ident, TokenStream) {
	let mut func = func.clone();
	func.vis = Visibility::Inherited;
	func.attrs.retain(keeps);
	(func.sig.ident.clone(), func.into_token_stream())
}

fn method_fn(
	target: &ImplTarget,
	method: &ImplItemFn,
	self_ty: &TokenStream,
	trait_path: Option<&TokenStream>,
	plan: &Plan,
) -> (Ident, TokenStream) {
	let ident = format_ident!("{}__{}", target.name, method.sig.ident);
	let self_param = format_ident!("{}", SELF_PARAM);
	let attrs = method.attrs.iter().filter(|attr| keeps(attr));
	let resolve = |tokens: TokenStream| replace_self_in(tokens, self_ty, trait_path);

	let (generics, lifetime) = if plan.bound_lifetime {
		let lifetime = Lifetime::new(BOUND_LIFETIME, Span::call_site());
		(quote!(<#lifetime>), Some(lifetime))
	} else {
		(TokenStream::new(), None)
	};

	let mut params = Vec::new();
	if let (Some(receiver), Some(recv)) = (plan.receiver, method.sig.receiver()) {
		let binding = if recv.reference.is_none() && recv.mutability.is_some() {
			quote!(mut #self_param)
		} else {
			quote!(#self_param)
		};
		params.push(match receiver {
			Receiver::Ref => quote!(#binding: &#lifetime #self_ty),
			Receiver::RefMut => quote!(#binding: &#lifetime mut #self_ty),
			Receiver::Value => quote!(#binding: #self_ty),
		});
	}
	for input in &method.sig.inputs {
		if let FnArg::Typed(typed) = input {
			let pat = &typed.pat;
			let ty = resolve(typed.ty.to_token_stream());
			params.push(quote!(#pat: #ty));
		}
	}

	let mut output = method.sig.output.clone();
	if let (true, ReturnType::Type(_, ty)) = (plan.bound_lifetime, &mut output) {
		name_elided_lifetimes(ty);
	}
	let output = resolve(output.to_token_stream());
	// `Self::` in a body may name an inherent item, so bodies take the plain type.
	let body = replace_receiver(replace_self_in(method.block.to_token_stream(), self_ty, None), &self_param);
	let tokens = quote! {
		#(#attrs)*
		fn #ident #generics(#(#params),*) #output #body
	};
	(ident, tokens)
}

/// Replaces `self` value tokens with `with`. `self::` paths are kept.
fn replace_receiver(tokens: TokenStream, with: &Ident) -> TokenStream {
	let trees: Vec<TokenTree> = tokens.into_iter().collect();
	let mut out = Vec::with_capacity(trees.len());
	for (index, tree) in trees.iter().enumerate() {
		match tree {
			TokenTree::Ident(ident) if ident == "self" => {
				let is_path = matches!(
					trees.get(index + 1),
					Some(TokenTree::Punct(punct)) if punct.as_char() == ':' && punct.spacing() == Spacing::Joint
				);
				if is_path {
					out.push(tree.clone());
				} else {
					out.push(TokenTree::Ident(Ident::new(&with.to_string(), ident.span())));
				}
			}
			TokenTree::Group(group) => {
				let mut replaced = proc_macro2::Group::new(group.delimiter(), replace_receiver(group.stream(), with));
				replaced.set_span(group.span());
				out.push(TokenTree::Group(replaced));
			}
			other => out.push(other.clone()),
		}
	}
	out.into_iter().collect()
}
