use std::fs;
use std::path::{Path, PathBuf};

use pretty_assertions::assert_eq;
use quote::quote;
use syn::{FnArg, Item, Pat};

use super::*;
use crate::decls::changed_declarations;
use crate::diff::changed_lines;

const ORIGINAL: &str = "\
use std::sync::atomic::{AtomicU64, Ordering};

use crate::helpers::double;
use self::inner::Step;

pub struct Counter {
	value: AtomicU64,
}

impl Counter {
	pub fn increment(&self) -> u64 {
		self.value.fetch_add(1, Ordering::SeqCst) + 1
	}

	pub fn fresh(&self) -> Self {
		Self { value: AtomicU64::new(0) }
	}
}

pub fn describe(value: u64) -> String {
	format!(\"value {value}\")
}
";

struct Fixture {
	_dirs: (tempfile::TempDir, tempfile::TempDir),
	config: Config,
	location: ModuleLocation,
	file: PathBuf,
	original: &'static str,
}

fn fixture() -> Fixture {
	fixture_with(ORIGINAL)
}

fn fixture_with(original: &'static str) -> Fixture {
	let tree_dir = tempfile::tempdir().unwrap();
	let scratch_dir = tempfile::tempdir().unwrap();
	let tree = tree_dir.path().canonicalize().unwrap();
	let scratch = scratch_dir.path().canonicalize().unwrap();

	fs::create_dir_all(tree.join("src")).unwrap();
	fs::write(
		tree.join("Cargo.toml"),
		"[package]\nname = \"live-demo\"\nversion = \"0.1.0\"\nedition = \"2024\"\n\n[dependencies]\nserde = \"1\"\n",
	)
	.unwrap();
	fs::write(tree.join("src/lib.rs"), "pub mod counter;\n").unwrap();
	let file = tree.join("src/counter.rs");
	fs::write(&file, original).unwrap();

	let location = ModuleLocation::locate(&tree, &file).unwrap();
	Fixture {
		_dirs: (tree_dir, scratch_dir),
		config: Config::new(tree, scratch),
		location,
		file,
		original,
	}
}

fn unit_for(fixture: &Fixture, new: &str) -> LiveUnit {
	let changed = changed_lines(fixture.original, new);
	let changes =
		changed_declarations(&fixture.file, &fixture.location.unit, new, fixture.original, &changed).unwrap();
	synthesize(&changes, &fixture.location, &fixture.config).unwrap()
}

fn compact(tokens: impl ToTokens) -> String {
	tokens.to_token_stream().to_string().replace(' ', "")
}

fn find_fn<'a>(file: &'a syn::File, name: &str) -> &'a syn::ItemFn {
	file.items
		.iter()
		.find_map(|item| match item {
			Item::Fn(func) if func.sig.ident == name => Some(func),
			_ => None,
		})
		.unwrap_or_else(|| panic!("no function {name}"))
}

#[test]
fn changed_functions_and_bootstrap() {
	let fixture = fixture();
	let new = ORIGINAL
		.replace("fetch_add(1, Ordering::SeqCst) + 1", "fetch_add(2, Ordering::SeqCst) + 2")
		.replace("format!(\"value {value}\")", "format!(\"value is {value}\")");
	let unit = unit_for(&fixture, &new);

	assert_eq!(unit.installs, vec!["counter/*Counter.increment", "counter/describe"]);
	assert_eq!(
		unit.resets,
		vec!["counter/*Counter.increment", "counter/*Counter.fresh", "counter/describe"]
	);

	let file = syn::parse_file(&unit.source).unwrap();
	let describe = find_fn(&file, "describe");
	assert!(matches!(describe.vis, Visibility::Inherited));
	assert!(compact(&describe.block).contains("\"valueis{value}\""));

	let increment = find_fn(&file, "Counter__increment");
	let Some(FnArg::Typed(receiver)) = increment.sig.inputs.first() else {
		panic!("receiver parameter missing");
	};
	assert!(matches!(&*receiver.pat, Pat::Ident(ident) if ident.ident == SELF_PARAM));
	assert_eq!(compact(&receiver.ty), "&::live_demo::counter::Counter");
	assert!(compact(&increment.block).contains("__hotmock_self.value.fetch_add(2,Ordering::SeqCst)+2"));

	let bootstrap = find_fn(&file, BOOTSTRAP_SYMBOL);
	let body = compact(&bootstrap.block);
	assert!(body.contains("::hotmock::abi::PatchOp::reset(\"counter/*Counter.fresh\")"));
	assert!(body.contains(
		"::hotmock::abi::PatchOp::install(\"counter/describe\",\"dynFn(u64)->String+Send+Sync\",describeas*const())"
	));
	assert!(body.find("reset(").unwrap() < body.find("install(").unwrap());
	assert!(bootstrap.attrs.iter().any(|attr| compact(attr).contains("no_mangle")));
}

#[test]
fn self_type_is_qualified() {
	let fixture = fixture();
	let new = ORIGINAL.replace("AtomicU64::new(0) }", "AtomicU64::new(10) }");
	let unit = unit_for(&fixture, &new);
	assert_eq!(unit.installs, vec!["counter/*Counter.fresh"]);

	let file = syn::parse_file(&unit.source).unwrap();
	let fresh = find_fn(&file, "Counter__fresh");
	assert_eq!(compact(&fresh.sig.output), "->::live_demo::counter::Counter");
	let body = compact(&fresh.block);
	assert!(body.contains("::live_demo::counter::Counter{value:AtomicU64::new(10)}"));
	assert!(!body.contains("Self"));
}

#[test]
fn use_items_are_made_absolute() {
	let fixture = fixture();
	let new = ORIGINAL.replace("value {value}", "v={value}");
	let unit = unit_for(&fixture, &new);
	let file = syn::parse_file(&unit.source).unwrap();

	let uses: Vec<String> = file
		.items
		.iter()
		.filter_map(|item| match item {
			Item::Use(item) => Some(compact(item)),
			_ => None,
		})
		.collect();
	assert_eq!(
		uses,
		vec![
			"use::live_demo::counter::*;",
			"usestd::sync::atomic::{AtomicU64,Ordering};",
			"use::live_demo::helpers::double;",
			"use::live_demo::counter::inner::Step;",
		]
	);
}

#[test]
fn manifest_depends_on_mirror_and_runtime() {
	let fixture = fixture();
	let new = ORIGINAL.replace("value {value}", "v={value}");
	let unit = unit_for(&fixture, &new);
	let manifest: toml::Table = toml::from_str(&unit.manifest).unwrap();

	assert_eq!(manifest["package"]["name"].as_str(), Some(LIVE_PACKAGE));
	assert_eq!(manifest["package"]["edition"].as_str(), Some("2024"));
	assert_eq!(manifest["lib"]["name"].as_str(), Some(LIVE_LIB));
	assert_eq!(manifest["lib"]["crate-type"][0].as_str(), Some("cdylib"));
	assert!(manifest["workspace"].as_table().is_some());

	let dependencies = &manifest["dependencies"];
	assert_eq!(dependencies["serde"].as_str(), Some("1"));
	assert_eq!(dependencies["live_demo"]["package"].as_str(), Some("live-demo"));
	let mirror = dependencies["live_demo"]["path"].as_str().unwrap();
	assert_eq!(Path::new(mirror), fixture.config.scratch.as_path());
	assert_eq!(
		dependencies["hotmock"]["version"].as_str(),
		Some(env!("CARGO_PKG_VERSION"))
	);
}

#[test]
fn receiver_paths_are_kept() {
	let with = format_ident!("{}", SELF_PARAM);
	let replaced = replace_receiver(quote!(self.value + self::helper(self, [self])), &with);
	assert_eq!(
		replaced.to_string().replace(' ', ""),
		"__hotmock_self.value+self::helper(__hotmock_self,[__hotmock_self])"
	);
}

#[test]
fn super_beyond_crate_root_is_left_alone() {
	let fixture = fixture();
	let externs = extern_names(&fixture.location);
	let item: ItemUse = syn::parse_quote!(use super::super::Thing;);
	assert_eq!(compact(qualify_use(&item, &fixture.location, &externs)), "usesuper::super::Thing;");

	let item: ItemUse = syn::parse_quote!(pub(crate) use super::Thing;);
	assert_eq!(compact(qualify_use(&item, &fixture.location, &externs)), "use::live_demo::Thing;");

	let item: ItemUse = syn::parse_quote!(use serde::Serialize;);
	assert_eq!(compact(qualify_use(&item, &fixture.location, &externs)), "useserde::Serialize;");
}

const STORE: &str = "\
use std::collections::HashMap;
use std::fmt;

pub struct Store {
	items: HashMap<String, u32>,
}

impl Store {
	pub fn get(&self, key: &str) -> Option<&u32> {
		self.items.get(key)
	}
}

impl fmt::Display for Store {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		write!(f, \"{} items\", self.items.len())
	}
}

impl crate::Lookup for Store {
	type Key = String;

	fn has(&self, key: &Self::Key) -> bool {
		self.items.contains_key(key)
	}
}
";

#[test]
fn borrowed_outputs_name_the_receiver_lifetime() {
	let fixture = fixture_with(STORE);
	let new = STORE.replace("self.items.get(key)", "self.items.get(key.trim())");
	let unit = unit_for(&fixture, &new);
	assert_eq!(unit.installs, vec!["counter/*Store.get"]);

	let file = syn::parse_file(&unit.source).unwrap();
	let get = find_fn(&file, "Store__get");
	assert_eq!(compact(&get.sig.generics), "<'__hotmock>");
	let Some(FnArg::Typed(receiver)) = get.sig.inputs.first() else {
		panic!("receiver parameter missing");
	};
	assert_eq!(compact(&receiver.ty), "&'__hotmock::live_demo::counter::Store");
	assert_eq!(compact(&get.sig.output), "->Option<&'__hotmocku32>");

	let bootstrap = compact(&find_fn(&file, BOOTSTRAP_SYMBOL).block);
	assert!(bootstrap.contains("\"dynfor<"), "{bootstrap}");
	assert!(bootstrap.contains("Store__getas*const()"), "{bootstrap}");
}

#[test]
fn trait_methods_resolve_self_through_the_trait() {
	let fixture = fixture_with(STORE);
	let new = STORE
		.replace("\"{} items\"", "\"{} entries\"")
		.replace("self.items.contains_key(key)", "!self.items.is_empty() && self.items.contains_key(key)");
	let unit = unit_for(&fixture, &new);
	assert_eq!(unit.installs, vec!["counter/*Store.fmt", "counter/*Store.has"]);

	let file = syn::parse_file(&unit.source).unwrap();
	let fmt = find_fn(&file, "Store__fmt");
	assert!(fmt.sig.generics.params.is_empty());
	assert_eq!(compact(&fmt.sig.output), "->fmt::Result");

	let has = find_fn(&file, "Store__has");
	let Some(FnArg::Typed(key)) = has.sig.inputs.iter().nth(1) else {
		panic!("key parameter missing");
	};
	assert_eq!(
		compact(&key.ty),
		"&<::live_demo::counter::Storeas::live_demo::Lookup>::Key"
	);
}
