//! Eligibility of functions for instrumentation and their call shapes.
//!
//! A function is instrumented only when its whole signature can be written as
//! a `dyn Fn(..) -> R + Send + Sync` type: no generics, no borrowed outputs
//! with ambiguous lifetimes, and parameters that can be forwarded by name.
//!
//! `Fn` sugar elides lifetimes the way a free function does, so most shapes
//! are the signature's own types. A `&self` method whose output borrows is the
//! exception: the output lifetime comes from the receiver, which the sugar
//! cannot express. Those shapes name it explicitly:
//! `dyn for<'__hotmock> Fn(&'__hotmock Store, &str) -> &'__hotmock V`.

use proc_macro2::{Delimiter, Group, Ident, Span, TokenStream, TokenTree};
use quote::{ToTokens, quote};
use syn::visit::{self, Visit};
use syn::visit_mut::{self, VisitMut};
use syn::{Abi, Attribute, FnArg, ItemImpl, Lifetime, Pat, Path, ReturnType, Signature, Type};
use thiserror::Error;

use crate::naming::{BOUND_LIFETIME, BodySpan, RESERVED_IDENT};

/// Last path segments of types known to carry no lifetime parameter.
const OWNED_TYPES: &[&str] = &[
	"bool", "char", "str", "u8", "u16", "u32", "u64", "u128", "usize", "i8", "i16", "i32", "i64", "i128", "isize",
	"f32", "f64", "String", "Vec", "VecDeque", "Option", "Result", "Box", "Rc", "Arc", "HashMap", "HashSet",
	"BTreeMap", "BTreeSet", "PathBuf", "OsString", "Duration", "Instant", "SystemTime", "File", "Error", "Self",
];

/// Why a function was left untouched.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum Skip {
	#[error("generic parameters, lifetimes or `impl Trait`")]
	Generic,
	#[error("async function")]
	Async,
	#[error("const function")]
	Const,
	#[error("unsafe function")]
	Unsafe,
	#[error("non-Rust ABI")]
	ForeignAbi,
	#[error("variadic parameters")]
	Variadic,
	#[error("parameter without a plain name")]
	PatternParam,
	#[error("typed `self` receiver")]
	TypedReceiver,
	#[error("`Drop` implementation")]
	Destructor,
	#[error("name collides with another method of the same type")]
	NameCollision,
	#[error("impl of a generic or non-path type")]
	UnsupportedSelfType,
	#[error("output may borrow from one of several borrowed inputs")]
	ElidedOutput,
	#[error("diverging function")]
	Diverging,
	#[error("test function")]
	Test,
	#[error("collides with the reserved `__hotmock` identifier")]
	ReservedIdent,
}

/// How a method takes `self`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Receiver {
	Ref,
	RefMut,
	Value,
}

impl Receiver {
	pub fn by_ref(self) -> bool {
		!matches!(self, Self::Value)
	}
}

/// Self type of an impl block, and its trait for trait impls.
#[derive(Debug, Clone)]
pub struct ImplTarget {
	/// Last path segment, used in function names.
	pub name: String,
	/// The full type path as written.
	pub path: String,
	/// The trait path as written, for trait impls.
	pub trait_path: Option<String>,
	tokens: TokenStream,
	trait_tokens: Option<TokenStream>,
}

impl ImplTarget {
	/// Reads the self type of `item`.
	///
	/// Impls of generic or non-path types and `Drop` impls are rejected; the
	/// returned name is still usable for reporting.
	pub fn of(item: &ItemImpl) -> (String, Result<Self, Skip>) {
		let tokens = item.self_ty.to_token_stream();
		let fallback = type_text(&tokens);
		let Type::Path(type_path) = &*item.self_ty else {
			return (fallback, Err(Skip::UnsupportedSelfType));
		};
		let Some(last) = type_path.path.segments.last() else {
			return (fallback, Err(Skip::UnsupportedSelfType));
		};
		let name = last.ident.to_string();

		if !item.generics.params.is_empty() || item.generics.where_clause.is_some() {
			return (name, Err(Skip::Generic));
		}
		let plain = type_path.qself.is_none()
			&& type_path
				.path
				.segments
				.iter()
				.all(|segment| segment.arguments.is_none());
		if !plain {
			return (name, Err(Skip::UnsupportedSelfType));
		}

		let trait_tokens = match &item.trait_ {
			Some((_, trait_path, _)) => match check_trait(trait_path) {
				Ok(()) => Some(trait_path.to_token_stream()),
				Err(skip) => return (name, Err(skip)),
			},
			None => None,
		};
		let target = Self {
			name: name.clone(),
			path: fallback,
			trait_path: trait_tokens.as_ref().map(type_text),
			tokens,
			trait_tokens,
		};
		(name, Ok(target))
	}

	pub fn tokens(&self) -> &TokenStream {
		&self.tokens
	}

	pub fn trait_tokens(&self) -> Option<&TokenStream> {
		self.trait_tokens.as_ref()
	}

	/// Replaces `Self` in `tokens` with the self type, qualified with the
	/// trait where it starts a path.
	pub fn resolve_self(&self, tokens: TokenStream) -> TokenStream {
		replace_self_in(tokens, &self.tokens, self.trait_tokens.as_ref())
	}
}

fn check_trait(path: &Path) -> Result<(), Skip> {
	if path.segments.last().is_some_and(|segment| segment.ident == "Drop") {
		return Err(Skip::Destructor);
	}
	let mut shape = TypeShape::default();
	shape.visit_path(path);
	shape.check()?;
	if shape.elided > 0 {
		return Err(Skip::Generic);
	}
	Ok(())
}

/// One forwarded parameter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Param {
	pub name: String,
	/// Type text with `Self` resolved.
	pub ty: String,
}

/// Everything needed to gate and register one eligible function.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Plan {
	pub receiver: Option<Receiver>,
	/// Self type path when the function lives in an impl block.
	pub self_ty: Option<String>,
	/// Trait path when the impl block is a trait impl.
	pub trait_path: Option<String>,
	/// The receiver and the output share the named lifetime `'__hotmock`.
	pub bound_lifetime: bool,
	pub params: Vec<Param>,
	/// Output type text, `None` for `()`.
	pub output: Option<String>,
	pub body: BodySpan,
	/// Where the gate goes: just inside the body, after inner attributes.
	pub insert_at: (usize, usize),
}

impl Plan {
	/// Input types of the `dyn Fn` shape, receiver first.
	pub fn input_types(&self) -> Vec<String> {
		let mut inputs = Vec::with_capacity(self.params.len() + 1);
		if let (Some(receiver), Some(self_ty)) = (self.receiver, &self.self_ty) {
			let lifetime = if self.bound_lifetime {
				format!("{BOUND_LIFETIME} ")
			} else {
				String::new()
			};
			inputs.push(match receiver {
				Receiver::Ref => format!("&{lifetime}{self_ty}"),
				Receiver::RefMut => format!("&{lifetime}mut {self_ty}"),
				Receiver::Value => self_ty.clone(),
			});
		}
		inputs.extend(self.params.iter().map(|param| param.ty.clone()));
		inputs
	}

	/// `dyn Fn(..) -> R + Send + Sync`, also the signature text.
	pub fn dyn_type(&self) -> String {
		format!(
			"dyn {}Fn({}){} + Send + Sync",
			self.binder(),
			self.input_types().join(", "),
			self.arrow()
		)
	}

	/// `fn(..) -> R`.
	pub fn ptr_type(&self) -> String {
		format!("{}fn({}){}", self.binder(), self.input_types().join(", "), self.arrow())
	}

	/// Arguments forwarded to a replacement, `self` first.
	pub fn forwarded_args(&self) -> Vec<&str> {
		let mut args = Vec::with_capacity(self.params.len() + 1);
		if self.receiver.is_some() {
			args.push("self");
		}
		args.extend(self.params.iter().map(|param| param.name.as_str()));
		args
	}

	fn binder(&self) -> String {
		if self.bound_lifetime {
			format!("for<{BOUND_LIFETIME}> ")
		} else {
			String::new()
		}
	}

	fn arrow(&self) -> String {
		match &self.output {
			Some(output) => format!(" -> {output}"),
			None => String::new(),
		}
	}
}

/// Decides whether a function can be instrumented.
///
/// `attrs` are the function's outer attributes, `body` the braces of its
/// block and `insert_at` the gate position inside it.
pub fn plan(
	attrs: &[Attribute],
	sig: &Signature,
	impl_target: Option<&ImplTarget>,
	body: BodySpan,
	insert_at: (usize, usize),
) -> Result<Plan, Skip> {
	if attrs.iter().any(|attr| attr.path().is_ident("test")) {
		return Err(Skip::Test);
	}
	if sig.constness.is_some() {
		return Err(Skip::Const);
	}
	if sig.asyncness.is_some() {
		return Err(Skip::Async);
	}
	if sig.unsafety.is_some() {
		return Err(Skip::Unsafe);
	}
	if sig.abi.as_ref().is_some_and(|abi| !is_rust_abi(abi)) {
		return Err(Skip::ForeignAbi);
	}
	if sig.variadic.is_some() {
		return Err(Skip::Variadic);
	}
	if !sig.generics.params.is_empty() || sig.generics.where_clause.is_some() {
		return Err(Skip::Generic);
	}
	if sig.ident == RESERVED_IDENT {
		return Err(Skip::ReservedIdent);
	}

	let mut receiver = None;
	let mut params = Vec::new();
	let mut params_borrow = false;

	for input in &sig.inputs {
		match input {
			FnArg::Receiver(recv) => {
				if recv.colon_token.is_some() {
					return Err(Skip::TypedReceiver);
				}
				receiver = Some(match &recv.reference {
					Some((_, Some(lifetime))) if lifetime.ident != "_" => return Err(Skip::Generic),
					Some(_) if recv.mutability.is_some() => Receiver::RefMut,
					Some(_) => Receiver::Ref,
					None => Receiver::Value,
				});
			}
			FnArg::Typed(typed) => {
				let Pat::Ident(pat) = &*typed.pat else {
					return Err(Skip::PatternParam);
				};
				if pat.by_ref.is_some() || pat.subpat.is_some() {
					return Err(Skip::PatternParam);
				}
				let name = pat.ident.to_string();
				if name.starts_with(RESERVED_IDENT) {
					return Err(Skip::ReservedIdent);
				}
				let shape = TypeShape::of(&typed.ty, impl_target);
				shape.check()?;
				params_borrow |= shape.may_borrow();
				params.push(Param {
					name,
					ty: resolved_type(&typed.ty, impl_target),
				});
			}
		}
	}

	let mut bound_lifetime = false;
	let output = match &sig.output {
		ReturnType::Default => None,
		ReturnType::Type(_, ty) => {
			if matches!(**ty, Type::Never(_)) {
				return Err(Skip::Diverging);
			}
			let shape = TypeShape::of(ty, impl_target);
			shape.check()?;
			let borrowed_self = receiver.is_some_and(Receiver::by_ref);
			if borrowed_self && params_borrow && shape.may_borrow() {
				// Elision would pick the receiver; the sugar sees several inputs.
				if shape.opaque {
					return Err(Skip::ElidedOutput);
				}
				bound_lifetime = true;
				let mut named = (**ty).clone();
				name_elided_lifetimes(&mut named);
				Some(resolved_type(&named, impl_target))
			} else {
				Some(resolved_type(ty, impl_target))
			}
		}
	};

	Ok(Plan {
		receiver,
		self_ty: impl_target.map(|target| target.path.clone()),
		trait_path: impl_target.and_then(|target| target.trait_path.clone()),
		bound_lifetime,
		params,
		output,
		body,
		insert_at,
	})
}

fn is_rust_abi(abi: &Abi) -> bool {
	abi.name.as_ref().is_some_and(|name| name.value() == "Rust")
}

/// Facts about a type that decide eligibility.
#[derive(Default)]
struct TypeShape {
	elided: usize,
	/// A path type that may hide lifetime parameters, like `Entry` for
	/// `struct Entry<'a>`.
	opaque: bool,
	/// Name of the impl's self type. Impl headers cannot elide lifetimes, so
	/// a plain self type has none.
	self_name: Option<String>,
	impl_trait: bool,
	named_lifetime: bool,
	reserved: bool,
}

impl TypeShape {
	fn of(ty: &Type, target: Option<&ImplTarget>) -> Self {
		let mut shape = Self {
			self_name: target.map(|target| target.name.clone()),
			..Self::default()
		};
		shape.visit_type(ty);
		shape
	}

	fn may_borrow(&self) -> bool {
		self.elided > 0 || self.opaque
	}

	fn check(&self) -> Result<(), Skip> {
		if self.reserved {
			Err(Skip::ReservedIdent)
		} else if self.impl_trait || self.named_lifetime {
			Err(Skip::Generic)
		} else {
			Ok(())
		}
	}
}

impl<'ast> Visit<'ast> for TypeShape {
	fn visit_type_reference(&mut self, node: &'ast syn::TypeReference) {
		if node.lifetime.is_none() {
			self.elided += 1;
		}
		visit::visit_type_reference(self, node);
	}

	fn visit_lifetime(&mut self, node: &'ast syn::Lifetime) {
		match node.ident.to_string().as_str() {
			"_" => self.elided += 1,
			"static" => {}
			_ => self.named_lifetime = true,
		}
	}

	fn visit_type_path(&mut self, node: &'ast syn::TypePath) {
		let owned = node.qself.is_none()
			&& node.path.segments.last().is_some_and(|segment| {
				OWNED_TYPES.iter().any(|owned| segment.ident == *owned)
					|| self.self_name.as_ref().is_some_and(|name| segment.ident == name)
			});
		if !owned {
			self.opaque = true;
		}
		visit::visit_type_path(self, node);
	}

	fn visit_type_impl_trait(&mut self, _: &'ast syn::TypeImplTrait) {
		self.impl_trait = true;
	}

	// `Fn(&T) -> &U` and `fn(&T) -> &U` open their own elision scope.
	fn visit_parenthesized_generic_arguments(&mut self, _: &'ast syn::ParenthesizedGenericArguments) {}

	fn visit_type_bare_fn(&mut self, _: &'ast syn::TypeBareFn) {}

	fn visit_ident(&mut self, node: &'ast Ident) {
		if node == RESERVED_IDENT {
			self.reserved = true;
		}
	}
}

/// Names every elided lifetime of `ty` `'__hotmock`, leaving nested `Fn`
/// sugar and `fn` pointers alone.
pub fn name_elided_lifetimes(ty: &mut Type) {
	NameElided.visit_type_mut(ty);
}

struct NameElided;

impl VisitMut for NameElided {
	fn visit_type_reference_mut(&mut self, node: &mut syn::TypeReference) {
		if node.lifetime.is_none() {
			node.lifetime = Some(Lifetime::new(BOUND_LIFETIME, Span::call_site()));
		}
		visit_mut::visit_type_reference_mut(self, node);
	}

	fn visit_lifetime_mut(&mut self, node: &mut Lifetime) {
		if node.ident == "_" {
			*node = Lifetime::new(BOUND_LIFETIME, node.apostrophe);
		}
	}

	fn visit_parenthesized_generic_arguments_mut(&mut self, _: &mut syn::ParenthesizedGenericArguments) {}

	fn visit_type_bare_fn_mut(&mut self, _: &mut syn::TypeBareFn) {}
}

fn resolved_type(ty: &Type, target: Option<&ImplTarget>) -> String {
	let tokens = ty.to_token_stream();
	match target {
		Some(target) => type_text(&target.resolve_self(tokens)),
		None => type_text(&tokens),
	}
}

/// Replaces every `Self` token in `tokens` with `with`, descending into groups.
pub fn replace_self(tokens: TokenStream, with: &TokenStream) -> TokenStream {
	replace_ident(tokens, "Self", with)
}

/// Replaces `Self` with `self_ty`, or with `<self_ty as trait_path>` where it
/// starts a path such as `Self::Item`.
pub fn replace_self_in(tokens: TokenStream, self_ty: &TokenStream, trait_path: Option<&TokenStream>) -> TokenStream {
	let Some(trait_path) = trait_path else {
		return replace_self(tokens, self_ty);
	};
	let qualified = quote!(<#self_ty as #trait_path>);
	let mut out = Vec::new();
	let mut trees = tokens.into_iter().peekable();
	while let Some(tree) = trees.next() {
		match tree {
			TokenTree::Ident(ident) if ident == "Self" => {
				let starts_path = matches!(
					trees.peek(),
					Some(TokenTree::Punct(punct)) if punct.as_char() == ':'
				);
				let with = if starts_path { &qualified } else { self_ty };
				out.extend(respanned(with, ident.span()));
			}
			TokenTree::Group(group) => {
				let mut replaced = Group::new(group.delimiter(), replace_self_in(group.stream(), self_ty, Some(trait_path)));
				replaced.set_span(group.span());
				out.push(TokenTree::Group(replaced));
			}
			other => out.push(other),
		}
	}
	out.into_iter().collect()
}

/// Replaces every `name` identifier in `tokens` with `with`.
pub fn replace_ident(tokens: TokenStream, name: &str, with: &TokenStream) -> TokenStream {
	tokens
		.into_iter()
		.flat_map(|tree| -> Vec<TokenTree> {
			match tree {
				TokenTree::Ident(ident) if ident == name => respanned(with, ident.span()),
				TokenTree::Group(group) => {
					let mut replaced = Group::new(group.delimiter(), replace_ident(group.stream(), name, with));
					replaced.set_span(group.span());
					vec![TokenTree::Group(replaced)]
				}
				other => vec![other],
			}
		})
		.collect()
}

fn respanned(tokens: &TokenStream, span: Span) -> Vec<TokenTree> {
	tokens
		.clone()
		.into_iter()
		.map(|mut tree| {
			tree.set_span(span);
			tree
		})
		.collect()
}

/// Renders type tokens the way they are usually written: `&mut io::Result<Vec<u8>>`.
pub fn type_text(tokens: &TokenStream) -> String {
	let mut out = String::new();
	render(&mut out, tokens.clone());
	out
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum Last {
	Start,
	Word,
	Tight,
	Spaced,
}

fn render(out: &mut String, tokens: TokenStream) {
	let mut last = Last::Start;
	let mut after_dash = false;
	for tree in tokens {
		let dash = after_dash;
		after_dash = false;
		match tree {
			TokenTree::Ident(_) | TokenTree::Literal(_) => {
				if matches!(last, Last::Word | Last::Spaced) {
					out.push(' ');
				}
				out.push_str(&tree.to_string());
				last = Last::Word;
			}
			TokenTree::Group(group) => {
				let (open, close) = match group.delimiter() {
					Delimiter::Parenthesis => ("(", ")"),
					Delimiter::Bracket => ("[", "]"),
					Delimiter::Brace => ("{ ", " }"),
					Delimiter::None => ("", ""),
				};
				if last == Last::Spaced {
					out.push(' ');
				}
				out.push_str(open);
				render(out, group.stream());
				out.push_str(close);
				last = Last::Word;
			}
			TokenTree::Punct(punct) => {
				let ch = punct.as_char();
				match ch {
					',' | ';' => last = Last::Spaced,
					'+' | '=' | '-' => {
						if last != Last::Start {
							out.push(' ');
						}
						after_dash = ch == '-';
						last = if ch == '-' { Last::Tight } else { Last::Spaced };
					}
					'>' if dash => last = Last::Spaced,
					'\'' => {
						if matches!(last, Last::Word | Last::Spaced) {
							out.push(' ');
						}
						last = Last::Tight;
					}
					_ => {
						if last == Last::Spaced {
							out.push(' ');
						}
						last = Last::Tight;
					}
				}
				out.push(ch);
			}
		}
	}
}

/// Span helper: `(line, column)` of the start of `span`.
pub(crate) fn start_of(span: Span) -> (usize, usize) {
	let start = span.start();
	(start.line, start.column)
}

/// Span helper: `(line, column)` just past the end of `span`.
pub(crate) fn end_of(span: Span) -> (usize, usize) {
	let end = span.end();
	(end.line, end.column)
}
