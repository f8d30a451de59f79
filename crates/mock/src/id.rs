use std::fmt;

/// Identity of one loaded function: the entry address of its implementation.
///
/// Instrumented code builds it with `FnId::new(path::to::func as *const () as usize)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct FnId(usize);

impl FnId {
	/// Wraps a function entry address.
	pub const fn new(addr: usize) -> Self {
		Self(addr)
	}

	/// Returns the entry address.
	pub const fn addr(self) -> usize {
		self.0
	}
}

impl fmt::Display for FnId {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		write!(f, "fn@{:#x}", self.0)
	}
}

/// Function addressed either by identity or by its registered name.
///
/// Names have the form `<unit-path>/<Function>` or
/// `<unit-path>/<Receiver>.<Method>`, with `*` prefixed to receivers taken by
/// reference.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Target<'a> {
	Id(FnId),
	Name(&'a str),
}

impl From<FnId> for Target<'_> {
	fn from(id: FnId) -> Self {
		Self::Id(id)
	}
}

impl<'a> From<&'a str> for Target<'a> {
	fn from(name: &'a str) -> Self {
		Self::Name(name)
	}
}

impl<'a> From<&'a String> for Target<'a> {
	fn from(name: &'a String) -> Self {
		Self::Name(name)
	}
}

impl fmt::Display for Target<'_> {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		match self {
			Self::Id(id) => id.fmt(f),
			Self::Name(name) => f.write_str(name),
		}
	}
}
