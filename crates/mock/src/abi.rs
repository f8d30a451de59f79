//! C ABI shared between the host and incremental modules.
//!
//! An incremental module links its own copy of this crate, so it cannot touch
//! the host's registry directly. Instead its bootstrap returns a [`PatchSet`]
//! describing resets and installs by name; the host's reload loop applies it.

use std::marker::PhantomData;

/// Version of the patch ABI. Bumped on any layout change below.
pub const ABI_VERSION: u32 = 1;

/// Exported name of the module bootstrap entry point.
pub const BOOTSTRAP_SYMBOL: &str = "hotmock_bootstrap";

/// Signature of the bootstrap entry point.
pub type BootstrapFn = unsafe extern "C" fn() -> PatchSet;

/// Borrowed UTF-8 string passed across the module boundary.
#[repr(C)]
#[derive(Debug, Clone, Copy)]
pub struct RawStr<'a> {
	pub ptr: *const u8,
	pub len: usize,
	_marker: PhantomData<&'a str>,
}

impl<'a> RawStr<'a> {
	/// Borrows `s`.
	pub const fn new(s: &'a str) -> Self {
		Self {
			ptr: s.as_ptr(),
			len: s.len(),
			_marker: PhantomData,
		}
	}

	/// Reads the string back, or `None` when it is null or not UTF-8.
	///
	/// # Safety
	///
	/// `ptr` must be null or valid for reads of `len` bytes for `'a`.
	pub unsafe fn as_str(&self) -> Option<&'a str> {
		if self.ptr.is_null() {
			return None;
		}
		// SAFETY: guaranteed by the caller.
		let bytes = unsafe { std::slice::from_raw_parts(self.ptr, self.len) };
		std::str::from_utf8(bytes).ok()
	}
}

/// Operation kinds carried by [`PatchOp::kind`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PatchKind {
	/// Remove any mock for the named function.
	Reset,
	/// Install the module's function under the name.
	Install,
}

impl PatchKind {
	const RESET: u32 = 0;
	const INSTALL: u32 = 1;

	fn from_raw(raw: u32) -> Option<Self> {
		match raw {
			Self::RESET => Some(Self::Reset),
			Self::INSTALL => Some(Self::Install),
			_ => None,
		}
	}
}

/// One reset or install request.
#[repr(C)]
#[derive(Debug, Clone, Copy)]
pub struct PatchOp {
	pub kind: u32,
	pub name: RawStr<'static>,
	pub signature: RawStr<'static>,
	pub target: *const (),
}

impl PatchOp {
	/// Reset of the function `name`.
	pub const fn reset(name: &'static str) -> Self {
		Self {
			kind: PatchKind::RESET,
			name: RawStr::new(name),
			signature: RawStr::new(""),
			target: std::ptr::null(),
		}
	}

	/// Install of `target`, a function pointer of shape `signature`, under `name`.
	pub const fn install(name: &'static str, signature: &'static str, target: *const ()) -> Self {
		Self {
			kind: PatchKind::INSTALL,
			name: RawStr::new(name),
			signature: RawStr::new(signature),
			target,
		}
	}

	/// Decoded operation kind, `None` for unknown values.
	pub fn kind(&self) -> Option<PatchKind> {
		PatchKind::from_raw(self.kind)
	}
}

/// Ordered list of operations returned by a module bootstrap.
#[repr(C)]
#[derive(Debug, Clone, Copy)]
pub struct PatchSet {
	pub abi_version: u32,
	pub ops: *const PatchOp,
	pub len: usize,
}

impl PatchSet {
	/// Leaks `ops` for the lifetime of the module and describes them.
	pub fn leak(ops: Vec<PatchOp>) -> Self {
		let ops: &'static [PatchOp] = ops.leak();
		Self {
			abi_version: ABI_VERSION,
			ops: ops.as_ptr(),
			len: ops.len(),
		}
	}

	/// Views the operations.
	///
	/// # Safety
	///
	/// `ops` must be null or valid for reads of `len` operations for `'a`.
	pub unsafe fn ops<'a>(&self) -> &'a [PatchOp] {
		if self.ops.is_null() || self.len == 0 {
			return &[];
		}
		// SAFETY: guaranteed by the caller.
		unsafe { std::slice::from_raw_parts(self.ops, self.len) }
	}
}
