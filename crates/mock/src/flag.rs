use std::sync::atomic::{AtomicU32, Ordering};

/// Gating flag co-located with one instrumented function.
///
/// Nonzero means "a mock may be installed, consult the table". The flag is a
/// hint: it may be set with no table entry, but it is never clear while an
/// entry is present (outside of [`Interceptor::call_original`]).
///
/// [`Interceptor::call_original`]: crate::Interceptor::call_original
#[derive(Debug, Default)]
pub struct Flag(AtomicU32);

impl Flag {
	/// Creates a cleared flag. Usable in `static` initializers.
	pub const fn new() -> Self {
		Self(AtomicU32::new(0))
	}

	/// Lock-free fast-path check performed on every instrumented call.
	#[inline]
	pub fn is_set(&self) -> bool {
		self.0.load(Ordering::Acquire) != 0
	}

	pub(crate) fn set(&self) {
		self.0.store(1, Ordering::Release);
	}

	pub(crate) fn clear(&self) {
		self.0.store(0, Ordering::Release);
	}

	/// Clears the flag, returning whether it was set.
	pub(crate) fn take(&self) -> bool {
		self.0.swap(0, Ordering::AcqRel) != 0
	}
}
