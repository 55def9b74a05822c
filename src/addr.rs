//! Addresses into a [`crate::Allocator`]'s pool.
//!
//! A [`VAddr`] is an index into the backing store, not a RAM pointer. It is
//! only meaningful relative to the [`crate::Allocator`] instance that
//! allocated it.

use std::fmt;
use std::ops::{Add, Sub};

/// An address into the virtual pool.
///
/// Address `0` is reserved as the null sentinel (spec.md §3): no allocation
/// ever starts there, since usable addresses begin at
/// [`crate::config::BASE_OFFSET`].
#[repr(transparent)]
#[derive(Clone, Copy, Default, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub struct VAddr(pub u32);

impl VAddr {
	/// The null sentinel, assignable to any virtual pointer type.
	pub const NULL: Self = Self(0);

	/// Tells whether this is the null sentinel.
	#[inline]
	pub const fn is_null(self) -> bool {
		self.0 == 0
	}
}

impl fmt::Debug for VAddr {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		write!(f, "VAddr({:#010x})", self.0)
	}
}

impl From<u32> for VAddr {
	fn from(v: u32) -> Self {
		Self(v)
	}
}

impl Add<u32> for VAddr {
	type Output = Self;

	/// Adds a byte offset, wrapping on overflow (mirrors pointer arithmetic
	/// in the source language, which never traps either).
	fn add(self, off: u32) -> Self::Output {
		Self(self.0.wrapping_add(off))
	}
}

impl Sub<u32> for VAddr {
	type Output = Self;

	fn sub(self, off: u32) -> Self::Output {
		Self(self.0.wrapping_sub(off))
	}
}

impl Sub<VAddr> for VAddr {
	type Output = i64;

	/// Distance between two addresses, in bytes.
	fn sub(self, rhs: VAddr) -> Self::Output {
		self.0 as i64 - rhs.0 as i64
	}
}
