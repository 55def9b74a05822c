//! Scoped lock primitive (spec.md §4.4).

use core::marker::PhantomData;

use crate::addr::VAddr;
use crate::cache::{PageCache, Tier};

/// Pins `[v, v+n)` inside one big-tier page (or, for a raw-tagged `VPtr`
/// under the `raw-interop` feature, a plain RAM range) and exposes a raw
/// pointer for its lifetime. Releases on every exit path via `Drop`,
/// including unwinding.
///
/// # Safety contract
/// A `LockGuard` must not outlive the [`crate::Allocator`] it was acquired
/// from. It deliberately does not borrow the allocator (spec.md §8/S4
/// requires multiple simultaneously live locks across distinct addresses,
/// which an exclusive borrow cannot express); callers are responsible for
/// not dropping or moving the allocator while guards are outstanding, and
/// for never holding overlapping locks across tiers on the same `VAddr`
/// range (spec.md §5 "Lock discipline").
pub struct LockGuard<T> {
	release: Option<(*mut PageCache, Tier, VAddr)>,
	ptr: *mut u8,
	len: usize,
	read_only: bool,
	_marker: PhantomData<*mut T>,
}

impl<T> LockGuard<T> {
	/// # Safety
	/// `cache` must be a valid, exclusively-owned pointer to the
	/// `PageCache` that produced `ptr` via `make_data_lock`, and must
	/// outlive this guard.
	pub(crate) unsafe fn new(
		cache: *mut PageCache,
		tier: Tier,
		addr: VAddr,
		ptr: *mut u8,
		len: usize,
		read_only: bool,
	) -> Self {
		Self {
			release: Some((cache, tier, addr)),
			ptr,
			len,
			read_only,
			_marker: PhantomData,
		}
	}

	/// A guard over a raw-tagged `VPtr` (feature `raw-interop`): locking is
	/// a no-op, release on drop does nothing (spec.md §4.3).
	#[cfg(feature = "raw-interop")]
	pub(crate) fn new_raw(ptr: *mut u8, len: usize, read_only: bool) -> Self {
		Self {
			release: None,
			ptr,
			len,
			read_only,
			_marker: PhantomData,
		}
	}

	pub fn as_ptr(&self) -> *const T {
		self.ptr.cast()
	}

	/// Returns a mutable pointer regardless of `read_only`; callers that
	/// requested a read-only lock are expected not to write through it
	/// (the cache cannot observe writes through a raw pointer either way).
	pub fn as_mut_ptr(&mut self) -> *mut T {
		self.ptr.cast()
	}

	/// Length of the pinned range, in elements of `T`. Clipped to the
	/// owning page's boundary; always `<=` the length requested at
	/// acquisition.
	pub fn len(&self) -> usize {
		self.len / core::mem::size_of::<T>().max(1)
	}

	pub fn is_empty(&self) -> bool {
		self.len() == 0
	}

	pub fn read_only(&self) -> bool {
		self.read_only
	}
}

impl<T> Drop for LockGuard<T> {
	fn drop(&mut self) {
		if let Some((cache, tier, addr)) = self.release {
			// SAFETY: contract documented on `LockGuard::new`.
			unsafe { (*cache).release_lock(tier, addr) };
		}
	}
}
