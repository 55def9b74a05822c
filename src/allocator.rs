//! The top-level paging allocator (spec.md §2 layer 3-4).
//!
//! Composes the backing store, the page cache, the free list and the
//! statistics sidecar into the single entry point application code talks
//! to — the same role `maestro`'s `memory::malloc::alloc`/`free`/`realloc`
//! play over `Block`/`Chunk`.

use core::mem::size_of;

use crate::addr::VAddr;
use crate::backend::BackingStore;
use crate::cache::{PageCache, Tier};
use crate::config::Config;
use crate::error::CoreError;
use crate::freelist;
use crate::lock::LockGuard;
use crate::stats::Stats;
use crate::vptr::{Pod, ValueRef, VPtr, VPtrRepr};

/// A single paging allocator instance: one backing store, one page cache,
/// one free list, one statistics block. Multiple instances may coexist but
/// never coordinate (spec.md §5 "Shared-resource policy").
pub struct Allocator<B: BackingStore> {
	backend: B,
	cache: PageCache,
	pool_size: u32,
	stats: Stats,
}

impl<B: BackingStore> Allocator<B> {
	/// Initializes the backend, allocates the page cache's slot arrays, and
	/// reinitializes the free list to span the whole usable pool.
	///
	/// Reopening a backing store that already holds a pool from a previous
	/// run does **not** recover its allocations (spec.md §6.3, a restated
	/// non-goal): whatever was there is discarded the moment `start()`
	/// returns.
	pub fn start(config: Config, mut backend: B) -> Result<Self, CoreError<B::Error>> {
		config
			.validate()
			.map_err(|_| CoreError::AddressOutOfRange)?;
		let pool_size = backend.start().map_err(CoreError::BackingIoError)?;
		let cache = PageCache::new(&config);
		let stats = Stats::default();
		let mut allocator = Self {
			backend,
			cache,
			pool_size,
			stats,
		};
		freelist::init(
			&mut allocator.cache,
			&mut allocator.backend,
			&allocator.stats,
			allocator.pool_size,
		)?;
		Ok(allocator)
	}

	/// Flushes dirty slots and releases the backend. The free list remains
	/// serialized in the backing store but is discarded from RAM.
	pub fn stop(mut self) -> Result<(), CoreError<B::Error>> {
		self.cache.flush(&mut self.backend, &self.stats)?;
		self.backend.stop().map_err(CoreError::BackingIoError)
	}

	pub fn stats(&self) -> &Stats {
		&self.stats
	}

	pub fn pool_size(&self) -> u32 {
		self.pool_size
	}

	/// First-fit raw allocation (spec.md §4.1). `n_bytes` excludes the
	/// header the allocator prepends.
	pub fn alloc_raw(&mut self, n_bytes: u32) -> Result<VAddr, CoreError<B::Error>> {
		freelist::alloc_raw(&mut self.cache, &mut self.backend, &self.stats, n_bytes)
	}

	/// Frees a block previously returned by `alloc_raw`.
	pub fn free_raw(&mut self, addr: VAddr) -> Result<(), CoreError<B::Error>> {
		freelist::free_raw(
			&mut self.cache,
			&mut self.backend,
			&self.stats,
			self.pool_size,
			addr,
		)
	}

	/// Reads up to `len` bytes starting at `vaddr`. Returns the clipped
	/// slice and its length, which may be less than `len` if the request
	/// crosses a tier page boundary (spec.md §4.2).
	///
	/// The returned slice is valid only until the next cache-mutating call,
	/// unless the range is covered by a held [`LockGuard`].
	pub fn read(&mut self, vaddr: VAddr, len: usize) -> Result<(&[u8], usize), CoreError<B::Error>> {
		self.cache.read(vaddr, len, &mut self.backend, &self.stats)
	}

	/// Writes `src` starting at `vaddr`, clipped to the target page's
	/// boundary. Returns the number of bytes actually written.
	pub fn write(&mut self, vaddr: VAddr, src: &[u8]) -> Result<usize, CoreError<B::Error>> {
		self.cache.write(vaddr, src, &mut self.backend, &self.stats)
	}

	/// Writes `buf.len()` bytes starting at `vaddr`, looping internally as
	/// needed to cross tier page boundaries. Bulk callers that need the
	/// underlying clipped-length behavior should use [`Self::write`]
	/// directly instead.
	pub fn write_exact(&mut self, vaddr: VAddr, buf: &[u8]) -> Result<(), CoreError<B::Error>> {
		self.cache.write_exact(vaddr, buf, &mut self.backend, &self.stats)
	}

	/// Reads `buf.len()` bytes starting at `vaddr`, looping internally as
	/// needed to cross tier page boundaries.
	pub fn read_exact(&mut self, vaddr: VAddr, buf: &mut [u8]) -> Result<(), CoreError<B::Error>> {
		self.cache.read_exact(vaddr, buf, &mut self.backend, &self.stats)
	}

	pub fn flush(&mut self) -> Result<(), CoreError<B::Error>> {
		self.cache.flush(&mut self.backend, &self.stats)
	}

	pub fn clear_pages(&mut self) -> Result<(), CoreError<B::Error>> {
		self.cache.clear_pages(&mut self.backend, &self.stats)
	}

	pub fn unlocked_pages(&self, tier: Tier) -> usize {
		self.cache.unlocked_pages(tier)
	}

	pub fn locked_pages(&self, tier: Tier) -> usize {
		self.cache.locked_pages(tier)
	}

	pub fn total_slots(&self, tier: Tier) -> usize {
		self.cache.total_slots(tier)
	}

	/// Binds `ptr` to a transient [`ValueRef`] for explicit `.get()`/
	/// `.set()`/`.update()` access (spec.md §4.3).
	pub fn at<T: Pod>(&mut self, ptr: VPtr<T, B>) -> ValueRef<'_, T, B> {
		ValueRef::new(self, ptr)
	}

	pub(crate) fn read_value<T: Pod>(&mut self, ptr: VPtr<T, B>) -> Result<T, CoreError<B::Error>> {
		match ptr.repr() {
			VPtrRepr::Virtual(addr) => {
				let mut buf = vec![0u8; size_of::<T>()];
				self.read_exact(addr, &mut buf)?;
				// SAFETY: `T: Pod` guarantees every bit pattern of this
				// size is a valid `T`.
				Ok(unsafe { core::ptr::read_unaligned(buf.as_ptr().cast()) })
			}
			#[cfg(feature = "raw-interop")]
			VPtrRepr::Raw(p) => Ok(unsafe { core::ptr::read_unaligned(p.cast()) }),
		}
	}

	pub(crate) fn write_value<T: Pod>(
		&mut self,
		ptr: VPtr<T, B>,
		value: T,
	) -> Result<(), CoreError<B::Error>> {
		match ptr.repr() {
			VPtrRepr::Virtual(addr) => {
				let bytes = unsafe {
					core::slice::from_raw_parts((&value as *const T).cast::<u8>(), size_of::<T>())
				};
				self.write_exact(addr, bytes)
			}
			#[cfg(feature = "raw-interop")]
			VPtrRepr::Raw(p) => {
				unsafe { core::ptr::write_unaligned(p.cast(), value) };
				Ok(())
			}
		}
	}

	/// Pins `[v, v+n)` inside one big-tier page and returns a scoped lock
	/// (spec.md §4.4). Always targets the big tier for a virtual pointer;
	/// a raw-tagged pointer (feature `raw-interop`) returns a no-op guard
	/// directly over the RAM range.
	pub fn lock<T: Pod>(
		&mut self,
		ptr: VPtr<T, B>,
		n: usize,
		read_only: bool,
	) -> Result<LockGuard<T>, CoreError<B::Error>> {
		match ptr.repr() {
			VPtrRepr::Virtual(addr) => {
				let len_bytes = n * size_of::<T>();
				let (raw_ptr, actual_len) = self.cache.make_data_lock(
					Tier::Big,
					addr,
					len_bytes,
					read_only,
					&mut self.backend,
					&self.stats,
				)?;
				Ok(unsafe {
					LockGuard::new(
						&mut self.cache as *mut PageCache,
						Tier::Big,
						addr,
						raw_ptr,
						actual_len,
						read_only,
					)
				})
			}
			#[cfg(feature = "raw-interop")]
			VPtrRepr::Raw(p) => Ok(LockGuard::new_raw(p, n * size_of::<T>(), read_only)),
		}
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::backend::MemoryBackend;
	use crate::config::{Config, TierConfig};

	fn small_config(pool_size: u32) -> Config {
		Config {
			pool_size,
			small: TierConfig::new(16, 4),
			medium: TierConfig::new(64, 2),
			big: TierConfig::new(256, 2),
		}
	}

	fn start(pool_size: u32) -> Allocator<MemoryBackend> {
		let backend = MemoryBackend::new(pool_size);
		Allocator::start(small_config(pool_size), backend).unwrap()
	}

	#[test]
	fn alloc_write_flush_clear_read_round_trips() {
		let mut a = start(4096);
		let p = a.alloc_raw(4).unwrap();
		a.write_exact(p, &55i32.to_le_bytes()).unwrap();
		a.flush().unwrap();
		a.clear_pages().unwrap();
		let mut buf = [0u8; 4];
		a.read_exact(p, &mut buf).unwrap();
		assert_eq!(i32::from_le_bytes(buf), 55);
		a.free_raw(p).unwrap();
	}

	#[test]
	fn value_ref_round_trips_through_cache() {
		let mut a = start(4096);
		let raw = a.alloc_raw(4).unwrap();
		let ptr: VPtr<i32, MemoryBackend> = VPtr::from_raw_addr(raw);
		a.at(ptr).set(55).unwrap();
		assert_eq!(a.at(ptr).get().unwrap(), 55);
		a.at(ptr).update(|v| v + 1).unwrap();
		assert_eq!(a.at(ptr).get().unwrap(), 56);
	}

	#[test]
	fn out_of_pool_when_exhausted() {
		let mut a = start(64);
		// pool usable bytes = 64 - BASE_OFFSET(4) = 60; each alloc of 16
		// costs 16+4 header = 20 bytes.
		assert!(a.alloc_raw(16).is_ok());
		assert!(a.alloc_raw(16).is_ok());
		assert!(a.alloc_raw(16).is_ok());
		assert!(matches!(a.alloc_raw(16), Err(CoreError::OutOfPool)));
	}

	#[test]
	fn double_free_is_rejected() {
		let mut a = start(4096);
		let p = a.alloc_raw(8).unwrap();
		a.free_raw(p).unwrap();
		assert!(matches!(a.free_raw(p), Err(CoreError::InvalidFree)));
	}
}
