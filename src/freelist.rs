//! Virtual-address free-list allocator (spec.md §4.1).
//!
//! The free list is embedded in the pool itself: no RAM bookkeeping beyond
//! the head pointer, which is also persisted at offset 0 of the pool so a
//! reopened backing store always has a well-defined (if reinitialized) free
//! list. Mirrors `maestro`'s `malloc/chunk.rs` in-band header design, though
//! collapsed to a single ascending-address free list rather than segregated
//! bins, per spec.md §4.1's "first-fit + in-band free list".

use crate::addr::VAddr;
use crate::backend::BackingStore;
use crate::cache::PageCache;
use crate::config::BASE_OFFSET;
use crate::error::CoreError;
use crate::stats::Stats;

/// `{ size: u32, next: u32 }`, both fields counted in `size`.
const FREE_HEADER_SIZE: u32 = 8;
/// `{ size: u32 }`.
const ALLOC_HEADER_SIZE: u32 = 4;

fn read_u32<B: BackingStore>(
	cache: &mut PageCache,
	backend: &mut B,
	stats: &Stats,
	addr: VAddr,
) -> Result<u32, CoreError<B::Error>> {
	let mut buf = [0u8; 4];
	cache.read_exact(addr, &mut buf, backend, stats)?;
	Ok(u32::from_le_bytes(buf))
}

fn write_u32<B: BackingStore>(
	cache: &mut PageCache,
	backend: &mut B,
	stats: &Stats,
	addr: VAddr,
	value: u32,
) -> Result<(), CoreError<B::Error>> {
	cache.write_exact(addr, &value.to_le_bytes(), backend, stats)
}

fn read_free_header<B: BackingStore>(
	cache: &mut PageCache,
	backend: &mut B,
	stats: &Stats,
	addr: VAddr,
) -> Result<(u32, VAddr), CoreError<B::Error>> {
	let size = read_u32(cache, backend, stats, addr)?;
	let next = read_u32(cache, backend, stats, addr + 4)?;
	Ok((size, VAddr(next)))
}

fn write_free_header<B: BackingStore>(
	cache: &mut PageCache,
	backend: &mut B,
	stats: &Stats,
	addr: VAddr,
	size: u32,
	next: VAddr,
) -> Result<(), CoreError<B::Error>> {
	write_u32(cache, backend, stats, addr, size)?;
	write_u32(cache, backend, stats, addr + 4, next.0)
}

/// The head pointer is persisted in the pool's first `sizeof(VAddr)` bytes
/// (spec.md §6.3); the list itself lives entirely in paged bytes.
fn head<B: BackingStore>(
	cache: &mut PageCache,
	backend: &mut B,
	stats: &Stats,
) -> Result<VAddr, CoreError<B::Error>> {
	Ok(VAddr(read_u32(cache, backend, stats, VAddr(0))?))
}

fn set_head<B: BackingStore>(
	cache: &mut PageCache,
	backend: &mut B,
	stats: &Stats,
	new_head: VAddr,
) -> Result<(), CoreError<B::Error>> {
	write_u32(cache, backend, stats, VAddr(0), new_head.0)
}

/// Reinitializes the free list to span `[BASE_OFFSET, pool_size)`,
/// discarding whatever was on the backing store (spec.md §6.3: reopening
/// never recovers a prior pool's allocations).
pub(crate) fn init<B: BackingStore>(
	cache: &mut PageCache,
	backend: &mut B,
	stats: &Stats,
	pool_size: u32,
) -> Result<(), CoreError<B::Error>> {
	set_head(cache, backend, stats, VAddr(BASE_OFFSET))?;
	write_free_header(
		cache,
		backend,
		stats,
		VAddr(BASE_OFFSET),
		pool_size - BASE_OFFSET,
		VAddr(0),
	)
}

/// First-fit allocation; see spec.md §4.1.
pub(crate) fn alloc_raw<B: BackingStore>(
	cache: &mut PageCache,
	backend: &mut B,
	stats: &Stats,
	n_bytes: u32,
) -> Result<VAddr, CoreError<B::Error>> {
	// A block must be at least big enough to hold a free-list node, since it
	// will be written as one if it's later freed (`free_raw` always writes a
	// full `FREE_HEADER_SIZE`-byte header at `block_start`).
	let required = n_bytes
		.checked_add(ALLOC_HEADER_SIZE)
		.ok_or(CoreError::OutOfPool)?
		.max(FREE_HEADER_SIZE);

	let mut prev: Option<VAddr> = None;
	let mut current = head(cache, backend, stats)?;

	while !current.is_null() {
		let (size, next) = read_free_header(cache, backend, stats, current)?;
		if size >= required {
			let remainder = size - required;
			let block_size = if remainder >= FREE_HEADER_SIZE + 1 {
				let new_free = current + required;
				write_free_header(cache, backend, stats, new_free, remainder, next)?;
				match prev {
					Some(p) => write_u32(cache, backend, stats, p + 4, new_free.0)?,
					None => set_head(cache, backend, stats, new_free)?,
				}
				write_u32(cache, backend, stats, current, required)?;
				required
			} else {
				match prev {
					Some(p) => write_u32(cache, backend, stats, p + 4, next.0)?,
					None => set_head(cache, backend, stats, next)?,
				}
				write_u32(cache, backend, stats, current, size)?;
				size
			};
			stats
				.allocations_total
				.fetch_add(1, std::sync::atomic::Ordering::Relaxed);
			stats
				.bytes_allocated
				.fetch_add(block_size as u64, std::sync::atomic::Ordering::Relaxed);
			return Ok(current + ALLOC_HEADER_SIZE);
		}
		prev = Some(current);
		current = next;
	}

	Err(CoreError::OutOfPool)
}

/// Frees a block previously returned by `alloc_raw`, coalescing with
/// contiguous free neighbors. Performs the detectable subset of validation
/// described in `SPEC_FULL.md` (address-range and size-sanity checks; an
/// interior address that happens to carry a plausible size word is not
/// reliably detectable and is not attempted).
pub(crate) fn free_raw<B: BackingStore>(
	cache: &mut PageCache,
	backend: &mut B,
	stats: &Stats,
	pool_size: u32,
	user_addr: VAddr,
) -> Result<(), CoreError<B::Error>> {
	if user_addr.is_null() || user_addr.0 < BASE_OFFSET || user_addr.0 >= pool_size {
		return Err(CoreError::InvalidFree);
	}
	let block_start = user_addr - ALLOC_HEADER_SIZE;
	let size = read_u32(cache, backend, stats, block_start)?;
	let block_end_ok = matches!(block_start.0.checked_add(size), Some(end) if end <= pool_size);
	if size < ALLOC_HEADER_SIZE || !block_end_ok {
		return Err(CoreError::InvalidFree);
	}

	let mut prev: Option<VAddr> = None;
	let mut current = head(cache, backend, stats)?;
	while !current.is_null() && current.0 < block_start.0 {
		let (_, next) = read_free_header(cache, backend, stats, current)?;
		prev = Some(current);
		current = next;
	}
	if current.0 == block_start.0 {
		// `block_start` is already a free-list node: this is a double free
		// of a block that didn't get merged into a neighbor on its first
		// free (the detectable case; spec.md §8 property 7).
		return Err(CoreError::InvalidFree);
	}
	let next_addr = current;

	let merge_prev = match prev {
		Some(p) => {
			let (p_size, _) = read_free_header(cache, backend, stats, p)?;
			p.0 + p_size == block_start.0
		}
		None => false,
	};
	let merge_next = !next_addr.is_null() && block_start.0 + size == next_addr.0;

	let start = if merge_prev { prev.unwrap() } else { block_start };
	let (end, new_next) = if merge_next {
		let (n_size, n_next) = read_free_header(cache, backend, stats, next_addr)?;
		(next_addr.0 + n_size, n_next)
	} else {
		(block_start.0 + size, next_addr)
	};
	let new_size = end - start.0;

	write_free_header(cache, backend, stats, start, new_size, new_next)?;
	if !merge_prev {
		match prev {
			Some(p) => write_u32(cache, backend, stats, p + 4, start.0)?,
			None => set_head(cache, backend, stats, start)?,
		}
	}

	stats
		.frees_total
		.fetch_add(1, std::sync::atomic::Ordering::Relaxed);
	stats
		.bytes_allocated
		.fetch_sub(size as u64, std::sync::atomic::Ordering::Relaxed);
	Ok(())
}
