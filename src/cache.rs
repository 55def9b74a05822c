//! Multi-tier page cache (spec.md §4.2).
//!
//! Three independent tiers — small, medium, big — each a fixed-size array of
//! slots. A slot mirrors one pool-aligned, tier-sized page of the backing
//! store in RAM, tracking its dirty bit, lock count and LRU recency.

use crate::addr::VAddr;
use crate::backend::BackingStore;
use crate::config::Config;
use crate::error::CoreError;
use crate::stats::Stats;

/// One of the three independent page-cache tiers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Tier {
	Small,
	Medium,
	Big,
}

const TIERS: [Tier; 3] = [Tier::Small, Tier::Medium, Tier::Big];

struct Slot {
	mapped: Option<VAddr>,
	dirty: bool,
	locks: u32,
	recency: u64,
	data: Vec<u8>,
}

impl Slot {
	fn new(cap: usize) -> Self {
		Self {
			mapped: None,
			dirty: false,
			locks: 0,
			recency: 0,
			data: vec![0u8; cap],
		}
	}

	/// Tells whether this slot's mapped page contains `addr`.
	fn contains(&self, cap: usize, addr: VAddr) -> bool {
		match self.mapped {
			Some(base) => {
				let a = addr.0 as u64;
				let b = base.0 as u64;
				a >= b && a < b + cap as u64
			}
			None => false,
		}
	}
}

pub(crate) struct PageCache {
	slots: [Vec<Slot>; 3],
	caps: [usize; 3],
	pool_size: u32,
	tick: u64,
}

impl PageCache {
	pub(crate) fn new(config: &Config) -> Self {
		let caps = [
			config.small.capacity,
			config.medium.capacity,
			config.big.capacity,
		];
		let slots = [
			(0..config.small.slots)
				.map(|_| Slot::new(caps[0]))
				.collect(),
			(0..config.medium.slots)
				.map(|_| Slot::new(caps[1]))
				.collect(),
			(0..config.big.slots)
				.map(|_| Slot::new(caps[2]))
				.collect(),
		];
		Self {
			slots,
			caps,
			pool_size: config.pool_size,
			tick: 0,
		}
	}

	fn idx(tier: Tier) -> usize {
		match tier {
			Tier::Small => 0,
			Tier::Medium => 1,
			Tier::Big => 2,
		}
	}

	/// Tier selected by request length (spec.md §4.2 "Tier selection").
	pub(crate) fn tier_for(&self, len: usize) -> Tier {
		if len <= self.caps[0] {
			Tier::Small
		} else if len <= self.caps[1] {
			Tier::Medium
		} else {
			Tier::Big
		}
	}

	pub(crate) fn cap(&self, tier: Tier) -> usize {
		self.caps[Self::idx(tier)]
	}

	pub(crate) fn total_slots(&self, tier: Tier) -> usize {
		self.slots[Self::idx(tier)].len()
	}

	pub(crate) fn locked_pages(&self, tier: Tier) -> usize {
		self.slots[Self::idx(tier)]
			.iter()
			.filter(|s| s.locks > 0)
			.count()
	}

	pub(crate) fn unlocked_pages(&self, tier: Tier) -> usize {
		self.total_slots(tier) - self.locked_pages(tier)
	}

	fn page_base(&self, tier: Tier, addr: VAddr) -> u32 {
		let cap = self.cap(tier) as u32;
		addr.0 - (addr.0 % cap)
	}

	fn page_end(&self, tier: Tier, page_base: u32) -> u32 {
		let cap = self.cap(tier) as u32;
		core::cmp::min(page_base.saturating_add(cap), self.pool_size)
	}

	fn find_in(&self, tier: Tier, addr: VAddr) -> Option<usize> {
		let cap = self.cap(tier);
		self.slots[Self::idx(tier)]
			.iter()
			.position(|s| s.contains(cap, addr))
	}

	/// Finds the tightest existing mapping of `addr` across all tiers, if
	/// any (spec.md §3 "reads come from the tightest mapped range").
	fn find_any(&self, addr: VAddr) -> Option<Tier> {
		TIERS.into_iter().find(|&t| self.find_in(t, addr).is_some())
	}

	fn validate_range(&self, addr: VAddr, len: usize) -> Result<(), ()> {
		let end = addr.0 as u64 + len as u64;
		if len == 0 || addr.0 as u64 >= self.pool_size as u64 || end > self.pool_size as u64 {
			Err(())
		} else {
			Ok(())
		}
	}

	fn flush_slot<B: BackingStore>(
		&mut self,
		tier: Tier,
		idx: usize,
		backend: &mut B,
		stats: &Stats,
	) -> Result<(), CoreError<B::Error>> {
		let cap = self.cap(tier);
		let slot = &mut self.slots[Self::idx(tier)][idx];
		if !slot.dirty {
			return Ok(());
		}
		let Some(base) = slot.mapped else {
			slot.dirty = false;
			return Ok(());
		};
		let len = core::cmp::min(cap as u32, self.pool_size.saturating_sub(base.0)) as usize;
		backend
			.write(base, &slot.data[..len])
			.map_err(CoreError::BackingIoError)?;
		stats.record_write(len);
		slot.dirty = false;
		Ok(())
	}

	fn evict<B: BackingStore>(
		&mut self,
		tier: Tier,
		backend: &mut B,
		stats: &Stats,
	) -> Result<usize, CoreError<B::Error>> {
		let tidx = Self::idx(tier);
		let victim = self.slots[tidx]
			.iter()
			.enumerate()
			.filter(|(_, s)| s.locks == 0)
			.min_by_key(|(_, s)| (s.recency, s.dirty))
			.map(|(i, _)| i)
			.ok_or_else(|| {
				log::warn!(target: "vmem::cache", "{:?}: all pages locked, cannot evict", tier);
				CoreError::AllPagesLocked
			})?;
		let was_dirty = self.slots[tidx][victim].dirty;
		let victim_base = self.slots[tidx][victim].mapped;
		self.flush_slot(tier, victim, backend, stats)?;
		self.slots[tidx][victim].mapped = None;
		log::trace!(
			target: "vmem::cache",
			"{:?}: evicted slot {} (page {:?}, was dirty: {})",
			tier,
			victim,
			victim_base,
			was_dirty,
		);
		Ok(victim)
	}

	fn load<B: BackingStore>(
		&mut self,
		tier: Tier,
		idx: usize,
		page_base: u32,
		backend: &mut B,
		stats: &Stats,
	) -> Result<(), CoreError<B::Error>> {
		let cap = self.cap(tier);
		let load_len = (self.page_end(tier, page_base) - page_base) as usize;
		self.tick += 1;
		let tick = self.tick;
		let slot = &mut self.slots[Self::idx(tier)][idx];
		backend
			.read(VAddr(page_base), &mut slot.data[..load_len])
			.map_err(CoreError::BackingIoError)?;
		if load_len < cap {
			slot.data[load_len..].fill(0);
		}
		slot.mapped = Some(VAddr(page_base));
		slot.dirty = false;
		slot.locks = 0;
		slot.recency = tick;
		stats.record_read(load_len);
		Ok(())
	}

	/// Ensures `addr` is mapped in `tier`, by hit or by evict-then-load.
	/// Returns the slot index.
	fn ensure_loaded<B: BackingStore>(
		&mut self,
		tier: Tier,
		addr: VAddr,
		backend: &mut B,
		stats: &Stats,
	) -> Result<usize, CoreError<B::Error>> {
		if let Some(idx) = self.find_in(tier, addr) {
			self.tick += 1;
			self.slots[Self::idx(tier)][idx].recency = self.tick;
			stats.tier(tier).hits.fetch_add(1, std::sync::atomic::Ordering::Relaxed);
			return Ok(idx);
		}
		stats.tier(tier).misses.fetch_add(1, std::sync::atomic::Ordering::Relaxed);
		let idx = self.evict(tier, backend, stats)?;
		let page_base = self.page_base(tier, addr);
		self.load(tier, idx, page_base, backend, stats)?;
		Ok(idx)
	}

	/// Flushes (if dirty) and unmaps any slot in a tier other than `skip`
	/// whose mapped page contains `addr`. Fails with `CoherenceLocked` if
	/// such a slot is locked (spec.md §4.2 "Cross-tier coherence").
	fn invalidate_other_tiers<B: BackingStore>(
		&mut self,
		addr: VAddr,
		skip: Tier,
		backend: &mut B,
		stats: &Stats,
	) -> Result<(), CoreError<B::Error>> {
		for tier in TIERS {
			if tier == skip {
				continue;
			}
			if let Some(idx) = self.find_in(tier, addr) {
				if self.slots[Self::idx(tier)][idx].locks > 0 {
					log::warn!(
						target: "vmem::cache",
						"{:?}: coherence invalidation blocked by a lock at {:?}",
						tier,
						addr,
					);
					return Err(CoreError::CoherenceLocked);
				}
				self.flush_slot(tier, idx, backend, stats)?;
				self.slots[Self::idx(tier)][idx].mapped = None;
			}
		}
		Ok(())
	}

	/// Reads up to `len` bytes starting at `addr`. Returns the bytes
	/// actually available (clipped to the serving page's boundary) and
	/// their count.
	pub(crate) fn read<B: BackingStore>(
		&mut self,
		addr: VAddr,
		len: usize,
		backend: &mut B,
		stats: &Stats,
	) -> Result<(&[u8], usize), CoreError<B::Error>> {
		self.validate_range(addr, 1)
			.map_err(|_| CoreError::AddressOutOfRange)?;
		let tier = self.find_any(addr).unwrap_or_else(|| self.tier_for(len));
		let idx = self.ensure_loaded(tier, addr, backend, stats)?;
		let cap = self.cap(tier);
		let base = self.slots[Self::idx(tier)][idx].mapped.unwrap();
		let off = (addr.0 - base.0) as usize;
		let page_avail = cap - off;
		let pool_avail = (self.pool_size - addr.0) as usize;
		let actual = len.min(page_avail).min(pool_avail);
		let data = &self.slots[Self::idx(tier)][idx].data[off..off + actual];
		Ok((data, actual))
	}

	/// Writes `src` starting at `addr`, clipped to the target page's
	/// boundary. Returns the number of bytes actually written.
	pub(crate) fn write<B: BackingStore>(
		&mut self,
		addr: VAddr,
		src: &[u8],
		backend: &mut B,
		stats: &Stats,
	) -> Result<usize, CoreError<B::Error>> {
		self.validate_range(addr, 1)
			.map_err(|_| CoreError::AddressOutOfRange)?;
		let tier = self.tier_for(src.len());
		self.invalidate_other_tiers(addr, tier, backend, stats)?;
		let idx = self.ensure_loaded(tier, addr, backend, stats)?;
		let cap = self.cap(tier);
		let base = self.slots[Self::idx(tier)][idx].mapped.unwrap();
		let off = (addr.0 - base.0) as usize;
		let page_avail = cap - off;
		let pool_avail = (self.pool_size - addr.0) as usize;
		let actual = src.len().min(page_avail).min(pool_avail);
		let slot = &mut self.slots[Self::idx(tier)][idx];
		slot.data[off..off + actual].copy_from_slice(&src[..actual]);
		slot.dirty = true;
		self.tick += 1;
		slot.recency = self.tick;
		Ok(actual)
	}

	/// Reads exactly `buf.len()` bytes starting at `addr`, looping over
	/// `read` as many times as needed to cross page boundaries.
	pub(crate) fn read_exact<B: BackingStore>(
		&mut self,
		mut addr: VAddr,
		mut buf: &mut [u8],
		backend: &mut B,
		stats: &Stats,
	) -> Result<(), CoreError<B::Error>> {
		while !buf.is_empty() {
			let (data, n) = self.read(addr, buf.len(), backend, stats)?;
			buf[..n].copy_from_slice(data);
			buf = &mut buf[n..];
			addr = addr + n as u32;
		}
		Ok(())
	}

	/// Writes exactly `buf` starting at `addr`, looping over `write` as
	/// many times as needed to cross page boundaries.
	pub(crate) fn write_exact<B: BackingStore>(
		&mut self,
		mut addr: VAddr,
		mut buf: &[u8],
		backend: &mut B,
		stats: &Stats,
	) -> Result<(), CoreError<B::Error>> {
		while !buf.is_empty() {
			let n = self.write(addr, buf, backend, stats)?;
			buf = &buf[n..];
			addr = addr + n as u32;
		}
		Ok(())
	}

	/// Pins `[addr, addr+len)` inside a single page of `tier`, clipped to
	/// the page boundary. Returns a raw pointer to the start of the pinned
	/// range plus the actual (possibly clipped) length.
	pub(crate) fn make_data_lock<B: BackingStore>(
		&mut self,
		tier: Tier,
		addr: VAddr,
		len: usize,
		read_only: bool,
		backend: &mut B,
		stats: &Stats,
	) -> Result<(*mut u8, usize), CoreError<B::Error>> {
		self.validate_range(addr, 1)
			.map_err(|_| CoreError::AddressOutOfRange)?;
		if !read_only {
			self.invalidate_other_tiers(addr, tier, backend, stats)?;
		}
		let idx = self.ensure_loaded(tier, addr, backend, stats)?;
		let cap = self.cap(tier);
		let slot = &mut self.slots[Self::idx(tier)][idx];
		let base = slot.mapped.unwrap();
		let off = (addr.0 - base.0) as usize;
		let page_avail = cap - off;
		let pool_avail = (self.pool_size - addr.0) as usize;
		let actual = len.min(page_avail).min(pool_avail);
		slot.locks += 1;
		if !read_only {
			slot.dirty = true;
		}
		let ptr = slot.data[off..].as_mut_ptr();
		Ok((ptr, actual))
	}

	/// Decrements the lock count of the slot in `tier` mapping `addr`.
	pub(crate) fn release_lock(&mut self, tier: Tier, addr: VAddr) {
		if let Some(idx) = self.find_in(tier, addr) {
			let slot = &mut self.slots[Self::idx(tier)][idx];
			debug_assert!(slot.locks > 0, "lock count underflow");
			slot.locks = slot.locks.saturating_sub(1);
		}
	}

	/// Writes every dirty slot back to the backing store; dirty bits are
	/// cleared, mappings retained.
	pub(crate) fn flush<B: BackingStore>(
		&mut self,
		backend: &mut B,
		stats: &Stats,
	) -> Result<(), CoreError<B::Error>> {
		for tier in TIERS {
			for idx in 0..self.total_slots(tier) {
				self.flush_slot(tier, idx, backend, stats)?;
			}
		}
		Ok(())
	}

	/// `flush()`, then unmaps every unlocked slot.
	pub(crate) fn clear_pages<B: BackingStore>(
		&mut self,
		backend: &mut B,
		stats: &Stats,
	) -> Result<(), CoreError<B::Error>> {
		self.flush(backend, stats)?;
		for tier in TIERS {
			let tidx = Self::idx(tier);
			for slot in &mut self.slots[tidx] {
				if slot.locks == 0 {
					slot.mapped = None;
				}
			}
		}
		Ok(())
	}
}
