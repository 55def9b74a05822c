//! Statistics / tracing sidecar (spec.md §4.5).
//!
//! Monotonic counters, readable at any time and resettable. They have no
//! effect on correctness; they exist for tests and benchmarks, the way
//! `maestro`'s `memory::stats::MemInfo` exists alongside its own allocator.

use std::sync::atomic::{AtomicU64, Ordering};

use crate::cache::Tier;

/// Hit/miss counters for a single page-cache tier.
#[derive(Debug, Default)]
pub struct TierStats {
	pub hits: AtomicU64,
	pub misses: AtomicU64,
}

impl TierStats {
	fn reset(&self) {
		self.hits.store(0, Ordering::Relaxed);
		self.misses.store(0, Ordering::Relaxed);
	}

	/// Fraction of lookups that hit, in `[0.0, 1.0]`. `0.0` if there have
	/// been no lookups at all.
	pub fn hit_ratio(&self) -> f32 {
		let hits = self.hits.load(Ordering::Relaxed);
		let misses = self.misses.load(Ordering::Relaxed);
		let total = hits + misses;
		if total == 0 {
			0.0
		} else {
			hits as f32 / total as f32
		}
	}
}

/// Counters for one [`crate::Allocator`] instance.
#[derive(Debug, Default)]
pub struct Stats {
	/// Pages loaded from the backing store (cache misses, not hits).
	pub page_reads: AtomicU64,
	/// Pages written back to the backing store (eviction, `flush`, `stop`).
	pub page_writes: AtomicU64,
	pub bytes_read: AtomicU64,
	pub bytes_written: AtomicU64,
	pub allocations_total: AtomicU64,
	pub frees_total: AtomicU64,
	/// Bytes currently outstanding across all live allocations, header
	/// included.
	pub bytes_allocated: AtomicU64,
	pub small: TierStats,
	pub medium: TierStats,
	pub big: TierStats,
}

impl Stats {
	pub fn reset(&self) {
		self.page_reads.store(0, Ordering::Relaxed);
		self.page_writes.store(0, Ordering::Relaxed);
		self.bytes_read.store(0, Ordering::Relaxed);
		self.bytes_written.store(0, Ordering::Relaxed);
		self.allocations_total.store(0, Ordering::Relaxed);
		self.frees_total.store(0, Ordering::Relaxed);
		self.bytes_allocated.store(0, Ordering::Relaxed);
		self.small.reset();
		self.medium.reset();
		self.big.reset();
	}

	pub fn hit_ratio(&self, tier: Tier) -> f32 {
		self.tier(tier).hit_ratio()
	}

	pub(crate) fn tier(&self, tier: Tier) -> &TierStats {
		match tier {
			Tier::Small => &self.small,
			Tier::Medium => &self.medium,
			Tier::Big => &self.big,
		}
	}

	pub(crate) fn record_read(&self, bytes: usize) {
		self.page_reads.fetch_add(1, Ordering::Relaxed);
		self.bytes_read.fetch_add(bytes as u64, Ordering::Relaxed);
	}

	pub(crate) fn record_write(&self, bytes: usize) {
		self.page_writes.fetch_add(1, Ordering::Relaxed);
		self.bytes_written.fetch_add(bytes as u64, Ordering::Relaxed);
	}
}
