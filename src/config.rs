//! Per-instance configuration (spec.md §6.2).

/// Bytes reserved at the start of the pool for the persisted free-list head
/// word (spec.md §3, §6.3). Usable addresses start here.
pub const BASE_OFFSET: u32 = 4;

/// Size and slot count for one page-cache tier.
#[derive(Debug, Clone, Copy)]
pub struct TierConfig {
	/// Page size for this tier, in bytes.
	pub capacity: usize,
	/// Number of slots in this tier's array.
	pub slots: usize,
}

impl TierConfig {
	pub const fn new(capacity: usize, slots: usize) -> Self {
		Self { capacity, slots }
	}
}

/// Configuration for one [`crate::Allocator`] instance, set before `start()`.
#[derive(Debug, Clone, Copy)]
pub struct Config {
	/// Total size of the pool, in bytes.
	pub pool_size: u32,
	pub small: TierConfig,
	pub medium: TierConfig,
	pub big: TierConfig,
}

impl Config {
	/// Checks the tier ordering and pool-size invariants spec.md §3 assumes.
	pub fn validate(&self) -> Result<(), &'static str> {
		if self.small.capacity == 0 || self.medium.capacity == 0 || self.big.capacity == 0 {
			return Err("tier capacities must be non-zero");
		}
		if !(self.small.capacity < self.medium.capacity && self.medium.capacity < self.big.capacity) {
			return Err("tiers must satisfy cap_small < cap_medium < cap_big");
		}
		if self.small.slots == 0 || self.medium.slots == 0 || self.big.slots == 0 {
			return Err("every tier must have at least one slot");
		}
		if self.pool_size <= BASE_OFFSET {
			return Err("pool_size must be greater than BASE_OFFSET");
		}
		Ok(())
	}
}
