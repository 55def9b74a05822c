//! Error kinds surfaced by the paging core (spec.md §7).
//!
//! Every fallible operation propagates its error to the caller; nothing is
//! swallowed, and statistics counters are never rolled back on failure.

use thiserror::Error;

/// Errors produced by the paging core.
///
/// Generic over `E`, the backing store's own error type, so a
/// [`crate::BackingStore`] failure round-trips through without being
/// erased or boxed.
#[derive(Debug, Error)]
pub enum CoreError<E> {
	/// No free block in the pool is large enough to satisfy the allocation.
	#[error("out of pool: no free block large enough for the request")]
	OutOfPool,
	/// `free_raw` was called on an address that is not an allocated block's
	/// boundary, or on the null address.
	#[error("invalid free: address is not an allocated block boundary")]
	InvalidFree,
	/// Eviction could not find an unlocked slot in the target tier.
	#[error("all pages locked: no unlocked slot available for eviction")]
	AllPagesLocked,
	/// A write's cross-tier invalidation hit a locked slot in another tier.
	#[error("coherence locked: overlapping lock blocks cross-tier invalidation")]
	CoherenceLocked,
	/// The backing store failed to complete a read or write.
	#[error("backing store I/O error: {0:?}")]
	BackingIoError(E),
	/// The requested range falls outside `[0, pool_size)`.
	#[error("address out of range")]
	AddressOutOfRange,
}
