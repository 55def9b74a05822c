//! A paging virtual-memory facility for memory-constrained hosts.
//!
//! Application code allocates objects whose bytes live in a large, slow
//! [`BackingStore`] (SPI-attached SRAM, an SD-card file, a host file, or an
//! in-process buffer for tests), while a small pool of in-RAM pages
//! transparently caches recently touched regions. User code manipulates
//! data through typed [`VPtr`]s: [`Allocator::at`] returns a short-lived
//! [`ValueRef`] for element access, and [`Allocator::lock`] pins a range
//! for direct raw-pointer access.
//!
//! Grounded on `maestro`'s `kernel/src/memory` subsystem (its in-band
//! free-list allocator, multi-tier page cache, and stats sidecar) — see
//! `DESIGN.md` in the crate root for the full grounding ledger.
//!
//! ```
//! use vmem::{Allocator, Config, TierConfig, VPtr};
//! use vmem::backend::MemoryBackend;
//!
//! let config = Config {
//!     pool_size: 1 << 16,
//!     small: TierConfig::new(16, 8),
//!     medium: TierConfig::new(256, 4),
//!     big: TierConfig::new(4096, 2),
//! };
//! let mut alloc = Allocator::start(config, MemoryBackend::new(1 << 16)).unwrap();
//! let p = alloc.alloc_raw(4).unwrap();
//! let ptr: VPtr<i32, MemoryBackend> = VPtr::from_raw_addr(p);
//! alloc.at(ptr).set(55).unwrap();
//! assert_eq!(alloc.at(ptr).get().unwrap(), 55);
//! alloc.free_raw(p).unwrap();
//! ```

mod addr;
mod allocator;
pub mod backend;
mod cache;
mod config;
mod error;
mod freelist;
mod lock;
mod stats;
mod vptr;

pub use addr::VAddr;
pub use allocator::Allocator;
pub use backend::BackingStore;
pub use cache::Tier;
pub use config::{Config, TierConfig, BASE_OFFSET};
pub use error::CoreError;
pub use lock::LockGuard;
pub use stats::{Stats, TierStats};
pub use vptr::{Pod, ValueRef, VPtr};
