//! Backing-store adapters (spec.md §6.1).
//!
//! The core only ever sees this trait; concrete media (SPI SRAM, an SD
//! card's FAT filesystem, a host file, an in-process buffer) are external
//! collaborators reached through it, the way `maestro`'s allocator reaches
//! physical frames only through its zone/frame abstractions.

use core::fmt::Debug;

mod memory;
pub use memory::MemoryBackend;

mod file;
pub use file::FileBackend;

mod sdcard;
pub use sdcard::SdCardBackend;

#[cfg(feature = "spi")]
mod spi;
#[cfg(feature = "spi")]
pub use spi::SpiSramBackend;

#[cfg(feature = "spi")]
mod spi_multi;
#[cfg(feature = "spi")]
pub use spi_multi::MultiChipSpiSramBackend;

use crate::addr::VAddr;

/// Raw byte-addressable medium backing one [`crate::Allocator`] pool.
pub trait BackingStore {
	type Error: Debug;

	/// Initializes the medium, returning the usable pool size in bytes.
	fn start(&mut self) -> Result<u32, Self::Error>;

	/// Flushes and releases medium resources. Called once, from
	/// `Allocator::stop`.
	fn stop(&mut self) -> Result<(), Self::Error>;

	/// Reads `buf.len()` bytes starting at `offset`. `offset + buf.len()`
	/// is always within `[0, pool_size]`.
	fn read(&mut self, offset: VAddr, buf: &mut [u8]) -> Result<(), Self::Error>;

	/// Writes `buf` starting at `offset`. `offset + buf.len()` is always
	/// within `[0, pool_size]`.
	fn write(&mut self, offset: VAddr, buf: &[u8]) -> Result<(), Self::Error>;
}
