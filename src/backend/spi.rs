use embedded_hal::spi::{Operation, SpiDevice};

use crate::addr::VAddr;

use super::BackingStore;

const CMD_WRMR: u8 = 0x01;
const CMD_WRITE: u8 = 0x02;
const CMD_READ: u8 = 0x03;
/// Sequential (streaming) mode bits for the mode register, per the 23LCxxx
/// family of SPI SRAMs this adapter targets.
const SEQUENTIAL_MODE: u8 = 0b0100_0000;

fn addr_width_for(pool_size: u32) -> u8 {
	if pool_size <= 1 << 8 {
		1
	} else if pool_size <= 1 << 16 {
		2
	} else if pool_size <= 1 << 24 {
		3
	} else {
		4
	}
}

fn swap_pairs(buf: &mut [u8]) {
	let mut chunks = buf.chunks_exact_mut(2);
	for pair in &mut chunks {
		pair.swap(0, 1);
	}
}

/// Single SPI-attached SRAM chip (spec.md §6.1). Address width (1-4 bytes)
/// is auto-selected from `pool_size`; the chip is placed into sequential
/// mode at `start()` so one command covers an arbitrarily long transfer.
pub struct SpiSramBackend<SPI> {
	spi: SPI,
	pool_size: u32,
	addr_width: u8,
	swap_bytes: bool,
}

impl<SPI: SpiDevice> SpiSramBackend<SPI> {
	pub fn new(spi: SPI, pool_size: u32) -> Self {
		Self {
			spi,
			pool_size,
			addr_width: addr_width_for(pool_size),
			swap_bytes: false,
		}
	}

	/// Enables byte-swapping of 16-bit words on the wire, for chips whose
	/// FIFO presents big-endian words to a little-endian host (spec.md §9
	/// "Endianness").
	pub fn with_byte_swap(mut self, swap: bool) -> Self {
		self.swap_bytes = swap;
		self
	}

	/// Big-endian address bytes; only the low `addr_width` of these four
	/// are actually put on the wire.
	fn addr_bytes(&self, addr: VAddr) -> [u8; 4] {
		addr.0.to_be_bytes()
	}
}

impl<SPI: SpiDevice> BackingStore for SpiSramBackend<SPI> {
	type Error = SPI::Error;

	fn start(&mut self) -> Result<u32, Self::Error> {
		self.spi.write(&[CMD_WRMR, SEQUENTIAL_MODE])?;
		Ok(self.pool_size)
	}

	fn stop(&mut self) -> Result<(), Self::Error> {
		Ok(())
	}

	fn read(&mut self, offset: VAddr, buf: &mut [u8]) -> Result<(), Self::Error> {
		let full = self.addr_bytes(offset);
		let addr_bytes = &full[4 - self.addr_width as usize..];
		let mut cmd = [0u8; 5];
		cmd[0] = CMD_READ;
		cmd[1..1 + addr_bytes.len()].copy_from_slice(addr_bytes);
		let cmd_len = 1 + addr_bytes.len();
		self.spi
			.transaction(&mut [Operation::Write(&cmd[..cmd_len]), Operation::TransferInPlace(buf)])?;
		if self.swap_bytes {
			swap_pairs(buf);
		}
		Ok(())
	}

	fn write(&mut self, offset: VAddr, buf: &[u8]) -> Result<(), Self::Error> {
		let full = self.addr_bytes(offset);
		let addr_bytes = &full[4 - self.addr_width as usize..];
		let mut cmd = [0u8; 5];
		cmd[0] = CMD_WRITE;
		cmd[1..1 + addr_bytes.len()].copy_from_slice(addr_bytes);
		let cmd_len = 1 + addr_bytes.len();

		if self.swap_bytes {
			let mut swapped = buf.to_vec();
			swap_pairs(&mut swapped);
			self.spi
				.transaction(&mut [Operation::Write(&cmd[..cmd_len]), Operation::Write(&swapped)])
		} else {
			self.spi
				.transaction(&mut [Operation::Write(&cmd[..cmd_len]), Operation::Write(buf)])
		}
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn addr_width_selection() {
		assert_eq!(addr_width_for(200), 1);
		assert_eq!(addr_width_for(1 << 16), 2);
		assert_eq!(addr_width_for((1 << 16) + 1), 3);
		assert_eq!(addr_width_for(1 << 24), 3);
		assert_eq!(addr_width_for((1 << 24) + 1), 4);
	}

	#[test]
	fn swap_pairs_swaps_in_place() {
		let mut buf = [1u8, 2, 3, 4];
		swap_pairs(&mut buf);
		assert_eq!(buf, [2, 1, 4, 3]);
	}
}
