use embedded_hal::spi::SpiDevice;

use crate::addr::VAddr;

use super::{BackingStore, SpiSramBackend};

/// Concatenation of several same-size SPI SRAM chips into one address
/// space (spec.md §6.1 "SPI-attached SRAM, multi-chip"). A request
/// spanning a chip boundary is split and issued per chip.
pub struct MultiChipSpiSramBackend<SPI: SpiDevice> {
	chips: Vec<SpiSramBackend<SPI>>,
	chip_size: u32,
}

impl<SPI: SpiDevice> MultiChipSpiSramBackend<SPI> {
	pub fn new(chips: Vec<SpiSramBackend<SPI>>, chip_size: u32) -> Self {
		Self { chips, chip_size }
	}

	/// Splits `[offset, offset+len)` into `(chip_index, chip_local_offset,
	/// span_len)` pieces, each contained within one chip.
	fn spans(&self, offset: VAddr, len: usize) -> Vec<(usize, u32, usize)> {
		let mut spans = Vec::new();
		let mut remaining = len;
		let mut global = offset.0;
		while remaining > 0 {
			let chip_idx = (global / self.chip_size) as usize;
			let chip_off = global % self.chip_size;
			let span = core::cmp::min(remaining as u32, self.chip_size - chip_off) as usize;
			spans.push((chip_idx, chip_off, span));
			remaining -= span;
			global += span as u32;
		}
		spans
	}
}

impl<SPI: SpiDevice> BackingStore for MultiChipSpiSramBackend<SPI> {
	type Error = SPI::Error;

	fn start(&mut self) -> Result<u32, Self::Error> {
		for chip in &mut self.chips {
			chip.start()?;
		}
		Ok(self.chip_size * self.chips.len() as u32)
	}

	fn stop(&mut self) -> Result<(), Self::Error> {
		for chip in &mut self.chips {
			chip.stop()?;
		}
		Ok(())
	}

	fn read(&mut self, offset: VAddr, buf: &mut [u8]) -> Result<(), Self::Error> {
		let mut done = 0;
		for (chip_idx, chip_off, span) in self.spans(offset, buf.len()) {
			self.chips[chip_idx].read(VAddr(chip_off), &mut buf[done..done + span])?;
			done += span;
		}
		Ok(())
	}

	fn write(&mut self, offset: VAddr, buf: &[u8]) -> Result<(), Self::Error> {
		let mut done = 0;
		for (chip_idx, chip_off, span) in self.spans(offset, buf.len()) {
			self.chips[chip_idx].write(VAddr(chip_off), &buf[done..done + span])?;
			done += span;
		}
		Ok(())
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	struct NullSpi;
	#[derive(Debug)]
	struct NullError;
	impl embedded_hal::spi::Error for NullError {
		fn kind(&self) -> embedded_hal::spi::ErrorKind {
			embedded_hal::spi::ErrorKind::Other
		}
	}
	impl embedded_hal::spi::ErrorType for NullSpi {
		type Error = NullError;
	}
	impl SpiDevice for NullSpi {
		fn transaction(
			&mut self,
			_operations: &mut [embedded_hal::spi::Operation<'_, u8>],
		) -> Result<(), Self::Error> {
			Ok(())
		}
	}

	fn backend(chip_size: u32, n_chips: usize) -> MultiChipSpiSramBackend<NullSpi> {
		let chips = (0..n_chips)
			.map(|_| SpiSramBackend::new(NullSpi, chip_size))
			.collect();
		MultiChipSpiSramBackend::new(chips, chip_size)
	}

	#[test]
	fn splits_request_spanning_chip_boundary() {
		let b = backend(0x1000, 4);
		let spans = b.spans(VAddr(0x0FF0), 0x20);
		assert_eq!(spans, vec![(0, 0x0FF0, 0x10), (1, 0, 0x10)]);
	}

	#[test]
	fn request_within_one_chip_is_not_split() {
		let b = backend(0x1000, 4);
		let spans = b.spans(VAddr(0x0100), 0x10);
		assert_eq!(spans, vec![(0, 0x0100, 0x10)]);
	}
}
