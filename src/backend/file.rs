use std::fs::{File, OpenOptions};
use std::io::{self, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use crate::addr::VAddr;

use super::BackingStore;

/// Host file backend (spec.md §6.1 "Host file (stdio)"): a file opened for
/// read/write, seek-based. The file must already be at least `pool_size`
/// bytes; unlike [`super::SdCardBackend`] this adapter does not grow it.
#[derive(Debug)]
pub struct FileBackend {
	path: PathBuf,
	file: Option<File>,
	pool_size: u32,
}

impl FileBackend {
	pub fn new(path: impl AsRef<Path>, pool_size: u32) -> Self {
		Self {
			path: path.as_ref().to_path_buf(),
			file: None,
			pool_size,
		}
	}

	fn file_mut(&mut self) -> io::Result<&mut File> {
		self.file
			.as_mut()
			.ok_or_else(|| io::Error::new(io::ErrorKind::NotConnected, "backend not started"))
	}
}

impl BackingStore for FileBackend {
	type Error = io::Error;

	fn start(&mut self) -> Result<u32, Self::Error> {
		let file = OpenOptions::new()
			.read(true)
			.write(true)
			.open(&self.path)?;
		let len = file.metadata()?.len();
		if len < self.pool_size as u64 {
			return Err(io::Error::new(
				io::ErrorKind::UnexpectedEof,
				format!(
					"{}: file is {} bytes, need at least {}",
					self.path.display(),
					len,
					self.pool_size
				),
			));
		}
		self.file = Some(file);
		Ok(self.pool_size)
	}

	fn stop(&mut self) -> Result<(), Self::Error> {
		if let Some(file) = self.file.take() {
			file.sync_all()?;
		}
		Ok(())
	}

	fn read(&mut self, offset: VAddr, buf: &mut [u8]) -> Result<(), Self::Error> {
		let file = self.file_mut()?;
		file.seek(SeekFrom::Start(offset.0 as u64))?;
		file.read_exact(buf)
	}

	fn write(&mut self, offset: VAddr, buf: &[u8]) -> Result<(), Self::Error> {
		let file = self.file_mut()?;
		file.seek(SeekFrom::Start(offset.0 as u64))?;
		file.write_all(buf)
	}
}
