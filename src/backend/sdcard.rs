use std::fs::OpenOptions;
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use crate::addr::VAddr;

use super::{BackingStore, FileBackend};

/// SD-card backend (spec.md §6.1): `ramfile.vm` at the pool root on a FAT
/// filesystem. On `start()`, if the file is shorter than `pool_size`, it is
/// zero-extended rather than rejected, since a freshly formatted card won't
/// have the file at all yet.
#[derive(Debug)]
pub struct SdCardBackend {
	dir: PathBuf,
	pool_size: u32,
	inner: Option<FileBackend>,
}

const FILE_NAME: &str = "ramfile.vm";

impl SdCardBackend {
	pub fn new(mount_dir: impl AsRef<Path>, pool_size: u32) -> Self {
		Self {
			dir: mount_dir.as_ref().to_path_buf(),
			pool_size,
			inner: None,
		}
	}

	fn path(&self) -> PathBuf {
		self.dir.join(FILE_NAME)
	}
}

impl BackingStore for SdCardBackend {
	type Error = io::Error;

	fn start(&mut self) -> Result<u32, Self::Error> {
		let path = self.path();
		let existing_len = path.metadata().map(|m| m.len()).unwrap_or(0);
		if existing_len < self.pool_size as u64 {
			let mut file = OpenOptions::new()
				.create(true)
				.write(true)
				.truncate(false)
				.open(&path)?;
			file.set_len(self.pool_size as u64)?;
			file.flush()?;
		}
		let mut inner = FileBackend::new(&path, self.pool_size);
		let size = inner.start()?;
		self.inner = Some(inner);
		Ok(size)
	}

	fn stop(&mut self) -> Result<(), Self::Error> {
		if let Some(mut inner) = self.inner.take() {
			inner.stop()?;
		}
		Ok(())
	}

	fn read(&mut self, offset: VAddr, buf: &mut [u8]) -> Result<(), Self::Error> {
		self.inner
			.as_mut()
			.ok_or_else(|| io::Error::new(io::ErrorKind::NotConnected, "backend not started"))?
			.read(offset, buf)
	}

	fn write(&mut self, offset: VAddr, buf: &[u8]) -> Result<(), Self::Error> {
		self.inner
			.as_mut()
			.ok_or_else(|| io::Error::new(io::ErrorKind::NotConnected, "backend not started"))?
			.write(offset, buf)
	}
}
