//! End-to-end scenario tests (spec.md §8, S1-S6), exercised entirely over
//! `MemoryBackend` so the suite needs no filesystem or hardware.

use rand::{Rng, SeedableRng};
use rand::rngs::StdRng;

use vmem::backend::MemoryBackend;
use vmem::{Allocator, Config, CoreError, Tier, TierConfig, VPtr};

fn config(pool_size: u32) -> Config {
	Config {
		pool_size,
		small: TierConfig::new(32, 8),
		medium: TierConfig::new(512, 4),
		big: TierConfig::new(4096, 4),
	}
}

fn start(pool_size: u32) -> Allocator<MemoryBackend> {
	Allocator::start(config(pool_size), MemoryBackend::new(pool_size)).unwrap()
}

/// S1: simple round-trip.
#[test]
fn s1_simple_round_trip() {
	let mut a = start(1 << 16);
	let p = a.alloc_raw(4).unwrap();
	let ptr: VPtr<i32, MemoryBackend> = VPtr::from_raw_addr(p);
	a.at(ptr).set(55).unwrap();
	a.flush().unwrap();
	a.clear_pages().unwrap();
	assert_eq!(a.at(ptr).get().unwrap(), 55);
	a.free_raw(p).unwrap();
}

/// S2: a read-only view's local mutation is never persisted.
#[test]
fn s2_read_only_view_is_not_persisted() {
	let mut a = start(1 << 16);
	let p = a.alloc_raw(4).unwrap();
	a.write_exact(p, &55i32.to_le_bytes()).unwrap();

	{
		let (view, n) = a.read(p, 4).unwrap();
		assert_eq!(n, 4);
		let mut local = [0u8; 4];
		local.copy_from_slice(view);
		local[0] = 66;
		// `local` is a copy; mutating it never touches the pool.
	}

	a.flush().unwrap();
	a.clear_pages().unwrap();
	let mut buf = [0u8; 4];
	a.read_exact(p, &mut buf).unwrap();
	assert_eq!(i32::from_le_bytes(buf), 55);
}

/// S3: fill every big-tier slot, then verify the lot round-trips.
#[test]
fn s3_multi_big_page_fill() {
	let cfg = config(1 << 20);
	let big_slots = cfg.big.slots;
	let big_cap = cfg.big.capacity as u32;
	let mut a = Allocator::start(cfg, MemoryBackend::new(1 << 20)).unwrap();

	let mut ptrs = Vec::new();
	for i in 0..big_slots {
		let p = a.alloc_raw(big_cap).unwrap();
		a.write_exact(p, &(i as i32).to_le_bytes()).unwrap();
		ptrs.push(p);
	}
	assert_eq!(a.unlocked_pages(Tier::Big) + a.locked_pages(Tier::Big), a.total_slots(Tier::Big));

	a.flush().unwrap();
	a.clear_pages().unwrap();
	assert_eq!(a.unlocked_pages(Tier::Big), a.total_slots(Tier::Big));

	for (i, &p) in ptrs.iter().enumerate() {
		let mut buf = [0u8; 4];
		a.read_exact(p, &mut buf).unwrap();
		assert_eq!(i32::from_le_bytes(buf), i as i32);
	}
}

/// S4: lock accounting across the big tier, independent of other tiers.
#[test]
fn s4_lock_accounting() {
	let cfg = config(1 << 20);
	let big_slots = cfg.big.slots;
	let big_cap = cfg.big.capacity as u32;
	let mut a = Allocator::start(cfg, MemoryBackend::new(1 << 20)).unwrap();

	let mut guards = Vec::new();
	for i in 0..big_slots {
		let p = a.alloc_raw(big_cap).unwrap();
		let ptr: VPtr<u8, MemoryBackend> = VPtr::from_raw_addr(p);
		let guard = a.lock(ptr, big_cap as usize, false).unwrap();
		assert_eq!(a.unlocked_pages(Tier::Big), big_slots - i - 1);
		guards.push(guard);
	}
	assert_eq!(a.unlocked_pages(Tier::Big), 0);

	// Ordinary small-tier traffic must not move the big-tier counters.
	let small_ptr_addr = a.alloc_raw(4).unwrap();
	a.write_exact(small_ptr_addr, &[1, 2, 3, 4]).unwrap();
	assert_eq!(a.unlocked_pages(Tier::Big), 0);

	let total = guards.len();
	for (i, guard) in guards.into_iter().enumerate() {
		drop(guard);
		assert_eq!(a.unlocked_pages(Tier::Big), i + 1);
	}
	assert_eq!(a.unlocked_pages(Tier::Big), total);
}

/// S5: 8 MiB linear fill, read back linearly and via random probes.
#[test]
fn s5_large_linear_fill_and_random_probe() {
	let pool_size: u32 = 8 * 1024 * 1024 + (1 << 16);
	let cfg = config(pool_size);
	let mut a = Allocator::start(cfg, MemoryBackend::new(pool_size)).unwrap();

	let n: u32 = 8 * 1024 * 1024;
	let base = a.alloc_raw(n).unwrap();
	let byte_at = |i: u32| -> u8 { ((n - i) % 256) as u8 };

	for i in 0..n {
		a.write_exact(base + i, &[byte_at(i)]).unwrap();
	}
	a.clear_pages().unwrap();

	for i in 0..n {
		let mut buf = [0u8; 1];
		a.read_exact(base + i, &mut buf).unwrap();
		assert_eq!(buf[0], byte_at(i), "mismatch at offset {i}");
	}

	let mut rng = StdRng::seed_from_u64(42);
	for _ in 0..200 {
		let i = rng.gen_range(0..n);
		let mut buf = [0u8; 1];
		a.read_exact(base + i, &mut buf).unwrap();
		assert_eq!(buf[0], byte_at(i));
	}
}

/// S6: same size, seeded-PRNG data instead of a deterministic pattern.
#[test]
fn s6_large_random_data() {
	let pool_size: u32 = 8 * 1024 * 1024 + (1 << 16);
	let cfg = config(pool_size);
	let mut a = Allocator::start(cfg, MemoryBackend::new(pool_size)).unwrap();

	let n: u32 = 8 * 1024 * 1024;
	let base = a.alloc_raw(n).unwrap();

	let mut rng = StdRng::seed_from_u64(7);
	let mut expected = vec![0u8; n as usize];
	rng.fill(&mut expected[..]);
	for (i, &b) in expected.iter().enumerate() {
		a.write_exact(base + i as u32, &[b]).unwrap();
	}
	a.clear_pages().unwrap();

	for (i, &b) in expected.iter().enumerate() {
		let mut buf = [0u8; 1];
		a.read_exact(base + i as u32, &mut buf).unwrap();
		assert_eq!(buf[0], b, "linear mismatch at offset {i}");
	}

	let mut probe_rng = StdRng::seed_from_u64(99);
	for _ in 0..200 {
		let i = probe_rng.gen_range(0..n as usize);
		let mut buf = [0u8; 1];
		a.read_exact(base + i as u32, &mut buf).unwrap();
		assert_eq!(buf[0], expected[i]);
	}
}

/// Universal invariant: allocations exactly filling the pool succeed, the
/// next one reports `OutOfPool`.
#[test]
fn boundary_out_of_pool() {
	let pool_size = 1024;
	let cfg = config(pool_size);
	let usable = pool_size - vmem::BASE_OFFSET;
	let mut a = Allocator::start(cfg, MemoryBackend::new(pool_size)).unwrap();

	// One allocation consuming the entire usable pool.
	let p = a.alloc_raw(usable - 4).unwrap();
	assert!(matches!(a.alloc_raw(1), Err(CoreError::OutOfPool)));
	a.free_raw(p).unwrap();
}

/// Universal invariant: locking every big slot exhausts the tier; the next
/// miss fails with `AllPagesLocked`.
#[test]
fn boundary_all_pages_locked() {
	let cfg = config(1 << 16);
	let big_slots = cfg.big.slots;
	let big_cap = cfg.big.capacity as u32;
	let mut a = Allocator::start(cfg, MemoryBackend::new(1 << 16)).unwrap();

	let mut guards = Vec::new();
	for _ in 0..big_slots {
		let p = a.alloc_raw(big_cap).unwrap();
		let ptr: VPtr<u8, MemoryBackend> = VPtr::from_raw_addr(p);
		guards.push(a.lock(ptr, 1, false).unwrap());
	}

	// Forces a miss in a still-fully-locked tier: a write big enough to
	// select the big tier, at an address no locked slot covers.
	let far = a.alloc_raw(big_cap).unwrap();
	let payload = vec![7u8; big_cap as usize];
	assert!(matches!(
		a.write(far, &payload),
		Err(CoreError::AllPagesLocked)
	));
}
