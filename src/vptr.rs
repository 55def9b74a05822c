//! Typed virtual pointers and value handles (spec.md §4.3).
//!
//! A [`VPtr<T, B>`] is a typed wrapper over a [`VAddr`], scoped to the
//! backend type `B` it was allocated from (spec.md §5: "A `VPtr<T, Alloc>`
//! is parameterized by its owning allocator type"). Dereferencing does not
//! exist as a language-level operator the way it does in the source system;
//! instead `Allocator::at` returns a [`ValueRef`] whose `.get()`/`.set()`/
//! `.update()` methods round-trip through the page cache, matching the
//! explicit-accessor style spec.md §9 itself recommends for languages
//! without operator overloading.

use core::fmt;
use core::marker::PhantomData;

use crate::addr::VAddr;
use crate::allocator::Allocator;
use crate::backend::BackingStore;
use crate::error::CoreError;

/// Marker for types [`ValueRef`] may copy byte-for-byte between the pool and
/// a local value.
///
/// # Safety
/// Every bit pattern of `T`'s size must be a valid `T` (spec.md §4.3's
/// element access is a raw byte copy in both directions, with no validation
/// step).
pub unsafe trait Pod: Copy + 'static {}

macro_rules! impl_pod {
	($($t:ty),* $(,)?) => {
		$(unsafe impl Pod for $t {})*
	};
}
impl_pod!(u8, u16, u32, u64, u128, i8, i16, i32, i64, i128, f32, f64);
unsafe impl Pod for VAddr {}

#[derive(Clone, Copy, PartialEq, Eq)]
enum Repr {
	Virtual(VAddr),
	#[cfg(feature = "raw-interop")]
	Raw(*mut u8),
}

/// A typed pointer into one [`Allocator`]'s pool.
///
/// `null()` iff the underlying address is `0`. Arithmetic is in units of
/// `size_of::<T>()`. With the `raw-interop` feature, a `VPtr` may instead
/// wrap a plain RAM pointer for zero-cost interop with non-paged data
/// (spec.md §4.3 "Wrapped regular pointers"); all `Allocator` operations
/// check the tag and short-circuit to a direct dereference in that case.
pub struct VPtr<T, B> {
	repr: Repr,
	_marker: PhantomData<fn() -> (T, B)>,
}

impl<T, B> VPtr<T, B> {
	/// The null pointer, equal to every other null `VPtr`, regardless of
	/// `T`/`B`.
	pub const fn null() -> Self {
		Self {
			repr: Repr::Virtual(VAddr::NULL),
			_marker: PhantomData,
		}
	}

	/// Builds a `VPtr` from a raw pool address. Does not validate that the
	/// address is actually allocated.
	pub const fn from_raw_addr(addr: VAddr) -> Self {
		Self {
			repr: Repr::Virtual(addr),
			_marker: PhantomData,
		}
	}

	/// Wraps a plain RAM pointer for zero-cost interop (spec.md §4.3).
	#[cfg(feature = "raw-interop")]
	pub fn from_raw_ptr(ptr: *mut T) -> Self {
		Self {
			repr: Repr::Raw(ptr.cast()),
			_marker: PhantomData,
		}
	}

	pub fn is_null(&self) -> bool {
		match self.repr {
			Repr::Virtual(a) => a.is_null(),
			#[cfg(feature = "raw-interop")]
			Repr::Raw(p) => p.is_null(),
		}
	}

	/// The underlying virtual address. Meaningless for a raw-tagged `VPtr`
	/// (returns `VAddr::NULL`); callers mixing the two representations
	/// should check [`Self::is_raw`] first.
	pub fn raw_addr(&self) -> VAddr {
		match self.repr {
			Repr::Virtual(a) => a,
			#[cfg(feature = "raw-interop")]
			Repr::Raw(_) => VAddr::NULL,
		}
	}

	#[cfg(feature = "raw-interop")]
	pub fn is_raw(&self) -> bool {
		matches!(self.repr, Repr::Raw(_))
	}

	pub(crate) fn repr(&self) -> VPtrRepr {
		match self.repr {
			Repr::Virtual(a) => VPtrRepr::Virtual(a),
			#[cfg(feature = "raw-interop")]
			Repr::Raw(p) => VPtrRepr::Raw(p),
		}
	}

	/// Used by [`field_ptr!`] to compute a member pointer from a struct
	/// pointer and a statically known byte offset.
	pub fn from_field_offset<F>(self, offset: u32) -> VPtr<F, B> {
		let repr = match self.repr {
			Repr::Virtual(a) => Repr::Virtual(a + offset),
			#[cfg(feature = "raw-interop")]
			Repr::Raw(p) => Repr::Raw(unsafe { p.add(offset as usize) }),
		};
		VPtr {
			repr,
			_marker: PhantomData,
		}
	}
}

/// `pub(crate)` view of a `VPtr`'s representation, used by [`Allocator`]
/// and [`crate::lock::LockGuard`] without exposing the `Repr` enum.
pub(crate) enum VPtrRepr {
	Virtual(VAddr),
	#[cfg(feature = "raw-interop")]
	Raw(*mut u8),
}

impl<T, B> Clone for VPtr<T, B> {
	fn clone(&self) -> Self {
		*self
	}
}

impl<T, B> Copy for VPtr<T, B> {}

impl<T, B> PartialEq for VPtr<T, B> {
	fn eq(&self, other: &Self) -> bool {
		self.repr == other.repr
	}
}

impl<T, B> Eq for VPtr<T, B> {}

impl<T, B> fmt::Debug for VPtr<T, B> {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		match self.repr {
			Repr::Virtual(a) => write!(f, "VPtr({:?})", a),
			#[cfg(feature = "raw-interop")]
			Repr::Raw(p) => write!(f, "VPtr(raw {:p})", p),
		}
	}
}

impl<T: Sized, B> core::ops::Add<usize> for VPtr<T, B> {
	type Output = Self;

	fn add(self, count: usize) -> Self::Output {
		let bytes = (count * core::mem::size_of::<T>()) as u32;
		let repr = match self.repr {
			Repr::Virtual(a) => Repr::Virtual(a + bytes),
			#[cfg(feature = "raw-interop")]
			Repr::Raw(p) => Repr::Raw(unsafe { p.add(bytes as usize) }),
		};
		Self {
			repr,
			_marker: PhantomData,
		}
	}
}

impl<T: Sized, B> core::ops::Sub for VPtr<T, B> {
	type Output = i64;

	/// Element count between two pointers of the same type.
	fn sub(self, rhs: Self) -> i64 {
		let size = core::mem::size_of::<T>() as i64;
		let byte_diff = match (self.repr, rhs.repr) {
			(Repr::Virtual(a), Repr::Virtual(b)) => a - b,
			#[cfg(feature = "raw-interop")]
			(Repr::Raw(a), Repr::Raw(b)) => (unsafe { a.offset_from(b) }) as i64,
			#[cfg(feature = "raw-interop")]
			_ => panic!("cannot subtract a raw VPtr from a virtual one"),
		};
		if size == 0 {
			0
		} else {
			byte_diff / size
		}
	}
}

/// A short-lived handle bound to `VPtr<T, B> + i`, produced by
/// [`Allocator::at`]. Not storable beyond the expression that produced it:
/// it borrows the `Allocator` exclusively, so it cannot outlive the next
/// call into the cache.
pub struct ValueRef<'a, T: Pod, B: BackingStore> {
	allocator: &'a mut Allocator<B>,
	ptr: VPtr<T, B>,
}

impl<'a, T: Pod, B: BackingStore> ValueRef<'a, T, B> {
	pub(crate) fn new(allocator: &'a mut Allocator<B>, ptr: VPtr<T, B>) -> Self {
		Self { allocator, ptr }
	}

	/// Reads the current value through the page cache (or directly, for a
	/// raw-tagged pointer).
	pub fn get(&mut self) -> Result<T, CoreError<B::Error>> {
		self.allocator.read_value(self.ptr)
	}

	/// Writes `value` back through the page cache, marking the owning page
	/// dirty.
	pub fn set(&mut self, value: T) -> Result<(), CoreError<B::Error>> {
		self.allocator.write_value(self.ptr, value)
	}

	/// Read-modify-write: `f` receives the current value and returns the
	/// new one (spec.md §4.3 "compound updates").
	pub fn update(&mut self, f: impl FnOnce(T) -> T) -> Result<(), CoreError<B::Error>> {
		let v = self.get()?;
		self.set(f(v))
	}
}

/// Computes `VPtr<Field, B>` from `VPtr<Struct, B>` via the field's
/// statically known byte offset (spec.md §4.3 "Member pointer").
#[macro_export]
macro_rules! field_ptr {
	($ptr:expr, $struct_ty:ty, $field:ident) => {{
		let __offset = ::core::mem::offset_of!($struct_ty, $field) as u32;
		$crate::VPtr::from_field_offset($ptr, __offset)
	}};
}
