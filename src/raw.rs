// MIT License
//
// Copyright (c) 2019-2021 Tobias Pfeiffer
//
// Permission is hereby granted, free of charge, to any person obtaining a copy
// of this software and associated documentation files (the "Software"), to deal
// in the Software without restriction, including without limitation the rights
// to use, copy, modify, merge, publish, distribute, sublicense, and/or sell
// copies of the Software, and to permit persons to whom the Software is
// furnished to do so, subject to the following conditions:
//
// The above copyright notice and this permission notice shall be included in all
// copies or substantial portions of the Software.
//
// THE SOFTWARE IS PROVIDED "AS IS", WITHOUT WARRANTY OF ANY KIND, EXPRESS OR
// IMPLIED, INCLUDING BUT NOT LIMITED TO THE WARRANTIES OF MERCHANTABILITY,
// FITNESS FOR A PARTICULAR PURPOSE AND NONINFRINGEMENT. IN NO EVENT SHALL THE
// AUTHORS OR COPYRIGHT HOLDERS BE LIABLE FOR ANY CLAIM, DAMAGES OR OTHER
// LIABILITY, WHETHER IN AN ACTION OF CONTRACT, TORT OR OTHERWISE, ARISING FROM,
// OUT OF OR IN CONNECTION WITH THE SOFTWARE OR THE USE OR OTHER DEALINGS IN THE
// SOFTWARE.

//! Machine word values crossing the native call boundary.

use std::{fmt, ptr::NonNull};

/// A pointer sized bit pattern, used for every argument and result of a native call.
///
/// A `RawValue` never owns the memory it may point to.
#[repr(transparent)]
#[derive(Copy, Clone, Default, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub struct RawValue(pub usize);

const _: () = assert!(std::mem::size_of::<RawValue>() == std::mem::size_of::<usize>());

impl RawValue {
	pub const ZERO: Self = Self(0);

	#[inline]
	pub const fn new(v: usize) -> Self {
		Self(v)
	}

	#[inline]
	pub const fn is_zero(self) -> bool {
		self.0 == 0
	}

	#[inline]
	pub const fn as_usize(self) -> usize {
		self.0
	}

	#[inline]
	pub const fn as_isize(self) -> isize {
		self.0 as isize
	}

	/// Truncates to the low 32 bits, the way a C callee reads an `uint32_t` return.
	#[inline]
	pub const fn as_u32(self) -> u32 {
		self.0 as u32
	}

	#[inline]
	pub const fn as_i32(self) -> i32 {
		self.0 as i32
	}

	#[inline]
	pub const fn as_u64(self) -> u64 {
		self.0 as u64
	}

	#[inline]
	pub fn as_ptr<T>(self) -> *const T {
		self.0 as *const T
	}

	#[inline]
	pub fn as_mut_ptr<T>(self) -> *mut T {
		self.0 as *mut T
	}

	/// Places the bit pattern of `v` in the low 32 bits.
	///
	/// Integer register only, callees taking a `float` in a floating point register
	/// cannot be reached this way.
	#[inline]
	pub fn from_f32_bits(v: f32) -> Self {
		Self(v.to_bits() as usize)
	}

	#[cfg(target_pointer_width = "64")]
	#[inline]
	pub fn from_f64_bits(v: f64) -> Self {
		Self(v.to_bits() as usize)
	}

	#[inline]
	pub fn to_f32_bits(self) -> f32 {
		f32::from_bits(self.0 as u32)
	}
}

impl fmt::Debug for RawValue {
	fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
		write!(f, "RawValue({:#x})", self.0)
	}
}

impl fmt::Display for RawValue {
	fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
		write!(f, "{:#x}", self.0)
	}
}

macro_rules! impl_from_unsigned {
	( $( $ty:ty ),* ) => { $(
		impl From<$ty> for RawValue {
			#[inline]
			fn from(v: $ty) -> Self {
				Self(v as usize)
			}
		}
	)* };
}

macro_rules! impl_from_signed {
	( $( $ty:ty ),* ) => { $(
		impl From<$ty> for RawValue {
			#[inline]
			fn from(v: $ty) -> Self {
				Self(v as isize as usize)
			}
		}
	)* };
}

impl_from_unsigned!(u8, u16, u32, usize);
impl_from_signed!(i8, i16, i32, isize);

#[cfg(target_pointer_width = "64")]
impl_from_unsigned!(u64);
#[cfg(target_pointer_width = "64")]
impl_from_signed!(i64);

impl From<bool> for RawValue {
	#[inline]
	fn from(v: bool) -> Self {
		Self(v as usize)
	}
}

impl<T> From<*const T> for RawValue {
	#[inline]
	fn from(v: *const T) -> Self {
		Self(v as usize)
	}
}

impl<T> From<*mut T> for RawValue {
	#[inline]
	fn from(v: *mut T) -> Self {
		Self(v as usize)
	}
}

impl<T> From<Option<NonNull<T>>> for RawValue {
	#[inline]
	fn from(v: Option<NonNull<T>>) -> Self {
		Self(v.map_or(0, |v| v.as_ptr() as usize))
	}
}

impl From<RawValue> for usize {
	#[inline]
	fn from(v: RawValue) -> Self {
		v.0
	}
}

/// The raw outcome of a native call.
///
/// `r1` holds the primary return register, `r2` the secondary one for callees that
/// return a two word aggregate. `err` is the OS error code observed right after
/// the call returned.
#[derive(Copy, Clone, Debug, Default, Eq, PartialEq)]
pub struct CallResult {
	pub r1:  RawValue,
	pub r2:  RawValue,
	pub err: i32
}

impl fmt::Display for CallResult {
	fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
		write!(f, "r1={} r2={} err={}", self.r1, self.r2, self.err)
	}
}
