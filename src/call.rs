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

//! Native call dispatch with a runtime selected arity.
//!
//! Every bound entry point is reached through [`call`], which takes the argument
//! list as a slice of [`RawValue`]s and picks the fixed arity invocation matching
//! its length. Callers that know the arity statically should prefer [`call_n`],
//! which can not overflow.
//!
//! Only integer and pointer arguments are supported; arguments the native ABI
//! passes in floating point registers need a separate call path.

use {
	crate::{raw::*, handle::{Handle, HandleKind}},
	std::{fmt, mem, num::NonZeroUsize, ffi::c_void}
};

/// The maximum number of arguments a native call may take.
pub const MAX_ARITY: usize = 18;

/// The address of a native entry point.
///
/// Only valid while the library image it was resolved from stays loaded.
#[repr(transparent)]
#[derive(Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub struct ProcAddr(NonZeroUsize);

impl ProcAddr {
	#[inline]
	pub const fn new(addr: usize) -> Option<Self> {
		match NonZeroUsize::new(addr) {
			Some(v) => Some(Self(v)),
			None    => None
		}
	}

	#[inline]
	pub fn from_ptr(ptr: *const c_void) -> Option<Self> {
		Self::new(ptr as usize)
	}

	#[inline]
	pub const fn as_usize(self) -> usize {
		self.0.get()
	}

	#[inline]
	pub fn as_ptr(self) -> *const c_void {
		self.0.get() as *const c_void
	}
}

impl fmt::Debug for ProcAddr {
	fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
		write!(f, "ProcAddr({:#x})", self.0.get())
	}
}

impl fmt::Display for ProcAddr {
	fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
		write!(f, "{:#x}", self.0.get())
	}
}

impl From<ProcAddr> for RawValue {
	#[inline]
	fn from(v: ProcAddr) -> Self {
		Self(v.as_usize())
	}
}

/// The fixed width invocation families.
///
/// A call with `n` arguments goes through the smallest family with a width of at
/// least `n`; the unused trailing slots of its frame are zero.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub enum Primitive {
	Call3,
	Call6,
	Call9,
	Call12,
	Call15,
	Call18
}

impl Primitive {
	pub const fn for_arity(arity: usize) -> Option<Self> {
		Some(match arity {
			0..=3   => Self::Call3,
			4..=6   => Self::Call6,
			7..=9   => Self::Call9,
			10..=12 => Self::Call12,
			13..=15 => Self::Call15,
			16..=18 => Self::Call18,
			_       => return None
		})
	}

	pub const fn width(self) -> usize {
		match self {
			Self::Call3  => 3,
			Self::Call6  => 6,
			Self::Call9  => 9,
			Self::Call12 => 12,
			Self::Call15 => 15,
			Self::Call18 => 18
		}
	}
}

/// Arguments packed into the frame of a [`Primitive`].
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct CallFrame {
	primitive: Primitive,
	arity:     usize,
	words:     [RawValue; MAX_ARITY]
}

impl CallFrame {
	/// Packs `args` into a zero padded frame.
	///
	/// # Panics
	///
	/// If `args` is longer than [`MAX_ARITY`]. The arguments are never truncated.
	#[track_caller]
	pub fn new(args: &[RawValue]) -> Self {
		let primitive = match Primitive::for_arity(args.len()) {
			Some(v) => v,
			None    => arity_overflow(args.len())
		};

		let mut words = [RawValue::ZERO; MAX_ARITY];
		words[..args.len()].copy_from_slice(args);
		Self { primitive, arity: args.len(), words }
	}

	#[inline]
	pub fn primitive(&self) -> Primitive {
		self.primitive
	}

	#[inline]
	pub fn arity(&self) -> usize {
		self.arity
	}

	/// The real arguments.
	#[inline]
	pub fn args(&self) -> &[RawValue] {
		&self.words[..self.arity]
	}

	/// The real arguments followed by the zero padding of the primitive.
	#[inline]
	pub fn padded(&self) -> &[RawValue] {
		&self.words[..self.primitive.width()]
	}

	/// # Safety
	///
	/// `addr` must be a live entry point following the C calling convention,
	/// taking exactly [`Self::arity`] integer or pointer sized arguments.
	pub unsafe fn call(&self, addr: ProcAddr) -> CallResult {
		errno::clear();
		let r1 = invoke_exact(addr, self.arity, &self.words);
		let err = errno::last();
		CallResult { r1: RawValue(r1), r2: RawValue::ZERO, err }
	}

	/// Like [`Self::call`], but reads both return registers.
	///
	/// # Safety
	///
	/// Same as [`Self::call`]; the callee must additionally return a two word
	/// aggregate (`struct { uintptr_t a, b; }`).
	#[cfg(any(all(target_arch = "x86_64", not(target_os = "windows")), target_arch = "aarch64"))]
	pub unsafe fn call_wide(&self, addr: ProcAddr) -> CallResult {
		errno::clear();
		let WordPair { r1, r2 } = invoke_exact_wide(addr, self.arity, &self.words);
		let err = errno::last();
		CallResult { r1: RawValue(r1), r2: RawValue(r2), err }
	}
}

/// Calls `addr` with `args`, selecting the invocation by `args.len()`.
///
/// The arguments are passed through unchanged, in order. The callee's return
/// value is returned verbatim in [`CallResult::r1`].
///
/// # Panics
///
/// If `args` is longer than [`MAX_ARITY`]. There is no way to synthesize a call
/// with more arguments at runtime, so this is not a recoverable condition.
///
/// # Safety
///
/// `addr` must be a live entry point following the C calling convention and
/// taking exactly `args.len()` integer or pointer sized arguments. Any pointer
/// passed in `args` must be valid for the accesses the callee performs.
#[track_caller]
pub unsafe fn call(addr: ProcAddr, args: &[RawValue]) -> CallResult {
	CallFrame::new(args).call(addr)
}

/// Like [`call`], but also returns the secondary return register in [`CallResult::r2`].
///
/// # Safety
///
/// See [`CallFrame::call_wide`].
#[cfg(any(all(target_arch = "x86_64", not(target_os = "windows")), target_arch = "aarch64"))]
#[track_caller]
pub unsafe fn call_wide(addr: ProcAddr, args: &[RawValue]) -> CallResult {
	CallFrame::new(args).call_wide(addr)
}

/// Calls `addr` with a statically known number of arguments.
///
/// Only implemented for `N <= MAX_ARITY`, so this path can not overflow.
///
/// # Safety
///
/// See [`call`].
pub unsafe fn call_n<const N: usize>(addr: ProcAddr, args: [RawValue; N]) -> CallResult where [RawValue; N]: Arguments {
	errno::clear();
	let r1 = args.invoke(addr);
	let err = errno::last();
	CallResult { r1: RawValue(r1), r2: RawValue::ZERO, err }
}

mod sealed {
	pub trait Sealed {}
}

/// Argument arrays with a supported arity.
pub trait Arguments: sealed::Sealed {
	const ARITY: usize;

	/// # Safety
	///
	/// See [`call`].
	unsafe fn invoke(self, addr: ProcAddr) -> usize;
}

#[cfg(any(all(target_arch = "x86_64", not(target_os = "windows")), target_arch = "aarch64"))]
#[repr(C)]
#[derive(Copy, Clone)]
struct WordPair {
	r1: usize,
	r2: usize
}

#[cold]
#[track_caller]
fn arity_overflow(arity: usize) -> ! {
	log::error!("native call arity {} exceeds the supported maximum of {}", arity, MAX_ARITY);
	panic!("native call arity {} exceeds the supported maximum of {}", arity, MAX_ARITY)
}

macro_rules! word {
	( $i:tt ) => { usize };
}

macro_rules! arities {
	( $( $n:literal => [ $( $i:literal ),* ] ),* $(,)? ) => {
		#[track_caller]
		unsafe fn invoke_exact(addr: ProcAddr, arity: usize, words: &[RawValue; MAX_ARITY]) -> usize {
			match arity {
				$( $n => {
					let f = mem::transmute::<usize, extern "C" fn($( word!($i) ),*) -> usize>(addr.as_usize());
					f($( words[$i].0 ),*)
				} )*
				_ => arity_overflow(arity)
			}
		}

		#[cfg(any(all(target_arch = "x86_64", not(target_os = "windows")), target_arch = "aarch64"))]
		#[track_caller]
		unsafe fn invoke_exact_wide(addr: ProcAddr, arity: usize, words: &[RawValue; MAX_ARITY]) -> WordPair {
			match arity {
				$( $n => {
					let f = mem::transmute::<usize, extern "C" fn($( word!($i) ),*) -> WordPair>(addr.as_usize());
					f($( words[$i].0 ),*)
				} )*
				_ => arity_overflow(arity)
			}
		}

		$(
			impl sealed::Sealed for [RawValue; $n] {}

			impl Arguments for [RawValue; $n] {
				const ARITY: usize = $n;

				#[inline]
				#[allow(unused_variables)]
				unsafe fn invoke(self, addr: ProcAddr) -> usize {
					let f = mem::transmute::<usize, extern "C" fn($( word!($i) ),*) -> usize>(addr.as_usize());
					f($( self[$i].0 ),*)
				}
			}
		)*
	};
}

arities! {
	0  => [],
	1  => [0],
	2  => [0, 1],
	3  => [0, 1, 2],
	4  => [0, 1, 2, 3],
	5  => [0, 1, 2, 3, 4],
	6  => [0, 1, 2, 3, 4, 5],
	7  => [0, 1, 2, 3, 4, 5, 6],
	8  => [0, 1, 2, 3, 4, 5, 6, 7],
	9  => [0, 1, 2, 3, 4, 5, 6, 7, 8],
	10 => [0, 1, 2, 3, 4, 5, 6, 7, 8, 9],
	11 => [0, 1, 2, 3, 4, 5, 6, 7, 8, 9, 10],
	12 => [0, 1, 2, 3, 4, 5, 6, 7, 8, 9, 10, 11],
	13 => [0, 1, 2, 3, 4, 5, 6, 7, 8, 9, 10, 11, 12],
	14 => [0, 1, 2, 3, 4, 5, 6, 7, 8, 9, 10, 11, 12, 13],
	15 => [0, 1, 2, 3, 4, 5, 6, 7, 8, 9, 10, 11, 12, 13, 14],
	16 => [0, 1, 2, 3, 4, 5, 6, 7, 8, 9, 10, 11, 12, 13, 14, 15],
	17 => [0, 1, 2, 3, 4, 5, 6, 7, 8, 9, 10, 11, 12, 13, 14, 15, 16],
	18 => [0, 1, 2, 3, 4, 5, 6, 7, 8, 9, 10, 11, 12, 13, 14, 15, 16, 17],
}

/// Access to the thread's OS error code around a native call.
mod errno {
	#[cfg(target_os = "linux")]
	pub fn clear() {
		unsafe { *libc::__errno_location() = 0 }
	}

	#[cfg(target_os = "android")]
	pub fn clear() {
		unsafe { *libc::__errno() = 0 }
	}

	#[cfg(any(target_os = "macos", target_os = "ios", target_os = "freebsd"))]
	pub fn clear() {
		unsafe { *libc::__error() = 0 }
	}

	// no portable way to reset it, the value after the call may be stale
	#[cfg(not(any(target_os = "linux", target_os = "android", target_os = "macos", target_os = "ios", target_os = "freebsd")))]
	pub fn clear() {}

	#[inline]
	pub fn last() -> i32 {
		std::io::Error::last_os_error().raw_os_error().unwrap_or(0)
	}
}

/// An ordered argument list for a native call.
///
/// Values are appended in the callee's parameter order and passed through unchanged.
#[derive(Clone, Default, Eq, PartialEq)]
pub struct ArgList {
	args: Vec<RawValue>
}

impl ArgList {
	pub fn new() -> Self {
		Self { args: Vec::with_capacity(MAX_ARITY) }
	}

	pub fn push(mut self, v: impl Into<RawValue>) -> Self {
		self.args.push(v.into());
		self
	}

	pub fn ptr<T>(self, v: *const T) -> Self {
		self.push(v)
	}

	pub fn ptr_mut<T>(self, v: *mut T) -> Self {
		self.push(v)
	}

	pub fn u32(self, v: u32) -> Self {
		self.push(v)
	}

	pub fn i32(self, v: i32) -> Self {
		self.push(v)
	}

	/// Appends a 64 bit value, taking two words on 32 bit targets (low word first).
	pub fn u64(mut self, v: u64) -> Self {
		#[cfg(target_pointer_width = "64")]
		self.args.push(RawValue(v as usize));
		#[cfg(not(target_pointer_width = "64"))]
		self.args.extend_from_slice(&[RawValue(v as u32 as usize), RawValue((v >> 32) as u32 as usize)]);
		self
	}

	/// Appends a handle the way the native side expects it: dispatchable handles
	/// are a single pointer sized word, non-dispatchable handles always 64 bits.
	pub fn handle<H: Handle>(self, h: H) -> Self {
		match H::KIND {
			HandleKind::Dispatchable    => self.push(RawValue(h.as_raw() as usize)),
			HandleKind::NonDispatchable => self.u64(h.as_raw())
		}
	}

	pub fn extend(mut self, v: &[RawValue]) -> Self {
		self.args.extend_from_slice(v);
		self
	}

	pub fn len(&self) -> usize {
		self.args.len()
	}

	pub fn is_empty(&self) -> bool {
		self.args.is_empty()
	}

	pub fn as_slice(&self) -> &[RawValue] {
		&self.args
	}

	/// # Safety
	///
	/// See [`call`].
	#[track_caller]
	pub unsafe fn call(&self, addr: ProcAddr) -> CallResult {
		call(addr, &self.args)
	}
}

impl fmt::Debug for ArgList {
	fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
		f.debug_list().entries(&self.args).finish()
	}
}

impl From<&[RawValue]> for ArgList {
	fn from(v: &[RawValue]) -> Self {
		Self { args: v.to_vec() }
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	extern "C" fn add3(a: usize, b: usize, c: usize) -> usize {
		a + b * 10 + c * 100
	}

	extern "C" fn constant() -> usize {
		0xC0FFEE
	}

	fn addr(f: usize) -> ProcAddr {
		ProcAddr::new(f).expect("null fn pointer")
	}

	#[test]
	fn primitive_breakpoints() {
		assert_eq!(Primitive::for_arity(0), Some(Primitive::Call3));
		assert_eq!(Primitive::for_arity(3), Some(Primitive::Call3));
		assert_eq!(Primitive::for_arity(4), Some(Primitive::Call6));
		assert_eq!(Primitive::for_arity(12), Some(Primitive::Call12));
		assert_eq!(Primitive::for_arity(13), Some(Primitive::Call15));
		assert_eq!(Primitive::for_arity(18), Some(Primitive::Call18));
		assert_eq!(Primitive::for_arity(19), None);
	}

	#[test]
	fn frame_is_zero_padded() {
		let frame = CallFrame::new(&[RawValue(7); 4]);
		assert_eq!(frame.primitive(), Primitive::Call6);
		assert_eq!(frame.args(), &[RawValue(7); 4]);
		assert_eq!(frame.padded(), &[RawValue(7), RawValue(7), RawValue(7), RawValue(7), RawValue(0), RawValue(0)]);
	}

	#[test]
	fn runtime_and_static_arity_agree() {
		let args = [RawValue(1), RawValue(2), RawValue(3)];
		let a = unsafe { call(addr(add3 as usize), &args) };
		let b = unsafe { call_n(addr(add3 as usize), args) };
		assert_eq!(a.r1, RawValue(321));
		assert_eq!(a.r1, b.r1);
		assert_eq!(<[RawValue; 3] as Arguments>::ARITY, 3);
	}

	#[test]
	fn zero_arguments() {
		let r = unsafe { call(addr(constant as usize), &[]) };
		assert_eq!(r.r1, RawValue(0xC0FFEE));
		assert_eq!(r.r2, RawValue::ZERO);
	}

	#[test]
	#[should_panic(expected = "native call arity 19 exceeds the supported maximum of 18")]
	fn frame_rejects_overflow() {
		CallFrame::new(&[RawValue::ZERO; 19]);
	}

	#[test]
	fn arg_list_order() {
		let v = 5u32;
		let list = ArgList::new()
			.u32(1)
			.i32(-2)
			.ptr(&v);
		assert_eq!(list.len(), 3);
		assert_eq!(list.as_slice()[0], RawValue(1));
		assert_eq!(list.as_slice()[1].as_i32(), -2);
		assert_eq!(list.as_slice()[2].as_ptr::<u32>(), &v as *const u32);
	}

	#[cfg(target_pointer_width = "64")]
	#[test]
	fn u64_is_one_word() {
		let list = ArgList::new().u64(0x1122_3344_5566_7788);
		assert_eq!(list.as_slice(), &[RawValue(0x1122_3344_5566_7788)]);
	}
}
