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

//! Opaque native object handles.
//!
//! Dispatchable handles are pointer sized and identify objects that own a table
//! of entry points, which take the handle as their first argument. Non-dispatchable
//! handles are 64 bit tokens on every target. For both kinds, zero is the "no
//! handle" sentinel and equality is the only operation defined on them.
//!
//! Handles are created and destroyed by explicit native calls only. Using a
//! handle after its object has been destroyed is a caller error, it is not
//! distinguished from any other invalid handle.

use {
	crate::{raw::{RawValue, CallResult}, call::{ArgList, ProcAddr}, loader::ProcTable, error::*},
	std::{fmt, ops, sync::Arc}
};

#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash)]
pub enum HandleKind {
	Dispatchable,
	NonDispatchable
}

pub trait Handle: Copy + Eq + fmt::Debug {
	const KIND:      HandleKind;
	const TYPE_NAME: &'static str;

	fn from_raw(raw: u64) -> Self;

	fn as_raw(self) -> u64;

	#[inline]
	fn null() -> Self {
		Self::from_raw(0)
	}

	#[inline]
	fn is_null(self) -> bool {
		self.as_raw() == 0
	}
}

/// Defines pointer sized handle types.
#[macro_export]
macro_rules! dispatchable_handle {
	( $( $(#[$meta:meta])* $name:ident ),* $(,)? ) => { $(
		$(#[$meta])*
		#[repr(transparent)]
		#[derive(Copy, Clone, Default, Eq, PartialEq, Hash)]
		pub struct $name(pub usize);

		impl $crate::handle::Handle for $name {
			const KIND:      $crate::handle::HandleKind = $crate::handle::HandleKind::Dispatchable;
			const TYPE_NAME: &'static str               = stringify!($name);

			#[inline]
			fn from_raw(raw: u64) -> Self {
				Self(raw as usize)
			}

			#[inline]
			fn as_raw(self) -> u64 {
				self.0 as u64
			}
		}

		impl ::std::fmt::Debug for $name {
			fn fmt(&self, f: &mut ::std::fmt::Formatter) -> ::std::fmt::Result {
				write!(f, "{}({:#x})", stringify!($name), self.0)
			}
		}

		impl ::std::fmt::Display for $name {
			fn fmt(&self, f: &mut ::std::fmt::Formatter) -> ::std::fmt::Result {
				write!(f, "{:#x}", self.0)
			}
		}

		impl From<$name> for $crate::raw::RawValue {
			#[inline]
			fn from(v: $name) -> Self {
				Self(v.0)
			}
		}
	)* };
}

/// Defines 64 bit handle types.
///
/// These only convert into a single [`RawValue`](crate::raw::RawValue) on 64 bit
/// targets; use [`ArgList::handle`](crate::call::ArgList::handle) to pass them portably.
#[macro_export]
macro_rules! non_dispatchable_handle {
	( $( $(#[$meta:meta])* $name:ident ),* $(,)? ) => { $(
		$(#[$meta])*
		#[repr(transparent)]
		#[derive(Copy, Clone, Default, Eq, PartialEq, Hash)]
		pub struct $name(pub u64);

		impl $crate::handle::Handle for $name {
			const KIND:      $crate::handle::HandleKind = $crate::handle::HandleKind::NonDispatchable;
			const TYPE_NAME: &'static str               = stringify!($name);

			#[inline]
			fn from_raw(raw: u64) -> Self {
				Self(raw)
			}

			#[inline]
			fn as_raw(self) -> u64 {
				self.0
			}
		}

		impl ::std::fmt::Debug for $name {
			fn fmt(&self, f: &mut ::std::fmt::Formatter) -> ::std::fmt::Result {
				write!(f, "{}({:#x})", stringify!($name), self.0)
			}
		}

		impl ::std::fmt::Display for $name {
			fn fmt(&self, f: &mut ::std::fmt::Formatter) -> ::std::fmt::Result {
				write!(f, "{:#x}", self.0)
			}
		}

		#[cfg(target_pointer_width = "64")]
		impl From<$name> for $crate::raw::RawValue {
			#[inline]
			fn from(v: $name) -> Self {
				Self(v.0 as usize)
			}
		}
	)* };
}

/// A dispatchable handle together with the entry points resolved for it.
#[derive(Clone, Debug)]
pub struct Dispatch<H: Handle> {
	pub handle: H,
	pub table:  Arc<ProcTable>
}

impl<H: Handle> Dispatch<H> {
	pub fn new(handle: H, table: Arc<ProcTable>) -> Self {
		debug_assert_eq!(H::KIND, HandleKind::Dispatchable, "`{}` is not dispatchable", H::TYPE_NAME);
		Self { handle, table }
	}

	/// Wraps a child object, which shares the entry points of its parent.
	pub fn child<C: Handle>(&self, handle: C) -> Dispatch<C> {
		Dispatch::new(handle, self.table.clone())
	}

	pub fn proc(&self, name: &str) -> Option<ProcAddr> {
		self.table.get(name)
	}

	/// Calls the entry point `name` with the handle as first argument, followed by `args`.
	///
	/// # Safety
	///
	/// The entry point must take the handle followed by exactly `args.len()` integer
	/// or pointer sized arguments, see [`call`](crate::call::call).
	pub unsafe fn call(&self, name: &str, args: &[RawValue]) -> Result<CallResult> {
		let addr = self.table.require(name)?;
		Ok(ArgList::new()
			.handle(self.handle)
			.extend(args)
			.call(addr))
	}
}

impl<H: Handle> ops::Deref for Dispatch<H> {
	type Target = H;

	#[inline]
	fn deref(&self) -> &H { &self.handle }
}

impl<H: Handle + fmt::Display> fmt::Display for Dispatch<H> {
	fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
		fmt::Display::fmt(&self.handle, f)
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	crate::dispatchable_handle!(TestInstance);
	crate::non_dispatchable_handle!(TestBuffer);

	#[test]
	fn equality_and_null() {
		let a = TestBuffer::from_raw(0xdead_beef_0000_0001);
		let b = TestBuffer::from_raw(0xdead_beef_0000_0001);
		assert_eq!(a, b);
		assert_ne!(a, TestBuffer::null());
		assert!(TestBuffer::null().is_null());
		assert_eq!(TestBuffer::default(), TestBuffer::null());
		assert!(!a.is_null());
	}

	#[test]
	fn formatting() {
		let h = TestInstance(0x1000);
		assert_eq!(format!("{:?}", h), "TestInstance(0x1000)");
		assert_eq!(h.to_string(), "0x1000");
		assert_eq!(TestInstance::TYPE_NAME, "TestInstance");
	}

	#[test]
	fn kinds_cross_the_boundary_differently() {
		let args = ArgList::new()
			.handle(TestInstance(0x10))
			.handle(TestBuffer(0x20));
		assert_eq!(args.as_slice()[0], RawValue(0x10));
		#[cfg(target_pointer_width = "64")]
		assert_eq!(args.len(), 2);
		#[cfg(target_pointer_width = "32")]
		assert_eq!(args.len(), 3);
	}

	extern "C" fn object_size(handle: usize, scale: usize) -> usize {
		handle * scale
	}

	#[test]
	fn dispatch_passes_handle_first() {
		let mut table = ProcTable::new("TestInstance");
		table.insert("testObjectSize", ProcAddr::new(object_size as usize).expect("null fn pointer"));
		let instance = Dispatch::new(TestInstance(6), Arc::new(table));

		let r = unsafe { instance.call("testObjectSize", &[RawValue(7)]) }.expect("entry point not found");
		assert_eq!(r.r1, RawValue(42));
		assert!(unsafe { instance.call("testMissing", &[]) }.is_err());
		assert_eq!(*instance, TestInstance(6));
		assert_eq!(instance.to_string(), "0x6");
	}
}
