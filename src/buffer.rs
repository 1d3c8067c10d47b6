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

//! Zero filled native memory for parameter blocks.

use std::{
	alloc::{self, Layout},
	fmt, mem, ptr::NonNull, slice,
	sync::{Arc, atomic::{AtomicUsize, Ordering}}
};

/// Alignment of every allocation, enough for any field of a parameter block.
pub const ALIGN: usize = 16;

/// Bytes reserved in front of every allocation to remember its size.
const PREFIX: usize = ALIGN;

const _: () = assert!(PREFIX >= mem::size_of::<usize>());

fn layout(size: usize) -> Layout {
	match size.max(1).checked_add(PREFIX).map(|size| Layout::from_size_align(size, ALIGN)) {
		Some(Ok(layout)) => layout,
		_ => panic!("native buffer of {} bytes is too large", size)
	}
}

/// Allocates `size` zero filled bytes, aligned to [`ALIGN`].
///
/// The returned address is never null, a request for zero bytes allocates one.
/// It must be passed to [`release`] exactly once.
pub fn allocate(size: usize) -> NonNull<u8> {
	let layout = layout(size);
	unsafe {
		let base = match NonNull::new(alloc::alloc_zeroed(layout)) {
			Some(v) => v,
			None    => alloc::handle_alloc_error(layout)
		};
		base.as_ptr().cast::<usize>().write(size.max(1));
		NonNull::new_unchecked(base.as_ptr().add(PREFIX))
	}
}

/// Frees memory returned by [`allocate`].
///
/// # Safety
///
/// `ptr` must have been returned by [`allocate`] and not been released before.
pub unsafe fn release(ptr: NonNull<u8>) {
	let base = ptr.as_ptr().sub(PREFIX);
	let size = base.cast::<usize>().read();
	alloc::dealloc(base, layout(size));
}

/// Counts outstanding native allocations, for leak checks during development.
///
/// Passed explicitly to the buffers and arenas it should observe.
#[derive(Debug, Default)]
pub struct AllocTracker {
	outstanding: AtomicUsize,
	bytes:       AtomicUsize
}

impl AllocTracker {
	pub fn new() -> Arc<Self> {
		Arc::new(Self::default())
	}

	pub fn outstanding(&self) -> usize {
		self.outstanding.load(Ordering::Acquire)
	}

	pub fn bytes(&self) -> usize {
		self.bytes.load(Ordering::Acquire)
	}

	pub fn is_clean(&self) -> bool {
		self.outstanding() == 0
	}

	fn on_allocate(&self, len: usize) {
		self.outstanding.fetch_add(1, Ordering::AcqRel);
		self.bytes.fetch_add(len, Ordering::AcqRel);
	}

	fn on_release(&self, len: usize) {
		self.outstanding.fetch_sub(1, Ordering::AcqRel);
		self.bytes.fetch_sub(len, Ordering::AcqRel);
	}
}

/// An owned, zero filled block of native memory with a stable address.
///
/// Released by [`NativeBuffer::release`] or when dropped. Not shared between
/// owners; whoever holds the buffer is its only writer.
pub struct NativeBuffer {
	ptr:     NonNull<u8>,
	len:     usize,
	tracker: Option<Arc<AllocTracker>>
}

unsafe impl Send for NativeBuffer {}

impl NativeBuffer {
	pub fn allocate(size: usize) -> Self {
		Self { ptr: allocate(size), len: size.max(1), tracker: None }
	}

	pub fn allocate_tracked(size: usize, tracker: &Arc<AllocTracker>) -> Self {
		let buf = Self { ptr: allocate(size), len: size.max(1), tracker: Some(tracker.clone()) };
		tracker.on_allocate(buf.len);
		buf
	}

	/// Allocates a buffer sized for one `T`.
	pub fn for_type<T>() -> Self {
		Self::allocate(mem::size_of::<T>())
	}

	pub fn release(self) {
		drop(self)
	}

	/// Gives up ownership of the memory, e.g. to hand it to native code that frees it
	/// through [`release`] or [`NativeBuffer::from_raw`].
	///
	/// A tracker, if any, counts the buffer as released.
	pub fn into_raw(self) -> NonNull<u8> {
		if let Some(tracker) = &self.tracker {
			tracker.on_release(self.len);
		}

		let ptr = self.ptr;
		mem::forget(self);
		ptr
	}

	/// Takes back ownership of memory returned by [`NativeBuffer::into_raw`] or [`allocate`].
	///
	/// # Safety
	///
	/// `ptr` must come from [`allocate`] and must not be released by anyone else.
	pub unsafe fn from_raw(ptr: NonNull<u8>) -> Self {
		let len = ptr.as_ptr().sub(PREFIX).cast::<usize>().read();
		Self { ptr, len, tracker: None }
	}

	/// The size of the buffer, at least one byte.
	#[inline]
	pub fn len(&self) -> usize {
		self.len
	}

	#[inline]
	pub fn is_empty(&self) -> bool {
		false
	}

	#[inline]
	pub fn as_ptr(&self) -> *const u8 {
		self.ptr.as_ptr()
	}

	#[inline]
	pub fn as_mut_ptr(&mut self) -> *mut u8 {
		self.ptr.as_ptr()
	}

	#[inline]
	pub fn as_slice(&self) -> &[u8] {
		unsafe { slice::from_raw_parts(self.ptr.as_ptr(), self.len) }
	}

	#[inline]
	pub fn as_mut_slice(&mut self) -> &mut [u8] {
		unsafe { slice::from_raw_parts_mut(self.ptr.as_ptr(), self.len) }
	}

	/// Views the start of the buffer as a `T`.
	///
	/// # Panics
	///
	/// If `T` does not fit or needs a larger alignment than [`ALIGN`].
	pub fn cast<T>(&mut self) -> *mut T {
		assert!(mem::size_of::<T>() <= self.len, "`{}` does not fit into {} bytes", std::any::type_name::<T>(), self.len);
		assert!(mem::align_of::<T>() <= ALIGN, "`{}` is over-aligned", std::any::type_name::<T>());
		self.ptr.as_ptr().cast()
	}
}

impl Drop for NativeBuffer {
	fn drop(&mut self) {
		if let Some(tracker) = &self.tracker {
			tracker.on_release(self.len);
		}

		unsafe { release(self.ptr) }
	}
}

impl fmt::Debug for NativeBuffer {
	fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
		f.debug_struct("NativeBuffer")
			.field("ptr", &self.ptr)
			.field("len", &self.len)
			.finish()
	}
}
