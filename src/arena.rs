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

//! A bump allocator for the parameter blocks of a single native call.
//!
//! Everything allocated from an [`Arena`] stays at the same address until the
//! arena is dropped, which releases all of it at once.

use {
	crate::buffer::{NativeBuffer, AllocTracker},
	std::{alloc::Layout, cell::{Cell, RefCell}, ffi::c_char, fmt, mem, ptr::{self, NonNull}, slice, sync::Arc}
};

const CHUNK_SIZE: usize = 4096;

#[derive(Default)]
pub struct Arena {
	chunks:    RefCell<Vec<NativeBuffer>>,
	/// offset into the last chunk
	cursor:    Cell<usize>,
	allocated: Cell<usize>,
	tracker:   Option<Arc<AllocTracker>>
}

impl Arena {
	pub fn new() -> Self {
		Self::default()
	}

	pub fn tracked(tracker: &Arc<AllocTracker>) -> Self {
		Self { tracker: Some(tracker.clone()), ..Self::default() }
	}

	/// Bytes handed out so far, without alignment padding.
	pub fn allocated(&self) -> usize {
		self.allocated.get()
	}

	/// Returns zero filled memory for `layout`.
	pub fn alloc_zeroed(&self, layout: Layout) -> NonNull<u8> {
		let mut chunks = self.chunks.borrow_mut();
		self.allocated.set(self.allocated.get() + layout.size());

		if let Some(chunk) = chunks.last() {
			let base  = chunk.as_ptr() as usize;
			let start = align_up(base + self.cursor.get(), layout.align());
			if start + layout.size() <= base + chunk.len() {
				self.cursor.set(start + layout.size() - base);
				return unsafe { NonNull::new_unchecked(start as *mut u8) };
			}
		}

		// chunks are never reused, so fresh memory is still zero
		let size  = CHUNK_SIZE.max(layout.size() + layout.align());
		let chunk = match &self.tracker {
			Some(tracker) => NativeBuffer::allocate_tracked(size, tracker),
			None          => NativeBuffer::allocate(size)
		};
		log::debug!("arena grew by {} bytes ({} chunks)", size, chunks.len() + 1);

		let base  = chunk.as_ptr() as usize;
		let start = align_up(base, layout.align());
		self.cursor.set(start + layout.size() - base);
		chunks.push(chunk);
		unsafe { NonNull::new_unchecked(start as *mut u8) }
	}

	pub fn alloc<T: Copy>(&self, v: T) -> &mut T {
		let ptr = self.alloc_zeroed(Layout::new::<T>()).cast::<T>();
		unsafe {
			ptr.as_ptr().write(v);
			&mut *ptr.as_ptr()
		}
	}

	pub fn alloc_slice<T: Copy>(&self, v: &[T]) -> &mut [T] {
		let layout = match Layout::array::<T>(v.len()) {
			Ok(v)  => v,
			Err(_) => panic!("slice of {} `{}` is too large", v.len(), std::any::type_name::<T>())
		};

		let ptr = self.alloc_zeroed(layout).cast::<T>();
		unsafe {
			ptr::copy_nonoverlapping(v.as_ptr(), ptr.as_ptr(), v.len());
			slice::from_raw_parts_mut(ptr.as_ptr(), v.len())
		}
	}

	/// Copies `s` into the arena as a nul terminated string.
	///
	/// An interior nul byte ends the string early on the native side.
	pub fn alloc_cstr(&self, s: &str) -> *const c_char {
		let ptr = self.alloc_zeroed(Layout::from_size_align(s.len() + 1, mem::align_of::<c_char>())
			.unwrap_or_else(|_| panic!("string of {} bytes is too large", s.len())));
		unsafe {
			ptr::copy_nonoverlapping(s.as_ptr(), ptr.as_ptr(), s.len());
		}
		ptr.as_ptr().cast()
	}
}

impl fmt::Debug for Arena {
	fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
		f.debug_struct("Arena")
			.field("chunks", &self.chunks.borrow().len())
			.field("allocated", &self.allocated.get())
			.finish()
	}
}

#[inline]
fn align_up(addr: usize, align: usize) -> usize {
	(addr + align - 1) & !(align - 1)
}
