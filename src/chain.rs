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

//! Extension chains of tagged parameter blocks.
//!
//! Every extensible parameter block starts with a [`ChainHeader`]: a `kind` that
//! identifies the block's layout and a `next` pointer to another block. The native
//! side walks the chain and may ignore blocks whose kind it does not know, which
//! lets a fixed base block be extended without changing any function signature.
//!
//! The chain is raw data at the boundary. A `kind` that does not match the layout
//! behind it, a node that is freed or moved while a call uses the chain, or a
//! cycle are all caller errors this module can not detect; a cyclic chain makes
//! every traversal, including [`ChainIter`], loop forever.
//!
//! [`ChainBuilder`] is the safe way to assemble a chain: blocks are collected as
//! values and only flattened into linked native memory, owned by an [`Arena`],
//! right before the call.

use {
	crate::{arena::Arena, raw::RawValue},
	std::{alloc::Layout, fmt, marker::PhantomData, mem, ptr::{self, NonNull}, rc::Rc}
};

/// The discriminant identifying the layout of a parameter block.
#[repr(transparent)]
#[derive(Copy, Clone, Default, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub struct StructureKind(pub i32);

impl fmt::Debug for StructureKind {
	fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
		write!(f, "StructureKind({})", self.0)
	}
}

impl fmt::Display for StructureKind {
	fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
		write!(f, "{}", self.0)
	}
}

/// The common head of every extensible parameter block.
#[repr(C)]
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct ChainHeader {
	pub kind: StructureKind,
	pub next: *mut ChainHeader
}

unsafe impl Send for ChainHeader {}
unsafe impl Sync for ChainHeader {}

impl ChainHeader {
	pub const fn new(kind: StructureKind) -> Self {
		Self { kind, next: ptr::null_mut() }
	}
}

impl Default for ChainHeader {
	fn default() -> Self {
		Self::new(StructureKind::default())
	}
}

/// A `#[repr(C)]` parameter block whose first field is a [`ChainHeader`].
///
/// # Safety
///
/// The implementing type must be `#[repr(C)]` with a `ChainHeader` as first field,
/// and [`Self::KIND`] must be the discriminant of exactly this layout.
pub unsafe trait Chained: Sized {
	const KIND: StructureKind;

	#[inline]
	fn header(&self) -> &ChainHeader {
		unsafe { &*(self as *const Self as *const ChainHeader) }
	}

	#[inline]
	fn header_mut(&mut self) -> &mut ChainHeader {
		unsafe { &mut *(self as *mut Self as *mut ChainHeader) }
	}
}

/// Defines parameter blocks implementing [`Chained`].
///
/// The header field is called `header`; `Default` zero fills the block and sets
/// its kind, so every other field must be valid when all bits are zero.
///
/// ```ignore
/// chained_block! {
/// 	pub struct DeviceCreateInfo {
/// 		pub flags: u32,
/// 		pub queue_count: u32
/// 	} = 3;
/// }
/// ```
#[macro_export]
macro_rules! chained_block {
	( $(
		$(#[$meta:meta])*
		$vis:vis struct $name:ident {
			$( $(#[$fmeta:meta])* $fvis:vis $field:ident : $ty:ty ),* $(,)?
		} = $kind:expr;
	)* ) => { $(
		$(#[$meta])*
		#[repr(C)]
		#[derive(Copy, Clone)]
		$vis struct $name {
			pub header: $crate::chain::ChainHeader,
			$( $(#[$fmeta])* $fvis $field: $ty ),*
		}

		unsafe impl $crate::chain::Chained for $name {
			const KIND: $crate::chain::StructureKind = $crate::chain::StructureKind($kind);
		}

		unsafe impl Send for $name {}
		unsafe impl Sync for $name {}

		impl Default for $name {
			fn default() -> Self {
				let mut v: Self = unsafe { ::std::mem::MaybeUninit::zeroed().assume_init() };
				v.header.kind = <Self as $crate::chain::Chained>::KIND;
				v
			}
		}

		impl ::std::fmt::Debug for $name {
			fn fmt(&self, f: &mut ::std::fmt::Formatter) -> ::std::fmt::Result {
				f.debug_struct(stringify!($name))
					.field("kind", &self.header.kind)
					.field("next", &self.header.next)
					.finish()
			}
		}
	)* };
}

/// Appends `ext`, and whatever is already chained to it, to the end of `base`'s chain.
///
/// # Safety
///
/// Every block reachable from `base` must be alive, and `ext` must stay alive and
/// unmoved for as long as the chain is used.
pub unsafe fn push_next<B: Chained, E: Chained>(base: &mut B, ext: &mut E) {
	let mut cur: *mut ChainHeader = base.header_mut();
	while !(*cur).next.is_null() {
		cur = (*cur).next;
	}
	(*cur).next = ext.header_mut();
}

/// Iterates over the chain starting at `root`, `root` included.
///
/// # Safety
///
/// Every block reachable from `root` must be alive for `'a`. A cyclic chain
/// yields blocks forever.
pub unsafe fn iter_chain<'a>(root: *const ChainHeader) -> ChainIter<'a> {
	ChainIter { cur: root, _marker: PhantomData }
}

pub struct ChainIter<'a> {
	cur:     *const ChainHeader,
	_marker: PhantomData<&'a ChainHeader>
}

impl<'a> Iterator for ChainIter<'a> {
	type Item = ChainView<'a>;

	fn next(&mut self) -> Option<Self::Item> {
		let ptr = NonNull::new(self.cur as *mut ChainHeader)?;
		self.cur = unsafe { (*ptr.as_ptr()).next };
		Some(ChainView { ptr, _marker: PhantomData })
	}
}

impl fmt::Debug for ChainIter<'_> {
	fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
		f.debug_struct("ChainIter").field("cur", &self.cur).finish()
	}
}

/// One block of a chain.
#[derive(Copy, Clone)]
pub struct ChainView<'a> {
	ptr:     NonNull<ChainHeader>,
	_marker: PhantomData<&'a ChainHeader>
}

impl<'a> ChainView<'a> {
	#[inline]
	pub fn kind(&self) -> StructureKind {
		unsafe { self.ptr.as_ref().kind }
	}

	#[inline]
	pub fn as_ptr(&self) -> *const ChainHeader {
		self.ptr.as_ptr()
	}

	/// Returns the block as `T` if its kind is `T::KIND`.
	pub fn downcast<T: Chained>(&self) -> Option<&'a T> {
		(self.kind() == T::KIND).then(|| unsafe { &*(self.ptr.as_ptr() as *const T) })
	}
}

impl fmt::Debug for ChainView<'_> {
	fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
		f.debug_struct("ChainView")
			.field("kind", &self.kind())
			.field("ptr", &self.ptr)
			.finish()
	}
}

/// A parameter block waiting to be placed into a chain.
#[derive(Clone)]
pub enum Block {
	/// A block of a type known to this binding.
	Known {
		kind:   StructureKind,
		layout: Layout,
		write:  Rc<dyn Fn(*mut u8)>
	},
	/// A block of a kind this binding does not know; `body` is everything after the header.
	Opaque {
		kind: StructureKind,
		body: Vec<u8>
	}
}

impl Block {
	pub fn new<T: Chained + Copy + 'static>(v: T) -> Self {
		Self::Known {
			kind:   T::KIND,
			layout: Layout::new::<T>(),
			write:  Rc::new(move |dst: *mut u8| unsafe { dst.cast::<T>().write(v) })
		}
	}

	pub fn opaque(kind: StructureKind, body: impl Into<Vec<u8>>) -> Self {
		Self::Opaque { kind, body: body.into() }
	}

	pub fn kind(&self) -> StructureKind {
		match self {
			Self::Known { kind, .. } | Self::Opaque { kind, .. } => *kind
		}
	}

	fn layout(&self) -> Layout {
		match self {
			Self::Known { layout, .. } => *layout,
			Self::Opaque { body, .. } => Layout::from_size_align(
				mem::size_of::<ChainHeader>() + body.len(),
				mem::align_of::<ChainHeader>()
			).unwrap_or_else(|_| panic!("opaque block of {} bytes is too large", body.len()))
		}
	}

	/// Writes the block into `dst`, which is zeroed and sized by `self.layout()`.
	unsafe fn write_to(&self, dst: *mut u8) {
		match self {
			Self::Known { write, .. } => (**write)(dst),
			Self::Opaque { body, .. } => ptr::copy_nonoverlapping(
				body.as_ptr(), dst.add(mem::size_of::<ChainHeader>()), body.len())
		}

		let header = dst.cast::<ChainHeader>();
		(*header).kind = self.kind();
		(*header).next = ptr::null_mut();
	}
}

impl fmt::Debug for Block {
	fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
		match self {
			Self::Known { kind, layout, .. } => f.debug_struct("Known")
				.field("kind", kind)
				.field("size", &layout.size())
				.finish(),
			Self::Opaque { kind, body } => f.debug_struct("Opaque")
				.field("kind", kind)
				.field("size", &body.len())
				.finish()
		}
	}
}

/// Collects blocks in insertion order and links them into native memory.
#[derive(Clone, Debug, Default)]
pub struct ChainBuilder {
	blocks: Vec<Block>
}

impl ChainBuilder {
	pub fn new() -> Self {
		Self::default()
	}

	pub fn push<T: Chained + Copy + 'static>(mut self, v: T) -> Self {
		self.blocks.push(Block::new(v));
		self
	}

	pub fn push_block(mut self, block: Block) -> Self {
		self.blocks.push(block);
		self
	}

	pub fn push_opaque(self, kind: StructureKind, body: impl Into<Vec<u8>>) -> Self {
		self.push_block(Block::opaque(kind, body))
	}

	pub fn len(&self) -> usize {
		self.blocks.len()
	}

	pub fn is_empty(&self) -> bool {
		self.blocks.is_empty()
	}

	pub fn kinds(&self) -> impl Iterator<Item = StructureKind> + '_ {
		self.blocks.iter().map(Block::kind)
	}

	/// Places every block in `arena` and links them in insertion order.
	///
	/// Any `next` pointer stored in a block's own header is overwritten.
	pub fn build<'a>(&self, arena: &'a Arena) -> ChainRoot<'a> {
		let mut root = ptr::null_mut::<ChainHeader>();
		let mut prev = ptr::null_mut::<ChainHeader>();

		for block in &self.blocks {
			let dst = arena.alloc_zeroed(block.layout()).as_ptr();
			unsafe {
				block.write_to(dst);
				let cur = dst.cast::<ChainHeader>();
				match prev.is_null() {
					true  => root = cur,
					false => (*prev).next = cur
				}
				prev = cur;
			}
		}

		log::debug!("built extension chain of {} blocks", self.blocks.len());
		ChainRoot { ptr: NonNull::new(root), _marker: PhantomData }
	}
}

/// The first block of a chain built in an [`Arena`], valid as long as the arena.
#[derive(Copy, Clone)]
pub struct ChainRoot<'a> {
	ptr:     Option<NonNull<ChainHeader>>,
	_marker: PhantomData<&'a Arena>
}

impl<'a> ChainRoot<'a> {
	/// The root pointer, null for an empty chain.
	pub fn as_ptr(&self) -> *const ChainHeader {
		self.ptr.map_or(ptr::null(), |v| v.as_ptr() as *const _)
	}

	pub fn as_mut_ptr(&self) -> *mut ChainHeader {
		self.ptr.map_or(ptr::null_mut(), NonNull::as_ptr)
	}

	pub fn is_empty(&self) -> bool {
		self.ptr.is_none()
	}

	pub fn iter(&self) -> ChainIter<'a> {
		// built chains are acyclic and live as long as the arena
		unsafe { iter_chain(self.as_ptr()) }
	}

	pub fn find<T: Chained>(&self) -> Option<&'a T> {
		self.iter().find_map(|v| v.downcast::<T>())
	}
}

impl From<ChainRoot<'_>> for RawValue {
	fn from(v: ChainRoot<'_>) -> Self {
		RawValue(v.as_ptr() as usize)
	}
}

impl fmt::Debug for ChainRoot<'_> {
	fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
		f.debug_list().entries(self.iter()).finish()
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	crate::chained_block! {
		struct BaseInfo {
			flags: u32
		} = 10;

		struct ExtInfo {
			value: u64
		} = 11;
	}

	#[test]
	fn default_sets_kind_and_null_next() {
		let v = BaseInfo::default();
		assert_eq!(v.header.kind, StructureKind(10));
		assert!(v.header.next.is_null());
		assert_eq!(v.flags, 0);
	}

	#[test]
	fn push_next_appends_in_insertion_order() {
		let mut base = BaseInfo::default();
		let mut a = ExtInfo { value: 1, ..Default::default() };
		let mut b = ExtInfo { value: 2, ..Default::default() };

		unsafe {
			push_next(&mut base, &mut a);
			push_next(&mut base, &mut b);
		}

		let values = unsafe { iter_chain(base.header()) }
			.filter_map(|v| v.downcast::<ExtInfo>())
			.map(|v| v.value)
			.collect::<Vec<_>>();
		assert_eq!(values, [1, 2]);
	}

	#[test]
	fn builder_links_blocks_and_keeps_opaque_bytes() {
		let arena = Arena::new();
		let root = ChainBuilder::new()
			.push(BaseInfo { flags: 0x5, ..Default::default() })
			.push_opaque(StructureKind(99), [1u8, 2, 3, 4])
			.push(ExtInfo { value: 77, ..Default::default() })
			.build(&arena);

		let kinds = root.iter().map(|v| v.kind()).collect::<Vec<_>>();
		assert_eq!(kinds, [StructureKind(10), StructureKind(99), StructureKind(11)]);
		assert_eq!(root.find::<BaseInfo>().map(|v| v.flags), Some(0x5));
		assert_eq!(root.find::<ExtInfo>().map(|v| v.value), Some(77));

		let opaque = root.iter().nth(1).expect("opaque block");
		let body = unsafe { std::slice::from_raw_parts((opaque.as_ptr() as *const u8).add(mem::size_of::<ChainHeader>()), 4) };
		assert_eq!(body, &[1, 2, 3, 4]);
	}

	#[test]
	fn empty_builder_yields_null_root() {
		let arena = Arena::new();
		let root = ChainBuilder::new().build(&arena);
		assert!(root.is_empty());
		assert!(root.as_ptr().is_null());
		assert_eq!(root.iter().count(), 0);
		assert!(RawValue::from(root).is_zero());
	}
}
