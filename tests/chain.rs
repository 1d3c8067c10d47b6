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

use khrcall::{*, chain::{iter_chain, push_next}};

chained_block! {
	pub struct BaseInfo {
		pub flags: u32
	} = 100;

	pub struct ExtA {
		pub value: u32
	} = 101;

	pub struct ExtB {
		pub value:  u64,
		pub handle: u64
	} = 102;
}

non_dispatchable_handle!(Sampler);

/// Walks a chain the way a native callee does, returning the number of blocks and
/// the sum of every `ExtA::value`. Unknown kinds are skipped.
extern "C" fn walk(root: *const ChainHeader) -> usize {
	let mut count = 0;
	let mut sum = 0;
	let mut cur = root;
	while !cur.is_null() {
		unsafe {
			if (*cur).kind == ExtA::KIND {
				sum += (*(cur as *const ExtA)).value as usize;
			}
			count += 1;
			cur = (*cur).next;
		}
	}
	count * 1000 + sum
}

fn walk_addr() -> ProcAddr {
	ProcAddr::new(walk as usize).expect("null fn pointer")
}

#[test]
fn traversal_visits_each_block_once_in_order() {
	let mut a = BaseInfo::default();
	let mut b = ExtA { value: 1, ..Default::default() };
	let mut c = ExtB::default();

	unsafe {
		push_next(&mut b, &mut c);
		push_next(&mut a, &mut b);
	}

	let visited = unsafe { iter_chain(a.header()) }
		.map(|v| v.as_ptr())
		.collect::<Vec<_>>();
	assert_eq!(visited, [a.header() as *const _, b.header() as *const _, c.header() as *const _]);
}

#[test]
fn cyclic_chain_never_terminates() {
	let mut a = BaseInfo::default();
	let mut b = ExtA::default();
	unsafe { push_next(&mut a, &mut b); }

	// unsupported: a chain pointing back at its root loops forever
	let root: *mut ChainHeader = &mut a.header;
	a.header.next = root;
	let steps = unsafe { iter_chain(a.header()) }.take(64).count();
	assert_eq!(steps, 64);
}

#[test]
fn native_side_walks_a_built_chain() {
	let sampler = Sampler(0x1234_5678_9abc);
	let arena = Arena::new();
	let root = ChainBuilder::new()
		.push(BaseInfo { flags: 1, ..Default::default() })
		.push(ExtA { value: 20, ..Default::default() })
		.push_opaque(StructureKind(0x7fff_0000), vec![0xEEu8; 40])
		.push(ExtB { value: 7, handle: sampler.as_raw(), ..Default::default() })
		.push(ExtA { value: 3, ..Default::default() })
		.build(&arena);

	let r = unsafe { call(walk_addr(), &[root.into()]) };
	assert_eq!(r.r1, RawValue(5 * 1000 + 23));
	assert_eq!(root.find::<ExtB>().map(|v| Sampler::from_raw(v.handle)), Some(sampler));
}

#[test]
fn empty_chain_is_a_null_root() {
	let arena = Arena::new();
	let root = ChainBuilder::new().build(&arena);
	let r = unsafe { call(walk_addr(), &[root.into()]) };
	assert_eq!(r.r1, RawValue(0));
}

#[test]
fn arena_chains_are_released_with_the_arena() {
	let tracker = AllocTracker::new();
	{
		let arena = Arena::tracked(&tracker);
		let builder = (0..100).fold(ChainBuilder::new(), |b, i| b.push(ExtA { value: i, ..Default::default() }));
		let root = builder.build(&arena);
		assert_eq!(root.iter().count(), 100);
		assert!(!tracker.is_clean());
	}
	assert!(tracker.is_clean());
}
