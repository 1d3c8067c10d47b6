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

use {
	khrcall::*,
	std::cell::RefCell
};

thread_local! {
	static SEEN: RefCell<Vec<usize>> = const { RefCell::new(Vec::new()) };
}

macro_rules! echo {
	( $( $name:ident => [ $( $a:ident ),* ] ),* $(,)? ) => { $(
		extern "C" fn $name( $( $a: usize ),* ) -> usize {
			let args: Vec<usize> = vec![$( $a ),*];
			let n = args.len();
			SEEN.with(|seen| *seen.borrow_mut() = args);
			n
		}
	)* };
}

echo! {
	echo0  => [],
	echo1  => [a0],
	echo2  => [a0, a1],
	echo3  => [a0, a1, a2],
	echo4  => [a0, a1, a2, a3],
	echo5  => [a0, a1, a2, a3, a4],
	echo6  => [a0, a1, a2, a3, a4, a5],
	echo7  => [a0, a1, a2, a3, a4, a5, a6],
	echo8  => [a0, a1, a2, a3, a4, a5, a6, a7],
	echo9  => [a0, a1, a2, a3, a4, a5, a6, a7, a8],
	echo10 => [a0, a1, a2, a3, a4, a5, a6, a7, a8, a9],
	echo11 => [a0, a1, a2, a3, a4, a5, a6, a7, a8, a9, a10],
	echo12 => [a0, a1, a2, a3, a4, a5, a6, a7, a8, a9, a10, a11],
	echo13 => [a0, a1, a2, a3, a4, a5, a6, a7, a8, a9, a10, a11, a12],
	echo14 => [a0, a1, a2, a3, a4, a5, a6, a7, a8, a9, a10, a11, a12, a13],
	echo15 => [a0, a1, a2, a3, a4, a5, a6, a7, a8, a9, a10, a11, a12, a13, a14],
	echo16 => [a0, a1, a2, a3, a4, a5, a6, a7, a8, a9, a10, a11, a12, a13, a14, a15],
	echo17 => [a0, a1, a2, a3, a4, a5, a6, a7, a8, a9, a10, a11, a12, a13, a14, a15, a16],
	echo18 => [a0, a1, a2, a3, a4, a5, a6, a7, a8, a9, a10, a11, a12, a13, a14, a15, a16, a17],
}

fn echoes() -> [ProcAddr; 19] {
	[
		echo0 as usize, echo1 as usize, echo2 as usize, echo3 as usize, echo4 as usize,
		echo5 as usize, echo6 as usize, echo7 as usize, echo8 as usize, echo9 as usize,
		echo10 as usize, echo11 as usize, echo12 as usize, echo13 as usize, echo14 as usize,
		echo15 as usize, echo16 as usize, echo17 as usize, echo18 as usize
	].map(|addr| ProcAddr::new(addr).expect("null fn pointer"))
}

/// Distinct values with the high and low bits set, so truncation or extension shows.
fn pattern(n: usize) -> Vec<RawValue> {
	(0..n)
		.map(|i| RawValue(match i % 2 {
			0 => usize::MAX - i,
			_ => (1usize << (usize::BITS - 1)) | (0xA5 + i)
		}))
		.collect()
}

fn seen() -> Vec<RawValue> {
	SEEN.with(|seen| seen.borrow().iter().copied().map(RawValue).collect())
}

#[test]
fn every_arity_passes_arguments_unchanged() {
	for (n, addr) in echoes().into_iter().enumerate() {
		let args = pattern(n);
		let frame = CallFrame::new(&args);
		assert_eq!(frame.primitive(), Primitive::for_arity(n).expect("supported arity"));
		assert!(frame.padded().len() >= n && frame.padded().len() % 3 == 0);
		assert!(frame.padded()[n..].iter().all(|v| v.is_zero()), "arity {} is not zero padded", n);

		let r = unsafe { call(addr, &args) };
		assert_eq!(r.r1, RawValue(n), "arity {} reached the wrong callee", n);
		assert_eq!(seen(), args, "arity {} changed its arguments", n);
	}
}

#[test]
fn static_arities_match_runtime_ones() {
	let addrs = echoes();
	let r = unsafe { call_n(addrs[0], []) };
	assert_eq!(r.r1, RawValue(0));

	let args: [RawValue; 7] = pattern(7).try_into().expect("7 values");
	let r = unsafe { call_n(addrs[7], args) };
	assert_eq!(r.r1, RawValue(7));
	assert_eq!(seen(), args);

	let args: [RawValue; 18] = pattern(18).try_into().expect("18 values");
	let r = unsafe { call_n(addrs[18], args) };
	assert_eq!(r.r1, RawValue(18));
	assert_eq!(seen(), args);
}

#[test]
#[should_panic(expected = "native call arity 19 exceeds the supported maximum of 18")]
fn overflowing_arity_panics() {
	let addr = echoes()[18];
	let args = pattern(19);
	unsafe { call(addr, &args) };
}

#[test]
fn arg_list_calls_through_dispatcher() {
	let addr = echoes()[4];
	let value = 9u64;
	let r = unsafe { ArgList::new()
		.u32(1)
		.i32(-1)
		.ptr(&value)
		.push(true)
		.call(addr) };

	assert_eq!(r.r1, RawValue(4));
	assert_eq!(seen(), [RawValue(1), RawValue(usize::MAX), RawValue(&value as *const u64 as usize), RawValue(1)]);
}

extern "C" fn read_kind(block: *const ChainHeader) -> usize {
	unsafe { (*block).kind.0 as usize }
}

#[test]
fn buffer_header_round_trip() {
	const K: StructureKind = StructureKind(1_000_001_000);

	let mut buf = NativeBuffer::allocate(24);
	unsafe {
		let header = buf.cast::<ChainHeader>();
		(*header).kind = K;
		(*header).next = std::ptr::null_mut();
	}

	let addr = ProcAddr::new(read_kind as usize).expect("null fn pointer");
	let r = unsafe { call(addr, &[RawValue::from(buf.as_ptr())]) };
	assert_eq!(r.r1.as_i32(), K.0);
	buf.release();
}

#[cfg(target_os = "linux")]
extern "C" fn fail_with_enoent() -> usize {
	unsafe { *libc::__errno_location() = libc::ENOENT; }
	usize::MAX
}

#[cfg(target_os = "linux")]
extern "C" fn succeed() -> usize {
	0
}

#[cfg(target_os = "linux")]
#[test]
fn error_code_is_reported_verbatim() {
	let r = unsafe { call(ProcAddr::new(fail_with_enoent as usize).expect("null fn pointer"), &[]) };
	assert_eq!(r.err, libc::ENOENT);
	assert_eq!(r.r1, RawValue(usize::MAX));

	// cleared before every call
	let r = unsafe { call(ProcAddr::new(succeed as usize).expect("null fn pointer"), &[]) };
	assert_eq!(r.err, 0);
}

#[cfg(any(all(target_arch = "x86_64", not(target_os = "windows")), target_arch = "aarch64"))]
mod wide {
	use super::*;

	#[repr(C)]
	struct Pair {
		lo: usize,
		hi: usize
	}

	extern "C" fn split(a: usize, b: usize, c: usize) -> Pair {
		Pair { lo: a + c, hi: b }
	}

	#[test]
	fn both_return_registers() {
		let addr = ProcAddr::new(split as usize).expect("null fn pointer");
		let r = unsafe { call_wide(addr, &[RawValue(1), RawValue(usize::MAX), RawValue(2)]) };
		assert_eq!(r.r1, RawValue(3));
		assert_eq!(r.r2, RawValue(usize::MAX));
	}
}

#[test]
fn concurrent_calls_are_independent() {
	let handles = (0..8)
		.map(|t| std::thread::spawn(move || {
			let addr = echoes()[3];
			for i in 0..1000usize {
				let args = [RawValue(t), RawValue(i), RawValue(t ^ i)];
				let r = unsafe { call(addr, &args) };
				assert_eq!(r.r1, RawValue(3));
				assert_eq!(seen(), args);
			}
		}))
		.collect::<Vec<_>>();

	for h in handles {
		h.join().expect("caller thread panicked");
	}
}
