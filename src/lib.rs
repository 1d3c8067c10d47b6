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

//! The hand written core of generated native API bindings.
//!
//! Generated code describes every constant, flag, structure and entry point of an
//! API as data; this crate provides what that data is used with:
//!
//! - [`call`] invokes a native entry point with 0 to 18 machine word arguments,
//! - [`chain`] builds the tagged, singly linked chains of extensible parameter blocks,
//! - [`buffer`] and [`arena`] provide zero filled, address stable native memory,
//! - [`handle`] defines dispatchable and non-dispatchable object handles,
//! - [`flags`] renders bitmasks for diagnostics,
//! - [`loader`] and [`config`] find the native library and its entry points.
//!
//! Example:
//! ```rust
//! use khrcall::*;
//!
//! chained_block! {
//! 	pub struct InstanceCreateInfo {
//! 		pub flags:           u32,
//! 		pub extension_count: u32
//! 	} = 1;
//! }
//!
//! dispatchable_handle!(Instance);
//!
//! fn main() -> Result<()> {
//! 	let lib = loader::Library::from_config(&LoaderConfig::from_env())?;
//! 	let create_instance = lib.resolve("vkCreateInstance")?;
//!
//! 	let arena = Arena::new();
//! 	let info = ChainBuilder::new()
//! 		.push(InstanceCreateInfo::default())
//! 		.build(&arena);
//! 	let mut instance = Instance::null();
//!
//! 	let r = unsafe { ArgList::new()
//! 		.push(info)
//! 		.ptr(std::ptr::null::<()>())
//! 		.ptr_mut(&mut instance)
//! 		.call(create_instance) };
//!
//! 	println!("vkCreateInstance: {}, instance: {}", r.r1.as_i32(), instance);
//! 	Ok(())
//! }
//! ```

pub mod raw;
pub mod call;
pub mod chain;
pub mod buffer;
pub mod arena;
pub mod handle;
pub mod flags;
pub mod loader;
pub mod config;
pub mod error;

pub use {
	raw::{RawValue, CallResult},
	call::{call, call_n, ArgList, CallFrame, Primitive, ProcAddr, MAX_ARITY},
	chain::{ChainBuilder, ChainHeader, ChainRoot, Chained, StructureKind},
	buffer::{NativeBuffer, AllocTracker},
	arena::Arena,
	handle::{Dispatch, Handle, HandleKind},
	flags::{FlagTable, FlagRegistry},
	loader::{Library, ProcTable},
	config::LoaderConfig,
	error::{Error, Result}
};

#[cfg(any(all(target_arch = "x86_64", not(target_os = "windows")), target_arch = "aarch64"))]
pub use call::call_wide;
