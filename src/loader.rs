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

//! Dynamic library loading and entry point tables.

use {
	crate::{call::{self, ProcAddr}, config::LoaderConfig, error::*, raw::RawValue},
	std::{collections::HashMap, ffi::{c_void, CString, OsStr}, fmt, path::Path}
};

/// A loaded native library.
///
/// Addresses resolved from it are only valid while it is alive.
pub struct Library {
	name: String,
	lib:  libloading::Library
}

impl Library {
	pub fn open(path: impl AsRef<OsStr>) -> Result<Self> {
		let name = Path::new(path.as_ref()).display().to_string();
		let lib = unsafe { libloading::Library::new(path.as_ref()) }
			.map_err(|e| Error::LibraryNotFound { name: name.clone(), reason: e.to_string() })?;

		log::trace!("loaded `{}`", name);
		Ok(Self { name, lib })
	}

	/// Opens the first candidate that can be loaded.
	pub fn open_first<I: IntoIterator<Item = S>, S: AsRef<OsStr>>(candidates: I) -> Result<Self> {
		let mut tried = Vec::new();

		for candidate in candidates {
			match Self::open(candidate.as_ref()) {
				Ok(lib) => return Ok(lib),
				Err(e) => {
					log::debug!("{}", e);
					tried.push(Path::new(candidate.as_ref()).display().to_string());
				}
			}
		}

		Err(Error::NoLibrary { tried })
	}

	pub fn from_config(config: &LoaderConfig) -> Result<Self> {
		Self::open_first(config.candidates())
	}

	pub fn name(&self) -> &str {
		&self.name
	}

	pub fn resolve(&self, symbol: &str) -> Result<ProcAddr> {
		let c_name = CString::new(symbol).map_err(|_| Error::InvalidSymbolName(symbol.to_string()))?;
		let not_found = || Error::SymbolNotFound { library: self.name.clone(), symbol: symbol.to_string() };

		let ptr = unsafe { self.lib.get::<*const c_void>(c_name.as_bytes_with_nul()) }
			.map(|sym| *sym)
			.map_err(|_| not_found())?;

		let addr = ProcAddr::from_ptr(ptr).ok_or_else(not_found)?;
		log::trace!("resolved `{}` at {}", symbol, addr);
		Ok(addr)
	}

	/// Resolves an optional entry point, `None` meaning the capability is absent.
	pub fn try_resolve(&self, symbol: &str) -> Option<ProcAddr> {
		match self.resolve(symbol) {
			Ok(addr) => Some(addr),
			Err(e) => {
				log::warn!("{}", e);
				None
			}
		}
	}
}

impl fmt::Debug for Library {
	fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
		f.debug_struct("Library").field("name", &self.name).finish()
	}
}

/// Entry points by name, e.g. those of one dispatchable object.
#[derive(Clone, Default)]
pub struct ProcTable {
	name:  String,
	procs: HashMap<String, ProcAddr>
}

impl ProcTable {
	pub fn new(name: impl Into<String>) -> Self {
		Self { name: name.into(), procs: HashMap::new() }
	}

	/// Resolves `names` from `lib`. Missing entry points are left out.
	pub fn load(lib: &Library, names: &[&str]) -> Self {
		let mut table = Self::new(lib.name());
		for name in names {
			if let Some(addr) = lib.try_resolve(name) {
				table.insert(*name, addr);
			}
		}
		table
	}

	/// Resolves `names` through a native `get_proc_addr(handle, name)` entry point,
	/// the way per object tables are loaded. Names it returns null for are left out.
	///
	/// # Safety
	///
	/// `get_proc_addr` must take a handle and a nul terminated name and return an
	/// address or null.
	pub unsafe fn load_with(name: impl Into<String>, get_proc_addr: ProcAddr, handle: RawValue, names: &[&str]) -> Self {
		let mut table = Self::new(name);
		for name in names {
			let Ok(c_name) = CString::new(*name) else {
				log::warn!("invalid entry point name `{}`", name.escape_debug());
				continue;
			};

			let r = call::call_n(get_proc_addr, [handle, RawValue::from(c_name.as_ptr())]);
			match ProcAddr::new(r.r1.as_usize()) {
				Some(addr) => table.insert(*name, addr),
				None       => log::warn!("failed to load `{}` for `{}`", name, table.name)
			}
		}
		table
	}

	pub fn insert(&mut self, name: impl Into<String>, addr: ProcAddr) {
		self.procs.insert(name.into(), addr);
	}

	pub fn name(&self) -> &str {
		&self.name
	}

	pub fn get(&self, name: &str) -> Option<ProcAddr> {
		self.procs.get(name).copied()
	}

	pub fn require(&self, name: &str) -> Result<ProcAddr> {
		self.get(name).ok_or_else(|| Error::SymbolNotFound { library: self.name.clone(), symbol: name.to_string() })
	}

	pub fn len(&self) -> usize {
		self.procs.len()
	}

	pub fn is_empty(&self) -> bool {
		self.procs.is_empty()
	}
}

impl fmt::Debug for ProcTable {
	fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
		f.debug_struct("ProcTable").field("name", &self.name).finish()
	}
}
