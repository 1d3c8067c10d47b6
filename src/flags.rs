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

//! Diagnostic rendering of bitmask values.

use {
	crate::error::*,
	serde::Deserialize,
	std::{borrow::Cow, collections::HashMap, fmt, io}
};

pub const SEPARATOR: &str = " | ";

/// A named single bit constant.
#[derive(Clone, Debug, Deserialize, Eq, PartialEq)]
pub struct FlagBit {
	pub bitpos: u32,
	pub name:   Cow<'static, str>
}

pub const fn bit(bitpos: u32, name: &'static str) -> FlagBit {
	FlagBit { bitpos, name: Cow::Borrowed(name) }
}

/// The named bits of one flag type.
#[derive(Clone, Debug, Deserialize, Eq, PartialEq)]
pub struct FlagTable {
	pub name: Cow<'static, str>,
	#[serde(default)]
	pub bits: Cow<'static, [FlagBit]>
}

impl FlagTable {
	pub const fn from_static(name: &'static str, bits: &'static [FlagBit]) -> Self {
		Self { name: Cow::Borrowed(name), bits: Cow::Borrowed(bits) }
	}

	pub fn new(name: impl Into<String>, bits: impl IntoIterator<Item = (u32, impl Into<String>)>) -> Self {
		Self {
			name: Cow::Owned(name.into()),
			bits: bits.into_iter()
				.map(|(bitpos, name)| FlagBit { bitpos, name: Cow::Owned(name.into()) })
				.collect()
		}
	}

	pub fn name_of(&self, bitpos: u32) -> Option<&str> {
		self.bits.iter()
			.find(|v| v.bitpos == bitpos)
			.map(|v| &*v.name)
	}

	pub fn render(&self, mask: u32) -> String {
		render(mask, self)
	}
}

/// Renders the names of the set bits of `mask`, in ascending bit order.
///
/// Set bits without a name in `table` are left out; a mask of zero renders as an
/// empty string.
pub fn render(mask: u32, table: &FlagTable) -> String {
	FlagsDisplay::new(mask as u64, 32, table).to_string()
}

/// [`render`] for 64 bit flag types.
pub fn render64(mask: u64, table: &FlagTable) -> String {
	FlagsDisplay::new(mask, 64, table).to_string()
}

/// Formats a mask like [`render`], without allocating.
#[derive(Copy, Clone, Debug)]
pub struct FlagsDisplay<'a> {
	mask:  u64,
	width: u32,
	table: &'a FlagTable
}

impl<'a> FlagsDisplay<'a> {
	pub fn new(mask: u64, width: u32, table: &'a FlagTable) -> Self {
		Self { mask, width: width.min(64), table }
	}
}

impl fmt::Display for FlagsDisplay<'_> {
	fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
		let mut first = true;
		for bitpos in 0..self.width {
			if self.mask & (1u64 << bitpos) == 0 { continue; }
			let Some(name) = self.table.name_of(bitpos) else { continue };

			if !first { f.write_str(SEPARATOR)?; }
			f.write_str(name)?;
			first = false;
		}
		Ok(())
	}
}

/// Flag tables by flag type name.
#[derive(Clone, Debug, Default)]
pub struct FlagRegistry {
	tables: HashMap<String, FlagTable>
}

impl FlagRegistry {
	pub fn new() -> Self {
		Self::default()
	}

	/// Reads a JSON array of tables, e.g.
	/// `[{"name": "VkQueueFlags", "bits": [{"bitpos": 0, "name": "GRAPHICS"}]}]`.
	pub fn from_reader(reader: impl io::Read) -> Result<Self> {
		let tables: Vec<FlagTable> = serde_json::from_reader(reader)?;
		let mut registry = Self::new();
		registry.extend(tables);
		Ok(registry)
	}

	pub fn insert(&mut self, table: FlagTable) {
		self.tables.insert(table.name.to_string(), table);
	}

	pub fn get(&self, name: &str) -> Result<&FlagTable> {
		self.tables.get(name).ok_or_else(|| Error::UnknownFlagType(name.to_string()))
	}

	pub fn len(&self) -> usize {
		self.tables.len()
	}

	pub fn is_empty(&self) -> bool {
		self.tables.is_empty()
	}
}

impl Extend<FlagTable> for FlagRegistry {
	fn extend<T: IntoIterator<Item = FlagTable>>(&mut self, iter: T) {
		for table in iter {
			self.insert(table);
		}
	}
}
