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

//! Where to find the native library.

use {
	crate::error::*,
	serde::Deserialize,
	std::{env, ffi::OsString, io, path::PathBuf}
};

/// Overrides the library name, e.g. `KHRCALL_LIBRARY=libvulkan.so.1`.
pub const ENV_LIBRARY: &str = "KHRCALL_LIBRARY";
/// Additional directories to search, separated like `PATH`.
pub const ENV_LIBRARY_PATH: &str = "KHRCALL_LIBRARY_PATH";

#[cfg(all(unix, not(any(target_os = "macos", target_os = "ios"))))]
const LIBS: &[&str] = &["libvulkan.so.1", "libvulkan.so"];
#[cfg(any(target_os = "macos", target_os = "ios"))]
const LIBS: &[&str] = &["libvulkan.1.dylib", "libvulkan.dylib", "libMoltenVK.dylib"];
#[cfg(windows)]
const LIBS: &[&str] = &["vulkan-1.dll"];
#[cfg(not(any(unix, windows)))]
const LIBS: &[&str] = &[];

#[derive(Clone, Debug, Deserialize, Eq, PartialEq)]
#[serde(default)]
pub struct LoaderConfig {
	/// File names to try, in order
	pub library_names: Vec<String>,
	/// Directories searched before the system's default search path
	pub search_paths:  Vec<PathBuf>
}

impl Default for LoaderConfig {
	fn default() -> Self {
		Self {
			library_names: LIBS.iter().map(|s| s.to_string()).collect(),
			search_paths:  Vec::new()
		}
	}
}

impl LoaderConfig {
	/// The default configuration, with the environment overrides applied.
	pub fn from_env() -> Self {
		Self::default().with_env(|key| env::var_os(key))
	}

	/// Reads a JSON configuration; missing fields take their default.
	pub fn from_reader(reader: impl io::Read) -> Result<Self> {
		Ok(serde_json::from_reader(reader)?)
	}

	pub fn with_env(mut self, lookup: impl Fn(&str) -> Option<OsString>) -> Self {
		if let Some(name) = lookup(ENV_LIBRARY).filter(|v| !v.is_empty()) {
			self.library_names = vec![name.to_string_lossy().into_owned()];
		}

		if let Some(paths) = lookup(ENV_LIBRARY_PATH) {
			let mut search_paths = env::split_paths(&paths)
				.filter(|p| !p.as_os_str().is_empty())
				.collect::<Vec<_>>();
			search_paths.append(&mut self.search_paths);
			self.search_paths = search_paths;
		}

		self
	}

	/// Every path to try: each name in each search path, then each bare name.
	pub fn candidates(&self) -> Vec<PathBuf> {
		self.search_paths.iter()
			.flat_map(|dir| self.library_names.iter().map(move |name| dir.join(name)))
			.chain(self.library_names.iter().map(PathBuf::from))
			.collect()
	}
}
