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

use std::{fmt, io};

pub type Result<T> = std::result::Result<T, Error>;

/// Recoverable failures of the binding substrate.
///
/// Programming errors at the native boundary (arity overflow, invalid release,
/// cyclic chains) are not represented here.
#[derive(Debug)]
pub enum Error {
	/// A native library could not be opened
	LibraryNotFound {
		name:   String,
		reason: String
	},
	/// None of the candidate libraries could be opened
	NoLibrary {
		tried: Vec<String>
	},
	/// A library was opened, but does not export the symbol
	SymbolNotFound {
		library: String,
		symbol:  String
	},
	/// A symbol name contains an interior nul byte
	InvalidSymbolName(String),
	UnknownFlagType(String),
	Io(io::Error),
	Json(serde_json::Error)
}

impl fmt::Display for Error {
	fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
		match self {
			Self::LibraryNotFound { name, reason } => write!(f, "failed to load `{}`: {}", name, reason),
			Self::NoLibrary { tried } => write!(f, "failed to load any of [{}]", tried.join(", ")),
			Self::SymbolNotFound { library, symbol } => write!(f, "failed to load `{}` from `{}`", symbol, library),
			Self::InvalidSymbolName(name) => write!(f, "invalid symbol name `{}`", name.escape_debug()),
			Self::UnknownFlagType(name) => write!(f, "no flag table for `{}`", name),
			Self::Io(e) => write!(f, "{}", e),
			Self::Json(e) => write!(f, "{}", e)
		}
	}
}

impl std::error::Error for Error {
	fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
		match self {
			Self::Io(e) => Some(e),
			Self::Json(e) => Some(e),
			_ => None
		}
	}
}

impl From<io::Error> for Error {
	fn from(e: io::Error) -> Self {
		Self::Io(e)
	}
}

impl From<serde_json::Error> for Error {
	fn from(e: serde_json::Error) -> Self {
		Self::Json(e)
	}
}
