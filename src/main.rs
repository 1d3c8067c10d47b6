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

use {khrcall::{*, flags::FlagsDisplay}, std::{io::{self, Write}, fs::File}};

const HELP: &str = r#"
khrcall
Usage: khrcall <command> <args...> [options]

Commands:
flags <tables file> <flag type> <mask> - render the names of the bits set in `mask`
probe <symbol>...                      - resolve symbols from the native library

Options:
--help, -h                             - display this help page
--lib=<library>, -l=<library>          - the library to load, instead of the platform's default
--config=<config file>,
-c=<config file>                       - read the loader configuration from a JSON file

Environment:
KHRCALL_LIBRARY                        - overrides the library name
KHRCALL_LIBRARY_PATH                   - additional directories to search for the library
"#;

fn main() {
	env_logger::init();

	let mut lib_name = None;
	let mut config_file = None;
	let mut args = Vec::new();

	for arg in std::env::args().skip(1) {
		if arg.starts_with('-') {
			if arg.starts_with("-l=") || arg.starts_with("--lib=") {
				lib_name = Some(arg.trim_start_matches("-l=")
					.trim_start_matches("--lib=").to_string());
			} else if arg.starts_with("-c=") || arg.starts_with("--config=") {
				config_file = Some(arg.trim_start_matches("-c=")
					.trim_start_matches("--config=").to_string());
			} else if arg == "-h" || arg == "--help" {
				println!("{}", HELP);
				return;
			} else {
				println!("ignored unknown option: {}", arg)
			}
		} else {
			args.push(arg);
		}
	}

	let r = match args.split_first() {
		Some((cmd, args)) if cmd == "flags" => flags(args),
		Some((cmd, args)) if cmd == "probe" => probe(args, lib_name, config_file),
		Some((cmd, _)) => {
			println!("unknown command: {}\n{}", cmd, HELP);
			std::process::exit(100);
		}
		None => {
			println!("{}", HELP);
			return;
		}
	};

	if let Err(e) = r {
		println!("\x1b[31mfailed\x1b[0m\nError: {}", e);
		std::process::exit(100);
	}
}

fn flags(args: &[String]) -> Result<()> {
	let [file, ty, mask] = args else {
		println!("usage: khrcall flags <tables file> <flag type> <mask>");
		std::process::exit(100);
	};

	let mask = parse_mask(mask)
		.ok_or_else(|| Error::Io(io::Error::new(io::ErrorKind::InvalidInput, format!("invalid mask `{}`", mask))))?;

	print!("reading flag tables `{}` ... ", file);
	io::stdout().flush().unwrap_or_default();
	let registry = FlagRegistry::from_reader(File::open(file).map(io::BufReader::new)?)?;
	println!("\x1b[32mok\x1b[0m ({} tables)", registry.len());

	let table = registry.get(ty)?;
	println!("{}({:#x}) = {}", ty, mask, FlagsDisplay::new(mask, 64, table));
	Ok(())
}

fn probe(symbols: &[String], lib_name: Option<String>, config_file: Option<String>) -> Result<()> {
	let mut config = match &config_file {
		Some(file) => LoaderConfig::from_reader(File::open(file).map(io::BufReader::new)?)?,
		None       => LoaderConfig::default()
	}.with_env(|key| std::env::var_os(key));

	if let Some(name) = lib_name {
		config.library_names = vec![name];
	}

	print!("loading library ... ");
	io::stdout().flush().unwrap_or_default();
	let lib = Library::from_config(&config)?;
	println!("\x1b[32mok\x1b[0m (`{}`)", lib.name());

	let mut missing = 0;
	for symbol in symbols {
		match lib.resolve(symbol) {
			Ok(addr) => println!("{:<50} \x1b[32mok\x1b[0m {}", symbol, addr),
			Err(_) => {
				println!("{:<50} \x1b[33mmissing\x1b[0m", symbol);
				missing += 1;
			}
		}
	}

	if missing != 0 {
		println!("{} of {} symbols are missing", missing, symbols.len());
	}

	Ok(())
}

fn parse_mask(s: &str) -> Option<u64> {
	match s.strip_prefix("0x").or_else(|| s.strip_prefix("0X")) {
		Some(hex) => u64::from_str_radix(&hex.replace('_', ""), 16).ok(),
		None      => s.replace('_', "").parse().ok()
	}
}
