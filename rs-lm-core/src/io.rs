use std::fs::File;
use std::io::Read;
use std::path::Path;
use std::{fs, io};

/// Reads a text file and returns all its lines as a `Vec<String>`.
///
/// - Reads the entire file into memory
/// - Splits on `\n` / `\r\n`
pub(crate) fn read_lines<P: AsRef<Path>>(filename: P) -> io::Result<Vec<String>> {
	let mut contents = String::new();
	File::open(filename)?.read_to_string(&mut contents)?;
	Ok(contents.lines().map(str::to_owned).collect())
}

/// Reads a whole text file as a single trimmed string.
pub(crate) fn read_text<P: AsRef<Path>>(filename: P) -> io::Result<String> {
	let mut contents = String::new();
	File::open(filename)?.read_to_string(&mut contents)?;
	Ok(contents.trim().to_owned())
}

/// Lists all files with a given extension in a directory.
///
/// Returns file names only (no paths), sorted so that the iteration
/// order is stable across platforms.
pub(crate) fn list_files<P: AsRef<Path>>(dir: P, extension: &str) -> io::Result<Vec<String>> {
	let mut files = Vec::new();

	for entry in fs::read_dir(dir)? {
		let entry = entry?;
		let path = entry.path();

		if path.is_file() {
			if path.extension() == Some(std::ffi::OsStr::new(extension)) {
				if let Some(name) = path.file_name() {
					files.push(name.to_string_lossy().to_string());
				}
			}
		}
	}

	files.sort();
	Ok(files)
}
