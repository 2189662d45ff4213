use camino::{Utf8Path, Utf8PathBuf};

const HOSTILE_CHARS: &[char] = &['\\', '/', ':', '*', '?', '"', '<', '>', '|'];

pub fn sanitize_filename(filename: &str) -> String {
    filename
        .chars()
        .map(|ch| if HOSTILE_CHARS.contains(&ch) { '_' } else { ch })
        .collect()
}

/// Splits at the last dot unless it is the leading one, so `.env` stays whole.
pub fn split_extension(filename: &str) -> (&str, &str) {
    match filename.rfind('.') {
        Some(index) if index > 0 => filename.split_at(index),
        _ => (filename, ""),
    }
}

/// Sanitizes `filename` and picks the first free name in `directory`,
/// trying `name.ext`, then `name (1).ext`, `name (2).ext`, ...
///
/// Only reads the filesystem. The caller must create the file before the
/// next resolution against the same directory.
pub fn resolve_unique_path(directory: &Utf8Path, filename: &str) -> Utf8PathBuf {
    let safe = sanitize_filename(filename);
    let mut target = directory.join(&safe);
    let (stem, ext) = split_extension(&safe);
    let mut counter = 1u64;
    // symlink_metadata so a dangling link still counts as taken.
    while target.symlink_metadata().is_ok() {
        target = directory.join(format!("{stem} ({counter}){ext}"));
        counter += 1;
    }
    target
}
