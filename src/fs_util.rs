use std::fs;
use std::io::{self, Read};

use camino::Utf8Path;

use crate::error::DownloaderError;

pub fn ensure_dir(path: &Utf8Path) -> Result<(), DownloaderError> {
    if path.as_std_path().is_dir() {
        return Ok(());
    }
    fs::create_dir_all(path.as_std_path()).map_err(|err| DownloaderError::DirectoryInit {
        path: path.to_path_buf(),
        message: err.to_string(),
    })
}

/// Streams `reader` into a temp file next to `dest`, then moves it into place.
///
/// Nothing appears at `dest` unless the whole body was written, and an
/// existing file at `dest` is never replaced.
pub fn write_new_file<R: Read>(reader: &mut R, dest: &Utf8Path) -> Result<u64, DownloaderError> {
    let parent = dest
        .parent()
        .filter(|parent| !parent.as_str().is_empty())
        .unwrap_or(Utf8Path::new("."));
    let mut temp = tempfile::Builder::new()
        .prefix(".s3sql-part")
        .tempfile_in(parent.as_std_path())
        .map_err(|err| DownloaderError::Filesystem(format!("create temp in {parent}: {err}")))?;
    let written = io::copy(reader, temp.as_file_mut())
        .map_err(|err| DownloaderError::Filesystem(format!("write {dest}: {err}")))?;
    temp.persist_noclobber(dest.as_std_path())
        .map_err(|err| DownloaderError::Filesystem(format!("persist {dest}: {}", err.error)))?;
    Ok(written)
}

#[cfg(test)]
mod tests {
    use super::*;
    use camino::Utf8PathBuf;

    #[test]
    fn write_new_file_refuses_to_clobber() {
        let temp = tempfile::tempdir().unwrap();
        let dir = Utf8PathBuf::from_path_buf(temp.path().to_path_buf()).unwrap();
        let dest = dir.join("a.txt");
        std::fs::write(dest.as_std_path(), b"old").unwrap();

        let result = write_new_file(&mut &b"new"[..], &dest);
        assert!(result.is_err());
        assert_eq!(std::fs::read(dest.as_std_path()).unwrap(), b"old");
        assert_eq!(std::fs::read_dir(temp.path()).unwrap().count(), 1);
    }

    #[test]
    fn ensure_dir_creates_nested() {
        let temp = tempfile::tempdir().unwrap();
        let dir = Utf8PathBuf::from_path_buf(temp.path().join("a/b/c")).unwrap();
        ensure_dir(&dir).unwrap();
        assert!(dir.as_std_path().is_dir());
    }
}
