//! Directory packing for bulk delivery.

use std::{
    fs,
    io::{Cursor, Write},
    path::{Path, PathBuf},
};

use thiserror::Error;
use zip::{CompressionMethod, ZipWriter, write::SimpleFileOptions};

#[derive(Debug, Error)]
pub enum ArchiveError {
    #[error("not a directory: {0}")]
    NotADirectory(PathBuf),
    #[error("io error while packing: {0}")]
    Io(#[from] std::io::Error),
    #[error("zip error: {0}")]
    Zip(#[from] zip::result::ZipError),
}

/// Pack a directory tree into an in-memory zip archive.
///
/// Entry names are relative to `dir`, use forward slashes, and are added
/// in sorted order so the same tree packs to the same archive.
///
/// # Errors
/// Fails when `dir` is not a directory or an entry cannot be read.
pub fn pack_dir(dir: &Path) -> Result<Vec<u8>, ArchiveError> {
    if !dir.is_dir() {
        return Err(ArchiveError::NotADirectory(dir.to_path_buf()));
    }
    let mut writer = ZipWriter::new(Cursor::new(Vec::new()));
    let options = SimpleFileOptions::default().compression_method(CompressionMethod::Deflated);
    add_entries(&mut writer, options, dir, Path::new(""))?;
    Ok(writer.finish()?.into_inner())
}

fn add_entries(
    writer: &mut ZipWriter<Cursor<Vec<u8>>>,
    options: SimpleFileOptions,
    dir: &Path,
    prefix: &Path,
) -> Result<(), ArchiveError> {
    let mut entries: Vec<fs::DirEntry> = fs::read_dir(dir)?.collect::<Result<_, _>>()?;
    entries.sort_by_key(fs::DirEntry::file_name);

    for entry in entries {
        let path = entry.path();
        let rel = prefix.join(entry.file_name());
        let name = rel.to_string_lossy().replace('\\', "/");
        if path.is_dir() {
            writer.add_directory(name, options)?;
            add_entries(writer, options, &path, &rel)?;
        } else {
            writer.start_file(name, options)?;
            writer.write_all(&fs::read(&path)?)?;
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Read;

    use zip::ZipArchive;

    #[test]
    fn packs_a_nested_tree() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("top.txt"), b"top level").unwrap();
        fs::create_dir(dir.path().join("sub")).unwrap();
        fs::write(dir.path().join("sub").join("inner.txt"), b"inner").unwrap();

        let bytes = pack_dir(dir.path()).unwrap();
        let mut archive = ZipArchive::new(Cursor::new(bytes)).unwrap();

        let mut top = String::new();
        archive
            .by_name("top.txt")
            .unwrap()
            .read_to_string(&mut top)
            .unwrap();
        assert_eq!(top, "top level");

        let mut inner = String::new();
        archive
            .by_name("sub/inner.txt")
            .unwrap()
            .read_to_string(&mut inner)
            .unwrap();
        assert_eq!(inner, "inner");
    }

    #[test]
    fn empty_directory_packs_to_an_empty_archive() {
        let dir = tempfile::tempdir().unwrap();
        let bytes = pack_dir(dir.path()).unwrap();
        let archive = ZipArchive::new(Cursor::new(bytes)).unwrap();
        assert_eq!(archive.len(), 0);
    }

    #[test]
    fn rejects_a_file_path() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("plain.txt");
        fs::write(&file, b"not a dir").unwrap();
        assert!(matches!(
            pack_dir(&file).unwrap_err(),
            ArchiveError::NotADirectory(_)
        ));
    }
}
