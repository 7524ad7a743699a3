//! Segment file management.
//!
//! A database directory holds numbered segment pairs: `<id>.data` with the
//! appended records and `<id>.hint` with the matching location index. The
//! id is decimal ASCII; the largest id is the newest segment and the only
//! one open for appends. All other segments are immutable until merge
//! removes them.
//!
//! Reads go through read-only memory maps. The active segment grows under
//! the writer, so its map is re-established after each append; immutable
//! segments are mapped once, lazily, on first read.

use std::fs::{File, OpenOptions};
use std::path::{Path, PathBuf};

use memmap2::Mmap;

use crate::error::{Error, Result};

pub const DATA_EXT: &str = "data";
pub const HINT_EXT: &str = "hint";

pub fn data_path(dir: &Path, file_id: u64) -> PathBuf {
    dir.join(format!("{file_id}.{DATA_EXT}"))
}

pub fn hint_path(dir: &Path, file_id: u64) -> PathBuf {
    dir.join(format!("{file_id}.{HINT_EXT}"))
}

/// Enumerates segment ids in the directory by scanning for `*.data` files.
/// Returned ascending, so the last id is the newest segment.
pub fn list_segment_ids(dir: &Path) -> Result<Vec<u64>> {
    let mut ids = Vec::new();

    for dirent in std::fs::read_dir(dir)? {
        let path = dirent?.path();
        if path.extension().and_then(|e| e.to_str()) != Some(DATA_EXT) {
            continue;
        }

        let id = path
            .file_stem()
            .and_then(|stem| stem.to_str())
            .and_then(|stem| stem.parse::<u64>().ok())
            .ok_or_else(|| Error::InvalidFilename(path.display().to_string()))?;
        ids.push(id);
    }

    ids.sort_unstable();
    Ok(ids)
}

/// Creates the data and hint files for a fresh segment and returns their
/// append handles.
pub fn create(dir: &Path, file_id: u64) -> Result<(File, File)> {
    let data = OpenOptions::new()
        .create_new(true)
        .append(true)
        .open(data_path(dir, file_id))?;
    let hint = OpenOptions::new()
        .create_new(true)
        .append(true)
        .open(hint_path(dir, file_id))?;
    Ok((data, hint))
}

/// Reopens an existing segment's data and hint files for append. The hint
/// file is created if it is missing.
pub fn open_append(dir: &Path, file_id: u64) -> Result<(File, File)> {
    let data = OpenOptions::new().append(true).open(data_path(dir, file_id))?;
    let hint = OpenOptions::new()
        .create(true)
        .append(true)
        .open(hint_path(dir, file_id))?;
    Ok((data, hint))
}

/// A read-only memory-mapped view of one segment's data file.
///
/// The map covers at least all bytes reachable from the keydir. Dropping
/// the segment unmaps the region and closes the backing file.
pub struct Segment {
    pub file_id: u64,
    file: File,
    mmap: Option<Mmap>,
    len: u64,
}

impl Segment {
    /// Opens the segment's data file read-only and maps its current size.
    pub fn open(dir: &Path, file_id: u64) -> Result<Self> {
        let file = File::open(data_path(dir, file_id))?;
        let mut segment = Self {
            file_id,
            file,
            mmap: None,
            len: 0,
        };
        segment.map_current()?;
        Ok(segment)
    }

    /// Length of the mapped region.
    pub fn len(&self) -> u64 {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// The mapped bytes.
    pub fn bytes(&self) -> &[u8] {
        match &self.mmap {
            Some(mmap) => mmap,
            None => &[],
        }
    }

    /// Checks the backing file's size against the mapping and, if it has
    /// changed, drops the old map and maps the new size.
    pub fn remap(&mut self) -> Result<()> {
        let size = self.file.metadata()?.len();
        if size == self.len {
            return Ok(());
        }
        self.map_current()
    }

    fn map_current(&mut self) -> Result<()> {
        let size = self.file.metadata()?.len();

        // Unmap before remapping; a zero-length file cannot be mapped.
        self.mmap = None;
        if size > 0 {
            self.mmap = Some(unsafe { Mmap::map(&self.file)? });
        }
        self.len = size;
        Ok(())
    }
}

impl std::fmt::Debug for Segment {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Segment")
            .field("file_id", &self.file_id)
            .field("len", &self.len)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::TempDir;

    #[test]
    fn test_paths() {
        let dir = Path::new("/db");
        assert_eq!(data_path(dir, 42), PathBuf::from("/db/42.data"));
        assert_eq!(hint_path(dir, 42), PathBuf::from("/db/42.hint"));
    }

    #[test]
    fn test_list_segment_ids_sorted() {
        let dir = TempDir::new().expect("failed to create temp dir");
        for id in [30u64, 10, 20] {
            std::fs::write(data_path(dir.path(), id), b"").unwrap();
        }
        // Hint files and unrelated files are ignored.
        std::fs::write(dir.path().join("10.hint"), b"").unwrap();
        std::fs::write(dir.path().join("notes.txt"), b"").unwrap();

        let ids = list_segment_ids(dir.path()).expect("listing failed");
        assert_eq!(ids, vec![10, 20, 30]);
    }

    #[test]
    fn test_list_rejects_bad_filename() {
        let dir = TempDir::new().expect("failed to create temp dir");
        std::fs::write(dir.path().join("garbage.data"), b"").unwrap();

        match list_segment_ids(dir.path()) {
            Err(Error::InvalidFilename(name)) => assert!(name.contains("garbage.data")),
            other => panic!("expected InvalidFilename, got {other:?}"),
        }
    }

    #[test]
    fn test_create_rejects_existing() {
        let dir = TempDir::new().expect("failed to create temp dir");
        create(dir.path(), 7).expect("first create failed");
        assert!(create(dir.path(), 7).is_err());
    }

    #[test]
    fn test_remap_sees_growth() {
        let dir = TempDir::new().expect("failed to create temp dir");
        let (mut data, _hint) = create(dir.path(), 1).expect("create failed");

        let mut segment = Segment::open(dir.path(), 1).expect("open failed");
        assert!(segment.is_empty());
        assert_eq!(segment.bytes(), b"");

        data.write_all(b"hello").unwrap();
        segment.remap().expect("remap failed");
        assert_eq!(segment.len(), 5);
        assert_eq!(segment.bytes(), b"hello");

        data.write_all(b" world").unwrap();
        segment.remap().expect("remap failed");
        assert_eq!(segment.bytes(), b"hello world");
    }

    #[test]
    fn test_remap_noop_when_unchanged() {
        let dir = TempDir::new().expect("failed to create temp dir");
        let (mut data, _hint) = create(dir.path(), 1).expect("create failed");
        data.write_all(b"abc").unwrap();

        let mut segment = Segment::open(dir.path(), 1).expect("open failed");
        let before = segment.bytes().as_ptr();
        segment.remap().expect("remap failed");
        assert_eq!(segment.bytes().as_ptr(), before);
    }
}
