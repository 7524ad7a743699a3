use std::collections::HashMap;
use std::fs::File;
use std::io::{BufReader, Read, Write};
use std::path::Path;

use crate::config::Config;
use crate::error::Result;
use crate::keydir::{Entry, Keydir};
use crate::record::{self, HintEntry, RecordHeader, HEADER_SIZE, HINT_HEADER_SIZE};
use crate::segment::{self, Segment};

use super::state::{now_nanos, ActiveFile, State};

/// Working index during replay, newest timestamp winning.
///
/// Two things keep this from being the keydir itself. Segment ids mostly
/// replay oldest-first, but a merge output carries a newer id than the
/// active segment while holding older records, so id order alone would let
/// a stale merged entry clobber a fresh write; entries are only replaced by
/// equal-or-newer timestamps. And a deletion must be remembered until the
/// whole replay is done, or an older record replayed later would resurrect
/// the key.
#[derive(Default)]
struct ReplayIndex {
    entries: HashMap<Vec<u8>, (i64, Option<Entry>)>,
}

impl ReplayIndex {
    fn apply(&mut self, key: Vec<u8>, hint: &HintEntry) {
        if let Some((timestamp, _)) = self.entries.get(&key) {
            if *timestamp > hint.timestamp {
                return;
            }
        }

        let entry = if hint.is_tombstone() {
            None
        } else {
            Some(Entry {
                file_id: hint.file_id,
                value_size: hint.value_size,
                value_offset: hint.value_offset,
                timestamp: hint.timestamp,
            })
        };
        self.entries.insert(key, (hint.timestamp, entry));
    }

    fn into_keydir(self) -> Keydir {
        let mut keydir = Keydir::new();
        for (key, (_, entry)) in self.entries {
            if let Some(entry) = entry {
                keydir.put(key, entry);
            }
        }
        keydir
    }
}

/// Rebuilds the engine state from the files in the database directory.
///
/// Segments are replayed in ascending id order. Each segment's hint file is
/// preferred; a missing hint is regenerated by scanning the data file. The
/// largest id becomes the active segment; if the directory is empty a fresh
/// one is created. Only the active segment is mapped here; older segments
/// are mapped lazily on first read.
pub(crate) fn recover_state(config: &Config) -> Result<State> {
    let dir = &config.dir;
    let ids = segment::list_segment_ids(dir)?;
    let mut index = ReplayIndex::default();

    for &id in &ids {
        if segment::hint_path(dir, id).exists() {
            load_hint(dir, id, &mut index)?;
        } else {
            tracing::warn!(file_id = id, "Hint file missing, rebuilding from data file");
            rebuild_hint(dir, id, &mut index)?;
        }
    }
    let keydir = index.into_keydir();

    let (active, last_file_id) = match ids.last().copied() {
        Some(id) => {
            let (data, hint) = segment::open_append(dir, id)?;
            let size = data.metadata()?.len();
            (
                ActiveFile {
                    file_id: id,
                    data,
                    hint,
                    size,
                },
                id,
            )
        }
        None => {
            let id = now_nanos() as u64;
            let (data, hint) = segment::create(dir, id)?;
            (
                ActiveFile {
                    file_id: id,
                    data,
                    hint,
                    size: 0,
                },
                id,
            )
        }
    };

    let mut segments = HashMap::new();
    segments.insert(active.file_id, Segment::open(dir, active.file_id)?);

    tracing::info!(
        segments = ids.len().max(1),
        keys = keydir.len(),
        active = active.file_id,
        "Recovery complete"
    );

    Ok(State::new(keydir, segments, active, last_file_id))
}

/// Replays one hint file. A truncated tail ends the replay.
fn load_hint(dir: &Path, file_id: u64, index: &mut ReplayIndex) -> Result<()> {
    let data_len = std::fs::metadata(segment::data_path(dir, file_id))?.len();
    let file = File::open(segment::hint_path(dir, file_id))?;
    let mut reader = BufReader::new(file);

    loop {
        let mut fixed = [0u8; HINT_HEADER_SIZE];
        match reader.read_exact(&mut fixed) {
            Ok(()) => {}
            Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => break,
            Err(e) => return Err(e.into()),
        }
        let hint = HintEntry::decode(&fixed)?;

        // A key longer than the whole data file can only be garbage.
        if hint.key_size as u64 > data_len {
            tracing::warn!(file_id, "Hint entry out of range, treating tail as truncated");
            break;
        }

        let mut key = vec![0u8; hint.key_size as usize];
        match reader.read_exact(&mut key) {
            Ok(()) => {}
            Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => {
                tracing::warn!(file_id, "Hint file ends mid-entry, treating tail as truncated");
                break;
            }
            Err(e) => return Err(e.into()),
        }

        index.apply(key, &hint);
    }

    Ok(())
}

/// Linear scan of a data file that restores both the replay index and the
/// hint file. Every record is checksummed; the first mismatch or short
/// read stops the scan and the remainder is treated as truncated. The file
/// on disk is never truncated.
fn rebuild_hint(dir: &Path, file_id: u64, index: &mut ReplayIndex) -> Result<()> {
    let file = File::open(segment::data_path(dir, file_id))?;
    let data_len = file.metadata()?.len();
    let mut reader = BufReader::new(file);

    let mut hint_bytes = Vec::new();
    let mut offset: u64 = 0;

    loop {
        let mut header_buf = [0u8; HEADER_SIZE];
        match reader.read_exact(&mut header_buf) {
            Ok(()) => {}
            Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => break,
            Err(e) => return Err(e.into()),
        }
        let header = RecordHeader::decode(&header_buf)?;

        let record_end =
            offset + (HEADER_SIZE + header.key_size as usize + header.value_len()) as u64;
        if record_end > data_len {
            tracing::warn!(
                file_id,
                offset,
                "Record extends past end of file, treating tail as truncated"
            );
            break;
        }

        let mut key = vec![0u8; header.key_size as usize];
        reader.read_exact(&mut key)?;
        let mut value = vec![0u8; header.value_len()];
        reader.read_exact(&mut value)?;

        if record::checksum(&key, &value) != header.crc {
            tracing::warn!(
                file_id,
                offset,
                "Checksum mismatch, treating remainder of segment as truncated"
            );
            break;
        }

        let hint = HintEntry {
            key_size: header.key_size,
            value_size: header.value_size,
            value_offset: offset + (HEADER_SIZE + key.len()) as u64,
            timestamp: header.timestamp,
            file_id,
        };
        hint_bytes.extend_from_slice(&hint.encode(&key));
        index.apply(key, &hint);
        offset = record_end;
    }

    let mut hint_file = File::create(segment::hint_path(dir, file_id))?;
    hint_file.write_all(&hint_bytes)?;
    hint_file.sync_all()?;
    Ok(())
}
