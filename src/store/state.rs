use std::collections::HashMap;
use std::fs::File;
use std::io::Write;
use std::time::{SystemTime, UNIX_EPOCH};

use crate::config::Config;
use crate::corruption;
use crate::error::{Error, Result};
use crate::keydir::{Entry, Keydir};
use crate::record::{self, HintEntry, HEADER_SIZE, TOMBSTONE};
use crate::segment::{self, Segment};

/// Wall-clock nanoseconds since the Unix epoch.
pub(crate) fn now_nanos() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .expect("system time before Unix epoch")
        .as_nanos() as i64
}

/// The one segment open for appends.
pub(crate) struct ActiveFile {
    pub file_id: u64,
    pub data: File,
    pub hint: File,
    /// Current data file size; the next record starts here.
    pub size: u64,
}

/// Result of an index lookup under the shared lock.
#[derive(Debug)]
pub(crate) enum Lookup {
    /// The stored bytes, copied out of the mapped region.
    Value(Vec<u8>),
    /// The owning segment has no mapping yet; the caller must retry with
    /// the exclusive lock so one can be established.
    Unmapped(u64),
}

/// All mutable engine state, protected by one reader-writer lock: the
/// keydir, the segment table, and the active file.
pub(crate) struct State {
    pub keydir: Keydir,
    pub segments: HashMap<u64, Segment>,
    pub active: ActiveFile,
    last_file_id: u64,
}

impl State {
    pub fn new(
        keydir: Keydir,
        segments: HashMap<u64, Segment>,
        active: ActiveFile,
        last_file_id: u64,
    ) -> Self {
        Self {
            keydir,
            segments,
            active,
            last_file_id,
        }
    }

    /// Allocates a fresh segment id. Ids are drawn from the wall clock but
    /// bumped past the previous id whenever the clock repeats or runs
    /// backwards, so they are strictly increasing.
    pub fn next_file_id(&mut self) -> u64 {
        let mut id = now_nanos() as u64;
        if id <= self.last_file_id {
            id = self.last_file_id + 1;
        }
        self.last_file_id = id;
        id
    }

    /// Closes the current active segment and opens a new one with a fresh
    /// id. The retired segment stays mapped and becomes immutable.
    pub fn rotate(&mut self, config: &Config) -> Result<()> {
        let file_id = self.next_file_id();
        let (data, hint) = segment::create(&config.dir, file_id)?;

        tracing::debug!(
            retired = self.active.file_id,
            active = file_id,
            "Rotating active segment"
        );

        self.active = ActiveFile {
            file_id,
            data,
            hint,
            size: 0,
        };
        self.segments
            .insert(file_id, Segment::open(&config.dir, file_id)?);
        Ok(())
    }

    /// Appends one record (`None` value for a tombstone) plus its hint
    /// entry, updates the keydir, and remaps the active segment so readers
    /// see the new bytes before the exclusive lock is released.
    pub fn append(
        &mut self,
        config: &Config,
        key: &[u8],
        value: Option<&[u8]>,
        timestamp: i64,
    ) -> Result<()> {
        let record = record::encode_record(key, value, timestamp);
        if self.active.size + record.len() as u64 > config.max_file_size {
            self.rotate(config)?;
        }

        let record_start = self.active.size;
        self.active.data.write_all(&record)?;
        if config.sync_writes {
            self.active.data.sync_all()?;
        }

        let value_offset = record_start + (HEADER_SIZE + key.len()) as u64;
        let hint = HintEntry {
            key_size: key.len() as u32,
            value_size: match value {
                Some(v) => v.len() as u32,
                None => TOMBSTONE,
            },
            value_offset,
            timestamp,
            file_id: self.active.file_id,
        };
        self.active.hint.write_all(&hint.encode(key))?;
        self.active.size += record.len() as u64;

        match value {
            Some(v) => self.keydir.put(
                key.to_vec(),
                Entry {
                    file_id: self.active.file_id,
                    value_size: v.len() as u32,
                    value_offset,
                    timestamp,
                },
            ),
            None => self.keydir.delete(key),
        }

        self.remap_active()
    }

    fn remap_active(&mut self) -> Result<()> {
        match self.segments.get_mut(&self.active.file_id) {
            Some(segment) => segment.remap(),
            None => Err(corruption!(
                "active segment {} missing from segment table",
                self.active.file_id
            )),
        }
    }

    /// Looks up a key under the shared lock. Returns `Unmapped` when the
    /// owning segment has not been mapped yet.
    pub fn get(&self, key: &[u8]) -> Result<Lookup> {
        let entry = self.keydir.get(key).ok_or(Error::KeyNotFound)?;
        match self.segments.get(&entry.file_id) {
            Some(segment) => Ok(Lookup::Value(slice_value(segment, entry)?.to_vec())),
            None => Ok(Lookup::Unmapped(entry.file_id)),
        }
    }

    /// Looks up a key, mapping its segment first if needed. Requires the
    /// exclusive lock.
    pub fn fetch(&mut self, config: &Config, key: &[u8]) -> Result<Vec<u8>> {
        let entry = *self.keydir.get(key).ok_or(Error::KeyNotFound)?;
        self.ensure_mapped(config, entry.file_id)?;

        let segment = self
            .segments
            .get(&entry.file_id)
            .ok_or_else(|| corruption!("segment {} missing after mapping", entry.file_id))?;
        Ok(slice_value(segment, &entry)?.to_vec())
    }

    /// Maps a segment into the table if it is not there yet.
    pub fn ensure_mapped(&mut self, config: &Config, file_id: u64) -> Result<()> {
        if !self.segments.contains_key(&file_id) {
            self.segments
                .insert(file_id, Segment::open(&config.dir, file_id)?);
        }
        Ok(())
    }
}

/// Bounds-checked slice of the value bytes out of a mapped segment.
fn slice_value<'a>(segment: &'a Segment, entry: &Entry) -> Result<&'a [u8]> {
    let start = entry.value_offset;
    let end = start + entry.value_size as u64;
    if end > segment.len() {
        return Err(corruption!(
            "value range {start}..{end} out of bounds for segment {} of {} bytes",
            segment.file_id,
            segment.len()
        ));
    }
    Ok(&segment.bytes()[start as usize..end as usize])
}
