use std::io::Write;

use crate::error::Result;
use crate::keydir::Entry;
use crate::record::{self, HintEntry, HEADER_SIZE};
use crate::segment::{self, Segment};

use super::store::Shared;

/// Rewrites all live entries that reside outside the active segment into
/// one fresh segment, then unlinks the superseded segments and their hint
/// files.
///
/// Runs entirely under the exclusive lock, so no writer can append to the
/// old segments while they are being copied. The merged segment is synced
/// to disk before anything is unlinked. Stored bytes are copied verbatim
/// (compressed values stay compressed) and keep their first-write timestamps.
/// Superseded writes and tombstones are not in the keydir and are therefore
/// left behind, which is what reclaims the dead bytes.
pub(crate) fn merge(shared: &Shared) -> Result<()> {
    let mut state = shared.state.write()?;
    let dir = &shared.config.dir;

    let ids = segment::list_segment_ids(dir)?;
    if ids.len() < shared.config.merge_threshold {
        return Ok(());
    }

    let merged_id = state.next_file_id();
    let (mut data, mut hint) = segment::create(dir, merged_id)?;
    tracing::info!(
        merged_id,
        segments = ids.len(),
        "Merging segments into new file"
    );

    let mut offset: u64 = 0;
    let mut moved: usize = 0;
    for key in state.keydir.keys() {
        let entry = match state.keydir.get(&key) {
            Some(entry) => *entry,
            None => continue,
        };
        if entry.file_id == state.active.file_id {
            continue;
        }

        let value = state.fetch(&shared.config, &key)?;
        let record = record::encode_record(&key, Some(&value), entry.timestamp);
        data.write_all(&record)?;

        let value_offset = offset + (HEADER_SIZE + key.len()) as u64;
        let hint_entry = HintEntry {
            key_size: key.len() as u32,
            value_size: value.len() as u32,
            value_offset,
            timestamp: entry.timestamp,
            file_id: merged_id,
        };
        hint.write_all(&hint_entry.encode(&key))?;

        state.keydir.put(
            key,
            Entry {
                file_id: merged_id,
                value_size: value.len() as u32,
                value_offset,
                timestamp: entry.timestamp,
            },
        );
        offset += record.len() as u64;
        moved += 1;
    }

    // The merged segment must be durable before the old ones disappear.
    data.sync_all()?;
    hint.sync_all()?;
    state
        .segments
        .insert(merged_id, Segment::open(dir, merged_id)?);

    let mut removed = 0;
    for id in ids {
        if id == state.active.file_id {
            continue;
        }
        state.segments.remove(&id);
        std::fs::remove_file(segment::data_path(dir, id))?;
        let hint_path = segment::hint_path(dir, id);
        if hint_path.exists() {
            std::fs::remove_file(hint_path)?;
        }
        removed += 1;
    }

    tracing::info!(merged_id, moved, removed, "Merge complete");
    Ok(())
}
