use std::collections::HashMap;
use std::fs;
use std::io::{Read, Write};
use std::path::{Path, PathBuf};
use std::sync::{Arc, RwLock};

use flate2::read::ZlibDecoder;
use flate2::write::ZlibEncoder;
use flate2::Compression;

use crate::config::Config;
use crate::error::{Error, Result};
use crate::scheduler::Scheduler;
use crate::segment;

use super::iterator::Iter;
use super::merge;
use super::recovery;
use super::state::{now_nanos, Lookup, State};
use super::tasks::MergeTask;

/// State and configuration shared between the engine handle, its iterators,
/// and the background merge task.
pub(crate) struct Shared {
    pub config: Config,
    pub state: RwLock<State>,
}

impl Shared {
    pub fn get(&self, key: &[u8]) -> Result<Vec<u8>> {
        let stored = self.get_stored(key)?;
        self.maybe_decompress(stored)
    }

    fn get_stored(&self, key: &[u8]) -> Result<Vec<u8>> {
        {
            let state = self.state.read()?;
            if let Lookup::Value(value) = state.get(key)? {
                return Ok(value);
            }
        }
        // The owning segment has no mapping yet; establishing one needs the
        // exclusive lock.
        let mut state = self.state.write()?;
        state.fetch(&self.config, key)
    }

    fn maybe_decompress(&self, stored: Vec<u8>) -> Result<Vec<u8>> {
        if self.config.compress_data {
            decompress(&stored)
        } else {
            Ok(stored)
        }
    }

    fn store_value<'a>(&self, value: &'a [u8]) -> Result<std::borrow::Cow<'a, [u8]>> {
        if self.config.compress_data {
            Ok(std::borrow::Cow::Owned(compress(value)?))
        } else {
            Ok(std::borrow::Cow::Borrowed(value))
        }
    }
}

fn compress(value: &[u8]) -> Result<Vec<u8>> {
    let mut encoder = ZlibEncoder::new(Vec::new(), Compression::default());
    encoder.write_all(value)?;
    Ok(encoder.finish()?)
}

fn decompress(stored: &[u8]) -> Result<Vec<u8>> {
    let mut value = Vec::new();
    ZlibDecoder::new(stored).read_to_end(&mut value)?;
    Ok(value)
}

/// An EmberDB instance: a single directory of append-only segment files
/// indexed by an in-memory keydir.
///
/// Cheap point lookups are served from read-only memory maps; all writes
/// append to the active segment. Many readers may operate concurrently with
/// the single writer. A background task merges dead bytes out of old
/// segments on a timer, so [`EmberDb::open`] must be called within a Tokio
/// runtime and [`EmberDb::close`] stops the task again.
pub struct EmberDb {
    shared: Arc<Shared>,
    scheduler: Scheduler,
}

impl EmberDb {
    /// Open a database directory with default configuration
    pub fn open(dir: impl Into<PathBuf>) -> Result<Self> {
        Self::open_with_config(Config::new(dir))
    }

    /// Open a database directory with custom configuration
    pub fn open_with_config(config: Config) -> Result<Self> {
        fs::create_dir_all(&config.dir)?;

        let state = recovery::recover_state(&config)?;
        let shared = Arc::new(Shared {
            config,
            state: RwLock::new(state),
        });

        let scheduler = Scheduler::new();
        scheduler.register(Arc::new(MergeTask::new(shared.clone())));

        Ok(Self { shared, scheduler })
    }

    /// The database directory.
    pub fn path(&self) -> &Path {
        &self.shared.config.dir
    }

    /// Inserts or overwrites a key-value pair.
    pub fn put(&self, key: &[u8], value: &[u8]) -> Result<()> {
        let stored = self.shared.store_value(value)?;
        let mut state = self.shared.state.write()?;
        state.append(&self.shared.config, key, Some(&stored[..]), now_nanos())
    }

    /// Retrieves the value associated with a key.
    pub fn get(&self, key: &[u8]) -> Result<Vec<u8>> {
        self.shared.get(key)
    }

    /// Removes a key by appending a tombstone record.
    pub fn delete(&self, key: &[u8]) -> Result<()> {
        let mut state = self.shared.state.write()?;
        state.append(&self.shared.config, key, None, now_nanos())
    }

    /// Inserts multiple pairs under a single exclusive-lock acquisition.
    pub fn batch_put(&self, pairs: HashMap<Vec<u8>, Vec<u8>>) -> Result<()> {
        let mut state = self.shared.state.write()?;
        for (key, value) in pairs {
            let stored = self.shared.store_value(&value)?;
            state.append(&self.shared.config, &key, Some(&stored[..]), now_nanos())?;
        }
        Ok(())
    }

    /// Retrieves multiple keys. Missing keys are silently omitted from the
    /// result; any other error aborts the batch.
    pub fn batch_get(&self, keys: &[Vec<u8>]) -> Result<HashMap<Vec<u8>, Vec<u8>>> {
        let mut result = HashMap::new();
        let mut cold = Vec::new();

        {
            let state = self.shared.state.read()?;
            for key in keys {
                match state.get(key) {
                    Ok(Lookup::Value(stored)) => {
                        result.insert(key.clone(), self.shared.maybe_decompress(stored)?);
                    }
                    Ok(Lookup::Unmapped(_)) => cold.push(key.clone()),
                    Err(Error::KeyNotFound) => {}
                    Err(e) => return Err(e),
                }
            }
        }

        // Keys living in still-unmapped segments need the exclusive lock.
        if !cold.is_empty() {
            let mut state = self.shared.state.write()?;
            for key in cold {
                match state.fetch(&self.shared.config, &key) {
                    Ok(stored) => {
                        result.insert(key, self.shared.maybe_decompress(stored)?);
                    }
                    Err(Error::KeyNotFound) => {}
                    Err(e) => return Err(e),
                }
            }
        }

        Ok(result)
    }

    /// Iterator over a snapshot of the current key set.
    pub fn iter(&self) -> Result<Iter> {
        let keys = self.shared.state.read()?.keydir.keys();
        Ok(Iter::new(self.shared.clone(), keys))
    }

    /// Number of live keys.
    pub fn len(&self) -> Result<usize> {
        Ok(self.shared.state.read()?.keydir.len())
    }

    pub fn is_empty(&self) -> Result<bool> {
        Ok(self.shared.state.read()?.keydir.is_empty())
    }

    /// Whether the key is present, without touching its value.
    pub fn contains(&self, key: &[u8]) -> Result<bool> {
        Ok(self.shared.state.read()?.keydir.contains(key))
    }

    /// Copies every segment's data and hint files into `target_dir`,
    /// producing a byte-for-byte restorable directory. Holds the exclusive
    /// lock so the file set cannot change underneath the copy.
    pub fn snapshot(&self, target_dir: impl AsRef<Path>) -> Result<()> {
        let target = target_dir.as_ref();
        let _state = self.shared.state.write()?;

        fs::create_dir_all(target)?;
        for id in segment::list_segment_ids(&self.shared.config.dir)? {
            fs::copy(
                segment::data_path(&self.shared.config.dir, id),
                segment::data_path(target, id),
            )?;
            let hint = segment::hint_path(&self.shared.config.dir, id);
            if hint.exists() {
                fs::copy(hint, segment::hint_path(target, id))?;
            }
        }
        Ok(())
    }

    /// Runs the merge routine the background timer fires, immediately.
    /// A no-op unless at least `merge_threshold` data files exist.
    pub fn merge(&self) -> Result<()> {
        merge::merge(&self.shared)
    }

    /// Stops the background merge task, syncs the active segment, and
    /// unmaps everything.
    pub async fn close(self) -> Result<()> {
        self.scheduler.shutdown().await?;

        let mut state = self.shared.state.write()?;
        state.active.data.sync_all()?;
        state.active.hint.sync_all()?;
        state.segments.clear();
        Ok(())
    }
}
