use std::collections::HashMap;

/// Location of the most recent value for a key.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Entry {
    /// Segment file holding the value.
    pub file_id: u64,
    /// Stored value length in bytes (compressed length when compression is
    /// enabled).
    pub value_size: u32,
    /// Offset of the first value byte within the data file, past the record
    /// header and key.
    pub value_offset: u64,
    /// Write timestamp in nanoseconds.
    pub timestamp: i64,
}

/// In-memory index from key to the on-disk location of its latest value.
/// Unordered; only the most recent write per key is retained. Deleted keys
/// are absent.
#[derive(Debug, Default)]
pub struct Keydir {
    entries: HashMap<Vec<u8>, Entry>,
}

impl Keydir {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, key: &[u8]) -> Option<&Entry> {
        self.entries.get(key)
    }

    pub fn put(&mut self, key: Vec<u8>, entry: Entry) {
        self.entries.insert(key, entry);
    }

    pub fn delete(&mut self, key: &[u8]) {
        self.entries.remove(key);
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn contains(&self, key: &[u8]) -> bool {
        self.entries.contains_key(key)
    }

    /// Snapshot copy of the current key set, in arbitrary order.
    pub fn keys(&self) -> Vec<Vec<u8>> {
        self.entries.keys().cloned().collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&Vec<u8>, &Entry)> {
        self.entries.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(file_id: u64, value_offset: u64) -> Entry {
        Entry {
            file_id,
            value_size: 5,
            value_offset,
            timestamp: 1,
        }
    }

    #[test]
    fn test_put_get_delete() {
        let mut keydir = Keydir::new();
        assert!(keydir.is_empty());
        assert!(keydir.get(b"k").is_none());

        keydir.put(b"k".to_vec(), entry(1, 20));
        assert_eq!(keydir.len(), 1);
        assert!(keydir.contains(b"k"));
        assert_eq!(keydir.get(b"k"), Some(&entry(1, 20)));

        keydir.delete(b"k");
        assert!(keydir.get(b"k").is_none());
        assert!(keydir.is_empty());
    }

    #[test]
    fn test_latest_write_wins() {
        let mut keydir = Keydir::new();
        keydir.put(b"k".to_vec(), entry(1, 20));
        keydir.put(b"k".to_vec(), entry(2, 64));

        assert_eq!(keydir.len(), 1);
        assert_eq!(keydir.get(b"k").unwrap().file_id, 2);
        assert_eq!(keydir.get(b"k").unwrap().value_offset, 64);
    }

    #[test]
    fn test_keys_snapshot() {
        let mut keydir = Keydir::new();
        keydir.put(b"a".to_vec(), entry(1, 20));
        keydir.put(b"b".to_vec(), entry(1, 45));

        let mut keys = keydir.keys();
        keys.sort();
        assert_eq!(keys, vec![b"a".to_vec(), b"b".to_vec()]);

        // The snapshot is a copy: later mutations don't affect it.
        keydir.delete(b"a");
        assert_eq!(keys.len(), 2);
    }
}
