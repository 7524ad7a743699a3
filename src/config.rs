use std::path::PathBuf;
use std::time::Duration;

/// Default maximum size of a data file before rotation.
pub const DEFAULT_MAX_FILE_SIZE: u64 = 1020 * 1024 * 10;

/// Configuration for an EmberDB instance.
#[derive(Debug, Clone)]
pub struct Config {
    /// Directory path for the database
    pub dir: PathBuf,

    /// The active segment is rotated before its size would exceed this
    /// (default: 10,444,800 bytes)
    pub max_file_size: u64,

    /// Merge is a no-op unless at least this many data files exist
    /// (default: 10)
    pub merge_threshold: usize,

    /// Fsync the active file after every append (default: false)
    pub sync_writes: bool,

    /// Compress values with zlib on write, decompress on read
    /// (default: false)
    pub compress_data: bool,

    /// Period of the background merge timer (default: 10 minutes)
    pub merge_interval: Duration,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            dir: PathBuf::from("./emberdb"),
            max_file_size: DEFAULT_MAX_FILE_SIZE,
            merge_threshold: 10,
            sync_writes: false,
            compress_data: false,
            merge_interval: Duration::from_secs(600),
        }
    }
}

impl Config {
    /// Create a new config with the given directory
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            ..Default::default()
        }
    }

    /// Set the maximum data file size
    pub fn max_file_size(mut self, size: u64) -> Self {
        self.max_file_size = size;
        self
    }

    /// Set the merge threshold
    pub fn merge_threshold(mut self, threshold: usize) -> Self {
        self.merge_threshold = threshold;
        self
    }

    /// Fsync after every append
    pub fn sync_writes(mut self, sync: bool) -> Self {
        self.sync_writes = sync;
        self
    }

    /// Compress values with zlib
    pub fn compress_data(mut self, compress: bool) -> Self {
        self.compress_data = compress;
        self
    }

    /// Set the background merge interval
    pub fn merge_interval(mut self, interval: Duration) -> Self {
        self.merge_interval = interval;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.dir, PathBuf::from("./emberdb"));
        assert_eq!(config.max_file_size, 10_444_800);
        assert_eq!(config.merge_threshold, 10);
        assert!(!config.sync_writes);
        assert!(!config.compress_data);
        assert_eq!(config.merge_interval, Duration::from_secs(600));
    }

    #[test]
    fn test_config_builder() {
        let config = Config::new("/tmp/test")
            .max_file_size(1024)
            .merge_threshold(2)
            .sync_writes(true)
            .compress_data(true)
            .merge_interval(Duration::from_millis(100));

        assert_eq!(config.dir, PathBuf::from("/tmp/test"));
        assert_eq!(config.max_file_size, 1024);
        assert_eq!(config.merge_threshold, 2);
        assert!(config.sync_writes);
        assert!(config.compress_data);
        assert_eq!(config.merge_interval, Duration::from_millis(100));
    }
}
