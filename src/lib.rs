//! EmberDB: an embeddable, single-writer, log-structured key-value store.
//!
//! All writes append to an active data file, an in-memory keydir maps every
//! live key to the byte range of its most recent value, and reads are
//! served through read-only memory maps. Durable point lookups stay cheap
//! as long as the key set fits in RAM; values live on disk.
//!
//! ```no_run
//! use emberdb::EmberDb;
//!
//! # #[tokio::main]
//! # async fn main() -> emberdb::Result<()> {
//! let db = EmberDb::open("./data")?;
//! db.put(b"name", b"ember")?;
//! assert_eq!(db.get(b"name")?, b"ember");
//! db.close().await?;
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod error;
pub mod keydir;
pub mod record;
pub mod scheduler;
pub mod segment;
pub mod store;

pub use config::Config;
pub use error::{Error, Result};
pub use store::{EmberDb, Iter};
