//! The storage engine.
//!
//! # Data Flow
//!
//! ```text
//!            Put / Delete                         Get
//!                 │                                │
//!                 ▼                                ▼
//!          ┌─────────────┐                  ┌─────────────┐
//!          │ record codec│                  │   keydir    │
//!          └──────┬──────┘                  └──────┬──────┘
//!                 ▼                                ▼
//!          ┌─────────────┐    remap        ┌─────────────┐
//!          │   active    │───────────────► │ mmap slice  │
//!          │  segment    │                 │  (copy out) │
//!          └──────┬──────┘                 └─────────────┘
//!                 ▼
//!          ┌─────────────┐
//!          │keydir update│
//!          └─────────────┘
//! ```
//!
//! Every write appends a record to the active segment and a matching entry
//! to its hint file, then updates the keydir and remaps the active segment
//! so readers observe the new bytes. Reads resolve the keydir entry and
//! slice the value straight out of the owning segment's read-only map.
//!
//! On open, [`recovery`] replays hint files (rebuilding missing ones from
//! the data files) in ascending segment order to reconstruct the keydir. A
//! background task rewrites live entries out of old segments on a timer and
//! unlinks what they leave behind ([`merge`]).
//!
//! One reader-writer lock protects the keydir, the segment table, and the
//! active file: writes, merge, snapshot, and close are exclusive; gets and
//! iterator construction are shared.

pub mod iterator;
mod merge;
mod recovery;
mod state;
#[allow(clippy::module_inception)]
mod store;
mod tasks;

pub use iterator::Iter;
pub use store::EmberDb;
