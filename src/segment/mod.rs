//! Segment Module
//!
//! Durable, offset-addressable append log split into segment files.
//!
//! ## Responsibilities
//! - One active segment accepting appends, any number of sealed ones
//! - Size-based rotation (checked on write, so one append may overshoot)
//! - One cached random-access handle per segment path
//! - Value reads served by a worker pool
//!
//! ## Directory Layout
//! ```text
//! {storage_dir}/
//!   ├── segment_1700000000000          (sealed)
//!   ├── segment_1700000004211          (sealed)
//!   ├── segment_1700000009876          (active)
//!   ├── segment_1700000004211.compact  (merge in progress)
//!   ├── merge.manifest                 (merge committed, swap pending)
//!   └── index.db
//! ```

mod handle;
mod naming;
mod store;
mod writer;

pub use handle::SegmentHandle;
pub use naming::{
    compaction_path, is_compaction_file, list_segments, parse_segment_timestamp,
    segment_file_name, segment_name, COMPACTION_SUFFIX, SEGMENT_PREFIX,
};
pub use store::{AppendResult, SegmentStore};
pub use writer::SegmentWriter;
