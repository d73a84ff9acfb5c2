//! 参照動画からの参照シグネチャ構築

pub mod builder;
pub mod job;
pub mod meta;
pub mod state;

pub use builder::{BuildOutcome, Reference, ReferenceBuilder, ReferenceSignature};
pub use job::{ReferenceJob, ReferenceSlot};
pub use meta::{count_dips, ReferenceMeta};
pub use state::{BuildState, BuildStatus, CancelToken, ProgressThrottle};
