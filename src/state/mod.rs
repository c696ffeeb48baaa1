pub mod account;
pub mod classify;
pub mod merge;

pub use account::{Accountant, Applied, CycleReport, FlowFilter};
pub use classify::{Classification, classify};
pub use merge::{FlowEvent, SnapshotDiff, diff};
