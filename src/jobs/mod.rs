//! Asynchronous job system: a priority-queued worker pool with explicit
//! job-to-job dependencies (`spec.md` §4.5).

pub mod job;
pub mod system;

pub use job::{JobCallback, JobContext, JobDesc, JobFn, JobHandle, Priority, SlotState};
pub use system::JobSystem;
