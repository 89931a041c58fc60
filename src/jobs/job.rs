//! Job slot fields and the generation-checked handle that addresses one
//! (`spec.md` §3, "Job").

use crate::memory::Allocator;

/// `{id:32, generation:32}`. A `wait()` on a handle whose slot has already
/// recycled (generation no longer matches) returns immediately.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct JobHandle {
    pub id: u32,
    pub generation: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Priority {
    Low,
    Normal,
    High,
}

impl Priority {
    pub const ALL_HIGH_TO_LOW: [Priority; 3] = [Priority::High, Priority::Normal, Priority::Low];

    pub(crate) fn index(self) -> usize {
        match self {
            Priority::Low => 0,
            Priority::Normal => 1,
            Priority::High => 2,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SlotState {
    Free,
    Pending,
    Queued,
    Running,
    Completed,
}

/// The callback a job body executes in. Carries the worker's scratch
/// allocator, scoped to this job's execution only.
pub struct JobContext<'a> {
    pub scratch: &'a mut Allocator,
}

pub type JobFn = fn(&mut JobContext, &[u8]) -> bool;
pub type JobCallback = fn(JobHandle, usize);

/// Parameters for `JobSystem::submit`/`try_submit`.
pub struct JobDesc {
    pub priority: Priority,
    pub type_mask: u32,
    pub run: JobFn,
    pub on_success: Option<JobCallback>,
    pub on_failure: Option<JobCallback>,
    pub user_data: usize,
    pub payload: Option<Vec<u8>>,
    pub dependencies: Vec<JobHandle>,
    pub defer_enqueue: bool,
}

impl JobDesc {
    pub fn new(run: JobFn) -> Self {
        Self {
            priority: Priority::Normal,
            type_mask: u32::MAX,
            run,
            on_success: None,
            on_failure: None,
            user_data: 0,
            payload: None,
            dependencies: Vec::new(),
            defer_enqueue: false,
        }
    }
}

pub(crate) struct JobSlot {
    pub state: SlotState,
    pub generation: u32,
    pub priority: Priority,
    pub type_mask: u32,
    pub run: Option<JobFn>,
    pub on_success: Option<JobCallback>,
    pub on_failure: Option<JobCallback>,
    pub user_data: usize,
    pub payload: Vec<u8>,
    pub remaining_dependencies: u32,
    pub dependents: Vec<JobHandle>,
}

impl JobSlot {
    pub fn free(generation: u32) -> Self {
        Self {
            state: SlotState::Free,
            generation,
            priority: Priority::Normal,
            type_mask: 0,
            run: None,
            on_success: None,
            on_failure: None,
            user_data: 0,
            payload: Vec::new(),
            remaining_dependencies: 0,
            dependents: Vec::new(),
        }
    }

    pub fn reset_to_free(&mut self) {
        self.state = SlotState::Free;
        self.priority = Priority::Normal;
        self.type_mask = 0;
        self.run = None;
        self.on_success = None;
        self.on_failure = None;
        self.user_data = 0;
        self.payload.clear();
        self.remaining_dependencies = 0;
        self.dependents.clear();
    }
}
