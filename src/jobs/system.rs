//! Worker pool with priority queues, a dependency graph, and per-worker
//! scratch allocators (`spec.md` §4.5).
//!
//! Grounded on the reference engine's `TextureAsyncManager` (an `mpsc`
//! channel-backed pool of decode threads) generalized from "one queue, any
//! worker" to full priority queues plus dependency counting, per the
//! dependency-bookkeeping pattern in `bevy_ecs`'s parallel stage executor
//! (`dependants`/`dependencies_total` vectors).

use std::sync::{Arc, Condvar, Mutex};
use std::thread::{self, JoinHandle};

use crate::containers::Queue;
use crate::error::{EngineError, Result};
use crate::jobs::job::{JobContext, JobDesc, JobHandle, JobSlot, Priority, SlotState};
use crate::memory::{Allocator, ArenaFlags, MemoryTag};

const WORKER_SCRATCH_RESERVE: usize = 4 * 1024 * 1024;
const WORKER_SCRATCH_COMMIT: usize = 256 * 1024;

struct SharedState {
    slots: Vec<JobSlot>,
    free_stack: Vec<u32>,
    queues: [Queue<u32>; 3],
    running: bool,
}

fn try_dequeue(state: &mut SharedState, worker_type_mask: u32) -> Option<u32> {
    for &priority in Priority::ALL_HIGH_TO_LOW.iter() {
        let queue = &mut state.queues[priority.index()];
        let len = queue.len();
        for _ in 0..len {
            let idx = queue.dequeue().expect("len was just checked");
            let slot = &state.slots[idx as usize];
            if slot.remaining_dependencies > 0 || (slot.type_mask & worker_type_mask) == 0 {
                queue.enqueue(idx).expect("queue capacity bounded by max_jobs");
            } else {
                return Some(idx);
            }
        }
    }
    None
}

pub struct JobSystem {
    shared: Arc<Mutex<SharedState>>,
    work_available: Arc<Condvar>,
    slots_available: Arc<Condvar>,
    workers: Vec<JoinHandle<()>>,
}

impl JobSystem {
    /// Spawn `worker_count` workers, each able to run any job
    /// (`type_mask = u32::MAX`). Use [`JobSystem::with_worker_masks`] to
    /// give workers differentiated affinity.
    pub fn new(worker_count: usize, max_jobs: usize) -> Result<Self> {
        Self::with_worker_masks(&vec![u32::MAX; worker_count], max_jobs)
    }

    /// Spawn one worker per entry in `worker_masks`, each worker only
    /// dequeuing jobs whose `type_mask` shares a bit with its own
    /// (`spec.md` §4.5 dequeue policy step 2).
    pub fn with_worker_masks(worker_masks: &[u32], max_jobs: usize) -> Result<Self> {
        if worker_masks.is_empty() || max_jobs == 0 {
            log::warn!("job system rejected: worker_masks and max_jobs must be non-empty/non-zero");
            return Err(EngineError::InvalidParameter(
                "worker_masks must be non-empty and max_jobs must be non-zero".into(),
            ));
        }
        let slots = (0..max_jobs).map(|_| JobSlot::free(0)).collect();
        let free_stack = (0..max_jobs as u32).rev().collect();
        let queues = [
            Queue::new(max_jobs)?,
            Queue::new(max_jobs)?,
            Queue::new(max_jobs)?,
        ];
        let shared = Arc::new(Mutex::new(SharedState {
            slots,
            free_stack,
            queues,
            running: true,
        }));
        let work_available = Arc::new(Condvar::new());
        let slots_available = Arc::new(Condvar::new());

        let workers = worker_masks
            .iter()
            .map(|&worker_type_mask| {
                let shared = Arc::clone(&shared);
                let work_available = Arc::clone(&work_available);
                let slots_available = Arc::clone(&slots_available);
                thread::spawn(move || {
                    Self::worker_loop(shared, work_available, slots_available, worker_type_mask)
                })
            })
            .collect();

        Ok(Self {
            shared,
            work_available,
            slots_available,
            workers,
        })
    }

    fn worker_loop(
        shared: Arc<Mutex<SharedState>>,
        work_available: Arc<Condvar>,
        slots_available: Arc<Condvar>,
        worker_type_mask: u32,
    ) {
        let mut scratch = Allocator::arena(WORKER_SCRATCH_RESERVE, WORKER_SCRATCH_COMMIT, ArenaFlags::None)
            .expect("worker scratch arena allocation failed");

        loop {
            let mut guard = shared.lock().expect("job system mutex poisoned");
            let idx = loop {
                if let Some(idx) = try_dequeue(&mut guard, worker_type_mask) {
                    break Some(idx);
                }
                if !guard.running {
                    break None;
                }
                guard = work_available.wait(guard).expect("job system mutex poisoned");
            };
            let Some(idx) = idx else {
                return;
            };

            guard.slots[idx as usize].state = SlotState::Running;
            let run = guard.slots[idx as usize].run.expect("dequeued slot had a job");
            let payload = guard.slots[idx as usize].payload.clone();
            let handle = JobHandle {
                id: idx,
                generation: guard.slots[idx as usize].generation,
            };
            drop(guard);

            let scope = scratch.begin_scope();
            let mut ctx = JobContext { scratch: &mut scratch };
            let success = run(&mut ctx, &payload);
            scratch.end_scope(scope, MemoryTag::Job);

            let (dependents, on_success, on_failure, user_data) = {
                let mut guard = shared.lock().expect("job system mutex poisoned");
                let slot = &mut guard.slots[idx as usize];
                slot.state = SlotState::Completed;
                let dependents = slot.dependents.clone();
                let on_success = slot.on_success;
                let on_failure = slot.on_failure;
                let user_data = slot.user_data;

                let mut to_enqueue = Vec::new();
                for dep_handle in &dependents {
                    if let Some(dep_slot) = guard.slots.get_mut(dep_handle.id as usize) {
                        if dep_slot.generation == dep_handle.generation {
                            if dep_slot.remaining_dependencies > 0 {
                                dep_slot.remaining_dependencies -= 1;
                            }
                            if dep_slot.remaining_dependencies == 0 && dep_slot.state == SlotState::Pending {
                                dep_slot.state = SlotState::Queued;
                                to_enqueue.push((dep_slot.priority, dep_handle.id));
                            }
                        }
                    }
                }
                for (priority, id) in to_enqueue {
                    let _ = guard.queues[priority.index()].enqueue(id);
                }

                (dependents, on_success, on_failure, user_data)
            };
            work_available.notify_all();
            drop(dependents);

            if success {
                if let Some(cb) = on_success {
                    cb(handle, user_data);
                }
            } else if let Some(cb) = on_failure {
                cb(handle, user_data);
            }

            {
                let mut guard = shared.lock().expect("job system mutex poisoned");
                let slot = &mut guard.slots[idx as usize];
                slot.generation = slot.generation.wrapping_add(1);
                slot.reset_to_free();
                guard.free_stack.push(idx);
                slots_available.notify_all();
                work_available.notify_all();
            }
        }
    }

    fn resolve_dependencies(slots: &mut [JobSlot], dependencies: &[JobHandle], child_id: u32) {
        for dep in dependencies {
            if let Some(dep_slot) = slots.get_mut(dep.id as usize) {
                if dep_slot.generation == dep.generation && dep_slot.state != SlotState::Completed {
                    dep_slot.dependents.push(JobHandle {
                        id: child_id,
                        generation: slots[child_id as usize].generation,
                    });
                    slots[child_id as usize].remaining_dependencies += 1;
                }
                // stale or already-completed dependency: treated as already satisfied.
            }
        }
    }

    fn install(state: &mut SharedState, idx: u32, desc: JobDesc) -> JobHandle {
        let slot = &mut state.slots[idx as usize];
        slot.state = SlotState::Pending;
        slot.priority = desc.priority;
        slot.type_mask = desc.type_mask;
        slot.run = Some(desc.run);
        slot.on_success = desc.on_success;
        slot.on_failure = desc.on_failure;
        slot.user_data = desc.user_data;
        slot.payload = desc.payload.unwrap_or_default();
        slot.remaining_dependencies = 0;
        slot.dependents.clear();

        Self::resolve_dependencies(&mut state.slots, &desc.dependencies, idx);

        let handle = JobHandle {
            id: idx,
            generation: state.slots[idx as usize].generation,
        };
        if !desc.defer_enqueue && state.slots[idx as usize].remaining_dependencies == 0 {
            state.slots[idx as usize].state = SlotState::Queued;
            let priority = state.slots[idx as usize].priority;
            let _ = state.queues[priority.index()].enqueue(idx);
        }
        handle
    }

    /// Submit a job, blocking until a free slot exists or the system shuts
    /// down.
    pub fn submit(&self, desc: JobDesc) -> Result<JobHandle> {
        let mut guard = self.shared.lock().expect("job system mutex poisoned");
        loop {
            if let Some(idx) = guard.free_stack.pop() {
                let handle = Self::install(&mut guard, idx, desc);
                drop(guard);
                self.work_available.notify_all();
                return Ok(handle);
            }
            if !guard.running {
                log::warn!("job submit rejected: job system is shutting down");
                return Err(EngineError::NotInitialized);
            }
            guard = self.slots_available.wait(guard).expect("job system mutex poisoned");
        }
    }

    /// Like `submit`, but returns `Ok(None)` immediately instead of
    /// blocking when no slot is free.
    pub fn try_submit(&self, desc: JobDesc) -> Result<Option<JobHandle>> {
        let mut guard = self.shared.lock().expect("job system mutex poisoned");
        let Some(idx) = guard.free_stack.pop() else {
            return Ok(None);
        };
        let handle = Self::install(&mut guard, idx, desc);
        drop(guard);
        self.work_available.notify_all();
        Ok(Some(handle))
    }

    /// Legal only while `job`'s slot is still `Pending`.
    pub fn add_dependency(&self, job: JobHandle, dep: JobHandle) -> Result<()> {
        let mut guard = self.shared.lock().expect("job system mutex poisoned");
        let matches = guard
            .slots
            .get(job.id as usize)
            .map(|s| s.generation == job.generation && s.state == SlotState::Pending)
            .unwrap_or(false);
        if !matches {
            log::warn!("add_dependency rejected: job {} is not pending", job.id);
            return Err(EngineError::InvalidParameter(
                "add_dependency is only legal on a pending job".into(),
            ));
        }
        Self::resolve_dependencies(&mut guard.slots, std::slice::from_ref(&dep), job.id);
        Ok(())
    }

    /// Transition a deferred pending job with zero remaining dependencies
    /// into its priority queue.
    pub fn mark_ready(&self, job: JobHandle) -> Result<()> {
        let mut guard = self.shared.lock().expect("job system mutex poisoned");
        let Some(slot) = guard.slots.get(job.id as usize) else {
            log::warn!("mark_ready rejected: unknown job handle {}", job.id);
            return Err(EngineError::InvalidParameter("unknown job handle".into()));
        };
        if slot.generation != job.generation || slot.state != SlotState::Pending || slot.remaining_dependencies != 0 {
            log::warn!("mark_ready rejected: job {} is not a ready pending job", job.id);
            return Err(EngineError::InvalidParameter(
                "mark_ready requires a pending job with no remaining dependencies".into(),
            ));
        }
        let priority = slot.priority;
        guard.slots[job.id as usize].state = SlotState::Queued;
        let _ = guard.queues[priority.index()].enqueue(job.id);
        drop(guard);
        self.work_available.notify_all();
        Ok(())
    }

    /// Block until `handle`'s slot has recycled (its generation no longer
    /// matches), guaranteeing the job's callbacks have returned. A wait on
    /// an already-recycled slot returns immediately.
    pub fn wait(&self, handle: JobHandle) -> bool {
        let mut guard = self.shared.lock().expect("job system mutex poisoned");
        loop {
            match guard.slots.get(handle.id as usize) {
                Some(slot) if slot.generation == handle.generation && guard.running => {
                    guard = self.work_available.wait(guard).expect("job system mutex poisoned");
                }
                _ => return true,
            }
        }
    }

    pub fn shutdown(&mut self) {
        {
            let mut guard = self.shared.lock().expect("job system mutex poisoned");
            guard.running = false;
        }
        self.work_available.notify_all();
        self.slots_available.notify_all();
        for worker in self.workers.drain(..) {
            let _ = worker.join();
        }
    }
}

impl Drop for JobSystem {
    fn drop(&mut self) {
        if !self.workers.is_empty() {
            self.shutdown();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex as StdMutex;

    static CHAIN_RESULT: StdMutex<String> = StdMutex::new(String::new());

    fn append_a(_ctx: &mut JobContext, _payload: &[u8]) -> bool {
        CHAIN_RESULT.lock().unwrap().push('a');
        true
    }
    fn append_b(_ctx: &mut JobContext, _payload: &[u8]) -> bool {
        CHAIN_RESULT.lock().unwrap().push('b');
        true
    }
    fn append_c(_ctx: &mut JobContext, _payload: &[u8]) -> bool {
        CHAIN_RESULT.lock().unwrap().push('c');
        true
    }

    #[test]
    fn scenario_4_job_chain() {
        CHAIN_RESULT.lock().unwrap().clear();
        let mut system = JobSystem::new(2, 8).unwrap();

        let a = system.submit(JobDesc::new(append_a)).unwrap();
        let mut desc_b = JobDesc::new(append_b);
        desc_b.dependencies.push(a);
        let b = system.submit(desc_b).unwrap();
        let mut desc_c = JobDesc::new(append_c);
        desc_c.dependencies.push(b);
        let c = system.submit(desc_c).unwrap();

        assert!(system.wait(c));
        assert_eq!(&*CHAIN_RESULT.lock().unwrap(), "abc");
        system.shutdown();
    }

    fn noop_job(_ctx: &mut JobContext, _payload: &[u8]) -> bool {
        std::thread::sleep(std::time::Duration::from_millis(50));
        true
    }

    static MASK_FLAG: StdMutex<bool> = StdMutex::new(false);

    fn set_mask_flag(_ctx: &mut JobContext, _payload: &[u8]) -> bool {
        *MASK_FLAG.lock().unwrap() = true;
        true
    }

    #[test]
    fn worker_mask_blocks_job_with_no_overlapping_bits() {
        *MASK_FLAG.lock().unwrap() = false;
        let mut system = JobSystem::with_worker_masks(&[0b01], 4).unwrap();
        let mut desc = JobDesc::new(set_mask_flag);
        desc.type_mask = 0b10;
        system.submit(desc).unwrap();
        std::thread::sleep(std::time::Duration::from_millis(50));
        assert!(!*MASK_FLAG.lock().unwrap());
        system.shutdown();
    }

    #[test]
    fn worker_mask_runs_job_with_overlapping_bits() {
        *MASK_FLAG.lock().unwrap() = false;
        let mut system = JobSystem::with_worker_masks(&[0b01, 0b10], 4).unwrap();
        let mut desc = JobDesc::new(set_mask_flag);
        desc.type_mask = 0b10;
        let handle = system.submit(desc).unwrap();
        assert!(system.wait(handle));
        assert!(*MASK_FLAG.lock().unwrap());
        system.shutdown();
    }

    #[test]
    fn scenario_5_job_full_queue() {
        let mut system = JobSystem::new(2, 2).unwrap();
        let h1 = system.submit(JobDesc::new(noop_job)).unwrap();
        let h2 = system.submit(JobDesc::new(noop_job)).unwrap();
        let third = system.try_submit(JobDesc::new(noop_job)).unwrap();
        assert!(third.is_none());

        assert!(system.wait(h1));
        assert!(system.wait(h2));
        let h3 = system.submit(JobDesc::new(noop_job)).unwrap();
        assert!(system.wait(h3));
        system.shutdown();
    }
}
