//! Bounded MPSC event bus with a dedicated worker thread (`spec.md` §4.2).

use std::collections::HashMap;
use std::sync::{Arc, Condvar, Mutex};
use std::thread::{self, JoinHandle};

use crate::error::{EngineError, Result};
use crate::event_bus::payload::PayloadBuffer;

/// A subscriber callback plus the opaque user data handed back to it.
/// Identity for dedup purposes is `(callback as usize, user_data)`, mirroring
/// the function-pointer-plus-user-data idiom the reference engine uses at
/// its FFI boundary.
#[derive(Clone, Copy)]
pub struct Subscriber {
    pub callback: fn(event_type: u32, payload: &[u8], user_data: usize),
    pub user_data: usize,
}

impl Subscriber {
    fn key(&self) -> (usize, usize) {
        (self.callback as usize, self.user_data)
    }
}

struct QueuedEvent {
    event_type: u32,
    payload_offset: Option<usize>,
    payload_len: usize,
}

struct State {
    running: bool,
    queue: crate::containers::Queue<QueuedEvent>,
    payload: PayloadBuffer,
    subscribers: HashMap<u32, Vec<Subscriber>>,
}

struct Shared {
    state: Mutex<State>,
    work_available: Condvar,
}

pub struct EventBus {
    shared: Arc<Shared>,
    worker: Option<JoinHandle<()>>,
}

impl EventBus {
    pub fn new(queue_capacity: usize, payload_capacity: usize) -> Result<Self> {
        let state = State {
            running: true,
            queue: crate::containers::Queue::new(queue_capacity)?,
            payload: PayloadBuffer::new(payload_capacity),
            subscribers: HashMap::new(),
        };
        let shared = Arc::new(Shared {
            state: Mutex::new(state),
            work_available: Condvar::new(),
        });

        let worker_shared = Arc::clone(&shared);
        let worker = thread::spawn(move || Self::worker_loop(worker_shared));

        Ok(Self {
            shared,
            worker: Some(worker),
        })
    }

    fn worker_loop(shared: Arc<Shared>) {
        loop {
            let mut guard = shared.state.lock().expect("event bus mutex poisoned");
            while guard.running && guard.queue.is_empty() {
                guard = shared
                    .work_available
                    .wait(guard)
                    .expect("event bus mutex poisoned");
            }
            if !guard.running && guard.queue.is_empty() {
                return;
            }
            let event = guard.queue.dequeue().expect("queue was non-empty");
            let payload = event
                .payload_offset
                .map(|offset| guard.payload.read(offset, event.payload_len))
                .unwrap_or_default();
            if event.payload_offset.is_some() {
                guard.payload.free_oldest();
            }
            let subs = guard.subscribers.get(&event.event_type).cloned().unwrap_or_default();
            drop(guard);

            for sub in subs {
                (sub.callback)(event.event_type, &payload, sub.user_data);
            }
        }
    }

    /// Enqueue `event_type` with optional payload. Non-blocking: fails with
    /// `OutOfMemory` when the event queue or payload ring is full.
    pub fn dispatch(&self, event_type: u32, data: Option<&[u8]>) -> Result<()> {
        let mut guard = self.shared.state.lock().expect("event bus mutex poisoned");
        if guard.queue.is_full() {
            log::warn!("event bus queue full, dropping event type {event_type}");
            return Err(EngineError::OutOfMemory);
        }
        let (payload_offset, payload_len) = match data {
            Some(bytes) if !bytes.is_empty() => {
                let offset = guard.payload.push(bytes)?;
                (Some(offset), bytes.len())
            }
            _ => (None, 0),
        };
        guard
            .queue
            .enqueue(QueuedEvent {
                event_type,
                payload_offset,
                payload_len,
            })
            .expect("capacity already checked");
        drop(guard);
        self.shared.work_available.notify_one();
        Ok(())
    }

    /// Subscribe `subscriber` to `event_type`. Duplicate `(callback,
    /// user_data)` pairs for the same type are ignored.
    pub fn subscribe(&self, event_type: u32, subscriber: Subscriber) {
        let mut guard = self.shared.state.lock().expect("event bus mutex poisoned");
        let list = guard.subscribers.entry(event_type).or_default();
        if !list.iter().any(|s| s.key() == subscriber.key()) {
            list.push(subscriber);
        }
    }

    pub fn unsubscribe(&self, event_type: u32, subscriber: Subscriber) {
        let mut guard = self.shared.state.lock().expect("event bus mutex poisoned");
        if let Some(list) = guard.subscribers.get_mut(&event_type) {
            list.retain(|s| s.key() != subscriber.key());
        }
    }

    pub fn shutdown(&mut self) {
        {
            let mut guard = self.shared.state.lock().expect("event bus mutex poisoned");
            guard.running = false;
        }
        self.shared.work_available.notify_all();
        if let Some(handle) = self.worker.take() {
            let _ = handle.join();
        }
    }
}

impl Drop for EventBus {
    fn drop(&mut self) {
        if self.worker.is_some() {
            self.shutdown();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    static CALL_COUNT: AtomicU32 = AtomicU32::new(0);

    fn record_call(_event_type: u32, _payload: &[u8], _user_data: usize) {
        CALL_COUNT.fetch_add(1, Ordering::SeqCst);
    }

    #[test]
    fn dispatch_invokes_subscriber() {
        CALL_COUNT.store(0, Ordering::SeqCst);
        let bus = EventBus::new(16, 256).unwrap();
        bus.subscribe(
            1,
            Subscriber {
                callback: record_call,
                user_data: 0,
            },
        );
        bus.dispatch(1, Some(b"payload")).unwrap();

        for _ in 0..200 {
            if CALL_COUNT.load(Ordering::SeqCst) > 0 {
                break;
            }
            std::thread::sleep(std::time::Duration::from_millis(5));
        }
        assert_eq!(CALL_COUNT.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn duplicate_subscription_is_ignored() {
        let bus = EventBus::new(4, 64).unwrap();
        let sub = Subscriber {
            callback: record_call,
            user_data: 7,
        };
        bus.subscribe(2, sub);
        bus.subscribe(2, sub);
        let guard = bus.shared.state.lock().unwrap();
        assert_eq!(guard.subscribers.get(&2).unwrap().len(), 1);
    }

    #[test]
    fn dispatch_fails_when_queue_full() {
        let bus = EventBus::new(1, 64).unwrap();
        bus.dispatch(1, None).unwrap();
        assert!(bus.dispatch(1, None).is_err());
    }
}
