//! `Queue<T>`: bounded FIFO ring buffer (`spec.md` §4.3).
//!
//! Monotonic head/tail modulo capacity; enqueue on a full queue fails rather
//! than blocking or overwriting.

use crate::error::{EngineError, Result};

pub struct Queue<T> {
    slots: Box<[Option<T>]>,
    head: usize,
    tail: usize,
    len: usize,
}

impl<T> Queue<T> {
    pub fn new(capacity: usize) -> Result<Self> {
        if capacity == 0 {
            log::warn!("queue creation rejected: capacity must be non-zero");
            return Err(EngineError::InvalidParameter("queue capacity must be non-zero".into()));
        }
        let mut slots = Vec::with_capacity(capacity);
        slots.resize_with(capacity, || None);
        Ok(Self {
            slots: slots.into_boxed_slice(),
            head: 0,
            tail: 0,
            len: 0,
        })
    }

    pub fn capacity(&self) -> usize {
        self.slots.len()
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn is_full(&self) -> bool {
        self.len == self.capacity()
    }

    pub fn enqueue(&mut self, value: T) -> Result<()> {
        if self.is_full() {
            log::warn!("enqueue rejected: queue is full");
            return Err(EngineError::InvalidParameter("queue is full".into()));
        }
        self.slots[self.tail] = Some(value);
        self.tail = (self.tail + 1) % self.capacity();
        self.len += 1;
        Ok(())
    }

    pub fn dequeue(&mut self) -> Option<T> {
        if self.is_empty() {
            return None;
        }
        let value = self.slots[self.head].take();
        self.head = (self.head + 1) % self.capacity();
        self.len -= 1;
        value
    }

    pub fn peek(&self) -> Option<&T> {
        self.slots[self.head].as_ref()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fifo_order() {
        let mut q: Queue<i32> = Queue::new(3).unwrap();
        q.enqueue(1).unwrap();
        q.enqueue(2).unwrap();
        assert_eq!(q.dequeue(), Some(1));
        q.enqueue(3).unwrap();
        q.enqueue(4).unwrap();
        assert_eq!(q.dequeue(), Some(2));
        assert_eq!(q.dequeue(), Some(3));
        assert_eq!(q.dequeue(), Some(4));
        assert_eq!(q.dequeue(), None);
    }

    #[test]
    fn enqueue_on_full_fails_without_blocking() {
        let mut q: Queue<i32> = Queue::new(2).unwrap();
        q.enqueue(1).unwrap();
        q.enqueue(2).unwrap();
        assert!(q.enqueue(3).is_err());
        assert_eq!(q.len(), 2);
    }

    #[test]
    fn wraps_around_capacity() {
        let mut q: Queue<i32> = Queue::new(2).unwrap();
        q.enqueue(1).unwrap();
        q.dequeue();
        q.enqueue(2).unwrap();
        q.enqueue(3).unwrap();
        assert_eq!(q.dequeue(), Some(2));
        assert_eq!(q.dequeue(), Some(3));
    }
}
