use parking_lot::{Condvar, Mutex};
use std::collections::VecDeque;
use std::sync::Arc;

use crate::error::QueueError;

#[derive(Debug)]
struct QueueState<T> {
    items: VecDeque<T>,
    /// Slots held by reservations that have not been committed yet
    reserved: usize,
    closed: bool,
}

/// Bounded FIFO of jobs shared between the submitting side and the worker pool.
///
/// Submission happens in two steps so that a batch is either queued whole or not at all: slots
/// are [reserved](WorkQueue::reserve) before anything is created for the batch, then filled with
/// [Reservation::commit] once the batch is ready. Each item is handed to exactly one worker.
#[derive(Debug)]
pub struct WorkQueue<T> {
    capacity: usize,
    state: Mutex<QueueState<T>>,
    available: Condvar,
}

impl<T> WorkQueue<T> {
    pub fn new(capacity: usize) -> Arc<Self> {
        Arc::new(Self {
            capacity,
            state: Mutex::new(QueueState {
                items: VecDeque::with_capacity(capacity),
                reserved: 0,
                closed: false,
            }),
            available: Condvar::new(),
        })
    }

    /// Reserve room for `count` items.
    pub fn reserve(self: &Arc<Self>, count: usize) -> Result<Reservation<T>, QueueError> {
        let mut state = self.state.lock();
        if state.closed {
            return Err(QueueError::Closed);
        }

        let available = self.capacity - state.items.len() - state.reserved;
        if count > available {
            return Err(QueueError::Full {
                capacity: self.capacity,
                available,
                requested: count,
            });
        }

        state.reserved += count;
        Ok(Reservation {
            queue: self.clone(),
            slots: count,
        })
    }

    /// Take the next item, blocking until one is available.
    ///
    /// Returns `None` once the queue is closed, items still queued at that point are left for
    /// [WorkQueue::drain].
    pub fn pop(&self) -> Option<T> {
        let mut state = self.state.lock();
        loop {
            if state.closed {
                return None;
            }
            if let Some(item) = state.items.pop_front() {
                return Some(item);
            }
            self.available.wait(&mut state);
        }
    }

    /// Remove every queued item without handing it to a worker.
    pub fn drain(&self) -> Vec<T> {
        self.state.lock().items.drain(..).collect()
    }

    /// Stop accepting work and wake every waiting worker.
    pub fn close(&self) {
        self.state.lock().closed = true;
        self.available.notify_all();
    }

    pub fn len(&self) -> usize {
        self.state.lock().items.len()
    }

    fn release(&self, slots: usize) {
        let mut state = self.state.lock();
        state.reserved = state.reserved.saturating_sub(slots);
    }
}

/// Room held in a [WorkQueue] for one batch. Dropping it without committing frees the room.
#[derive(Debug)]
pub struct Reservation<T> {
    queue: Arc<WorkQueue<T>>,
    slots: usize,
}

impl<T> Reservation<T> {
    /// Queue the batch. Every item becomes visible to workers at once.
    ///
    /// At most the reserved number of items is queued, anything beyond it is returned.
    pub fn commit(mut self, items: Vec<T>) -> Result<(), QueueError> {
        let mut state = self.queue.state.lock();
        if state.closed {
            return Err(QueueError::Closed);
        }
        if items.len() > self.slots {
            return Err(QueueError::Full {
                capacity: self.queue.capacity,
                available: self.slots,
                requested: items.len(),
            });
        }

        state.reserved -= self.slots;
        self.slots = 0;
        let count = items.len();
        state.items.extend(items);
        drop(state);

        for _ in 0..count {
            self.queue.available.notify_one();
        }
        Ok(())
    }
}

impl<T> Drop for Reservation<T> {
    fn drop(&mut self) {
        if self.slots > 0 {
            self.queue.release(self.slots);
        }
    }
}
