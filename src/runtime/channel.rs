//! Fixed-capacity blocking handoff queue between producer and consumer workers.
//!
//! One mutex guards the buffer and the completion flag; one condvar carries every state
//! change. Waiters are woken with `notify_all` because producers (waiting for space) and
//! consumers (waiting for items) share the condvar, and each rechecks its own predicate.

use log::trace;
use std::collections::VecDeque;
use std::sync::{Condvar, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

use crate::error::ChannelError;

struct State<T> {
    buffer: VecDeque<T>,
    completed: bool,
}

/// Bounded FIFO channel. Share it with `Arc<BoundedChannel<T>>`.
pub struct BoundedChannel<T> {
    capacity: usize,
    state: Mutex<State<T>>,
    changed: Condvar,
}

/// Result of [`BoundedChannel::try_add`].
#[derive(Debug, PartialEq, Eq)]
pub enum TryAdd<T> {
    Added,
    /// Still no space after the timeout; the item is handed back.
    Full(T),
}

impl<T> BoundedChannel<T> {
    /// Create a channel holding at most `capacity` items. Panics if `capacity` is zero.
    pub fn new(capacity: usize) -> Self {
        assert!(capacity >= 1, "channel capacity must be at least 1");
        Self {
            capacity,
            state: Mutex::new(State {
                buffer: VecDeque::with_capacity(capacity),
                completed: false,
            }),
            changed: Condvar::new(),
        }
    }

    fn lock(&self) -> MutexGuard<'_, State<T>> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn wait<'a>(&self, guard: MutexGuard<'a, State<T>>) -> MutexGuard<'a, State<T>> {
        self.changed
            .wait(guard)
            .unwrap_or_else(PoisonError::into_inner)
    }

    /// Wait until `deadline`. Returns the guard and whether the deadline has passed.
    fn wait_until<'a>(
        &self,
        guard: MutexGuard<'a, State<T>>,
        deadline: Instant,
    ) -> (MutexGuard<'a, State<T>>, bool) {
        let now = Instant::now();
        if now >= deadline {
            return (guard, true);
        }
        let (guard, _) = self
            .changed
            .wait_timeout(guard, deadline - now)
            .unwrap_or_else(PoisonError::into_inner);
        (guard, Instant::now() >= deadline)
    }

    fn push_and_wake(&self, state: &mut State<T>, item: T) {
        state.buffer.push_back(item);
        self.changed.notify_all();
    }

    /// Append `item`, blocking while the channel is full.
    ///
    /// Fails with [`ChannelError::InvalidState`] if the channel is complete, including when it is
    /// completed while this call waits for space.
    pub fn add(&self, item: T) -> Result<(), ChannelError> {
        let mut state = self.lock();
        loop {
            if state.completed {
                return Err(ChannelError::InvalidState);
            }
            if state.buffer.len() < self.capacity {
                self.push_and_wake(&mut state, item);
                return Ok(());
            }
            trace!("add: channel full ({}), waiting", self.capacity);
            state = self.wait(state);
        }
    }

    /// Like [`add`](Self::add), but gives up after `timeout` and returns the item.
    pub fn try_add(&self, item: T, timeout: Duration) -> Result<TryAdd<T>, ChannelError> {
        let deadline = Instant::now() + timeout;
        let mut state = self.lock();
        loop {
            if state.completed {
                return Err(ChannelError::InvalidState);
            }
            if state.buffer.len() < self.capacity {
                self.push_and_wake(&mut state, item);
                return Ok(TryAdd::Added);
            }
            let (guard, expired) = self.wait_until(state, deadline);
            state = guard;
            if expired && !state.completed && state.buffer.len() >= self.capacity {
                return Ok(TryAdd::Full(item));
            }
        }
    }

    /// Remove and return the oldest item, blocking while the channel is empty.
    /// Returns [`ChannelError::EndOfChannel`] once the channel is complete and drained.
    pub fn take(&self) -> Result<T, ChannelError> {
        let mut state = self.lock();
        loop {
            if let Some(item) = state.buffer.pop_front() {
                self.changed.notify_all();
                return Ok(item);
            }
            if state.completed {
                return Err(ChannelError::EndOfChannel);
            }
            state = self.wait(state);
        }
    }

    /// Like [`take`](Self::take), but returns `Ok(None)` if nothing arrived within `timeout`.
    pub fn try_take(&self, timeout: Duration) -> Result<Option<T>, ChannelError> {
        let deadline = Instant::now() + timeout;
        let mut state = self.lock();
        loop {
            if let Some(item) = state.buffer.pop_front() {
                self.changed.notify_all();
                return Ok(Some(item));
            }
            if state.completed {
                return Err(ChannelError::EndOfChannel);
            }
            let (guard, expired) = self.wait_until(state, deadline);
            state = guard;
            if expired && state.buffer.is_empty() && !state.completed {
                return Ok(None);
            }
        }
    }

    /// Mark that no more items will be added. Buffered items stay available. Idempotent.
    pub fn complete(&self) {
        let mut state = self.lock();
        if !state.completed {
            state.completed = true;
            self.changed.notify_all();
        }
    }

    pub fn is_completed(&self) -> bool {
        self.lock().completed
    }

    /// Complete and empty: every `take` from now on returns `EndOfChannel`.
    pub fn is_drained(&self) -> bool {
        let state = self.lock();
        state.completed && state.buffer.is_empty()
    }

    pub fn len(&self) -> usize {
        self.lock().buffer.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().buffer.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }
}
