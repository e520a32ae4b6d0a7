//! Lock-protected sequential id generator. Pass it explicitly to whoever needs ids.

use std::sync::{Mutex, PoisonError};

#[derive(Debug, Default)]
pub struct SequenceGenerator {
    current: Mutex<u64>,
}

impl SequenceGenerator {
    pub fn new() -> Self {
        Self::starting_at(0)
    }

    pub fn starting_at(first: u64) -> Self {
        Self {
            current: Mutex::new(first),
        }
    }

    /// Return the current id and advance.
    pub fn next_id(&self) -> u64 {
        let mut current = self.current.lock().unwrap_or_else(PoisonError::into_inner);
        let id = *current;
        *current += 1;
        id
    }

    /// The id the next call to [`next_id`](Self::next_id) will return.
    pub fn peek(&self) -> u64 {
        *self.current.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
