use std::collections::VecDeque;
use std::time::Duration;

use mpchannel_frame::Message;
use parking_lot::Mutex;

use crate::error::{Result, TransportError};

/// Decoded messages waiting for the dispatch loop.
///
/// Client handlers push, the server transport pops; order is strictly
/// first-in first-out. Every lock acquisition is bounded by `lock_timeout`
/// and a timeout is reported as [`TransportError::LockTimeout`] so callers
/// can retry on their next tick. The queue is unbounded.
#[derive(Debug)]
pub struct PendingQueue {
    messages: Mutex<VecDeque<Message>>,
    lock_timeout: Duration,
}

impl PendingQueue {
    pub fn new(lock_timeout: Duration) -> Self {
        Self {
            messages: Mutex::new(VecDeque::new()),
            lock_timeout,
        }
    }

    /// Append one message.
    pub fn push(&self, message: Message) -> Result<()> {
        let mut messages = self.acquire()?;
        messages.push_back(message);
        Ok(())
    }

    /// Remove and return the oldest message, if any.
    pub fn pop(&self) -> Result<Option<Message>> {
        let mut messages = self.acquire()?;
        Ok(messages.pop_front())
    }

    /// Number of queued messages.
    pub fn len(&self) -> Result<usize> {
        Ok(self.acquire()?.len())
    }

    pub fn is_empty(&self) -> Result<bool> {
        Ok(self.acquire()?.is_empty())
    }

    fn acquire(&self) -> Result<parking_lot::MutexGuard<'_, VecDeque<Message>>> {
        self.messages
            .try_lock_for(self.lock_timeout)
            .ok_or(TransportError::LockTimeout(self.lock_timeout))
    }
}
