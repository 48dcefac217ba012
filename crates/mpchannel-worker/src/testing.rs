//! In-memory collaborators shared by the unit tests.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use mpchannel_frame::{Message, MessageKind};
use mpchannel_transport::{Role, Transport, TransportState};

use crate::error::ExecutorError;
use crate::executor::PowerExecutor;

/// Transport backed by a queue; `connect` makes it ready only if allowed.
pub struct MemoryTransport {
    role: Role,
    inbox: Mutex<VecDeque<Message>>,
    sent: Mutex<Vec<Message>>,
    ready: AtomicBool,
    connectable: bool,
    pub connects: AtomicUsize,
    pub disconnects: AtomicUsize,
}

impl MemoryTransport {
    pub fn ready(role: Role, inbox: Vec<Message>) -> Self {
        Self::build(role, inbox, true, true)
    }

    /// Never becomes ready.
    pub fn unreachable(role: Role) -> Self {
        Self::build(role, Vec::new(), false, false)
    }

    fn build(role: Role, inbox: Vec<Message>, ready: bool, connectable: bool) -> Self {
        Self {
            role,
            inbox: Mutex::new(inbox.into()),
            sent: Mutex::new(Vec::new()),
            ready: AtomicBool::new(ready),
            connectable,
            connects: AtomicUsize::new(0),
            disconnects: AtomicUsize::new(0),
        }
    }

    pub fn sent(&self) -> Vec<Message> {
        self.sent.lock().unwrap().clone()
    }
}

impl Transport for MemoryTransport {
    fn role(&self) -> Role {
        self.role
    }

    fn state(&self) -> TransportState {
        if self.ready.load(Ordering::SeqCst) {
            TransportState::Ready
        } else {
            TransportState::Disconnected
        }
    }

    fn connect(&self) {
        self.connects.fetch_add(1, Ordering::SeqCst);
        if self.connectable {
            self.ready.store(true, Ordering::SeqCst);
        }
    }

    fn disconnect(&self) {
        self.disconnects.fetch_add(1, Ordering::SeqCst);
        self.ready.store(false, Ordering::SeqCst);
    }

    fn read(&self) -> Option<Message> {
        if !self.is_ready() {
            return None;
        }
        self.inbox.lock().unwrap().pop_front()
    }

    fn write(&self, message: &Message) {
        if self.is_ready() {
            self.sent.lock().unwrap().push(*message);
        }
    }

    fn transport_name(&self) -> &'static str {
        "memory"
    }
}

/// Executor that records every call and optionally fails it.
#[derive(Clone, Default)]
pub struct RecordingExecutor {
    pub calls: Arc<Mutex<Vec<(MessageKind, u64)>>>,
    pub fail: bool,
}

impl RecordingExecutor {
    pub fn failing() -> Self {
        Self {
            fail: true,
            ..Self::default()
        }
    }

    pub fn calls(&self) -> Vec<(MessageKind, u64)> {
        self.calls.lock().unwrap().clone()
    }

    fn record(&self, kind: MessageKind, timeout: u64) -> Result<(), ExecutorError> {
        self.calls.lock().unwrap().push((kind, timeout));
        if self.fail {
            Err(ExecutorError::Unsupported(kind))
        } else {
            Ok(())
        }
    }
}

impl PowerExecutor for RecordingExecutor {
    fn shutdown(&self, timeout: u64) -> Result<(), ExecutorError> {
        self.record(MessageKind::Shutdown, timeout)
    }

    fn reboot(&self, timeout: u64) -> Result<(), ExecutorError> {
        self.record(MessageKind::Reboot, timeout)
    }

    fn sleep(&self, timeout: u64) -> Result<(), ExecutorError> {
        self.record(MessageKind::Sleep, timeout)
    }
}
