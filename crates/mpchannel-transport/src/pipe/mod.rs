//! Multi-client pipe server.
//!
//! One acceptor thread waits for clients; each connected client gets its
//! own handler thread that decodes frames and appends them to a shared
//! [`PendingQueue`]. The dispatch loop drains that queue through
//! [`Transport::read`]. The OS-specific part (creating the pipe, accepting
//! a client, unblocking a pending accept) lives behind [`PipeAcceptor`].

#[cfg(windows)]
mod windows;

#[cfg(windows)]
pub use windows::{create_server, NamedPipeClient, NamedPipeListener, NamedPipeServer, PipeStream};

use std::io::{ErrorKind, Read};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use mpchannel_frame::{FrameReader, Message, ReadEvent};
use parking_lot::Mutex;
use tracing::{debug, error, info, warn};

use crate::config::ChannelConfig;
use crate::queue::PendingQueue;
use crate::traits::{Role, Transport, TransportState};

/// Source of client connections for a [`PipeServer`].
///
/// Dropping an accepted stream ends that client's connection.
pub trait PipeAcceptor: Send + Sync + 'static {
    type Stream: Read + Send + 'static;

    /// Wait for the next client. `WouldBlock` means "try again later".
    fn accept(&self) -> std::io::Result<Self::Stream>;

    /// Unblock a pending [`accept`](Self::accept) so the acceptor thread
    /// can observe shutdown.
    fn wake(&self);

    /// Release the server endpoint. Must be idempotent.
    fn close(&self);

    /// Endpoint name for logs.
    fn name(&self) -> String;
}

struct HandlerControl {
    id: u64,
    stop: AtomicBool,
}

struct ServerShared<A: PipeAcceptor> {
    acceptor: A,
    queue: PendingQueue,
    clients: Mutex<Vec<Arc<HandlerControl>>>,
    next_client_id: AtomicU64,
    stopping: AtomicBool,
    config: ChannelConfig,
}

impl<A: PipeAcceptor> ServerShared<A> {
    fn forget_client(&self, id: u64) {
        match self.clients.try_lock_for(self.config.lock_timeout) {
            Some(mut clients) => clients.retain(|client| client.id != id),
            None => warn!(client = id, "client list lock timed out; handler left registered"),
        }
    }
}

/// Server end of the named-pipe channel.
///
/// Read-only: [`Transport::write`] drops the message with a warning.
/// Once disconnected the server cannot be started again.
pub struct PipeServer<A: PipeAcceptor> {
    shared: Arc<ServerShared<A>>,
    acceptor_thread: Mutex<Option<JoinHandle<()>>>,
}

impl<A: PipeAcceptor> PipeServer<A> {
    pub fn new(acceptor: A, config: ChannelConfig) -> Self {
        info!(pipe = %acceptor.name(), "prepare pipe transport as server");
        Self {
            shared: Arc::new(ServerShared {
                acceptor,
                queue: PendingQueue::new(config.lock_timeout),
                clients: Mutex::new(Vec::new()),
                next_client_id: AtomicU64::new(1),
                stopping: AtomicBool::new(false),
                config,
            }),
            acceptor_thread: Mutex::new(None),
        }
    }

    /// Number of connected clients.
    pub fn client_count(&self) -> usize {
        self.shared.clients.lock().len()
    }

    /// Number of decoded messages not yet read.
    pub fn pending(&self) -> usize {
        self.shared.queue.len().unwrap_or(0)
    }

    /// Whether the acceptor thread has exited. False if it never started.
    pub fn acceptor_finished(&self) -> bool {
        self.acceptor_thread
            .lock()
            .as_ref()
            .is_some_and(JoinHandle::is_finished)
    }

    pub fn acceptor(&self) -> &A {
        &self.shared.acceptor
    }
}

impl<A: PipeAcceptor> Transport for PipeServer<A> {
    fn role(&self) -> Role {
        Role::Server
    }

    fn state(&self) -> TransportState {
        if self.shared.stopping.load(Ordering::SeqCst) {
            return TransportState::Disconnected;
        }
        match self.acceptor_thread.lock().as_ref() {
            Some(handle) if !handle.is_finished() => TransportState::Ready,
            _ => TransportState::Disconnected,
        }
    }

    /// Start the acceptor thread. Later calls are no-ops.
    fn connect(&self) {
        if self.shared.stopping.load(Ordering::SeqCst) {
            debug!("pipe server was stopped; not restarting");
            return;
        }

        let mut acceptor_thread = self.acceptor_thread.lock();
        if acceptor_thread.is_some() {
            return;
        }

        let shared = Arc::clone(&self.shared);
        match thread::Builder::new()
            .name("pipe-acceptor".to_string())
            .spawn(move || run_acceptor(shared))
        {
            Ok(handle) => *acceptor_thread = Some(handle),
            Err(err) => error!(error = %err, "cannot start pipe acceptor thread"),
        }
    }

    /// Stop accepting, ask every handler to finish, and release the pipe.
    ///
    /// Returns without waiting for the acceptor thread; it closes the
    /// endpoint on its way out.
    fn disconnect(&self) {
        if self.shared.stopping.swap(true, Ordering::SeqCst) {
            return;
        }
        info!(pipe = %self.shared.acceptor.name(), "stop pipe server");

        match self.shared.clients.try_lock_for(self.shared.config.lock_timeout) {
            Some(clients) => {
                for client in clients.iter() {
                    client.stop.store(true, Ordering::SeqCst);
                }
            }
            None => warn!("client list lock timed out; handlers not signalled"),
        }

        if self.acceptor_thread.lock().is_some() {
            self.shared.acceptor.wake();
        } else {
            self.shared.acceptor.close();
        }
    }

    /// Oldest pending message; sleeps one poll interval when there is none.
    fn read(&self) -> Option<Message> {
        match self.shared.queue.pop() {
            Ok(Some(message)) => {
                info!(%message, "new message was received");
                Some(message)
            }
            Ok(None) => {
                thread::sleep(self.shared.config.poll_interval);
                None
            }
            Err(err) => {
                warn!(error = %err, "pending queue unavailable");
                None
            }
        }
    }

    fn write(&self, message: &Message) {
        warn!(%message, "pipe server transport is read-only; dropping message");
    }

    fn transport_name(&self) -> &'static str {
        "named-pipe"
    }
}

impl<A: PipeAcceptor> Drop for PipeServer<A> {
    fn drop(&mut self) {
        self.disconnect();
    }
}

fn run_acceptor<A: PipeAcceptor>(shared: Arc<ServerShared<A>>) {
    info!(pipe = %shared.acceptor.name(), "waiting for pipe clients");

    while !shared.stopping.load(Ordering::SeqCst) {
        match shared.acceptor.accept() {
            Ok(stream) => {
                if shared.stopping.load(Ordering::SeqCst) {
                    drop(stream);
                    break;
                }
                spawn_handler(&shared, stream);
            }
            Err(err) if err.kind() == ErrorKind::WouldBlock => {
                thread::sleep(shared.config.poll_interval);
            }
            Err(err) => {
                if !shared.stopping.load(Ordering::SeqCst) {
                    warn!(error = %err, "cannot accept pipe client");
                }
                thread::sleep(shared.config.poll_interval);
            }
        }
    }

    shared.acceptor.close();
    info!(pipe = %shared.acceptor.name(), "pipe acceptor stopped");
}

fn spawn_handler<A: PipeAcceptor>(shared: &Arc<ServerShared<A>>, stream: A::Stream) {
    let control = Arc::new(HandlerControl {
        id: shared.next_client_id.fetch_add(1, Ordering::Relaxed),
        stop: AtomicBool::new(false),
    });

    match shared.clients.try_lock_for(shared.config.lock_timeout) {
        Some(mut clients) => clients.push(Arc::clone(&control)),
        None => {
            warn!(client = control.id, "client list lock timed out; rejecting client");
            return;
        }
    }

    let id = control.id;
    let handler_shared = Arc::clone(shared);
    let spawned = thread::Builder::new()
        .name(format!("pipe-client-{id}"))
        .spawn(move || run_handler(handler_shared, control, stream));
    if let Err(err) = spawned {
        error!(client = id, error = %err, "cannot start pipe client handler");
        shared.forget_client(id);
    }
}

fn run_handler<A: PipeAcceptor>(
    shared: Arc<ServerShared<A>>,
    control: Arc<HandlerControl>,
    stream: A::Stream,
) {
    let id = control.id;
    info!(client = id, "pipe client connected");

    let mut reader = FrameReader::with_chunk_size(stream, shared.config.read_chunk_size);

    while !control.stop.load(Ordering::SeqCst) {
        match reader.next_message() {
            Ok(ReadEvent::Item(message)) => {
                debug!(client = id, %message, "frame received");
                if let Err(err) = shared.queue.push(message) {
                    warn!(client = id, %message, error = %err, "cannot queue message; dropping it");
                }
            }
            Ok(ReadEvent::WouldBlock) => thread::sleep(shared.config.poll_interval),
            Ok(ReadEvent::Eof) => break,
            Err(err) => {
                if !control.stop.load(Ordering::SeqCst) {
                    warn!(client = id, error = %err, "pipe client read failed");
                }
                break;
            }
        }
    }

    drop(reader);
    shared.forget_client(id);
    info!(client = id, "pipe client disconnected");
}
