use std::fs::{File, OpenOptions};
use std::io::{self, ErrorKind, Read};
use std::iter;
use std::os::windows::ffi::OsStrExt;
use std::path::PathBuf;
use std::ptr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use mpchannel_frame::{FrameError, FrameWriter, Message};
use parking_lot::Mutex;
use tracing::{debug, error, info, warn};
use windows_sys::Win32::Foundation::{
    CloseHandle, ERROR_BROKEN_PIPE, ERROR_MORE_DATA, ERROR_PIPE_CONNECTED,
    ERROR_PIPE_NOT_CONNECTED, HANDLE, INVALID_HANDLE_VALUE,
};
use windows_sys::Win32::Storage::FileSystem::{ReadFile, PIPE_ACCESS_INBOUND};
use windows_sys::Win32::System::Pipes::{
    ConnectNamedPipe, CreateNamedPipeW, DisconnectNamedPipe, PIPE_READMODE_MESSAGE,
    PIPE_TYPE_MESSAGE, PIPE_WAIT,
};

use super::{PipeAcceptor, PipeServer};
use crate::config::ChannelConfig;
use crate::error::{Result, TransportError};
use crate::traits::{Role, Transport, TransportState};

/// Server end of the named-pipe channel.
pub type NamedPipeServer = PipeServer<NamedPipeListener>;

/// Create the pipe and start accepting clients.
pub fn create_server(config: ChannelConfig) -> Result<NamedPipeServer> {
    let listener = NamedPipeListener::create(&config)?;
    let server = PipeServer::new(listener, config);
    server.connect();
    Ok(server)
}

#[derive(Clone, Copy)]
struct RawPipe(HANDLE);

// SAFETY: a pipe handle is a kernel object reference usable from any thread.
unsafe impl Send for RawPipe {}
// SAFETY: see above; concurrent use is coordinated by the `closed` flag.
unsafe impl Sync for RawPipe {}

/// Single-instance inbound message-mode pipe.
///
/// Only one client can be connected at a time; [`accept`](PipeAcceptor::accept)
/// reports `WouldBlock` until the current client's stream is dropped.
pub struct NamedPipeListener {
    name: PathBuf,
    handle: RawPipe,
    busy: Arc<AtomicBool>,
    closed: Arc<AtomicBool>,
}

impl NamedPipeListener {
    pub fn create(config: &ChannelConfig) -> Result<Self> {
        let wide: Vec<u16> = config
            .path
            .as_os_str()
            .encode_wide()
            .chain(iter::once(0))
            .collect();

        info!(pipe = ?config.path, "creating named pipe");
        // SAFETY: `wide` is NUL-terminated and outlives the call; a null
        // security descriptor selects the default.
        let handle = unsafe {
            CreateNamedPipeW(
                wide.as_ptr(),
                PIPE_ACCESS_INBOUND,
                PIPE_TYPE_MESSAGE | PIPE_READMODE_MESSAGE | PIPE_WAIT,
                1,
                config.pipe_buffer_size,
                config.pipe_buffer_size,
                0,
                ptr::null(),
            )
        };
        if handle == INVALID_HANDLE_VALUE {
            return Err(TransportError::Create {
                path: config.path.clone(),
                source: io::Error::last_os_error(),
            });
        }
        info!(pipe = ?config.path, "named pipe was created");

        Ok(Self {
            name: config.path.clone(),
            handle: RawPipe(handle),
            busy: Arc::new(AtomicBool::new(false)),
            closed: Arc::new(AtomicBool::new(false)),
        })
    }
}

impl PipeAcceptor for NamedPipeListener {
    type Stream = PipeStream;

    fn accept(&self) -> io::Result<PipeStream> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(io::Error::new(ErrorKind::NotConnected, "named pipe is closed"));
        }
        if self.busy.load(Ordering::SeqCst) {
            return Err(io::Error::from(ErrorKind::WouldBlock));
        }

        // SAFETY: the handle stays open until `close`, which is only called
        // after the acceptor loop has exited.
        let connected = unsafe { ConnectNamedPipe(self.handle.0, ptr::null_mut()) };
        if connected == 0 {
            let err = io::Error::last_os_error();
            // A client that connected between create and connect is fine.
            if err.raw_os_error() != Some(ERROR_PIPE_CONNECTED as i32) {
                return Err(err);
            }
        }

        self.busy.store(true, Ordering::SeqCst);
        Ok(PipeStream {
            handle: self.handle,
            busy: Arc::clone(&self.busy),
            closed: Arc::clone(&self.closed),
        })
    }

    /// Connect and immediately drop a throwaway client, which completes the
    /// blocking `ConnectNamedPipe` in the acceptor thread.
    fn wake(&self) {
        if self.busy.load(Ordering::SeqCst) {
            return;
        }
        match OpenOptions::new().write(true).open(&self.name) {
            Ok(file) => drop(file),
            Err(err) => debug!(error = %err, "wake-up connection failed"),
        }
    }

    fn close(&self) {
        if self.closed.swap(true, Ordering::SeqCst) {
            return;
        }
        // SAFETY: the `closed` flag guarantees the handle is released once.
        unsafe {
            DisconnectNamedPipe(self.handle.0);
            CloseHandle(self.handle.0);
        }
        info!(pipe = ?self.name, "named pipe was closed");
    }

    fn name(&self) -> String {
        self.name.display().to_string()
    }
}

/// The connected client of a [`NamedPipeListener`].
pub struct PipeStream {
    handle: RawPipe,
    busy: Arc<AtomicBool>,
    closed: Arc<AtomicBool>,
}

impl Read for PipeStream {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if self.closed.load(Ordering::SeqCst) {
            return Ok(0);
        }

        let len = buf.len().min(u32::MAX as usize) as u32;
        let mut read = 0u32;
        // SAFETY: `buf` is valid for `len` bytes and `read` outlives the call.
        let ok = unsafe {
            ReadFile(
                self.handle.0,
                buf.as_mut_ptr(),
                len,
                &mut read,
                ptr::null_mut(),
            )
        };
        if ok != 0 {
            return Ok(read as usize);
        }

        let err = io::Error::last_os_error();
        match err.raw_os_error() {
            // Message larger than `buf`; the rest arrives on the next read.
            Some(code) if code == ERROR_MORE_DATA as i32 => Ok(read as usize),
            Some(code)
                if code == ERROR_BROKEN_PIPE as i32 || code == ERROR_PIPE_NOT_CONNECTED as i32 =>
            {
                Ok(0)
            }
            _ => Err(err),
        }
    }
}

impl Drop for PipeStream {
    fn drop(&mut self) {
        if !self.closed.load(Ordering::SeqCst) {
            // SAFETY: the listener has not closed the handle yet.
            unsafe {
                DisconnectNamedPipe(self.handle.0);
            }
        }
        self.busy.store(false, Ordering::SeqCst);
    }
}

/// Client end of the named-pipe channel. Write-only.
pub struct NamedPipeClient {
    config: ChannelConfig,
    writer: Mutex<Option<FrameWriter<File>>>,
}

impl NamedPipeClient {
    pub fn new(config: ChannelConfig) -> Self {
        info!(pipe = ?config.path, "prepare pipe transport as client");
        let client = Self {
            config,
            writer: Mutex::new(None),
        };
        client.connect();
        client
    }

    fn open_locked(&self, writer: &mut Option<FrameWriter<File>>) -> bool {
        if writer.is_some() {
            return true;
        }
        match OpenOptions::new().write(true).open(&self.config.path) {
            Ok(file) => {
                *writer = Some(FrameWriter::new(file));
                info!(pipe = ?self.config.path, "connected to named pipe");
                true
            }
            Err(err) => {
                debug!(pipe = ?self.config.path, error = %err, "named pipe is not available");
                false
            }
        }
    }
}

impl Transport for NamedPipeClient {
    fn role(&self) -> Role {
        Role::Client
    }

    fn state(&self) -> TransportState {
        if self.writer.lock().is_some() {
            TransportState::Ready
        } else {
            TransportState::Disconnected
        }
    }

    fn connect(&self) {
        let mut writer = self.writer.lock();
        self.open_locked(&mut writer);
    }

    fn disconnect(&self) {
        if self.writer.lock().take().is_some() {
            info!(pipe = ?self.config.path, "disconnected from named pipe");
        }
    }

    fn read(&self) -> Option<Message> {
        warn!("pipe client transport is write-only");
        None
    }

    fn write(&self, message: &Message) {
        let mut guard = self.writer.lock();
        if !self.open_locked(&mut guard) {
            debug!(%message, "named pipe is not open; dropping message");
            return;
        }
        let Some(writer) = guard.as_mut() else {
            return;
        };

        let sent = writer
            .send(message)
            .and_then(|()| writer.get_ref().sync_all().map_err(FrameError::Io));
        match sent {
            Ok(()) => debug!(%message, "message sent"),
            Err(err) => {
                error!(%message, error = %err, "cannot write to named pipe; dropping message");
                *guard = None;
            }
        }
    }

    fn transport_name(&self) -> &'static str {
        "named-pipe"
    }
}

impl Drop for NamedPipeClient {
    fn drop(&mut self) {
        self.disconnect();
    }
}
