use std::ffi::CString;
use std::fs::{File, OpenOptions};
use std::io::ErrorKind;
use std::os::unix::ffi::OsStrExt;
use std::os::unix::fs::{FileTypeExt, MetadataExt, OpenOptionsExt, PermissionsExt};
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;

use mpchannel_frame::{FrameReader, FrameWriter, Message, ReadEvent};
use parking_lot::Mutex;
use tracing::{debug, error, info, warn};

use crate::config::ChannelConfig;
use crate::error::{Result, TransportError};
use crate::traits::{Role, Transport, TransportState};

enum Endpoint {
    Closed,
    Reader(FrameReader<File>),
    Writer(FrameWriter<File>),
}

/// FIFO special file transport.
///
/// The server (worker) creates the FIFO and reads from it; the client
/// (controller) opens the same path for writing. Both ends open lazily:
/// every read and write first retries the open, and a missing peer simply
/// leaves the transport not ready. Both ends use non-blocking opens, so
/// the worker never hangs waiting for a writer and the controller never
/// hangs waiting for a reader.
pub struct FifoTransport {
    role: Role,
    config: ChannelConfig,
    endpoint: Mutex<Endpoint>,
    /// Identity of the FIFO the server owns and removes on disconnect.
    owned_inode: Mutex<Option<(u64, u64)>>,
    shut_down: AtomicBool,
}

impl FifoTransport {
    /// Create the FIFO if needed and open it for reading.
    pub fn server(config: ChannelConfig) -> Result<Self> {
        info!(path = ?config.path, "prepare fifo transport as server");
        let owned_inode = prepare_fifo(&config.path, config.fifo_mode)?;
        let transport = Self::new(Role::Server, config, owned_inode);
        transport.connect();
        Ok(transport)
    }

    /// Open the FIFO for writing if a worker is already listening.
    pub fn client(config: ChannelConfig) -> Self {
        info!(path = ?config.path, "prepare fifo transport as client");
        let transport = Self::new(Role::Client, config, None);
        transport.connect();
        transport
    }

    fn new(role: Role, config: ChannelConfig, owned_inode: Option<(u64, u64)>) -> Self {
        Self {
            role,
            config,
            endpoint: Mutex::new(Endpoint::Closed),
            owned_inode: Mutex::new(owned_inode),
            shut_down: AtomicBool::new(false),
        }
    }

    /// The FIFO path.
    pub fn path(&self) -> &Path {
        &self.config.path
    }

    fn try_open_locked(&self, endpoint: &mut Endpoint) -> bool {
        if !matches!(endpoint, Endpoint::Closed) {
            return true;
        }

        match open_fifo(&self.config.path, self.role) {
            Ok(Some(file)) => {
                *endpoint = match self.role {
                    Role::Server => Endpoint::Reader(FrameReader::with_chunk_size(
                        file,
                        self.config.read_chunk_size,
                    )),
                    Role::Client => Endpoint::Writer(FrameWriter::new(file)),
                };
                info!(path = ?self.config.path, role = %self.role, "fifo was opened");
                true
            }
            Ok(None) => false,
            Err(err) => {
                warn!(error = %err, "cannot open fifo");
                false
            }
        }
    }

    fn remove_owned_fifo(&self) {
        let Some((expected_dev, expected_ino)) = self.owned_inode.lock().take() else {
            return;
        };

        match std::fs::symlink_metadata(&self.config.path) {
            Ok(metadata)
                if metadata.file_type().is_fifo()
                    && metadata.dev() == expected_dev
                    && metadata.ino() == expected_ino =>
            {
                match std::fs::remove_file(&self.config.path) {
                    Ok(()) => info!(path = ?self.config.path, "fifo was deleted"),
                    Err(err) => warn!(path = ?self.config.path, error = %err, "cannot delete fifo"),
                }
            }
            Ok(_) => debug!(
                path = ?self.config.path,
                "fifo path identity changed; skipping cleanup"
            ),
            Err(_) => {}
        }
    }
}

impl Transport for FifoTransport {
    fn role(&self) -> Role {
        self.role
    }

    fn state(&self) -> TransportState {
        if !matches!(*self.endpoint.lock(), Endpoint::Closed) {
            TransportState::Ready
        } else if !self.shut_down.load(Ordering::SeqCst) && self.config.path.exists() {
            TransportState::Connecting
        } else {
            TransportState::Disconnected
        }
    }

    fn connect(&self) {
        self.shut_down.store(false, Ordering::SeqCst);

        if self.role == Role::Server && !self.config.path.exists() {
            match prepare_fifo(&self.config.path, self.config.fifo_mode) {
                Ok(inode) => *self.owned_inode.lock() = inode,
                Err(err) => {
                    warn!(error = %err, "cannot prepare fifo");
                    return;
                }
            }
        }

        let mut endpoint = self.endpoint.lock();
        if !self.try_open_locked(&mut endpoint) {
            debug!(path = ?self.config.path, "fifo is not available yet");
        }
    }

    fn disconnect(&self) {
        self.shut_down.store(true, Ordering::SeqCst);

        let previous = std::mem::replace(&mut *self.endpoint.lock(), Endpoint::Closed);
        if !matches!(previous, Endpoint::Closed) {
            info!(path = ?self.config.path, "fifo was closed");
        }
        drop(previous);

        if self.role == Role::Server {
            self.remove_owned_fifo();
        }
    }

    /// Block until a frame decodes.
    ///
    /// Returns `None` only when the FIFO cannot be opened or the transport
    /// is disconnected while waiting.
    fn read(&self) -> Option<Message> {
        loop {
            if self.shut_down.load(Ordering::SeqCst) {
                return None;
            }

            let event = {
                let mut endpoint = self.endpoint.lock();
                if !self.try_open_locked(&mut endpoint) {
                    return None;
                }
                let Endpoint::Reader(reader) = &mut *endpoint else {
                    warn!("fifo client transport cannot read");
                    return None;
                };
                let event = reader.next_message();
                // Every writer is gone; nobody can finish what they left behind.
                if matches!(event, Ok(ReadEvent::Eof)) {
                    let dropped = reader.discard_partial();
                    if dropped > 0 {
                        debug!(bytes = dropped, "writer closed mid-frame; dropping partial data");
                    }
                }
                event
            };

            match event {
                Ok(ReadEvent::Item(message)) => {
                    info!(%message, "new message was received");
                    return Some(message);
                }
                // No writer attached, or nothing written yet.
                Ok(ReadEvent::WouldBlock) | Ok(ReadEvent::Eof) => {
                    thread::sleep(self.config.poll_interval);
                }
                Err(err) => {
                    warn!(error = %err, "fifo read failed; reopening");
                    *self.endpoint.lock() = Endpoint::Closed;
                    thread::sleep(self.config.poll_interval);
                }
            }
        }
    }

    fn write(&self, message: &Message) {
        let mut endpoint = self.endpoint.lock();
        if !self.try_open_locked(&mut endpoint) {
            debug!(path = ?self.config.path, %message, "fifo is not open; dropping message");
            return;
        }

        let Endpoint::Writer(writer) = &mut *endpoint else {
            warn!("fifo server transport cannot write");
            return;
        };

        match writer.send(message) {
            Ok(()) => debug!(%message, "message sent"),
            Err(err) => {
                error!(%message, error = %err, "cannot write to fifo; dropping message");
                *endpoint = Endpoint::Closed;
            }
        }
    }

    fn transport_name(&self) -> &'static str {
        "fifo"
    }
}

impl Drop for FifoTransport {
    fn drop(&mut self) {
        self.disconnect();
    }
}

/// Create the FIFO at `path` unless one already exists.
///
/// Returns the identity of the FIFO so the server only ever removes the
/// file it set up. An existing path that is not a FIFO is left alone and
/// reported as an error.
fn prepare_fifo(path: &Path, mode: u32) -> Result<Option<(u64, u64)>> {
    let create_error = |source: std::io::Error| TransportError::Create {
        path: path.to_path_buf(),
        source,
    };

    match std::fs::symlink_metadata(path) {
        Ok(metadata) if metadata.file_type().is_fifo() => {
            debug!(?path, "reusing existing fifo");
            return Ok(Some((metadata.dev(), metadata.ino())));
        }
        Ok(_) => {
            return Err(create_error(std::io::Error::new(
                ErrorKind::AlreadyExists,
                "existing path is not a fifo",
            )))
        }
        Err(err) if err.kind() == ErrorKind::NotFound => {}
        Err(err) => return Err(create_error(err)),
    }

    let c_path = CString::new(path.as_os_str().as_bytes()).map_err(|_| {
        create_error(std::io::Error::new(
            ErrorKind::InvalidInput,
            "path contains a NUL byte",
        ))
    })?;

    // SAFETY: `c_path` is a valid NUL-terminated string that outlives the call.
    let rc = unsafe { libc::mkfifo(c_path.as_ptr(), mode as libc::mode_t) };
    if rc != 0 {
        let err = std::io::Error::last_os_error();
        if err.kind() != ErrorKind::AlreadyExists {
            return Err(create_error(err));
        }
    }

    // mkfifo honours the umask; chmod does not.
    std::fs::set_permissions(path, std::fs::Permissions::from_mode(mode)).map_err(create_error)?;
    let metadata = std::fs::symlink_metadata(path).map_err(create_error)?;
    info!(?path, mode = %format!("{mode:o}"), "fifo was created");

    Ok(Some((metadata.dev(), metadata.ino())))
}

/// Open one end of the FIFO without blocking.
///
/// `Ok(None)` means the peer side is not there yet: the path is missing,
/// or (for the writer) no reader has the FIFO open.
fn open_fifo(path: &Path, role: Role) -> Result<Option<File>> {
    let metadata = match std::fs::symlink_metadata(path) {
        Ok(metadata) => metadata,
        Err(err) if err.kind() == ErrorKind::NotFound => return Ok(None),
        Err(err) => {
            return Err(TransportError::Open {
                path: path.to_path_buf(),
                source: err,
            })
        }
    };
    if !metadata.file_type().is_fifo() {
        return Err(TransportError::Open {
            path: path.to_path_buf(),
            source: std::io::Error::new(ErrorKind::InvalidInput, "existing path is not a fifo"),
        });
    }

    let mut options = OpenOptions::new();
    match role {
        Role::Server => {
            options.read(true);
        }
        Role::Client => {
            options.write(true);
        }
    }
    options.custom_flags(libc::O_NONBLOCK);

    match options.open(path) {
        Ok(file) => Ok(Some(file)),
        Err(err) if err.raw_os_error() == Some(libc::ENXIO) => Ok(None),
        Err(err) if err.kind() == ErrorKind::NotFound => Ok(None),
        Err(err) => Err(TransportError::Open {
            path: path.to_path_buf(),
            source: err,
        }),
    }
}
