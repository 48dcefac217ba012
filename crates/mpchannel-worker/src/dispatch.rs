use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use mpchannel_frame::Message;
use mpchannel_transport::{open_transport, ChannelConfig, Role, Transport};
use tracing::{debug, error, info};

use crate::error::{Result, WorkerError};
use crate::executor::PowerExecutor;

/// Where the dispatch loop is in its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoopState {
    /// Waiting for the transport to become ready.
    Disconnected,
    /// Reading and dispatching commands.
    Listening,
    /// Stop requested; finishing the current tick.
    Stopping,
    Stopped,
}

impl fmt::Display for LoopState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LoopState::Disconnected => f.write_str("disconnected"),
            LoopState::Listening => f.write_str("listening"),
            LoopState::Stopping => f.write_str("stopping"),
            LoopState::Stopped => f.write_str("stopped"),
        }
    }
}

/// Requests a cooperative stop of a [`DispatchLoop`] from any thread.
#[derive(Clone)]
pub struct StopHandle {
    stop: Arc<AtomicBool>,
    transport: Arc<dyn Transport>,
}

impl StopHandle {
    /// Flag the loop to stop and disconnect its transport. Idempotent.
    pub fn stop(&self) {
        if !self.stop.swap(true, Ordering::SeqCst) {
            info!("worker stop requested");
        }
        self.transport.disconnect();
    }

    pub fn is_stop_requested(&self) -> bool {
        self.stop.load(Ordering::SeqCst)
    }
}

/// The worker's main loop.
///
/// Keeps the server transport connected, reads commands one at a time and
/// hands each to the executor on the loop's own thread. Nothing received
/// from the channel can end the loop; only a [`StopHandle`] does.
pub struct DispatchLoop<E> {
    transport: Arc<dyn Transport>,
    executor: E,
    poll_interval: Duration,
    stop: Arc<AtomicBool>,
    state: LoopState,
    dispatched: u64,
}

impl<E: PowerExecutor> DispatchLoop<E> {
    pub fn new(transport: Arc<dyn Transport>, executor: E, poll_interval: Duration) -> Self {
        Self {
            transport,
            executor,
            poll_interval,
            stop: Arc::new(AtomicBool::new(false)),
            state: LoopState::Disconnected,
            dispatched: 0,
        }
    }

    /// Open the platform's server transport described by `config`.
    pub fn open(config: &ChannelConfig, executor: E) -> Result<Self> {
        let transport = open_transport(Role::Server, config)?;
        Ok(Self::new(
            Arc::from(transport),
            executor,
            config.poll_interval,
        ))
    }

    pub fn stop_handle(&self) -> StopHandle {
        StopHandle {
            stop: Arc::clone(&self.stop),
            transport: Arc::clone(&self.transport),
        }
    }

    pub fn state(&self) -> LoopState {
        self.state
    }

    /// Commands the executor completed successfully.
    pub fn dispatched(&self) -> u64 {
        self.dispatched
    }

    pub fn executor(&self) -> &E {
        &self.executor
    }

    pub fn transport(&self) -> &Arc<dyn Transport> {
        &self.transport
    }

    /// Run until a stop is requested.
    pub fn run(&mut self) -> Result<()> {
        if self.state == LoopState::Stopped {
            return Err(WorkerError::AlreadyStopped);
        }
        info!(transport = self.transport.transport_name(), "worker started");

        while !self.stop.load(Ordering::SeqCst) {
            self.tick();
        }

        self.state = LoopState::Stopping;
        // A connect racing the stop request may have reopened the endpoint.
        self.transport.disconnect();
        thread::sleep(self.poll_interval);
        self.state = LoopState::Stopped;
        info!(dispatched = self.dispatched, "worker was shutdown");
        Ok(())
    }

    /// One loop iteration. Returns the message dispatched, if any.
    pub fn tick(&mut self) -> Option<Message> {
        if self.stop.load(Ordering::SeqCst) {
            return None;
        }

        if !self.transport.is_ready() {
            if self.state != LoopState::Disconnected {
                info!("transport is not ready; reconnecting");
            }
            self.state = LoopState::Disconnected;
            self.transport.connect();
            thread::sleep(self.poll_interval);
            return None;
        }

        if self.state != LoopState::Listening {
            info!(transport = self.transport.transport_name(), "listening for power commands");
            self.state = LoopState::Listening;
        }

        match self.transport.read() {
            Some(message) => {
                self.dispatch(&message);
                Some(message)
            }
            None => {
                debug!("no message");
                // Transports that already slept in `read` make an idle tick two intervals long.
                thread::sleep(self.poll_interval);
                None
            }
        }
    }

    fn dispatch(&mut self, message: &Message) {
        let kind = message.kind();
        info!(action = %kind, timeout = message.timeout(), "dispatching power command");
        match self.executor.execute(message) {
            Ok(()) => self.dispatched += 1,
            Err(err) => error!(action = %kind, error = %err, "power command failed"),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::Ordering;
    use std::time::Instant;

    use mpchannel_frame::{encode_to_vec, MessageKind};
    use mpchannel_transport::TransportState;

    use super::*;
    use crate::testing::{MemoryTransport, RecordingExecutor};

    const POLL: Duration = Duration::from_millis(5);

    fn dispatch_loop(
        transport: MemoryTransport,
    ) -> (
        Arc<MemoryTransport>,
        RecordingExecutor,
        DispatchLoop<RecordingExecutor>,
    ) {
        let transport = Arc::new(transport);
        let executor = RecordingExecutor::default();
        let dispatch = DispatchLoop::new(transport.clone(), executor.clone(), POLL);
        (transport, executor, dispatch)
    }

    #[test]
    fn shutdown_frame_reaches_executor() {
        assert_eq!(
            encode_to_vec(&Message::shutdown(5)).unwrap(),
            b"-->\nShutdownMessage\n{\"timeout\": 5}\n<--\n"
        );

        let (_transport, executor, mut dispatch) =
            dispatch_loop(MemoryTransport::ready(Role::Server, vec![Message::shutdown(5)]));

        assert_eq!(dispatch.tick(), Some(Message::shutdown(5)));
        assert_eq!(executor.calls(), vec![(MessageKind::Shutdown, 5)]);
        assert_eq!(dispatch.dispatched(), 1);
        assert_eq!(dispatch.state(), LoopState::Listening);
    }

    #[test]
    fn routes_every_variant_in_order() {
        let (_transport, executor, mut dispatch) = dispatch_loop(MemoryTransport::ready(
            Role::Server,
            vec![Message::reboot(1), Message::sleep(2), Message::shutdown(3)],
        ));

        while dispatch.tick().is_some() {}

        assert_eq!(
            executor.calls(),
            vec![
                (MessageKind::Reboot, 1),
                (MessageKind::Sleep, 2),
                (MessageKind::Shutdown, 3),
            ]
        );
    }

    #[test]
    fn not_ready_transport_is_retried() {
        let (transport, executor, mut dispatch) =
            dispatch_loop(MemoryTransport::unreachable(Role::Server));

        assert_eq!(transport.read(), None);
        assert_eq!(dispatch.tick(), None);
        assert_eq!(dispatch.tick(), None);

        assert_eq!(dispatch.state(), LoopState::Disconnected);
        assert_eq!(transport.connects.load(Ordering::SeqCst), 2);
        assert!(executor.calls().is_empty());
    }

    #[test]
    fn executor_failure_does_not_stop_the_loop() {
        let transport = Arc::new(MemoryTransport::ready(
            Role::Server,
            vec![Message::shutdown(1), Message::reboot(2)],
        ));
        let executor = RecordingExecutor::failing();
        let mut dispatch = DispatchLoop::new(transport.clone(), executor.clone(), POLL);

        assert!(dispatch.tick().is_some());
        assert!(dispatch.tick().is_some());

        assert_eq!(executor.calls().len(), 2);
        assert_eq!(dispatch.dispatched(), 0);
    }

    #[test]
    fn stop_handle_ends_run() {
        let (transport, executor, mut dispatch) =
            dispatch_loop(MemoryTransport::ready(Role::Server, vec![Message::sleep(9)]));
        let stop = dispatch.stop_handle();

        let worker = thread::spawn(move || {
            dispatch.run().unwrap();
            dispatch
        });

        let deadline = Instant::now() + Duration::from_secs(5);
        while executor.calls().is_empty() && Instant::now() < deadline {
            thread::sleep(POLL);
        }
        stop.stop();
        stop.stop();

        let dispatch = worker.join().unwrap();
        assert!(stop.is_stop_requested());
        assert_eq!(dispatch.state(), LoopState::Stopped);
        assert_eq!(executor.calls(), vec![(MessageKind::Sleep, 9)]);
        assert_eq!(transport.state(), TransportState::Disconnected);
        assert!(transport.disconnects.load(Ordering::SeqCst) >= 2);
    }

    #[test]
    fn stop_before_run_returns_immediately() {
        let (transport, executor, mut dispatch) =
            dispatch_loop(MemoryTransport::ready(Role::Server, vec![Message::reboot(0)]));
        dispatch.stop_handle().stop();

        dispatch.run().unwrap();

        assert_eq!(dispatch.state(), LoopState::Stopped);
        assert!(executor.calls().is_empty());
        assert_eq!(transport.connects.load(Ordering::SeqCst), 0);
        assert!(matches!(dispatch.run(), Err(WorkerError::AlreadyStopped)));
    }

    #[cfg(unix)]
    #[test]
    fn dispatches_from_fifo() {
        let dir = std::env::temp_dir().join(format!(
            "mpchannel-worker-{}-{}",
            std::process::id(),
            std::time::SystemTime::now()
                .duration_since(std::time::UNIX_EPOCH)
                .expect("time should be after epoch")
                .as_nanos()
        ));
        std::fs::create_dir_all(&dir).unwrap();
        let config = ChannelConfig::at(dir.join("worker.pipe")).with_poll_interval(POLL);

        let executor = RecordingExecutor::default();
        let mut dispatch = DispatchLoop::open(&config, executor.clone()).unwrap();
        let stop = dispatch.stop_handle();
        let worker = thread::spawn(move || dispatch.run());

        let client = open_transport(Role::Client, &config).unwrap();
        client.write(&Message::sleep(3));
        client.write(&Message::reboot(4));

        let deadline = Instant::now() + Duration::from_secs(5);
        while executor.calls().len() < 2 && Instant::now() < deadline {
            thread::sleep(POLL);
        }
        stop.stop();
        worker.join().unwrap().unwrap();

        assert_eq!(
            executor.calls(),
            vec![(MessageKind::Sleep, 3), (MessageKind::Reboot, 4)]
        );
        assert!(!config.path.exists());
        drop(client);
        let _ = std::fs::remove_dir_all(&dir);
    }
}
