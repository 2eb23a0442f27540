// Copyright 2021 Cargill Incorporated
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! The communication substrate: framed TCP links to peers, one receive loop per link and a
//! single dispatch loop.
//!
//! Outbound messages are queued by [`Substrate::send`](crate::links::Sender::send) and written
//! by the dispatch loop in FIFO order. Inbound frames are decoded by the receive loops and queued
//! for [`Substrate::receive`]. Both loops run until the shared [`Lifecycle`] reaches `Finished`
//! or the substrate is stopped. While the lifecycle is `Failed`, frames in either direction are
//! dropped.
//!
//! A substrate created with [`Substrate::listen`] owns its listener. Whenever its link has no
//! connection, the receive loop accepts the next one on the same listener.

mod queue;

use std::fmt::Display;
use std::io::{self, ErrorKind, Read, Write};
use std::net::{Shutdown, TcpListener, TcpStream, ToSocketAddrs};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use parking_lot::Mutex;

use crate::error::{DecodeError, InternalError};
use crate::lifecycle::{Lifecycle, SystemStatus};
use crate::links::{Receiver, Sender};
use crate::process::Peer;
use crate::protocol::{encode_frame, Frame, FrameBuffer, Message};

pub use queue::Queue;

/// How long a loop blocks before re-checking the lifecycle.
pub const POLL_INTERVAL: Duration = Duration::from_millis(50);

const FLUSH_POLL: Duration = Duration::from_millis(5);
const READ_CHUNK: usize = 1024;

/// A message together with the peer it came from or is bound for.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Envelope {
    pub peer: Peer,
    pub message: Message,
}

struct Connection {
    stream: TcpStream,
    buffer: FrameBuffer,
}

struct Link {
    peer: Peer,
    reader: Mutex<Option<Connection>>,
    writer: Mutex<Option<TcpStream>>,
}

enum ReadOutcome {
    Frames(Vec<Result<Frame, DecodeError>>),
    Idle,
    Closed(Option<io::Error>),
    Disconnected,
}

impl Link {
    fn new(peer: Peer) -> Self {
        Link {
            peer,
            reader: Mutex::new(None),
            writer: Mutex::new(None),
        }
    }

    fn install(&self, stream: TcpStream) -> io::Result<()> {
        stream.set_nodelay(true)?;
        stream.set_read_timeout(Some(POLL_INTERVAL))?;
        let writer = stream.try_clone()?;
        *self.writer.lock() = Some(writer);
        *self.reader.lock() = Some(Connection {
            stream,
            buffer: FrameBuffer::new(),
        });
        Ok(())
    }

    fn close_writer(&self) {
        if let Some(stream) = self.writer.lock().take() {
            // The peer may already be gone.
            let _ = stream.shutdown(Shutdown::Both);
        }
    }

    fn close(&self) {
        self.close_writer();
        self.reader.lock().take();
    }

    fn read_once(&self, chunk: &mut [u8]) -> ReadOutcome {
        let mut guard = self.reader.lock();
        let connection = match guard.as_mut() {
            Some(connection) => connection,
            None => return ReadOutcome::Disconnected,
        };

        match connection.stream.read(chunk) {
            Ok(0) => {
                *guard = None;
                ReadOutcome::Closed(None)
            }
            Ok(read) => {
                connection.buffer.extend(&chunk[..read]);
                let mut frames = Vec::new();
                while let Some(decoded) = connection.buffer.next_frame() {
                    frames.push(decoded);
                }
                ReadOutcome::Frames(frames)
            }
            Err(err)
                if matches!(
                    err.kind(),
                    ErrorKind::WouldBlock | ErrorKind::TimedOut | ErrorKind::Interrupted
                ) =>
            {
                ReadOutcome::Idle
            }
            Err(err) => {
                *guard = None;
                ReadOutcome::Closed(Some(err))
            }
        }
    }

    fn write(&self, message: &Message) -> Option<io::Result<()>> {
        let bytes = match encode_frame(&Frame::new(message.clone())) {
            Ok(bytes) => bytes,
            Err(err) => return Some(Err(io::Error::new(ErrorKind::InvalidInput, err))),
        };
        let mut writer = self.writer.lock();
        let result = writer
            .as_mut()
            .map(|stream| stream.write_all(&bytes).and_then(|_| stream.flush()));
        if matches!(result, Some(Err(_))) {
            *writer = None;
        }
        result
    }
}

struct Shared {
    links: Vec<Link>,
    listener: Option<TcpListener>,
    outbound: Queue<Envelope>,
    inbound: Queue<Envelope>,
    in_flight: AtomicUsize,
    lifecycle: Lifecycle,
    stopped: AtomicBool,
}

impl Shared {
    fn running(&self) -> bool {
        !self.stopped.load(Ordering::SeqCst) && !self.lifecycle.is_finished()
    }

    fn link(&self, peer: Peer) -> Option<&Link> {
        self.links.iter().find(|link| link.peer == peer)
    }

    fn accept(&self, link: &Link) -> bool {
        let listener = match &self.listener {
            Some(listener) => listener,
            None => return false,
        };

        match listener.accept() {
            Ok((stream, address)) => {
                let installed = stream
                    .set_nonblocking(false)
                    .and_then(|_| link.install(stream));
                match installed {
                    Ok(()) => {
                        info!("Accepted {} connection from {}", link.peer, address);
                        true
                    }
                    Err(err) => {
                        warn!("Unable to set up connection from {}: {}", address, err);
                        false
                    }
                }
            }
            Err(err) if err.kind() == ErrorKind::WouldBlock => false,
            Err(err) => {
                warn!("Unable to accept connection: {}", err);
                false
            }
        }
    }

    fn deliver(&self, peer: Peer, frame: Frame) {
        if frame.message == Message::Shutdown {
            info!("Shutdown received from {}", peer);
            if let Err(err) = self.lifecycle.transition(SystemStatus::Finished) {
                warn!("{}", err);
            }
            return;
        }

        if self.lifecycle.is(SystemStatus::Failed) {
            debug!("Dropping {:?} from {} while failed", frame.message, peer);
            return;
        }

        trace!("Received {:?} from {}", frame.message, peer);
        self.inbound.push(Envelope {
            peer,
            message: frame.message,
        });
    }

    fn write(&self, envelope: Envelope) {
        let link = match self.link(envelope.peer) {
            Some(link) => link,
            None => {
                warn!("No link to {}; dropping {:?}", envelope.peer, envelope.message);
                return;
            }
        };

        match link.write(&envelope.message) {
            Some(Ok(())) => trace!("Sent {:?} to {}", envelope.message, envelope.peer),
            Some(Err(err)) => warn!(
                "Unable to send {:?} to {}: {}",
                envelope.message, envelope.peer, err
            ),
            None => warn!(
                "Not connected to {}; dropping {:?}",
                envelope.peer, envelope.message
            ),
        }
    }
}

fn receive_loop(shared: Arc<Shared>, index: usize) {
    let link = &shared.links[index];
    let mut chunk = [0u8; READ_CHUNK];

    while shared.running() {
        match link.read_once(&mut chunk) {
            ReadOutcome::Frames(frames) => {
                for decoded in frames {
                    match decoded {
                        Ok(frame) => shared.deliver(link.peer, frame),
                        Err(err) => warn!(
                            "Protocol violation from {}: {}; frame dropped",
                            link.peer, err
                        ),
                    }
                }
            }
            ReadOutcome::Idle => (),
            ReadOutcome::Closed(err) => {
                link.close_writer();
                match err {
                    Some(err) => warn!("Connection to {} failed: {}", link.peer, err),
                    None => info!("Connection to {} closed", link.peer),
                }
                if shared.listener.is_some() && shared.running() {
                    info!("Waiting for {} to reconnect", link.peer);
                }
            }
            ReadOutcome::Disconnected => {
                if !shared.accept(link) {
                    thread::sleep(POLL_INTERVAL);
                }
            }
        }
    }

    debug!("Receive loop for {} exiting", link.peer);
}

fn dispatch_loop(shared: Arc<Shared>) {
    while shared.running() {
        let envelope = match shared.outbound.pop_timeout(POLL_INTERVAL) {
            Some(envelope) => envelope,
            None => continue,
        };

        if shared.lifecycle.is(SystemStatus::Failed) {
            debug!(
                "Dropping {:?} to {} while failed",
                envelope.message, envelope.peer
            );
        } else {
            shared.write(envelope);
        }
        shared.in_flight.fetch_sub(1, Ordering::SeqCst);
    }

    debug!("Dispatch loop exiting");
}

/// Framed message exchange with a fixed set of peers.
pub struct Substrate {
    shared: Arc<Shared>,
    workers: Mutex<Vec<JoinHandle<()>>>,
}

impl Substrate {
    /// Dials every peer and starts the loops.
    ///
    /// # Errors
    ///
    /// Returns an [`InternalError`] if any peer cannot be reached.
    pub fn connect<A>(peers: &[(Peer, A)], lifecycle: Lifecycle) -> Result<Self, InternalError>
    where
        A: ToSocketAddrs + Display,
    {
        let mut links = Vec::with_capacity(peers.len());
        for (peer, address) in peers {
            let stream = TcpStream::connect(address).map_err(|err| {
                InternalError::with_message(format!(
                    "Unable to connect to {} at {}: {}",
                    peer, address, err
                ))
            })?;
            let link = Link::new(*peer);
            link.install(stream).map_err(|err| {
                InternalError::with_message(format!(
                    "Unable to set up connection to {}: {}",
                    peer, err
                ))
            })?;
            info!("Connected to {} at {}", peer, address);
            links.push(link);
        }

        Self::start(links, None, lifecycle)
    }

    /// Accepts the coordinator's connections on `listener` and starts the loops.
    ///
    /// Returns immediately; the connection is accepted by the receive loop.
    pub fn listen(listener: TcpListener, lifecycle: Lifecycle) -> Result<Self, InternalError> {
        listener
            .set_nonblocking(true)
            .map_err(|err| InternalError::from_source(Box::new(err)))?;
        if let Ok(address) = listener.local_addr() {
            info!("Listening on {}", address);
        }

        Self::start(vec![Link::new(Peer::Coordinator)], Some(listener), lifecycle)
    }

    fn start(
        links: Vec<Link>,
        listener: Option<TcpListener>,
        lifecycle: Lifecycle,
    ) -> Result<Self, InternalError> {
        let shared = Arc::new(Shared {
            links,
            listener,
            outbound: Queue::new(),
            inbound: Queue::new(),
            in_flight: AtomicUsize::new(0),
            lifecycle,
            stopped: AtomicBool::new(false),
        });

        let substrate = Substrate {
            shared: Arc::clone(&shared),
            workers: Mutex::new(Vec::new()),
        };

        for (index, link) in shared.links.iter().enumerate() {
            let loop_shared = Arc::clone(&shared);
            substrate.spawn(format!("receive-{}", link.peer), move || {
                receive_loop(loop_shared, index)
            })?;
        }
        let loop_shared = Arc::clone(&shared);
        substrate.spawn("dispatch".into(), move || dispatch_loop(loop_shared))?;

        Ok(substrate)
    }

    fn spawn<F>(&self, name: String, body: F) -> Result<(), InternalError>
    where
        F: FnOnce() + Send + 'static,
    {
        let handle = thread::Builder::new()
            .name(name)
            .spawn(body)
            .map_err(|err| InternalError::from_source(Box::new(err)))?;
        self.workers.lock().push(handle);
        Ok(())
    }

    /// Waits up to `timeout` for the next inbound message.
    pub fn receive(&self, timeout: Duration) -> Option<Envelope> {
        self.shared.inbound.pop_timeout(timeout)
    }

    /// Waits until `deadline` for the next inbound message.
    pub fn receive_until(&self, deadline: Instant) -> Option<Envelope> {
        self.shared.inbound.pop_until(deadline)
    }

    /// Tells `peer` that no more transactions will follow.
    pub fn shutdown_peer(&self, peer: Peer) -> Result<(), InternalError> {
        self.send(&peer, Message::Shutdown)
    }

    /// Waits up to `timeout` for every queued outbound message to be written.
    ///
    /// Returns false if messages remain when the timeout expires.
    pub fn flush(&self, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        while self.shared.in_flight.load(Ordering::SeqCst) > 0 {
            if Instant::now() >= deadline || !self.shared.running() {
                return false;
            }
            thread::sleep(FLUSH_POLL);
        }
        true
    }

    /// Drops the current connections. A listening substrate then accepts a new one on the same
    /// listener; a dialing substrate stays disconnected.
    pub fn reconnect(&self) {
        for link in &self.shared.links {
            link.close();
        }
        info!("Connections closed; awaiting reconnection");
    }

    /// Discards every queued message in both directions.
    pub fn fail(&self) {
        let dropped_out = self.shared.outbound.clear();
        self.shared
            .in_flight
            .fetch_sub(dropped_out, Ordering::SeqCst);
        let dropped_in = self.shared.inbound.clear();
        debug!(
            "Discarded {} outbound and {} inbound messages",
            dropped_out, dropped_in
        );
    }

    /// Stops the loops and closes every connection.
    pub fn stop(&self) {
        self.shared.stopped.store(true, Ordering::SeqCst);
        for link in &self.shared.links {
            link.close();
        }

        let workers: Vec<JoinHandle<()>> = self.workers.lock().drain(..).collect();
        for worker in workers {
            if worker.join().is_err() {
                error!("Substrate worker panicked");
            }
        }
    }
}

impl Sender<Peer> for Substrate {
    fn send(&self, to_process: &Peer, message: Message) -> Result<(), InternalError> {
        if self.shared.stopped.load(Ordering::SeqCst) {
            return Err(InternalError::with_message(format!(
                "Unable to send {:?} to {}: substrate stopped",
                message, to_process
            )));
        }
        if self.shared.link(*to_process).is_none() {
            return Err(InternalError::with_message(format!(
                "Unable to send {:?}: no link to {}",
                message, to_process
            )));
        }

        self.shared.in_flight.fetch_add(1, Ordering::SeqCst);
        self.shared.outbound.push(Envelope {
            peer: *to_process,
            message,
        });
        Ok(())
    }
}

impl Receiver<Peer> for Substrate {
    fn recv_until(&self, deadline: Instant) -> Option<(Peer, Message)> {
        self.receive_until(deadline)
            .map(|envelope| (envelope.peer, envelope.message))
    }
}

impl Drop for Substrate {
    fn drop(&mut self) {
        self.stop();
    }
}
