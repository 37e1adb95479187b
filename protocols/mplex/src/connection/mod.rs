// Copyright 2020 Netwarps Ltd.
//
// Permission is hereby granted, free of charge, to any person obtaining a
// copy of this software and associated documentation files (the "Software"),
// to deal in the Software without restriction, including without limitation
// the rights to use, copy, modify, merge, publish, distribute, sublicense,
// and/or sell copies of the Software, and to permit persons to whom the
// Software is furnished to do so, subject to the following conditions:
//
// The above copyright notice and this permission notice shall be included in
// all copies or substantial portions of the Software.
//
// THE SOFTWARE IS PROVIDED "AS IS", WITHOUT WARRANTY OF ANY KIND, EXPRESS
// OR IMPLIED, INCLUDING BUT NOT LIMITED TO THE WARRANTIES OF MERCHANTABILITY,
// FITNESS FOR A PARTICULAR PURPOSE AND NONINFRINGEMENT. IN NO EVENT SHALL THE
// AUTHORS OR COPYRIGHT HOLDERS BE LIABLE FOR ANY CLAIM, DAMAGES OR OTHER
// LIABILITY, WHETHER IN AN ACTION OF CONTRACT, TORT OR OTHERWISE, ARISING
// FROM, OUT OF OR IN CONNECTION WITH THE SOFTWARE OR THE USE OR OTHER
// DEALINGS IN THE SOFTWARE.

//! The mplex connection: one task owning the frame I/O, the stream registry
//! and every piece of per-connection mutable state.

pub mod control;
pub mod stream;

pub use control::Control;
pub use stream::Stream;

use crate::error::ConnectionError;
use crate::frame::header::Tag;
use crate::frame::io::{FrameDecodeError, IO};
use crate::frame::Frame;
use stream::{Shared, State};

use futures::channel::{mpsc, oneshot};
use futures::{select, SinkExt, StreamExt};
use log::{debug, trace};
use meshlink_traits::SplitEx;
use std::collections::{HashMap, HashSet, VecDeque};
use std::fmt;
use std::io;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

/// How many inbound data frames one stream may buffer before the connection
/// stops reading from the socket.
const STREAM_QUEUE_CAP: usize = 32;
/// Command channel depths.
const COMMAND_CAP: usize = 32;
/// Frames in flight between the socket reader and the event loop.
const FRAME_CAP: usize = 8;

/// Connection identifier, for logs only.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct Id(usize);

impl Id {
    pub(crate) fn new(n: usize) -> Self {
        Id(n)
    }

    fn fresh() -> Self {
        static NEXT: AtomicUsize = AtomicUsize::new(0);
        Id(NEXT.fetch_add(1, Ordering::Relaxed))
    }
}

impl fmt::Display for Id {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "mplex-{}", self.0)
    }
}

/// Whether this end dialed or accepted the connection; decides the parity of
/// locally assigned stream ids (dialer streams are odd).
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Mode {
    Client,
    Server,
}

pub(crate) enum StreamCommand {
    SendFrame(Frame),
    CloseStream { id: u64, initiator: bool },
    ResetStream { id: u64, initiator: bool },
}

pub(crate) enum ControlCommand {
    OpenStream(oneshot::Sender<Result<Stream, ConnectionError>>),
    AcceptStream(oneshot::Sender<Result<Stream, ConnectionError>>),
    CloseConnection(oneshot::Sender<()>),
}

/// A multiplexed connection over a (typically already secured) socket.
///
/// Call [`Connection::control`] for a handle, then drive [`Connection::run`]
/// on a task; the connection does nothing until it is run.
pub struct Connection<T: SplitEx> {
    id: Id,
    mode: Mode,
    reader: IO<T::Reader>,
    writer: IO<T::Writer>,
    control_tx: mpsc::Sender<ControlCommand>,
    control_rx: mpsc::Receiver<ControlCommand>,
    stream_tx: mpsc::Sender<StreamCommand>,
    stream_rx: mpsc::Receiver<StreamCommand>,
}

impl<T: SplitEx> fmt::Debug for Connection<T> {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_struct("Connection")
            .field("id", &self.id)
            .field("mode", &self.mode)
            .finish()
    }
}

impl<T: SplitEx> Connection<T> {
    pub fn new(socket: T, mode: Mode) -> Self {
        let id = Id::fresh();
        let (reader, writer) = socket.split();
        let (control_tx, control_rx) = mpsc::channel(COMMAND_CAP);
        let (stream_tx, stream_rx) = mpsc::channel(COMMAND_CAP);
        debug!("{}: new connection ({:?})", id, mode);
        Connection {
            id,
            mode,
            reader: IO::new(id, reader),
            writer: IO::new(id, writer),
            control_tx,
            control_rx,
            stream_tx,
            stream_rx,
        }
    }

    /// Returns the connection id.
    pub fn id(&self) -> Id {
        self.id
    }

    /// Returns a handle for opening/accepting streams and closing.
    pub fn control(&self) -> Control {
        Control::new(self.control_tx.clone())
    }

    /// Drives the connection until it is closed by either side.
    ///
    /// Frames are pumped from the socket through a small queue into the
    /// event loop; a stream whose inbound queue is full therefore stalls the
    /// whole connection read path, which is the backpressure the remote
    /// observes.
    pub async fn run(self) -> Result<(), ConnectionError> {
        let Connection {
            id,
            mode,
            mut reader,
            writer,
            control_rx,
            stream_rx,
            stream_tx,
            control_tx,
        } = self;
        drop(control_tx);

        let (mut frame_tx, frame_rx) = mpsc::channel(FRAME_CAP);
        let reader_loop = async move {
            loop {
                match reader.recv_frame().await {
                    Ok(frame) => {
                        if frame_tx.send(Ok(frame)).await.is_err() {
                            break;
                        }
                    }
                    Err(e) => {
                        let _ = frame_tx.send(Err(e)).await;
                        break;
                    }
                }
            }
        };

        let mut actor = Actor {
            id,
            writer,
            stream_tx,
            control_rx,
            stream_rx,
            frame_rx,
            streams: HashMap::new(),
            pending_streams: VecDeque::new(),
            accept_waiters: VecDeque::new(),
            reset_keys: HashSet::new(),
            next_stream_id: match mode {
                Mode::Client => 1,
                Mode::Server => 0,
            },
        };
        let event_loop = async move {
            let result = actor.run().await;
            // dropping the actor closes the frame queue, releasing the
            // reader should it still be pumping
            drop(actor);
            result
        };
        let (_, result) = futures::join!(reader_loop, event_loop);
        debug!("{}: connection terminated", id);
        result
    }
}

struct StreamEntry {
    /// Queue feeding the stream's reader; `None` once the remote closed its
    /// write half.
    data_tx: Option<mpsc::Sender<Vec<u8>>>,
    shared: Arc<Mutex<Shared>>,
}

enum Event {
    Frame(Option<Result<Frame, FrameDecodeError>>),
    StreamCommand(Option<StreamCommand>),
    ControlCommand(Option<ControlCommand>),
}

struct Actor<W> {
    id: Id,
    writer: IO<W>,
    stream_tx: mpsc::Sender<StreamCommand>,
    control_rx: mpsc::Receiver<ControlCommand>,
    stream_rx: mpsc::Receiver<StreamCommand>,
    frame_rx: mpsc::Receiver<Result<Frame, FrameDecodeError>>,
    streams: HashMap<(u64, bool), StreamEntry>,
    /// Inbound streams nobody accepted yet.
    pending_streams: VecDeque<Stream>,
    /// Accept calls waiting for an inbound stream.
    accept_waiters: VecDeque<oneshot::Sender<Result<Stream, ConnectionError>>>,
    /// Streams that died by reset; late frames for them are dropped.
    reset_keys: HashSet<(u64, bool)>,
    next_stream_id: u64,
}

impl<W: meshlink_traits::WriteEx + Unpin + Send> Actor<W> {
    async fn run(&mut self) -> Result<(), ConnectionError> {
        let result = self.process().await;
        // also on error paths, no stream survives its connection
        self.shutdown().await;
        result
    }

    async fn process(&mut self) -> Result<(), ConnectionError> {
        loop {
            let event = select! {
                frame = self.frame_rx.next() => Event::Frame(frame),
                cmd = self.stream_rx.next() => Event::StreamCommand(cmd),
                cmd = self.control_rx.next() => Event::ControlCommand(cmd),
            };
            match event {
                Event::Frame(Some(Ok(frame))) => self.on_frame(frame).await?,
                Event::Frame(Some(Err(e))) => {
                    // a remote that closed the socket between frames is a
                    // normal end of the connection
                    if let FrameDecodeError::Io(ref io_err) = e {
                        if io_err.kind() == io::ErrorKind::UnexpectedEof {
                            return Ok(());
                        }
                    }
                    return Err(e.into());
                }
                Event::Frame(None) => {
                    return Ok(());
                }
                Event::StreamCommand(Some(cmd)) => self.on_stream_command(cmd).await?,
                Event::StreamCommand(None) => unreachable!("the actor holds a sender"),
                Event::ControlCommand(Some(ControlCommand::CloseConnection(reply))) => {
                    self.shutdown().await;
                    let _ = reply.send(());
                    return Ok(());
                }
                Event::ControlCommand(Some(cmd)) => self.on_control_command(cmd).await?,
                Event::ControlCommand(None) => {
                    // every Control handle is gone
                    return Ok(());
                }
            }
        }
    }

    async fn on_frame(&mut self, frame: Frame) -> Result<(), ConnectionError> {
        let Frame { header, body } = frame;
        match header.tag {
            Tag::NewStream => {
                let key = (header.stream_id, false);
                if self.streams.contains_key(&key) {
                    debug!(
                        "{}: remote reopened live stream {}, resetting it",
                        self.id, header.stream_id
                    );
                    self.writer.send_frame(&Frame::reset(header.stream_id, false)).await?;
                    self.remove_stream(key);
                    self.remember_reset(key);
                    return Ok(());
                }
                self.reset_keys.remove(&key);
                let (tx, rx) = mpsc::channel(STREAM_QUEUE_CAP);
                let shared = Arc::new(Mutex::new(Shared::new()));
                let stream = Stream::new(
                    header.stream_id,
                    false,
                    self.id,
                    self.stream_tx.clone(),
                    shared.clone(),
                    rx,
                );
                self.streams.insert(
                    key,
                    StreamEntry {
                        data_tx: Some(tx),
                        shared,
                    },
                );
                trace!("{}: new inbound stream {}", self.id, header.stream_id);
                self.deliver_accepted(stream);
            }
            Tag::MessageReceiver | Tag::MessageInitiator => {
                let key = (header.stream_id, header.is_local_initiator());
                if let Some(entry) = self.streams.get_mut(&key) {
                    let readable = entry.shared.lock().expect("mplex stream lock").state().can_read();
                    if !readable {
                        debug!(
                            "{}: message for read-closed stream {}, resetting it",
                            self.id, header.stream_id
                        );
                        self.writer.send_frame(&Frame::reset(header.stream_id, key.1)).await?;
                        self.remove_stream(key);
                        self.remember_reset(key);
                        return Ok(());
                    }
                    let delivered = match entry.data_tx.as_mut() {
                        // a full queue blocks here, pausing all reads
                        Some(tx) => tx.send(body).await.is_ok(),
                        None => false,
                    };
                    if !delivered {
                        debug!(
                            "{}: stream {} abandoned by its owner, resetting it",
                            self.id, header.stream_id
                        );
                        self.writer.send_frame(&Frame::reset(header.stream_id, key.1)).await?;
                        self.remove_stream(key);
                        self.remember_reset(key);
                    }
                } else if self.reset_keys.contains(&key) {
                    trace!("{}: dropping frame for reset stream {}", self.id, header.stream_id);
                } else {
                    debug!(
                        "{}: message for unknown stream {}, resetting it",
                        self.id, header.stream_id
                    );
                    self.writer.send_frame(&Frame::reset(header.stream_id, key.1)).await?;
                    self.remember_reset(key);
                }
            }
            Tag::CloseReceiver | Tag::CloseInitiator => {
                let key = (header.stream_id, header.is_local_initiator());
                if let Some(entry) = self.streams.get_mut(&key) {
                    trace!("{}: remote closed stream {}", self.id, header.stream_id);
                    entry.data_tx = None;
                    let now = {
                        let mut shared = entry.shared.lock().expect("mplex stream lock");
                        shared.eof = true;
                        shared.update_state(self.id, header.stream_id, State::RecvClosed);
                        shared.state()
                    };
                    if now == State::Closed {
                        self.streams.remove(&key);
                    }
                }
            }
            Tag::ResetReceiver | Tag::ResetInitiator => {
                let key = (header.stream_id, header.is_local_initiator());
                if self.streams.contains_key(&key) {
                    trace!("{}: remote reset stream {}", self.id, header.stream_id);
                    self.remove_stream(key);
                    self.remember_reset(key);
                }
            }
        }
        Ok(())
    }

    async fn on_stream_command(&mut self, cmd: StreamCommand) -> Result<(), ConnectionError> {
        match cmd {
            StreamCommand::SendFrame(frame) => {
                self.writer.send_frame(&frame).await?;
            }
            StreamCommand::CloseStream { id, initiator } => {
                self.writer.send_frame(&Frame::close(id, initiator)).await?;
                let key = (id, initiator);
                if let Some(entry) = self.streams.get(&key) {
                    let now = {
                        let mut shared = entry.shared.lock().expect("mplex stream lock");
                        shared.update_state(self.id, id, State::SendClosed);
                        shared.state()
                    };
                    if now == State::Closed {
                        self.streams.remove(&key);
                    }
                }
            }
            StreamCommand::ResetStream { id, initiator } => {
                self.writer.send_frame(&Frame::reset(id, initiator)).await?;
                self.streams.remove(&(id, initiator));
            }
        }
        Ok(())
    }

    async fn on_control_command(&mut self, cmd: ControlCommand) -> Result<(), ConnectionError> {
        match cmd {
            ControlCommand::OpenStream(reply) => {
                let id = self.next_stream_id;
                self.next_stream_id += 2;
                if let Err(e) = self.writer.send_frame(&Frame::new_stream(id, Vec::new())).await {
                    let _ = reply.send(Err(ConnectionError::Io(e)));
                    return Err(ConnectionError::Closed);
                }
                let key = (id, true);
                let (tx, rx) = mpsc::channel(STREAM_QUEUE_CAP);
                let shared = Arc::new(Mutex::new(Shared::new()));
                let stream =
                    Stream::new(id, true, self.id, self.stream_tx.clone(), shared.clone(), rx);
                self.streams.insert(
                    key,
                    StreamEntry {
                        data_tx: Some(tx),
                        shared,
                    },
                );
                trace!("{}: new outbound stream {}", self.id, id);
                let _ = reply.send(Ok(stream));
            }
            ControlCommand::AcceptStream(reply) => {
                if let Some(stream) = self.pending_streams.pop_front() {
                    let _ = reply.send(Ok(stream));
                } else {
                    self.accept_waiters.push_back(reply);
                }
            }
            ControlCommand::CloseConnection(_) => unreachable!("handled by the event loop"),
        }
        Ok(())
    }

    fn deliver_accepted(&mut self, mut stream: Stream) {
        while let Some(waiter) = self.accept_waiters.pop_front() {
            match waiter.send(Ok(stream)) {
                Ok(()) => return,
                // the accept future was dropped, try the next waiter
                Err(Ok(s)) => stream = s,
                Err(Err(_)) => return,
            }
        }
        self.pending_streams.push_back(stream);
    }

    fn remove_stream(&mut self, key: (u64, bool)) {
        if let Some(entry) = self.streams.remove(&key) {
            let mut shared = entry.shared.lock().expect("mplex stream lock");
            shared.reset = true;
            shared.update_state(self.id, key.0, State::Closed);
        }
    }

    fn remember_reset(&mut self, key: (u64, bool)) {
        // coarse bound; an overflow forgets old resets, which at worst turns
        // a silent drop into one extra reset frame
        if self.reset_keys.len() >= 4096 {
            self.reset_keys.clear();
        }
        self.reset_keys.insert(key);
    }

    async fn shutdown(&mut self) {
        debug!("{}: shutting down, resetting {} streams", self.id, self.streams.len());
        let keys = self.streams.keys().cloned().collect::<Vec<_>>();
        for key in keys {
            self.remove_stream(key);
        }
        for waiter in self.accept_waiters.drain(..) {
            let _ = waiter.send(Err(ConnectionError::Closed));
        }
        self.pending_streams.clear();
        let _ = self.writer.close().await;
    }
}
