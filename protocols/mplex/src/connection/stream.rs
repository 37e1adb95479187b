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

use crate::connection::{self, StreamCommand};
use crate::frame::Frame;

use async_trait::async_trait;
use futures::channel::mpsc;
use futures::{lock::Mutex as AsyncMutex, SinkExt, StreamExt};
use meshlink_traits::{ReadEx, WriteEx};
use std::sync::{Arc, Mutex};
use std::{fmt, io};

/// The state of an mplex stream, the product of its two half-states.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum State {
    /// Open bidirectionally.
    Open,
    /// Open for incoming messages; our write half is closed.
    SendClosed,
    /// Open for outgoing messages; the remote's write half is closed.
    RecvClosed,
    /// Closed (terminal state).
    Closed,
}

impl State {
    /// Can we receive messages over this stream?
    pub fn can_read(self) -> bool {
        !matches!(self, State::RecvClosed | State::Closed)
    }

    /// Can we send messages over this stream?
    pub fn can_write(self) -> bool {
        !matches!(self, State::SendClosed | State::Closed)
    }
}

#[derive(Debug)]
pub(crate) struct Shared {
    state: State,
    /// Set when either side resets the stream or the connection goes away.
    pub(crate) reset: bool,
    /// Set when the remote half-closed in an orderly fashion; reads drain to
    /// eof even if the connection is torn down afterwards.
    pub(crate) eof: bool,
}

impl Shared {
    pub(crate) fn new() -> Self {
        Shared {
            state: State::Open,
            reset: false,
            eof: false,
        }
    }

    pub(crate) fn state(&self) -> State {
        self.state
    }

    /// Update the stream state and return the state before it was updated.
    pub(crate) fn update_state(&mut self, cid: connection::Id, sid: u64, next: State) -> State {
        use self::State::*;

        let current = self.state;

        match (current, next) {
            (Closed, _) => {}
            (Open, _) => self.state = next,
            (RecvClosed, Closed) => self.state = Closed,
            (RecvClosed, Open) => {}
            (RecvClosed, RecvClosed) => {}
            (RecvClosed, SendClosed) => self.state = Closed,
            (SendClosed, Closed) => self.state = Closed,
            (SendClosed, Open) => {}
            (SendClosed, RecvClosed) => self.state = Closed,
            (SendClosed, SendClosed) => {}
        }

        log::trace!("{}/{}: update state: ({:?} {:?} {:?})", cid, sid, current, next, self.state);

        current
    }
}

pub(crate) struct ReadHalf {
    pub(crate) rx: mpsc::Receiver<Vec<u8>>,
    buf: Vec<u8>,
}

/// A multiplexed mplex stream.
///
/// Streams are created either outbound via [`crate::connection::Control::open_stream`]
/// or inbound via [`crate::connection::Control::accept_stream`]. Cloned
/// handles share the same read queue and state.
pub struct Stream {
    id: u64,
    /// Whether this end opened the stream; decides the tag parity of
    /// outgoing frames.
    initiator: bool,
    conn: connection::Id,
    sender: mpsc::Sender<StreamCommand>,
    shared: Arc<Mutex<Shared>>,
    read_half: Arc<AsyncMutex<ReadHalf>>,
}

impl fmt::Debug for Stream {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_struct("Stream")
            .field("id", &self.id)
            .field("initiator", &self.initiator)
            .field("connection", &self.conn)
            .finish()
    }
}

impl fmt::Display for Stream {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "(Stream {}/{})", self.conn, self.id)
    }
}

impl Clone for Stream {
    fn clone(&self) -> Self {
        Stream {
            id: self.id,
            initiator: self.initiator,
            conn: self.conn,
            sender: self.sender.clone(),
            shared: self.shared.clone(),
            read_half: self.read_half.clone(),
        }
    }
}

impl Stream {
    pub(crate) fn new(
        id: u64,
        initiator: bool,
        conn: connection::Id,
        sender: mpsc::Sender<StreamCommand>,
        shared: Arc<Mutex<Shared>>,
        rx: mpsc::Receiver<Vec<u8>>,
    ) -> Self {
        Stream {
            id,
            initiator,
            conn,
            sender,
            shared,
            read_half: Arc::new(AsyncMutex::new(ReadHalf { rx, buf: Vec::new() })),
        }
    }

    /// Get this stream's identifier.
    pub fn id(&self) -> u64 {
        self.id
    }

    /// Get this stream's state.
    pub fn state(&self) -> State {
        self.shared().state()
    }

    pub(crate) fn shared(&self) -> std::sync::MutexGuard<'_, Shared> {
        self.shared.lock().expect("mplex stream lock")
    }

    /// Resets the stream: both halves die immediately on both ends.
    pub async fn reset(&mut self) -> io::Result<()> {
        {
            let mut shared = self.shared();
            if shared.reset || shared.state() == State::Closed {
                return Ok(());
            }
            shared.reset = true;
            shared.update_state(self.conn, self.id, State::Closed);
        }
        let cmd = StreamCommand::ResetStream {
            id: self.id,
            initiator: self.initiator,
        };
        self.sender.send(cmd).await.map_err(|_| self.closed_err())?;
        Ok(())
    }

    fn closed_err(&self) -> io::Error {
        let msg = format!("{}/{}: connection is closed", self.conn, self.id);
        io::Error::new(io::ErrorKind::WriteZero, msg)
    }

    fn reset_err(&self) -> io::Error {
        let msg = format!("{}/{}: stream is reset", self.conn, self.id);
        io::Error::new(io::ErrorKind::ConnectionReset, msg)
    }
}

#[async_trait]
impl ReadEx for Stream {
    async fn read2(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let mut rh = self.read_half.lock().await;
        loop {
            if !rh.buf.is_empty() {
                let n = ::std::cmp::min(buf.len(), rh.buf.len());
                buf[..n].copy_from_slice(&rh.buf[..n]);
                rh.buf.drain(..n);
                return Ok(n);
            }
            match rh.rx.next().await {
                Some(chunk) => rh.buf = chunk,
                None => {
                    // the queue is gone: either an orderly half-close or a reset
                    let shared = self.shared();
                    return if shared.eof || !shared.reset {
                        log::trace!("{}/{}: eof", self.conn, self.id);
                        Ok(0)
                    } else {
                        Err(self.reset_err())
                    };
                }
            }
        }
    }
}

#[async_trait]
impl WriteEx for Stream {
    async fn write2(&mut self, buf: &[u8]) -> io::Result<usize> {
        {
            let shared = self.shared();
            if shared.reset {
                return Err(self.reset_err());
            }
            if !shared.state().can_write() {
                log::debug!("{}/{}: can no longer write", self.conn, self.id);
                return Err(io::Error::new(
                    io::ErrorKind::WriteZero,
                    format!("{}/{}: stream is closed", self.conn, self.id),
                ));
            }
        }
        let frame = Frame::message(self.id, self.initiator, buf.to_vec());
        self.sender
            .send(StreamCommand::SendFrame(frame))
            .await
            .map_err(|_| self.closed_err())?;
        Ok(buf.len())
    }

    async fn flush2(&mut self) -> io::Result<()> {
        // frames are flushed by the connection as they are written
        Ok(())
    }

    async fn close2(&mut self) -> io::Result<()> {
        {
            let shared = self.shared();
            if shared.reset || !shared.state().can_write() {
                return Ok(());
            }
        }
        log::trace!("{}/{}: close", self.conn, self.id);
        let cmd = StreamCommand::CloseStream {
            id: self.id,
            initiator: self.initiator,
        };
        self.sender.send(cmd).await.map_err(|_| self.closed_err())?;
        self.shared().update_state(self.conn, self.id, State::SendClosed);
        Ok(())
    }
}
