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

use crate::connection::{stream::Stream, ControlCommand};
use crate::error::ConnectionError;

use futures::channel::{mpsc, oneshot};
use futures::SinkExt;

/// Handle to a connection's event loop: opens and accepts streams and closes
/// the connection. Cheap to clone.
#[derive(Clone)]
pub struct Control {
    sender: mpsc::Sender<ControlCommand>,
}

impl Control {
    pub(crate) fn new(sender: mpsc::Sender<ControlCommand>) -> Self {
        Control { sender }
    }

    /// Opens a new outbound stream towards the remote.
    pub async fn open_stream(&mut self) -> Result<Stream, ConnectionError> {
        let (tx, rx) = oneshot::channel();
        self.sender.send(ControlCommand::OpenStream(tx)).await?;
        rx.await?
    }

    /// Accepts the next stream opened by the remote.
    pub async fn accept_stream(&mut self) -> Result<Stream, ConnectionError> {
        let (tx, rx) = oneshot::channel();
        self.sender.send(ControlCommand::AcceptStream(tx)).await?;
        rx.await?
    }

    /// Closes the connection: every stream is reset and the socket is closed.
    pub async fn close(&mut self) -> Result<(), ConnectionError> {
        let (tx, rx) = oneshot::channel();
        if self.sender.send(ControlCommand::CloseConnection(tx)).await.is_err() {
            // already closed
            return Ok(());
        }
        // the loop drops the sender when it exits; either way we are done
        let _ = rx.await;
        Ok(())
    }
}
