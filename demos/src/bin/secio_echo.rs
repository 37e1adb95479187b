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

//! Two secio-secured endpoints over an in-process pipe: one echoes, the
//! other sends a message and prints the round trip.

use async_std::task;
use log::info;
use meshlink_core::identity::Keypair;
use meshlink_core::transport::memory::Channel;
use meshlink_secio::Config;
use meshlink_traits::{ReadEx, WriteEx};

fn main() {
    env_logger::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let (a, b) = Channel::pair();

    let server = task::spawn(async move {
        let key = Keypair::generate_ed25519();
        let (mut stream, _, _) = Config::new(key).handshake(a).await.expect("server handshake");
        let mut buf = [0u8; 11];
        stream.read_exact2(&mut buf).await.expect("read");
        stream.write_all2(&buf).await.expect("write");
        info!("S: echoed {} bytes", buf.len());
    });

    task::block_on(async move {
        let key = Keypair::generate_ed25519();
        let (mut stream, remote_key, _) = Config::new(key).handshake(b).await.expect("client handshake");
        info!("C: secure channel to {:?}", remote_key);

        stream.write_all2(b"hello world").await.expect("write");
        let mut buf = [0u8; 11];
        stream.read_exact2(&mut buf).await.expect("read");
        info!("C: got back {:?}", std::str::from_utf8(&buf).unwrap());

        server.await;
    });
}
