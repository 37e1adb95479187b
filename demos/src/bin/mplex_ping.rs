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

//! The full pipeline over the memory transport: multistream-select, secio,
//! mplex, then a `/ipfs/ping/1.0.0` substream.

use async_std::task;
use log::info;
use meshlink_core::identity::Keypair;
use meshlink_core::multistream::Negotiator;
use meshlink_core::muxing::StreamMuxer;
use meshlink_core::ping;
use meshlink_core::secure_io::SecureInfo;
use meshlink_core::transport::memory::MemoryTransport;
use meshlink_core::transport::upgrade::TransportUpgrade;
use meshlink_core::transport::{ConnectionInfo, Transport, TransportListener};
use meshlink_core::Multiaddr;
use meshlink_mplex as mplex;
use meshlink_secio as secio;
use meshlink_traits::WriteEx;

fn main() {
    env_logger::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let listen_addr: Multiaddr = "/memory/8086".parse().unwrap();
    let dial_addr = listen_addr.clone();

    let server = task::spawn(async move {
        let key = Keypair::generate_ed25519();
        let transport = TransportUpgrade::new(
            MemoryTransport::new(),
            secio::Config::new(key),
            mplex::Config::new(),
        );
        let mut listener = transport.listen_on(listen_addr).expect("listen");

        let mut muxer = listener.accept().await.expect("accept");
        info!("S: connection from {:?} upgraded", muxer.remote_multiaddr());
        if let Some(bg) = muxer.task() {
            task::spawn(bg);
        }

        let stream = muxer.accept_stream().await.expect("accept stream");
        let negotiator = Negotiator::new_with_protocols(vec![ping::PING_PROTOCOL]);
        let (_, mut stream) = negotiator.negotiate(stream).await.expect("negotiate");
        ping::handle(&mut stream).await.expect("serve ping");
    });

    task::block_on(async move {
        // give the listener a moment to bind
        task::sleep(std::time::Duration::from_millis(100)).await;

        let key = Keypair::generate_ed25519();
        let transport = TransportUpgrade::new(
            MemoryTransport::new(),
            secio::Config::new(key),
            mplex::Config::new(),
        );
        let mut muxer = transport.dial(dial_addr).await.expect("dial");
        info!("C: connected to {}", muxer.remote_peer());
        if let Some(bg) = muxer.task() {
            task::spawn(bg);
        }

        let stream = muxer.open_stream().await.expect("open stream");
        let negotiator = Negotiator::new_with_protocols(vec![ping::PING_PROTOCOL]);
        let (_, mut stream) = negotiator.select_one(stream).await.expect("select");

        for _ in 0..3 {
            let rtt = ping::ping(&mut stream).await.expect("ping");
            info!("C: ping took {:?}", rtt);
        }
        stream.close2().await.expect("close stream");
        muxer.close().await.expect("close connection");
        server.await;
    });
}
