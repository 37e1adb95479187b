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

//! Three routers chained A - B - C over full pipeline connections: a message
//! published at A floods through B and reaches C exactly once.

use async_std::task;
use futures::StreamExt;
use log::info;
use meshlink_core::identity::Keypair;
use meshlink_core::multistream::Negotiator;
use meshlink_core::muxing::{IStreamMuxer, StreamMuxer};
use meshlink_core::secure_io::SecureInfo;
use meshlink_core::transport::memory::MemoryTransport;
use meshlink_core::transport::upgrade::TransportUpgrade;
use meshlink_core::transport::{Transport, TransportListener};
use meshlink_core::Multiaddr;
use meshlink_floodsub::{Control, FloodSub, FLOODSUB_ID};
use meshlink_mplex as mplex;
use meshlink_secio as secio;

const TOPIC: &str = "chat";

fn transport() -> TransportUpgrade<MemoryTransport, secio::Config, mplex::Config> {
    TransportUpgrade::new(
        MemoryTransport::new(),
        secio::Config::new(Keypair::generate_ed25519()),
        mplex::Config::new(),
    )
}

/// Attaches the two ends of a muxed connection to the two routers.
async fn bind(mut muxer: IStreamMuxer, fs: &mut Control, outbound: bool) {
    if let Some(bg) = muxer.task() {
        task::spawn(bg);
    }
    let peer = muxer.remote_peer();
    let negotiator = Negotiator::new_with_protocols(vec![FLOODSUB_ID]);
    let stream = if outbound {
        let stream = muxer.open_stream().await.expect("open stream");
        let (_, stream) = negotiator.select_one(stream).await.expect("select");
        stream
    } else {
        let stream = muxer.accept_stream().await.expect("accept stream");
        let (_, stream) = negotiator.negotiate(stream).await.expect("negotiate");
        stream
    };
    fs.add_peer(peer, stream).await.expect("add peer");
}

async fn connect(listen_port: u64, server: &mut Control, client: &mut Control) {
    let addr: Multiaddr = format!("/memory/{}", listen_port).parse().unwrap();
    let mut listener = transport().listen_on(addr.clone()).expect("listen");

    let mut server_ctrl = server.clone();
    let accepted = task::spawn(async move {
        let muxer = listener.accept().await.expect("accept");
        bind(muxer, &mut server_ctrl, false).await;
    });

    task::sleep(std::time::Duration::from_millis(50)).await;
    let muxer = transport().dial(addr).await.expect("dial");
    bind(muxer, client, true).await;
    accepted.await;
}

fn main() {
    env_logger::from_env(env_logger::Env::default().default_filter_or("info")).init();

    task::block_on(async {
        let mut a = FloodSub::new(Keypair::generate_ed25519().public().into()).start();
        let mut b = FloodSub::new(Keypair::generate_ed25519().public().into()).start();
        let mut c = FloodSub::new(Keypair::generate_ed25519().public().into()).start();

        let mut sub_b = b.subscribe(TOPIC).await.expect("subscribe b");
        let mut sub_c = c.subscribe(TOPIC).await.expect("subscribe c");
        let _sub_a = a.subscribe(TOPIC).await.expect("subscribe a");

        connect(9001, &mut a, &mut b).await;
        connect(9002, &mut b, &mut c).await;
        task::sleep(std::time::Duration::from_millis(200)).await;

        a.publish(TOPIC, b"hello mesh".to_vec()).await.expect("publish");

        let at_b = sub_b.next().await.expect("message at b");
        info!("B: got {:?}", std::str::from_utf8(&at_b.data).unwrap());
        let at_c = sub_c.next().await.expect("message at c");
        info!("C: got {:?}", std::str::from_utf8(&at_c.data).unwrap());

        info!("message flooded across the mesh");
    });
}
