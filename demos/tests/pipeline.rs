//! End-to-end tests of the connection pipeline:
//! memory pipe -> multistream-select -> secure channel -> mplex -> app protocol.

use async_std::task;
use meshlink_core::identity::Keypair;
use meshlink_core::multistream::Negotiator;
use meshlink_core::muxing::StreamMuxer;
use meshlink_core::ping;
use meshlink_core::secure_io::SecureInfo;
use meshlink_core::transport::memory::MemoryTransport;
use meshlink_core::transport::upgrade::TransportUpgrade;
use meshlink_core::transport::{Transport, TransportError, TransportListener};
use meshlink_core::upgrade::Selector;
use meshlink_core::{Multiaddr, PeerId};
use meshlink_mplex as mplex;
use meshlink_noise::NoiseConfig;
use meshlink_secio as secio;
use meshlink_traits::{ReadEx, WriteEx};
use std::time::Duration;

fn memory_addr() -> Multiaddr {
    format!("/memory/{}", rand::random::<u64>().saturating_add(1))
        .parse()
        .unwrap()
}

async fn ping_server<T>(transport: T, addr: Multiaddr, expect_peer: PeerId)
where
    T: Transport<Output = meshlink_core::muxing::IStreamMuxer> + Send + 'static,
{
    let mut listener = transport.listen_on(addr).expect("listen");
    let mut muxer = listener.accept().await.expect("accept");
    assert_eq!(muxer.remote_peer(), expect_peer);
    if let Some(bg) = muxer.task() {
        task::spawn(bg);
    }

    let stream = muxer.accept_stream().await.expect("accept stream");
    let negotiator = Negotiator::new_with_protocols(vec![ping::PING_PROTOCOL]);
    let (_, mut stream) = negotiator.negotiate(stream).await.expect("negotiate");
    ping::handle(&mut stream).await.expect("serve ping");
}

async fn ping_client<T>(transport: T, addr: Multiaddr, expect_peer: PeerId)
where
    T: Transport<Output = meshlink_core::muxing::IStreamMuxer> + Send + 'static,
{
    task::sleep(Duration::from_millis(100)).await;
    let mut muxer = transport.dial(addr).await.expect("dial");
    assert_eq!(muxer.remote_peer(), expect_peer);
    if let Some(bg) = muxer.task() {
        task::spawn(bg);
    }

    let stream = muxer.open_stream().await.expect("open stream");
    let negotiator = Negotiator::new_with_protocols(vec![ping::PING_PROTOCOL]);
    let (_, mut stream) = negotiator.select_one(stream).await.expect("select");

    for _ in 0..3 {
        ping::ping(&mut stream).await.expect("ping");
    }
    stream.close2().await.expect("close stream");
    muxer.close().await.expect("close connection");
}

#[test]
fn secio_mplex_ping() {
    let addr = memory_addr();
    let server_key = Keypair::generate_ed25519();
    let client_key = Keypair::generate_ed25519();
    let server_id: PeerId = server_key.public().into();
    let client_id: PeerId = client_key.public().into();

    let server_transport = TransportUpgrade::new(
        MemoryTransport::new(),
        secio::Config::new(server_key),
        mplex::Config::new(),
    );
    let client_transport = TransportUpgrade::new(
        MemoryTransport::new(),
        secio::Config::new(client_key),
        mplex::Config::new(),
    );

    let server = task::spawn(ping_server(server_transport, addr.clone(), client_id));
    task::block_on(async move {
        ping_client(client_transport, addr, server_id).await;
        server.await;
    });
}

#[test]
fn noise_mplex_ping() {
    let addr = memory_addr();
    let server_key = Keypair::generate_ed25519();
    let client_key = Keypair::generate_ed25519();
    let server_id: PeerId = server_key.public().into();
    let client_id: PeerId = client_key.public().into();

    let server_transport = TransportUpgrade::new(
        MemoryTransport::new(),
        NoiseConfig::new(server_key),
        mplex::Config::new(),
    );
    let client_transport = TransportUpgrade::new(
        MemoryTransport::new(),
        NoiseConfig::new(client_key),
        mplex::Config::new(),
    );

    let server = task::spawn(ping_server(server_transport, addr.clone(), client_id));
    task::block_on(async move {
        ping_client(client_transport, addr, server_id).await;
        server.await;
    });
}

#[test]
fn security_is_negotiated_by_name() {
    // the dialer prefers noise, the listener announces both; multistream
    // settles on noise
    let addr = memory_addr();
    let server_key = Keypair::generate_ed25519();
    let client_key = Keypair::generate_ed25519();
    let server_id: PeerId = server_key.public().into();
    let client_id: PeerId = client_key.public().into();

    let server_transport = TransportUpgrade::new(
        MemoryTransport::new(),
        Selector::new(
            secio::Config::new(server_key.clone()),
            NoiseConfig::new(server_key),
        ),
        mplex::Config::new(),
    );
    let client_transport = TransportUpgrade::new(
        MemoryTransport::new(),
        Selector::new(
            NoiseConfig::new(client_key.clone()),
            secio::Config::new(client_key),
        ),
        mplex::Config::new(),
    );

    let server = task::spawn(ping_server(server_transport, addr.clone(), client_id));
    task::block_on(async move {
        ping_client(client_transport, addr, server_id).await;
        server.await;
    });
}

#[test]
fn silent_listener_times_out() {
    let addr = memory_addr();

    // a listener that accepts the raw pipe but never negotiates anything
    let mut listener = MemoryTransport::new().listen_on(addr.clone()).expect("listen");
    let hold = task::spawn(async move {
        let socket = listener.accept().await.expect("accept");
        task::sleep(Duration::from_secs(5)).await;
        drop(socket);
    });

    task::block_on(async move {
        task::sleep(Duration::from_millis(50)).await;
        let transport = TransportUpgrade::new(
            MemoryTransport::new(),
            secio::Config::new(Keypair::generate_ed25519()),
            mplex::Config::new(),
        )
        .timeout(Duration::from_millis(300));

        match transport.dial(addr).await {
            Err(TransportError::Timeout) => {}
            Err(e) => panic!("unexpected error: {}", e),
            Ok(_) => panic!("upgrade against a mute listener must not succeed"),
        }
        drop(hold);
    });
}

#[test]
fn concurrent_streams_over_one_secured_connection() {
    let addr = memory_addr();
    let server_key = Keypair::generate_ed25519();
    let client_key = Keypair::generate_ed25519();

    let server_transport = TransportUpgrade::new(
        MemoryTransport::new(),
        secio::Config::new(server_key),
        mplex::Config::new(),
    );
    let client_transport = TransportUpgrade::new(
        MemoryTransport::new(),
        secio::Config::new(client_key),
        mplex::Config::new(),
    );

    let echo_addr = addr.clone();
    let server = task::spawn(async move {
        let mut listener = server_transport.listen_on(echo_addr).expect("listen");
        let mut muxer = listener.accept().await.expect("accept");
        if let Some(bg) = muxer.task() {
            task::spawn(bg);
        }
        // echo every stream until the connection goes away
        while let Ok(stream) = muxer.accept_stream().await {
            task::spawn(async move {
                let r = stream.clone();
                let w = stream;
                let _ = meshlink_traits::copy(r, w).await;
            });
        }
    });

    task::block_on(async move {
        task::sleep(Duration::from_millis(100)).await;
        let mut muxer = client_transport.dial(addr).await.expect("dial");
        if let Some(bg) = muxer.task() {
            task::spawn(bg);
        }

        let mut handles = Vec::new();
        for i in 0..8u8 {
            let mut stream = muxer.open_stream().await.expect("open");
            handles.push(task::spawn(async move {
                let data = vec![i; 4096];
                stream.write_all2(&data).await.expect("write");
                let mut frame = vec![0u8; data.len()];
                stream.read_exact2(&mut frame).await.expect("read");
                assert_eq!(frame, data);
                stream.close2().await.expect("close");
            }));
        }
        for h in handles {
            h.await;
        }
        muxer.close().await.expect("close connection");
        server.await;
    });
}
