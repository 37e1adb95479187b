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

//! Flood-style publish/subscribe.
//!
//! Every message is forwarded to every connected peer subscribed to one of
//! its topics, except the peer it arrived from; a bounded seen-cache keyed
//! by `(origin, seqno)` suppresses duplicates and routing loops.

mod control;
mod error;
mod floodsub;
mod protocol;
pub mod rpc_proto;
mod subscription;

pub use crate::control::Control;
pub use crate::error::FloodsubError;
pub use crate::floodsub::{FloodSub, FloodsubMessage, Topic, FLOODSUB_ID};
pub use crate::protocol::{read_rpc, write_rpc};
pub use crate::subscription::Subscription;

#[cfg(test)]
mod tests {
    use super::*;
    use async_std::task;
    use async_trait::async_trait;
    use futures::lock::Mutex as AsyncMutex;
    use futures::StreamExt;
    use meshlink_core::muxing::{IReadWrite, ReadWriteEx, StreamInfo};
    use meshlink_core::transport::memory::{Channel, ChannelReader, ChannelWriter};
    use meshlink_core::PeerId;
    use meshlink_traits::{ReadEx, SplitEx, WriteEx};
    use std::io;
    use std::sync::Arc;
    use std::time::Duration;

    /// A cloneable duplex stream backed by a memory channel, standing in for
    /// a negotiated `/floodsub/1.0.0` substream.
    #[derive(Clone)]
    struct TestStream {
        r: Arc<AsyncMutex<ChannelReader>>,
        w: Arc<AsyncMutex<ChannelWriter>>,
        id: usize,
    }

    #[async_trait]
    impl ReadEx for TestStream {
        async fn read2(&mut self, buf: &mut [u8]) -> io::Result<usize> {
            self.r.lock().await.read2(buf).await
        }
    }

    #[async_trait]
    impl WriteEx for TestStream {
        async fn write2(&mut self, buf: &[u8]) -> io::Result<usize> {
            self.w.lock().await.write2(buf).await
        }

        async fn flush2(&mut self) -> io::Result<()> {
            self.w.lock().await.flush2().await
        }

        async fn close2(&mut self) -> io::Result<()> {
            self.w.lock().await.close2().await
        }
    }

    impl StreamInfo for TestStream {
        fn id(&self) -> usize {
            self.id
        }
    }

    #[async_trait]
    impl ReadWriteEx for TestStream {
        fn box_clone(&self) -> IReadWrite {
            Box::new(self.clone())
        }
    }

    /// Returns the stream handed to the router and the raw wire end driven
    /// by the test.
    fn test_stream(id: usize) -> (IReadWrite, Channel) {
        let (ours, wire) = Channel::pair();
        let (r, w) = ours.split();
        let stream = TestStream {
            r: Arc::new(AsyncMutex::new(r)),
            w: Arc::new(AsyncMutex::new(w)),
            id,
        };
        (Box::new(stream), wire)
    }

    fn sub_rpc(topic: &str, subscribe: bool) -> rpc_proto::Rpc {
        rpc_proto::Rpc {
            subscriptions: vec![rpc_proto::SubOpts {
                subscribe: Some(subscribe),
                topic_id: Some(topic.to_string()),
            }],
            publish: Vec::new(),
            control: None,
        }
    }

    fn publish_rpc(from: &PeerId, seqno: u8, topic: &str, data: &[u8]) -> rpc_proto::Rpc {
        rpc_proto::Rpc {
            subscriptions: Vec::new(),
            publish: vec![rpc_proto::Message {
                from: Some(from.as_bytes().to_vec()),
                data: Some(data.to_vec()),
                seqno: Some(vec![0, 0, 0, 0, 0, 0, 0, seqno]),
                topic_ids: vec![topic.to_string()],
            }],
            control: None,
        }
    }

    async fn expect_silence(wire: &mut Channel) {
        let res = async_std::future::timeout(Duration::from_millis(200), read_rpc(wire)).await;
        assert!(res.is_err(), "expected no rpc, got one");
    }

    async fn settle() {
        task::sleep(Duration::from_millis(100)).await;
    }

    /// Wires a router with a local subscription on `topic` and two remote
    /// peers subscribed to the same topic.
    async fn fanout_fixture(
        topic: &str,
    ) -> (Control, Subscription, (PeerId, Channel), (PeerId, Channel)) {
        let fs = FloodSub::new(PeerId::random());
        let mut ctrl = fs.start();
        let sub = ctrl.subscribe(topic).await.unwrap();

        let peer_b = PeerId::random();
        let (stream_b, mut wire_b) = test_stream(1);
        ctrl.add_peer(peer_b.clone(), stream_b).await.unwrap();
        let hello = read_rpc(&mut wire_b).await.unwrap();
        assert_eq!(hello.subscriptions.len(), 1);
        assert_eq!(hello.subscriptions[0].topic_id.as_deref(), Some(topic));
        write_rpc(&mut wire_b, &sub_rpc(topic, true)).await.unwrap();

        let peer_c = PeerId::random();
        let (stream_c, mut wire_c) = test_stream(2);
        ctrl.add_peer(peer_c.clone(), stream_c).await.unwrap();
        let _hello = read_rpc(&mut wire_c).await.unwrap();
        write_rpc(&mut wire_c, &sub_rpc(topic, true)).await.unwrap();

        settle().await;
        (ctrl, sub, (peer_b, wire_b), (peer_c, wire_c))
    }

    #[test]
    fn flood_fanout() {
        task::block_on(async {
            let (mut ctrl, mut sub, (_, mut wire_b), (_, mut wire_c)) = fanout_fixture("t").await;

            ctrl.publish("t", b"hi".to_vec()).await.unwrap();

            // delivered locally
            let msg = sub.next().await.unwrap();
            assert_eq!(msg.data, b"hi");

            // exactly one rpc to each subscribed peer
            let rpc_b = read_rpc(&mut wire_b).await.unwrap();
            assert_eq!(rpc_b.publish.len(), 1);
            assert_eq!(rpc_b.publish[0].data.as_deref(), Some(&b"hi"[..]));
            let rpc_c = read_rpc(&mut wire_c).await.unwrap();
            assert_eq!(rpc_c.publish.len(), 1);

            expect_silence(&mut wire_b).await;
            expect_silence(&mut wire_c).await;
        });
    }

    #[test]
    fn inbound_is_forwarded_but_never_echoed() {
        task::block_on(async {
            let (_ctrl, mut sub, (_, mut wire_b), (_, mut wire_c)) = fanout_fixture("t").await;

            let origin = PeerId::random();
            write_rpc(&mut wire_b, &publish_rpc(&origin, 1, "t", b"news")).await.unwrap();

            // delivered locally and forwarded to C
            let msg = sub.next().await.unwrap();
            assert_eq!(msg.data, b"news");
            let rpc_c = read_rpc(&mut wire_c).await.unwrap();
            assert_eq!(rpc_c.publish.len(), 1);

            // but never back to B
            expect_silence(&mut wire_b).await;
        });
    }

    #[test]
    fn duplicates_are_suppressed() {
        task::block_on(async {
            let (_ctrl, mut sub, (_, mut wire_b), (_, mut wire_c)) = fanout_fixture("t").await;

            let origin = PeerId::random();
            let rpc = publish_rpc(&origin, 7, "t", b"once");
            write_rpc(&mut wire_b, &rpc).await.unwrap();

            assert_eq!(sub.next().await.unwrap().data, b"once");
            assert_eq!(read_rpc(&mut wire_c).await.unwrap().publish.len(), 1);

            // the same message again, from either side, goes nowhere
            write_rpc(&mut wire_b, &rpc).await.unwrap();
            write_rpc(&mut wire_c, &rpc).await.unwrap();
            expect_silence(&mut wire_c).await;
            expect_silence(&mut wire_b).await;

            let nothing =
                async_std::future::timeout(Duration::from_millis(200), sub.next()).await;
            assert!(nothing.is_err(), "duplicate must not reach subscribers");
        });
    }

    #[test]
    fn topic_filter_is_applied() {
        task::block_on(async {
            let (mut ctrl, _sub, (_, mut wire_b), (_, mut wire_c)) = fanout_fixture("t").await;

            // B additionally subscribes to "u", C does not
            write_rpc(&mut wire_b, &sub_rpc("u", true)).await.unwrap();
            settle().await;

            let _sub_u = ctrl.subscribe("u").await.unwrap();
            // the fresh subscription is announced to both peers
            assert_eq!(read_rpc(&mut wire_b).await.unwrap().subscriptions.len(), 1);
            assert_eq!(read_rpc(&mut wire_c).await.unwrap().subscriptions.len(), 1);

            ctrl.publish("u", b"only for b".to_vec()).await.unwrap();

            let rpc_b = read_rpc(&mut wire_b).await.unwrap();
            assert_eq!(rpc_b.publish.len(), 1);
            expect_silence(&mut wire_c).await;
        });
    }

    #[test]
    fn publish_duplicate_is_rejected() {
        task::block_on(async {
            let (mut ctrl, mut sub, (_, mut wire_b), _) = fanout_fixture("t").await;

            let me = PeerId::random();
            let msg = rpc_proto::Message {
                from: Some(me.as_bytes().to_vec()),
                data: Some(b"fixed".to_vec()),
                seqno: Some(vec![9; 8]),
                topic_ids: vec!["t".to_string()],
            };
            ctrl.publish_message(msg.clone()).await.unwrap();
            assert_eq!(sub.next().await.unwrap().data, b"fixed");
            assert_eq!(read_rpc(&mut wire_b).await.unwrap().publish.len(), 1);

            match ctrl.publish_message(msg).await {
                Err(FloodsubError::MessageAlreadySeen) => {}
                other => panic!("unexpected outcome: {:?}", other.err()),
            }
        });
    }

    #[test]
    fn unsubscribe_is_announced_and_ends_subscriptions() {
        task::block_on(async {
            let (mut ctrl, mut sub, (_, mut wire_b), _) = fanout_fixture("t").await;

            ctrl.unsubscribe("t").await.unwrap();

            let rpc = read_rpc(&mut wire_b).await.unwrap();
            assert_eq!(rpc.subscriptions.len(), 1);
            assert_eq!(rpc.subscriptions[0].subscribe, Some(false));

            // the local subscription stream ends
            assert!(sub.next().await.is_none());
        });
    }

    #[test]
    fn bad_rpc_from_peer_is_contained() {
        task::block_on(async {
            let (mut ctrl, mut sub, (_, mut wire_b), (_, mut wire_c)) = fanout_fixture("t").await;

            // a message without seqno fails validation; the rpc is dropped
            let bad = rpc_proto::Rpc {
                subscriptions: Vec::new(),
                publish: vec![rpc_proto::Message {
                    from: Some(PeerId::random().as_bytes().to_vec()),
                    data: Some(b"zap".to_vec()),
                    seqno: None,
                    topic_ids: vec!["t".to_string()],
                }],
                control: None,
            };
            write_rpc(&mut wire_b, &bad).await.unwrap();
            expect_silence(&mut wire_c).await;

            // the router keeps serving other peers afterwards
            let origin = PeerId::random();
            write_rpc(&mut wire_c, &publish_rpc(&origin, 3, "t", b"fine")).await.unwrap();
            assert_eq!(sub.next().await.unwrap().data, b"fine");
            assert_eq!(read_rpc(&mut wire_b).await.unwrap().publish.len(), 1);

            ctrl.close().await.unwrap();
        });
    }
}
