//! The flood router: one task owns every piece of router state and is driven
//! by a command channel fed by the API handles and the per-peer reader tasks.

use crate::control::Control;
use crate::error::FloodsubError;
use crate::protocol;
use crate::rpc_proto;
use crate::subscription::Subscription;

use async_std::task;
use futures::channel::{mpsc, oneshot};
use futures::{SinkExt, StreamExt};
use log::{debug, info, trace, warn};
use lru::LruCache;
use meshlink_core::muxing::IReadWrite;
use meshlink_core::upgrade::ProtocolId;
use meshlink_core::PeerId;
use meshlink_traits::WriteEx;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;

pub const FLOODSUB_ID: ProtocolId = b"/floodsub/1.0.0";

/// How many message ids the dedup cache remembers. Old entries fall out in
/// insertion order, which opens a replay window of one cache generation.
const SEEN_CACHE_SIZE: usize = 10_000;
/// Outbound RPCs a single slow peer may have queued before the router stops
/// preparing more for it.
const PEER_OUTBOUND_CAP: usize = 16;
/// Router command queue depth; peer readers block on it, which is the
/// inbound backpressure.
const COMMAND_CAP: usize = 64;

/// A pubsub topic label.
pub type Topic = String;

/// A message as seen by subscribers.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FloodsubMessage {
    /// The peer that originated the message.
    pub from: PeerId,
    pub data: Vec<u8>,
    /// The 8-byte sequence number assigned by the origin.
    pub seqno: Vec<u8>,
    pub topics: Vec<Topic>,
}

/// The dedup key: origin bytes and seqno, hex-encoded.
pub(crate) fn message_id(from: &[u8], seqno: &[u8]) -> String {
    let mut id = String::with_capacity(2 * (from.len() + seqno.len()));
    for byte in from.iter().chain(seqno) {
        id.push_str(&format!("{:02x}", byte));
    }
    id
}

pub(crate) enum Command {
    Subscribe(Topic, oneshot::Sender<Subscription>),
    Unsubscribe(Topic),
    Publish(rpc_proto::Message, oneshot::Sender<Result<(), FloodsubError>>),
    AddPeer(PeerId, IReadWrite),
    RemovePeer(PeerId),
    Incoming(PeerId, rpc_proto::Rpc),
    Close(oneshot::Sender<()>),
}

/// The flood router service.
///
/// Create it, take as many [`Control`] handles as needed, then spawn
/// [`FloodSub::run`] (or let [`FloodSub::start`] do it).
pub struct FloodSub {
    local_peer: PeerId,
    tx: mpsc::Sender<Command>,
    rx: mpsc::Receiver<Command>,
}

impl FloodSub {
    pub fn new(local_peer: PeerId) -> Self {
        let (tx, rx) = mpsc::channel(COMMAND_CAP);
        FloodSub { local_peer, tx, rx }
    }

    /// Returns a cloneable handle to the router.
    pub fn control(&self) -> Control {
        Control::new(self.tx.clone(), self.local_peer.clone())
    }

    /// Spawns the router task, returning a handle to it.
    pub fn start(self) -> Control {
        let control = self.control();
        task::spawn(self.run());
        control
    }

    /// Drives the router until [`Control::close`] is called.
    pub async fn run(self) {
        let FloodSub { local_peer, tx, rx } = self;
        let mut actor = Actor {
            local_peer,
            tx,
            rx,
            peers: HashMap::new(),
            peer_topics: HashMap::new(),
            subscribed: HashMap::new(),
            seen: LruCache::new(SEEN_CACHE_SIZE),
            pending_rpcs: HashMap::new(),
            pending_promises: HashMap::new(),
        };
        actor.run().await;
        info!("floodsub router exiting...");
    }
}

struct PeerHandle {
    out_tx: mpsc::Sender<OutboundUnit>,
}

/// One merged RPC bound for a peer, with the send-completion observers that
/// resolve once it is on the wire.
struct OutboundUnit {
    rpc: rpc_proto::Rpc,
    promises: Vec<oneshot::Sender<Result<(), FloodsubError>>>,
}

struct Actor {
    local_peer: PeerId,
    /// Handed to peer reader/writer tasks so they can report back.
    tx: mpsc::Sender<Command>,
    rx: mpsc::Receiver<Command>,
    peers: HashMap<PeerId, PeerHandle>,
    peer_topics: HashMap<PeerId, HashSet<Topic>>,
    subscribed: HashMap<Topic, Vec<mpsc::UnboundedSender<Arc<FloodsubMessage>>>>,
    seen: LruCache<String, ()>,
    pending_rpcs: HashMap<PeerId, Vec<rpc_proto::Rpc>>,
    pending_promises: HashMap<PeerId, Vec<oneshot::Sender<Result<(), FloodsubError>>>>,
}

impl Actor {
    async fn run(&mut self) {
        while let Some(cmd) = self.rx.next().await {
            match cmd {
                Command::Subscribe(topic, reply) => self.on_subscribe(topic, reply).await,
                Command::Unsubscribe(topic) => self.on_unsubscribe(topic).await,
                Command::Publish(msg, reply) => self.on_publish(msg, reply).await,
                Command::AddPeer(peer, stream) => self.on_add_peer(peer, stream).await,
                Command::RemovePeer(peer) => self.on_remove_peer(peer),
                Command::Incoming(peer, rpc) => self.on_incoming(peer, rpc).await,
                Command::Close(reply) => {
                    self.on_close();
                    let _ = reply.send(());
                    return;
                }
            }
        }
        self.on_close();
    }

    async fn on_subscribe(&mut self, topic: Topic, reply: oneshot::Sender<Subscription>) {
        let (tx, rx) = mpsc::unbounded();
        let newly = !self.subscribed.contains_key(&topic);
        self.subscribed.entry(topic.clone()).or_default().push(tx);
        let _ = reply.send(Subscription::new(topic.clone(), rx));

        if newly {
            debug!("subscribing to {}", topic);
            let rpc = rpc_proto::Rpc {
                subscriptions: vec![rpc_proto::SubOpts {
                    subscribe: Some(true),
                    topic_id: Some(topic),
                }],
                publish: Vec::new(),
                control: None,
            };
            let all = self.peers.keys().cloned().collect::<Vec<_>>();
            for peer in all {
                self.queue_rpc(&peer, rpc.clone(), None);
            }
            self.flush().await;
        }
    }

    async fn on_unsubscribe(&mut self, topic: Topic) {
        if self.subscribed.remove(&topic).is_none() {
            return;
        }
        debug!("unsubscribing from {}", topic);
        let rpc = rpc_proto::Rpc {
            subscriptions: vec![rpc_proto::SubOpts {
                subscribe: Some(false),
                topic_id: Some(topic),
            }],
            publish: Vec::new(),
            control: None,
        };
        let all = self.peers.keys().cloned().collect::<Vec<_>>();
        for peer in all {
            self.queue_rpc(&peer, rpc.clone(), None);
        }
        self.flush().await;
    }

    async fn on_publish(
        &mut self,
        msg: rpc_proto::Message,
        reply: oneshot::Sender<Result<(), FloodsubError>>,
    ) {
        let id = message_id(
            msg.from.as_deref().unwrap_or_default(),
            msg.seqno.as_deref().unwrap_or_default(),
        );
        if self.seen.contains(&id) {
            let _ = reply.send(Err(FloodsubError::MessageAlreadySeen));
            return;
        }
        let decoded = match self.validate(&msg) {
            Ok(decoded) => decoded,
            Err(e) => {
                let _ = reply.send(Err(e));
                return;
            }
        };
        self.seen.put(id, ());

        let message = Arc::new(decoded);
        self.deliver_locally(&message);

        // flood to every interested peer; the reply resolves when all their
        // writes completed
        let mut receipts = Vec::new();
        let eligible = self.eligible_peers(&message.topics, None);
        for peer in eligible {
            let (tx, rx) = oneshot::channel();
            self.queue_rpc(
                &peer,
                rpc_proto::Rpc {
                    subscriptions: Vec::new(),
                    publish: vec![msg.clone()],
                    control: None,
                },
                Some(tx),
            );
            receipts.push(rx);
        }
        self.flush().await;

        task::spawn(async move {
            for rx in receipts {
                // an individual dead peer does not fail the publish
                let _ = rx.await;
            }
            let _ = reply.send(Ok(()));
        });
    }

    async fn on_add_peer(&mut self, peer: PeerId, stream: IReadWrite) {
        if self.peers.contains_key(&peer) {
            debug!("replacing floodsub stream of {}", peer);
            self.on_remove_peer(peer.clone());
        }
        trace!("floodsub peer {} attached", peer);

        let writer = stream.clone();
        let reader = stream;
        let (out_tx, out_rx) = mpsc::channel(PEER_OUTBOUND_CAP);

        task::spawn(write_loop(peer.clone(), writer, out_rx, self.tx.clone()));
        task::spawn(read_loop(peer.clone(), reader, self.tx.clone()));

        self.peers.insert(peer.clone(), PeerHandle { out_tx });
        self.peer_topics.entry(peer.clone()).or_default();

        // say hello: announce all our subscriptions
        if !self.subscribed.is_empty() {
            let rpc = rpc_proto::Rpc {
                subscriptions: self
                    .subscribed
                    .keys()
                    .map(|t| rpc_proto::SubOpts {
                        subscribe: Some(true),
                        topic_id: Some(t.clone()),
                    })
                    .collect(),
                publish: Vec::new(),
                control: None,
            };
            self.queue_rpc(&peer, rpc, None);
            self.flush().await;
        }
    }

    fn on_remove_peer(&mut self, peer: PeerId) {
        if self.peers.remove(&peer).is_some() {
            trace!("floodsub peer {} detached", peer);
        }
        self.peer_topics.remove(&peer);
        self.pending_rpcs.remove(&peer);
        for promise in self.pending_promises.remove(&peer).into_iter().flatten() {
            let _ = promise.send(Err(FloodsubError::Closed));
        }
    }

    async fn on_incoming(&mut self, peer: PeerId, rpc: rpc_proto::Rpc) {
        trace!(
            "rpc from {}: {} subscriptions, {} messages",
            peer,
            rpc.subscriptions.len(),
            rpc.publish.len()
        );

        // 1. subscription deltas
        if !rpc.subscriptions.is_empty() {
            let topics = self.peer_topics.entry(peer.clone()).or_default();
            for sub in &rpc.subscriptions {
                let topic = match &sub.topic_id {
                    Some(t) => t.clone(),
                    None => continue,
                };
                if sub.subscribe.unwrap_or(false) {
                    topics.insert(topic);
                } else {
                    topics.remove(&topic);
                }
            }
        }

        // 2. control is meaningless to a flood router
        if rpc.control.is_some() {
            trace!("ignoring control from {}", peer);
        }

        // 3. drop already seen messages
        let mut unseen = Vec::new();
        for msg in rpc.publish {
            let id = message_id(
                msg.from.as_deref().unwrap_or_default(),
                msg.seqno.as_deref().unwrap_or_default(),
            );
            if !self.seen.contains(&id) {
                unseen.push((id, msg));
            }
        }
        if unseen.is_empty() {
            return;
        }

        // 4. validate the batch; one bad message rejects the whole rpc
        let mut decoded = Vec::new();
        for (id, msg) in &unseen {
            match self.validate(msg) {
                Ok(d) => decoded.push((id.clone(), msg.clone(), Arc::new(d))),
                Err(e) => {
                    warn!("dropping rpc of {}: {}", peer, e);
                    return;
                }
            }
        }

        for (id, raw, message) in decoded {
            self.deliver_locally(&message);
            self.seen.put(id, ());

            // 5. flood onwards, never back to where it came from
            let eligible = self.eligible_peers(&message.topics, Some(&peer));
            for target in eligible {
                self.queue_rpc(
                    &target,
                    rpc_proto::Rpc {
                        subscriptions: Vec::new(),
                        publish: vec![raw.clone()],
                        control: None,
                    },
                    None,
                );
            }
        }
        self.flush().await;
    }

    fn on_close(&mut self) {
        debug!("closing floodsub, dropping {} peers", self.peers.len());
        self.peers.clear();
        self.peer_topics.clear();
        self.subscribed.clear();
        self.pending_rpcs.clear();
        for promises in std::mem::take(&mut self.pending_promises).into_iter() {
            for promise in promises.1 {
                let _ = promise.send(Err(FloodsubError::Closed));
            }
        }
    }

    /// Field-level checks: a routable message has an origin, a seqno and at
    /// least one topic.
    fn validate(&self, msg: &rpc_proto::Message) -> Result<FloodsubMessage, FloodsubError> {
        let from = msg.from.clone().unwrap_or_default();
        let seqno = msg.seqno.clone().unwrap_or_default();
        if seqno.is_empty() || msg.topic_ids.is_empty() {
            return Err(FloodsubError::InvalidMessage);
        }
        let from = PeerId::from_bytes(from).map_err(|_| FloodsubError::InvalidMessage)?;
        Ok(FloodsubMessage {
            from,
            data: msg.data.clone().unwrap_or_default(),
            seqno,
            topics: msg.topic_ids.clone(),
        })
    }

    fn deliver_locally(&mut self, message: &Arc<FloodsubMessage>) {
        for topic in &message.topics {
            if let Some(subscribers) = self.subscribed.get_mut(topic) {
                subscribers.retain(|sub| sub.unbounded_send(message.clone()).is_ok());
            }
        }
    }

    /// Peers whose subscriptions intersect `topics`, minus the origin.
    fn eligible_peers(&self, topics: &[Topic], exclude: Option<&PeerId>) -> Vec<PeerId> {
        self.peers
            .keys()
            .filter(|p| Some(*p) != exclude)
            .filter(|p| {
                self.peer_topics
                    .get(*p)
                    .map(|subscribed| topics.iter().any(|t| subscribed.contains(t)))
                    .unwrap_or(false)
            })
            .cloned()
            .collect()
    }

    fn queue_rpc(
        &mut self,
        peer: &PeerId,
        rpc: rpc_proto::Rpc,
        promise: Option<oneshot::Sender<Result<(), FloodsubError>>>,
    ) {
        self.pending_rpcs.entry(peer.clone()).or_default().push(rpc);
        if let Some(promise) = promise {
            self.pending_promises.entry(peer.clone()).or_default().push(promise);
        }
    }

    /// Drains the pending parts: one merged RPC per peer, handed to that
    /// peer's writer together with the attached promises.
    async fn flush(&mut self) {
        let pending = std::mem::take(&mut self.pending_rpcs);
        for (peer, parts) in pending {
            let merged = merge_rpcs(parts);
            let promises = self.pending_promises.remove(&peer).unwrap_or_default();

            let handle = match self.peers.get_mut(&peer) {
                Some(handle) => handle,
                None => {
                    for promise in promises {
                        let _ = promise.send(Err(FloodsubError::Closed));
                    }
                    continue;
                }
            };
            let unit = OutboundUnit {
                rpc: merged,
                promises,
            };
            if handle.out_tx.send(unit).await.is_err() {
                // writer died; its promises went down with the unit
                debug!("floodsub writer of {} is gone", peer);
                self.on_remove_peer(peer);
            }
        }
    }
}

/// Protobuf-style merge of the queued parts into a single RPC.
fn merge_rpcs(parts: Vec<rpc_proto::Rpc>) -> rpc_proto::Rpc {
    let mut merged = rpc_proto::Rpc {
        subscriptions: Vec::new(),
        publish: Vec::new(),
        control: None,
    };
    for part in parts {
        merged.subscriptions.extend(part.subscriptions);
        merged.publish.extend(part.publish);
        if part.control.is_some() {
            merged.control = part.control;
        }
    }
    merged
}

async fn write_loop(
    peer: PeerId,
    mut stream: IReadWrite,
    mut out_rx: mpsc::Receiver<OutboundUnit>,
    mut tx: mpsc::Sender<Command>,
) {
    while let Some(unit) = out_rx.next().await {
        match protocol::write_rpc(&mut stream, &unit.rpc).await {
            Ok(()) => {
                for promise in unit.promises {
                    let _ = promise.send(Ok(()));
                }
            }
            Err(e) => {
                debug!("writing rpc to {} failed: {}", peer, e);
                for promise in unit.promises {
                    let _ = promise.send(Err(FloodsubError::Closed));
                }
                let _ = tx.send(Command::RemovePeer(peer.clone())).await;
                break;
            }
        }
    }
    let _ = stream.close2().await;
    trace!("floodsub writer of {} exiting...", peer);
}

async fn read_loop(peer: PeerId, mut stream: IReadWrite, mut tx: mpsc::Sender<Command>) {
    loop {
        match protocol::read_rpc(&mut stream).await {
            Ok(rpc) => {
                if tx.send(Command::Incoming(peer.clone(), rpc)).await.is_err() {
                    break;
                }
            }
            Err(e) => {
                debug!("reading rpc from {} failed: {}", peer, e);
                let _ = tx.send(Command::RemovePeer(peer.clone())).await;
                break;
            }
        }
    }
    trace!("floodsub reader of {} exiting...", peer);
}
