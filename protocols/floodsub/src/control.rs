use crate::error::FloodsubError;
use crate::floodsub::{Command, Topic};
use crate::rpc_proto;
use crate::subscription::Subscription;

use futures::channel::{mpsc, oneshot};
use futures::SinkExt;
use meshlink_core::muxing::IReadWrite;
use meshlink_core::PeerId;

/// Handle to the flood router. Cheap to clone.
#[derive(Clone)]
pub struct Control {
    sender: mpsc::Sender<Command>,
    local_peer: PeerId,
}

impl Control {
    pub(crate) fn new(sender: mpsc::Sender<Command>, local_peer: PeerId) -> Self {
        Control { sender, local_peer }
    }

    /// Subscribes to a topic, returning the stream of its messages.
    pub async fn subscribe(&mut self, topic: impl Into<Topic>) -> Result<Subscription, FloodsubError> {
        let (tx, rx) = oneshot::channel();
        self.sender.send(Command::Subscribe(topic.into(), tx)).await?;
        Ok(rx.await?)
    }

    /// Drops every local subscription of the topic and tells the peers.
    pub async fn unsubscribe(&mut self, topic: impl Into<Topic>) -> Result<(), FloodsubError> {
        self.sender.send(Command::Unsubscribe(topic.into())).await?;
        Ok(())
    }

    /// Publishes data on a topic, assigning a fresh sequence number.
    ///
    /// Resolves once the message is written to every interested peer.
    pub async fn publish(
        &mut self,
        topic: impl Into<Topic>,
        data: impl Into<Vec<u8>>,
    ) -> Result<(), FloodsubError> {
        let seqno = rand::random::<[u8; 8]>().to_vec();
        let msg = rpc_proto::Message {
            from: Some(self.local_peer.as_bytes().to_vec()),
            data: Some(data.into()),
            seqno: Some(seqno),
            topic_ids: vec![topic.into()],
        };
        self.publish_message(msg).await
    }

    /// Publishes a fully formed message. Rejected with `MessageAlreadySeen`
    /// if its id is still in the dedup cache.
    pub async fn publish_message(&mut self, msg: rpc_proto::Message) -> Result<(), FloodsubError> {
        let (tx, rx) = oneshot::channel();
        self.sender.send(Command::Publish(msg, tx)).await?;
        rx.await?
    }

    /// Attaches a peer's `/floodsub/1.0.0` stream to the router.
    pub async fn add_peer(&mut self, peer: PeerId, stream: IReadWrite) -> Result<(), FloodsubError> {
        self.sender.send(Command::AddPeer(peer, stream)).await?;
        Ok(())
    }

    /// Detaches a peer; its pending sends fail.
    pub async fn remove_peer(&mut self, peer: PeerId) -> Result<(), FloodsubError> {
        self.sender.send(Command::RemovePeer(peer)).await?;
        Ok(())
    }

    /// Shuts the router down.
    pub async fn close(&mut self) -> Result<(), FloodsubError> {
        let (tx, rx) = oneshot::channel();
        if self.sender.send(Command::Close(tx)).await.is_err() {
            return Ok(()); // already gone
        }
        let _ = rx.await;
        Ok(())
    }
}
