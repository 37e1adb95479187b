use crate::floodsub::{FloodsubMessage, Topic};

use futures::channel::mpsc;
use futures::Stream;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};

/// A live subscription: a stream of the messages arriving on one topic.
///
/// The stream ends when the topic is unsubscribed or the router closes.
pub struct Subscription {
    topic: Topic,
    rx: mpsc::UnboundedReceiver<Arc<FloodsubMessage>>,
}

impl Subscription {
    pub(crate) fn new(topic: Topic, rx: mpsc::UnboundedReceiver<Arc<FloodsubMessage>>) -> Self {
        Subscription { topic, rx }
    }

    /// The topic this subscription listens on.
    pub fn topic(&self) -> &Topic {
        &self.topic
    }
}

impl Stream for Subscription {
    type Item = Arc<FloodsubMessage>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        Pin::new(&mut self.rx).poll_next(cx)
    }
}
