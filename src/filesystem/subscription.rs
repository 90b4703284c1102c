use std::pin::Pin;
use std::task::{Context, Poll};

use futures::Stream;
use futures_channel::mpsc::{UnboundedReceiver, UnboundedSender};

use crate::changes::ChangeEvent;

/// Identifies one `on_change` registration on a tree.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(pub(super) u64);

/// Stream of every change a tree emits after the subscription was created.
///
/// The stream ends once the tree unsubscribes it or is dropped.
#[derive(Debug)]
pub struct ChangeSubscription {
    id: SubscriptionId,
    receiver: UnboundedReceiver<ChangeEvent>,
}

impl ChangeSubscription {
    pub(super) fn new(id: SubscriptionId, receiver: UnboundedReceiver<ChangeEvent>) -> Self {
        Self { id, receiver }
    }

    pub fn id(&self) -> SubscriptionId {
        self.id
    }
}

impl Stream for ChangeSubscription {
    type Item = ChangeEvent;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        Pin::new(&mut self.receiver).poll_next(cx)
    }
}

#[derive(Debug)]
pub(super) struct Listener {
    pub(super) id: SubscriptionId,
    pub(super) sender: UnboundedSender<ChangeEvent>,
}
