//! Dynamic broadcast hubs for audit events and invocation records.
//!
//! One generic design, two instances: the log bus fans audit events out to
//! `Logging` subscribers, the stat bus fans invocation records out to
//! `Statistics` subscribers.
//!
//! The listener registry is owned by a single dispatcher task; subscribe,
//! unsubscribe, publish and shutdown are messages routed into its mailbox,
//! so registry mutation and fan-out iteration are serialized without any
//! shared lock. Each subscription gets a private bounded delivery queue and
//! observes items in exactly publish order; it never sees items published
//! before it registered.
//!
//! Overflow policy: disconnect-on-full. A subscriber whose queue is full at
//! delivery time is dropped from the registry and its channel closed, so one
//! stalled reader never delays the publisher or the other subscribers.

use crate::errors::GatewayError;
use std::collections::HashMap;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, warn};

/// Dispatcher mailbox depth.
const MAILBOX_BUFFER: usize = 256;

/// Per-subscriber delivery queue depth; a subscriber lagging this far behind
/// the publisher is disconnected.
const SUBSCRIBER_BUFFER: usize = 64;

/// Messages routed into the dispatcher task.
enum BusMessage<T> {
    Subscribe {
        respond_to: oneshot::Sender<Result<(u64, mpsc::Receiver<T>), GatewayError>>,
    },
    Unsubscribe {
        id: u64,
    },
    Publish {
        item: T,
        respond_to: oneshot::Sender<Result<(), GatewayError>>,
    },
    Shutdown {
        respond_to: oneshot::Sender<()>,
    },
}

/// Handle to a broadcast bus.
///
/// Cheap to clone; all clones talk to the same dispatcher task.
pub struct BusHandle<T> {
    name: &'static str,
    sender: mpsc::Sender<BusMessage<T>>,
}

impl<T> Clone for BusHandle<T> {
    fn clone(&self) -> Self {
        Self {
            name: self.name,
            sender: self.sender.clone(),
        }
    }
}

impl<T: Clone + Send + 'static> BusHandle<T> {
    /// Spawn a new bus dispatcher task and return a handle to it.
    ///
    /// `name` scopes log output (`"log"` / `"stat"`).
    #[must_use]
    pub fn spawn(name: &'static str) -> Self {
        let (sender, receiver) = mpsc::channel(MAILBOX_BUFFER);
        let dispatcher = BusDispatcher {
            name,
            receiver,
            listeners: HashMap::new(),
            next_id: 0,
            closed: false,
        };
        tokio::spawn(dispatcher.run());
        Self { name, sender }
    }

    /// Register a new subscription.
    ///
    /// The subscription receives every item published after this call
    /// returns, in publish order, until it unsubscribes, falls too far
    /// behind, or the bus shuts down.
    ///
    /// # Errors
    ///
    /// Returns [`GatewayError::BusClosed`] after shutdown.
    pub async fn subscribe(&self) -> Result<Subscription<T>, GatewayError> {
        let (tx, rx) = oneshot::channel();
        self.sender
            .send(BusMessage::Subscribe { respond_to: tx })
            .await
            .map_err(|_| GatewayError::BusClosed)?;
        let (id, receiver) = rx
            .await
            .map_err(|_| GatewayError::internal("bus dispatcher dropped subscribe response"))??;
        Ok(Subscription {
            id,
            receiver,
            handle: self.clone(),
        })
    }

    /// Deliver `item` to every currently registered subscription.
    ///
    /// Returns once the dispatcher has queued the item for (or disconnected)
    /// every current subscriber, so a publish completed before a handler
    /// runs is observable by every live subscription.
    ///
    /// # Errors
    ///
    /// Returns [`GatewayError::BusClosed`] after shutdown.
    pub async fn publish(&self, item: T) -> Result<(), GatewayError> {
        let (tx, rx) = oneshot::channel();
        self.sender
            .send(BusMessage::Publish {
                item,
                respond_to: tx,
            })
            .await
            .map_err(|_| GatewayError::BusClosed)?;
        rx.await
            .map_err(|_| GatewayError::internal("bus dispatcher dropped publish response"))?
    }

    /// Close every current subscription and refuse further subscribes and
    /// publishes. Idempotent.
    pub async fn shutdown(&self) {
        let (tx, rx) = oneshot::channel();
        if self
            .sender
            .send(BusMessage::Shutdown { respond_to: tx })
            .await
            .is_ok()
        {
            let _ = rx.await;
        }
    }

    async fn unsubscribe_id(&self, id: u64) {
        // Best effort: if the dispatcher is gone the registry is gone too.
        let _ = self.sender.send(BusMessage::Unsubscribe { id }).await;
    }
}

/// One streaming call's registration with a bus.
///
/// Owned by the call that created it; dropping the subscription closes its
/// delivery queue and the dispatcher reaps the entry on the next delivery.
pub struct Subscription<T> {
    id: u64,
    receiver: mpsc::Receiver<T>,
    handle: BusHandle<T>,
}

impl<T: Clone + Send + 'static> Subscription<T> {
    /// Wait for the next delivered item; `None` once the bus has shut down
    /// or this subscription was disconnected.
    pub async fn recv(&mut self) -> Option<T> {
        self.receiver.recv().await
    }

    /// Deregister from the bus. Idempotent from the dispatcher's point of
    /// view; the bus also reaps subscriptions whose receiving side is gone.
    pub async fn unsubscribe(self) {
        self.handle.unsubscribe_id(self.id).await;
    }

    #[must_use]
    pub fn id(&self) -> u64 {
        self.id
    }
}

/// Dispatcher state: the single owner of the listener registry.
struct BusDispatcher<T> {
    name: &'static str,
    receiver: mpsc::Receiver<BusMessage<T>>,
    listeners: HashMap<u64, mpsc::Sender<T>>,
    next_id: u64,
    closed: bool,
}

impl<T: Clone + Send + 'static> BusDispatcher<T> {
    async fn run(mut self) {
        while let Some(message) = self.receiver.recv().await {
            match message {
                BusMessage::Subscribe { respond_to } => {
                    let _ = respond_to.send(self.handle_subscribe());
                }
                BusMessage::Unsubscribe { id } => {
                    if self.listeners.remove(&id).is_some() {
                        debug!(target: "gateway.bus", bus = self.name, id, "Subscriber removed");
                    }
                }
                BusMessage::Publish { item, respond_to } => {
                    let result = if self.closed {
                        Err(GatewayError::BusClosed)
                    } else {
                        self.deliver(item);
                        Ok(())
                    };
                    let _ = respond_to.send(result);
                }
                BusMessage::Shutdown { respond_to } => {
                    // Dropping the senders closes every delivery queue and
                    // unblocks every subscriber loop.
                    let dropped = self.listeners.len();
                    self.listeners.clear();
                    self.closed = true;
                    debug!(
                        target: "gateway.bus",
                        bus = self.name,
                        subscribers = dropped,
                        "Bus shut down"
                    );
                    let _ = respond_to.send(());
                }
            }
        }
    }

    fn handle_subscribe(&mut self) -> Result<(u64, mpsc::Receiver<T>), GatewayError> {
        if self.closed {
            return Err(GatewayError::BusClosed);
        }
        self.next_id += 1;
        let id = self.next_id;
        let (tx, rx) = mpsc::channel(SUBSCRIBER_BUFFER);
        self.listeners.insert(id, tx);
        debug!(
            target: "gateway.bus",
            bus = self.name,
            id,
            subscribers = self.listeners.len(),
            "Subscriber registered"
        );
        Ok((id, rx))
    }

    fn deliver(&mut self, item: T) {
        let mut dead = Vec::new();
        for (id, tx) in &self.listeners {
            match tx.try_send(item.clone()) {
                Ok(()) => {}
                Err(mpsc::error::TrySendError::Full(_)) => {
                    warn!(
                        target: "gateway.bus",
                        bus = self.name,
                        id,
                        capacity = SUBSCRIBER_BUFFER,
                        "Subscriber queue full, disconnecting slow subscriber"
                    );
                    dead.push(*id);
                }
                Err(mpsc::error::TrySendError::Closed(_)) => {
                    dead.push(*id);
                }
            }
        }
        for id in dead {
            self.listeners.remove(&id);
        }
    }
}
