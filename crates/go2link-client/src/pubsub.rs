//! Topic router over one data channel
//!
//! [`PubSub`] turns the single bidirectional channel into many logical
//! topics. Inbound frames are decoded to [`Envelope`]s and fanned out to the
//! subscribers of [`Envelope::route`] in registration order. A frame that
//! does not decode is logged and dropped; a subscriber that panics is logged
//! and the remaining subscribers still run.

use bytes::Bytes;
use parking_lot::{Mutex, RwLock};
use serde::Serialize;
use serde_json::Value;
use std::collections::{HashMap, HashSet};
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Weak};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use go2link_core::{codec, topics, Envelope};
use go2link_transport::{TransportEvent, TransportReceiver, TransportSender};

use crate::error::{ClientError, Result};

/// Subscription callback type
pub type SubscriptionCallback = Arc<dyn Fn(&Value) + Send + Sync>;

/// Lifecycle of the underlying channel
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChannelState {
    Connecting,
    Open,
    Closed,
}

struct Subscriber {
    id: u32,
    callback: SubscriptionCallback,
    /// Held while the callback runs; cleared by unsubscribe
    active: Mutex<bool>,
}

#[derive(Default)]
struct Registry {
    by_topic: HashMap<String, Vec<Arc<Subscriber>>>,
    topic_of: HashMap<u32, String>,
    /// Robot topics a subscribe notice went out for
    announced: HashSet<String>,
}

impl Registry {
    /// Claim the subscribe notice for `topic`; true exactly once until the
    /// topic loses its last subscriber
    fn claim_announcement(&mut self, topic: &str) -> bool {
        topics::is_robot_topic(topic) && self.announced.insert(topic.to_string())
    }
}

/// Multiplexed publish/subscribe over a data channel
pub struct PubSub {
    sender: Arc<dyn TransportSender>,
    registry: RwLock<Registry>,
    next_sub_id: AtomicU32,
    state: watch::Sender<ChannelState>,
    dispatcher: Mutex<Option<JoinHandle<()>>>,
}

impl PubSub {
    /// Wrap the two halves of a channel and start dispatching
    pub fn new(sender: Arc<dyn TransportSender>, mut receiver: Box<dyn TransportReceiver>) -> Arc<Self> {
        let initial = if sender.is_connected() {
            ChannelState::Open
        } else {
            ChannelState::Connecting
        };
        let (state, _) = watch::channel(initial);

        let pubsub = Arc::new(Self {
            sender,
            registry: RwLock::new(Registry::default()),
            next_sub_id: AtomicU32::new(1),
            state,
            dispatcher: Mutex::new(None),
        });

        let weak: Weak<Self> = Arc::downgrade(&pubsub);
        let handle = tokio::spawn(async move {
            while let Some(event) = receiver.recv().await {
                let Some(pubsub) = weak.upgrade() else {
                    break;
                };
                pubsub.handle_event(event).await;
            }
            if let Some(pubsub) = weak.upgrade() {
                pubsub.set_state(ChannelState::Closed);
            }
        });
        *pubsub.dispatcher.lock() = Some(handle);

        pubsub
    }

    /// Current channel state
    pub fn state(&self) -> ChannelState {
        *self.state.borrow()
    }

    pub fn is_open(&self) -> bool {
        self.state() == ChannelState::Open
    }

    /// Wait until the channel reports open.
    ///
    /// Fails with [`ClientError::ChannelOpen`] if the channel closes first.
    pub async fn wait_until_open(&self) -> Result<()> {
        let mut rx = self.state.subscribe();
        loop {
            match *rx.borrow_and_update() {
                ChannelState::Open => return Ok(()),
                ChannelState::Closed => {
                    return Err(ClientError::ChannelOpen(
                        "channel closed before it opened".to_string(),
                    ))
                }
                ChannelState::Connecting => {}
            }
            if rx.changed().await.is_err() {
                return Err(ClientError::ChannelOpen("channel dropped".to_string()));
            }
        }
    }

    /// Publish `data` on `topic`. Fire-and-forget: one frame, no
    /// acknowledgment.
    pub async fn publish<T: Serialize>(&self, topic: &str, data: T) -> Result<()> {
        if !self.is_open() {
            return Err(ClientError::ChannelNotOpen);
        }

        let data = serde_json::to_value(data)
            .map_err(|e| go2link_core::Error::EncodeError(e.to_string()))?;

        self.send_envelope(&Envelope::message(topic, data)).await?;
        debug!("Published to {}", topic);
        Ok(())
    }

    /// Register `callback` for `topic` and return the subscription id.
    ///
    /// Every call is a distinct subscription, even for the same topic. The
    /// first subscriber of a robot topic makes the robot start forwarding
    /// it; if the channel is not open yet the notice goes out on open.
    pub async fn subscribe<F>(&self, topic: &str, callback: F) -> u32
    where
        F: Fn(&Value) + Send + Sync + 'static,
    {
        let id = self.next_sub_id.fetch_add(1, Ordering::SeqCst);
        let subscriber = Arc::new(Subscriber {
            id,
            callback: Arc::new(callback),
            active: Mutex::new(true),
        });

        // The open check and the claim share the lock with the announcement
        // on open, so each topic is announced once
        let announce = {
            let mut registry = self.registry.write();
            registry.topic_of.insert(id, topic.to_string());
            registry
                .by_topic
                .entry(topic.to_string())
                .or_default()
                .push(subscriber);
            self.is_open() && registry.claim_announcement(topic)
        };

        if announce {
            self.notify_robot(Envelope::subscribe(topic)).await;
        }

        debug!("Subscribed to {} (id: {})", topic, id);
        id
    }

    /// Remove a subscription. Returns false if `id` is unknown.
    ///
    /// Once this returns the callback is never invoked again. If it is
    /// running on the dispatcher right now, this waits for it to finish.
    pub async fn unsubscribe(&self, id: u32) -> bool {
        let (removed, last_topic) = {
            let mut registry = self.registry.write();
            let Some(topic) = registry.topic_of.remove(&id) else {
                return false;
            };

            let mut removed = None;
            let mut now_empty = false;
            if let Some(subscribers) = registry.by_topic.get_mut(&topic) {
                if let Some(pos) = subscribers.iter().position(|s| s.id == id) {
                    removed = Some(subscribers.remove(pos));
                }
                now_empty = subscribers.is_empty();
            }
            let mut announced = false;
            if now_empty {
                registry.by_topic.remove(&topic);
                announced = registry.announced.remove(&topic);
            }

            (removed, (now_empty && announced).then_some(topic))
        };

        if let Some(subscriber) = removed {
            *subscriber.active.lock() = false;
        }

        if let Some(topic) = last_topic {
            if self.is_open() {
                self.notify_robot(Envelope::unsubscribe(&topic)).await;
            }
            debug!("Last subscriber of {} removed", topic);
        }

        true
    }

    /// Number of active subscriptions on `topic`
    pub fn subscriber_count(&self, topic: &str) -> usize {
        self.registry
            .read()
            .by_topic
            .get(topic)
            .map_or(0, Vec::len)
    }

    /// Close the channel and stop dispatching. Idempotent.
    pub async fn close(&self) {
        self.set_state(ChannelState::Closed);

        if let Some(handle) = self.dispatcher.lock().take() {
            handle.abort();
        }

        if let Err(e) = self.sender.close().await {
            debug!("Channel close: {}", e);
        }
    }

    async fn handle_event(&self, event: TransportEvent) {
        match event {
            TransportEvent::Connected => {
                info!("Data channel open");
                self.set_state(ChannelState::Open);
                self.announce_subscriptions().await;
            }
            TransportEvent::Data(data) => self.dispatch(&data),
            TransportEvent::Disconnected { reason } => {
                info!("Data channel closed: {:?}", reason);
                self.set_state(ChannelState::Closed);
            }
            TransportEvent::Error(e) => {
                warn!("Data channel error: {}", e);
            }
        }
    }

    /// Deliver one inbound frame to its subscribers
    pub(crate) fn dispatch(&self, frame: &[u8]) {
        let envelope = match codec::decode(frame) {
            Ok(envelope) => envelope,
            Err(e) => {
                warn!("Dropping undecodable frame: {}", e);
                return;
            }
        };

        let route = envelope.route();
        let subscribers: Vec<Arc<Subscriber>> = self
            .registry
            .read()
            .by_topic
            .get(route)
            .cloned()
            .unwrap_or_default();

        if subscribers.is_empty() {
            debug!("No subscribers for {}", route);
            return;
        }

        for subscriber in subscribers {
            let active = subscriber.active.lock();
            if !*active {
                continue;
            }
            let callback = &subscriber.callback;
            if catch_unwind(AssertUnwindSafe(|| callback(&envelope.data))).is_err() {
                error!(
                    "Subscriber {} on {} panicked; continuing with the others",
                    subscriber.id, route
                );
            }
        }
    }

    async fn announce_subscriptions(&self) {
        let pending: Vec<String> = {
            let mut registry = self.registry.write();
            let topics: Vec<String> = registry.by_topic.keys().cloned().collect();
            topics
                .into_iter()
                .filter(|t| registry.claim_announcement(t))
                .collect()
        };

        for topic in pending {
            self.notify_robot(Envelope::subscribe(topic)).await;
        }
    }

    async fn notify_robot(&self, envelope: Envelope) {
        if let Err(e) = self.send_envelope(&envelope).await {
            warn!("Failed to send {} for {}: {}", envelope.kind, envelope.topic, e);
        }
    }

    async fn send_envelope(&self, envelope: &Envelope) -> Result<()> {
        let frame: Bytes = codec::encode(envelope)?;
        self.sender.send(frame).await?;
        Ok(())
    }

    fn set_state(&self, state: ChannelState) {
        self.state.send_if_modified(|current| {
            // Closed is terminal
            if *current == state || *current == ChannelState::Closed {
                false
            } else {
                *current = state;
                true
            }
        });
    }
}

impl Drop for PubSub {
    fn drop(&mut self) {
        if let Some(handle) = self.dispatcher.get_mut().take() {
            handle.abort();
        }
    }
}
