//! Per-room publish/subscribe.
//!
//! Every state change of a room leaves through here. Each member that is
//! currently connected has exactly one subscription, tied to the
//! connection that speaks for them; a newer connection replaces the
//! subscription and the older one is told it was replaced.

use std::collections::HashMap;

use taleroom_protocol::{Channel, PlayerId, Recipient, RoomCode, ServerEvent};
use taleroom_transport::ConnectionId;
use tokio::sync::mpsc;

/// An event on its way from a room to one connection.
#[derive(Debug, Clone, PartialEq)]
pub struct RoomOutbound {
    pub room: RoomCode,
    pub channel: Channel,
    pub event: ServerEvent,
}

/// Channel sender for delivering room events to a connection handler.
pub type PlayerSender = mpsc::UnboundedSender<RoomOutbound>;

struct Subscriber {
    connection: ConnectionId,
    sender: PlayerSender,
}

pub(crate) struct EventBus {
    room: RoomCode,
    subscribers: HashMap<PlayerId, Subscriber>,
}

impl EventBus {
    pub fn new(room: RoomCode) -> Self {
        Self {
            room,
            subscribers: HashMap::new(),
        }
    }

    /// Subscribes `player` through `connection`. A subscription held by
    /// a different connection is dropped after it is sent
    /// `session-replaced`.
    pub fn subscribe(&mut self, player: PlayerId, connection: ConnectionId, sender: PlayerSender) {
        let previous = self
            .subscribers
            .insert(player.clone(), Subscriber { connection, sender });
        if let Some(old) = previous.filter(|old| old.connection != connection) {
            tracing::debug!(room = %self.room, %player, old = %old.connection, "subscription replaced");
            let _ = old.sender.send(self.outbound(Channel::ReliableOrdered, ServerEvent::SessionReplaced));
        }
    }

    /// Removes the subscription, but only if `connection` holds it.
    pub fn unsubscribe(&mut self, player: &PlayerId, connection: ConnectionId) -> bool {
        match self.subscribers.get(player) {
            Some(s) if s.connection == connection => {
                self.subscribers.remove(player);
                true
            }
            _ => false,
        }
    }

    /// Like [`subscribe`](Self::subscribe)'s replacement path, without a
    /// new subscriber: the held subscription is told it was replaced.
    pub fn evict(&mut self, player: &PlayerId) {
        if let Some(old) = self.subscribers.remove(player) {
            let _ = old.sender.send(self.outbound(Channel::ReliableOrdered, ServerEvent::SessionReplaced));
        }
    }

    pub fn publish(&self, to: &Recipient, channel: Channel, event: ServerEvent) {
        let outbound = self.outbound(channel, event);
        for (player, subscriber) in &self.subscribers {
            if to.includes(player) {
                // A closed receiver means the connection is going away;
                // its disconnect is already on its way to the room.
                let _ = subscriber.sender.send(outbound.clone());
            }
        }
    }

    pub fn send_to(&self, player: &PlayerId, event: ServerEvent) {
        if let Some(subscriber) = self.subscribers.get(player) {
            let _ = subscriber
                .sender
                .send(self.outbound(Channel::ReliableOrdered, event));
        }
    }

    /// Sends `room-closed` to everyone and drops every subscription.
    pub fn close(&mut self, reason: &str) {
        let outbound = self.outbound(
            Channel::ReliableOrdered,
            ServerEvent::RoomClosed { reason: reason.to_owned() },
        );
        for (_, subscriber) in self.subscribers.drain() {
            let _ = subscriber.sender.send(outbound.clone());
        }
    }

    pub fn len(&self) -> usize {
        self.subscribers.len()
    }

    fn outbound(&self, channel: Channel, event: ServerEvent) -> RoomOutbound {
        RoomOutbound {
            room: self.room.clone(),
            channel,
            event,
        }
    }
}
