//! Channel subscriptions and in-memory fan-out.
//!
//! Delivery is at-most-once: a publish hands the frame to every live
//! connection subscribed at that instant and never waits. Frames for
//! channels with no subscriber, or for connections whose outbound buffer is
//! full, are dropped.

use std::collections::HashMap;
use std::fmt;

use dashmap::DashMap;
use tokio::sync::mpsc::{self, error::TrySendError};
use tracing::{debug, warn};
use uuid::Uuid;

use crate::auth::Session;
use crate::models::account::{AccountId, Role};
use crate::observability::metrics::Metrics;
use crate::realtime::protocol::ServerEvent;

pub type ConnectionId = Uuid;
pub type Outbox = mpsc::Sender<String>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Channel {
    Role(Role),
    Identity(AccountId),
}

impl fmt::Display for Channel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Channel::Role(role) => write!(f, "role:{role}"),
            Channel::Identity(account_id) => write!(f, "identity:{account_id}"),
        }
    }
}

/// The two channels every admitted connection belongs to.
pub fn channels_for(session: &Session) -> [Channel; 2] {
    [
        Channel::Role(session.role),
        Channel::Identity(session.account_id),
    ]
}

pub struct Broadcaster {
    channels: DashMap<Channel, HashMap<ConnectionId, Outbox>>,
    memberships: DashMap<ConnectionId, [Channel; 2]>,
    metrics: Metrics,
}

impl Broadcaster {
    pub fn new(metrics: Metrics) -> Self {
        Self {
            channels: DashMap::new(),
            memberships: DashMap::new(),
            metrics,
        }
    }

    pub fn register(&self, session: &Session, outbox: Outbox) -> ConnectionId {
        let id = Uuid::new_v4();
        let channels = channels_for(session);

        self.memberships.insert(id, channels);
        for channel in channels {
            self.channels
                .entry(channel)
                .or_default()
                .insert(id, outbox.clone());
        }
        self.metrics.live_connections.inc();

        id
    }

    pub fn deregister(&self, id: ConnectionId) {
        let Some((_, channels)) = self.memberships.remove(&id) else {
            return;
        };

        for channel in channels {
            if let Some(mut members) = self.channels.get_mut(&channel) {
                members.remove(&id);
            }
            self.channels
                .remove_if(&channel, |_, members| members.is_empty());
        }
        self.metrics.live_connections.dec();
    }

    pub fn memberships(&self, id: ConnectionId) -> Option<[Channel; 2]> {
        self.memberships.get(&id).map(|entry| *entry.value())
    }

    pub fn connection_count(&self) -> usize {
        self.memberships.len()
    }

    pub fn subscriber_count(&self, channel: Channel) -> usize {
        self.channels
            .get(&channel)
            .map(|members| members.len())
            .unwrap_or(0)
    }

    /// Returns how many connections the event was handed to.
    pub fn publish(&self, channel: Channel, event: &ServerEvent) -> usize {
        let frame = match serde_json::to_string(event) {
            Ok(frame) => frame,
            Err(err) => {
                warn!(error = %err, event = event.name(), "failed to serialize event");
                return 0;
            }
        };

        let Some(members) = self.channels.get(&channel) else {
            debug!(channel = %channel, event = event.name(), "no subscribers; event dropped");
            self.dropped("no_subscriber");
            return 0;
        };

        let mut delivered = 0;
        for (connection_id, outbox) in members.iter() {
            match outbox.try_send(frame.clone()) {
                Ok(()) => delivered += 1,
                Err(TrySendError::Full(_)) => {
                    warn!(connection_id = %connection_id, event = event.name(), "outbound buffer full; event dropped");
                    self.dropped("buffer_full");
                }
                Err(TrySendError::Closed(_)) => self.dropped("closed"),
            }
        }

        self.metrics
            .events_published_total
            .with_label_values(&[event.name()])
            .inc_by(delivered as u64);

        delivered
    }

    pub fn publish_to_identities(&self, identities: &[AccountId], event: &ServerEvent) -> usize {
        let mut seen = Vec::with_capacity(identities.len());
        let mut delivered = 0;

        for &account_id in identities {
            if seen.contains(&account_id) {
                continue;
            }
            seen.push(account_id);
            delivered += self.publish(Channel::Identity(account_id), event);
        }

        delivered
    }

    fn dropped(&self, reason: &str) {
        self.metrics
            .events_dropped_total
            .with_label_values(&[reason])
            .inc();
    }
}
