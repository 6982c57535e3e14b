// ── Inbound message router ──
//
// Fans broker messages out to the device handles registered for the serial
// number in the topic. Anything that cannot be delivered is logged and
// dropped.

use std::sync::Arc;

use dashmap::DashMap;
use ecoflow_api::InboundMessage;
use serde_json::Value;
use tokio::sync::{broadcast, mpsc};
use tokio_util::sync::CancellationToken;
use tracing::{trace, warn};

use crate::connection::topics::{self, TopicKind};

/// Capacity of each per-device stream.
pub const CHANNEL_CAPACITY: usize = 256;

/// Message streams of one device handle.
#[derive(Debug, Clone)]
pub struct DeviceChannels {
    pub quota: broadcast::Sender<Arc<Value>>,
    pub set_reply: broadcast::Sender<Arc<Value>>,
    pub status: broadcast::Sender<Arc<Value>>,
}

impl DeviceChannels {
    pub fn new() -> Self {
        Self {
            quota: broadcast::channel(CHANNEL_CAPACITY).0,
            set_reply: broadcast::channel(CHANNEL_CAPACITY).0,
            status: broadcast::channel(CHANNEL_CAPACITY).0,
        }
    }

    fn sender(&self, kind: TopicKind) -> Option<&broadcast::Sender<Arc<Value>>> {
        match kind {
            TopicKind::Quota => Some(&self.quota),
            TopicKind::SetReply => Some(&self.set_reply),
            TopicKind::Status => Some(&self.status),
            TopicKind::Set => None,
        }
    }
}

impl Default for DeviceChannels {
    fn default() -> Self {
        Self::new()
    }
}

/// Serial number → registered handles.
pub type DeviceTable = DashMap<String, Vec<DeviceChannels>>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RouteOutcome {
    Delivered { handles: usize },
    UnknownTopic,
    UnknownDevice,
    Malformed,
    /// Our own `set` topic echoed back.
    Ignored,
}

pub fn route(table: &DeviceTable, message: &InboundMessage) -> RouteOutcome {
    let Some(parsed) = topics::parse(&message.topic) else {
        warn!(topic = %message.topic, "Dropping message on unexpected topic");
        return RouteOutcome::UnknownTopic;
    };
    let Some(kind) = parsed.kind else {
        warn!(topic = %message.topic, suffix = parsed.suffix, "Dropping message with unknown topic suffix");
        return RouteOutcome::UnknownTopic;
    };
    if kind == TopicKind::Set {
        return RouteOutcome::Ignored;
    }

    let Some(handles) = table.get(parsed.sn) else {
        warn!(sn = parsed.sn, topic = %message.topic, "Dropping message for unregistered device");
        return RouteOutcome::UnknownDevice;
    };

    let value: Value = match serde_json::from_slice(&message.payload) {
        Ok(value) => value,
        Err(e) => {
            warn!(sn = parsed.sn, topic = %message.topic, error = %e, "Dropping malformed JSON payload");
            return RouteOutcome::Malformed;
        }
    };

    let value = Arc::new(value);
    for channels in handles.iter() {
        if let Some(sender) = channels.sender(kind) {
            // No receivers is fine: nobody is listening to this stream yet.
            let _ = sender.send(Arc::clone(&value));
        }
    }
    trace!(sn = parsed.sn, kind = %kind, handles = handles.len(), "Message routed");
    RouteOutcome::Delivered {
        handles: handles.len(),
    }
}

/// Route messages until the inbound stream ends or `cancel` fires.
pub async fn run(
    mut inbound: mpsc::Receiver<InboundMessage>,
    table: Arc<DeviceTable>,
    cancel: CancellationToken,
) {
    loop {
        tokio::select! {
            () = cancel.cancelled() => break,
            message = inbound.recv() => match message {
                Some(message) => {
                    route(&table, &message);
                }
                None => break,
            },
        }
    }
}
