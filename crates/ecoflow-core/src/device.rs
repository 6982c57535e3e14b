// ── Device handle ──
//
// A `Device` couples one physical device with its codec, its quota snapshot
// and the message streams the router feeds. Commands are applied to the
// snapshot optimistically; a failed send hands the caller a one-shot revert.

use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::Duration;

use bytes::Bytes;
use rand::Rng;
use serde_json::Value;
use tokio::sync::{broadcast, watch};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::codec::{EncodeContext, QuotaCodec, codec_for};
use crate::connection::{Connection, SessionState};
use crate::error::CoreError;
use crate::model::{DeviceModel, DeviceStatus, QuotaPatch, QuotaSnapshot, SetCommand, SetEnvelope};
use crate::router::DeviceChannels;
use crate::stream::{MessageStream, SnapshotStream};

/// Where a command envelope is sent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CommandRoute {
    /// Publish on the device's `set` topic.
    #[default]
    Mqtt,
    /// PUT through the cloud HTTP API; never waits for a `set_reply`.
    Http,
}

// ── Revert ───────────────────────────────────────────────────────────

/// Undo of an optimistic update. Consumed on use, so it restores the
/// touched fields at most once.
#[derive(Debug)]
#[must_use = "dropping a Revert leaves the optimistic value in place"]
pub struct Revert {
    snapshot: Arc<watch::Sender<QuotaSnapshot>>,
    inverse: QuotaPatch,
}

impl Revert {
    /// Fields the revert restores.
    pub fn fields(&self) -> impl Iterator<Item = &str> {
        self.inverse.keys()
    }

    /// Restore the previous values and notify observers.
    pub fn apply(self) {
        self.snapshot.send_modify(|snapshot| {
            snapshot.apply(&self.inverse);
        });
    }
}

/// Failed command, with the revert of its optimistic update when one was
/// applied.
#[derive(Debug, thiserror::Error)]
#[error("{error}")]
pub struct CommandError {
    error: CoreError,
    revert: Option<Revert>,
}

impl CommandError {
    fn before_apply(error: impl Into<CoreError>) -> Self {
        Self {
            error: error.into(),
            revert: None,
        }
    }

    pub fn error(&self) -> &CoreError {
        &self.error
    }

    pub fn can_revert(&self) -> bool {
        self.revert.is_some()
    }

    /// Roll back the optimistic update (if any) and return the cause.
    pub fn revert(self) -> CoreError {
        if let Some(revert) = self.revert {
            revert.apply();
        }
        self.error
    }

    /// The cause, keeping the optimistic value in the snapshot.
    pub fn into_inner(self) -> CoreError {
        self.error
    }
}

// ── Device ───────────────────────────────────────────────────────────

/// Cheaply cloneable handle to one bridged device.
#[derive(Clone)]
pub struct Device {
    inner: Arc<DeviceInner>,
}

struct DeviceInner {
    name: String,
    sn: String,
    model: DeviceModel,
    codec: Arc<dyn QuotaCodec>,
    connection: Arc<Connection>,
    channels: DeviceChannels,
    snapshot: Arc<watch::Sender<QuotaSnapshot>>,
    next_id: AtomicU64,
    reply_timeout: Option<Duration>,
    decoding: AtomicBool,
    decoder: CancellationToken,
}

impl Drop for DeviceInner {
    fn drop(&mut self) {
        self.decoder.cancel();
    }
}

impl Device {
    /// Create a handle and register its streams with `connection`.
    pub(crate) fn new(
        name: String,
        sn: String,
        model: DeviceModel,
        connection: Arc<Connection>,
        reply_timeout: Option<Duration>,
    ) -> Self {
        let channels = DeviceChannels::new();
        connection.add_device(&sn, channels.clone());
        let (snapshot, _) = watch::channel(QuotaSnapshot::new());
        let first_id = rand::thread_rng().gen_range(100_000..1_000_000);

        Self {
            inner: Arc::new(DeviceInner {
                name,
                sn,
                model,
                codec: codec_for(model),
                connection,
                channels,
                snapshot: Arc::new(snapshot),
                next_id: AtomicU64::new(first_id),
                reply_timeout,
                decoding: AtomicBool::new(false),
                decoder: CancellationToken::new(),
            }),
        }
    }

    pub fn name(&self) -> &str {
        &self.inner.name
    }

    pub fn serial_number(&self) -> &str {
        &self.inner.sn
    }

    pub fn model(&self) -> DeviceModel {
        self.inner.model
    }

    pub fn codec(&self) -> &Arc<dyn QuotaCodec> {
        &self.inner.codec
    }

    pub fn connection(&self) -> &Arc<Connection> {
        &self.inner.connection
    }

    // ── Lifecycle ────────────────────────────────────────────────────

    /// Seed the snapshot from the cloud's "get all quotas".
    pub async fn initialize(&self) -> Result<(), CoreError> {
        let sn = self.serial_number();
        let data = self
            .inner
            .connection
            .cloud()
            .get_all_quotas(sn)
            .await
            .map_err(|e| {
                error!(sn, error = %e, "Fetching quotas failed");
                CoreError::from(e)
            })?;

        match data {
            Some(data) => {
                let codec = &self.inner.codec;
                self.inner
                    .snapshot
                    .send_modify(|snapshot| codec.apply_all_quotas(snapshot, &data));
                info!(sn, fields = data.len(), "Device state initialized");
            }
            None => warn!(sn, "Cloud returned no quota data"),
        }
        Ok(())
    }

    /// Connect if needed, subscribe the device topics and start decoding
    /// quota messages into the snapshot.
    pub async fn subscribe(&self) -> Result<(), CoreError> {
        if !self.inner.decoding.swap(true, Ordering::AcqRel) {
            self.spawn_decoder();
        }
        self.inner.connection.subscribe_device(self.serial_number()).await
    }

    fn spawn_decoder(&self) {
        let mut quota = self.inner.channels.quota.subscribe();
        let codec = Arc::clone(&self.inner.codec);
        let snapshot = Arc::clone(&self.inner.snapshot);
        let cancel = self.inner.decoder.clone();
        let sn = self.inner.sn.clone();

        tokio::spawn(async move {
            loop {
                let message = tokio::select! {
                    () = cancel.cancelled() => break,
                    message = quota.recv() => message,
                };
                match message {
                    Ok(message) => match codec.decode_quota(&message) {
                        Ok(patch) => snapshot.send_modify(|snapshot| {
                            snapshot.apply(&patch);
                        }),
                        Err(e) => warn!(sn = %sn, error = %e, "Dropping undecodable quota message"),
                    },
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        warn!(sn = %sn, skipped, "Quota decoder lagged");
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }
            debug!(sn = %sn, "Quota decoder stopped");
        });
    }

    // ── Streams and state ────────────────────────────────────────────

    /// Raw quota messages as they arrive.
    pub fn quota_messages(&self) -> broadcast::Receiver<Arc<Value>> {
        self.inner.channels.quota.subscribe()
    }

    pub fn set_replies(&self) -> broadcast::Receiver<Arc<Value>> {
        self.inner.channels.set_reply.subscribe()
    }

    pub fn statuses(&self) -> broadcast::Receiver<Arc<Value>> {
        self.inner.channels.status.subscribe()
    }

    pub fn snapshot(&self) -> QuotaSnapshot {
        self.inner.snapshot.borrow().clone()
    }

    /// Notified after every merge, optimistic update and revert.
    pub fn watch_snapshot(&self) -> watch::Receiver<QuotaSnapshot> {
        self.inner.snapshot.subscribe()
    }

    pub fn snapshot_stream(&self) -> SnapshotStream {
        SnapshotStream::new(self.watch_snapshot())
    }

    pub fn quota_stream(&self) -> MessageStream {
        MessageStream::new(self.quota_messages())
    }

    pub fn status(&self) -> DeviceStatus {
        self.inner.codec.status(&self.inner.snapshot.borrow())
    }

    pub fn connection_state(&self) -> watch::Receiver<SessionState> {
        self.inner.connection.state()
    }

    // ── Commands ─────────────────────────────────────────────────────

    /// Apply `command` optimistically and send it over MQTT.
    ///
    /// With a reply timeout configured, also waits for a successful
    /// `set_reply`. On failure after the optimistic update, the error
    /// carries its [`Revert`].
    pub async fn send_command(&self, command: SetCommand) -> Result<(), CommandError> {
        self.send_command_via(command, CommandRoute::Mqtt).await
    }

    /// Like [`send_command`](Self::send_command), reverting on failure.
    pub async fn send_command_or_revert(&self, command: SetCommand) -> Result<(), CoreError> {
        self.send_command(command).await.map_err(|e| {
            if e.can_revert() {
                warn!(sn = self.serial_number(), command = command.name(), "Reverting optimistic update");
            }
            e.revert()
        })
    }

    pub async fn send_command_via(
        &self,
        command: SetCommand,
        route: CommandRoute,
    ) -> Result<(), CommandError> {
        let inner = &self.inner;
        let id = inner.next_id.fetch_add(1, Ordering::Relaxed);

        let patch = inner
            .codec
            .optimistic_patch(&command)
            .map_err(CommandError::before_apply)?;
        let envelope = {
            let snapshot = inner.snapshot.borrow();
            let ctx = EncodeContext {
                sn: &inner.sn,
                id,
                snapshot: &snapshot,
            };
            inner
                .codec
                .encode(&command, &ctx)
                .map_err(CommandError::before_apply)?
        };

        let mut inverse = QuotaPatch::new();
        inner.snapshot.send_modify(|snapshot| {
            inverse = snapshot.apply(&patch);
        });
        let revert = Revert {
            snapshot: Arc::clone(&inner.snapshot),
            inverse,
        };

        debug!(sn = %inner.sn, id, command = command.name(), ?route, "Sending command");
        // Subscribe before publishing so a fast reply is not missed. The
        // HTTP response already acknowledges the command.
        let replies = match route {
            CommandRoute::Mqtt => inner.reply_timeout.map(|t| (t, self.set_replies())),
            CommandRoute::Http => None,
        };

        let sent = match route {
            CommandRoute::Mqtt => self.publish_envelope(&envelope.to_json()).await,
            CommandRoute::Http => self.send_envelope_http(&envelope).await,
        };
        if let Err(e) = sent {
            return Err(CommandError {
                error: e,
                revert: Some(revert),
            });
        }

        if let Some((timeout, replies)) = replies {
            if let Err(e) = self.await_reply(id, timeout, replies).await {
                return Err(CommandError {
                    error: e,
                    revert: Some(revert),
                });
            }
        }
        Ok(())
    }

    /// Publish a raw envelope on the device's `set` topic.
    pub async fn publish_envelope(&self, envelope: &Value) -> Result<(), CoreError> {
        let payload = serde_json::to_vec(envelope)
            .map_err(|e| CoreError::Internal(format!("encoding envelope: {e}")))?;
        self.inner
            .connection
            .publish(&self.inner.sn, Bytes::from(payload))
            .await
    }

    async fn send_envelope_http(&self, envelope: &SetEnvelope) -> Result<(), CoreError> {
        self.inner
            .connection
            .cloud()
            .send_set_envelope(&envelope.to_json())
            .await
            .map_err(|e| {
                error!(sn = %self.inner.sn, error = %e, "HTTP set command failed");
                CoreError::from(e)
            })
    }

    async fn await_reply(
        &self,
        id: u64,
        timeout: Duration,
        mut replies: broadcast::Receiver<Arc<Value>>,
    ) -> Result<(), CoreError> {
        let sn = &self.inner.sn;
        let wait = async {
            loop {
                let message = match replies.recv().await {
                    Ok(message) => message,
                    Err(broadcast::error::RecvError::Lagged(_)) => continue,
                    Err(broadcast::error::RecvError::Closed) => return Err(CoreError::SessionClosed),
                };
                let reply = match self.inner.codec.parse_set_reply(&message) {
                    Ok(reply) => reply,
                    Err(e) => {
                        debug!(sn = %sn, error = %e, "Ignoring unparsable set reply");
                        continue;
                    }
                };
                if !reply.answers(id) {
                    continue;
                }
                if reply.is_success() {
                    debug!(sn = %sn, id, "Command acknowledged");
                    return Ok(());
                }
                return Err(CoreError::CommandRejected {
                    sn: sn.clone(),
                    reason: format!("device answered {message}"),
                });
            }
        };

        match tokio::time::timeout(timeout, wait).await {
            Ok(result) => result,
            Err(_) => {
                warn!(sn = %sn, id, "No set reply before timeout");
                Err(CoreError::CommandTimeout {
                    sn: sn.clone(),
                    timeout_ms: u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX),
                })
            }
        }
    }
}

impl fmt::Debug for Device {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Device")
            .field("name", &self.inner.name)
            .field("sn", &self.inner.sn)
            .field("model", &self.inner.model)
            .finish_non_exhaustive()
    }
}
