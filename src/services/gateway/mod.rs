pub mod registry;
pub(crate) mod session;

use crate::config::WsConfig;
use crate::domain::events::{ClientEvent, ServerEvent};
use crate::services::gateway::registry::{ConnectionHandle, ConnectionRegistry};
use crate::services::gateway::session::Session;
use axum::extract::ws::WebSocket;
use opentelemetry::{
    KeyValue, global,
    metrics::{Counter, UpDownCounter},
};
use tokio::sync::mpsc::error::TrySendError;
use uuid::Uuid;

#[derive(Clone, Debug)]
pub(crate) struct Metrics {
    pub(crate) events_total: Counter<u64>,
    pub(crate) outbound_dropped_total: Counter<u64>,
    pub(crate) active_connections: UpDownCounter<i64>,
    pub(crate) inbound_rejected_total: Counter<u64>,
}

impl Metrics {
    #[must_use]
    pub(crate) fn new() -> Self {
        let meter = global::meter("parley-server");
        Self {
            events_total: meter
                .u64_counter("realtime_events_total")
                .with_description("Realtime events emitted to users")
                .build(),
            outbound_dropped_total: meter
                .u64_counter("websocket_outbound_dropped_total")
                .with_description("Total events dropped due to full outbound buffer")
                .build(),
            active_connections: meter
                .i64_up_down_counter("websocket_active_connections")
                .with_description("Number of active WebSocket connections")
                .build(),
            inbound_rejected_total: meter
                .u64_counter("websocket_inbound_rejected_total")
                .with_description("Inbound frames that could not be parsed")
                .build(),
        }
    }
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Clone, Debug)]
pub struct GatewayService {
    registry: ConnectionRegistry,
    config: WsConfig,
    metrics: Metrics,
}

impl GatewayService {
    #[must_use]
    pub fn new(registry: ConnectionRegistry, config: WsConfig) -> Self {
        Self { registry, config, metrics: Metrics::new() }
    }

    #[must_use]
    pub const fn registry(&self) -> &ConnectionRegistry {
        &self.registry
    }

    /// Pushes an event to the user's live connection, if any.
    ///
    /// Delivery is at-most-once: returns `false` when the user is offline or
    /// their outbound buffer is full, and the event is dropped.
    pub fn emit_to_user(&self, user_id: Uuid, event: ServerEvent) -> bool {
        let name = event.name();
        let delivered = match self.registry.lookup(user_id) {
            Some(handle) => match handle.tx.try_send(event) {
                Ok(()) => true,
                Err(TrySendError::Full(_)) => {
                    tracing::warn!(%user_id, event = name, "Outbound buffer full, dropping event");
                    self.metrics.outbound_dropped_total.add(1, &[KeyValue::new("event", name)]);
                    false
                }
                Err(TrySendError::Closed(_)) => false,
            },
            None => false,
        };

        tracing::debug!(%user_id, event = name, delivered, "Realtime event emitted");
        self.metrics.events_total.add(1, &[KeyValue::new("event", name), KeyValue::new("delivered", delivered)]);
        delivered
    }

    /// Relays a typing indicator from `sender_id` to the receiver named in the event.
    pub fn relay(&self, sender_id: Uuid, event: ClientEvent) -> bool {
        match event {
            ClientEvent::Typing { receiver_id } => self.emit_to_user(receiver_id, ServerEvent::Typing { sender_id }),
            ClientEvent::StopTyping { receiver_id } => {
                self.emit_to_user(receiver_id, ServerEvent::StopTyping { sender_id })
            }
        }
    }

    pub async fn handle_socket(
        &self,
        socket: WebSocket,
        user_id: Uuid,
        request_id: String,
        shutdown_rx: tokio::sync::watch::Receiver<bool>,
    ) {
        let (tx, outbound_rx) = tokio::sync::mpsc::channel(self.config.outbound_buffer_size);
        let handle = ConnectionHandle::new(tx);

        let session = Session {
            user_id,
            request_id,
            socket,
            handle,
            outbound_rx,
            gateway: self.clone(),
            metrics: self.metrics.clone(),
            shutdown_rx,
        };

        session.run().await;
    }
}
