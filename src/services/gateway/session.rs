use crate::domain::events::{ClientEvent, ServerEvent};
use crate::services::gateway::registry::ConnectionHandle;
use crate::services::gateway::{GatewayService, Metrics};
use axum::extract::ws::{CloseFrame, Message as WsMessage, WebSocket, close_code};
use futures::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use uuid::Uuid;

#[derive(Debug)]
pub(crate) struct Session {
    pub(crate) user_id: Uuid,
    pub(crate) request_id: String,
    pub(crate) socket: WebSocket,
    pub(crate) handle: ConnectionHandle,
    pub(crate) outbound_rx: mpsc::Receiver<ServerEvent>,
    pub(crate) gateway: GatewayService,
    pub(crate) metrics: Metrics,
    pub(crate) shutdown_rx: tokio::sync::watch::Receiver<bool>,
}

impl Session {
    #[tracing::instrument(
        name = "websocket_session",
        skip(self),
        fields(
            user_id = %self.user_id,
            request_id = %self.request_id,
            otel.kind = "server",
            ws.connection_id = %self.handle.connection_id
        )
    )]
    pub(crate) async fn run(self) {
        // Destructuring allows independent mutable access to fields while the socket
        // is split into sink and stream halves.
        let Self { user_id, socket, handle, mut outbound_rx, gateway, metrics, mut shutdown_rx, .. } = self;

        metrics.active_connections.add(1, &[]);
        tracing::info!("WebSocket connected");

        let (mut ws_sink, mut ws_stream) = socket.split();

        // The session keeps its own sender alive in `handle`, so `outbound_rx`
        // only closes when the session ends, even after being superseded.
        gateway.registry().register(user_id, handle.clone());

        let mut shutdown_open = true;
        loop {
            if *shutdown_rx.borrow() {
                tracing::info!("Shutdown signal received, closing WebSocket");
                let _ = ws_sink
                    .send(WsMessage::Close(Some(CloseFrame {
                        code: close_code::AWAY,
                        reason: "Server shutting down".into(),
                    })))
                    .await;
                break;
            }

            tokio::select! {
                biased;

                changed = shutdown_rx.changed(), if shutdown_open => {
                    // Sender gone: no shutdown can be signalled any more.
                    shutdown_open = changed.is_ok();
                }

                msg = ws_stream.next() => {
                    let continue_loop = match msg {
                        Some(Ok(WsMessage::Text(text))) => {
                            match serde_json::from_str::<ClientEvent>(text.as_str()) {
                                Ok(event) => {
                                    gateway.relay(user_id, event);
                                }
                                Err(e) => {
                                    tracing::warn!(error = %e, "Ignoring malformed realtime frame");
                                    metrics.inbound_rejected_total.add(1, &[]);
                                }
                            }
                            true
                        }
                        Some(Ok(WsMessage::Binary(_))) => {
                            tracing::warn!("Ignoring unexpected binary frame");
                            metrics.inbound_rejected_total.add(1, &[]);
                            true
                        }
                        Some(Ok(WsMessage::Ping(_))) => {
                            tracing::debug!("Received heartbeat ping from client");
                            true
                        }
                        Some(Ok(WsMessage::Pong(_))) => {
                            tracing::debug!("Received heartbeat pong from client");
                            true
                        }
                        Some(Ok(WsMessage::Close(_)) | Err(_)) | None => false,
                    };

                    if !continue_loop { break; }
                }

                event = outbound_rx.recv() => {
                    let Some(event) = event else { break };
                    match serde_json::to_string(&event) {
                        Ok(json) => {
                            if ws_sink.send(WsMessage::Text(json.into())).await.is_err() { break; }
                        }
                        Err(e) => {
                            tracing::error!(error = %e, event = event.name(), "Failed to serialize realtime event");
                        }
                    }
                }
            }
        }

        let _ = ws_sink.close().await;

        if !gateway.registry().unregister(user_id, &handle) {
            tracing::debug!("Connection was superseded, registry entry left in place");
        }

        metrics.active_connections.add(-1, &[]);
        tracing::info!("WebSocket disconnected");
    }
}
