//! Broadcast coordinator: per-connection protocol state machine and fan-out.
//!
//! The transport hands every connection's frames to the hub and the hub
//! pushes outbound envelopes into per-connection queues. A connection is
//! "joined" exactly when the registry holds a session for it.

use std::collections::HashMap;
use tokio::sync::{mpsc, RwLock};

use crate::protocol::{ClientMessage, ServerMessage};
use crate::registry::{ConnId, Registry, RegistryError};

/// Sender half of one connection's outbound queue. Pushes never block;
/// the socket task drains the other end at its own pace.
pub type Outbound = mpsc::UnboundedSender<ServerMessage>;

pub struct ChatHub {
    registry: Registry,
    peers: RwLock<HashMap<ConnId, Outbound>>,
}

impl ChatHub {
    pub fn new(registry: Registry) -> Self {
        Self {
            registry,
            peers: RwLock::new(HashMap::new()),
        }
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    /// Attach a new connection and its outbound queue, returning its id.
    pub async fn connect(&self, tx: Outbound) -> ConnId {
        let conn = ulid::Ulid::new().to_string();
        self.peers.write().await.insert(conn.clone(), tx);
        tracing::info!("New client connected: {}", conn);
        conn
    }

    /// Handle one raw inbound frame from `conn`.
    pub async fn handle_frame(&self, conn: &ConnId, raw: &str) {
        let value: serde_json::Value = match serde_json::from_str(raw) {
            Ok(v) => v,
            Err(e) => {
                tracing::debug!("Unparseable frame from {}: {}", conn, e);
                self.send_to(conn, ServerMessage::error("Invalid message format"))
                    .await;
                return;
            }
        };

        // The tag alone separates the two protocol errors: an unrecognized
        // tag is "Unknown message type", a recognized tag whose fields fail
        // to deserialize is "Invalid message format".
        let known_kind = matches!(
            value.get("type").and_then(serde_json::Value::as_str),
            Some("join" | "message")
        );
        if !known_kind {
            self.send_to(conn, ServerMessage::error("Unknown message type"))
                .await;
            return;
        }

        match serde_json::from_value::<ClientMessage>(value) {
            Ok(ClientMessage::Join { username }) => self.handle_join(conn, &username).await,
            Ok(ClientMessage::Message { text }) => self.handle_message(conn, &text).await,
            Err(e) => {
                tracing::debug!("Malformed payload from {}: {}", conn, e);
                self.send_to(conn, ServerMessage::error("Invalid message format"))
                    .await;
            }
        }
    }

    async fn handle_join(&self, conn: &ConnId, username: &str) {
        let username = username.trim();

        if username.is_empty() {
            self.send_to(conn, ServerMessage::error("Username is required"))
                .await;
            return;
        }

        match self.registry.register(conn, username.to_string()).await {
            Ok(session) => {
                self.send_to(conn, ServerMessage::joined(session.username.clone()))
                    .await;
                self.broadcast_except(
                    conn,
                    ServerMessage::system(format!("{} joined the chat", session.username)),
                )
                .await;
                tracing::info!("{} joined the chat", session.username);
            }
            Err(RegistryError::UsernameTaken) => {
                self.send_to(conn, ServerMessage::error("Username is already taken"))
                    .await;
            }
            Err(RegistryError::AlreadyRegistered) => {
                self.send_to(conn, ServerMessage::error("You have already joined the chat"))
                    .await;
            }
        }
    }

    async fn handle_message(&self, conn: &ConnId, text: &str) {
        let Some(session) = self.registry.get(conn).await else {
            self.send_to(conn, ServerMessage::error("You must join the chat first"))
                .await;
            return;
        };

        let text = text.trim();
        if text.is_empty() {
            self.send_to(conn, ServerMessage::error("Message text is required"))
                .await;
            return;
        }

        tracing::info!("{}: {}", session.username, text);
        self.broadcast(ServerMessage::message(session.username, text))
            .await;
    }

    /// Close notification from the transport. Drops the outbound queue and,
    /// if the connection had joined, announces the departure to the rest.
    pub async fn disconnect(&self, conn: &ConnId) {
        self.peers.write().await.remove(conn);

        if let Some(session) = self.registry.unregister(conn).await {
            tracing::info!("{} disconnected", session.username);
            self.broadcast(ServerMessage::system(format!(
                "{} left the chat",
                session.username
            )))
            .await;
        } else {
            tracing::debug!("Client disconnected before joining: {}", conn);
        }
    }

    /// Deliver to every joined connection in one registry snapshot.
    async fn broadcast(&self, msg: ServerMessage) {
        self.fan_out(msg, None).await;
    }

    /// Same as [`broadcast`](Self::broadcast) but skips one connection.
    async fn broadcast_except(&self, skip: &ConnId, msg: ServerMessage) {
        self.fan_out(msg, Some(skip)).await;
    }

    async fn fan_out(&self, msg: ServerMessage, skip: Option<&ConnId>) {
        let targets = self.registry.joined().await;
        let peers = self.peers.read().await;

        for (conn, _) in &targets {
            if skip == Some(conn) {
                continue;
            }
            // A closed peer only costs itself its message
            if let Some(tx) = peers.get(conn) {
                if tx.send(msg.clone()).is_err() {
                    tracing::debug!("Dropping broadcast to closed connection: {}", conn);
                }
            }
        }
    }

    async fn send_to(&self, conn: &ConnId, msg: ServerMessage) {
        if let Some(tx) = self.peers.read().await.get(conn) {
            if tx.send(msg).is_err() {
                tracing::debug!("Dropping reply to closed connection: {}", conn);
            }
        }
    }
}
