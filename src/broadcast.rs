use async_trait::async_trait;
use futures::future::join_all;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;

use crate::enums::Role;
use crate::errors::{ConnectionId, NetworkError, NetworkResult};
use crate::geometry::BoardGeometry;
use crate::protocol::{ServerMessage, StateSnapshot};
use crate::session::GameSession;

/// Outbound half of one connection.
#[async_trait]
pub trait MessageSink: Send + Sync {
    async fn send(&self, message: ServerMessage) -> NetworkResult<()>;
}

/// Frames a connection may have queued before it counts as stalled.
pub const DEFAULT_OUTBOUND_CAPACITY: usize = 64;

/// Sink backed by the bounded channel feeding a connection's writer task. Fails
/// with `ConnectionLost` once the writer has gone away or stopped keeping up.
#[derive(Clone)]
pub struct ChannelSink {
    connection_id: ConnectionId,
    tx: mpsc::Sender<ServerMessage>,
}

impl ChannelSink {
    pub fn new(connection_id: impl Into<ConnectionId>) -> (Self, mpsc::Receiver<ServerMessage>) {
        Self::with_capacity(connection_id, DEFAULT_OUTBOUND_CAPACITY)
    }

    pub fn with_capacity(
        connection_id: impl Into<ConnectionId>,
        capacity: usize,
    ) -> (Self, mpsc::Receiver<ServerMessage>) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        let sink = Self {
            connection_id: connection_id.into(),
            tx,
        };
        (sink, rx)
    }
}

#[async_trait]
impl MessageSink for ChannelSink {
    async fn send(&self, message: ServerMessage) -> NetworkResult<()> {
        self.tx.try_send(message).map_err(|e| match e {
            TrySendError::Full(_) => {
                NetworkError::connection_lost(&self.connection_id, "outbound queue full")
            }
            TrySendError::Closed(_) => NetworkError::connection_lost(&self.connection_id, "writer closed"),
        })
    }
}

/// A connection attached to a session.
#[derive(Clone)]
pub struct Member {
    pub connection_id: ConnectionId,
    pub role: Role,
    pub sink: Arc<dyn MessageSink>,
}

/// `board_state` frame for one recipient.
pub fn state_message(session: &GameSession, for_role: Role, geometry: &BoardGeometry) -> ServerMessage {
    ServerMessage::BoardState(StateSnapshot::capture(session, for_role, geometry))
}

/// Sends a per-recipient message to every member concurrently. A failed send
/// does not stop delivery to the others; the ids of failed members are returned.
pub async fn fan_out<F>(members: &[Member], build: F) -> Vec<ConnectionId>
where
    F: Fn(&Member) -> ServerMessage,
{
    let sends = members.iter().map(|member| {
        let message = build(member);
        async move {
            match member.sink.send(message).await {
                Ok(()) => None,
                Err(e) => {
                    log::error!("📤 Send to {} failed: {}", member.connection_id, e);
                    Some(member.connection_id.clone())
                }
            }
        }
    });
    join_all(sends).await.into_iter().flatten().collect()
}

/// Sends the current board to every member, each tagged with its own role.
pub async fn broadcast_state(
    session: &GameSession,
    members: &[Member],
    geometry: &BoardGeometry,
) -> Vec<ConnectionId> {
    fan_out(members, |member| state_message(session, member.role, geometry)).await
}
