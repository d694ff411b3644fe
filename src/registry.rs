use async_trait::async_trait;
use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

use crate::broadcast::MessageSink;
use crate::enums::{Color, Role, COLORS};
use crate::errors::{ConnectionId, MatchId, NetworkError, NetworkResult};
use crate::events::EventFeed;
use crate::protocol::{ClientMessage, StateSnapshot};
use crate::runner::{spawn_session, DisconnectReporter, RunnerSettings, SessionCommand, SessionHandle};
use crate::session::{GameSession, PerColor};

/// Where a new connection ended up.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Assignment {
    pub match_id: MatchId,
    pub role: Role,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MatchSummary {
    pub match_id: MatchId,
    pub white: Option<ConnectionId>,
    pub black: Option<ConnectionId>,
    pub spectators: usize,
}

/// Registry-side mirror of a session's seats. The session task keeps the
/// authoritative copy; this one lets matchmaking and teardown decide without a
/// round trip to the task. Both are updated from the same connect and
/// disconnect calls, and `GameSession::attach` demotes to spectator if they
/// ever disagree.
struct SessionEntry {
    handle: SessionHandle,
    seats: PerColor<Option<ConnectionId>>,
    spectators: Vec<ConnectionId>,
}

impl SessionEntry {
    fn open_slot(&self) -> Option<Color> {
        COLORS
            .into_iter()
            .find(|color| self.seats.get(*color).is_none())
    }

    fn is_empty(&self) -> bool {
        self.seats.white.is_none() && self.seats.black.is_none()
    }

    fn summary(&self) -> MatchSummary {
        MatchSummary {
            match_id: self.handle.match_id().to_string(),
            white: self.seats.white.clone(),
            black: self.seats.black.clone(),
            spectators: self.spectators.len(),
        }
    }
}

#[derive(Default)]
struct RegistryState {
    current: Option<MatchId>,
    sessions: HashMap<MatchId, SessionEntry>,
    connections: HashMap<ConnectionId, MatchId>,
}

/// Matchmaker. One current session: new connections take its first free color
/// slot (White, then Black) or spectate. The session is created on demand and
/// torn down once both color slots are empty.
///
/// The lock is never held across an await on a session task; sessions are only
/// reached through their unbounded command queues.
#[derive(Clone)]
pub struct SessionRegistry {
    state: Arc<RwLock<RegistryState>>,
    feed: Arc<EventFeed>,
    settings: RunnerSettings,
}

impl SessionRegistry {
    pub fn new(feed: Arc<EventFeed>, settings: RunnerSettings) -> Self {
        Self {
            state: Arc::new(RwLock::new(RegistryState::default())),
            feed,
            settings,
        }
    }

    pub async fn on_connect(
        &self,
        connection_id: impl Into<ConnectionId>,
        sink: Arc<dyn MessageSink>,
    ) -> NetworkResult<Assignment> {
        let connection_id = connection_id.into();
        let mut state = self.state.write().await;

        let match_id = match state.current.clone() {
            Some(match_id) if state.sessions.get(&match_id).is_some_and(|e| !e.handle.is_closed()) => {
                match_id
            }
            stale => {
                if let Some(stale) = stale {
                    log::warn!("⚠️ Session {} stopped unexpectedly, replacing it", stale);
                    Self::forget_session(&mut state, &stale);
                }
                let match_id = self.create_session(&mut state);
                state.current = Some(match_id.clone());
                match_id
            }
        };

        let entry = state
            .sessions
            .get_mut(&match_id)
            .ok_or_else(|| NetworkError::SessionClosed {
                match_id: match_id.clone(),
            })?;
        let role = match entry.open_slot() {
            Some(color) => {
                *entry.seats.get_mut(color) = Some(connection_id.clone());
                Role::from(color)
            }
            None => {
                entry.spectators.push(connection_id.clone());
                Role::Spectator
            }
        };
        entry.handle.send(SessionCommand::Join {
            connection_id: connection_id.clone(),
            role,
            sink,
        })?;
        state
            .connections
            .insert(connection_id.clone(), match_id.clone());

        log::info!(
            "🎯 {} assigned {} in match {}",
            connection_id,
            role,
            match_id
        );
        Ok(Assignment { match_id, role })
    }

    /// Releases the connection's slot. Calling it again for the same connection does nothing.
    pub async fn on_disconnect(&self, connection_id: &str) {
        let mut state = self.state.write().await;
        let Some(match_id) = state.connections.remove(connection_id) else {
            return;
        };
        let Some(entry) = state.sessions.get_mut(&match_id) else {
            return;
        };

        for color in COLORS {
            let seat = entry.seats.get_mut(color);
            if seat.as_deref() == Some(connection_id) {
                *seat = None;
            }
        }
        entry.spectators.retain(|c| c != connection_id);
        if let Err(e) = entry.handle.send(SessionCommand::Leave {
            connection_id: connection_id.to_string(),
        }) {
            log::debug!("Leave for {} not delivered: {}", connection_id, e);
        }
        log::info!("🔌 {} released from match {}", connection_id, match_id);

        if entry.is_empty() {
            log::info!("🧹 Both players gone, tearing down match {}", match_id);
            if let Err(e) = entry.handle.send(SessionCommand::Shutdown) {
                log::debug!("Shutdown for match {} not delivered: {}", match_id, e);
            }
            Self::forget_session(&mut state, &match_id);
        }
    }

    pub async fn on_message(&self, connection_id: &str, message: ClientMessage) -> NetworkResult<()> {
        let state = self.state.read().await;
        let entry = state
            .connections
            .get(connection_id)
            .and_then(|match_id| state.sessions.get(match_id))
            .ok_or_else(|| NetworkError::not_in_session(connection_id))?;
        entry.handle.send(SessionCommand::Client {
            connection_id: connection_id.to_string(),
            message,
        })
    }

    pub async fn list_matches(&self) -> Vec<MatchSummary> {
        let state = self.state.read().await;
        let mut matches: Vec<_> = state.sessions.values().map(SessionEntry::summary).collect();
        matches.sort_by(|a, b| a.match_id.cmp(&b.match_id));
        matches
    }

    /// Outbound queue size for new connections.
    pub fn outbound_capacity(&self) -> usize {
        self.settings.outbound_capacity
    }

    pub async fn match_of(&self, connection_id: &str) -> Option<MatchId> {
        self.state.read().await.connections.get(connection_id).cloned()
    }

    /// Spectator view fetched from the session task.
    pub async fn snapshot(&self, match_id: &str) -> NetworkResult<StateSnapshot> {
        let handle = {
            let state = self.state.read().await;
            state
                .sessions
                .get(match_id)
                .map(|entry| entry.handle.clone())
                .ok_or_else(|| NetworkError::SessionClosed {
                    match_id: match_id.to_string(),
                })?
        };
        handle.snapshot().await
    }

    /// Stops every session task.
    pub async fn shutdown(&self) {
        let mut state = self.state.write().await;
        for (match_id, entry) in state.sessions.drain() {
            log::info!("🛑 Shutting down match {}", match_id);
            if let Err(e) = entry.handle.send(SessionCommand::Shutdown) {
                log::debug!("Shutdown for match {} not delivered: {}", match_id, e);
            }
        }
        state.connections.clear();
        state.current = None;
    }

    fn create_session(&self, state: &mut RegistryState) -> MatchId {
        let match_id = format!("match_{}", uuid::Uuid::new_v4());
        let session = GameSession::new(match_id.clone(), self.feed.clone());
        let reporter: Arc<dyn DisconnectReporter> = Arc::new(self.clone());
        let (handle, _task) = spawn_session(session, self.settings.clone(), reporter);
        state.sessions.insert(
            match_id.clone(),
            SessionEntry {
                handle,
                seats: PerColor::default(),
                spectators: Vec::new(),
            },
        );
        log::info!("🆕 Created match {}", match_id);
        match_id
    }

    /// Drops the session and detaches everyone still mapped to it.
    fn forget_session(state: &mut RegistryState, match_id: &str) {
        if let Some(entry) = state.sessions.remove(match_id) {
            for spectator in &entry.spectators {
                state.connections.remove(spectator);
            }
        }
        state.connections.retain(|_, m| m != match_id);
        if state.current.as_deref() == Some(match_id) {
            state.current = None;
        }
    }
}

#[async_trait]
impl DisconnectReporter for SessionRegistry {
    async fn connection_lost(&self, connection_id: &str) {
        self.on_disconnect(connection_id).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::broadcast::ChannelSink;
    use crate::geometry::BoardGeometry;
    use crate::protocol::ServerMessage;
    use std::time::Duration;
    use tokio::sync::mpsc;
    use tokio::time::timeout;

    fn registry() -> SessionRegistry {
        SessionRegistry::new(
            Arc::new(EventFeed::new()),
            RunnerSettings {
                tick_interval: Duration::from_millis(2),
                max_commands_per_tick: 64,
                broadcast_every_tick: false,
                outbound_capacity: 64,
                geometry: BoardGeometry::default(),
            },
        )
    }

    async fn connect(
        registry: &SessionRegistry,
        id: &str,
    ) -> (Assignment, mpsc::Receiver<ServerMessage>) {
        let (sink, rx) = ChannelSink::new(id);
        let assignment = registry.on_connect(id, Arc::new(sink)).await.unwrap();
        (assignment, rx)
    }

    async fn wait_for(rx: &mut mpsc::Receiver<ServerMessage>, wanted: &ServerMessage) {
        timeout(Duration::from_secs(2), async {
            while let Some(message) = rx.recv().await {
                if &message == wanted {
                    return;
                }
            }
            panic!("channel closed before {:?}", wanted);
        })
        .await
        .expect("timed out");
    }

    fn opponent_left() -> ServerMessage {
        ServerMessage::PlayerDisconnected {
            message: "Opponent disconnected".to_string(),
        }
    }

    #[tokio::test]
    async fn test_roles_follow_arrival_order() {
        let registry = registry();
        let (a, _rx_a) = connect(&registry, "a").await;
        let (b, _rx_b) = connect(&registry, "b").await;
        let (c, _rx_c) = connect(&registry, "c").await;
        let (d, _rx_d) = connect(&registry, "d").await;

        assert_eq!(a.role, Role::White);
        assert_eq!(b.role, Role::Black);
        assert_eq!(c.role, Role::Spectator);
        assert_eq!(d.role, Role::Spectator);
        assert_eq!(a.match_id, d.match_id);

        let matches = registry.list_matches().await;
        assert_eq!(matches.len(), 1);
        assert_eq!(matches[0].white.as_deref(), Some("a"));
        assert_eq!(matches[0].spectators, 2);
    }

    #[tokio::test]
    async fn test_one_player_leaving_keeps_session() {
        let registry = registry();
        let (a, _rx_a) = connect(&registry, "a").await;
        let (_, mut rx_b) = connect(&registry, "b").await;

        registry.on_disconnect("a").await;
        registry.on_disconnect("a").await;
        wait_for(&mut rx_b, &opponent_left()).await;
        assert_eq!(registry.list_matches().await.len(), 1);

        // The freed White slot is reclaimed, and the session task agrees.
        let (e, mut rx_e) = connect(&registry, "e").await;
        assert_eq!(e.role, Role::White);
        assert_eq!(e.match_id, a.match_id);
        wait_for(
            &mut rx_e,
            &ServerMessage::GameStarted {
                game_id: a.match_id.clone(),
                player_color: Role::White,
                opponent: Some("b".to_string()),
            },
        )
        .await;
        assert_eq!(registry.list_matches().await[0].white.as_deref(), Some("e"));
    }

    #[tokio::test]
    async fn test_both_players_leaving_tears_down() {
        let registry = registry();
        let (a, _rx_a) = connect(&registry, "a").await;
        let (_, _rx_b) = connect(&registry, "b").await;
        let (_, mut rx_c) = connect(&registry, "c").await;

        registry.on_disconnect("a").await;
        registry.on_disconnect("b").await;
        assert!(registry.list_matches().await.is_empty());
        assert_eq!(registry.match_of("c").await, None);
        wait_for(
            &mut rx_c,
            &ServerMessage::PlayerDisconnected {
                message: "Match closed".to_string(),
            },
        )
        .await;

        assert!(matches!(
            registry.on_message("c", ClientMessage::Ping).await,
            Err(NetworkError::NotInSession { .. })
        ));

        let (f, _rx_f) = connect(&registry, "f").await;
        assert_eq!(f.role, Role::White);
        assert_ne!(f.match_id, a.match_id);
        assert!(registry.snapshot(&a.match_id).await.is_err());
    }

    #[tokio::test]
    async fn test_messages_route_to_the_right_session() {
        let registry = registry();
        let (_, mut rx_a) = connect(&registry, "a").await;
        registry.on_message("a", ClientMessage::Ping).await.unwrap();
        wait_for(&mut rx_a, &ServerMessage::Pong).await;

        assert!(matches!(
            registry.on_message("ghost", ClientMessage::Ping).await,
            Err(NetworkError::NotInSession { .. })
        ));
    }

    #[tokio::test]
    async fn test_dead_connection_is_pruned() {
        let registry = registry();
        let (_, mut rx_a) = connect(&registry, "a").await;
        let (b, rx_b) = connect(&registry, "b").await;
        drop(rx_b);

        wait_for(&mut rx_a, &opponent_left()).await;
        timeout(Duration::from_secs(2), async {
            while registry.match_of("b").await.is_some() {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .expect("registry never dropped the dead connection");

        let summary = &registry.list_matches().await[0];
        assert_eq!(summary.match_id, b.match_id);
        assert_eq!(summary.black, None);
    }

    #[tokio::test]
    async fn test_shutdown_closes_every_session() {
        let registry = registry();
        let (_, mut rx_a) = connect(&registry, "a").await;

        registry.shutdown().await;
        wait_for(
            &mut rx_a,
            &ServerMessage::PlayerDisconnected {
                message: "Match closed".to_string(),
            },
        )
        .await;
        assert!(registry.list_matches().await.is_empty());
        assert_eq!(registry.match_of("a").await, None);

        // Nothing left to stop; a second call is harmless.
        registry.shutdown().await;
        assert!(matches!(
            registry.on_message("a", ClientMessage::Ping).await,
            Err(NetworkError::NotInSession { .. })
        ));
    }
}
