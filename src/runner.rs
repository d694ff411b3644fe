//! The per-match task.
//!
//! Every session lives inside one tokio task that owns the `GameSession` and
//! its member list. Other tasks reach it only through the command queue held by
//! a [`SessionHandle`]; commands are applied strictly in arrival order. The loop
//! ticks at a fixed rate, drains a bounded number of commands per tick and
//! pushes `board_state` frames after state changes (and on every tick when
//! configured to).

use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc::error::TryRecvError;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

use crate::broadcast::{broadcast_state, fan_out, Member, MessageSink};
use crate::config::ArenaConfig;
use crate::enums::Role;
use crate::errors::{ConnectionId, MatchId, NetworkError, NetworkResult, SessionError};
use crate::geometry::BoardGeometry;
use crate::protocol::{ClientMessage, ServerMessage, StateSnapshot};
use crate::session::GameSession;

pub enum SessionCommand {
    Join {
        connection_id: ConnectionId,
        role: Role,
        sink: Arc<dyn MessageSink>,
    },
    Leave {
        connection_id: ConnectionId,
    },
    Client {
        connection_id: ConnectionId,
        message: ClientMessage,
    },
    /// Spectator view for the HTTP surface.
    Snapshot {
        reply: oneshot::Sender<StateSnapshot>,
    },
    Shutdown,
}

#[derive(Debug, Clone)]
pub struct RunnerSettings {
    pub tick_interval: Duration,
    pub max_commands_per_tick: usize,
    pub broadcast_every_tick: bool,
    pub outbound_capacity: usize,
    pub geometry: BoardGeometry,
}

impl From<&ArenaConfig> for RunnerSettings {
    fn from(config: &ArenaConfig) -> Self {
        Self {
            tick_interval: config.tick_interval(),
            max_commands_per_tick: config.max_commands_per_tick,
            broadcast_every_tick: config.broadcast_every_tick,
            outbound_capacity: config.outbound_capacity,
            geometry: config.geometry(),
        }
    }
}

/// Told about members the runner dropped after a failed send.
#[async_trait]
pub trait DisconnectReporter: Send + Sync {
    async fn connection_lost(&self, connection_id: &str);
}

/// Cloneable entry point into a running session.
#[derive(Clone)]
pub struct SessionHandle {
    match_id: MatchId,
    tx: mpsc::UnboundedSender<SessionCommand>,
}

impl SessionHandle {
    pub fn match_id(&self) -> &str {
        &self.match_id
    }

    pub fn send(&self, command: SessionCommand) -> NetworkResult<()> {
        self.tx.send(command).map_err(|_| NetworkError::SessionClosed {
            match_id: self.match_id.clone(),
        })
    }

    pub async fn snapshot(&self) -> NetworkResult<StateSnapshot> {
        let (reply, rx) = oneshot::channel();
        self.send(SessionCommand::Snapshot { reply })?;
        rx.await.map_err(|_| NetworkError::SessionClosed {
            match_id: self.match_id.clone(),
        })
    }

    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }
}

enum Flow {
    Idle,
    Changed,
    Stop,
}

pub struct SessionRunner {
    session: GameSession,
    members: Vec<Member>,
    rx: mpsc::UnboundedReceiver<SessionCommand>,
    settings: RunnerSettings,
    reporter: Arc<dyn DisconnectReporter>,
}

/// Starts the task for `session` on the current runtime.
pub fn spawn_session(
    session: GameSession,
    settings: RunnerSettings,
    reporter: Arc<dyn DisconnectReporter>,
) -> (SessionHandle, JoinHandle<()>) {
    let (tx, rx) = mpsc::unbounded_channel();
    let handle = SessionHandle {
        match_id: session.match_id().to_string(),
        tx,
    };
    let runner = SessionRunner {
        session,
        members: Vec::new(),
        rx,
        settings,
        reporter,
    };
    (handle, tokio::spawn(runner.run()))
}

impl SessionRunner {
    pub async fn run(mut self) {
        log::info!("🎬 Session task for match {} running", self.session.match_id());
        self.session.start();

        let mut ticker = tokio::time::interval(self.settings.tick_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            ticker.tick().await;

            let mut changed = false;
            for _ in 0..self.settings.max_commands_per_tick {
                let command = match self.rx.try_recv() {
                    Ok(command) => command,
                    Err(TryRecvError::Empty) => break,
                    Err(TryRecvError::Disconnected) => {
                        self.close().await;
                        return;
                    }
                };
                match self.handle(command).await {
                    Flow::Idle => {}
                    Flow::Changed => changed = true,
                    Flow::Stop => {
                        self.close().await;
                        return;
                    }
                }
            }

            if changed || (self.settings.broadcast_every_tick && !self.members.is_empty()) {
                self.broadcast().await;
            }
        }
    }

    async fn handle(&mut self, command: SessionCommand) -> Flow {
        match command {
            SessionCommand::Join {
                connection_id,
                role,
                sink,
            } => {
                self.join(connection_id, role, sink).await;
                Flow::Changed
            }
            SessionCommand::Leave { connection_id } => {
                self.drop_members(vec![(connection_id, false)]).await;
                Flow::Changed
            }
            SessionCommand::Client {
                connection_id,
                message,
            } => self.client_message(connection_id, message).await,
            SessionCommand::Snapshot { reply } => {
                let snapshot =
                    StateSnapshot::capture(&self.session, Role::Spectator, &self.settings.geometry);
                let _ = reply.send(snapshot);
                Flow::Idle
            }
            SessionCommand::Shutdown => Flow::Stop,
        }
    }

    async fn join(&mut self, connection_id: ConnectionId, requested: Role, sink: Arc<dyn MessageSink>) {
        let role = self.session.attach(connection_id.clone(), requested);
        if role != requested {
            log::warn!(
                "⚠️ {} asked for {} in match {} but got {}",
                connection_id,
                requested,
                self.session.match_id(),
                role
            );
        }
        self.members.push(Member {
            connection_id: connection_id.clone(),
            role,
            sink,
        });

        let opponent = role
            .color()
            .and_then(|color| self.session.player(color.opposite()).cloned());
        let game_id = self.session.match_id().to_string();
        self.send_to(
            &connection_id,
            ServerMessage::GameStarted {
                game_id: game_id.clone(),
                player_color: role,
                opponent: opponent.clone(),
            },
        )
        .await;

        // The waiting player learns who its opponent is.
        if let (Some(color), Some(opponent)) = (role.color(), opponent) {
            self.send_to(
                &opponent,
                ServerMessage::GameStarted {
                    game_id,
                    player_color: Role::from(color.opposite()),
                    opponent: Some(connection_id),
                },
            )
            .await;
        }
    }

    async fn client_message(&mut self, connection_id: ConnectionId, message: ClientMessage) -> Flow {
        let Some(role) = self.role_of(&connection_id) else {
            log::warn!(
                "⚠️ {} in match {}",
                NetworkError::not_in_session(&connection_id),
                self.session.match_id()
            );
            return Flow::Idle;
        };

        match message {
            ClientMessage::Move { piece_id, target } => {
                let Some(color) = role.color() else {
                    self.reject(&connection_id, SessionError::SpectatorInput).await;
                    return Flow::Idle;
                };
                match self.session.attempt_move(color, &piece_id, target) {
                    Ok(outcome) => {
                        if let Some(winner) = outcome.winner {
                            self.send_all(ServerMessage::GameOver { winner }).await;
                        }
                        Flow::Changed
                    }
                    Err(e) => {
                        self.reject(&connection_id, e).await;
                        Flow::Idle
                    }
                }
            }
            ClientMessage::SelectPiece { position } => {
                let Some(color) = role.color() else {
                    self.reject(&connection_id, SessionError::SpectatorInput).await;
                    return Flow::Idle;
                };
                let changed = self.session.select_piece(color, position);
                self.send_all(ServerMessage::selection_update(&self.session))
                    .await;
                if changed {
                    Flow::Changed
                } else {
                    Flow::Idle
                }
            }
            ClientMessage::MoveCursor { dx, dy } => {
                let Some(color) = role.color() else {
                    self.reject(&connection_id, SessionError::SpectatorInput).await;
                    return Flow::Idle;
                };
                self.session.move_cursor(color, dx, dy);
                Flow::Changed
            }
            ClientMessage::GetMoves { piece_id } => {
                let reply = match self.session.legal_targets(&piece_id) {
                    Ok(targets) => ServerMessage::AvailableMoves { piece_id, targets },
                    Err(e) => ServerMessage::error(e.to_string()),
                };
                self.send_to(&connection_id, reply).await;
                Flow::Idle
            }
            ClientMessage::GetGameState => {
                let snapshot =
                    StateSnapshot::capture(&self.session, role, &self.settings.geometry);
                self.send_to(&connection_id, ServerMessage::GameState(snapshot))
                    .await;
                Flow::Idle
            }
            ClientMessage::Ping => {
                self.send_to(&connection_id, ServerMessage::Pong).await;
                Flow::Idle
            }
        }
    }

    async fn reject(&mut self, connection_id: &str, error: SessionError) {
        log::warn!(
            "🚫 Rejected input from {} in match {}: {}",
            connection_id,
            self.session.match_id(),
            error
        );
        self.send_to(connection_id, ServerMessage::error(error.to_string()))
            .await;
    }

    fn role_of(&self, connection_id: &str) -> Option<Role> {
        self.members
            .iter()
            .find(|member| member.connection_id == connection_id)
            .map(|member| member.role)
    }

    async fn send_to(&mut self, connection_id: &str, message: ServerMessage) {
        let targets: Vec<Member> = self
            .members
            .iter()
            .filter(|member| member.connection_id == connection_id)
            .cloned()
            .collect();
        let failed = fan_out(&targets, |_| message.clone()).await;
        self.report_failures(failed).await;
    }

    async fn send_all(&mut self, message: ServerMessage) {
        let failed = fan_out(&self.members, |_| message.clone()).await;
        self.report_failures(failed).await;
    }

    async fn broadcast(&mut self) {
        let failed =
            broadcast_state(&self.session, &self.members, &self.settings.geometry).await;
        self.report_failures(failed).await;
    }

    async fn report_failures(&mut self, failed: Vec<ConnectionId>) {
        if failed.is_empty() {
            return;
        }
        self.drop_members(failed.into_iter().map(|id| (id, true)).collect())
            .await;
    }

    /// Detaches members, telling the others when a player left. Members whose
    /// notice fails are dropped in turn. `report` marks members lost to a failed
    /// send, which the registry has not heard about yet.
    async fn drop_members(&mut self, mut pending: Vec<(ConnectionId, bool)>) {
        while let Some((connection_id, report)) = pending.pop() {
            let before = self.members.len();
            self.members
                .retain(|member| member.connection_id != connection_id);
            let was_member = self.members.len() != before;

            let role = self.session.handle_disconnect(&connection_id);
            if role.is_some_and(Role::is_player) {
                let notice = ServerMessage::PlayerDisconnected {
                    message: "Opponent disconnected".to_string(),
                };
                let failed = fan_out(&self.members, |_| notice.clone()).await;
                pending.extend(failed.into_iter().map(|id| (id, true)));
                if self.session.is_empty() {
                    log::info!("🪑 Both seats of match {} are empty", self.session.match_id());
                }
            }

            if report && was_member {
                log::warn!(
                    "✂️ Pruned {} from match {}",
                    connection_id,
                    self.session.match_id()
                );
                self.reporter.connection_lost(&connection_id).await;
            }
        }
    }

    async fn close(&mut self) {
        let notice = ServerMessage::PlayerDisconnected {
            message: "Match closed".to_string(),
        };
        // Best effort; nobody is left to report failures to.
        let _ = fan_out(&self.members, |_| notice.clone()).await;
        self.members.clear();
        self.session.close();
        log::info!("🛑 Session task for match {} stopped", self.session.match_id());
    }
}
