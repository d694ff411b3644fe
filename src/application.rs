use axum::extract::{Path, State};
use axum::http::{Method, StatusCode};
use axum::routing::get;
use axum::{Json, Router};
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};

use crate::config::ArenaConfig;
use crate::errors::ArenaResult;
use crate::events::{EventFeed, ALL_EVENT_KINDS};
use crate::observers::moves_log::MOVE_LOG_EVENTS;
use crate::observers::score::SCORE_EVENTS;
use crate::observers::{CueDispatcher, CuePlayer, LoggingCuePlayer, MoveLog, MoveRecord, ScoreBoard, ScoreSummary};
use crate::protocol::StateSnapshot;
use crate::registry::{MatchSummary, SessionRegistry};
use crate::runner::RunnerSettings;
use crate::websocket::ws_handler;

/// Process-wide wiring: one event feed, its observers and the matchmaker.
#[derive(Clone)]
pub struct ArenaService {
    registry: SessionRegistry,
    scores: Arc<ScoreBoard>,
    moves: Arc<MoveLog>,
}

impl ArenaService {
    /// Builds the service with the logging cue player. Must run inside a tokio runtime.
    pub fn new(config: ArenaConfig) -> ArenaResult<Self> {
        Self::with_cue_player(config, Arc::new(LoggingCuePlayer))
    }

    pub fn with_cue_player(config: ArenaConfig, player: Arc<dyn CuePlayer>) -> ArenaResult<Self> {
        config.validate()?;

        let feed = Arc::new(EventFeed::new());
        let scores = Arc::new(ScoreBoard::new());
        let moves = Arc::new(MoveLog::new());
        feed.subscribe(&SCORE_EVENTS, scores.clone());
        feed.subscribe(&MOVE_LOG_EVENTS, moves.clone());

        let (cues, _consumer) = CueDispatcher::spawn(player);
        feed.subscribe(&ALL_EVENT_KINDS, cues);

        let registry = SessionRegistry::new(feed.clone(), RunnerSettings::from(&config));
        log::info!(
            "⚙️ Arena ready: {} Hz, {} commands/tick, {} subscribers",
            config.tick_hz,
            config.max_commands_per_tick,
            feed.subscriber_count()
        );

        Ok(Self {
            registry,
            scores,
            moves,
        })
    }

    pub fn registry(&self) -> &SessionRegistry {
        &self.registry
    }

    pub fn score(&self, match_id: &str) -> Option<ScoreSummary> {
        self.scores.summary(match_id)
    }

    pub fn moves(&self, match_id: &str) -> Option<Vec<MoveRecord>> {
        self.moves.records(match_id)
    }
}

pub fn router(service: ArenaService) -> Router {
    let cors = CorsLayer::new()
        .allow_methods([Method::GET, Method::OPTIONS])
        .allow_headers(Any)
        .allow_origin(Any);

    Router::new()
        .route("/", get(banner))
        .route("/matches", get(list_matches))
        .route("/matches/{match_id}", get(get_match))
        .route("/matches/{match_id}/score", get(get_score))
        .route("/matches/{match_id}/moves", get(get_moves))
        .route("/ws", get(ws_handler))
        .with_state(service)
        .layer(cors)
}

async fn banner() -> &'static str {
    "Chess arena is running. Connect a websocket to /ws to play."
}

async fn list_matches(State(service): State<ArenaService>) -> Json<Vec<MatchSummary>> {
    Json(service.registry.list_matches().await)
}

async fn get_match(
    State(service): State<ArenaService>,
    Path(match_id): Path<String>,
) -> Result<Json<StateSnapshot>, StatusCode> {
    match service.registry.snapshot(&match_id).await {
        Ok(snapshot) => Ok(Json(snapshot)),
        Err(e) => {
            log::debug!("Snapshot for {} unavailable: {}", match_id, e);
            Err(StatusCode::NOT_FOUND)
        }
    }
}

async fn get_score(
    State(service): State<ArenaService>,
    Path(match_id): Path<String>,
) -> Result<Json<ScoreSummary>, StatusCode> {
    service.score(&match_id).map(Json).ok_or(StatusCode::NOT_FOUND)
}

async fn get_moves(
    State(service): State<ArenaService>,
    Path(match_id): Path<String>,
) -> Result<Json<Vec<MoveRecord>>, StatusCode> {
    service.moves(&match_id).map(Json).ok_or(StatusCode::NOT_FOUND)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::broadcast::ChannelSink;
    use crate::enums::{Color, Role};
    use crate::geometry::Cell;
    use crate::pieces::PieceId;
    use crate::protocol::ClientMessage;
    use std::time::Duration;
    use tokio::time::timeout;

    fn test_config() -> ArenaConfig {
        ArenaConfig {
            tick_hz: 200,
            broadcast_every_tick: false,
            ..ArenaConfig::default()
        }
    }

    #[test]
    fn test_invalid_config_is_rejected() {
        let config = ArenaConfig {
            max_commands_per_tick: 0,
            ..ArenaConfig::default()
        };
        assert!(ArenaService::new(config).is_err());
    }

    #[tokio::test]
    async fn test_observers_follow_a_played_match() {
        let service = ArenaService::new(test_config()).unwrap();
        let registry = service.registry();
        let (white, _rx_w) = ChannelSink::new("a");
        let (black, _rx_b) = ChannelSink::new("b");
        let a = registry.on_connect("a", Arc::new(white)).await.unwrap();
        let b = registry.on_connect("b", Arc::new(black)).await.unwrap();
        assert_eq!((a.role, b.role), (Role::White, Role::Black));

        // The last move is the knight taking the pawn on (4, 1).
        let script = [
            ("a", "NW0", Cell::new(2, 5)),
            ("b", "PB3", Cell::new(3, 2)),
            ("a", "NW0", Cell::new(3, 3)),
            ("b", "PB0", Cell::new(0, 2)),
            ("a", "NW0", Cell::new(4, 1)),
        ];
        for (conn, piece, target) in script {
            registry
                .on_message(
                    conn,
                    ClientMessage::Move {
                        piece_id: PieceId::from(piece),
                        target,
                    },
                )
                .await
                .unwrap();
        }

        let records = timeout(Duration::from_secs(2), async {
            loop {
                if let Some(records) = service.moves(&a.match_id) {
                    if records.len() == 5 {
                        return records;
                    }
                }
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .unwrap();
        assert!(records[4].capture);
        assert_eq!(records[4].color, Color::White);

        let score = service.score(&a.match_id).unwrap();
        assert_eq!(score.white, 1);
        assert_eq!(score.leader, Some(Color::White));

        let Json(snapshot) = get_match(State(service.clone()), Path(a.match_id.clone()))
            .await
            .unwrap();
        assert_eq!(snapshot.current_turn, Color::Black);
        assert!(get_score(State(service.clone()), Path("missing".to_string()))
            .await
            .is_err());
    }
}
