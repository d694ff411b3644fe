use async_trait::async_trait;
use serde::Serialize;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::enums::{Color, PieceKind};
use crate::errors::{MatchId, SubscriberError};
use crate::events::{Event, GameEvent, Subscriber};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Tone {
    pub hz: u32,
    pub duration_ms: u32,
}

const fn tone(hz: u32, duration_ms: u32) -> Tone {
    Tone { hz, duration_ms }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "cue", rename_all = "snake_case")]
pub enum Cue {
    MatchStart,
    Move { kind: PieceKind },
    Capture { captured_kind: PieceKind },
    Promotion,
    KingCaptured,
    Victory { winner: Color },
}

impl Cue {
    pub fn for_event(event: &GameEvent) -> Option<Self> {
        match event {
            GameEvent::MatchStart => Some(Cue::MatchStart),
            GameEvent::MoveCommitted { piece, .. } => piece.kind().map(|kind| Cue::Move { kind }),
            // The king gets its own cue from KingCaptured.
            GameEvent::PieceCaptured { captured_kind, .. } if *captured_kind != PieceKind::King => {
                Some(Cue::Capture {
                    captured_kind: *captured_kind,
                })
            }
            GameEvent::PieceCaptured { .. } => None,
            GameEvent::PawnPromoted { .. } => Some(Cue::Promotion),
            GameEvent::KingCaptured { .. } => Some(Cue::KingCaptured),
            GameEvent::MatchEnd { winner } => Some(Cue::Victory { winner: *winner }),
            GameEvent::MatchClosed => None,
        }
    }

    /// Tone sequence a synthesizer would play for this cue.
    pub fn tones(&self) -> Vec<Tone> {
        match self {
            Cue::MatchStart => vec![tone(440, 200), tone(554, 200), tone(659, 200), tone(880, 200)],
            Cue::Move { kind } => match kind {
                PieceKind::Pawn => vec![tone(440, 100)],
                PieceKind::Rook => vec![tone(220, 150)],
                PieceKind::Knight => vec![tone(330, 80), tone(330, 80)],
                PieceKind::Bishop => vec![tone(330, 100), tone(440, 100)],
                PieceKind::Queen => vec![tone(440, 200), tone(554, 200), tone(659, 200)],
                PieceKind::King => vec![tone(220, 250), tone(277, 250), tone(330, 250)],
            },
            Cue::Capture { captured_kind } => match captured_kind {
                PieceKind::Pawn => vec![tone(400, 100)],
                PieceKind::Knight | PieceKind::Bishop => vec![tone(300, 150)],
                PieceKind::Rook => vec![tone(250, 200)],
                PieceKind::Queen | PieceKind::King => vec![tone(200, 300)],
            },
            Cue::Promotion => vec![tone(523, 150), tone(659, 150), tone(784, 300)],
            Cue::KingCaptured => [659, 622, 587, 554, 523, 494, 466, 440]
                .into_iter()
                .map(|hz| tone(hz, 100))
                .collect(),
            Cue::Victory { winner } => match winner {
                Color::White => vec![tone(523, 500), tone(659, 500), tone(784, 500)],
                Color::Black => vec![tone(440, 500), tone(554, 500), tone(659, 500)],
            },
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CueRequest {
    pub match_id: MatchId,
    pub cue: Cue,
}

/// Audio backend driven by the single cue consumer task.
#[async_trait]
pub trait CuePlayer: Send + Sync {
    async fn play(&self, request: &CueRequest) -> Result<(), SubscriberError>;
}

/// Default backend: writes the cue to the log instead of a speaker.
pub struct LoggingCuePlayer;

#[async_trait]
impl CuePlayer for LoggingCuePlayer {
    async fn play(&self, request: &CueRequest) -> Result<(), SubscriberError> {
        log::info!(
            "🔊 {:?} ({} tones) in match {}",
            request.cue,
            request.cue.tones().len(),
            request.match_id
        );
        Ok(())
    }
}

/// Feed subscriber that forwards cues to the consumer task without blocking the publisher.
pub struct CueDispatcher {
    tx: mpsc::UnboundedSender<CueRequest>,
}

impl CueDispatcher {
    pub fn new(tx: mpsc::UnboundedSender<CueRequest>) -> Self {
        Self { tx }
    }

    /// Spawns the consumer task on the current runtime.
    pub fn spawn(player: Arc<dyn CuePlayer>) -> (Arc<Self>, JoinHandle<()>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let handle = tokio::spawn(run_cue_consumer(rx, player));
        (Arc::new(Self::new(tx)), handle)
    }
}

impl Subscriber for CueDispatcher {
    fn name(&self) -> &str {
        "cue_dispatcher"
    }

    fn on_event(&self, event: &Event) -> Result<(), SubscriberError> {
        let Some(cue) = Cue::for_event(&event.payload) else {
            return Ok(());
        };
        self.tx
            .send(CueRequest {
                match_id: event.match_id.clone(),
                cue,
            })
            .map_err(|_| SubscriberError::failed(self.name(), "cue consumer has stopped"))
    }
}

/// Plays cues one at a time until every dispatcher is dropped.
pub async fn run_cue_consumer(mut rx: mpsc::UnboundedReceiver<CueRequest>, player: Arc<dyn CuePlayer>) {
    while let Some(request) = rx.recv().await {
        if let Err(e) = player.play(&request).await {
            log::error!("❌ Failed to play {:?}: {}", request.cue, e);
        }
    }
    log::debug!("🔇 Cue consumer stopped");
}
