// Chess Arena Library - Core Module Organization
//
// Authoritative multiplayer chess server: board rules and the per-match state
// machine at the bottom, the session tasks and matchmaker in the middle, the
// axum websocket/HTTP surface on top.

// Core data structures
pub mod enums;
pub mod errors;
pub mod geometry;
pub mod ordered_hashmap;
pub mod pieces;

// Game logic
pub mod events;
pub mod rules;
pub mod session;

// Presentation-side consumers of the event feed
pub mod observers;

// Server implementation
pub mod application;
pub mod broadcast;
pub mod config;
pub mod protocol;
pub mod registry;
pub mod runner;
pub mod websocket;

// Re-export common types for convenient access
pub use crate::application::{router, ArenaService};
pub use crate::config::ArenaConfig;
pub use crate::enums::{Color, PieceKind, Role};
pub use crate::errors::{ArenaError, ArenaResult, NetworkError, SessionError};
pub use crate::events::{Event, EventFeed, EventKind, GameEvent};
pub use crate::geometry::{BoardGeometry, Cell};
pub use crate::pieces::{Piece, PieceId, PieceRegistry};
pub use crate::registry::SessionRegistry;
pub use crate::session::GameSession;

// Version information
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
