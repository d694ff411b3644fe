use clap::Parser;
use std::time::Duration;

use crate::broadcast::DEFAULT_OUTBOUND_CAPACITY;
use crate::errors::InfrastructureError;
use crate::geometry::BoardGeometry;

pub const MAX_TICK_HZ: u32 = 240;

/// Runtime settings shared by the hosted and standalone entry points.
#[derive(Parser, Debug, Clone)]
#[command(name = "chess-arena", about = "Authoritative multiplayer chess server")]
pub struct ArenaConfig {
    /// Address the standalone server listens on
    #[arg(long, default_value = "127.0.0.1:8765")]
    pub bind: String,

    /// Session loop frequency
    #[arg(long, default_value_t = 60)]
    pub tick_hz: u32,

    /// Upper bound on queued commands applied in a single tick
    #[arg(long, default_value_t = 256)]
    pub max_commands_per_tick: usize,

    /// Push a board_state frame on every tick, not only after changes
    #[arg(long, default_value_t = true, action = clap::ArgAction::Set)]
    pub broadcast_every_tick: bool,

    /// Frames a connection may have queued before it is dropped as stalled
    #[arg(long, default_value_t = DEFAULT_OUTBOUND_CAPACITY)]
    pub outbound_capacity: usize,

    #[arg(long, default_value_t = 102.75)]
    pub cell_width_px: f64,

    #[arg(long, default_value_t = 103.5)]
    pub cell_height_px: f64,
}

impl Default for ArenaConfig {
    fn default() -> Self {
        Self {
            bind: "127.0.0.1:8765".to_string(),
            tick_hz: 60,
            max_commands_per_tick: 256,
            broadcast_every_tick: true,
            outbound_capacity: DEFAULT_OUTBOUND_CAPACITY,
            cell_width_px: 102.75,
            cell_height_px: 103.5,
        }
    }
}

impl ArenaConfig {
    pub fn validate(&self) -> Result<(), InfrastructureError> {
        if self.tick_hz == 0 || self.tick_hz > MAX_TICK_HZ {
            return Err(InfrastructureError::configuration(format!(
                "tick_hz must be within 1..={MAX_TICK_HZ}, got {}",
                self.tick_hz
            )));
        }
        if self.max_commands_per_tick == 0 {
            return Err(InfrastructureError::configuration(
                "max_commands_per_tick must be positive",
            ));
        }
        if self.outbound_capacity == 0 {
            return Err(InfrastructureError::configuration(
                "outbound_capacity must be positive",
            ));
        }
        if !(self.cell_width_px > 0.0 && self.cell_height_px > 0.0) {
            return Err(InfrastructureError::configuration(format!(
                "cell size must be positive, got {}x{}",
                self.cell_width_px, self.cell_height_px
            )));
        }
        if self.bind.parse::<std::net::SocketAddr>().is_err() {
            return Err(InfrastructureError::configuration(format!(
                "invalid bind address: {}",
                self.bind
            )));
        }
        Ok(())
    }

    pub fn tick_interval(&self) -> Duration {
        Duration::from_secs_f64(1.0 / self.tick_hz.max(1) as f64)
    }

    pub fn geometry(&self) -> BoardGeometry {
        BoardGeometry::new(self.cell_width_px, self.cell_height_px)
    }
}
